// ABOUTME: Plugin registry that resolves plugin units once at startup and indexes their handlers.
// ABOUTME: Per-unit failures are collected into the load report and never abort loading.

use crate::commands::normalize_name;
use crate::error::{LoadFailure, PluginLoadError};
use crate::metrics;
use crate::plugin::{CommandHandler, EventHandler, PluginDescriptor};
use anyhow::Result;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

type Resolver = Box<dyn FnOnce() -> Result<PluginDescriptor> + Send>;

/// One loadable plugin unit (a catalog entry, a manifest file, ...)
pub struct PluginUnit {
    name: String,
    resolve: Resolver,
}

impl PluginUnit {
    /// A unit whose descriptor is produced by `resolve`
    pub fn new<F>(name: impl Into<String>, resolve: F) -> Self
    where
        F: FnOnce() -> Result<PluginDescriptor> + Send + 'static,
    {
        Self {
            name: name.into(),
            resolve: Box::new(resolve),
        }
    }

    /// A unit that already failed while being enumerated
    pub fn failed(name: impl Into<String>, error: anyhow::Error) -> Self {
        Self::new(name, move || Err(error))
    }

    /// Name used in load errors and progress reports
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resolve(self) -> Result<PluginDescriptor> {
        (self.resolve)()
    }
}

impl std::fmt::Debug for PluginUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginUnit").field("name", &self.name).finish()
    }
}

/// Enumerates plugin units in a stable order
pub trait PluginSource: Send + Sync {
    fn units(&self) -> Vec<PluginUnit>;
}

impl<F> PluginSource for F
where
    F: Fn() -> Vec<PluginUnit> + Send + Sync,
{
    fn units(&self) -> Vec<PluginUnit> {
        (self)()
    }
}

/// Sources chained in order
impl PluginSource for Vec<Box<dyn PluginSource>> {
    fn units(&self) -> Vec<PluginUnit> {
        self.iter().flat_map(|source| source.units()).collect()
    }
}

/// Receives loading progress. Purely observational.
pub trait LoadObserver {
    fn on_progress(&self, processed: usize, total: usize, unit: &str);

    fn on_finish(&self, _report: &LoadReport) {}
}

/// Logs progress through tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LoadObserver for TracingObserver {
    fn on_progress(&self, processed: usize, total: usize, unit: &str) {
        tracing::debug!(processed, total, unit = %unit, "Plugin unit processed");
    }

    fn on_finish(&self, report: &LoadReport) {
        tracing::info!(
            commands = report.registry.commands().len(),
            event_handlers = report.registry.events().len(),
            skipped = report.skipped.len(),
            errors = report.errors.len(),
            "Plugin loading finished"
        );
        for error in &report.errors {
            tracing::error!(unit = %error.unit, error = %error.cause, "Failed to load plugin");
        }
    }
}

/// Normalized name -> command handler
#[derive(Clone, Default)]
pub struct CommandRegistry {
    handlers: BTreeMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    /// Look up a handler; the name is normalized first
    pub fn get(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(&normalize_name(name)).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(&normalize_name(name))
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Normalized name -> event handler. Every entry receives every event.
#[derive(Clone, Default)]
pub struct EventRegistry {
    handlers: BTreeMap<String, Arc<dyn EventHandler>>,
}

impl EventRegistry {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn EventHandler>)> {
        self.handlers.iter().map(|(name, h)| (name.as_str(), h))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(&normalize_name(name))
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Immutable index of loaded plugins
#[derive(Clone, Default)]
pub struct PluginRegistry {
    commands: CommandRegistry,
    events: EventRegistry,
    descriptors: Vec<PluginDescriptor>,
}

/// Result of loading a plugin source
pub struct LoadReport {
    pub registry: PluginRegistry,
    pub errors: Vec<PluginLoadError>,
    /// Units whose descriptor declared no handler
    pub skipped: Vec<String>,
}

impl PluginRegistry {
    /// Resolve every unit of `source` and index the resulting handlers.
    ///
    /// No handler is invoked. A unit that fails to resolve, has an empty name
    /// or repeats an already registered name is reported and skipped.
    pub fn load(source: &dyn PluginSource, observer: &dyn LoadObserver) -> LoadReport {
        let units = source.units();
        let total = units.len();
        let mut registry = PluginRegistry::default();
        let mut errors = Vec::new();
        let mut skipped = Vec::new();
        let mut seen = HashSet::new();

        for (index, unit) in units.into_iter().enumerate() {
            let unit_name = unit.name().to_string();

            match registry.register_unit(unit, &mut seen) {
                Ok(true) => metrics::record_plugin_load("loaded"),
                Ok(false) => {
                    tracing::warn!(unit = %unit_name, "Plugin declares no handler, skipping");
                    metrics::record_plugin_load("skipped");
                    skipped.push(unit_name.clone());
                }
                Err(cause) => {
                    metrics::record_plugin_load("failed");
                    errors.push(PluginLoadError {
                        unit: unit_name.clone(),
                        cause,
                    });
                }
            }

            observer.on_progress(index + 1, total, &unit_name);
        }

        let report = LoadReport {
            registry,
            errors,
            skipped,
        };
        observer.on_finish(&report);
        report
    }

    /// Returns Ok(false) for inert descriptors
    fn register_unit(
        &mut self,
        unit: PluginUnit,
        seen: &mut HashSet<String>,
    ) -> Result<bool, LoadFailure> {
        let descriptor = unit.resolve().map_err(LoadFailure::Resolve)?;

        let key = normalize_name(descriptor.name());
        if key.is_empty() {
            return Err(LoadFailure::EmptyName);
        }
        if seen.contains(&key) {
            return Err(LoadFailure::DuplicateName(key));
        }
        if descriptor.is_inert() {
            return Ok(false);
        }

        if let Some(handler) = descriptor.command_handler() {
            self.commands.handlers.insert(key.clone(), handler);
        }
        if let Some(handler) = descriptor.event_handler() {
            self.events.handlers.insert(key.clone(), handler);
        }
        seen.insert(key);
        self.descriptors.push(descriptor);
        Ok(true)
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    /// Registered descriptors in load order
    pub fn descriptors(&self) -> &[PluginDescriptor] {
        &self.descriptors
    }
}

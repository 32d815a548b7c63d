// ABOUTME: Plugin sources for relaybot: the built-in catalog and the manifest directory.
// ABOUTME: Builds the chained source from config and loads it into a registry.

pub mod builtin;
pub mod manifest;

use crate::config::PluginsConfig;
use builtin::{BuiltinContext, CatalogSource};
use manifest::ManifestSource;
use relaybot_core::{LoadObserver, LoadReport, PluginRegistry, PluginSource};

/// Built-ins first, then manifests
pub fn configured_source(
    config: &PluginsConfig,
    context: BuiltinContext,
) -> Vec<Box<dyn PluginSource>> {
    let mut sources: Vec<Box<dyn PluginSource>> = vec![Box::new(CatalogSource::new(
        config.builtin.clone(),
        context,
    ))];
    if let Some(dir) = &config.manifest_dir {
        sources.push(Box::new(ManifestSource::new(dir.clone())));
    }
    sources
}

/// Load every configured plugin
pub fn load(
    config: &PluginsConfig,
    context: BuiltinContext,
    observer: &dyn LoadObserver,
) -> LoadReport {
    let source = configured_source(config, context);
    PluginRegistry::load(&source, observer)
}

// ABOUTME: Plugin descriptor and the command/event handler capability traits.
// ABOUTME: A descriptor is a named, tagged set of capabilities; inert descriptors carry none.

use anyhow::Result;
use async_trait::async_trait;
use relaybot_platform::{PlatformEvent, SharedConnection};
use std::future::Future;
use std::sync::Arc;

/// Handler invoked when a message's first token matches the plugin name.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn run(
        &self,
        connection: SharedConnection,
        event: &PlatformEvent,
        args: &[String],
    ) -> Result<()>;
}

/// Handler invoked for every thread/platform event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, connection: SharedConnection, event: &PlatformEvent)
        -> Result<()>;
}

/// Adapts an async closure into a [`CommandHandler`]
pub struct CommandFn<F>(F);

/// Wrap `f` as a command handler
pub fn command_fn<F, Fut>(f: F) -> CommandFn<F>
where
    F: Fn(SharedConnection, PlatformEvent, Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    CommandFn(f)
}

#[async_trait]
impl<F, Fut> CommandHandler for CommandFn<F>
where
    F: Fn(SharedConnection, PlatformEvent, Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn run(
        &self,
        connection: SharedConnection,
        event: &PlatformEvent,
        args: &[String],
    ) -> Result<()> {
        (self.0)(connection, event.clone(), args.to_vec()).await
    }
}

/// Adapts an async closure into an [`EventHandler`]
pub struct EventFn<F>(F);

/// Wrap `f` as an event handler
pub fn event_fn<F, Fut>(f: F) -> EventFn<F>
where
    F: Fn(SharedConnection, PlatformEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    EventFn(f)
}

#[async_trait]
impl<F, Fut> EventHandler for EventFn<F>
where
    F: Fn(SharedConnection, PlatformEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle_event(
        &self,
        connection: SharedConnection,
        event: &PlatformEvent,
    ) -> Result<()> {
        (self.0)(connection, event.clone()).await
    }
}

/// Capability a descriptor can fulfil
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Command,
    Event,
}

/// A plugin: one canonical name plus an optional command and/or event handler.
#[derive(Clone)]
pub struct PluginDescriptor {
    name: String,
    description: Option<String>,
    command: Option<Arc<dyn CommandHandler>>,
    event: Option<Arc<dyn EventHandler>>,
}

impl PluginDescriptor {
    /// A descriptor with no capabilities yet
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            command: None,
            event: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_command<H: CommandHandler + 'static>(mut self, handler: H) -> Self {
        self.command = Some(Arc::new(handler));
        self
    }

    pub fn with_event<H: EventHandler + 'static>(mut self, handler: H) -> Self {
        self.event = Some(Arc::new(handler));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn command_handler(&self) -> Option<Arc<dyn CommandHandler>> {
        self.command.clone()
    }

    pub fn event_handler(&self) -> Option<Arc<dyn EventHandler>> {
        self.event.clone()
    }

    /// The roles this descriptor fulfils, command first
    pub fn roles(&self) -> Vec<Role> {
        let mut roles = Vec::with_capacity(2);
        if self.command.is_some() {
            roles.push(Role::Command);
        }
        if self.event.is_some() {
            roles.push(Role::Event);
        }
        roles
    }

    /// Inert descriptors have no handler and are never registered
    pub fn is_inert(&self) -> bool {
        self.command.is_none() && self.event.is_none()
    }
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("roles", &self.roles())
            .finish()
    }
}

// ABOUTME: Platform-agnostic core for relaybot: plugins, dispatch and session lifecycle.
// ABOUTME: Owns the plugin registry, event dispatcher, session store and login state machine.

pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod heartbeat;
pub mod lifecycle;
pub mod metrics;
pub mod paths;
pub mod plugin;
pub mod registry;
pub mod session;

pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::{CredentialError, HandlerError, LoadFailure, PluginLoadError, SessionError};
pub use heartbeat::{Heartbeat, HeartbeatHandle};
pub use lifecycle::{LifecycleController, LoginOutcome, PendingLogin};
pub use plugin::{command_fn, event_fn, CommandHandler, EventHandler, PluginDescriptor, Role};
pub use registry::{
    CommandRegistry, EventRegistry, LoadObserver, LoadReport, PluginRegistry, PluginSource,
    PluginUnit, TracingObserver,
};
pub use session::{Account, Reservation, SessionStore, SlotState};

// Re-export platform types used throughout the core API
pub use relaybot_platform::{
    AppState, Connection, EventKind, EventStream, Platform, PlatformEvent, SharedConnection,
};

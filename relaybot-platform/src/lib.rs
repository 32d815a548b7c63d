// ABOUTME: Pluggable messaging platform abstraction for relaybot.
// ABOUTME: Provides the Platform/Connection capability traits, event model and a mock backend.

pub mod backends;
pub mod credentials;
pub mod event;
pub mod registry;
pub mod traits;

pub use credentials::{AppState, StateEntry, IDENTITY_COOKIE};
pub use event::{EventKind, PlatformEvent};
pub use registry::{PlatformFactory, PlatformRegistry};
pub use traits::{Connection, EventStream, ListenOptions, Platform, SharedConnection, UserInfo};

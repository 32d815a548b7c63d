// ABOUTME: Root library module exposing the HTTP surface, plugin sources and server wiring
// ABOUTME: Re-exports config, metrics and paths from relaybot-core

pub mod http;
pub mod plugins;
pub mod server;

// Re-export platform-agnostic modules from relaybot-core
pub use relaybot_core::config;
pub use relaybot_core::metrics;
pub use relaybot_core::paths;

pub use server::ServerState;

// ABOUTME: Error taxonomy for plugin loading, login validation, session setup and handlers.
// ABOUTME: None of these are fatal to the process; each is scoped to one unit, login or invocation.

use std::time::Duration;
use thiserror::Error;

/// Why a plugin unit could not be registered
#[derive(Debug, Error)]
pub enum LoadFailure {
    #[error("failed to resolve descriptor: {0:#}")]
    Resolve(anyhow::Error),

    #[error("descriptor has an empty name")]
    EmptyName,

    #[error("plugin name '{0}' is already registered")]
    DuplicateName(String),
}

/// A per-unit load failure, collected and reported without aborting startup
#[derive(Debug, Error)]
#[error("plugin unit '{unit}': {cause}")]
pub struct PluginLoadError {
    pub unit: String,
    #[source]
    pub cause: LoadFailure,
}

/// Malformed or missing login payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("app state is missing")]
    MissingState,

    #[error("app state has no c_user entry")]
    MissingIdentity,

    #[error("app state c_user entry has no usable value")]
    EmptyIdentity,
}

/// Failure of the asynchronous part of a login, after the id was reserved
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    #[error("platform rejected the credentials: {0:#}")]
    Authentication(anyhow::Error),

    #[error("logged in as {actual} but the app state belongs to {expected}")]
    IdentityMismatch { expected: String, actual: String },

    #[error("failed to fetch account identity: {0:#}")]
    IdentityFetch(anyhow::Error),

    #[error("failed to arm heartbeat: {0:#}")]
    HeartbeatArm(anyhow::Error),

    #[error("failed to start listening: {0:#}")]
    Listen(anyhow::Error),

    #[error("login task aborted")]
    Aborted,
}

impl SessionError {
    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Authentication(_) => "authentication",
            Self::IdentityMismatch { .. } => "identity_mismatch",
            Self::IdentityFetch(_) => "identity_fetch",
            Self::HeartbeatArm(_) => "heartbeat_arm",
            Self::Listen(_) => "listen",
            Self::Aborted => "aborted",
        }
    }
}

/// Failure inside one handler invocation. Logged at the dispatch boundary.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler '{plugin}' failed: {error:#}")]
    Failed { plugin: String, error: anyhow::Error },

    #[error("handler '{plugin}' panicked: {message}")]
    Panicked { plugin: String, message: String },

    #[error("handler '{plugin}' timed out after {timeout:?}")]
    TimedOut { plugin: String, timeout: Duration },
}

impl HandlerError {
    pub fn plugin(&self) -> &str {
        match self {
            Self::Failed { plugin, .. }
            | Self::Panicked { plugin, .. }
            | Self::TimedOut { plugin, .. } => plugin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_load_error_names_unit() {
        let err = PluginLoadError {
            unit: "broken.toml".to_string(),
            cause: LoadFailure::Resolve(anyhow::anyhow!("unknown kind 'x'")),
        };
        let msg = err.to_string();
        assert!(msg.contains("broken.toml"));
        assert!(msg.contains("unknown kind 'x'"));
    }

    #[test]
    fn test_session_error_kinds() {
        assert_eq!(SessionError::Timeout(Duration::from_secs(1)).kind(), "timeout");
        assert_eq!(
            SessionError::IdentityFetch(anyhow::anyhow!("x")).kind(),
            "identity_fetch"
        );
        assert_eq!(SessionError::Aborted.kind(), "aborted");
    }

    #[test]
    fn test_handler_error_plugin() {
        let err = HandlerError::TimedOut {
            plugin: "ping".into(),
            timeout: Duration::from_secs(3),
        };
        assert_eq!(err.plugin(), "ping");
    }
}

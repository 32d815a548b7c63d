// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates required fields and provides sensible defaults for optional ones
use crate::paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub login: LoginConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory holding index.html and other static assets
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_dir: default_public_dir(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Backend name registered in the platform registry, e.g. "mock"
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Backend-specific settings, passed verbatim to the backend factory
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            settings: serde_json::Value::Null,
        }
    }
}

// Backend settings may carry secrets
impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("backend", &self.backend)
            .field(
                "settings",
                &(!self.settings.is_null()).then_some("[REDACTED]"),
            )
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl LoginConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Thread or user that receives the announcement and status messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_id: Option<String>,
    /// Six-field cron expression (seconds first)
    #[serde(default = "default_schedule")]
    pub schedule: String,
    /// IANA timezone the schedule is evaluated in
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_announcement")]
    pub announcement: String,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            destination_id: None,
            schedule: default_schedule(),
            timezone: default_timezone(),
            announcement: default_announcement(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Built-in plugins to load; all of them when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builtin: Option<Vec<String>>,
    /// Directory of `*.toml` plugin manifests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            handler_timeout_secs: default_handler_timeout_secs(),
        }
    }
}

impl DispatchConfig {
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("./public")
}

fn default_backend() -> String {
    "mock".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_schedule() -> String {
    // every minute, on the minute
    "0 * * * * *".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_announcement() -> String {
    "relaybot is online".to_string()
}

fn default_handler_timeout_secs() -> u64 {
    30
}

fn expand_tilde(path: &Path) -> PathBuf {
    let Some(raw) = path.to_str() else {
        return path.to_path_buf();
    };
    if let Some(stripped) = raw.strip_prefix("~/") {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs.home_dir().join(stripped);
        }
        tracing::warn!(
            path = %raw,
            "Failed to expand tilde in path: could not determine home directory"
        );
    }
    path.to_path_buf()
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. explicit path (from `--config`)
    /// 2. RELAYBOT_CONFIG_PATH env var (if set)
    /// 3. ./config.toml (current directory - for development)
    /// 4. ~/.config/relaybot/config.toml (XDG config dir)
    pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        if let Ok(env_path) = std::env::var("RELAYBOT_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Load configuration with environment variable overrides, then validate.
    /// An explicit path that does not exist is an error; the other locations are optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(config_path) = Self::find_config_file(explicit) {
            tracing::info!(
                path = %config_path.display(),
                "Loading configuration from file"
            );
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            Self::from_toml_str(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            tracing::info!("No config file found, using environment variables and defaults");
            Config::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without env overrides or validation
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str::<Config>(content)?)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("RELAYBOT_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("RELAYBOT_PORT") {
            self.server.port = val.parse().with_context(|| {
                format!("RELAYBOT_PORT must be a valid port number, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("RELAYBOT_PLATFORM") {
            self.platform.backend = val;
        }
        if let Ok(val) = std::env::var("RELAYBOT_HEARTBEAT_DESTINATION") {
            self.heartbeat.destination_id = Some(val);
        }
        if let Ok(val) = std::env::var("RELAYBOT_PLUGIN_DIR") {
            self.plugins.manifest_dir = Some(PathBuf::from(val));
        }

        if let Some(dir) = self.plugins.manifest_dir.take() {
            self.plugins.manifest_dir = Some(expand_tilde(&dir));
        }
        self.server.public_dir = expand_tilde(&self.server.public_dir);
        Ok(())
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.platform.backend.trim().is_empty() {
            anyhow::bail!("platform.backend must not be empty");
        }
        if self.login.connect_timeout_secs == 0 {
            anyhow::bail!("login.connect_timeout_secs must be greater than zero");
        }
        if self.dispatch.handler_timeout_secs == 0 {
            anyhow::bail!("dispatch.handler_timeout_secs must be greater than zero");
        }

        if self.heartbeat.enabled {
            let has_destination = self
                .heartbeat
                .destination_id
                .as_deref()
                .is_some_and(|d| !d.trim().is_empty());
            if !has_destination {
                anyhow::bail!(
                    "heartbeat.destination_id is required when the heartbeat is enabled (set in config.toml or RELAYBOT_HEARTBEAT_DESTINATION env var)"
                );
            }
        }

        // Validate timezone is a valid IANA timezone
        if self.heartbeat.timezone.parse::<chrono_tz::Tz>().is_err() {
            anyhow::bail!(
                "Invalid timezone '{}'. Use IANA timezone names like 'America/Chicago', 'Europe/London', 'UTC'",
                self.heartbeat.timezone
            );
        }

        self.heartbeat
            .schedule
            .parse::<cron::Schedule>()
            .with_context(|| {
                format!(
                    "Invalid heartbeat.schedule '{}'. Expected a cron expression like '0 * * * * *'",
                    self.heartbeat.schedule
                )
            })?;

        Ok(())
    }

    /// Address the HTTP server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_VARS: &[&str] = &[
        "RELAYBOT_CONFIG_PATH",
        "RELAYBOT_HOST",
        "RELAYBOT_PORT",
        "RELAYBOT_PLATFORM",
        "RELAYBOT_HEARTBEAT_DESTINATION",
        "RELAYBOT_PLUGIN_DIR",
    ];

    /// Clears relaybot env vars and restores them on drop
    struct EnvGuard(Vec<(&'static str, Option<String>)>);

    impl EnvGuard {
        fn clean() -> Self {
            let saved = ENV_VARS
                .iter()
                .map(|k| (*k, std::env::var(k).ok()))
                .collect();
            for key in ENV_VARS {
                std::env::remove_var(key);
            }
            Self(saved)
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, val) in &self.0 {
                match val {
                    Some(v) => std::env::set_var(key, v),
                    None => std::env::remove_var(key),
                }
            }
        }
    }

    fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.platform.backend, "mock");
        assert!(config.platform.settings.is_null());
        assert_eq!(config.login.connect_timeout_secs, 60);
        assert!(config.heartbeat.enabled);
        assert_eq!(config.heartbeat.schedule, "0 * * * * *");
        assert_eq!(config.heartbeat.timezone, "UTC");
        assert!(config.plugins.builtin.is_none());
        assert_eq!(config.dispatch.handler_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_full_config_parses() {
        let config = Config::from_toml_str(
            r#"
                [server]
                host = "127.0.0.1"
                port = 8080
                public_dir = "./static"

                [platform]
                backend = "mock"
                settings = { connect_delay_ms = 5, reject = ["666"] }

                [login]
                connect_timeout_secs = 10

                [heartbeat]
                enabled = true
                destination_id = "100049"
                schedule = "0 */5 * * * *"
                timezone = "Europe/London"
                announcement = "up"

                [plugins]
                builtin = ["ping", "welcome"]
                manifest_dir = "./plugins"

                [dispatch]
                handler_timeout_secs = 5
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
        assert_eq!(config.platform.settings["connect_delay_ms"], 5);
        assert_eq!(
            config.plugins.builtin.as_deref(),
            Some(&["ping".to_string(), "welcome".to_string()][..])
        );
        assert_eq!(config.heartbeat.destination_id.as_deref(), Some("100049"));
    }

    #[test]
    fn test_platform_settings_redacted_in_debug() {
        let config = Config::from_toml_str(
            r#"
                [platform]
                settings = { token = "hunter2" }
            "#,
        )
        .unwrap();
        let debug = format!("{:?}", config.platform);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_validation_requires_heartbeat_destination() {
        let config = Config::default();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("destination_id"), "{}", err);

        let mut disabled = Config::default();
        disabled.heartbeat.enabled = false;
        disabled.validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_bad_schedule_and_timezone() {
        let mut config = Config::default();
        config.heartbeat.destination_id = Some("1".into());

        config.heartbeat.schedule = "every minute".into();
        assert!(config.validate().is_err());

        config.heartbeat.schedule = default_schedule();
        config.heartbeat.timezone = "Mars/Olympus".into();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("Mars/Olympus"));
    }

    #[test]
    fn test_validation_rejects_zero_timeouts() {
        let mut config = Config::default();
        config.heartbeat.enabled = false;
        config.login.connect_timeout_secs = 0;
        assert!(config.validate().is_err());

        config.login.connect_timeout_secs = 1;
        config.dispatch.handler_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_load_from_env_path_with_overrides() {
        let _env = EnvGuard::clean();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
                [server]
                port = 7000

                [heartbeat]
                destination_id = "from-file"
            "#,
        );

        std::env::set_var("RELAYBOT_CONFIG_PATH", &path);
        std::env::set_var("RELAYBOT_PORT", "7100");
        std::env::set_var("RELAYBOT_HEARTBEAT_DESTINATION", "from-env");
        std::env::set_var("RELAYBOT_PLUGIN_DIR", "/srv/plugins");

        let config = Config::load(None).unwrap();
        assert_eq!(config.server.port, 7100, "Env var should override file");
        assert_eq!(config.heartbeat.destination_id.as_deref(), Some("from-env"));
        assert_eq!(
            config.plugins.manifest_dir.as_deref(),
            Some(Path::new("/srv/plugins"))
        );
    }

    #[test]
    #[serial]
    fn test_explicit_path_wins_over_env() {
        let _env = EnvGuard::clean();
        let dir = tempfile::tempdir().unwrap();
        let explicit = write_config(
            &dir,
            r#"
                [heartbeat]
                enabled = false
                [server]
                port = 6001
            "#,
        );
        std::env::set_var("RELAYBOT_CONFIG_PATH", dir.path().join("other.toml"));

        let config = Config::load(Some(&explicit)).unwrap();
        assert_eq!(config.server.port, 6001);
    }

    #[test]
    #[serial]
    fn test_invalid_port_env_is_an_error() {
        let _env = EnvGuard::clean();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[heartbeat]\nenabled = false\n");
        std::env::set_var("RELAYBOT_PORT", "not-a-port");

        let err = Config::load(Some(&path)).unwrap_err().to_string();
        assert!(err.contains("RELAYBOT_PORT"), "{}", err);
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_is_an_error() {
        let _env = EnvGuard::clean();
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(Some(&dir.path().join("missing.toml")));
        assert!(result.is_err());
    }
}

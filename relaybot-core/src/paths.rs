// ABOUTME: XDG Base Directory paths for config and log storage
// ABOUTME: Falls back to the working directory when no home directory can be determined

use directories::ProjectDirs;
use std::path::PathBuf;

const QUALIFIER: &str = "org";
const ORGANIZATION: &str = "relaybot";
const APPLICATION: &str = "relaybot";

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// e.g. ~/.local/share/relaybot/
pub fn data_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

/// e.g. ~/.local/share/relaybot/logs/
pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

/// e.g. ~/.config/relaybot/
pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|p| p.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// e.g. ~/.config/relaybot/config.toml
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

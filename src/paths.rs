//! Well-known filesystem locations.

use std::path::PathBuf;

const APP_DIR: &str = "analyses-doc";

fn env_dir(var: &str) -> Option<PathBuf> {
    std::env::var(var)
        .ok()
        .filter(|dir| !dir.trim().is_empty())
        .map(PathBuf::from)
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"))
}

/// Base directory for configuration files.
///
/// Uses `ANALYSES_DOC_CONFIG_DIR` if set, otherwise
/// `$XDG_CONFIG_HOME/analyses-doc` or `~/.config/analyses-doc`.
pub(crate) fn config_dir() -> PathBuf {
    if let Some(dir) = env_dir("ANALYSES_DOC_CONFIG_DIR") {
        return dir;
    }
    env_dir("XDG_CONFIG_HOME")
        .unwrap_or_else(|| home().join(".config"))
        .join(APP_DIR)
}

/// Default directory for rolling log files.
///
/// Uses `ANALYSES_DOC_LOG_DIR` if set, otherwise
/// `$XDG_STATE_HOME/analyses-doc/logs` or `~/.local/state/analyses-doc/logs`.
pub(crate) fn log_dir() -> PathBuf {
    if let Some(dir) = env_dir("ANALYSES_DOC_LOG_DIR") {
        return dir;
    }
    env_dir("XDG_STATE_HOME")
        .unwrap_or_else(|| home().join(".local").join("state"))
        .join(APP_DIR)
        .join("logs")
}

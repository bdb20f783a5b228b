use std::fs;
use std::path::{Path, PathBuf};

use super::merge::{apply_env_overrides, merge_layers};
use super::{Config, ConfigError, ConfigLayer};

pub fn config_path() -> PathBuf {
    crate::paths::config_dir().join("config.toml")
}

/// Per-project overrides, kept next to the project's files.
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join("analyses-doc.toml")
}

pub fn load_user_config() -> Result<Option<ConfigLayer>, ConfigError> {
    read_layer(&config_path())
}

pub fn load_project_config(project_root: &Path) -> Result<Option<ConfigLayer>, ConfigError> {
    read_layer(&project_config_path(project_root))
}

fn read_layer(path: &Path) -> Result<Option<ConfigLayer>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

pub fn load() -> Result<Config, ConfigError> {
    load_for_project(None)
}

pub fn load_for_project(project_root: Option<&Path>) -> Result<Config, ConfigError> {
    let user = load_user_config()?;
    let project = match project_root {
        Some(root) => load_project_config(root)?,
        None => None,
    };
    let mut config = merge_layers(user, project);
    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

/// Loads the config, falling back to defaults on any error, and writes a
/// default user config if none exists yet.
pub fn load_or_init() -> Config {
    let path = config_path();
    let had_user_config = path.exists();

    let config = match load() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("config load failed, using defaults: {e}");
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            cfg
        }
    };

    if !had_user_config {
        if let Err(e) = write_config(&path, &Config::default()) {
            tracing::warn!("failed to write default config: {e}");
        }
    }

    config
}

pub fn write_config(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let contents = toml::to_string_pretty(cfg)?;
    atomic_write(path, contents.as_bytes())
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().ok_or_else(|| ConfigError::Invalid {
        field: "config path",
        reason: format!("{} has no parent directory", path.display()),
    })?;
    let temp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    fs::write(temp.path(), data).map_err(write_err)?;
    temp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

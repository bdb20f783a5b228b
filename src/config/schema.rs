use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Highest heading tag a document editor renders (`h6`).
pub const MAX_HEADING_LEVEL: u8 = 6;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub sync: SyncConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sync.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Named document root whose children are scanned for analysis roots.
    pub root_fragment: String,
    /// Group headings are `h{depth}` clamped to this level.
    pub max_heading_level: u8,
    /// Tear down analyses whose root node disappeared from the document.
    pub teardown_removed: bool,
    /// Peer id stamped on local document writes; random when unset.
    pub replica_id: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root_fragment: "root".to_string(),
            max_heading_level: MAX_HEADING_LEVEL,
            teardown_removed: true,
            replica_id: None,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root_fragment.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "sync.root_fragment",
                reason: "must not be empty".to_string(),
            });
        }
        check_heading_level(self.max_heading_level).map_err(|reason| ConfigError::Invalid {
            field: "sync.max_heading_level",
            reason,
        })
    }

    /// The configured replica id, or a fresh random one.
    pub fn replica(&self) -> u64 {
        self.replica_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().as_u64_pair().0)
    }
}

pub(crate) fn check_heading_level(level: u8) -> Result<(), String> {
    // h1 is reserved for the analysis title.
    if (2..=MAX_HEADING_LEVEL).contains(&level) {
        Ok(())
    } else {
        Err(format!("expected 2..={MAX_HEADING_LEVEL}, got {level}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Tree,
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    Daily,
    Hourly,
    Minutely,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub stderr: bool,
    pub stderr_format: LogFormat,
    pub filter: Option<String>,
    pub file: FileLoggingConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stderr: true,
            stderr_format: LogFormat::Tree,
            filter: None,
            file: FileLoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    pub enabled: bool,
    pub dir: Option<PathBuf>,
    pub format: LogFormat,
    pub rotation: LogRotation,
    pub retention_max_age_days: Option<u64>,
    pub retention_max_files: Option<usize>,
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: None,
            format: LogFormat::Json,
            rotation: LogRotation::Daily,
            retention_max_age_days: Some(7),
            retention_max_files: Some(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfigOverride {
    pub stderr: Option<bool>,
    pub stderr_format: Option<LogFormat>,
    pub filter: Option<String>,
    pub file: Option<FileLoggingConfigOverride>,
}

impl LoggingConfigOverride {
    pub fn apply_to(&self, target: &mut LoggingConfig) {
        if let Some(stderr) = self.stderr {
            target.stderr = stderr;
        }
        if let Some(format) = self.stderr_format {
            target.stderr_format = format;
        }
        if let Some(filter) = self.filter.as_ref() {
            target.filter = Some(filter.clone());
        }
        if let Some(file) = self.file.as_ref() {
            file.apply_to(&mut target.file);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FileLoggingConfigOverride {
    pub enabled: Option<bool>,
    pub dir: Option<PathBuf>,
    pub format: Option<LogFormat>,
    pub rotation: Option<LogRotation>,
    pub retention_max_age_days: Option<u64>,
    pub retention_max_files: Option<usize>,
}

impl FileLoggingConfigOverride {
    pub fn apply_to(&self, target: &mut FileLoggingConfig) {
        if let Some(enabled) = self.enabled {
            target.enabled = enabled;
        }
        if let Some(dir) = self.dir.as_ref() {
            target.dir = Some(dir.clone());
        }
        if let Some(format) = self.format {
            target.format = format;
        }
        if let Some(rotation) = self.rotation {
            target.rotation = rotation;
        }
        if let Some(days) = self.retention_max_age_days {
            target.retention_max_age_days = Some(days);
        }
        if let Some(files) = self.retention_max_files {
            target.retention_max_files = Some(files);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SyncConfigOverride {
    pub root_fragment: Option<String>,
    pub max_heading_level: Option<u8>,
    pub teardown_removed: Option<bool>,
    pub replica_id: Option<u64>,
}

impl SyncConfigOverride {
    pub fn apply_to(&self, target: &mut SyncConfig) {
        if let Some(root) = self.root_fragment.as_ref() {
            target.root_fragment = root.clone();
        }
        if let Some(level) = self.max_heading_level {
            target.max_heading_level = level;
        }
        if let Some(teardown) = self.teardown_removed {
            target.teardown_removed = teardown;
        }
        if let Some(replica) = self.replica_id {
            target.replica_id = Some(replica);
        }
    }
}

/// One partial config file. Unset fields leave the layer below untouched.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConfigLayer {
    pub logging: LoggingConfigOverride,
    pub sync: SyncConfigOverride,
}

impl ConfigLayer {
    pub fn apply_to(&self, target: &mut Config) {
        self.logging.apply_to(&mut target.logging);
        self.sync.apply_to(&mut target.sync);
    }
}

//! Config loading and persistence.

mod error;
mod load;
mod merge;
mod schema;

pub use error::ConfigError;
pub use load::{
    config_path, load, load_for_project, load_or_init, load_project_config, load_user_config,
    project_config_path, write_config,
};
pub use merge::{apply_env_overrides, merge_layers};
pub use schema::{
    Config, ConfigLayer, FileLoggingConfig, FileLoggingConfigOverride, LogFormat, LogRotation,
    LoggingConfig, LoggingConfigOverride, SyncConfig, SyncConfigOverride,
};

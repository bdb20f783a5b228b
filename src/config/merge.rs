use super::schema::check_heading_level;
use super::{Config, ConfigLayer};

pub fn merge_layers(user: Option<ConfigLayer>, project: Option<ConfigLayer>) -> Config {
    let mut config = Config::default();
    if let Some(layer) = user {
        layer.apply_to(&mut config);
    }
    if let Some(layer) = project {
        layer.apply_to(&mut config);
    }
    config
}

pub fn apply_env_overrides(config: &mut Config) {
    if std::env::var("ANALYSES_DOC_NO_TEARDOWN").is_ok() {
        config.sync.teardown_removed = false;
    }

    if let Ok(raw) = std::env::var("ANALYSES_DOC_ROOT_FRAGMENT") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            config.sync.root_fragment = trimmed.to_string();
        }
    }

    if let Ok(raw) = std::env::var("ANALYSES_DOC_MAX_HEADING_LEVEL") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            match trimmed
                .parse::<u8>()
                .map_err(|err| err.to_string())
                .and_then(|level| check_heading_level(level).map(|()| level))
            {
                Ok(level) => {
                    config.sync.max_heading_level = level;
                }
                Err(err) => {
                    tracing::warn!("invalid ANALYSES_DOC_MAX_HEADING_LEVEL, ignoring: {err}");
                }
            }
        }
    }

    if let Ok(raw) = std::env::var("ANALYSES_DOC_REPLICA_ID") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            match trimmed.parse::<u64>() {
                Ok(replica) => {
                    config.sync.replica_id = Some(replica);
                }
                Err(err) => {
                    tracing::warn!("invalid ANALYSES_DOC_REPLICA_ID, ignoring: {err}");
                }
            }
        }
    }
}

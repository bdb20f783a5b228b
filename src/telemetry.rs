//! Tracing subscriber setup: stderr output, rolling log files, retention.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::{FileLoggingConfig, LogFormat, LogRotation, LoggingConfig};
use crate::paths;

const LOG_FILE_PREFIX: &str = "analyses-doc.log";
const LOG_ENV: &str = "ANALYSES_DOC_LOG";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub verbosity: u8,
    pub logging: LoggingConfig,
}

impl TelemetryConfig {
    pub fn new(verbosity: u8, logging: LoggingConfig) -> Self {
        Self { verbosity, logging }
    }
}

/// Keeps the non-blocking file writer flushing until dropped.
pub struct TelemetryGuard {
    _file: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Install the global subscriber. A second call keeps the first subscriber.
pub fn init(config: TelemetryConfig) -> TelemetryGuard {
    let logging = &config.logging;
    let mut layers: Vec<BoxedLayer> = Vec::new();
    if logging.stderr {
        layers.push(format_layer(logging.stderr_format, std::io::stderr, true));
    }

    let mut file_guard = None;
    let mut notes: Vec<String> = Vec::new();
    if logging.file.enabled {
        match open_log_file(&logging.file) {
            Ok((layer, guard, pruned)) => {
                layers.push(layer);
                file_guard = Some(guard);
                notes.extend(pruned);
            }
            Err(err) => notes.push(err),
        }
    }
    layers.push(Box::new(build_filter(
        config.verbosity,
        logging.filter.as_deref(),
    )));

    if let Err(err) = Registry::default().with(layers).try_init() {
        tracing::debug!("global subscriber already set: {err}");
    }
    for note in notes {
        tracing::warn!("{note}");
    }

    TelemetryGuard { _file: file_guard }
}

/// `ANALYSES_DOC_LOG` wins over the configured filter; both fall back to the
/// verbosity level.
fn build_filter(verbosity: u8, configured: Option<&str>) -> EnvFilter {
    let builder =
        EnvFilter::builder().with_default_directive(level_from_verbosity(verbosity).into());
    match configured {
        Some(directives) if std::env::var_os(LOG_ENV).is_none() => {
            builder.parse_lossy(directives)
        }
        _ => builder.with_env_var(LOG_ENV).from_env_lossy(),
    }
}

fn level_from_verbosity(verbosity: u8) -> tracing::metadata::LevelFilter {
    match verbosity {
        0 => tracing::metadata::LevelFilter::WARN,
        1 => tracing::metadata::LevelFilter::INFO,
        2 => tracing::metadata::LevelFilter::DEBUG,
        _ => tracing::metadata::LevelFilter::TRACE,
    }
}

fn format_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Tree => Box::new(
            tracing_tree::HierarchicalLayer::new(2)
                .with_ansi(ansi)
                .with_targets(true)
                .with_writer(writer),
        ),
        LogFormat::Pretty => Box::new(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_ansi(ansi)
                .with_writer(writer),
        ),
        LogFormat::Compact => Box::new(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_ansi(ansi)
                .with_writer(writer),
        ),
        LogFormat::Json => Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(writer),
        ),
    }
}

/// Prepare the log directory, apply retention, and build the file layer.
/// Returns a retention note to log once the subscriber is up.
fn open_log_file(
    config: &FileLoggingConfig,
) -> Result<
    (
        BoxedLayer,
        tracing_appender::non_blocking::WorkerGuard,
        Option<String>,
    ),
    String,
> {
    let dir = config.dir.clone().unwrap_or_else(paths::log_dir);
    fs::create_dir_all(&dir)
        .map_err(|err| format!("log dir init failed for {}: {err}", dir.display()))?;

    let retention = Retention::from_file_config(config);
    let note = if retention.is_enabled() {
        match prune_logs(&dir, retention, SystemTime::now()) {
            Ok(0) => None,
            Ok(removed) => Some(format!("log retention removed {removed} file(s)")),
            Err(err) => Some(format!("log retention failed: {err}")),
        }
    } else {
        None
    };

    let rotation = match config.rotation {
        LogRotation::Daily => tracing_appender::rolling::Rotation::DAILY,
        LogRotation::Hourly => tracing_appender::rolling::Rotation::HOURLY,
        LogRotation::Minutely => tracing_appender::rolling::Rotation::MINUTELY,
        LogRotation::Never => tracing_appender::rolling::Rotation::NEVER,
    };
    let appender =
        tracing_appender::rolling::RollingFileAppender::new(rotation, &dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Ok((format_layer(config.format, writer, false), guard, note))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Retention {
    max_age: Option<Duration>,
    max_files: Option<usize>,
}

impl Retention {
    fn from_file_config(config: &FileLoggingConfig) -> Self {
        Self {
            max_age: config
                .retention_max_age_days
                .map(|days| Duration::from_secs(days.saturating_mul(24 * 60 * 60))),
            max_files: config.retention_max_files,
        }
    }

    fn is_enabled(&self) -> bool {
        self.max_age.is_some() || self.max_files.is_some()
    }

    /// `rank` 0 is the newest file.
    fn expired(&self, rank: usize, age: Duration) -> bool {
        self.max_age.is_some_and(|max| age > max) || self.max_files.is_some_and(|max| rank >= max)
    }
}

/// Removes rotated log files past the retention limits; returns how many went.
fn prune_logs(dir: &Path, retention: Retention, now: SystemTime) -> std::io::Result<usize> {
    let mut logs: Vec<(PathBuf, SystemTime)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let is_ours = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
        let meta = entry.metadata()?;
        if is_ours && meta.is_file() {
            logs.push((entry.path(), meta.modified().unwrap_or(now)));
        }
    }
    let doomed = select_expired(logs, retention, now);
    Ok(doomed
        .iter()
        .filter(|path| fs::remove_file(path).is_ok())
        .count())
}

fn select_expired(
    mut logs: Vec<(PathBuf, SystemTime)>,
    retention: Retention,
    now: SystemTime,
) -> Vec<PathBuf> {
    logs.sort_by(|a, b| b.1.cmp(&a.1));
    logs.into_iter()
        .enumerate()
        .filter(|(rank, (_, modified))| {
            let age = now.duration_since(*modified).unwrap_or(Duration::ZERO);
            retention.expired(*rank, age)
        })
        .map(|(_, (path, _))| path)
        .collect()
}

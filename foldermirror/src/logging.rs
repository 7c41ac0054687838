use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use time::format_description::well_known::Rfc3339;
use tracing::{Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_FILTER: &str = "info";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogConfig {
    pub activity: PathBuf,
    pub error: PathBuf,
}

impl LogConfig {
    pub fn in_dir(dir: &Path, activity_name: &str, error_name: &str) -> Self {
        Self {
            activity: dir.join(activity_name),
            error: dir.join(error_name),
        }
    }
}

/// Installs the process-wide subscriber built by [`subscriber`]. `RUST_LOG`
/// overrides the default `info` filter.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    subscriber(config, filter)?
        .try_init()
        .context("failed to install log subscriber")?;
    Ok(())
}

/// Every event goes to the activity log, warnings and errors additionally to
/// the error log. The console gets INFO and below on stdout and WARN and
/// above on stderr. Each line starts with an RFC 3339 UTC timestamp.
pub fn subscriber(
    config: &LogConfig,
    filter: EnvFilter,
) -> anyhow::Result<impl Subscriber + Send + Sync + 'static> {
    let activity = open_append(&config.activity)?;
    let errors = open_append(&config.error)?;

    let console = std::io::stderr
        .with_max_level(Level::WARN)
        .or_else(std::io::stdout);

    Ok(tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(UtcTime::new(Rfc3339))
                .with_writer(console),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(UtcTime::new(Rfc3339))
                .with_ansi(false)
                .with_writer(Mutex::new(activity)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(UtcTime::new(Rfc3339))
                .with_ansi(false)
                .with_writer(Mutex::new(errors).with_max_level(Level::WARN)),
        ))
}

fn open_append(path: &Path) -> anyhow::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

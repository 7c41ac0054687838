use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::logging::LogConfig;
use crate::sync::retry::{DEFAULT_MAX_RETRY_AFTER, RetryPolicy};
use crate::sync::transfer::TransferConfig;

const ACTIVITY_LOG_NAME: &str = "combined.log";
const ERROR_LOG_NAME: &str = "error.log";

#[derive(Clone, Debug)]
pub struct MirrorConfig {
    pub token: String,
    pub api_url: Option<String>,
    pub destination: PathBuf,
    pub log: LogConfig,
    pub transfer: TransferConfig,
    pub retry: RetryPolicy,
}

impl MirrorConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let token = std::env::var("FOLDERMIRROR_TOKEN")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .context("FOLDERMIRROR_TOKEN is not set")?;
        let api_url = std::env::var("FOLDERMIRROR_API_URL").ok();
        let cwd = std::env::current_dir().context("current directory is unavailable")?;
        let home = dirs::home_dir();
        let destination = read_path_env("FOLDERMIRROR_DESTINATION", home.as_deref())
            .unwrap_or_else(|| cwd.clone());
        let log_dir = read_path_env("FOLDERMIRROR_LOG_DIR", home.as_deref()).unwrap_or(cwd);

        let transfer = TransferConfig::default();
        let retry = RetryPolicy {
            max_retry_after: Duration::from_secs(read_u64_env(
                "FOLDERMIRROR_MAX_RETRY_AFTER_SECS",
                DEFAULT_MAX_RETRY_AFTER.as_secs(),
            )),
            max_rate_limit_retries: read_optional_u32_env("FOLDERMIRROR_MAX_RATE_LIMIT_RETRIES"),
        };

        Ok(Self {
            token,
            api_url,
            destination,
            log: LogConfig::in_dir(&log_dir, ACTIVITY_LOG_NAME, ERROR_LOG_NAME),
            transfer,
            retry,
        })
    }

    pub fn with_destination(mut self, destination: Option<PathBuf>) -> Self {
        if let Some(destination) = destination {
            self.destination = destination;
        }
        self
    }
}

fn read_path_env(name: &str, home: Option<&Path>) -> Option<PathBuf> {
    let value = std::env::var(name).ok().filter(|v| !v.trim().is_empty())?;
    Some(match home {
        Some(home) => expand_with_home(&value, home),
        None => PathBuf::from(value),
    })
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn read_u64_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn read_optional_u32_env(name: &str) -> Option<u32> {
    std::env::var(name).ok().and_then(|v| v.parse::<u32>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_tilde_to_home() {
        let home = PathBuf::from("/tmp/home-user");
        assert_eq!(
            expand_with_home("~/Mirror", &home),
            PathBuf::from("/tmp/home-user/Mirror")
        );
        assert_eq!(expand_with_home("~", &home), home);
        assert_eq!(expand_with_home("/srv/m", &home), PathBuf::from("/srv/m"));
    }

    #[test]
    fn reads_numbers_from_env_or_default() {
        assert_eq!(read_u64_env("NO_SUCH_ENV_FOR_TEST", 42), 42);
        assert_eq!(read_optional_u32_env("NO_SUCH_ENV_FOR_TEST"), None);
    }

    #[test]
    fn cli_destination_overrides_configured_one() {
        let config = MirrorConfig {
            token: "t".into(),
            api_url: None,
            destination: PathBuf::from("/from/env"),
            log: LogConfig::in_dir(Path::new("/logs"), ACTIVITY_LOG_NAME, ERROR_LOG_NAME),
            transfer: TransferConfig {
                download_concurrency: 1,
            },
            retry: RetryPolicy::default(),
        };

        let kept = config.clone().with_destination(None);
        assert_eq!(kept.destination, PathBuf::from("/from/env"));

        let overridden = config.with_destination(Some(PathBuf::from("/from/cli")));
        assert_eq!(overridden.destination, PathBuf::from("/from/cli"));
        assert_eq!(overridden.log.activity, PathBuf::from("/logs/combined.log"));
    }
}

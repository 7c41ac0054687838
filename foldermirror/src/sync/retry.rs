use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use foldermirror_core::DriveError;
use thiserror::Error;
use tracing::{error, info, warn};

use super::engine::{SyncError, SyncStats, Synchronizer};
use super::ledger::Ledger;
use super::remote::RemoteSource;

pub const DEFAULT_MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound applied to a server-supplied `retry-after`.
    pub max_retry_after: Duration,
    /// Cap on rate-limit resumes for one root. `None` keeps resuming for as
    /// long as the server sends a usable `retry-after`.
    pub max_rate_limit_retries: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retry_after: DEFAULT_MAX_RETRY_AFTER,
            max_rate_limit_retries: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RootFailure {
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("still rate limited after {retries} resumes: {source}")]
    RateLimitExhausted { retries: u32, source: SyncError },
    #[error("failed to resolve root folder {folder_id}: {source}")]
    Resolve {
        folder_id: String,
        source: DriveError,
    },
    #[error("failed to create local root {}: {source}", path.display())]
    LocalRoot { path: PathBuf, source: io::Error },
    #[error("root task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug)]
pub enum RunResult {
    Completed(SyncStats),
    Failed(RootFailure),
}

impl RunResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunResult::Completed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Attempting,
    RateLimited(Duration),
}

/// Runs the synchronizer for one root until it completes or fails for a
/// reason other than rate limiting. Every attempt shares one ledger, so a
/// resumed attempt re-lists folders but never re-downloads finished files.
pub struct RetryController<R> {
    synchronizer: Arc<Synchronizer<R>>,
    policy: RetryPolicy,
}

impl<R: RemoteSource> RetryController<R> {
    pub fn new(synchronizer: Arc<Synchronizer<R>>, policy: RetryPolicy) -> Self {
        Self {
            synchronizer,
            policy,
        }
    }

    pub async fn run(&self, root_id: &str, local_root: &Path) -> RunResult {
        self.run_with_ledger(root_id, local_root, &Ledger::new())
            .await
    }

    pub async fn run_with_ledger(
        &self,
        root_id: &str,
        local_root: &Path,
        ledger: &Ledger,
    ) -> RunResult {
        let mut retries = 0u32;
        let mut step = Step::Attempting;
        loop {
            match step {
                Step::RateLimited(wait) => {
                    tokio::time::sleep(wait).await;
                    step = Step::Attempting;
                }
                Step::Attempting => {
                    match self.synchronizer.sync(root_id, local_root, ledger).await {
                        Ok(stats) => {
                            info!(
                                root_id,
                                downloaded = stats.files_downloaded,
                                skipped = stats.files_skipped,
                                bytes = stats.bytes_written,
                                resumes = retries,
                                "root synchronized"
                            );
                            return RunResult::Completed(stats);
                        }
                        Err(err) => {
                            let Some(wait) = self.rate_limit_wait(&err) else {
                                error!(root_id, error = %err, "root failed");
                                return RunResult::Failed(err.into());
                            };
                            if self
                                .policy
                                .max_rate_limit_retries
                                .is_some_and(|max| retries >= max)
                            {
                                error!(root_id, retries, error = %err, "rate limit retries exhausted");
                                return RunResult::Failed(RootFailure::RateLimitExhausted {
                                    retries,
                                    source: err,
                                });
                            }
                            retries += 1;
                            warn!(
                                root_id,
                                wait_secs = wait.as_secs_f64(),
                                downloaded = ledger.len(),
                                error = %err,
                                "rate limited, resuming after wait"
                            );
                            step = Step::RateLimited(wait);
                        }
                    }
                }
            }
        }
    }

    fn rate_limit_wait(&self, err: &SyncError) -> Option<Duration> {
        let requested = err.remote_error()?.retry_after()?;
        if requested > self.policy.max_retry_after {
            warn!(
                requested_secs = requested.as_secs(),
                max_secs = self.policy.max_retry_after.as_secs(),
                "retry-after exceeds maximum, clamping"
            );
            return Some(self.policy.max_retry_after);
        }
        Some(requested)
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{Instrument, error, info, info_span};

use crate::sync::engine::{SyncError, Synchronizer, ensure_dir};
use crate::sync::paths::local_child_path;
use crate::sync::remote::{RemoteSource, TreeReader};
use crate::sync::retry::{RetryController, RetryPolicy, RootFailure, RunResult};
use crate::sync::transfer::{FileTransfer, TransferConfig};

#[derive(Debug)]
pub struct RootReport {
    pub root_id: String,
    pub local_root: Option<PathBuf>,
    pub result: RunResult,
}

/// Mirrors each requested root into `<destination>/<root folder name>`. Roots
/// run as independent tasks with their own ledger, retry loop and transfer
/// limit, so a failing or rate-limited root never holds up another.
pub struct RunCoordinator<R> {
    remote: Arc<R>,
    destination: PathBuf,
    policy: RetryPolicy,
    transfer: TransferConfig,
}

impl<R: RemoteSource + 'static> RunCoordinator<R> {
    pub fn new(remote: Arc<R>, destination: impl Into<PathBuf>) -> Self {
        Self {
            remote,
            destination: destination.into(),
            policy: RetryPolicy::default(),
            transfer: TransferConfig::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_transfer_config(mut self, transfer: TransferConfig) -> Self {
        self.transfer = transfer;
        self
    }

    pub async fn run(&self, root_ids: &[String]) -> Vec<RootReport> {
        let handles: Vec<_> = root_ids
            .iter()
            .map(|root_id| {
                let task = mirror_root(
                    Arc::clone(&self.remote),
                    self.destination.clone(),
                    self.policy,
                    self.transfer,
                    root_id.clone(),
                )
                .instrument(info_span!("root", id = %root_id));
                (root_id.clone(), tokio::spawn(task))
            })
            .collect();

        let mut reports = Vec::with_capacity(handles.len());
        for (root_id, handle) in handles {
            let report = match handle.await {
                Ok(report) => report,
                Err(err) => {
                    error!(root_id, error = %err, "root task aborted");
                    RootReport {
                        root_id,
                        local_root: None,
                        result: RunResult::Failed(RootFailure::Aborted(err.to_string())),
                    }
                }
            };
            reports.push(report);
        }

        let completed = reports.iter().filter(|r| r.result.is_completed()).count();
        info!(
            completed,
            failed = reports.len() - completed,
            "mirror run finished"
        );
        reports
    }
}

async fn mirror_root<R: RemoteSource>(
    remote: Arc<R>,
    destination: PathBuf,
    policy: RetryPolicy,
    transfer: TransferConfig,
    root_id: String,
) -> RootReport {
    let failed = |local_root: Option<PathBuf>, failure: RootFailure| {
        error!(error = %failure, "root failed");
        RootReport {
            root_id: root_id.clone(),
            local_root,
            result: RunResult::Failed(failure),
        }
    };

    let folder = match remote.folder(&root_id).await {
        Ok(folder) => folder,
        Err(source) => {
            return failed(
                None,
                RootFailure::Resolve {
                    folder_id: root_id.clone(),
                    source,
                },
            );
        }
    };
    let local_root = match local_child_path(&destination, &folder.name) {
        Ok(path) => path,
        Err(source) => {
            let err = SyncError::Path {
                folder_id: root_id.clone(),
                name: folder.name,
                source,
            };
            return failed(None, err.into());
        }
    };
    if let Err(err) = ensure_dir(&local_root).await {
        let failure = match err {
            SyncError::CreateDir { path, source } => RootFailure::LocalRoot { path, source },
            other => other.into(),
        };
        return failed(Some(local_root), failure);
    }

    info!(name = %folder.name, path = %local_root.display(), "mirroring root");
    let synchronizer = Synchronizer::with_parts(
        TreeReader::new(remote),
        FileTransfer::with_config(transfer),
    );
    let result = RetryController::new(Arc::new(synchronizer), policy)
        .run(&root_id, &local_root)
        .await;
    RootReport {
        root_id,
        local_root: Some(local_root),
        result,
    }
}

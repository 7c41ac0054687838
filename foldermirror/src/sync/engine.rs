use std::io;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use foldermirror_core::{DriveError, Entry, EntryKind};
use futures_util::future::{BoxFuture, join_all};
use thiserror::Error;
use tracing::{info, warn};

use super::ledger::Ledger;
use super::paths::{PathError, local_child_path};
use super::remote::{RemoteSource, TreeReader};
use super::transfer::{FileTransfer, TransferError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to list folder {folder_id}: {source}")]
    Listing {
        folder_id: String,
        source: DriveError,
    },
    #[error("failed to download file {file_id} to {}: {source}", path.display())]
    Transfer {
        file_id: String,
        path: PathBuf,
        source: TransferError,
    },
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("cannot mirror {name:?} from folder {folder_id}: {source}")]
    Path {
        folder_id: String,
        name: String,
        source: PathError,
    },
}

impl SyncError {
    pub fn remote_error(&self) -> Option<&DriveError> {
        match self {
            SyncError::Listing { source, .. } => Some(source),
            SyncError::Transfer { source, .. } => source.remote_error(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub files_downloaded: usize,
    pub files_skipped: usize,
    pub folders_visited: usize,
    pub bytes_written: u64,
}

impl AddAssign for SyncStats {
    fn add_assign(&mut self, other: Self) {
        self.files_downloaded += other.files_downloaded;
        self.files_skipped += other.files_skipped;
        self.folders_visited += other.folders_visited;
        self.bytes_written += other.bytes_written;
    }
}

pub struct Synchronizer<R> {
    reader: TreeReader<R>,
    transfer: FileTransfer,
}

impl<R: RemoteSource> Synchronizer<R> {
    pub fn new(remote: Arc<R>) -> Self {
        Self::with_parts(TreeReader::new(remote), FileTransfer::new())
    }

    pub fn with_parts(reader: TreeReader<R>, transfer: FileTransfer) -> Self {
        Self { reader, transfer }
    }

    pub fn remote(&self) -> &R {
        self.reader.remote()
    }

    /// Mirrors `folder_id` into the existing directory `local_dir`.
    ///
    /// Files already in `ledger` are skipped. Transfers and subfolder walks at
    /// one level run concurrently, and the call returns only after all of them
    /// have settled. The first failure is returned; later ones are logged.
    pub fn sync<'a>(
        &'a self,
        folder_id: &'a str,
        local_dir: &'a Path,
        ledger: &'a Ledger,
    ) -> BoxFuture<'a, Result<SyncStats, SyncError>> {
        Box::pin(async move {
            let children = self.reader.list_children(folder_id).await.map_err(|source| {
                SyncError::Listing {
                    folder_id: folder_id.to_string(),
                    source,
                }
            })?;

            let mut stats = SyncStats {
                folders_visited: 1,
                ..SyncStats::default()
            };
            let mut files = Vec::new();
            let mut folders = Vec::new();
            for entry in &children {
                match entry.kind {
                    EntryKind::File if ledger.has(&entry.id) => stats.files_skipped += 1,
                    EntryKind::File => files.push(entry),
                    EntryKind::Folder => folders.push(entry),
                    EntryKind::Other => {}
                }
            }

            let file_tasks = files
                .into_iter()
                .map(|entry| self.sync_file(folder_id, entry, local_dir, ledger));
            let folder_tasks = folders
                .into_iter()
                .map(|entry| self.sync_subfolder(folder_id, entry, local_dir, ledger));
            let (file_results, folder_results) =
                tokio::join!(join_all(file_tasks), join_all(folder_tasks));

            let mut first_error = None;
            for result in file_results.into_iter().chain(folder_results) {
                match result {
                    Ok(child) => stats += child,
                    Err(err) if first_error.is_none() => first_error = Some(err),
                    Err(err) => warn!(folder_id, error = %err, "additional failure in folder"),
                }
            }
            match first_error {
                Some(err) => Err(err),
                None => Ok(stats),
            }
        })
    }

    async fn sync_file(
        &self,
        folder_id: &str,
        entry: &Entry,
        local_dir: &Path,
        ledger: &Ledger,
    ) -> Result<SyncStats, SyncError> {
        let path = child_path(folder_id, entry, local_dir)?;
        let bytes = self
            .transfer
            .transfer(self.remote(), &entry.id, &path)
            .await
            .map_err(|source| {
                warn!(file_id = %entry.id, path = %path.display(), error = %source, "download failed");
                SyncError::Transfer {
                    file_id: entry.id.clone(),
                    path: path.clone(),
                    source,
                }
            })?;
        ledger.mark_downloaded(entry.id.as_str());
        info!(file_id = %entry.id, path = %path.display(), bytes, "downloaded file");
        Ok(SyncStats {
            files_downloaded: 1,
            bytes_written: bytes,
            ..SyncStats::default()
        })
    }

    async fn sync_subfolder(
        &self,
        folder_id: &str,
        entry: &Entry,
        local_dir: &Path,
        ledger: &Ledger,
    ) -> Result<SyncStats, SyncError> {
        let dir = child_path(folder_id, entry, local_dir)?;
        ensure_dir(&dir).await?;
        self.sync(&entry.id, &dir, ledger).await
    }
}

fn child_path(folder_id: &str, entry: &Entry, local_dir: &Path) -> Result<PathBuf, SyncError> {
    local_child_path(local_dir, &entry.name).map_err(|source| SyncError::Path {
        folder_id: folder_id.to_string(),
        name: entry.name.clone(),
        source,
    })
}

/// Creates `dir` and any missing parents; an existing directory is fine.
pub async fn ensure_dir(dir: &Path) -> Result<(), SyncError> {
    if tokio::fs::metadata(dir)
        .await
        .is_ok_and(|meta| meta.is_dir())
    {
        return Ok(());
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| SyncError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;

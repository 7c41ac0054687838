use std::{env, io, path::Path, sync::Arc};

use foldermirror_core::DriveError;
use futures_util::StreamExt;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;

use super::remote::RemoteSource;

const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 4;
const STAGING_PREFIX: &str = ".foldermirror-";

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("remote error: {0}")]
    Remote(#[from] DriveError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("concurrency limiter is closed")]
    ConcurrencyClosed,
}

impl TransferError {
    pub fn remote_error(&self) -> Option<&DriveError> {
        match self {
            TransferError::Remote(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    pub download_concurrency: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            download_concurrency: read_limit(
                "FOLDERMIRROR_DOWNLOAD_CONCURRENCY",
                DEFAULT_DOWNLOAD_CONCURRENCY,
            ),
        }
    }
}

#[derive(Clone)]
pub struct FileTransfer {
    download_limit: Arc<Semaphore>,
}

impl FileTransfer {
    pub fn new() -> Self {
        Self::with_config(TransferConfig::default())
    }

    pub fn with_config(config: TransferConfig) -> Self {
        Self {
            download_limit: Arc::new(Semaphore::new(config.download_concurrency.max(1))),
        }
    }

    /// Streams `file_id` into `target` and returns the number of bytes written.
    ///
    /// Bytes land in a freshly created hidden staging file next to `target`
    /// that is renamed onto it only after the source stream has ended and the
    /// data is synced, so an `Ok` means the file is complete on disk. The
    /// staging file is created exclusively under a random name and never
    /// clobbers an existing sibling.
    pub async fn transfer<R: RemoteSource>(
        &self,
        remote: &R,
        file_id: &str,
        target: &Path,
    ) -> Result<u64, TransferError> {
        let _permit = self
            .download_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransferError::ConcurrencyClosed)?;
        let mut stream = remote.open_file(file_id).await?;

        let (file, staged) = staging_file(target)?.into_parts();
        let mut file = tokio::fs::File::from_std(file);
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        // Dropping `staged` on any earlier return removes the staging file.
        staged.persist(target).map_err(io::Error::from)?;
        Ok(written)
    }
}

impl Default for FileTransfer {
    fn default() -> Self {
        Self::new()
    }
}

fn staging_file(target: &Path) -> io::Result<NamedTempFile> {
    let dir = target
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(".partial")
        .tempfile_in(dir)
}

fn read_limit(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

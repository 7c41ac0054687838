use std::future::Future;
use std::sync::Arc;

use foldermirror_core::{ByteStream, DriveClient, DriveError, Entry, Folder};
use tracing::debug;

pub const PAGE_SIZE: u64 = 1000;

/// Remote side of a mirror run: folder metadata, one page of a folder listing,
/// and the content of a single file.
pub trait RemoteSource: Send + Sync {
    fn folder(&self, folder_id: &str) -> impl Future<Output = Result<Folder, DriveError>> + Send;

    fn list_page(
        &self,
        folder_id: &str,
        offset: u64,
        limit: u64,
    ) -> impl Future<Output = Result<Vec<Entry>, DriveError>> + Send;

    fn open_file(
        &self,
        file_id: &str,
    ) -> impl Future<Output = Result<ByteStream, DriveError>> + Send;
}

impl RemoteSource for DriveClient {
    async fn folder(&self, folder_id: &str) -> Result<Folder, DriveError> {
        self.get_folder(folder_id).await
    }

    async fn list_page(
        &self,
        folder_id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Entry>, DriveError> {
        Ok(self
            .list_folder_items(folder_id, limit, offset)
            .await?
            .entries)
    }

    async fn open_file(&self, file_id: &str) -> Result<ByteStream, DriveError> {
        self.download(file_id).await
    }
}

pub struct TreeReader<R> {
    remote: Arc<R>,
    page_size: u64,
}

impl<R: RemoteSource> TreeReader<R> {
    pub fn new(remote: Arc<R>) -> Self {
        Self::with_page_size(remote, PAGE_SIZE)
    }

    pub fn with_page_size(remote: Arc<R>, page_size: u64) -> Self {
        Self {
            remote,
            page_size: page_size.max(1),
        }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Every child of `folder_id`, in page order. A page shorter than the page
    /// size ends the listing; any page failure is returned as is.
    pub async fn list_children(&self, folder_id: &str) -> Result<Vec<Entry>, DriveError> {
        let mut offset = 0u64;
        let mut children = Vec::new();
        loop {
            let page = self
                .remote
                .list_page(folder_id, offset, self.page_size)
                .await?;
            let fetched = page.len() as u64;
            children.extend(page);
            if fetched < self.page_size {
                break;
            }
            offset = offset.saturating_add(self.page_size);
        }
        debug!(folder_id, children = children.len(), "listed folder");
        Ok(children)
    }
}

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use foldermirror_core::{ByteStream, DriveError, Entry, EntryKind, Folder};
use futures_util::StreamExt;
use tokio::time::Instant;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

use super::remote::RemoteSource;

pub(crate) fn api_error(status: StatusCode, retry_after: Option<&str>) -> DriveError {
    let mut headers = HeaderMap::new();
    if let Some(value) = retry_after {
        headers.insert(RETRY_AFTER, HeaderValue::from_str(value).unwrap());
    }
    DriveError::Api {
        status,
        headers,
        body: String::new(),
    }
}

pub(crate) fn rate_limited(retry_after: Option<&str>) -> DriveError {
    api_error(StatusCode::TOO_MANY_REQUESTS, retry_after)
}

pub(crate) fn server_error() -> DriveError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, None)
}

#[derive(Default)]
struct FakeFolder {
    name: String,
    children: Vec<Entry>,
}

#[derive(Default)]
struct State {
    folders: HashMap<String, FakeFolder>,
    files: HashMap<String, Vec<u8>>,
    folder_failures: HashMap<String, VecDeque<DriveError>>,
    list_failures: HashMap<String, VecDeque<DriveError>>,
    open_failures: HashMap<String, VecDeque<DriveError>>,
    stream_failures: HashMap<String, VecDeque<DriveError>>,
    page_calls: HashMap<String, Vec<u64>>,
    opens: HashMap<String, usize>,
    opened_at: HashMap<String, Vec<Instant>>,
    chunk_delay: Option<Duration>,
}

/// Counts open content streams; the count drops when a stream is dropped.
#[derive(Default)]
struct StreamGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

struct OpenStream(Arc<StreamGauge>);

impl OpenStream {
    fn new(gauge: &Arc<StreamGauge>) -> Self {
        let now = gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
        gauge.peak.fetch_max(now, Ordering::SeqCst);
        Self(Arc::clone(gauge))
    }
}

impl Drop for OpenStream {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory folder tree with scriptable one-shot failures.
#[derive(Default)]
pub(crate) struct FakeRemote {
    state: Mutex<State>,
    streams: Arc<StreamGauge>,
}

impl FakeRemote {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_folder(&self, id: &str, name: &str, parent: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        state.folders.insert(
            id.to_string(),
            FakeFolder {
                name: name.to_string(),
                children: Vec::new(),
            },
        );
        if let Some(parent) = parent {
            push_child(&mut state, parent, id, name, EntryKind::Folder);
        }
    }

    pub(crate) fn add_file(&self, id: &str, name: &str, parent: &str, content: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.files.insert(id.to_string(), content.to_vec());
        push_child(&mut state, parent, id, name, EntryKind::File);
    }

    pub(crate) fn add_other(&self, id: &str, name: &str, parent: &str) {
        let mut state = self.state.lock().unwrap();
        push_child(&mut state, parent, id, name, EntryKind::Other);
    }

    pub(crate) fn fail_folder(&self, folder_id: &str, err: DriveError) {
        let mut state = self.state.lock().unwrap();
        queue_failure(&mut state.folder_failures, folder_id, err);
    }

    /// Each content chunk is delayed by `delay`, keeping streams open.
    pub(crate) fn delay_chunks(&self, delay: Duration) {
        self.state.lock().unwrap().chunk_delay = Some(delay);
    }

    pub(crate) fn fail_listing(&self, folder_id: &str, err: DriveError) {
        let mut state = self.state.lock().unwrap();
        queue_failure(&mut state.list_failures, folder_id, err);
    }

    pub(crate) fn fail_open(&self, file_id: &str, err: DriveError) {
        let mut state = self.state.lock().unwrap();
        queue_failure(&mut state.open_failures, file_id, err);
    }

    pub(crate) fn fail_stream(&self, file_id: &str, err: DriveError) {
        let mut state = self.state.lock().unwrap();
        queue_failure(&mut state.stream_failures, file_id, err);
    }

    pub(crate) fn page_offsets(&self, folder_id: &str) -> Vec<u64> {
        let state = self.state.lock().unwrap();
        state.page_calls.get(folder_id).cloned().unwrap_or_default()
    }

    pub(crate) fn open_count(&self, file_id: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.opens.get(file_id).copied().unwrap_or(0)
    }

    pub(crate) fn total_opens(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.opens.values().sum()
    }

    pub(crate) fn opened_at(&self, file_id: &str) -> Vec<Instant> {
        let state = self.state.lock().unwrap();
        state.opened_at.get(file_id).cloned().unwrap_or_default()
    }

    /// Largest number of content streams that were open at the same time.
    pub(crate) fn peak_open_streams(&self) -> usize {
        self.streams.peak.load(Ordering::SeqCst)
    }
}

impl RemoteSource for FakeRemote {
    async fn folder(&self, folder_id: &str) -> Result<Folder, DriveError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = next_failure(&mut state.folder_failures, folder_id) {
            return Err(err);
        }
        match state.folders.get(folder_id) {
            Some(folder) => Ok(Folder {
                id: folder_id.to_string(),
                name: folder.name.clone(),
            }),
            None => Err(api_error(StatusCode::NOT_FOUND, None)),
        }
    }

    async fn list_page(
        &self,
        folder_id: &str,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Entry>, DriveError> {
        let mut state = self.state.lock().unwrap();
        state
            .page_calls
            .entry(folder_id.to_string())
            .or_default()
            .push(offset);
        if let Some(err) = next_failure(&mut state.list_failures, folder_id) {
            return Err(err);
        }
        let Some(folder) = state.folders.get(folder_id) else {
            return Err(api_error(StatusCode::NOT_FOUND, None));
        };
        Ok(folder
            .children
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn open_file(&self, file_id: &str) -> Result<ByteStream, DriveError> {
        let mut state = self.state.lock().unwrap();
        *state.opens.entry(file_id.to_string()).or_default() += 1;
        state
            .opened_at
            .entry(file_id.to_string())
            .or_default()
            .push(Instant::now());
        if let Some(err) = next_failure(&mut state.open_failures, file_id) {
            return Err(err);
        }
        let Some(content) = state.files.get(file_id).cloned() else {
            return Err(api_error(StatusCode::NOT_FOUND, None));
        };
        let (head, tail) = content.split_at(content.len() / 2);
        let mut chunks = vec![Ok(Bytes::copy_from_slice(head))];
        match next_failure(&mut state.stream_failures, file_id) {
            Some(err) => chunks.push(Err(err)),
            None => chunks.push(Ok(Bytes::copy_from_slice(tail))),
        }
        let delay = state.chunk_delay;
        let open = OpenStream::new(&self.streams);
        Ok(futures_util::stream::iter(chunks)
            .then(move |chunk| async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                chunk
            })
            .map(move |chunk| {
                let _open = &open;
                chunk
            })
            .boxed())
    }
}

fn push_child(state: &mut State, parent: &str, id: &str, name: &str, kind: EntryKind) {
    state
        .folders
        .entry(parent.to_string())
        .or_default()
        .children
        .push(Entry {
            id: id.to_string(),
            name: name.to_string(),
            kind,
        });
}

fn queue_failure(
    failures: &mut HashMap<String, VecDeque<DriveError>>,
    id: &str,
    err: DriveError,
) {
    failures.entry(id.to_string()).or_default().push_back(err);
}

fn next_failure(
    failures: &mut HashMap<String, VecDeque<DriveError>>,
    id: &str,
) -> Option<DriveError> {
    failures.get_mut(id).and_then(VecDeque::pop_front)
}

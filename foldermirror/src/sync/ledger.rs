use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// File ids already mirrored during one root's run, shared by every attempt
/// for that root. Entries are never removed.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, file_id: &str) -> bool {
        self.lock().contains(file_id)
    }

    /// Returns `false` when the id was already present.
    pub fn mark_downloaded(&self, file_id: impl Into<String>) -> bool {
        self.lock().insert(file_id.into())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Inserts are atomic, so a poisoned set is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Thread-safe set of frame ids.
///
/// Every operation takes the internal lock exactly once. Use
/// [`insert`](Self::insert) rather than `contains` followed by `add` when
/// the caller needs "add if absent" semantics.
#[derive(Debug, Default)]
pub struct IdSet {
    ids: Mutex<HashSet<u16>>,
}

impl IdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, id: u16) {
        self.lock().insert(id);
    }

    /// Insert `id`, returning true if it was not already present.
    pub fn insert(&self, id: u16) -> bool {
        self.lock().insert(id)
    }

    pub fn contains(&self, id: u16) -> bool {
        self.lock().contains(&id)
    }

    /// Remove `id`, returning true if it was present.
    pub fn remove(&self, id: u16) -> bool {
        self.lock().remove(&id)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<u16>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

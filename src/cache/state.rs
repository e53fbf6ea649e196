//! The local view of the subscribed task list.

use crate::types::{Generation, Task};
use parking_lot::RwLock;
use std::collections::HashSet;

use super::watch::{CacheEvent, CacheWatch, CacheWatchers, WatchId};

/// Everything a consumer can observe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheState {
    /// Tasks in display order.
    pub records: Vec<Task>,
    /// True until the first snapshot (or failure) of a session.
    pub loading: bool,
    /// Fatal failure message.
    pub error: Option<String>,
    /// Degraded-mode notice.
    pub warning: Option<String>,
}

impl Default for CacheState {
    /// Nothing known yet: empty and loading.
    fn default() -> Self {
        Self {
            records: Vec::new(),
            loading: true,
            error: None,
            warning: None,
        }
    }
}

struct CacheInner {
    state: CacheState,
    /// Generation whose events are accepted (None = none accepted).
    active: Option<Generation>,
    revision: u64,
}

/// Sole writer of [`CacheState`].
///
/// Records only change through [`apply_snapshot`](Self::apply_snapshot) or
/// a session reset; writes elsewhere are observed through the next snapshot.
pub struct LocalStateCache {
    inner: RwLock<CacheInner>,
    watchers: CacheWatchers,
}

impl LocalStateCache {
    pub fn new(watch_buffer_size: usize) -> Self {
        Self {
            inner: RwLock::new(CacheInner {
                state: CacheState::default(),
                active: None,
                revision: 0,
            }),
            watchers: CacheWatchers::new(watch_buffer_size),
        }
    }

    // --- Session lifecycle ---

    /// Begin accepting events for `generation`. Records are emptied and
    /// the cache is loading until the first snapshot arrives.
    pub fn activate(&self, generation: Generation) {
        let event = {
            let mut inner = self.inner.write();
            let removed = ids(&inner.state.records);
            inner.active = Some(generation);
            inner.state = CacheState::default();
            inner.revision += 1;
            CacheEvent::Changed {
                revision: inner.revision,
                added: Vec::new(),
                removed,
                total: 0,
            }
        };
        self.watchers.broadcast(event);
    }

    /// Stop accepting events. Current contents are left in place.
    pub fn deactivate(&self) {
        self.inner.write().active = None;
    }

    /// Signed out: stop accepting events and show an empty, idle list.
    pub fn clear(&self) {
        {
            let mut inner = self.inner.write();
            inner.active = None;
            inner.state = CacheState {
                records: Vec::new(),
                loading: false,
                error: None,
                warning: None,
            };
            inner.revision += 1;
        }
        self.watchers.broadcast(CacheEvent::Cleared);
    }

    // --- Stream events ---

    /// Replace the records wholesale with a snapshot.
    ///
    /// Returns false (and changes nothing) if `generation` is not active.
    pub fn apply_snapshot(&self, generation: Generation, records: Vec<Task>) -> bool {
        let event = {
            let mut inner = self.inner.write();
            if inner.active != Some(generation) {
                tracing::debug!(%generation, "Discarding stale snapshot");
                return false;
            }

            let before: HashSet<&str> = inner.state.records.iter().map(|t| t.id.as_str()).collect();
            let after: HashSet<&str> = records.iter().map(|t| t.id.as_str()).collect();
            let added = records
                .iter()
                .filter(|t| !before.contains(t.id.as_str()))
                .map(|t| t.id.clone())
                .collect();
            let removed = inner
                .state
                .records
                .iter()
                .filter(|t| !after.contains(t.id.as_str()))
                .map(|t| t.id.clone())
                .collect();

            let total = records.len();
            inner.state.records = records;
            inner.state.loading = false;
            inner.state.error = None;
            inner.revision += 1;
            CacheEvent::Changed {
                revision: inner.revision,
                added,
                removed,
                total,
            }
        };
        self.watchers.broadcast(event);
        true
    }

    /// Record a stream failure: `error` if fatal, otherwise `warning`.
    /// Records are left as last known.
    ///
    /// Returns false (and changes nothing) if `generation` is not active.
    pub fn apply_error(&self, generation: Generation, message: &str, fatal: bool) -> bool {
        {
            let mut inner = self.inner.write();
            if inner.active != Some(generation) {
                tracing::debug!(%generation, "Discarding stale stream error");
                return false;
            }
            inner.state.loading = false;
            if fatal {
                inner.state.error = Some(message.to_string());
            } else {
                inner.state.warning = Some(message.to_string());
            }
            inner.revision += 1;
        }
        self.watchers.broadcast(CacheEvent::Error {
            message: message.to_string(),
            fatal,
        });
        true
    }

    /// Record a degraded-mode notice. `loading` and records are untouched,
    /// so a session still waiting for its first snapshot keeps loading.
    ///
    /// Returns false (and changes nothing) if `generation` is not active.
    pub fn set_warning(&self, generation: Generation, message: &str) -> bool {
        {
            let mut inner = self.inner.write();
            if inner.active != Some(generation) {
                tracing::debug!(%generation, "Discarding stale warning");
                return false;
            }
            inner.state.warning = Some(message.to_string());
            inner.revision += 1;
        }
        self.watchers.broadcast(CacheEvent::Error {
            message: message.to_string(),
            fatal: false,
        });
        true
    }

    // --- Mutation outcomes ---

    /// Surface a rejected write. Independent of any subscription.
    pub fn record_write_failure(&self, message: &str) {
        {
            let mut inner = self.inner.write();
            inner.state.error = Some(message.to_string());
            inner.revision += 1;
        }
        self.watchers.broadcast(CacheEvent::Error {
            message: message.to_string(),
            fatal: true,
        });
    }

    /// Forget a previous fatal error.
    pub fn clear_error(&self) {
        let mut inner = self.inner.write();
        if inner.state.error.take().is_some() {
            inner.revision += 1;
        }
    }

    // --- Reads ---

    pub fn state(&self) -> CacheState {
        self.inner.read().state.clone()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.inner.read().state.records.clone()
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.inner
            .read()
            .state
            .records
            .iter()
            .find(|t| t.id == id)
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().state.records.iter().any(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().state.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn loading(&self) -> bool {
        self.inner.read().state.loading
    }

    pub fn error(&self) -> Option<String> {
        self.inner.read().state.error.clone()
    }

    pub fn warning(&self) -> Option<String> {
        self.inner.read().state.warning.clone()
    }

    /// Generation currently accepted, if any.
    pub fn generation(&self) -> Option<Generation> {
        self.inner.read().active
    }

    /// Bumped on every observable change.
    pub fn revision(&self) -> u64 {
        self.inner.read().revision
    }

    // --- Watchers ---

    pub fn watch(&self) -> CacheWatch {
        self.watchers.watch()
    }

    pub fn unwatch(&self, id: WatchId) {
        self.watchers.unwatch(id)
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.count()
    }
}

fn ids(records: &[Task]) -> Vec<String> {
    records.iter().map(|t| t.id.clone()).collect()
}

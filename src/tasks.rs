//! Task list facade tying identity, subscriptions, cache and writes together.

use crate::cache::{CacheEvent, CacheState, CacheWatch, LocalStateCache, DEFAULT_WATCH_BUFFER};
use crate::identity::{IdentityChange, IdentityProvider, IdentityWatch};
use crate::mutation::MutationGateway;
use crate::remote::RemoteStore;
use crate::sync::{DecodePolicy, Mode, SubscriptionManager};
use crate::types::{Identity, Task, TaskUpdate};
use std::sync::Arc;
use std::time::Duration;

/// Warning shown while tasks come from the unordered fallback query.
pub const DEGRADED_WARNING: &str =
    "Loaded tasks without ordering - some tasks may be missing timestamps";

/// Sync configuration.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Remote collection holding tasks.
    /// Default: "tasks"
    pub collection: String,

    /// Warning recorded when falling back to the unordered query.
    pub degraded_warning: String,

    /// Max buffered events per cache watcher before it is dropped.
    /// Default: 256
    pub watch_buffer_size: usize,

    /// How incoming documents are validated.
    pub decode_policy: DecodePolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            collection: "tasks".to_string(),
            degraded_warning: DEGRADED_WARNING.to_string(),
            watch_buffer_size: DEFAULT_WATCH_BUFFER,
            decode_policy: DecodePolicy::default(),
        }
    }
}

/// The signed-in user's live task list.
///
/// Provides:
/// - Read access to tasks, loading flag, error and warning
/// - `add_task`, `update_task`, `delete_task` reporting success as a bool
/// - Identity tracking: signing in or out restarts or clears the list
///
/// All cache changes happen inside [`pump`](Self::pump), which must be
/// called from the owning thread to process identity changes and snapshots.
pub struct TaskSync {
    cache: Arc<LocalStateCache>,
    identity_watch: IdentityWatch,
    current: Option<Identity>,
    subscriptions: SubscriptionManager,
    mutations: MutationGateway,
}

impl TaskSync {
    /// Create the facade and subscribe for whoever is signed in now.
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        identity: Arc<dyn IdentityProvider>,
        config: SyncConfig,
    ) -> Self {
        let cache = Arc::new(LocalStateCache::new(config.watch_buffer_size));
        let identity_watch = identity.watch();
        let mutations = MutationGateway::new(
            Arc::clone(&remote),
            Arc::clone(&identity),
            Arc::clone(&cache),
            config.collection.clone(),
        );
        let subscriptions = SubscriptionManager::new(remote, Arc::clone(&cache), config);

        let mut sync = Self {
            cache,
            identity_watch,
            current: None,
            subscriptions,
            mutations,
        };
        sync.on_identity_changed(identity.current());
        sync
    }

    /// Process pending identity changes, then pending stream events.
    /// Returns the number of stream events applied.
    pub fn pump(&mut self) -> usize {
        while let Ok(IdentityChange { current, .. }) = self.identity_watch.try_recv() {
            self.on_identity_changed(current);
        }
        self.subscriptions.pump()
    }

    /// Like [`pump`](Self::pump), but wait up to `timeout` for a stream event.
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        while let Ok(IdentityChange { current, .. }) = self.identity_watch.try_recv() {
            self.on_identity_changed(current);
        }
        self.subscriptions.pump_timeout(timeout)
    }

    /// Switch to `identity`. The previous session is stopped before the new
    /// one starts.
    pub fn on_identity_changed(&mut self, identity: Option<Identity>) {
        let old = self.current.take();
        self.subscriptions
            .on_identity_changed(old.as_ref(), identity.as_ref());
        self.current = identity;
    }

    /// Stop the subscription. The cache keeps its last contents.
    pub fn shutdown(&mut self) {
        self.subscriptions.stop();
    }

    // --- Reads ---

    pub fn tasks(&self) -> Vec<Task> {
        self.cache.tasks()
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.cache.task(id)
    }

    pub fn loading(&self) -> bool {
        self.cache.loading()
    }

    pub fn error(&self) -> Option<String> {
        self.cache.error()
    }

    pub fn warning(&self) -> Option<String> {
        self.cache.warning()
    }

    pub fn state(&self) -> CacheState {
        self.cache.state()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.current.as_ref()
    }

    /// Mode of the current subscription, if any.
    pub fn mode(&self) -> Option<Mode> {
        self.subscriptions.mode()
    }

    pub fn cache(&self) -> Arc<LocalStateCache> {
        Arc::clone(&self.cache)
    }

    pub fn watch(&self) -> CacheWatch {
        self.cache.watch()
    }

    // --- Writes ---

    /// Create a task. Appears in [`tasks`](Self::tasks) after a later pump.
    pub fn add_task(&self, title: &str, description: &str) -> bool {
        match self.mutations.create(title, description) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Add task failed");
                false
            }
        }
    }

    pub fn update_task(&self, id: &str, update: &TaskUpdate) -> bool {
        match self.mutations.update(id, update) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(task_id = %id, error = %e, "Update task failed");
                false
            }
        }
    }

    /// Delete a task. It stays in [`tasks`](Self::tasks) until a snapshot
    /// without it is pumped.
    pub fn delete_task(&self, id: &str) -> bool {
        match self.mutations.delete(id) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(task_id = %id, error = %e, "Delete task failed");
                false
            }
        }
    }
}

/// A detail view of one task that closes when the task disappears.
#[derive(Debug, Default)]
pub struct DetailView {
    open: Option<String>,
}

impl DetailView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, id: impl Into<String>) {
        self.open = Some(id.into());
    }

    pub fn close(&mut self) {
        self.open = None;
    }

    pub fn current(&self) -> Option<&str> {
        self.open.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Current contents of the open task.
    pub fn task(&self, cache: &LocalStateCache) -> Option<Task> {
        self.open.as_deref().and_then(|id| cache.task(id))
    }

    /// Close if the open task is no longer in the cache.
    /// Returns true if the view was closed.
    pub fn reconcile(&mut self, cache: &LocalStateCache) -> bool {
        match self.open.as_deref() {
            Some(id) if !cache.contains(id) => {
                self.open = None;
                true
            }
            _ => false,
        }
    }

    /// Close if `event` removed the open task or cleared the cache.
    /// Returns true if the view was closed.
    pub fn on_event(&mut self, event: &CacheEvent) -> bool {
        let Some(id) = self.open.as_deref() else {
            return false;
        };
        let gone = match event {
            CacheEvent::Changed { removed, .. } => removed.iter().any(|r| r == id),
            CacheEvent::Cleared => true,
            CacheEvent::Error { .. } | CacheEvent::Dropped { .. } => false,
        };
        if gone {
            self.open = None;
        }
        gone
    }
}

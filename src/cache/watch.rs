//! Change notifications for cache observers.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default number of buffered events before a watcher is dropped.
pub const DEFAULT_WATCH_BUFFER: usize = 256;

/// Events emitted when the cache changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheEvent {
    /// Records were replaced (new snapshot or new session).
    Changed {
        revision: u64,
        /// Ids present now that were not before.
        added: Vec<String>,
        /// Ids that were present before and are gone now.
        removed: Vec<String>,
        total: usize,
    },

    /// An error or warning was recorded.
    Error { message: String, fatal: bool },

    /// Signed out; the cache is empty and idle.
    Cleared,

    /// The watcher was dropped.
    Dropped { reason: DropReason },
}

/// Why a watcher was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unwatched.
    Unwatched,
}

/// Unique identifier for a watcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// Handle to receive cache events.
pub struct CacheWatch {
    pub id: WatchId,
    pub receiver: Receiver<CacheEvent>,
}

impl CacheWatch {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<CacheEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<CacheEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<CacheEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<CacheEvent> {
        self.receiver.try_iter().collect()
    }
}

/// Registry of cache watchers.
pub(crate) struct CacheWatchers {
    watchers: RwLock<HashMap<WatchId, Sender<CacheEvent>>>,
    next_id: AtomicU64,
    buffer_size: usize,
}

impl CacheWatchers {
    pub(crate) fn new(buffer_size: usize) -> Self {
        Self {
            watchers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer_size: buffer_size.max(1),
        }
    }

    pub(crate) fn watch(&self) -> CacheWatch {
        let id = WatchId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(self.buffer_size);
        self.watchers.write().insert(id, sender);
        CacheWatch { id, receiver }
    }

    pub(crate) fn unwatch(&self, id: WatchId) {
        if let Some(sender) = self.watchers.write().remove(&id) {
            let _ = sender.try_send(CacheEvent::Dropped {
                reason: DropReason::Unwatched,
            });
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.watchers.read().len()
    }

    /// Send to every watcher. Full or disconnected watchers are removed.
    pub(crate) fn broadcast(&self, event: CacheEvent) {
        let mut overflowed = Vec::new();
        let mut disconnected = Vec::new();

        {
            let watchers = self.watchers.read();
            for (id, sender) in watchers.iter() {
                match sender.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => overflowed.push(*id),
                    Err(TrySendError::Disconnected(_)) => disconnected.push(*id),
                }
            }
        }

        if overflowed.is_empty() && disconnected.is_empty() {
            return;
        }

        let mut watchers = self.watchers.write();
        for id in disconnected {
            watchers.remove(&id);
        }
        for id in overflowed {
            if let Some(sender) = watchers.remove(&id) {
                tracing::warn!(watch_id = id.0, "Dropping slow cache watcher");
                let _ = sender.try_send(CacheEvent::Dropped {
                    reason: DropReason::BufferOverflow,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_unwatch() {
        let watchers = CacheWatchers::new(8);
        let handle = watchers.watch();
        assert_eq!(watchers.count(), 1);

        watchers.unwatch(handle.id);
        assert_eq!(watchers.count(), 0);
        assert_eq!(
            handle.try_recv().unwrap(),
            CacheEvent::Dropped {
                reason: DropReason::Unwatched
            }
        );
    }

    #[test]
    fn test_drop_slow_watcher() {
        let watchers = CacheWatchers::new(2);
        let _handle = watchers.watch();

        for _ in 0..10 {
            watchers.broadcast(CacheEvent::Cleared);
        }

        assert_eq!(watchers.count(), 0);
    }

    #[test]
    fn test_disconnected_watcher_removed() {
        let watchers = CacheWatchers::new(8);
        let handle = watchers.watch();
        drop(handle);

        watchers.broadcast(CacheEvent::Cleared);
        assert_eq!(watchers.count(), 0);
    }
}

//! Remote store interface.
//!
//! The remote store is the authoritative source of tasks. It offers two
//! primitives:
//! - Live, owner-scoped subscriptions that deliver full snapshots
//! - Writes (create, update, delete) that resolve to success or failure
//!
//! Snapshots are complete listings, never deltas. A listener may be invoked
//! from any thread, including synchronously from inside `subscribe` or
//! `write`, so listeners must not call back into the store.
//!
//! # Example
//!
//! ```ignore
//! let store = MemoryStore::new(MemoryStoreConfig::default());
//! let query = TaskQuery::owned_by("tasks", "u1").ordered(OrderBy::created_desc());
//!
//! let registration = store.subscribe(query, Box::new(|event| match event {
//!     StreamEvent::Snapshot(docs) => println!("{} tasks", docs.len()),
//!     StreamEvent::Error(message) => eprintln!("stream failed: {}", message),
//! }))?;
//!
//! registration.remove();
//! ```

mod memory;

pub use memory::{MemoryStore, MemoryStoreConfig};

use crate::error::Result;
use crate::types::{Document, TaskQuery};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::fmt;

/// Event delivered to a subscription listener.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Complete current result set of the query.
    Snapshot(Vec<Document>),
    /// The stream failed. No further events follow.
    Error(String),
}

/// Callback receiving stream events.
pub type Listener = Box<dyn Fn(StreamEvent) + Send + Sync>;

/// A write against the remote store.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    Create {
        collection: String,
        fields: Map<String, Value>,
    },
    /// Merges `fields` into an existing document.
    Update {
        collection: String,
        id: String,
        fields: Map<String, Value>,
    },
    Delete {
        collection: String,
        id: String,
    },
}

impl WriteOp {
    pub fn kind(&self) -> &'static str {
        match self {
            WriteOp::Create { .. } => "create",
            WriteOp::Update { .. } => "update",
            WriteOp::Delete { .. } => "delete",
        }
    }
}

/// Acknowledgement of a committed write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteAck {
    /// Id of the document written (assigned by the store on create).
    pub id: String,
}

/// Authoritative remote document store.
pub trait RemoteStore: Send + Sync {
    /// Start a live query. The listener receives snapshots until the
    /// registration is removed or the stream reports an error.
    fn subscribe(&self, query: TaskQuery, listener: Listener) -> Result<ListenerRegistration>;

    /// Perform a write, blocking until the store confirms or rejects it.
    fn write(&self, op: WriteOp) -> Result<WriteAck>;
}

/// Handle to an active listener. Removing it (or dropping it) detaches
/// the listener from the store.
pub struct ListenerRegistration {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ListenerRegistration {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// A registration with nothing to cancel.
    pub fn detached() -> Self {
        Self {
            cancel: Mutex::new(None),
        }
    }

    /// Detach the listener. Calling this more than once is a no-op.
    pub fn remove(&self) {
        let cancel = self.cancel.lock().take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.lock().is_some()
    }
}

impl Drop for ListenerRegistration {
    fn drop(&mut self) {
        self.remove();
    }
}

impl fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("active", &self.is_active())
            .finish()
    }
}

//! # Task Sync
//!
//! Keeps a signed-in user's task list mirrored from a remote document store
//! through a live subscription.
//!
//! ## Core Concepts
//!
//! - **Sessions**: One owner-scoped subscription at a time, tagged with a
//!   generation so events from superseded sessions are discarded
//! - **Fallback**: If the ordered query fails, an unordered query takes over
//!   and snapshots are sorted locally, with a warning
//! - **Cache**: The only mutable view, replaced wholesale by each snapshot
//! - **Mutations**: Writes go to the store and are observed via snapshots
//!
//! ## Example
//!
//! ```ignore
//! use task_sync::{MemoryStore, SessionIdentity, SyncConfig, TaskSync, Identity};
//!
//! let store = Arc::new(MemoryStore::default());
//! let session = Arc::new(SessionIdentity::signed_in(Identity::new("u1")));
//! let mut sync = TaskSync::new(store, session, SyncConfig::default());
//!
//! sync.add_task("Write report", "Due Friday");
//! sync.pump();
//! assert_eq!(sync.tasks()[0].title, "Write report");
//! ```

pub mod cache;
pub mod error;
pub mod identity;
pub mod mutation;
pub mod remote;
pub mod sync;
pub mod tasks;
pub mod types;

// Re-exports
pub use cache::{CacheEvent, CacheState, CacheWatch, DropReason, LocalStateCache, WatchId};
pub use error::{Result, SyncError};
pub use identity::{IdentityChange, IdentityProvider, IdentityWatch, SessionIdentity};
pub use mutation::MutationGateway;
pub use remote::{
    Listener, ListenerRegistration, MemoryStore, MemoryStoreConfig, RemoteStore, StreamEvent,
    WriteAck, WriteOp,
};
pub use sync::{
    decode_document, decode_snapshot, sort_newest_first, DecodePolicy, DecodeReport,
    DroppedDocument, FallbackController, MissingField, Mode, SubscriptionManager,
};
pub use tasks::{DetailView, SyncConfig, TaskSync, DEGRADED_WARNING};
pub use types::*;

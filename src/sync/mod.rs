//! Live synchronization of one owner's tasks into the local cache.
//!
//! A session subscribes to the owner's tasks ordered newest first. If the
//! store cannot serve the ordered query, the session falls back to an
//! unordered query and sorts each snapshot locally:
//! - `Primary`: ordered query, store order used as-is
//! - `Degraded`: unordered query, sorted by creation time, warning shown
//! - `Failed`: unordered query failed too, fatal error shown
//!
//! Raw documents pass through a strict decode step before reaching the
//! cache; see [`DecodePolicy`] for the per-field rules.
//!
//! # Example
//!
//! ```ignore
//! let mut manager = SubscriptionManager::new(remote, Arc::clone(&cache), SyncConfig::default());
//!
//! manager.start(&Identity::new("u1"));
//! manager.pump();
//! for task in cache.tasks() {
//!     println!("{}", task.title);
//! }
//! ```

mod decode;
mod fallback;
mod manager;

pub use decode::{decode_document, decode_snapshot, DecodePolicy, DecodeReport, DroppedDocument, MissingField};
pub use fallback::{sort_newest_first, FallbackController, Mode};
pub use manager::SubscriptionManager;

//! Local mirror of the remote task list.
//!
//! The cache is the only mutable state consumers see:
//! - Records, replaced wholesale by each accepted snapshot
//! - A loading flag, a fatal error and a degraded-mode warning
//!
//! Every stream event carries the generation of the subscription that
//! produced it. The cache accepts only the active generation, so events from
//! a superseded subscription can never leak into the current view.
//!
//! Observers can read the state at any time or register a watcher to be told
//! about changes:
//!
//! ```ignore
//! let watch = cache.watch();
//! while let Ok(event) = watch.recv() {
//!     if let CacheEvent::Changed { removed, .. } = event {
//!         // close any detail view showing a removed task
//!     }
//! }
//! ```

mod state;
mod watch;

pub use state::{CacheState, LocalStateCache};
pub use watch::{CacheEvent, CacheWatch, DropReason, WatchId, DEFAULT_WATCH_BUFFER};

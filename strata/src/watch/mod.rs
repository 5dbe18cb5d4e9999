//! Staleness detection for resources and the caches derived from them.
//!
//! - [`ResourceWatcher`] polls one resource's modification time and fires a
//!   handler when it moves, with a poll interval and a post-fire hold-off.
//! - [`DerivativeCache`] attaches a watcher to each cached value and drops the
//!   value once its source changes.

mod derivative;
mod watcher;

pub use derivative::DerivativeCache;
pub use watcher::{ChangeHandler, ResourceWatcher, WatchOutcome, DEFAULT_POLL_INTERVAL};

//! Polling change detection for a single resource.
//!
//! # State
//!
//! ```text
//!            check() / refresh()
//!   Unset ─────────────────────────► fire handler (first call always fires)
//!
//!   Seen(mtime) ── mtime unchanged ──► no-op
//!        │
//!        └──── mtime changed ──────► fire handler
//!                                      ├─ Handled { hold_off } → adopt new mtime,
//!                                      │                         suppress checks for hold_off
//!                                      └─ Failed { retry_after } → keep old mtime,
//!                                                                  retry after retry_after
//! ```
//!
//! `check()` honors the poll interval and the hold-off window. `refresh()`
//! ignores both and is meant for callers that need a synchronous answer,
//! such as a cache about to hand out a derived value.

use std::fmt;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;

use crate::resource::{Resource, ResourceRef};

/// Default minimum time between two polls of the same resource.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Result of a change handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The change was processed. Further checks are suppressed for `hold_off`.
    Handled {
        /// Quiet period after handling. Zero fires again on the next change.
        hold_off: Duration,
    },

    /// Processing failed. The same change is retried after `retry_after`.
    Failed {
        /// Delay before the change is offered again.
        retry_after: Duration,
    },
}

impl WatchOutcome {
    /// Handled, with no hold-off.
    pub const fn handled() -> Self {
        WatchOutcome::Handled {
            hold_off: Duration::ZERO,
        }
    }

    /// Decode a signed millisecond result.
    ///
    /// Non-negative values are a hold-off after success; negative values are
    /// a retry delay after failure.
    pub fn from_millis(millis: i64) -> Self {
        if millis >= 0 {
            WatchOutcome::Handled {
                hold_off: Duration::from_millis(millis.unsigned_abs()),
            }
        } else {
            WatchOutcome::Failed {
                retry_after: Duration::from_millis(millis.unsigned_abs()),
            }
        }
    }
}

/// Reacts to a detected change.
pub trait ChangeHandler: Send {
    /// Called once per detected change, with the watched resource.
    fn on_change(&mut self, resource: &dyn Resource) -> WatchOutcome;
}

impl<F> ChangeHandler for F
where
    F: FnMut(&dyn Resource) -> WatchOutcome + Send,
{
    fn on_change(&mut self, resource: &dyn Resource) -> WatchOutcome {
        self(resource)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Baseline {
    /// Nothing observed yet; the next check counts as a change.
    Unset,
    /// Last modification time the handler accepted.
    Seen(Option<SystemTime>),
}

struct WatchState {
    baseline: Baseline,
    last_checked: Option<Instant>,
    hold_off_until: Option<Instant>,
    handler: Box<dyn ChangeHandler>,
}

/// Watches one resource's modification time and fires a handler on change.
///
/// All operations on one watcher are serialized, including the handler call.
/// Separate watchers over the same resource do not coordinate.
pub struct ResourceWatcher {
    resource: ResourceRef,
    poll_interval: Duration,
    state: Mutex<WatchState>,
}

impl ResourceWatcher {
    /// Watch `resource`, polling at most every [`DEFAULT_POLL_INTERVAL`].
    pub fn new(resource: ResourceRef, handler: impl ChangeHandler + 'static) -> Self {
        Self {
            resource,
            poll_interval: DEFAULT_POLL_INTERVAL,
            state: Mutex::new(WatchState {
                baseline: Baseline::Unset,
                last_checked: None,
                hold_off_until: None,
                handler: Box::new(handler),
            }),
        }
    }

    /// Set the minimum time between polls.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// The watched resource.
    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    /// Minimum time between polls.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Poll if due, firing the handler on change.
    ///
    /// Returns `true` if the handler ran.
    pub fn check(&self) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();

        if state.hold_off_until.is_some_and(|until| now < until) {
            return false;
        }
        if state
            .last_checked
            .is_some_and(|last| now < last + self.poll_interval)
        {
            return false;
        }

        self.fire_if_changed(&mut state, now)
    }

    /// Poll now, ignoring the poll interval and any hold-off.
    ///
    /// Returns `true` if the handler ran.
    pub fn refresh(&self) -> bool {
        let mut state = self.state.lock();
        self.fire_if_changed(&mut state, Instant::now())
    }

    /// Adopt the resource's current modification time without firing.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.baseline = Baseline::Seen(self.resource.last_modified());
        state.last_checked = Some(Instant::now());
        state.hold_off_until = None;
    }

    fn fire_if_changed(&self, state: &mut WatchState, now: Instant) -> bool {
        state.last_checked = Some(now);

        let current = self.resource.last_modified();
        let changed = match state.baseline {
            Baseline::Unset => true,
            Baseline::Seen(previous) => previous != current,
        };
        if !changed {
            return false;
        }

        match state.handler.on_change(self.resource.as_ref()) {
            WatchOutcome::Handled { hold_off } => {
                state.baseline = Baseline::Seen(current);
                state.hold_off_until = (!hold_off.is_zero()).then(|| now + hold_off);
                tracing::debug!(
                    uri = %self.resource.uri(),
                    hold_off_ms = hold_off.as_millis() as u64,
                    "Change handled"
                );
            }
            WatchOutcome::Failed { retry_after } => {
                state.hold_off_until = Some(now + retry_after);
                tracing::debug!(
                    uri = %self.resource.uri(),
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Change handler failed, will retry"
                );
            }
        }
        true
    }
}

impl fmt::Debug for ResourceWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceWatcher")
            .field("uri", &self.resource.uri().as_str())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

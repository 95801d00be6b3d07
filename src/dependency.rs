//! C3 — the dependency coordinator.
//!
//! A service's starter calls `wait_for` once per declared predecessor before handing off to the
//! runner. The marker set (not the live registry) is consulted so that a predecessor which has
//! already exited still unblocks its dependents.

use std::thread;
use std::time::{Duration, Instant};

use crate::constants::DEPENDENCY_POLL_INTERVAL as POLL_INTERVAL;
use crate::registry::{CancelHandle, StartedMarkers};

/// The result of waiting on one predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The predecessor started and the post-start delay elapsed.
    Ready,
    /// Global cancellation fired while waiting.
    Cancelled,
    /// `dependency_wait` elapsed before the predecessor started.
    TimedOut,
}

/// Block until `dependency_name` has been marked started, then sleep `extra_delay`
/// (interruptible), bounded overall by `deadline` from the moment this call began.
pub fn wait_for(
    markers: &StartedMarkers,
    cancel: &CancelHandle,
    dependency_name: &str,
    extra_delay: Duration,
    deadline: Duration,
) -> WaitOutcome {
    let started_at = Instant::now();

    loop {
        if cancel.is_cancelled() {
            return WaitOutcome::Cancelled;
        }
        if markers.is_started(dependency_name) {
            break;
        }
        if started_at.elapsed() >= deadline {
            return WaitOutcome::TimedOut;
        }
        thread::sleep(POLL_INTERVAL.min(deadline.saturating_sub(started_at.elapsed())));
    }

    interruptible_sleep(cancel, extra_delay)
}

/// Sleep `duration` in small increments so a concurrent cancellation is observed promptly.
fn interruptible_sleep(cancel: &CancelHandle, duration: Duration) -> WaitOutcome {
    let step = Duration::from_millis(100);
    let mut remaining = duration;
    while remaining > Duration::ZERO {
        if cancel.is_cancelled() {
            return WaitOutcome::Cancelled;
        }
        let this_step = step.min(remaining);
        thread::sleep(this_step);
        remaining -= this_step;
    }
    if cancel.is_cancelled() {
        WaitOutcome::Cancelled
    } else {
        WaitOutcome::Ready
    }
}

/// Wait on every predecessor in `dependencies`, applying each one's delay sequentially. Returns
/// the first non-`Ready` outcome encountered, or `Ready` once all predecessors have cleared.
pub fn wait_for_all(
    markers: &StartedMarkers,
    cancel: &CancelHandle,
    dependencies: &[(String, Duration)],
    deadline: Duration,
) -> WaitOutcome {
    for (dependency_name, extra_delay) in dependencies {
        match wait_for(markers, cancel, dependency_name, *extra_delay, deadline) {
            WaitOutcome::Ready => continue,
            other => return other,
        }
    }
    WaitOutcome::Ready
}

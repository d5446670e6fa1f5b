//! In-flight call tracker
//!
//! Every hook body holds an [`InFlightGuard`] for its whole duration.
//! Teardown flips the shutdown flag and then spins until the counter drains,
//! which tells it no thread is still executing inside a detour.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::{Duration, Instant};

/// Process-wide tracker used by all hook bodies
pub static TRACKER: ActivityTracker = ActivityTracker::new();

/// Counter of executing hook bodies plus a shutdown flag
#[derive(Debug)]
pub struct ActivityTracker {
    active: AtomicI32,
    shutting_down: AtomicBool,
}

impl ActivityTracker {
    pub const fn new() -> Self {
        Self {
            active: AtomicI32::new(0),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Mark a hook body as entered
    ///
    /// The counter is bumped before the flag is read, so a drain that observes
    /// zero after `shutdown` can never miss a body that decided to invoke.
    #[inline]
    pub fn enter(&self) -> InFlightGuard<'_> {
        self.active.fetch_add(1, Ordering::SeqCst);
        let invoke = !self.shutting_down.load(Ordering::SeqCst);
        InFlightGuard {
            tracker: self,
            invoke,
        }
    }

    /// Stop user callbacks for every body entered from now on
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Re-arm for a new session
    pub fn reset(&self) {
        self.shutting_down.store(false, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> i32 {
        self.active.load(Ordering::SeqCst)
    }

    /// Yield-spin until no body is in flight or `timeout` elapses
    ///
    /// Never blocks on a kernel object. A zero timeout checks exactly once.
    pub fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.active.load(Ordering::SeqCst) <= 0 {
                return true;
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    "Drain timed out with {} call(s) in flight",
                    self.active.load(Ordering::SeqCst)
                );
                return false;
            }
            std::thread::yield_now();
        }
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped marker for one executing hook body
///
/// `invoke` is captured at construction and decides both the pre and the
/// post callback, so they fire as a pair or not at all.
#[must_use]
pub struct InFlightGuard<'t> {
    tracker: &'t ActivityTracker,
    invoke: bool,
}

impl InFlightGuard<'_> {
    #[inline]
    pub fn invoke(&self) -> bool {
        self.invoke
    }
}

impl Drop for InFlightGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.tracker.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};

    #[test]
    fn test_guard_counts() {
        let tracker = ActivityTracker::new();
        {
            let a = tracker.enter();
            let _b = tracker.enter();
            assert_eq!(tracker.active(), 2);
            assert!(a.invoke());
        }
        assert_eq!(tracker.active(), 0);
        assert!(tracker.drain(Duration::ZERO));
    }

    #[test]
    fn test_guard_captures_flag_at_entry() {
        let tracker = ActivityTracker::new();
        let before = tracker.enter();
        tracker.shutdown();
        let after = tracker.enter();

        assert!(before.invoke());
        assert!(!after.invoke());
        assert_eq!(tracker.active(), 2);

        drop(before);
        drop(after);
        tracker.reset();
        assert!(tracker.enter().invoke());
    }

    #[test]
    fn test_zero_timeout_drain_reports_in_flight() {
        let tracker = ActivityTracker::new();
        let _guard = tracker.enter();
        tracker.shutdown();
        assert!(!tracker.drain(Duration::ZERO));
    }

    #[test]
    fn test_drain_waits_for_release() {
        let tracker = Arc::new(ActivityTracker::new());
        let barrier = Arc::new(Barrier::new(2));

        let t = tracker.clone();
        let b = barrier.clone();
        let worker = std::thread::spawn(move || {
            let _guard = t.enter();
            b.wait();
            std::thread::sleep(Duration::from_millis(50));
        });

        barrier.wait();
        tracker.shutdown();
        assert!(tracker.drain(Duration::from_secs(5)));
        assert_eq!(tracker.active(), 0);
        worker.join().unwrap();
    }

    #[test]
    fn test_pre_post_symmetry_under_shutdown() {
        let tracker = Arc::new(ActivityTracker::new());
        let pre = Arc::new(AtomicUsize::new(0));
        let post = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let (t, pre, post) = (tracker.clone(), pre.clone(), post.clone());
                std::thread::spawn(move || {
                    for _ in 0..2_000 {
                        let guard = t.enter();
                        if guard.invoke() {
                            pre.fetch_add(1, Ordering::SeqCst);
                        }
                        std::hint::spin_loop();
                        if guard.invoke() {
                            post.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();

        std::thread::sleep(Duration::from_millis(1));
        tracker.shutdown();
        for w in workers {
            w.join().unwrap();
        }

        assert!(tracker.drain(Duration::ZERO));
        assert_eq!(pre.load(Ordering::SeqCst), post.load(Ordering::SeqCst));
    }
}

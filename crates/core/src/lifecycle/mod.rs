//! Lifecycle and shutdown coordination
//!
//! Three triggers can end a session, each in a different safety context:
//!
//! - [`ShutdownOrigin::ExplicitTerminate`]: the host called its
//!   process-termination primitive. User code may run, the worker is waited
//!   for and terminated past the join timeout.
//! - [`ShutdownOrigin::QuitNotification`]: the host posted its quit
//!   notification. Same rules as above.
//! - [`ShutdownOrigin::ModuleDetach`]: this module is being unloaded, likely
//!   under the loader lock. No user callbacks, no blocking removal, no wait
//!   beyond a single check.
//!
//! Whichever fires first disables the others, and a per-session flag makes
//! the cleanup run at most once.

pub mod triggers;
pub(crate) mod worker;

use std::fmt;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use rendergate_engine::process;

use crate::hooks::TRACKER;
use crate::session::EngineSession;

/// Which trigger started the shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownOrigin {
    ExplicitTerminate,
    QuitNotification,
    ModuleDetach,
}

impl ShutdownOrigin {
    /// True when user code and blocking waits are allowed
    pub fn allows_user_code(self) -> bool {
        self != ShutdownOrigin::ModuleDetach
    }

    fn message(self) -> &'static str {
        match self {
            ShutdownOrigin::ExplicitTerminate => {
                "Host process is terminating, performing pre-detach clean-up"
            }
            ShutdownOrigin::QuitNotification => {
                "Quit notification received, performing pre-detach clean-up"
            }
            ShutdownOrigin::ModuleDetach => "Module detaching, performing minimal clean-up",
        }
    }
}

impl fmt::Display for ShutdownOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What a [`shutdown`] call did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownOutcome {
    /// False when another trigger already performed the cleanup
    pub performed: bool,
    /// Origin after loader-lock downgrading
    pub origin: ShutdownOrigin,
    /// Result of the immediate drain check, module-detach path only
    pub drained: Option<bool>,
    /// Whether the worker finished within the wait
    pub worker_exited: bool,
}

/// Cancellation, readiness and completion signals of one worker
///
/// Readiness and completion are latches: the worker drops the sender and
/// every later receive observes the disconnect immediately.
pub(crate) struct WorkerSignals {
    cancel_tx: Sender<ShutdownOrigin>,
    cancel_rx: Receiver<ShutdownOrigin>,
    ready_tx: Mutex<Option<Sender<()>>>,
    ready_rx: Receiver<()>,
    done_tx: Mutex<Option<Sender<()>>>,
    done_rx: Receiver<()>,
}

impl WorkerSignals {
    pub(crate) fn new() -> Self {
        let (cancel_tx, cancel_rx) = bounded(1);
        let (ready_tx, ready_rx) = bounded(0);
        let (done_tx, done_rx) = bounded(0);
        Self {
            cancel_tx,
            cancel_rx,
            ready_tx: Mutex::new(Some(ready_tx)),
            ready_rx,
            done_tx: Mutex::new(Some(done_tx)),
            done_rx,
        }
    }

    /// Wake the worker; only the first origin is kept
    pub(crate) fn cancel(&self, origin: ShutdownOrigin) -> bool {
        self.cancel_tx.try_send(origin).is_ok()
    }

    /// Block until cancelled
    pub(crate) fn wait_cancel(&self) -> ShutdownOrigin {
        self.cancel_rx.recv().unwrap_or(ShutdownOrigin::ModuleDetach)
    }

    pub(crate) fn take_ready(&self) -> Option<Sender<()>> {
        self.ready_tx.lock().take()
    }

    pub(crate) fn take_done(&self) -> Option<Sender<()>> {
        self.done_tx.lock().take()
    }

    pub(crate) fn wait_ready(&self, timeout: Duration) -> bool {
        latched(&self.ready_rx, timeout)
    }

    pub(crate) fn wait_done(&self, timeout: Duration) -> bool {
        latched(&self.done_rx, timeout)
    }

    pub(crate) fn is_done(&self) -> bool {
        latched(&self.done_rx, Duration::ZERO)
    }
}

fn latched(rx: &Receiver<()>, timeout: Duration) -> bool {
    if timeout.is_zero() {
        return rx.try_recv().is_err_and(|e| e.is_disconnected());
    }
    matches!(rx.recv_timeout(timeout), Err(RecvTimeoutError::Disconnected))
}

/// Run the shutdown sequence for `session`
///
/// Safe to call from any trigger and any number of times; only the first
/// call does work.
pub fn shutdown(session: &EngineSession, origin: ShutdownOrigin) -> ShutdownOutcome {
    let origin = if origin.allows_user_code() && process::loader_lock_held() {
        tracing::warn!("{} while holding the loader lock, downgrading to module detach", origin);
        ShutdownOrigin::ModuleDetach
    } else {
        origin
    };

    let span = tracing::info_span!("shutdown", origin = ?origin);
    let _enter = span.enter();

    let mut outcome = ShutdownOutcome {
        performed: false,
        origin,
        drained: None,
        worker_exited: session.signals().is_done(),
    };

    if session.cleanup_started.swap(true, Ordering::AcqRel) {
        tracing::debug!("Clean-up already performed, ignoring");
        return outcome;
    }
    outcome.performed = true;
    tracing::info!("{}", origin.message());

    triggers::remove_others(origin);

    if origin.allows_user_code() {
        session.notify_pre_exit();
    }

    session.signals().cancel(origin);

    if origin == ShutdownOrigin::ModuleDetach {
        // Callbacks stop here; the worker drains and removes on its own time
        TRACKER.shutdown();
        outcome.drained = Some(TRACKER.drain(Duration::ZERO));
        outcome.worker_exited = session.signals().is_done();
    } else {
        outcome.worker_exited = session.signals().wait_done(session.config().timeouts.worker_join());
        let worker = session.take_worker();
        match worker {
            Some(handle) if outcome.worker_exited => {
                if handle.join().is_err() {
                    tracing::error!("Worker thread panicked during clean-up");
                }
                tracing::info!("Worker shutdown complete");
            }
            Some(handle) => {
                tracing::error!("Worker hasn't finished clean-up within expected time, terminating");
                if !process::terminate_thread(&handle) {
                    tracing::error!("Forced termination unsupported, abandoning worker");
                }
            }
            None => {}
        }
    }

    if let Some(pin) = session.take_pin() {
        pin.release();
    }

    outcome
}

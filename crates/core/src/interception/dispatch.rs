//! Session access from hook bodies
//!
//! Hook bodies are free functions with no `self`. They reach the attached
//! session through one published pointer, and only while holding an
//! [`InFlightGuard`] whose `invoke` flag was captured as true. The worker
//! retracts the pointer after the tracker drained, so a reference handed out
//! here never outlives the session.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use crate::hooks::{InFlightGuard, TRACKER};
use crate::session::EngineSession;

/// `E_FAIL`, returned when a hook body runs without an original
pub(crate) const E_FAIL: i32 = 0x8000_4005_u32 as i32;

static ACTIVE: AtomicPtr<EngineSession> = AtomicPtr::new(ptr::null_mut());

/// Make `session` visible to hook bodies
pub(crate) fn publish(session: &Arc<EngineSession>) {
    let raw = Arc::into_raw(session.clone()) as *mut EngineSession;
    let previous = ACTIVE.swap(raw, Ordering::AcqRel);
    if !previous.is_null() {
        tracing::warn!("Replacing a dispatch session that was never retracted");
        // Leaked on purpose: a stale body may still hold it
    }
}

/// Hide `session` from hook bodies
///
/// The reference taken by [`publish`] is dropped only when `drained` is true.
/// Otherwise a body may still be reading it and it is leaked instead.
pub(crate) fn retract(session: &EngineSession, drained: bool) -> bool {
    let raw = session as *const EngineSession as *mut EngineSession;
    if ACTIVE
        .compare_exchange(raw, ptr::null_mut(), Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return false;
    }
    if drained {
        // SAFETY: `raw` came from Arc::into_raw in `publish`
        drop(unsafe { Arc::from_raw(raw as *const EngineSession) });
    } else {
        tracing::warn!("Calls still in flight, leaking the dispatch reference");
    }
    true
}

pub fn is_published() -> bool {
    !ACTIVE.load(Ordering::Acquire).is_null()
}

/// One hook body's view of the engine
pub(crate) struct Dispatch {
    _guard: InFlightGuard<'static>,
    session: *const EngineSession,
}

impl Dispatch {
    #[inline]
    pub(crate) fn enter() -> Self {
        let guard = TRACKER.enter();
        let session = if guard.invoke() {
            ACTIVE.load(Ordering::Acquire) as *const EngineSession
        } else {
            ptr::null()
        };
        Self {
            _guard: guard,
            session,
        }
    }

    /// The attached session, if user callbacks may run for this call
    #[inline]
    pub(crate) fn session(&self) -> Option<&EngineSession> {
        // SAFETY: retraction waits for the guard we hold to drop
        unsafe { self.session.as_ref() }
    }
}

/// Pre callback, forwarded call, post callback
///
/// `$active` is an `Option<(callbacks, extension)>` captured once, so both
/// callbacks see the same table and fire as a pair.
macro_rules! around {
    ($active:expr, $pre:ident, $post:ident, ($($arg:expr),*), $call:expr) => {{
        if let Some((callbacks, extension)) = &$active {
            if let Some(callback) = callbacks.$pre {
                callback($($arg,)* extension);
            }
        }
        let result = $call;
        if let Some((callbacks, extension)) = &$active {
            if let Some(callback) = callbacks.$post {
                callback($($arg,)* extension);
            }
        }
        result
    }};
}

pub(crate) use around;

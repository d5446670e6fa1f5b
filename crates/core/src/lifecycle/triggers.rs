//! Process shutdown triggers
//!
//! The host's process-termination primitive and its quit notification are
//! hooked so cleanup can run before this module is unloaded under the
//! loader lock. Trigger bodies are not tracked by the in-flight counter:
//! they wait for the worker, which drains that counter.

use rendergate_engine::LifecycleTargets;

use super::{shutdown, ShutdownOrigin};
use crate::session;
use crate::static_hook;

type TerminateFn = unsafe extern "system" fn(u32);
type QuitFn = unsafe extern "system" fn(i32);

static_hook!(pub(crate) terminate: TerminateFn);
static_hook!(pub(crate) quit: QuitFn);

/// Hook whichever triggers the catalog exposes
pub(crate) fn install(session: &session::EngineSession, targets: LifecycleTargets) -> usize {
    let patcher = session.patcher();
    let mut installed = 0;

    if let Some(target) = targets.terminate {
        if unsafe { TERMINATE_HOOK.install(patcher, target, on_terminate as TerminateFn) }.is_ok() {
            installed += 1;
        }
    }
    if let Some(target) = targets.quit {
        if unsafe { QUIT_HOOK.install(patcher, target, on_quit as QuitFn) }.is_ok() {
            installed += 1;
        }
    }

    if installed == 0 {
        tracing::warn!("No shutdown trigger hooked, relying on module detach");
    }
    installed
}

/// Disable the triggers other than the one that fired
pub(crate) fn remove_others(origin: ShutdownOrigin) {
    let result = match origin {
        ShutdownOrigin::ExplicitTerminate => QUIT_HOOK.remove(),
        ShutdownOrigin::QuitNotification => TERMINATE_HOOK.remove(),
        ShutdownOrigin::ModuleDetach => {
            remove_nothrow();
            Ok(())
        }
    };
    if let Err(e) = result {
        tracing::warn!("Failed to disable the other shutdown trigger: {}", e);
    }
}

/// Unhook both triggers without blocking
pub(crate) fn remove_nothrow() -> bool {
    let quit = QUIT_HOOK.remove_nothrow();
    let terminate = TERMINATE_HOOK.remove_nothrow();
    quit && terminate
}

pub fn is_armed() -> (bool, bool) {
    (TERMINATE_HOOK.is_applied(), QUIT_HOOK.is_applied())
}

unsafe extern "system" fn on_terminate(exit_code: u32) {
    if let Some(session) = session::EngineSession::current() {
        shutdown(&session, ShutdownOrigin::ExplicitTerminate);
    }
    // Nothing of this library may be relied upon once the original runs
    if let Some(original) = terminate_original() {
        original(exit_code);
    }
}

unsafe extern "system" fn on_quit(exit_code: i32) {
    if let Some(session) = session::EngineSession::current() {
        shutdown(&session, ShutdownOrigin::QuitNotification);
    }
    if let Some(original) = quit_original() {
        original(exit_code);
    }
}

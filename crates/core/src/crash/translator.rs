//! Per-thread fault translation
//!
//! A thread that calls [`install`] can wrap risky work in [`guard`], which
//! turns a hardware fault (access violation, bus error, illegal instruction,
//! arithmetic trap) or a panic inside it into an ordinary `Err`.
//!
//! Hardware faults are caught by a small native shim: `__try` on Windows,
//! `sigsetjmp` plus a resuming signal handler on Unix. The frames between the
//! fault and the guard are abandoned, so anything they owned is leaked and
//! any lock they held stays held. The global panic hook stays quiet for
//! panics that a guard is about to translate.

use std::any::Any;
use std::cell::Cell;
use std::ffi::{c_uint, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;

use super::report::exception_name;

thread_local! {
    static INSTALLED: Cell<bool> = const { Cell::new(false) };
    static DEPTH: Cell<u32> = const { Cell::new(0) };
    /// Jump buffer of the innermost guard, owned by the native shim
    static RESUME: Cell<*mut c_void> = const { Cell::new(ptr::null_mut()) };
}

mod native {
    use std::ffi::{c_uint, c_void};

    pub type GuardedFn = unsafe extern "C" fn(*mut c_void);

    extern "C" {
        pub fn rg_guard_call(f: GuardedFn, data: *mut c_void, slot: *mut *mut c_void) -> c_uint;

        #[cfg(unix)]
        pub fn rg_guard_resume(env: *mut c_void, signal: std::ffi::c_int) -> !;
    }
}

/// Fault converted into a recoverable error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Fault translated on this thread: {message}")]
pub struct FaultError {
    /// Exception code of a hardware fault, `None` for a panic
    pub code: Option<u32>,
    pub message: String,
}

impl FaultError {
    fn hardware(code: u32) -> Self {
        Self {
            code: Some(code),
            message: format!("{} ({:#010X})", exception_name(code), code),
        }
    }

    fn panic(message: String) -> Self {
        Self {
            code: None,
            message,
        }
    }
}

pub fn install() {
    INSTALLED.with(|i| i.set(true));
    #[cfg(unix)]
    signals::ensure_registered();
}

pub fn uninstall() {
    INSTALLED.with(|i| i.set(false));
}

pub fn is_installed() -> bool {
    INSTALLED.with(Cell::get)
}

/// True while a fault on this thread would be caught by [`guard`]
pub fn is_translating() -> bool {
    is_installed() && DEPTH.with(Cell::get) > 0
}

struct Call<F, R> {
    f: Option<F>,
    result: Option<std::thread::Result<R>>,
}

unsafe extern "C" fn trampoline<F, R>(data: *mut c_void)
where
    F: FnOnce() -> R,
{
    let call = &mut *(data as *mut Call<F, R>);
    if let Some(f) = call.f.take() {
        // Panics stop here; only hardware faults cross the native frame
        call.result = Some(catch_unwind(AssertUnwindSafe(f)));
    }
}

/// Run `f`, translating a fault into [`FaultError`] on installed threads
///
/// On other threads `f` runs unguarded: a panic propagates and a hardware
/// fault reaches the process-wide handlers.
pub fn guard<F, R>(f: F) -> Result<R, FaultError>
where
    F: FnOnce() -> R,
{
    if !is_installed() {
        return Ok(f());
    }

    let mut call = Call {
        f: Some(f),
        result: None,
    };
    let slot = RESUME.with(Cell::as_ptr);

    DEPTH.with(|d| d.set(d.get() + 1));
    // SAFETY: `call` outlives the native call and matches the trampoline's types
    let code = unsafe {
        native::rg_guard_call(
            trampoline::<F, R>,
            &mut call as *mut Call<F, R> as *mut c_void,
            slot,
        )
    };
    DEPTH.with(|d| d.set(d.get() - 1));

    let error = match (code, call.result) {
        (0, Some(Ok(value))) => return Ok(value),
        (0, Some(Err(payload))) => FaultError::panic(panic_message(payload.as_ref())),
        (0, None) => FaultError::panic("guarded call did not run".to_string()),
        (raw, _) => FaultError::hardware(fault_code(raw)),
    };
    tracing::warn!("{}", error);
    Err(error)
}

#[cfg(unix)]
fn fault_code(signal: c_uint) -> u32 {
    super::handlers::unix::code_for(signal as std::ffi::c_int)
}

#[cfg(windows)]
fn fault_code(code: c_uint) -> u32 {
    code
}

/// Jump back into the innermost [`guard`] of this thread
///
/// Returns only when the thread is not translating.
///
/// # Safety
/// Must be called from a synchronous fault handler running on the faulting
/// thread.
#[cfg(unix)]
pub(crate) unsafe fn resume_guarded(signal: std::ffi::c_int) {
    if !is_translating() {
        return;
    }
    let env = RESUME.with(Cell::get);
    if !env.is_null() {
        native::rg_guard_resume(env, signal);
    }
}

#[cfg(unix)]
mod signals {
    use std::ffi::{c_int, c_void};

    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
    use parking_lot::Mutex;

    use crate::crash::handlers::unix as reporting;
    use crate::crash::hazard::HazardCell;

    const TRANSLATED: [Signal; 4] = [
        Signal::SIGSEGV,
        Signal::SIGBUS,
        Signal::SIGILL,
        Signal::SIGFPE,
    ];

    static CHAIN: HazardCell<Vec<(Signal, SigAction)>> = HazardCell::new();
    static REGISTRATION: Mutex<()> = parking_lot::const_mutex(());

    /// Put a resuming handler in front of every translated signal
    ///
    /// Signals already routed to the reporting handler are left alone; it
    /// resumes guarded threads itself.
    pub(super) fn ensure_registered() {
        let _registration = REGISTRATION.lock();
        let action = SigAction::new(
            SigHandler::SigAction(on_fault),
            SaFlags::SA_SIGINFO | SaFlags::SA_ONSTACK,
            SigSet::empty(),
        );

        let mut chain = CHAIN.read(Vec::clone).unwrap_or_default();
        let mut changed = false;
        for signal in TRANSLATED {
            let current = reporting::current_action(signal).sa_sigaction;
            if current == on_fault as usize || reporting::is_fault_handler(current) {
                continue;
            }
            // SAFETY: on_fault only resumes guards and chains
            match unsafe { sigaction(signal, &action) } {
                Ok(old) => {
                    chain.retain(|(s, _)| *s != signal);
                    chain.push((signal, old));
                    changed = true;
                }
                Err(e) => tracing::warn!("Failed to route {} to the translator: {}", signal, e),
            }
        }
        if changed {
            CHAIN.publish(Some(Box::new(chain)));
        }
    }

    extern "C" fn on_fault(signal: c_int, info: *mut libc::siginfo_t, ucontext: *mut c_void) {
        unsafe {
            super::resume_guarded(signal);
            let previous = reporting::previous_handler(&CHAIN, signal);
            reporting::forward(previous, signal, info, ucontext);
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run `f` on a fresh thread, serialized with other signal-table users
    fn on_new_thread(f: impl FnOnce() + Send + 'static) {
        let _signals = crate::crash::SIGNAL_TEST_LOCK.lock();
        std::thread::spawn(f).join().unwrap();
    }

    #[test]
    fn test_guard_translates_on_installed_thread() {
        on_new_thread(|| {
            install();
            let result: Result<(), _> = guard(|| panic!("bad slot"));
            let error = result.unwrap_err();
            assert_eq!(error.message, "bad slot");
            assert_eq!(error.code, None);
            assert!(!is_translating());
            assert_eq!(guard(|| 5), Ok(5));
        });
    }

    #[cfg(any(unix, target_env = "msvc"))]
    #[test]
    fn test_access_violation_becomes_error() {
        on_new_thread(|| {
            install();
            let result = guard(|| unsafe { std::ptr::read_volatile(8 as *const u64) });
            let error = result.unwrap_err();
            assert_eq!(error.code, Some(0xC000_0005));
            assert!(error.message.starts_with("EXCEPTION_ACCESS_VIOLATION"));
            assert!(!is_translating());

            // the thread keeps working, nested guards included
            assert_eq!(guard(|| guard(|| 3)), Ok(Ok(3)));
            let nested = guard(|| guard(|| unsafe { std::ptr::read_volatile(16 as *const u8) }));
            assert!(matches!(nested, Ok(Err(FaultError { code: Some(_), .. }))));
        });
    }

    #[test]
    fn test_uninstalled_thread_propagates() {
        let outcome = std::thread::spawn(|| {
            let _ = guard(|| panic!("escapes"));
        })
        .join();
        assert!(outcome.is_err());
    }

    #[test]
    fn test_state_is_per_thread() {
        on_new_thread(|| {
            install();
            assert!(is_installed());
            std::thread::spawn(|| assert!(!is_installed())).join().unwrap();
            uninstall();
            assert!(!is_installed());
        });
    }

    #[test]
    fn test_depth_visible_inside_guard() {
        on_new_thread(|| {
            install();
            assert_eq!(guard(is_translating), Ok(true));
        });
    }
}

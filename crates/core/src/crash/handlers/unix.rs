//! POSIX signal handlers
//!
//! Reporting from a signal handler is best-effort: the report path allocates
//! and logs, which is not async-signal-safe. A fault taken while this thread
//! holds the allocator lock can hang instead of producing a snapshot, and a
//! fault raised while a report is already being written is chained without
//! a second report.

use std::ffi::{c_int, c_void};
use std::mem::MaybeUninit;
use std::ptr;

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::crash::hazard::HazardCell;
use crate::crash::report::{FaultContext, Register, CODE_TERMINATE};
use crate::crash::translator;

const SIGNALS: [Signal; 5] = [
    Signal::SIGSEGV,
    Signal::SIGBUS,
    Signal::SIGILL,
    Signal::SIGFPE,
    Signal::SIGABRT,
];

/// Actions replaced by ours, in registration order
pub struct Previous(Vec<(Signal, SigAction)>);

/// Previous actions for chaining from inside the handler
static CHAIN: HazardCell<Vec<(Signal, SigAction)>> = HazardCell::new();

pub fn install() -> Previous {
    let action = SigAction::new(
        SigHandler::SigAction(on_signal),
        SaFlags::SA_SIGINFO | SaFlags::SA_ONSTACK,
        SigSet::empty(),
    );

    let mut previous = Vec::with_capacity(SIGNALS.len());
    for signal in SIGNALS {
        // SAFETY: on_signal only reads published state and chains
        match unsafe { sigaction(signal, &action) } {
            Ok(old) => previous.push((signal, old)),
            Err(e) => tracing::warn!("Failed to install {} handler: {}", signal, e),
        }
    }
    CHAIN.publish(Some(Box::new(previous.clone())));
    Previous(previous)
}

pub fn restore(previous: Previous) {
    CHAIN.clear();
    for (signal, old) in previous.0 {
        // SAFETY: restoring the action that was registered before ours
        if let Err(e) = unsafe { sigaction(signal, &old) } {
            tracing::warn!("Failed to restore {} handler: {}", signal, e);
        }
    }
}

/// Windows-compatible code for a signal
pub(crate) fn code_for(signal: c_int) -> u32 {
    match signal {
        libc::SIGSEGV | libc::SIGBUS => 0xC000_0005,
        libc::SIGILL => 0xC000_001D,
        libc::SIGFPE => 0xC000_0094,
        _ => CODE_TERMINATE,
    }
}

unsafe fn fault_address(info: *mut libc::siginfo_t) -> usize {
    if info.is_null() {
        return 0;
    }
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        (*info).si_addr() as usize
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        (*info).si_addr as usize
    }
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
unsafe fn registers(ucontext: *mut c_void) -> (usize, Vec<Register>) {
    if ucontext.is_null() {
        return (0, Vec::new());
    }
    let gregs = &(*(ucontext as *const libc::ucontext_t)).uc_mcontext.gregs;
    let names = [
        ("RIP", libc::REG_RIP),
        ("RSP", libc::REG_RSP),
        ("RBP", libc::REG_RBP),
        ("RAX", libc::REG_RAX),
        ("RBX", libc::REG_RBX),
        ("RCX", libc::REG_RCX),
        ("RDX", libc::REG_RDX),
        ("RSI", libc::REG_RSI),
        ("RDI", libc::REG_RDI),
        ("R8", libc::REG_R8),
        ("R9", libc::REG_R9),
        ("R10", libc::REG_R10),
        ("R11", libc::REG_R11),
        ("R12", libc::REG_R12),
        ("R13", libc::REG_R13),
        ("R14", libc::REG_R14),
        ("R15", libc::REG_R15),
    ];
    let registers: Vec<Register> = names
        .iter()
        .map(|&(name, index)| Register {
            name,
            value: gregs[index as usize] as u64,
        })
        .collect();
    (gregs[libc::REG_RIP as usize] as usize, registers)
}

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
unsafe fn registers(_ucontext: *mut c_void) -> (usize, Vec<Register>) {
    (0, Vec::new())
}

/// Current action for `signal`, without changing it
pub(crate) fn current_action(signal: Signal) -> libc::sigaction {
    let mut current = MaybeUninit::<libc::sigaction>::zeroed();
    // SAFETY: a null new action only queries; zeroed is a valid sigaction
    unsafe {
        libc::sigaction(signal as c_int, ptr::null(), current.as_mut_ptr());
        current.assume_init()
    }
}

/// True if `handler` is the reporting handler of this module
pub(crate) fn is_fault_handler(handler: libc::sighandler_t) -> bool {
    handler == on_signal as usize
}

extern "C" fn on_signal(signal: c_int, info: *mut libc::siginfo_t, ucontext: *mut c_void) {
    if signal != libc::SIGABRT {
        // Never returns on a thread that is translating faults
        unsafe { translator::resume_guarded(signal) };
    }

    let (ip, mut registers) = unsafe { registers(ucontext) };
    let data_address = unsafe { fault_address(info) };
    registers.push(Register {
        name: "FAULT_ADDR",
        value: data_address as u64,
    });

    crate::crash::report_fault(FaultContext {
        trigger: "signal",
        code: code_for(signal),
        address: if ip != 0 { ip } else { data_address },
        registers,
        detail: Signal::try_from(signal).ok().map(|s| s.to_string()),
        exception_pointers: 0,
    });

    unsafe { chain(signal, info, ucontext) };
}

/// Hand the signal to whatever was registered before us
unsafe fn chain(signal: c_int, info: *mut libc::siginfo_t, ucontext: *mut c_void) {
    forward(previous_handler(&CHAIN, signal), signal, info, ucontext);
}

pub(crate) fn previous_handler(
    chain: &HazardCell<Vec<(Signal, SigAction)>>,
    signal: c_int,
) -> Option<SigHandler> {
    chain
        .read(|actions| {
            actions
                .iter()
                .find(|(s, _)| *s as c_int == signal)
                .map(|(_, action)| action.handler())
        })
        .flatten()
}

/// Run `previous` as the kernel would have
pub(crate) unsafe fn forward(
    previous: Option<SigHandler>,
    signal: c_int,
    info: *mut libc::siginfo_t,
    ucontext: *mut c_void,
) {
    match previous {
        Some(SigHandler::SigIgn) => {}
        Some(SigHandler::Handler(handler)) => handler(signal),
        Some(SigHandler::SigAction(handler)) => handler(signal, info, ucontext),
        Some(SigHandler::SigDfl) | None => {
            // Default disposition, then re-raise so the process dies as it would have
            libc::signal(signal, libc::SIG_DFL);
            libc::raise(signal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn sentinel(_: c_int) {}

    fn masked(action: &libc::sigaction) -> Vec<c_int> {
        (1..32)
            .filter(|&s| unsafe { libc::sigismember(&action.sa_mask, s) } == 1)
            .collect()
    }

    fn assert_same(left: &libc::sigaction, right: &libc::sigaction) {
        assert_eq!(left.sa_sigaction, right.sa_sigaction);
        assert_eq!(left.sa_flags, right.sa_flags);
        assert_eq!(masked(left), masked(right));
    }

    #[test]
    fn test_restore_puts_back_previous_actions() {
        let _signals = crate::crash::SIGNAL_TEST_LOCK.lock();

        let mut mask = SigSet::empty();
        mask.add(Signal::SIGUSR1);
        let custom = SigAction::new(SigHandler::Handler(sentinel), SaFlags::SA_RESTART, mask);
        let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
        let saved_bus = unsafe { sigaction(Signal::SIGBUS, &custom) }.unwrap();
        let saved_ill = unsafe { sigaction(Signal::SIGILL, &default) }.unwrap();
        let bus = current_action(Signal::SIGBUS);
        let ill = current_action(Signal::SIGILL);

        let previous = install();
        assert!(is_fault_handler(current_action(Signal::SIGBUS).sa_sigaction));
        assert!(is_fault_handler(current_action(Signal::SIGILL).sa_sigaction));
        assert!(CHAIN.is_set());

        restore(previous);
        assert_same(&current_action(Signal::SIGBUS), &bus);
        assert_same(&current_action(Signal::SIGILL), &ill);
        assert_eq!(current_action(Signal::SIGILL).sa_sigaction, libc::SIG_DFL);
        assert!(!CHAIN.is_set());

        unsafe {
            sigaction(Signal::SIGBUS, &saved_bus).unwrap();
            sigaction(Signal::SIGILL, &saved_ill).unwrap();
        }
    }

    #[test]
    fn test_chain_finds_previous_handler() {
        let chain = HazardCell::new();
        let custom = SigAction::new(
            SigHandler::Handler(sentinel),
            SaFlags::empty(),
            SigSet::empty(),
        );
        chain.publish(Some(Box::new(vec![(Signal::SIGFPE, custom)])));
        assert_eq!(
            previous_handler(&chain, libc::SIGFPE),
            Some(SigHandler::Handler(sentinel))
        );
        assert_eq!(previous_handler(&chain, libc::SIGSEGV), None);
    }

    #[test]
    fn test_signal_codes() {
        assert_eq!(code_for(libc::SIGSEGV), 0xC000_0005);
        assert_eq!(code_for(libc::SIGBUS), 0xC000_0005);
        assert_eq!(code_for(libc::SIGFPE), 0xC000_0094);
        assert_eq!(code_for(libc::SIGABRT), CODE_TERMINATE);
    }
}

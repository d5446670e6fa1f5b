//! Windows structured-exception and CRT handlers

use windows::Win32::System::Diagnostics::Debug::{
    SetUnhandledExceptionFilter, EXCEPTION_POINTERS, LPTOP_LEVEL_EXCEPTION_FILTER,
};

use crate::crash::hazard::HazardCell;
use crate::crash::report::{FaultContext, Register, CODE_INVALID_PARAMETER, CODE_PURECALL};

const EXCEPTION_EXECUTE_HANDLER: i32 = 1;

type InvalidParameterHandler =
    Option<unsafe extern "C" fn(*const u16, *const u16, *const u16, u32, usize)>;
type PurecallHandler = Option<unsafe extern "C" fn()>;

extern "C" {
    fn _set_invalid_parameter_handler(handler: InvalidParameterHandler) -> InvalidParameterHandler;
    fn _set_purecall_handler(handler: PurecallHandler) -> PurecallHandler;
}

/// Handlers that were registered before ours
#[derive(Clone, Copy)]
pub struct Previous {
    filter: LPTOP_LEVEL_EXCEPTION_FILTER,
    invalid_parameter: InvalidParameterHandler,
    purecall: PurecallHandler,
}

// SAFETY: plain function pointers
unsafe impl Send for Previous {}
unsafe impl Sync for Previous {}

static CHAIN: HazardCell<Previous> = HazardCell::new();

pub fn install() -> Previous {
    let previous = unsafe {
        Previous {
            filter: SetUnhandledExceptionFilter(Some(unhandled_exception_filter)),
            invalid_parameter: _set_invalid_parameter_handler(Some(invalid_parameter_handler)),
            purecall: _set_purecall_handler(Some(purecall_handler)),
        }
    };
    CHAIN.publish(Some(Box::new(previous)));
    previous
}

pub fn restore(previous: Previous) {
    CHAIN.clear();
    // Restored verbatim, null included
    unsafe {
        SetUnhandledExceptionFilter(previous.filter);
        _set_invalid_parameter_handler(previous.invalid_parameter);
        _set_purecall_handler(previous.purecall);
    }
}

#[cfg(target_arch = "x86_64")]
unsafe fn registers(pointers: *const EXCEPTION_POINTERS) -> Vec<Register> {
    let context = (*pointers).ContextRecord;
    if context.is_null() {
        return Vec::new();
    }
    let c = &*context;
    [
        ("RIP", c.Rip),
        ("RSP", c.Rsp),
        ("RBP", c.Rbp),
        ("RAX", c.Rax),
        ("RBX", c.Rbx),
        ("RCX", c.Rcx),
        ("RDX", c.Rdx),
        ("RSI", c.Rsi),
        ("RDI", c.Rdi),
        ("R8", c.R8),
        ("R9", c.R9),
        ("R10", c.R10),
        ("R11", c.R11),
        ("R12", c.R12),
        ("R13", c.R13),
        ("R14", c.R14),
        ("R15", c.R15),
    ]
    .into_iter()
    .map(|(name, value)| Register { name, value })
    .collect()
}

#[cfg(not(target_arch = "x86_64"))]
unsafe fn registers(_pointers: *const EXCEPTION_POINTERS) -> Vec<Register> {
    Vec::new()
}

unsafe extern "system" fn unhandled_exception_filter(pointers: *const EXCEPTION_POINTERS) -> i32 {
    let mut context = FaultContext {
        trigger: "UnhandledExceptionFilter",
        exception_pointers: pointers as usize,
        ..Default::default()
    };
    if !pointers.is_null() {
        let record = (*pointers).ExceptionRecord;
        if !record.is_null() {
            context.code = (*record).ExceptionCode.0 as u32;
            context.address = (*record).ExceptionAddress as usize;
        }
        context.registers = registers(pointers);
    }
    crate::crash::report_fault(context);

    match CHAIN.read(|p| p.filter).flatten() {
        Some(previous) => previous(pointers),
        None => EXCEPTION_EXECUTE_HANDLER,
    }
}

unsafe extern "C" fn invalid_parameter_handler(
    _expression: *const u16,
    _function: *const u16,
    _file: *const u16,
    _line: u32,
    _reserved: usize,
) {
    crate::crash::report_fault(FaultContext {
        trigger: "InvalidParameter",
        code: CODE_INVALID_PARAMETER,
        ..Default::default()
    });
    if let Some(previous) = CHAIN.read(|p| p.invalid_parameter).flatten() {
        previous(std::ptr::null(), std::ptr::null(), std::ptr::null(), 0, 0);
    }
}

unsafe extern "C" fn purecall_handler() {
    crate::crash::report_fault(FaultContext {
        trigger: "PureVirtualCall",
        code: CODE_PURECALL,
        ..Default::default()
    });
    if let Some(previous) = CHAIN.read(|p| p.purecall).flatten() {
        previous();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "system" fn sentinel(_: *const EXCEPTION_POINTERS) -> i32 {
        0
    }

    unsafe extern "C" fn sentinel_purecall() {}

    #[test]
    fn test_restore_puts_back_previous_handlers() {
        let _signals = crate::crash::SIGNAL_TEST_LOCK.lock();
        unsafe {
            let saved_filter = SetUnhandledExceptionFilter(Some(sentinel));
            let saved_purecall = _set_purecall_handler(Some(sentinel_purecall));

            let previous = install();
            assert_eq!(previous.filter.map(|f| f as usize), Some(sentinel as usize));
            restore(previous);
            assert_eq!(
                SetUnhandledExceptionFilter(None).map(|f| f as usize),
                Some(sentinel as usize)
            );
            assert_eq!(
                _set_purecall_handler(None).map(|f| f as usize),
                Some(sentinel_purecall as usize)
            );

            // null comes back as null
            let previous = install();
            assert!(previous.filter.is_none() && previous.purecall.is_none());
            restore(previous);
            assert!(SetUnhandledExceptionFilter(saved_filter).is_none());
            assert!(_set_purecall_handler(saved_purecall).is_none());
        }
    }
}

//! Panic hook as the abnormal-termination handler

use std::panic::PanicHookInfo;
use std::sync::Arc;

use crate::crash::report::{FaultContext, CODE_TERMINATE};
use crate::crash::translator;

type Hook = Box<dyn Fn(&PanicHookInfo<'_>) + Send + Sync + 'static>;

/// Hook that was active before ours
pub struct PreviousHook(Arc<Hook>);

pub fn install() -> PreviousHook {
    let previous: Arc<Hook> = Arc::new(std::panic::take_hook());
    let chained = previous.clone();
    std::panic::set_hook(Box::new(move |info| {
        if !translator::is_translating() {
            super::super::report_fault(context(info));
        }
        chained(info);
    }));
    PreviousHook(previous)
}

/// Put the previous hook back, the same boxed hook when possible
pub fn restore(previous: PreviousHook) {
    // Dropping our hook releases its clone of the previous one
    drop(std::panic::take_hook());
    match Arc::try_unwrap(previous.0) {
        Ok(hook) => std::panic::set_hook(hook),
        Err(shared) => std::panic::set_hook(Box::new(move |info| shared(info))),
    }
}

fn context(info: &PanicHookInfo<'_>) -> FaultContext {
    let message = info
        .payload()
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| info.payload().downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".to_string());
    let detail = match info.location() {
        Some(location) => format!("{} at {}:{}", message, location.file(), location.line()),
        None => message,
    };
    FaultContext {
        trigger: "panic",
        code: CODE_TERMINATE,
        detail: Some(detail),
        ..Default::default()
    }
}

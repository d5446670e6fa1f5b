//! Process-wide fault handler registration

pub mod panic;

#[cfg(unix)]
pub(crate) mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
use self::unix as os;
#[cfg(windows)]
use self::windows as os;

use super::registry::HandlerBackend;

/// Handlers registered by the first installer
pub struct PlatformPrevious {
    panic: panic::PreviousHook,
    os: os::Previous,
}

/// Real handlers of the current platform
#[derive(Debug, Default, Clone, Copy)]
pub struct PlatformBackend;

impl HandlerBackend for PlatformBackend {
    type Previous = PlatformPrevious;

    fn install(&self) -> PlatformPrevious {
        PlatformPrevious {
            os: os::install(),
            panic: panic::install(),
        }
    }

    fn restore(&self, previous: PlatformPrevious) {
        panic::restore(previous.panic);
        os::restore(previous.os);
    }
}

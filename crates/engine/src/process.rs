//! Host process introspection: paths, environment, threads, loader lock

use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

/// Directory of the host executable
pub fn process_directory() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Executable name without directory or extension
pub fn process_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Id of the calling OS thread
pub fn current_thread_id() -> u64 {
    #[cfg(windows)]
    unsafe {
        windows::Win32::System::Threading::GetCurrentThreadId() as u64
    }
    #[cfg(target_os = "linux")]
    unsafe {
        libc::gettid() as u64
    }
    #[cfg(all(unix, not(target_os = "linux")))]
    unsafe {
        libc::pthread_self() as u64
    }
}

fn lookup(name: &str) -> Option<String> {
    if let Ok(value) = std::env::var(name) {
        return Some(value);
    }
    if name.eq_ignore_ascii_case("TEMP") || name.eq_ignore_ascii_case("TMP") {
        return Some(std::env::temp_dir().to_string_lossy().into_owned());
    }
    None
}

/// Expand `%VAR%`, `$VAR` and `${VAR}` references
///
/// Unknown variables are left untouched. `%TEMP%`/`%TMP%` fall back to the
/// platform temp directory when unset.
pub fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find(&['%', '$'][..]) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        let (name, consumed) = if let Some(after) = tail.strip_prefix('%') {
            match after.find('%') {
                Some(end) if end > 0 => (&after[..end], end + 2),
                _ => ("", 1),
            }
        } else if let Some(after) = tail.strip_prefix("${") {
            match after.find('}') {
                Some(end) if end > 0 => (&after[..end], end + 3),
                _ => ("", 1),
            }
        } else {
            let after = &tail[1..];
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end + 1)
        };

        match (name.is_empty(), lookup(name)) {
            (false, Some(value)) => out.push_str(&value),
            _ => out.push_str(&tail[..consumed]),
        }
        rest = &tail[consumed..];
    }

    out.push_str(rest);
    out
}

/// True when the calling thread holds the module-loader lock
///
/// Code running under the loader lock must not wait on other threads.
pub fn loader_lock_held() -> bool {
    #[cfg(windows)]
    {
        sys::loader_lock_held()
    }
    #[cfg(not(windows))]
    {
        false
    }
}

/// Forcibly terminate a thread that did not exit in time
///
/// Returns false where forced termination is unsupported; the thread is then
/// left detached.
pub fn terminate_thread<T>(handle: &JoinHandle<T>) -> bool {
    #[cfg(windows)]
    {
        sys::terminate_thread(handle)
    }
    #[cfg(not(windows))]
    {
        let _ = handle;
        false
    }
}

#[cfg(windows)]
mod sys {
    use std::os::windows::io::AsRawHandle;
    use std::thread::JoinHandle;

    use windows::Win32::Foundation::HANDLE;
    use windows::Win32::System::Threading::{GetCurrentThreadId, TerminateThread};

    // x64 layout: PEB.LoaderLock and RTL_CRITICAL_SECTION.OwningThread
    #[cfg(target_arch = "x86_64")]
    const PEB_LOADER_LOCK_OFFSET: usize = 0x110;
    #[cfg(target_arch = "x86_64")]
    const CRITICAL_SECTION_OWNER_OFFSET: usize = 0x10;

    #[cfg(target_arch = "x86_64")]
    pub(super) fn loader_lock_held() -> bool {
        unsafe {
            let peb: *const u8;
            std::arch::asm!(
                "mov {}, gs:[0x60]",
                out(reg) peb,
                options(nostack, readonly, preserves_flags)
            );
            if peb.is_null() {
                return false;
            }

            let lock = *(peb.add(PEB_LOADER_LOCK_OFFSET) as *const *const u8);
            if lock.is_null() {
                return false;
            }

            let owner = std::ptr::read_volatile(lock.add(CRITICAL_SECTION_OWNER_OFFSET) as *const usize);
            owner == GetCurrentThreadId() as usize
        }
    }

    #[cfg(not(target_arch = "x86_64"))]
    pub(super) fn loader_lock_held() -> bool {
        false
    }

    pub(super) fn terminate_thread<T>(handle: &JoinHandle<T>) -> bool {
        unsafe { TerminateThread(HANDLE(handle.as_raw_handle() as _), 0).is_ok() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_percent_and_dollar() {
        std::env::set_var("RG_TEST_EXPAND", "value");
        assert_eq!(expand_env("%RG_TEST_EXPAND%/a"), "value/a");
        assert_eq!(expand_env("$RG_TEST_EXPAND/a"), "value/a");
        assert_eq!(expand_env("${RG_TEST_EXPAND}-b"), "value-b");
    }

    #[test]
    fn test_unknown_variables_are_kept() {
        assert_eq!(
            expand_env("%RG_TEST_MISSING_VAR%/x"),
            "%RG_TEST_MISSING_VAR%/x"
        );
        assert_eq!(expand_env("100% sure"), "100% sure");
        assert_eq!(expand_env("cost $"), "cost $");
    }

    #[test]
    fn test_temp_always_resolves() {
        let expanded = expand_env("%TEMP%");
        assert!(!expanded.contains('%'));
        assert!(!expanded.is_empty());
    }

    #[test]
    fn test_process_name_has_no_extension() {
        let name = process_name();
        assert!(!name.is_empty());
        assert!(!name.ends_with(".exe"));
    }

    #[test]
    fn test_loader_lock_not_held_in_tests() {
        assert!(!loader_lock_held());
    }
}

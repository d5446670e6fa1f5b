//! Host module handles, pinning and address-to-module lookup

use std::ffi::c_void;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::error::ModuleError;

/// Handle of the module that attached the engine
///
/// On Windows this is the module base (`HMODULE`). Elsewhere any address
/// inside the module identifies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostModule(NonZeroUsize);

impl HostModule {
    /// Wrap a raw handle, rejecting null
    pub fn from_raw(handle: *mut c_void) -> Option<Self> {
        NonZeroUsize::new(handle as usize).map(Self)
    }

    /// The module containing this function
    pub fn containing<T>(address: *const T) -> Option<Self> {
        NonZeroUsize::new(address as usize).map(Self)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.get() as *mut c_void
    }

    pub fn address(self) -> usize {
        self.0.get()
    }

    /// Full path of the module file
    pub fn path(self) -> Option<PathBuf> {
        locate(self.address()).map(|l| l.path)
    }

    /// Directory containing the module file
    pub fn directory(self) -> Option<PathBuf> {
        self.path()
            .and_then(|p| p.parent().map(Path::to_path_buf))
            .filter(|p| !p.as_os_str().is_empty())
    }
}

/// Module that contains an address, with the address' offset into it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLocation {
    pub path: PathBuf,
    pub base: usize,
    pub offset: usize,
}

impl ModuleLocation {
    /// File name of the module, or `<unknown>`
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "<unknown>".to_string())
    }
}

/// Reference on the host module that keeps it resident
///
/// Dropping the pin releases the reference.
#[derive(Debug)]
pub struct ModulePin {
    module: HostModule,
    handle: usize,
}

// SAFETY: the handle is an opaque loader reference, valid on any thread
unsafe impl Send for ModulePin {}
unsafe impl Sync for ModulePin {}

impl ModulePin {
    /// Increment the reference count of `module`
    pub fn acquire(module: HostModule) -> Result<Self, ModuleError> {
        let handle = unsafe { sys::pin(module.address())? };
        tracing::debug!("Pinned host module {:#x}", module.address());
        Ok(Self { module, handle })
    }

    pub fn module(&self) -> HostModule {
        self.module
    }

    /// Release the reference taken at [`ModulePin::acquire`]
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ModulePin {
    fn drop(&mut self) {
        unsafe { sys::unpin(self.handle) };
        tracing::debug!("Released host module {:#x}", self.module.address());
    }
}

/// Find the module containing `address`
pub fn locate(address: usize) -> Option<ModuleLocation> {
    if address == 0 {
        return None;
    }
    unsafe { sys::locate(address) }
}

#[cfg(windows)]
mod sys {
    use std::ffi::OsString;
    use std::os::windows::ffi::OsStringExt;
    use std::path::PathBuf;

    use windows::core::PCWSTR;
    use windows::Win32::Foundation::HMODULE;
    use windows::Win32::System::LibraryLoader::{
        FreeLibrary, GetModuleFileNameW, GetModuleHandleExW,
        GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS, GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
    };

    use super::ModuleLocation;
    use crate::error::ModuleError;

    pub(super) unsafe fn pin(address: usize) -> Result<usize, ModuleError> {
        let mut handle = HMODULE::default();
        GetModuleHandleExW(
            GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS,
            PCWSTR(address as *const u16),
            &mut handle,
        )
        .map_err(|e| ModuleError::PinFailed(e.to_string()))?;
        Ok(handle.0 as usize)
    }

    pub(super) unsafe fn unpin(handle: usize) {
        let _ = FreeLibrary(HMODULE(handle as _));
    }

    pub(super) unsafe fn locate(address: usize) -> Option<ModuleLocation> {
        let mut handle = HMODULE::default();
        GetModuleHandleExW(
            GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS | GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
            PCWSTR(address as *const u16),
            &mut handle,
        )
        .ok()?;

        let mut buffer = [0u16; 1024];
        let len = GetModuleFileNameW(handle, &mut buffer) as usize;
        if len == 0 {
            return None;
        }

        let base = handle.0 as usize;
        Some(ModuleLocation {
            path: PathBuf::from(OsString::from_wide(&buffer[..len])),
            base,
            offset: address.wrapping_sub(base),
        })
    }
}

#[cfg(unix)]
mod sys {
    use std::ffi::{c_void, CStr, OsStr};
    use std::os::unix::ffi::OsStrExt;
    use std::path::{Path, PathBuf};

    use super::ModuleLocation;
    use crate::error::ModuleError;

    unsafe fn dl_info(address: usize) -> Option<libc::Dl_info> {
        let mut info: libc::Dl_info = std::mem::zeroed();
        if libc::dladdr(address as *const c_void, &mut info) == 0 || info.dli_fname.is_null() {
            return None;
        }
        Some(info)
    }

    fn is_main_program(path: &Path) -> bool {
        let Ok(exe) = std::env::current_exe() else {
            return false;
        };
        match (path.canonicalize(), exe.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    pub(super) unsafe fn pin(address: usize) -> Result<usize, ModuleError> {
        let info = dl_info(address).ok_or(ModuleError::InvalidHandle(address))?;

        let mut handle = libc::dlopen(info.dli_fname, libc::RTLD_LAZY | libc::RTLD_NOLOAD);
        if handle.is_null() {
            let path = Path::new(OsStr::from_bytes(CStr::from_ptr(info.dli_fname).to_bytes()));
            if is_main_program(path) {
                handle = libc::dlopen(std::ptr::null(), libc::RTLD_LAZY);
            }
        }

        if handle.is_null() {
            let reason = {
                let err = libc::dlerror();
                if err.is_null() {
                    "dlopen failed".to_string()
                } else {
                    CStr::from_ptr(err).to_string_lossy().into_owned()
                }
            };
            return Err(ModuleError::PinFailed(reason));
        }

        Ok(handle as usize)
    }

    pub(super) unsafe fn unpin(handle: usize) {
        libc::dlclose(handle as *mut c_void);
    }

    pub(super) unsafe fn locate(address: usize) -> Option<ModuleLocation> {
        let info = dl_info(address)?;
        let path = PathBuf::from(OsStr::from_bytes(CStr::from_ptr(info.dli_fname).to_bytes()));
        let base = info.dli_fbase as usize;
        Some(ModuleLocation {
            path,
            base,
            offset: address.wrapping_sub(base),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker() {}

    #[test]
    fn test_null_handle_rejected() {
        assert!(HostModule::from_raw(std::ptr::null_mut()).is_none());
    }

    #[test]
    fn test_locate_own_function() {
        let address = marker as fn() as usize;
        let location = locate(address).expect("test binary should be resolvable");
        assert!(location.base <= address);
        assert_eq!(location.offset, address - location.base);
        assert!(!location.name().is_empty());
    }

    #[test]
    fn test_pin_and_release() {
        let module = HostModule::containing(marker as fn() as *const ()).unwrap();
        let pin = ModulePin::acquire(module).expect("pin test binary");
        assert_eq!(pin.module(), module);
        pin.release();
    }

    #[test]
    fn test_directory_exists() {
        let module = HostModule::containing(marker as fn() as *const ()).unwrap();
        let dir = module.directory().expect("module directory");
        assert!(dir.is_dir());
    }
}

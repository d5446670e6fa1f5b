//! Host-owned opaque context block

use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use parking_lot::Mutex;

use crate::error::EngineError;

const UNIT: usize = std::mem::size_of::<u128>();

/// Zeroed, 16-byte aligned memory handed to every event callback
///
/// Allocating again frees the previous block; callers must not replace the
/// context while a callback may still be using it.
#[derive(Default)]
pub struct CustomContext {
    block: Mutex<Option<Vec<u128>>>,
    ptr: AtomicPtr<c_void>,
}

impl CustomContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the block with `size` zeroed bytes
    ///
    /// A zero size still yields a valid, non-null block. On failure the
    /// previous block has already been released.
    pub fn alloc(&self, size: usize) -> Result<*mut c_void, EngineError> {
        let mut block = self.block.lock();
        self.ptr.store(ptr::null_mut(), Ordering::Release);
        *block = None;

        let units = size.div_ceil(UNIT).max(1);
        let mut memory: Vec<u128> = Vec::new();
        memory
            .try_reserve_exact(units)
            .map_err(|_| EngineError::ContextAllocation(size))?;
        memory.resize(units, 0);

        let raw = memory.as_mut_ptr() as *mut c_void;
        *block = Some(memory);
        self.ptr.store(raw, Ordering::Release);
        tracing::debug!("Allocated {} byte custom context at {:p}", size, raw);
        Ok(raw)
    }

    pub fn free(&self) {
        let mut block = self.block.lock();
        self.ptr.store(ptr::null_mut(), Ordering::Release);
        if block.take().is_some() {
            tracing::debug!("Freed custom context");
        }
    }

    /// Current block, or null
    #[inline]
    pub fn get(&self) -> *mut c_void {
        self.ptr.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_is_zeroed_and_aligned() {
        let context = CustomContext::new();
        let ptr = context.alloc(100).unwrap();
        assert_eq!(ptr as usize % 16, 0);
        assert_eq!(context.get(), ptr);

        let bytes = unsafe { std::slice::from_raw_parts(ptr as *const u8, 100) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_realloc_replaces_block() {
        let context = CustomContext::new();
        let first = context.alloc(16).unwrap();
        unsafe { *(first as *mut u8) = 0xAB };

        let second = context.alloc(16).unwrap();
        assert_eq!(context.get(), second);
        assert_eq!(unsafe { *(second as *const u8) }, 0);
    }

    #[test]
    fn test_zero_size_and_free() {
        let context = CustomContext::new();
        assert!(context.get().is_null());
        assert!(!context.alloc(0).unwrap().is_null());
        context.free();
        assert!(context.get().is_null());
        context.free();
    }

    #[test]
    fn test_huge_alloc_fails() {
        let context = CustomContext::new();
        assert!(matches!(
            context.alloc(usize::MAX),
            Err(EngineError::ContextAllocation(usize::MAX))
        ));
        assert!(context.get().is_null());
    }
}

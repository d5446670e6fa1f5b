//! Per-subsystem event callback tables
//!
//! Hook bodies read a table with one atomic load and copy it. Replaced
//! tables are retired rather than freed, so a dispatch that loaded the old
//! pointer keeps reading valid memory until the session is dropped.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use parking_lot::Mutex;

use rendergate_engine::SubsystemKind;
use rendergate_sdk::{RgCoreAudioCallbacks, RgD3D9Callbacks, RgDxgiCallbacks};

/// Lock-free published copy of a callback table
pub struct CallbackSlot<T: Copy> {
    current: AtomicPtr<T>,
    retired: Mutex<Vec<Box<T>>>,
}

impl<T: Copy> CallbackSlot<T> {
    pub fn new() -> Self {
        Self {
            current: AtomicPtr::new(ptr::null_mut()),
            retired: Mutex::new(Vec::new()),
        }
    }

    /// Publish a copy of `table`; `None` clears the slot
    pub fn set(&self, table: Option<T>) {
        let new = table.map_or(ptr::null_mut(), |t| Box::into_raw(Box::new(t)));
        let old = self.current.swap(new, Ordering::AcqRel);
        if !old.is_null() {
            // SAFETY: every non-null pointer in `current` came from Box::into_raw
            self.retired.lock().push(unsafe { Box::from_raw(old) });
        }
    }

    #[inline]
    pub fn get(&self) -> Option<T> {
        let table = self.current.load(Ordering::Acquire);
        // SAFETY: published tables stay allocated until the slot is dropped
        unsafe { table.as_ref().copied() }
    }

    pub fn retired_count(&self) -> usize {
        self.retired.lock().len()
    }
}

impl<T: Copy> Default for CallbackSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> Drop for CallbackSlot<T> {
    fn drop(&mut self) {
        let table = *self.current.get_mut();
        if !table.is_null() {
            // SAFETY: see `set`
            drop(unsafe { Box::from_raw(table) });
        }
    }
}

/// Callback tables of one session
#[derive(Default)]
pub struct SessionCallbacks {
    pub d3d9: CallbackSlot<RgD3D9Callbacks>,
    pub d3d10: CallbackSlot<RgDxgiCallbacks>,
    pub d3d11: CallbackSlot<RgDxgiCallbacks>,
    pub d3d12: CallbackSlot<RgDxgiCallbacks>,
    pub core_audio: CallbackSlot<RgCoreAudioCallbacks>,
}

impl SessionCallbacks {
    /// Swap chain table registered for a DXGI version
    pub fn dxgi(&self, kind: SubsystemKind) -> Option<&CallbackSlot<RgDxgiCallbacks>> {
        match kind {
            SubsystemKind::Direct3D10 => Some(&self.d3d10),
            SubsystemKind::Direct3D11 => Some(&self.d3d11),
            SubsystemKind::Direct3D12 => Some(&self.d3d12),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::c_void;

    unsafe extern "system" fn end_scene(_: *mut c_void, _: *const rendergate_sdk::RgEventExtension) {}

    #[test]
    fn test_empty_slot() {
        let slot = CallbackSlot::<RgD3D9Callbacks>::new();
        assert!(slot.get().is_none());
    }

    #[test]
    fn test_set_copies_and_retires() {
        let slot = CallbackSlot::new();
        let mut table = RgD3D9Callbacks::default();
        table.pre_end_scene = Some(end_scene);
        slot.set(Some(table));

        // later changes to the caller's table are not observed
        table.pre_end_scene = None;
        assert!(slot.get().unwrap().pre_end_scene.is_some());

        slot.set(Some(table));
        slot.set(None);
        assert!(slot.get().is_none());
        assert_eq!(slot.retired_count(), 2);
    }

    #[test]
    fn test_dxgi_slot_per_version() {
        let callbacks = SessionCallbacks::default();
        assert!(callbacks.dxgi(SubsystemKind::Direct3D9).is_none());
        callbacks.d3d11.set(Some(RgDxgiCallbacks::default()));
        assert!(callbacks.dxgi(SubsystemKind::Direct3D11).unwrap().get().is_some());
        assert!(callbacks.dxgi(SubsystemKind::Direct3D12).unwrap().get().is_none());
    }
}

//! [`TargetCatalog`] over the host-supplied C vtable

use std::ffi::c_void;

use rendergate_engine::{EntryTable, LifecycleTargets, ProbeError, SubsystemKind, TargetCatalog};
use rendergate_sdk::{RgEntryTable, RgTargetCatalog, RG_PROBE_ABSENT, RG_PROBE_PRESENT};

/// Owned copy of an [`RgTargetCatalog`]
pub struct CatalogAdapter {
    raw: RgTargetCatalog,
}

// SAFETY: the host promises the vtable and its `user` pointer may be used
// from any thread; hook bodies run on the host's own threads.
unsafe impl Send for CatalogAdapter {}
unsafe impl Sync for CatalogAdapter {}

impl CatalogAdapter {
    /// # Safety
    /// Every non-null entry of `raw` must stay callable for the session's lifetime.
    pub unsafe fn new(raw: RgTargetCatalog) -> Self {
        Self { raw }
    }
}

impl TargetCatalog for CatalogAdapter {
    fn probe(&self, kind: SubsystemKind) -> Result<Option<EntryTable>, ProbeError> {
        let Some(probe) = self.raw.probe else {
            return Ok(None);
        };
        let mut table = RgEntryTable::default();
        match unsafe { probe(self.raw.user, kind.to_raw(), &mut table) } {
            RG_PROBE_PRESENT => Ok(Some(EntryTable::from(table))),
            RG_PROBE_ABSENT => Ok(None),
            status if status < 0 => Err(ProbeError::InstanceCreation {
                kind: kind.name(),
                reason: format!("catalog status {}", status),
            }),
            status => Err(ProbeError::Status(status)),
        }
    }

    unsafe fn supports(&self, handle: *mut c_void, kind: SubsystemKind) -> bool {
        match self.raw.supports {
            Some(supports) => supports(self.raw.user, handle, kind.to_raw()),
            None => false,
        }
    }

    unsafe fn device_of(&self, object: *mut c_void) -> *mut c_void {
        match self.raw.device_of {
            Some(device_of) => device_of(self.raw.user, object),
            None => std::ptr::null_mut(),
        }
    }

    unsafe fn is_command_queue(&self, object: *mut c_void) -> bool {
        match self.raw.is_command_queue {
            Some(is_command_queue) => is_command_queue(self.raw.user, object),
            None => false,
        }
    }

    unsafe fn retain(&self, object: *mut c_void) {
        if let Some(retain) = self.raw.retain {
            retain(self.raw.user, object);
        }
    }

    unsafe fn release(&self, object: *mut c_void) {
        if let Some(release) = self.raw.release {
            release(self.raw.user, object);
        }
    }

    fn lifecycle_targets(&self) -> LifecycleTargets {
        LifecycleTargets {
            terminate: (self.raw.terminate_target != 0).then_some(self.raw.terminate_target),
            quit: (self.raw.quit_target != 0).then_some(self.raw.quit_target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendergate_engine::EntryPoint;
    use rendergate_sdk::RgSubsystem;

    unsafe extern "system" fn probe(user: *mut c_void, subsystem: RgSubsystem, table: *mut RgEntryTable) -> i32 {
        let base = user as usize;
        match subsystem {
            RgSubsystem::Direct3D11 => {
                (*table).entries[EntryPoint::Present.index()] = base;
                RG_PROBE_PRESENT
            }
            RgSubsystem::Direct3D12 => -1,
            _ => RG_PROBE_ABSENT,
        }
    }

    fn catalog(raw_probe: bool) -> CatalogAdapter {
        let raw = RgTargetCatalog {
            user: 0x4000 as *mut c_void,
            probe: raw_probe.then_some(probe as _),
            supports: None,
            device_of: None,
            is_command_queue: None,
            retain: None,
            release: None,
            terminate_target: 0x10,
            quit_target: 0,
        };
        unsafe { CatalogAdapter::new(raw) }
    }

    #[test]
    fn test_probe_statuses() {
        let catalog = catalog(true);
        let table = catalog.probe(SubsystemKind::Direct3D11).unwrap().unwrap();
        assert_eq!(table.get(EntryPoint::Present), Some(0x4000));
        assert!(catalog.probe(SubsystemKind::Direct3D9).unwrap().is_none());
        assert!(matches!(
            catalog.probe(SubsystemKind::Direct3D12),
            Err(ProbeError::InstanceCreation { .. })
        ));
    }

    #[test]
    fn test_missing_entries_degrade() {
        let catalog = catalog(false);
        assert!(catalog.probe(SubsystemKind::Direct3D11).unwrap().is_none());
        assert!(!unsafe { catalog.supports(std::ptr::null_mut(), SubsystemKind::Direct3D11) });
        assert!(unsafe { catalog.device_of(std::ptr::null_mut()) }.is_null());
    }

    #[test]
    fn test_zero_lifecycle_target_is_absent() {
        let targets = catalog(false).lifecycle_targets();
        assert_eq!(targets.terminate, Some(0x10));
        assert_eq!(targets.quit, None);
    }
}

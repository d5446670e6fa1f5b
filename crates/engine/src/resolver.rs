//! Target resolution via catalog probing

use crate::catalog::{EntryPoint, EntryTable, TargetCatalog};
use crate::kind::{Family, SubsystemKind, VersionSet};

/// Resolved entry points of one physical dispatch table
///
/// Built once per attach and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    /// First kind that resolved this table
    pub kind: SubsystemKind,
    /// Every Direct3D version that resolved to this table
    pub candidates: VersionSet,
    pub table: EntryTable,
    /// True when more than one kind resolved to the same table
    pub shared: bool,
}

impl TargetDescriptor {
    fn new(kind: SubsystemKind, table: EntryTable) -> Self {
        Self {
            kind,
            candidates: kind.version(),
            table,
            shared: false,
        }
    }

    pub fn family(&self) -> Family {
        self.kind.family()
    }
}

/// Probe every enabled subsystem and fold shared swap-chain tables
///
/// Absent subsystems and failed probes are logged and skipped. Direct3D
/// 10/11/12 tables whose `Present` resolves to the same target collapse into
/// one descriptor carrying every aliasing version, so the orchestrator hooks
/// the shared table once.
#[tracing::instrument(skip_all)]
pub fn resolve(catalog: &dyn TargetCatalog, enabled: &[SubsystemKind]) -> Vec<TargetDescriptor> {
    let mut descriptors: Vec<TargetDescriptor> = Vec::new();

    for kind in SubsystemKind::ALL {
        if !enabled.contains(&kind) {
            continue;
        }

        let table = match catalog.probe(kind) {
            Ok(Some(table)) if !table.is_empty() => table,
            Ok(_) => {
                tracing::debug!("{}: not available", kind);
                continue;
            }
            Err(e) => {
                tracing::warn!("{}: probe failed: {}", kind, e);
                continue;
            }
        };

        for (entry, target) in table.iter() {
            tracing::debug!("{} {}: {:#x}", kind, entry.name(), target);
        }

        if kind.family() == Family::Dxgi {
            if let Some(existing) = descriptors
                .iter_mut()
                .find(|d| d.family() == Family::Dxgi && d.table.shares_swap_chain_with(&table))
            {
                tracing::info!(
                    "{}: swap chain table shared with {}, hooking once",
                    kind,
                    existing.kind
                );
                existing.candidates |= kind.version();
                existing.shared = true;
                existing.table.merge_missing(&table);
                continue;
            }
        }

        tracing::info!(
            "{}: resolved {} entry points (Present: {:?})",
            kind,
            table.iter().count(),
            table.get(EntryPoint::Present).map(|p| format!("{p:#x}"))
        );
        descriptors.push(TargetDescriptor::new(kind, table));
    }

    descriptors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use std::collections::HashMap;
    use std::ffi::c_void;

    struct FakeCatalog {
        tables: HashMap<SubsystemKind, Result<Option<EntryTable>, ()>>,
    }

    impl TargetCatalog for FakeCatalog {
        fn probe(&self, kind: SubsystemKind) -> Result<Option<EntryTable>, ProbeError> {
            match self.tables.get(&kind) {
                Some(Ok(table)) => Ok(*table),
                Some(Err(())) => Err(ProbeError::InstanceCreation {
                    kind: kind.name(),
                    reason: "no adapter".into(),
                }),
                None => Ok(None),
            }
        }

        unsafe fn supports(&self, _handle: *mut c_void, _kind: SubsystemKind) -> bool {
            false
        }
    }

    fn swap_chain(present: usize) -> EntryTable {
        EntryTable::new()
            .with(EntryPoint::Present, present)
            .with(EntryPoint::ResizeTarget, present + 8)
            .with(EntryPoint::ResizeBuffers, present + 16)
    }

    #[test]
    fn test_shared_table_resolves_once() {
        let catalog = FakeCatalog {
            tables: HashMap::from([
                (SubsystemKind::Direct3D11, Ok(Some(swap_chain(0x1000)))),
                (
                    SubsystemKind::Direct3D12,
                    Ok(Some(
                        swap_chain(0x1000).with(EntryPoint::ExecuteCommandLists, 0x5000),
                    )),
                ),
            ]),
        };

        let descriptors = resolve(
            &catalog,
            &[SubsystemKind::Direct3D11, SubsystemKind::Direct3D12],
        );

        assert_eq!(descriptors.len(), 1);
        let d = &descriptors[0];
        assert_eq!(d.kind, SubsystemKind::Direct3D11);
        assert!(d.shared);
        assert_eq!(d.candidates, VersionSet::DIRECT3D11 | VersionSet::DIRECT3D12);
        assert_eq!(d.table.get(EntryPoint::ExecuteCommandLists), Some(0x5000));
    }

    #[test]
    fn test_distinct_tables_stay_separate() {
        let catalog = FakeCatalog {
            tables: HashMap::from([
                (SubsystemKind::Direct3D10, Ok(Some(swap_chain(0x1000)))),
                (SubsystemKind::Direct3D11, Ok(Some(swap_chain(0x2000)))),
            ]),
        };

        let descriptors = resolve(
            &catalog,
            &[SubsystemKind::Direct3D10, SubsystemKind::Direct3D11],
        );

        assert_eq!(descriptors.len(), 2);
        assert!(descriptors.iter().all(|d| !d.shared));
    }

    #[test]
    fn test_absent_and_failing_subsystems_are_skipped() {
        let catalog = FakeCatalog {
            tables: HashMap::from([
                (SubsystemKind::Direct3D9, Err(())),
                (SubsystemKind::Direct3D11, Ok(Some(EntryTable::new()))),
                (
                    SubsystemKind::CoreAudio,
                    Ok(Some(EntryTable::new().with(EntryPoint::GetBuffer, 0x40))),
                ),
            ]),
        };

        let descriptors = resolve(&catalog, &SubsystemKind::ALL);

        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].kind, SubsystemKind::CoreAudio);
        assert!(descriptors[0].candidates.is_empty());
    }

    #[test]
    fn test_disabled_subsystems_are_not_probed() {
        let catalog = FakeCatalog {
            tables: HashMap::from([
                (SubsystemKind::Direct3D10, Ok(Some(swap_chain(0x1000)))),
                (SubsystemKind::Direct3D11, Ok(Some(swap_chain(0x1000)))),
            ]),
        };

        let descriptors = resolve(&catalog, &[SubsystemKind::Direct3D11]);

        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].candidates, VersionSet::DIRECT3D11);
        assert!(!descriptors[0].shared);
    }
}

//! Active subsystem version cells
//!
//! Each family that shares a table between versions caches the version it
//! identified on the first dispatch. The cell is written once per process
//! attach and read by every later dispatch.

use std::sync::atomic::{AtomicU32, Ordering};

use rendergate_engine::{SubsystemKind, VersionSet};

/// Version of the Direct3D 9 family once identified
pub static DIRECT3D9_VERSION: ActiveVersion = ActiveVersion::new();

/// Version of the DXGI (Direct3D 10/11/12) family once identified
pub static DXGI_VERSION: ActiveVersion = ActiveVersion::new();

/// Write-once version tag
///
/// Holds at most one [`VersionSet`] bit; zero means "not identified yet".
#[derive(Debug, Default)]
pub struct ActiveVersion(AtomicU32);

impl ActiveVersion {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    pub fn get(&self) -> Option<SubsystemKind> {
        VersionSet::from_bits_truncate(self.0.load(Ordering::Acquire)).single()
    }

    /// Publish `kind` unless a version was already published
    ///
    /// Returns true for the single caller that won.
    pub fn try_set(&self, kind: SubsystemKind) -> bool {
        self.0
            .compare_exchange(0, kind.version().bits(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Release);
    }
}

/// Resolve the active version for a dispatch through a possibly shared table
///
/// A cached version is reused when it is one of `candidates`; dispatches
/// through a table that cannot belong to the cached version get `None`.
/// Otherwise `probe` runs over the candidates in priority order, newest
/// first, and the first match is published. `on_first` runs exactly once
/// per cell, on the thread that published.
///
/// The cached tag is never revisited, so a host that switches between two
/// coexisting device types keeps the first one it presented with.
pub fn identify(
    cell: &ActiveVersion,
    candidates: VersionSet,
    probe: impl Fn(SubsystemKind) -> bool,
    on_first: impl FnOnce(SubsystemKind),
) -> Option<SubsystemKind> {
    if let Some(active) = cell.get() {
        return candidates.contains(active.version()).then_some(active);
    }

    let found = candidates.in_probe_order().find(|&kind| probe(kind))?;
    if cell.try_set(found) {
        tracing::info!("Active version identified as {}", found);
        on_first(found);
        Some(found)
    } else {
        // Lost the race; defer to the winner
        cell.get()
            .filter(|active| candidates.contains(active.version()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn dxgi() -> VersionSet {
        VersionSet::DIRECT3D10 | VersionSet::DIRECT3D11 | VersionSet::DIRECT3D12
    }

    #[test]
    fn test_probes_newest_first() {
        let cell = ActiveVersion::new();
        let probed = parking_lot::Mutex::new(Vec::new());
        let found = identify(
            &cell,
            dxgi(),
            |kind| {
                probed.lock().push(kind);
                kind == SubsystemKind::Direct3D11
            },
            |_| {},
        );
        assert_eq!(found, Some(SubsystemKind::Direct3D11));
        assert_eq!(
            *probed.lock(),
            vec![SubsystemKind::Direct3D12, SubsystemKind::Direct3D11]
        );
    }

    #[test]
    fn test_cached_after_first_identification() {
        let cell = ActiveVersion::new();
        let hooked = AtomicUsize::new(0);
        for _ in 0..5 {
            let found = identify(
                &cell,
                dxgi(),
                |kind| kind == SubsystemKind::Direct3D12,
                |_| {
                    hooked.fetch_add(1, Ordering::SeqCst);
                },
            );
            assert_eq!(found, Some(SubsystemKind::Direct3D12));
        }
        assert_eq!(hooked.load(Ordering::SeqCst), 1);

        // later probes are never consulted again
        let found = identify(&cell, dxgi(), |_| panic!("probed after caching"), |_| {});
        assert_eq!(found, Some(SubsystemKind::Direct3D12));
    }

    #[test]
    fn test_cached_version_outside_candidates() {
        let cell = ActiveVersion::new();
        assert!(cell.try_set(SubsystemKind::Direct3D11));
        let found = identify(&cell, VersionSet::DIRECT3D10, |_| true, |_| {});
        assert_eq!(found, None);
    }

    #[test]
    fn test_no_match_leaves_cell_empty() {
        let cell = ActiveVersion::new();
        assert_eq!(identify(&cell, dxgi(), |_| false, |_| {}), None);
        assert_eq!(cell.get(), None);
    }

    #[test]
    fn test_single_notification_under_contention() {
        let cell = Arc::new(ActiveVersion::new());
        let hooked = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let (cell, hooked) = (cell.clone(), hooked.clone());
                std::thread::spawn(move || {
                    identify(
                        &cell,
                        dxgi(),
                        |kind| kind != SubsystemKind::Direct3D12,
                        |_| {
                            hooked.fetch_add(1, Ordering::SeqCst);
                        },
                    )
                })
            })
            .collect();

        for t in threads {
            assert_eq!(t.join().unwrap(), Some(SubsystemKind::Direct3D11));
        }
        assert_eq!(hooked.load(Ordering::SeqCst), 1);
    }
}

//! Supported subsystems and version sets

use std::fmt;

use rendergate_sdk::{RgDirect3DVersion, RgSubsystem};

/// One interceptable rendering or audio subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubsystemKind {
    Direct3D9,
    Direct3D10,
    Direct3D11,
    Direct3D12,
    CoreAudio,
}

/// Group of subsystems that share one "active version" decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// Direct3D 9 / 9Ex device
    Direct3D9,
    /// Direct3D 10, 11 and 12 share the DXGI swap chain
    Dxgi,
    /// Core Audio render client
    CoreAudio,
}

impl SubsystemKind {
    /// Every kind, in resolution order
    pub const ALL: [SubsystemKind; 5] = [
        SubsystemKind::Direct3D9,
        SubsystemKind::Direct3D10,
        SubsystemKind::Direct3D11,
        SubsystemKind::Direct3D12,
        SubsystemKind::CoreAudio,
    ];

    pub const fn family(self) -> Family {
        match self {
            SubsystemKind::Direct3D9 => Family::Direct3D9,
            SubsystemKind::Direct3D10 | SubsystemKind::Direct3D11 | SubsystemKind::Direct3D12 => {
                Family::Dxgi
            }
            SubsystemKind::CoreAudio => Family::CoreAudio,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SubsystemKind::Direct3D9 => "Direct3D9",
            SubsystemKind::Direct3D10 => "Direct3D10",
            SubsystemKind::Direct3D11 => "Direct3D11",
            SubsystemKind::Direct3D12 => "Direct3D12",
            SubsystemKind::CoreAudio => "CoreAudio",
        }
    }

    /// Bit in a [`VersionSet`], empty for non-Direct3D kinds
    pub const fn version(self) -> VersionSet {
        match self {
            SubsystemKind::Direct3D9 => VersionSet::DIRECT3D9,
            SubsystemKind::Direct3D10 => VersionSet::DIRECT3D10,
            SubsystemKind::Direct3D11 => VersionSet::DIRECT3D11,
            SubsystemKind::Direct3D12 => VersionSet::DIRECT3D12,
            SubsystemKind::CoreAudio => VersionSet::empty(),
        }
    }

    pub const fn to_raw(self) -> RgSubsystem {
        match self {
            SubsystemKind::Direct3D9 => RgSubsystem::Direct3D9,
            SubsystemKind::Direct3D10 => RgSubsystem::Direct3D10,
            SubsystemKind::Direct3D11 => RgSubsystem::Direct3D11,
            SubsystemKind::Direct3D12 => RgSubsystem::Direct3D12,
            SubsystemKind::CoreAudio => RgSubsystem::CoreAudio,
        }
    }

    pub const fn to_version_raw(self) -> RgDirect3DVersion {
        match self {
            SubsystemKind::Direct3D9 => RgDirect3DVersion::Direct3D9,
            SubsystemKind::Direct3D10 => RgDirect3DVersion::Direct3D10,
            SubsystemKind::Direct3D11 => RgDirect3DVersion::Direct3D11,
            SubsystemKind::Direct3D12 => RgDirect3DVersion::Direct3D12,
            SubsystemKind::CoreAudio => RgDirect3DVersion::Unknown,
        }
    }
}

impl fmt::Display for SubsystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags::bitflags! {
    /// Set of Direct3D versions
    ///
    /// Bit values match `RgDirect3DVersion`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VersionSet: u32 {
        const DIRECT3D9 = 1 << 0;
        const DIRECT3D10 = 1 << 1;
        const DIRECT3D11 = 1 << 2;
        const DIRECT3D12 = 1 << 3;
    }
}

impl VersionSet {
    /// Capability-probe order for an ambiguous swap chain, newest first
    pub const PROBE_ORDER: [SubsystemKind; 4] = [
        SubsystemKind::Direct3D12,
        SubsystemKind::Direct3D11,
        SubsystemKind::Direct3D10,
        SubsystemKind::Direct3D9,
    ];

    /// Members of the set in probe priority order
    pub fn in_probe_order(self) -> impl Iterator<Item = SubsystemKind> {
        Self::PROBE_ORDER
            .into_iter()
            .filter(move |kind| self.contains(kind.version()))
    }

    /// The single kind this set names, if it names exactly one
    pub fn single(self) -> Option<SubsystemKind> {
        let mut members = self.in_probe_order();
        match (members.next(), members.next()) {
            (Some(kind), None) => Some(kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_order_is_newest_first() {
        let set = VersionSet::DIRECT3D10 | VersionSet::DIRECT3D12 | VersionSet::DIRECT3D11;
        let order: Vec<_> = set.in_probe_order().collect();
        assert_eq!(
            order,
            vec![
                SubsystemKind::Direct3D12,
                SubsystemKind::Direct3D11,
                SubsystemKind::Direct3D10
            ]
        );
    }

    #[test]
    fn test_single() {
        assert_eq!(
            VersionSet::DIRECT3D11.single(),
            Some(SubsystemKind::Direct3D11)
        );
        assert_eq!((VersionSet::DIRECT3D11 | VersionSet::DIRECT3D10).single(), None);
        assert_eq!(VersionSet::empty().single(), None);
    }

    #[test]
    fn test_version_bits_match_c_values() {
        assert_eq!(
            VersionSet::DIRECT3D12.bits(),
            RgDirect3DVersion::Direct3D12 as u32
        );
        assert_eq!(
            SubsystemKind::Direct3D9.version().bits(),
            RgDirect3DVersion::Direct3D9 as u32
        );
        assert!(SubsystemKind::CoreAudio.version().is_empty());
    }
}

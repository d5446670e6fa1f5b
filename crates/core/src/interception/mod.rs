//! Interception orchestrator
//!
//! Resolves every enabled subsystem through the session's catalog and hooks
//! the resulting tables. Every hook body follows the same shape:
//!
//! 1. enter the in-flight tracker
//! 2. identify the active version (first call only)
//! 3. pre callback, original, post callback, under one captured flag
//! 4. return the original's result unchanged
//!
//! Groups are installed independently; a failed or faulting group is logged
//! and the rest of the attach continues.

mod audio;
mod d3d12;
mod d3d9;
pub(crate) mod dispatch;
mod dxgi;

use rendergate_engine::{resolve, EntryPoint, EntryTable, Family, VersionSet};

use crate::crash::translator;
use crate::hooks::{Hook, ManagedHook};
use crate::session::EngineSession;

pub use dispatch::is_published;
pub use dxgi::SLOTS as SWAP_CHAIN_SLOTS;

/// Outcome of one installation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallSummary {
    pub installed: usize,
    pub failed: usize,
    pub skipped_groups: usize,
}

/// Applies hooks for one session and records them
pub(crate) struct Installer<'s> {
    session: &'s EngineSession,
    summary: InstallSummary,
}

impl<'s> Installer<'s> {
    fn new(session: &'s EngineSession) -> Self {
        Self {
            session,
            summary: InstallSummary::default(),
        }
    }

    /// Hook `entry` of `table` if the table exposes it
    ///
    /// # Safety
    /// `detour` must have the signature of the function behind `entry`.
    pub(crate) unsafe fn attach<F>(
        &mut self,
        hook: &'static Hook<F>,
        table: &EntryTable,
        entry: EntryPoint,
        detour: F,
    ) where
        F: Copy + 'static,
        Hook<F>: Send + Sync,
    {
        let Some(target) = table.get(entry) else {
            tracing::debug!("{}: not exposed, skipping", hook.name());
            return;
        };
        match hook.install(self.session.patcher(), target, detour) {
            Ok(()) => {
                self.session.hooks().record(hook as &'static dyn ManagedHook);
                self.summary.installed += 1;
            }
            Err(_) => self.summary.failed += 1,
        }
    }
}

/// Resolve and hook every enabled subsystem of `session`
pub(crate) fn install(session: &EngineSession) -> InstallSummary {
    let enabled = session.config().enabled_kinds();
    if enabled.is_empty() {
        tracing::info!("No subsystem enabled, nothing to hook");
        return InstallSummary::default();
    }

    let descriptors = resolve(session.catalog(), &enabled);
    let mut installer = Installer::new(session);
    let mut swap_chain_slot = 0;

    for descriptor in &descriptors {
        let family = descriptor.family();
        let slot = swap_chain_slot;
        let result = translator::guard(|| unsafe {
            match family {
                Family::Direct3D9 => d3d9::install(&mut installer, &descriptor.table),
                Family::Dxgi => {
                    dxgi::install(&mut installer, slot, descriptor);
                    if descriptor.candidates.contains(VersionSet::DIRECT3D12) {
                        d3d12::install(&mut installer, &descriptor.table);
                    }
                }
                Family::CoreAudio => audio::install(&mut installer, &descriptor.table),
            }
        });
        if family == Family::Dxgi {
            swap_chain_slot += 1;
        }
        if let Err(e) = result {
            tracing::error!("{}: hooking faulted, skipping: {}", descriptor.kind, e);
            installer.summary.skipped_groups += 1;
        }
    }

    let summary = installer.summary;
    tracing::info!(
        "Installed {} hook(s) across {} table(s), {} failed",
        summary.installed,
        descriptors.len(),
        summary.failed
    );
    summary
}

//! Hook system
//!
//! - [`Hook`]: one typed, transactional redirection
//! - [`CodePatcher`]: the collaborator that applies redirections, with
//!   [`SlotPatcher`] for dispatch-table slots
//! - [`TRACKER`]: in-flight accounting shared by every hook body
//! - [`ActiveVersion`]: write-once version tags per subsystem family

pub mod hook;
pub mod manager;
pub mod patcher;
pub mod tracker;
pub mod version;
pub mod vtable;

pub use hook::Hook;
pub use manager::{HookSet, ManagedHook};
pub use patcher::{CodePatcher, PatchError, Transaction};
pub use tracker::{ActivityTracker, InFlightGuard, TRACKER};
pub use version::{identify, ActiveVersion, DIRECT3D9_VERSION, DXGI_VERSION};
pub use vtable::SlotPatcher;

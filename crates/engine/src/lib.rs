//! rendergate Engine - Target Resolution and Host Introspection
//!
//! This crate handles:
//! - Describing the supported subsystems and their entry points
//! - Probing the live process for entry-point tables via a [`TargetCatalog`]
//! - Pinning the host module and locating modules, directories and threads
//!
//! # Architecture
//!
//! Subsystem tables are discovered once per attach via [`resolver::resolve`],
//! which asks the catalog for every enabled [`SubsystemKind`] and folds
//! structurally shared swap-chain tables into a single [`TargetDescriptor`].
//!
//! # Thread Safety
//!
//! Descriptors are immutable after resolution. Catalog implementations must be
//! `Send + Sync`; the engine calls them from the worker and from hook bodies.

pub mod catalog;
pub mod error;
pub mod kind;
pub mod module;
pub mod process;
pub mod resolver;

pub use catalog::{EntryPoint, EntryTable, LifecycleTargets, TargetCatalog};
pub use error::{ModuleError, ProbeError};
pub use kind::{Family, SubsystemKind, VersionSet};
pub use module::{HostModule, ModuleLocation, ModulePin};
pub use resolver::{resolve, TargetDescriptor};

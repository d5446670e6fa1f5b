//! rendergate SDK - C ABI Type Definitions
//!
//! This crate contains the `#[repr(C)]` records exchanged with the host
//! across the exported C API. It has no dependencies so the header
//! generator and every other crate can share it.
//!
//! # Modules
//!
//! - [`interfaces`] - Opaque engine handle and event extension record
//! - [`types`] - Error codes and plain enumerations
//! - [`versions`] - Direct3D version values and entry-point indices
//! - [`callbacks`] - Per-subsystem event callback tables
//! - [`config`] - C engine configuration record
//! - [`collaborators`] - Target catalog and code patcher vtables

pub mod callbacks;
pub mod collaborators;
pub mod config;
pub mod interfaces;
pub mod types;
pub mod versions;

pub use callbacks::*;
pub use collaborators::*;
pub use config::*;
pub use interfaces::*;
pub use types::*;
pub use versions::*;

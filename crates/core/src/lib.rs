//! rendergate Core - Hooking, Lifecycle and Crash Handling
//!
//! This crate contains everything that runs inside the host process once
//! the engine is attached.
//!
//! # Re-exports
//!
//! This crate re-exports the SDK and engine crates for convenience:
//! - [`sdk`] - C ABI records and error codes
//! - [`engine`] - Target resolution and host introspection
//!
//! # Layout
//!
//! - [`hooks`] - Hook primitive, code patchers, in-flight tracker
//! - [`interception`] - Hook bodies for every supported subsystem
//! - [`session`] - Per-attach state and the session registry
//! - [`lifecycle`] - Worker thread and shutdown triggers
//! - [`crash`] - Process-wide fault reporting
//! - [`config`] / [`logging`] - Ambient configuration and log bootstrap

pub use rendergate_engine as engine;
pub use rendergate_sdk as sdk;

pub mod config;
pub mod crash;
pub mod error;
pub mod hooks;
pub mod interception;
pub mod lifecycle;
pub mod logging;
pub mod session;

pub use config::{EngineConfig, LifecycleEvents};
pub use error::{EngineError, EngineResult};
pub use hooks::{CodePatcher, Hook, PatchError, SlotPatcher, TRACKER};
pub use lifecycle::{shutdown, ShutdownOrigin, ShutdownOutcome};
pub use session::{AttachOptions, EngineSession};

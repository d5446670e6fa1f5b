//! rendergate Plugin - C API Layer
//!
//! This crate provides the FFI boundary between native hosts and the Rust
//! core. It compiles to a cdylib (.dll/.so) exporting the `rg_*` functions
//! declared in the generated `include/rendergate.h`.

pub mod ffi;

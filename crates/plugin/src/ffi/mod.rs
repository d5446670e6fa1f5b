//! Exported C API and adapters from C vtables to the core traits

pub mod catalog;
pub mod config;
pub mod exports;
pub mod patcher;

pub use catalog::CatalogAdapter;
pub use patcher::PatcherAdapter;

//! zenz-ffi: C ABI over zenz-engine
//!
//! Exposes one process-wide engine to host applications (an input method,
//! typically). All returned strings are heap allocated and must be released
//! with `zenz_string_free`.

pub mod config;
pub mod ffi;

pub use config::Settings;

//! C FFI interface
//!
//! Every function works on one process-wide engine. Inbound strings are
//! NUL-terminated UTF-8 (null pointers read as empty); outbound strings are
//! owned by the caller and released with `zenz_string_free`.

use std::ffi::{CString, c_char};
use std::sync::{LazyLock, Once, PoisonError, RwLock};

use zenz_engine::ZenzEngine;

use crate::config::Settings;

mod generate;
mod lifecycle;

#[cfg(test)]
mod tests;

pub use generate::*;
pub use lifecycle::*;

/// Borrow a C string argument as text. Returns `""` for a null pointer.
macro_rules! ffi_str {
    ($ptr:expr) => {{
        let ptr: *const ::std::ffi::c_char = $ptr;
        if ptr.is_null() {
            ::std::borrow::Cow::Borrowed("")
        } else {
            unsafe { ::std::ffi::CStr::from_ptr(ptr) }.to_string_lossy()
        }
    }};
}

pub(crate) use ffi_str;

static ENGINE: LazyLock<ZenzEngine> = LazyLock::new(ZenzEngine::new);

/// Settings applied by the last `zenz_init_from_settings`
static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

static INIT_LOGGING: Once = Once::new();

fn init_logging() {
    INIT_LOGGING.call_once(|| {
        // A host may already have installed a subscriber
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_writer(std::io::stderr)
            .try_init();
    });
}

fn engine() -> &'static ZenzEngine {
    init_logging();
    &ENGINE
}

fn settings() -> Settings {
    SETTINGS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

fn store_settings(settings: Settings) {
    *SETTINGS.write().unwrap_or_else(PoisonError::into_inner) = settings;
}

/// Hand a string to the caller. Interior NUL bytes cannot cross the
/// boundary and are dropped.
fn into_raw_string(text: String) -> *mut c_char {
    let c_string = CString::new(text).unwrap_or_else(|e| {
        let mut bytes = e.into_vec();
        bytes.retain(|&b| b != 0);
        CString::new(bytes).unwrap_or_default()
    });
    c_string.into_raw()
}

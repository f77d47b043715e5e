#![allow(clippy::not_unsafe_ptr_arg_deref)]

use std::ffi::{CString, c_char, c_int};

use crate::config::Settings;

use super::{engine, ffi_str, store_settings};

/// Load a GGUF model, replacing any loaded one.
/// Returns 0 on success, -1 on failure (the engine is then uninitialized).
#[unsafe(no_mangle)]
pub extern "C" fn zenz_init_model(path: *const c_char) -> c_int {
    let path = ffi_str!(path);
    if path.is_empty() {
        tracing::error!("zenz_init_model: empty model path");
        return -1;
    }
    match engine().init_model(&*path) {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("Failed to load model {}: {}", path, e);
            -1
        }
    }
}

/// Load the model named by the host settings file and apply its runtime
/// configuration. Returns 0 on success, -1 on failure.
#[unsafe(no_mangle)]
pub extern "C" fn zenz_init_from_settings() -> c_int {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Failed to load settings, using defaults: {:#}", e);
            Settings::default()
        }
    };
    init_with_settings(settings)
}

pub(crate) fn init_with_settings(settings: Settings) -> c_int {
    let engine = engine();
    let path = match settings.resolve_model_path() {
        Ok(path) => path,
        Err(e) => {
            tracing::error!("Failed to resolve model: {:#}", e);
            return -1;
        }
    };
    if let Err(e) = engine.init_model(&path) {
        tracing::error!("Failed to load model {}: {}", path.display(), e);
        return -1;
    }
    engine.set_runtime_config(settings.runtime.n_ctx, settings.runtime.n_threads);
    tracing::info!("zenz initialized from settings: {}", path.display());
    store_settings(settings);
    0
}

/// Release the loaded model. Returns 1 if a model was loaded, 0 otherwise.
#[unsafe(no_mangle)]
pub extern "C" fn zenz_unload_model() -> c_int {
    if engine().unload_model() { 1 } else { 0 }
}

/// Returns 1 if a model is loaded, 0 otherwise.
#[unsafe(no_mangle)]
pub extern "C" fn zenz_is_initialized() -> c_int {
    if engine().is_initialized() { 1 } else { 0 }
}

/// Set the context length and thread count for new sessions.
/// Non-positive values select the defaults; others are clamped.
#[unsafe(no_mangle)]
pub extern "C" fn zenz_set_runtime_config(n_ctx: c_int, n_threads: c_int) {
    engine().set_runtime_config(n_ctx, n_threads);
}

/// Free a string returned by this library. Null is ignored.
#[unsafe(no_mangle)]
pub extern "C" fn zenz_string_free(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    drop(unsafe { CString::from_raw(s) });
}

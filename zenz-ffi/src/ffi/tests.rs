//! These tests share the process-wide engine and never load a model.

use super::*;
use std::ffi::{CStr, CString, c_char};
use std::ptr;

use zenz_engine::NOT_INITIALIZED_TEXT;

/// RAII wrapper around a string returned by the library.
/// Frees it on drop, preventing leaks in tests.
struct OwnedString(*mut c_char);

impl OwnedString {
    fn as_str(&self) -> &str {
        assert!(!self.0.is_null());
        unsafe { CStr::from_ptr(self.0) }.to_str().unwrap()
    }
}

impl Drop for OwnedString {
    fn drop(&mut self) {
        zenz_string_free(self.0);
    }
}

fn c(s: &str) -> CString {
    CString::new(s).unwrap()
}

#[test]
fn test_generate_without_model() {
    let prompt = c("\u{ee00}カンジ\u{ee01}");
    let out = OwnedString(zenz_generate(prompt.as_ptr(), 8));
    assert_eq!(out.as_str(), NOT_INITIALIZED_TEXT);

    let left = c("");
    let input = c("カンジ");
    let out = OwnedString(zenz_generate_with_context(left.as_ptr(), input.as_ptr(), 8));
    assert_eq!(out.as_str(), NOT_INITIALIZED_TEXT);

    let profile = c("東京在住");
    let out = OwnedString(zenz_generate_with_context_and_conditions(
        profile.as_ptr(),
        ptr::null(),
        ptr::null(),
        ptr::null(),
        left.as_ptr(),
        input.as_ptr(),
        8,
    ));
    assert_eq!(out.as_str(), NOT_INITIALIZED_TEXT);

    let out = OwnedString(zenz_convert(ptr::null(), input.as_ptr()));
    assert_eq!(out.as_str(), NOT_INITIALIZED_TEXT);
}

#[test]
fn test_candidate_evaluate_without_model() {
    let input = c("カンジ");
    let candidate = c("漢字");
    let out = OwnedString(zenz_candidate_evaluate(
        ptr::null(),
        ptr::null(),
        ptr::null(),
        ptr::null(),
        ptr::null(),
        input.as_ptr(),
        candidate.as_ptr(),
    ));
    assert_eq!(out.as_str(), "ERROR");
}

#[test]
fn test_null_arguments_are_empty() {
    let out = OwnedString(zenz_generate(ptr::null(), -1));
    assert_eq!(out.as_str(), NOT_INITIALIZED_TEXT);
    let out = OwnedString(zenz_generate_with_context(ptr::null(), ptr::null(), 0));
    assert_eq!(out.as_str(), NOT_INITIALIZED_TEXT);
}

#[test]
fn test_init_model_failures() {
    assert_eq!(zenz_init_model(ptr::null()), -1);
    let missing = c("/nonexistent/zenz.gguf");
    assert_eq!(zenz_init_model(missing.as_ptr()), -1);
    assert_eq!(zenz_is_initialized(), 0);
    assert_eq!(zenz_unload_model(), 0);
}

#[test]
fn test_init_with_unresolvable_settings() {
    let mut settings = Settings::default();
    settings.model.variant = Some("nonexistent-variant".to_string());
    assert_eq!(lifecycle::init_with_settings(settings), -1);

    let mut settings = Settings::default();
    settings.model.path = Some("/nonexistent/zenz.gguf".to_string());
    assert_eq!(lifecycle::init_with_settings(settings), -1);
    assert_eq!(zenz_is_initialized(), 0);
}

#[test]
fn test_set_runtime_config_clamps() {
    zenz_set_runtime_config(100_000, 0);
    let config = engine().runtime_config();
    assert_eq!(config.context_length, 4096);
    assert_eq!(config.thread_count, 4);

    zenz_set_runtime_config(0, 0);
    assert_eq!(engine().runtime_config().context_length, 512);
}

#[test]
fn test_interior_nul_is_dropped() {
    let out = OwnedString(into_raw_string("漢\0字".to_string()));
    assert_eq!(out.as_str(), "漢字");
}

#[test]
fn test_string_free_null() {
    zenz_string_free(ptr::null_mut());
}

#[test]
fn test_max_tokens_conversion() {
    assert_eq!(generate::max_tokens(-5), 0);
    assert_eq!(generate::max_tokens(12), 12);
}

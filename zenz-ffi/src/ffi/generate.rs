#![allow(clippy::not_unsafe_ptr_arg_deref)]

use std::ffi::{c_char, c_int};

use zenz_engine::Conditions;

use super::{engine, ffi_str, into_raw_string, settings};

pub(super) fn max_tokens(n: c_int) -> usize {
    usize::try_from(n).unwrap_or(0)
}

/// Greedy generation from an already tagged prompt.
///
/// Returns `"Model not initialized"` without a model and
/// `"[error] failed to create context"` if no session could be created.
#[unsafe(no_mangle)]
pub extern "C" fn zenz_generate(prompt: *const c_char, max_new_tokens: c_int) -> *mut c_char {
    let prompt = ffi_str!(prompt);
    into_raw_string(engine().generate(&prompt, max_tokens(max_new_tokens)))
}

/// Greedy generation for `input` with optional left context.
#[unsafe(no_mangle)]
pub extern "C" fn zenz_generate_with_context(
    left_context: *const c_char,
    input: *const c_char,
    max_new_tokens: c_int,
) -> *mut c_char {
    let left_context = ffi_str!(left_context);
    let input = ffi_str!(input);
    into_raw_string(engine().generate_with_context(
        &left_context,
        &input,
        max_tokens(max_new_tokens),
    ))
}

/// Greedy generation with condition fields. Empty fields are omitted.
#[unsafe(no_mangle)]
pub extern "C" fn zenz_generate_with_context_and_conditions(
    profile: *const c_char,
    topic: *const c_char,
    style: *const c_char,
    preference: *const c_char,
    left_context: *const c_char,
    input: *const c_char,
    max_new_tokens: c_int,
) -> *mut c_char {
    let conditions = conditions_from(profile, topic, style, preference);
    let left_context = ffi_str!(left_context);
    let input = ffi_str!(input);
    into_raw_string(engine().generate_with_context_and_conditions(
        &conditions,
        &left_context,
        &input,
        max_tokens(max_new_tokens),
    ))
}

/// Evaluate `candidate` as the conversion of `input`.
///
/// Returns `PASS:<score>`, `FIX:<prefix>`, `WHOLE:<text>` or `ERROR`.
#[unsafe(no_mangle)]
pub extern "C" fn zenz_candidate_evaluate(
    profile: *const c_char,
    topic: *const c_char,
    style: *const c_char,
    preference: *const c_char,
    left_context: *const c_char,
    input: *const c_char,
    candidate: *const c_char,
) -> *mut c_char {
    let conditions = conditions_from(profile, topic, style, preference);
    let left_context = ffi_str!(left_context);
    let input = ffi_str!(input);
    let candidate = ffi_str!(candidate);
    let result = engine().candidate_evaluate(&conditions, &left_context, &input, &candidate);
    into_raw_string(result.to_string())
}

/// Convert `input` using the generation settings (conditions and token
/// limit) of the last `zenz_init_from_settings`.
#[unsafe(no_mangle)]
pub extern "C" fn zenz_convert(left_context: *const c_char, input: *const c_char) -> *mut c_char {
    let left_context = ffi_str!(left_context);
    let input = ffi_str!(input);
    let generation = settings().generation;
    into_raw_string(engine().generate_with_context_and_conditions(
        &generation.conditions(),
        &left_context,
        &input,
        generation.max_tokens,
    ))
}

fn conditions_from(
    profile: *const c_char,
    topic: *const c_char,
    style: *const c_char,
    preference: *const c_char,
) -> Conditions {
    Conditions {
        profile: ffi_str!(profile).into_owned(),
        topic: ffi_str!(topic).into_owned(),
        style: ffi_str!(style).into_owned(),
        preference: ffi_str!(preference).into_owned(),
    }
}

//! Runtime configuration for inference sessions
//!
//! A small record shared by every request. It is read once when a session is
//! created; sessions that already exist keep the values they started with.

use serde::Serialize;
use std::sync::{Mutex, PoisonError};

pub const DEFAULT_CONTEXT_LENGTH: u32 = 512;
pub const DEFAULT_THREAD_COUNT: u32 = 4;
pub const MIN_CONTEXT_LENGTH: u32 = 128;
pub const MAX_CONTEXT_LENGTH: u32 = 4096;
pub const MIN_THREAD_COUNT: u32 = 1;
pub const MAX_THREAD_COUNT: u32 = 8;

/// Parameters applied to each new inference session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuntimeConfig {
    /// Context window (KV cache size) in tokens
    pub context_length: u32,
    /// Threads used for single-token decoding
    pub thread_count: u32,
    /// Threads used for multi-token (batch) decoding
    pub batch_thread_count: u32,
    /// Maximum tokens accepted in one decode call
    pub batch_capacity: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::clamped(0, 0)
    }
}

impl RuntimeConfig {
    /// Build a config from host-supplied values.
    ///
    /// Non-positive values fall back to the defaults (512 tokens, 4 threads).
    /// The context length is clamped to [128, 4096] and the thread count to
    /// [1, 8]. Batch threads follow the thread count and batch capacity
    /// follows the context length.
    pub fn clamped(context_length: i32, thread_count: i32) -> Self {
        let context_length = u32::try_from(context_length)
            .ok()
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_CONTEXT_LENGTH)
            .clamp(MIN_CONTEXT_LENGTH, MAX_CONTEXT_LENGTH);
        let thread_count = u32::try_from(thread_count)
            .ok()
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_THREAD_COUNT)
            .clamp(MIN_THREAD_COUNT, MAX_THREAD_COUNT);

        Self {
            context_length,
            thread_count,
            batch_thread_count: thread_count,
            batch_capacity: context_length,
        }
    }
}

/// Mutex-guarded [`RuntimeConfig`] shared across requests.
#[derive(Debug, Default)]
pub struct RuntimeConfigStore {
    inner: Mutex<RuntimeConfig>,
}

impl RuntimeConfigStore {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            inner: Mutex::new(config),
        }
    }

    /// Copy of the current configuration.
    pub fn snapshot(&self) -> RuntimeConfig {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clamp and store new values, returning what was stored.
    pub fn update(&self, context_length: i32, thread_count: i32) -> RuntimeConfig {
        let config = RuntimeConfig::clamped(context_length, thread_count);
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = config;
        tracing::info!(
            "runtime config: n_ctx={}, n_threads={}",
            config.context_length,
            config.thread_count
        );
        config
    }
}

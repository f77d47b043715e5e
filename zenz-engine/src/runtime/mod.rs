//! Model runtime interface
//!
//! The engine never talks to llama.cpp directly. It drives a [`ModelRuntime`]
//! (vocabulary + tokenizer + session factory) and the [`InferenceSession`]s it
//! creates. [`llamacpp::LlamaCppRuntime`] is the production implementation.

pub mod config;
pub mod llamacpp;
#[cfg(test)]
pub(crate) mod mock;

use crate::error::{Result, ZenzError};
use crate::lossy::reconstruct_lossy;

pub use config::{RuntimeConfig, RuntimeConfigStore};
pub use llama_cpp_2::token::LlamaToken;

/// Sequence id used for single-sequence requests
pub const DEFAULT_SEQ_ID: i32 = 0;

/// Loaded model: vocabulary, tokenizer and session factory.
///
/// Shared read-only across threads once loaded.
pub trait ModelRuntime: Send + Sync {
    /// Per-request inference state (KV cache). Released on drop.
    type Session<'a>: InferenceSession
    where
        Self: 'a;

    /// Create a fresh session sized by `config`.
    fn new_session(&self, config: &RuntimeConfig) -> Result<Self::Session<'_>>;

    /// Tokenize text without BOS/EOS markers.
    fn tokenize(&self, text: &str) -> Result<Vec<LlamaToken>>;

    /// Raw byte fragment for one token (may be a partial UTF-8 sequence).
    fn token_bytes(&self, token: LlamaToken) -> Result<Vec<u8>>;

    /// Whether the token is a control token (suppressed from output).
    fn is_control(&self, token: LlamaToken) -> bool;

    /// End-of-sequence token
    fn eos_token(&self) -> LlamaToken;

    /// Number of entries in every prediction distribution
    fn n_vocab(&self) -> usize;

    /// Decode tokens to text, skipping control tokens.
    ///
    /// Fragments are concatenated as bytes first, then reconstructed lossily,
    /// so characters split across tokens survive.
    fn detokenize(&self, tokens: &[LlamaToken]) -> String {
        let mut bytes = Vec::with_capacity(tokens.len() * 3);
        for &token in tokens {
            if self.is_control(token) {
                continue;
            }
            match self.token_bytes(token) {
                Ok(piece) => bytes.extend_from_slice(&piece),
                Err(e) => tracing::warn!("token {} has no text piece: {}", token.0, e),
            }
        }
        reconstruct_lossy(&bytes)
    }

    /// Display text for one token.
    ///
    /// Fragments that are not valid UTF-8 on their own are shown as hex,
    /// e.g. `<E3><81>`.
    fn token_display(&self, token: LlamaToken) -> String {
        match self.token_bytes(token) {
            Ok(bytes) => match std::str::from_utf8(&bytes) {
                Ok(s) if s.chars().all(|c| !c.is_control() || c == ' ' || c == '\n') => {
                    s.to_string()
                }
                _ => bytes_to_hex_display(&bytes),
            },
            Err(_) => format!("<{}>", token.0),
        }
    }
}

/// Request-scoped inference state.
pub trait InferenceSession {
    /// Submit a batch. On success, logits for every entry that requested
    /// output are available through [`InferenceSession::logits`] until the
    /// next call.
    fn decode(&mut self, batch: &BatchRequest) -> Result<()>;

    /// Prediction distribution for entry `batch_index` of the last decoded
    /// batch, or `None` if that entry did not request output.
    fn logits(&self, batch_index: usize) -> Option<&[f32]>;
}

/// One (token, position, sequence) entry of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchEntry {
    pub token: LlamaToken,
    pub pos: i32,
    pub seq_id: i32,
    /// Whether the prediction distribution after this token is needed
    pub output: bool,
}

/// Ordered set of tokens submitted to a session in one decode call.
///
/// Within each sequence, positions strictly increase in insertion order.
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    entries: Vec<BatchEntry>,
}

impl BatchRequest {
    /// Create a batch sized for exactly `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Batch holding a whole sequence starting at `start_pos`.
    ///
    /// Only entries at index `output_from` and later request output.
    pub fn from_sequence(tokens: &[LlamaToken], start_pos: i32, output_from: usize) -> Result<Self> {
        let mut batch = Self::with_capacity(tokens.len());
        for (i, &token) in tokens.iter().enumerate() {
            let pos = start_pos + position_offset(i)?;
            batch.push(token, pos, DEFAULT_SEQ_ID, i >= output_from)?;
        }
        Ok(batch)
    }

    /// Append an entry.
    pub fn push(&mut self, token: LlamaToken, pos: i32, seq_id: i32, output: bool) -> Result<()> {
        if pos < 0 {
            return Err(ZenzError::InvalidBatch(format!("negative position {pos}")));
        }
        if let Some(prev) = self.entries.iter().rev().find(|e| e.seq_id == seq_id)
            && prev.pos >= pos
        {
            return Err(ZenzError::InvalidBatch(format!(
                "position {pos} does not follow {} in sequence {seq_id}",
                prev.pos
            )));
        }
        self.entries.push(BatchEntry {
            token,
            pos,
            seq_id,
            output,
        });
        Ok(())
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries requesting output
    pub fn output_count(&self) -> usize {
        self.entries.iter().filter(|e| e.output).count()
    }
}

fn position_offset(i: usize) -> Result<i32> {
    i32::try_from(i).map_err(|_| ZenzError::InvalidBatch(format!("position {i} out of range")))
}

/// Convert bytes to hex display format for partial UTF-8 sequences
pub fn bytes_to_hex_display(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("<{:02X}>", b)).collect()
}

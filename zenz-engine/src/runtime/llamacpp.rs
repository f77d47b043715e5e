//! llama.cpp based GGUF runtime
//!
//! Wraps a loaded `LlamaModel` (weights + vocabulary) and hands out one
//! `LlamaContext` per request via the llama-cpp-2 crate.

use llama_cpp_2::TokenToStringError;
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel};
use llama_cpp_2::token::LlamaToken;
use llama_cpp_2::token_type::LlamaTokenAttr;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::{BatchRequest, InferenceSession, ModelRuntime, RuntimeConfig};
use crate::error::{Result, ZenzError};

/// Initial buffer for a token piece; most pieces fit, longer ones are retried.
const PIECE_PROBE_LEN: usize = 8;

/// Global llama.cpp backend (can only be initialized once)
static LLAMA_BACKEND: OnceLock<std::result::Result<LlamaBackend, String>> = OnceLock::new();

/// Get or initialize the global llama.cpp backend
fn get_backend() -> Result<&'static LlamaBackend> {
    let result = LLAMA_BACKEND.get_or_init(|| {
        let mut backend = LlamaBackend::init().map_err(|e| e.to_string())?;
        backend.void_logs();
        Ok(backend)
    });
    match result {
        Ok(backend) => Ok(backend),
        Err(e) => Err(ZenzError::ModelLoad(
            format!("Failed to initialize llama.cpp backend: {}", e).into(),
        )),
    }
}

/// A GGUF model loaded through llama.cpp
pub struct LlamaCppRuntime {
    model: LlamaModel,
    path: PathBuf,
}

impl LlamaCppRuntime {
    /// Load a GGUF model.
    ///
    /// zenz models are small GPT-2 variants; they run on CPU only.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let backend = get_backend()?;
        let model_params = LlamaModelParams::default().with_n_gpu_layers(0);

        let model = LlamaModel::load_from_file(backend, path.as_ref(), &model_params)
            .map_err(|e| ZenzError::ModelLoad(e.into()))?;

        tracing::info!(
            "Loaded {} (n_vocab={})",
            path.as_ref().display(),
            model.n_vocab()
        );

        Ok(Self {
            model,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Path the model was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn context_params(config: &RuntimeConfig) -> LlamaContextParams {
        LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(config.context_length))
            .with_n_threads(config.thread_count as i32)
            .with_n_threads_batch(config.batch_thread_count as i32)
            .with_n_batch(config.batch_capacity)
    }
}

impl ModelRuntime for LlamaCppRuntime {
    type Session<'a>
        = LlamaCppSession<'a>
    where
        Self: 'a;

    fn new_session(&self, config: &RuntimeConfig) -> Result<LlamaCppSession<'_>> {
        let backend = get_backend()?;
        let ctx = self
            .model
            .new_context(backend, Self::context_params(config))
            .map_err(|e| ZenzError::SessionCreation(e.into()))?;

        tracing::debug!(
            "llama_context created: n_ctx={}, n_threads={}, n_batch={}",
            config.context_length,
            config.thread_count,
            config.batch_capacity
        );

        Ok(LlamaCppSession {
            ctx,
            outputs: Vec::new(),
        })
    }

    /// Tokenize through `LlamaModel::str_to_token`.
    ///
    /// llama-cpp-2 always tokenizes with special-token parsing enabled, so
    /// text that spells a control token literally (e.g. `</s>`) becomes that
    /// control token rather than plain characters. The sentinel tags are
    /// ordinary private-use characters and are not affected.
    fn tokenize(&self, text: &str) -> Result<Vec<LlamaToken>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        self.model
            .str_to_token(text, AddBos::Never)
            .map_err(|e| ZenzError::Tokenize(e.into()))
    }

    fn token_bytes(&self, token: LlamaToken) -> Result<Vec<u8>> {
        match self
            .model
            .token_to_piece_bytes(token, PIECE_PROBE_LEN, false, None)
        {
            Ok(bytes) => Ok(bytes),
            // The error carries the required size (negated)
            Err(TokenToStringError::InsufficientBufferSpace(needed)) => self
                .model
                .token_to_piece_bytes(token, needed.unsigned_abs() as usize, false, None)
                .map_err(|e| ZenzError::Tokenize(e.into())),
            Err(e) => Err(ZenzError::Tokenize(e.into())),
        }
    }

    fn is_control(&self, token: LlamaToken) -> bool {
        self.model.token_attr(token).contains(LlamaTokenAttr::Control)
    }

    fn eos_token(&self) -> LlamaToken {
        self.model.token_eos()
    }

    fn n_vocab(&self) -> usize {
        usize::try_from(self.model.n_vocab()).unwrap_or(0)
    }
}

/// One llama.cpp context, freed when dropped.
pub struct LlamaCppSession<'a> {
    ctx: LlamaContext<'a>,
    /// Output flags of the last successfully decoded batch
    outputs: Vec<bool>,
}

impl InferenceSession for LlamaCppSession<'_> {
    fn decode(&mut self, batch: &BatchRequest) -> Result<()> {
        self.outputs.clear();

        // Sized to the request rather than a fixed 512 so long inputs fit
        let mut llama_batch = LlamaBatch::new(batch.len().max(1), 1);
        for entry in batch.entries() {
            llama_batch
                .add(entry.token, entry.pos, &[entry.seq_id], entry.output)
                .map_err(|e| ZenzError::InvalidBatch(e.to_string()))?;
        }

        self.ctx
            .decode(&mut llama_batch)
            .map_err(|e| ZenzError::Decode(e.into()))?;
        tracing::trace!(
            "decoded {} tokens ({} outputs)",
            batch.len(),
            batch.output_count()
        );

        self.outputs = batch.entries().iter().map(|e| e.output).collect();
        Ok(())
    }

    fn logits(&self, batch_index: usize) -> Option<&[f32]> {
        if !self.outputs.get(batch_index).copied().unwrap_or(false) {
            return None;
        }
        let index = i32::try_from(batch_index).ok()?;
        Some(self.ctx.get_logits_ith(index))
    }
}

//! Process-wide engine: model slot, runtime configuration and entry points
//!
//! Each entry point comes in two forms. `try_*` methods return a typed
//! [`Result`]; the plain methods recover every failure into the value hosts
//! expect (a sentinel text or [`CandidateEvaluation::Error`]).

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::decode::{CandidateEvaluation, GreedyOutput, greedy_decode};
use crate::decode::evaluate::try_evaluate_candidate;
use crate::error::{Result, ZenzError};
use crate::prompt::{Conditions, build_context_prompt, build_prompt};
use crate::runtime::llamacpp::LlamaCppRuntime;
use crate::runtime::{ModelRuntime, RuntimeConfig, RuntimeConfigStore};
use crate::text::normalize_text;

/// Returned by the generate family when no model is loaded
pub const NOT_INITIALIZED_TEXT: &str = "Model not initialized";
/// Returned by the generate family when no session could be created
pub const SESSION_ERROR_TEXT: &str = "[error] failed to create context";

/// One token of a tokenized text, for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPiece {
    pub id: i32,
    /// Token text, or hex bytes for fragments that are not text on their own
    pub display: String,
}

/// Shared generation engine.
///
/// Requests hold the read side of the model slot for their whole duration,
/// so loading or unloading a model waits for in-flight requests and never
/// overlaps one.
pub struct ZenzEngine<R = LlamaCppRuntime> {
    model: RwLock<Option<R>>,
    config: RuntimeConfigStore,
}

impl<R: ModelRuntime> Default for ZenzEngine<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ModelRuntime> ZenzEngine<R> {
    /// Engine with no model loaded and the default runtime configuration.
    pub fn new() -> Self {
        Self {
            model: RwLock::new(None),
            config: RuntimeConfigStore::default(),
        }
    }

    pub fn with_runtime(runtime: R) -> Self {
        let engine = Self::new();
        engine.install_model(runtime);
        engine
    }

    fn read_model(&self) -> RwLockReadGuard<'_, Option<R>> {
        self.model.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_model(&self) -> RwLockWriteGuard<'_, Option<R>> {
        self.model.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the loaded model.
    pub fn install_model(&self, runtime: R) {
        *self.write_model() = Some(runtime);
    }

    /// Load a model with `load`, replacing the current one.
    ///
    /// The previous model is released before loading starts. If loading
    /// fails the engine is left uninitialized.
    pub fn load_with<F>(&self, load: F) -> Result<()>
    where
        F: FnOnce() -> Result<R>,
    {
        let mut slot = self.write_model();
        *slot = None;
        *slot = Some(load()?);
        Ok(())
    }

    /// Release the loaded model. Returns whether one was loaded.
    pub fn unload_model(&self) -> bool {
        let was_loaded = self.write_model().take().is_some();
        if was_loaded {
            tracing::info!("model unloaded");
        }
        was_loaded
    }

    pub fn is_initialized(&self) -> bool {
        self.read_model().is_some()
    }

    /// Clamp and store the configuration used by sessions created from now on.
    pub fn set_runtime_config(&self, context_length: i32, thread_count: i32) -> RuntimeConfig {
        self.config.update(context_length, thread_count)
    }

    pub fn runtime_config(&self) -> RuntimeConfig {
        self.config.snapshot()
    }

    /// Greedy generation from an already tagged prompt.
    pub fn try_generate(&self, prompt: &str, max_tokens: usize) -> Result<GreedyOutput> {
        let guard = self.read_model();
        let runtime = guard.as_ref().ok_or(ZenzError::NotInitialized)?;
        let config = self.config.snapshot();
        greedy_decode(runtime, &config, &normalize_text(prompt), max_tokens)
    }

    pub fn try_generate_with_context(
        &self,
        left_context: &str,
        input: &str,
        max_tokens: usize,
    ) -> Result<GreedyOutput> {
        self.try_generate(&build_context_prompt(left_context, input), max_tokens)
    }

    pub fn try_generate_with_context_and_conditions(
        &self,
        conditions: &Conditions,
        left_context: &str,
        input: &str,
        max_tokens: usize,
    ) -> Result<GreedyOutput> {
        self.try_generate(&build_prompt(conditions, left_context, input), max_tokens)
    }

    pub fn generate(&self, prompt: &str, max_tokens: usize) -> String {
        text_or_sentinel(self.try_generate(prompt, max_tokens))
    }

    pub fn generate_with_context(&self, left_context: &str, input: &str, max_tokens: usize) -> String {
        text_or_sentinel(self.try_generate_with_context(left_context, input, max_tokens))
    }

    pub fn generate_with_context_and_conditions(
        &self,
        conditions: &Conditions,
        left_context: &str,
        input: &str,
        max_tokens: usize,
    ) -> String {
        text_or_sentinel(self.try_generate_with_context_and_conditions(
            conditions,
            left_context,
            input,
            max_tokens,
        ))
    }

    /// Evaluate `candidate` as the conversion of `input`.
    ///
    /// Never returns `Ok(CandidateEvaluation::Error)`.
    pub fn try_candidate_evaluate(
        &self,
        conditions: &Conditions,
        left_context: &str,
        input: &str,
        candidate: &str,
    ) -> Result<CandidateEvaluation> {
        let guard = self.read_model();
        let runtime = guard.as_ref().ok_or(ZenzError::NotInitialized)?;
        let config = self.config.snapshot();
        let prompt = normalize_text(&build_prompt(conditions, left_context, input));
        try_evaluate_candidate(runtime, &config, &prompt, &normalize_text(candidate))
    }

    pub fn candidate_evaluate(
        &self,
        conditions: &Conditions,
        left_context: &str,
        input: &str,
        candidate: &str,
    ) -> CandidateEvaluation {
        match self.try_candidate_evaluate(conditions, left_context, input, candidate) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("candidate evaluation failed: {}", e);
                CandidateEvaluation::Error
            }
        }
    }

    /// Tokenize `text` as-is and describe every token.
    pub fn tokenize_display(&self, text: &str) -> Result<Vec<TokenPiece>> {
        let guard = self.read_model();
        let runtime = guard.as_ref().ok_or(ZenzError::NotInitialized)?;
        Ok(runtime
            .tokenize(text)?
            .into_iter()
            .map(|token| TokenPiece {
                id: token.0,
                display: runtime.token_display(token),
            })
            .collect())
    }
}

impl ZenzEngine<LlamaCppRuntime> {
    /// Load a GGUF model, replacing the current one.
    pub fn init_model<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.load_with(|| LlamaCppRuntime::from_file(path))
    }

    /// Path of the loaded model, if any
    pub fn model_path(&self) -> Option<PathBuf> {
        self.read_model().as_ref().map(|m| m.path().to_path_buf())
    }
}

fn text_or_sentinel(result: Result<GreedyOutput>) -> String {
    match result {
        Ok(output) => output.text,
        Err(ZenzError::NotInitialized) => NOT_INITIALIZED_TEXT.to_string(),
        Err(e) => {
            tracing::error!("generation failed: {}", e);
            SESSION_ERROR_TEXT.to_string()
        }
    }
}

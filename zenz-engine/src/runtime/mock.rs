//! Scripted in-memory runtime for tests
//!
//! Vocabulary entries are registered by name. Tokenization is greedy
//! longest-match over the text pieces; characters no piece covers are
//! dropped. Logits come from a user function of the sequence decoded so
//! far, so a test can script exactly what the "model" prefers at each
//! position.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{BatchEntry, BatchRequest, InferenceSession, LlamaToken, ModelRuntime, RuntimeConfig};
use crate::error::{Result, ZenzError};

/// End-of-sequence piece name, always token 0
pub(crate) const EOS: &str = "</s>";

type LogitsFn = dyn Fn(&[LlamaToken], usize) -> Vec<f32> + Send + Sync;

struct Piece {
    name: String,
    bytes: Vec<u8>,
    control: bool,
    /// Reachable by the tokenizer
    text: bool,
}

/// Counters shared by every session a runtime creates.
#[derive(Default)]
pub(crate) struct SessionStats {
    live: AtomicUsize,
    created: AtomicUsize,
    configs: Mutex<Vec<RuntimeConfig>>,
    batches: Mutex<Vec<Vec<BatchEntry>>>,
}

impl SessionStats {
    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub(crate) fn configs(&self) -> Vec<RuntimeConfig> {
        self.configs.lock().unwrap().clone()
    }

    /// Every batch submitted (including rejected ones), in order
    pub(crate) fn batches(&self) -> Vec<Vec<BatchEntry>> {
        self.batches.lock().unwrap().clone()
    }
}

#[derive(Default, Clone, Copy)]
struct Faults {
    fail_session: bool,
    /// Zero-based decode call (per session) that is rejected
    fail_decode_at: Option<usize>,
    withhold_logits: bool,
}

pub(crate) struct ScriptedRuntime {
    pieces: Vec<Piece>,
    logits_fn: Box<LogitsFn>,
    faults: Faults,
    stats: Arc<SessionStats>,
}

pub(crate) struct Builder {
    pieces: Vec<Piece>,
    logits_fn: Option<Box<LogitsFn>>,
    faults: Faults,
}

impl ScriptedRuntime {
    pub(crate) fn builder() -> Builder {
        Builder {
            pieces: vec![Piece {
                name: EOS.to_string(),
                bytes: EOS.as_bytes().to_vec(),
                control: true,
                text: false,
            }],
            logits_fn: None,
            faults: Faults::default(),
        }
    }

    pub(crate) fn token(&self, name: &str) -> LlamaToken {
        let id = self
            .pieces
            .iter()
            .position(|p| p.name == name)
            .unwrap_or_else(|| panic!("no piece named {name:?}"));
        LlamaToken(id as i32)
    }

    pub(crate) fn tokens_of(&self, names: &[&str]) -> Vec<LlamaToken> {
        names.iter().map(|n| self.token(n)).collect()
    }

    pub(crate) fn stats(&self) -> Arc<SessionStats> {
        Arc::clone(&self.stats)
    }

    fn piece(&self, token: LlamaToken) -> Option<&Piece> {
        usize::try_from(token.0).ok().and_then(|i| self.pieces.get(i))
    }
}

impl Builder {
    /// Register plain text pieces.
    pub(crate) fn pieces(mut self, texts: &[&str]) -> Self {
        for text in texts {
            self.pieces.push(Piece {
                name: text.to_string(),
                bytes: text.as_bytes().to_vec(),
                control: false,
                text: true,
            });
        }
        self
    }

    /// Register a piece whose bytes need not be valid UTF-8.
    pub(crate) fn byte_piece(mut self, name: &str, bytes: &[u8]) -> Self {
        self.pieces.push(Piece {
            name: name.to_string(),
            bytes: bytes.to_vec(),
            control: false,
            text: false,
        });
        self
    }

    pub(crate) fn control_piece(mut self, name: &str) -> Self {
        self.pieces.push(Piece {
            name: name.to_string(),
            bytes: name.as_bytes().to_vec(),
            control: true,
            text: false,
        });
        self
    }

    /// Model prefers `f(history)` after each position, by a wide margin.
    pub(crate) fn predict<F>(self, f: F) -> Self
    where
        F: Fn(&[LlamaToken]) -> LlamaToken + Send + Sync + 'static,
    {
        self.logits(move |history, n_vocab| {
            let mut logits = vec![0.0; n_vocab];
            if let Some(slot) = usize::try_from(f(history).0)
                .ok()
                .and_then(|i| logits.get_mut(i))
            {
                *slot = 10.0;
            }
            logits
        })
    }

    /// After the last `marker` token, prefer `continuation` in order, then EOS.
    ///
    /// Pieces named here must already be registered.
    pub(crate) fn after_marker(self, marker: &str, continuation: &[&str]) -> Self {
        let id_of = |name: &str| {
            let id = self
                .pieces
                .iter()
                .position(|p| p.name == name)
                .unwrap_or_else(|| panic!("no piece named {name:?}"));
            LlamaToken(id as i32)
        };
        let marker = id_of(marker);
        let continuation: Vec<LlamaToken> = continuation.iter().map(|n| id_of(n)).collect();
        self.predict(move |history| {
            let Some(start) = history.iter().rposition(|&t| t == marker) else {
                return LlamaToken(0);
            };
            let produced = history.len() - start - 1;
            continuation.get(produced).copied().unwrap_or(LlamaToken(0))
        })
    }

    /// Full control over the distribution after each position.
    pub(crate) fn logits<F>(mut self, f: F) -> Self
    where
        F: Fn(&[LlamaToken], usize) -> Vec<f32> + Send + Sync + 'static,
    {
        self.logits_fn = Some(Box::new(f));
        self
    }

    pub(crate) fn fail_session_creation(mut self) -> Self {
        self.faults.fail_session = true;
        self
    }

    pub(crate) fn fail_decode_at(mut self, call: usize) -> Self {
        self.faults.fail_decode_at = Some(call);
        self
    }

    pub(crate) fn withhold_logits(mut self) -> Self {
        self.faults.withhold_logits = true;
        self
    }

    pub(crate) fn build(self) -> ScriptedRuntime {
        let logits_fn = self.logits_fn.unwrap_or_else(|| {
            // Always prefer EOS
            Box::new(|_: &[LlamaToken], n_vocab: usize| {
                let mut logits = vec![0.0; n_vocab];
                logits[0] = 10.0;
                logits
            })
        });
        ScriptedRuntime {
            pieces: self.pieces,
            logits_fn,
            faults: self.faults,
            stats: Arc::new(SessionStats::default()),
        }
    }
}

impl ModelRuntime for ScriptedRuntime {
    type Session<'a>
        = ScriptedSession<'a>
    where
        Self: 'a;

    fn new_session(&self, config: &RuntimeConfig) -> Result<ScriptedSession<'_>> {
        if self.faults.fail_session {
            return Err(ZenzError::SessionCreation("injected session failure".into()));
        }
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        self.stats.live.fetch_add(1, Ordering::SeqCst);
        self.stats.configs.lock().unwrap().push(*config);
        Ok(ScriptedSession {
            runtime: self,
            history: Vec::new(),
            outputs: Vec::new(),
            decode_calls: 0,
        })
    }

    fn tokenize(&self, text: &str) -> Result<Vec<LlamaToken>> {
        let bytes = text.as_bytes();
        let mut tokens = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            let best = self
                .pieces
                .iter()
                .enumerate()
                .filter(|(_, p)| p.text && !p.bytes.is_empty() && bytes[i..].starts_with(&p.bytes))
                .max_by_key(|(_, p)| p.bytes.len());
            match best {
                Some((id, piece)) => {
                    tokens.push(LlamaToken(id as i32));
                    i += piece.bytes.len();
                }
                None => {
                    // skip one whole character
                    let width = text[i..].chars().next().map_or(1, char::len_utf8);
                    i += width;
                }
            }
        }
        Ok(tokens)
    }

    fn token_bytes(&self, token: LlamaToken) -> Result<Vec<u8>> {
        self.piece(token)
            .map(|p| p.bytes.clone())
            .ok_or_else(|| ZenzError::Tokenize(format!("unknown token {}", token.0).into()))
    }

    fn is_control(&self, token: LlamaToken) -> bool {
        self.piece(token).is_some_and(|p| p.control)
    }

    fn eos_token(&self) -> LlamaToken {
        LlamaToken(0)
    }

    fn n_vocab(&self) -> usize {
        self.pieces.len()
    }
}

pub(crate) struct ScriptedSession<'a> {
    runtime: &'a ScriptedRuntime,
    history: Vec<LlamaToken>,
    outputs: Vec<Option<Vec<f32>>>,
    decode_calls: usize,
}

impl InferenceSession for ScriptedSession<'_> {
    fn decode(&mut self, batch: &BatchRequest) -> Result<()> {
        let call = self.decode_calls;
        self.decode_calls += 1;
        self.runtime
            .stats
            .batches
            .lock()
            .unwrap()
            .push(batch.entries().to_vec());

        if self.runtime.faults.fail_decode_at == Some(call) {
            return Err(ZenzError::Decode("injected decode failure".into()));
        }

        let n_vocab = self.runtime.n_vocab();
        self.outputs.clear();
        for entry in batch.entries() {
            if entry.pos as usize != self.history.len() {
                return Err(ZenzError::InvalidBatch(format!(
                    "expected position {}, got {}",
                    self.history.len(),
                    entry.pos
                )));
            }
            self.history.push(entry.token);
            let logits = (entry.output && !self.runtime.faults.withhold_logits)
                .then(|| (self.runtime.logits_fn)(&self.history, n_vocab));
            self.outputs.push(logits);
        }
        Ok(())
    }

    fn logits(&self, batch_index: usize) -> Option<&[f32]> {
        self.outputs.get(batch_index)?.as_deref()
    }
}

impl Drop for ScriptedSession<'_> {
    fn drop(&mut self) {
        self.runtime.stats.live.fetch_sub(1, Ordering::SeqCst);
    }
}

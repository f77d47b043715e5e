//! Greedy (argmax) generation

use serde::Serialize;

use super::argmax;
use crate::error::{Result, ZenzError};
use crate::runtime::{
    BatchRequest, DEFAULT_SEQ_ID, InferenceSession, LlamaToken, ModelRuntime, RuntimeConfig,
};

/// Why generation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model preferred end-of-sequence
    EndOfSequence,
    /// `max_tokens` tokens were generated
    MaxTokens,
    /// The prompt tokenized to nothing
    EmptyPrompt,
    /// The prompt batch was rejected
    PrefillFailed,
    /// A generated token could not be submitted; output so far is kept
    StepFailed,
    /// The runtime returned no distribution for the last position
    MissingLogits,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GreedyOutput {
    pub text: String,
    pub tokens: Vec<LlamaToken>,
    pub stop: StopReason,
}

impl GreedyOutput {
    fn empty(stop: StopReason) -> Self {
        Self {
            text: String::new(),
            tokens: Vec::new(),
            stop,
        }
    }
}

/// Generate up to `max_tokens` tokens after `prompt` by repeated argmax.
///
/// `prompt` must already be normalized. Only session creation is reported as
/// an error; an empty prompt or a rejected prefill yields empty output, and a
/// failure mid-generation keeps what was generated so far. The session is
/// dropped on every path.
pub fn greedy_decode<R: ModelRuntime>(
    runtime: &R,
    config: &RuntimeConfig,
    prompt: &str,
    max_tokens: usize,
) -> Result<GreedyOutput> {
    let mut session = runtime.new_session(config)?;

    let prompt_tokens = match runtime.tokenize(prompt) {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::warn!("tokenize failed: {}", e);
            Vec::new()
        }
    };
    if prompt_tokens.is_empty() {
        tracing::debug!("prompt tokenized to nothing");
        return Ok(GreedyOutput::empty(StopReason::EmptyPrompt));
    }

    let last = prompt_tokens.len() - 1;
    let prefill = BatchRequest::from_sequence(&prompt_tokens, 0, last)
        .and_then(|batch| session.decode(&batch));
    if let Err(e) = prefill {
        tracing::warn!("prefill of {} tokens rejected: {}", prompt_tokens.len(), e);
        return Ok(GreedyOutput::empty(StopReason::PrefillFailed));
    }

    let eos = runtime.eos_token();
    // max_tokens is caller supplied; a session never holds more than n_ctx tokens
    let mut generated = Vec::with_capacity(max_tokens.min(config.context_length as usize));
    let mut logits_index = last;
    let mut pos = prompt_tokens.len();
    let mut stop = StopReason::MaxTokens;

    for _ in 0..max_tokens {
        let Some((next, _)) = session.logits(logits_index).and_then(argmax) else {
            tracing::warn!("no logits at batch index {}", logits_index);
            stop = StopReason::MissingLogits;
            break;
        };
        if next == eos {
            stop = StopReason::EndOfSequence;
            break;
        }
        generated.push(next);

        if let Err(e) = submit_one(&mut session, next, pos) {
            tracing::warn!("decode of generated token at pos {} failed: {}", pos, e);
            stop = StopReason::StepFailed;
            break;
        }
        logits_index = 0;
        pos += 1;
    }

    drop(session);
    let text = runtime.detokenize(&generated);
    tracing::debug!(
        "generated {} tokens ({:?}): {:?}",
        generated.len(),
        stop,
        text
    );

    Ok(GreedyOutput {
        text,
        tokens: generated,
        stop,
    })
}

fn submit_one<S: InferenceSession>(session: &mut S, token: LlamaToken, pos: usize) -> Result<()> {
    let pos = i32::try_from(pos)
        .map_err(|_| ZenzError::InvalidBatch(format!("position {pos} out of range")))?;
    let mut batch = BatchRequest::with_capacity(1);
    batch.push(token, pos, DEFAULT_SEQ_ID, true)?;
    session.decode(&batch)
}

//! Single-pass candidate evaluation
//!
//! The prompt and the candidate are decoded together in one batch. The
//! distribution after position `i` is the model's prediction for position
//! `i + 1`, so every position from the last prompt token onward requests
//! output. The candidate tokens are then walked in order until the model's
//! own argmax first disagrees with them.

use std::fmt;

use super::{argmax, log_prob_of};
use crate::error::{Result, ZenzError};
use crate::runtime::{BatchRequest, InferenceSession, ModelRuntime, RuntimeConfig};

/// How far the model agrees with a candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateEvaluation {
    /// Every candidate token is the model's own argmax.
    /// `score` is the summed log-probability of the candidate tokens.
    Pass { score: f32 },
    /// The model prefers another token. `prefix` is the agreed text followed
    /// by that token.
    FixRequired { prefix: String },
    /// The model would end the output here. `text` is the agreed text.
    WholeResult { text: String },
    Error,
}

impl CandidateEvaluation {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass { .. })
    }

    /// Short label of the variant, as used in the tagged form
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pass { .. } => "PASS",
            Self::FixRequired { .. } => "FIX",
            Self::WholeResult { .. } => "WHOLE",
            Self::Error => "ERROR",
        }
    }
}

/// Tagged form handed to hosts: `PASS:<score>`, `FIX:<prefix>`,
/// `WHOLE:<text>` or `ERROR`. Scores carry six fractional digits.
impl fmt::Display for CandidateEvaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass { score } => write!(f, "PASS:{score:.6}"),
            Self::FixRequired { prefix } => write!(f, "FIX:{prefix}"),
            Self::WholeResult { text } => write!(f, "WHOLE:{text}"),
            Self::Error => f.write_str("ERROR"),
        }
    }
}

/// Evaluate `candidate` as the continuation of `prompt`.
///
/// Both texts must already be normalized. Every failure is folded into
/// [`CandidateEvaluation::Error`].
pub fn evaluate_candidate<R: ModelRuntime>(
    runtime: &R,
    config: &RuntimeConfig,
    prompt: &str,
    candidate: &str,
) -> CandidateEvaluation {
    match try_evaluate_candidate(runtime, config, prompt, candidate) {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!("candidate evaluation failed: {}", e);
            CandidateEvaluation::Error
        }
    }
}

/// Like [`evaluate_candidate`], reporting why an evaluation failed.
///
/// Never returns `Ok(CandidateEvaluation::Error)`.
pub fn try_evaluate_candidate<R: ModelRuntime>(
    runtime: &R,
    config: &RuntimeConfig,
    prompt: &str,
    candidate: &str,
) -> Result<CandidateEvaluation> {
    if prompt.is_empty() {
        return Err(ZenzError::Precondition("empty prompt"));
    }
    if candidate.is_empty() {
        return Err(ZenzError::Precondition("empty candidate"));
    }

    let prompt_tokens = runtime.tokenize(prompt)?;
    if prompt_tokens.is_empty() {
        return Err(ZenzError::Precondition("prompt tokenized to nothing"));
    }
    let candidate_tokens = runtime.tokenize(candidate)?;
    if candidate_tokens.is_empty() {
        return Err(ZenzError::Precondition("candidate tokenized to nothing"));
    }

    let first_output = prompt_tokens.len() - 1;
    let mut combined = Vec::with_capacity(prompt_tokens.len() + candidate_tokens.len());
    combined.extend_from_slice(&prompt_tokens);
    combined.extend_from_slice(&candidate_tokens);
    let batch = BatchRequest::from_sequence(&combined, 0, first_output)?;

    let mut session = runtime.new_session(config)?;
    session.decode(&batch)?;

    let eos = runtime.eos_token();
    let mut score = 0.0f32;

    for (i, &expected) in candidate_tokens.iter().enumerate() {
        let index = first_output + i;
        let logits = session
            .logits(index)
            .ok_or_else(|| ZenzError::Decode(format!("no logits at batch index {index}").into()))?;
        let (best, max_logit) = argmax(logits)
            .ok_or_else(|| ZenzError::Decode("empty prediction distribution".into()))?;
        score += log_prob_of(logits, expected, max_logit)
            .ok_or(ZenzError::Precondition("candidate token outside vocabulary"))?;

        if best == expected {
            continue;
        }

        let agreed = &candidate_tokens[..i];
        tracing::debug!(
            "diverged at candidate token {}: expected {}, model prefers {}",
            i,
            expected.0,
            best.0
        );
        if best == eos {
            return Ok(CandidateEvaluation::WholeResult {
                text: runtime.detokenize(agreed),
            });
        }
        let mut corrected = agreed.to_vec();
        corrected.push(best);
        return Ok(CandidateEvaluation::FixRequired {
            prefix: runtime.detokenize(&corrected),
        });
    }

    Ok(CandidateEvaluation::Pass { score })
}

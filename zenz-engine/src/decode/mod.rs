//! Decoding over a model runtime
//!
//! - [`greedy`]: argmax generation from a prompt
//! - [`evaluate`]: single-batch scoring of a proposed candidate

pub mod evaluate;
pub mod greedy;

pub use evaluate::{CandidateEvaluation, evaluate_candidate};
pub use greedy::{GreedyOutput, StopReason, greedy_decode};

use crate::runtime::LlamaToken;

/// Highest-scoring token and its logit.
///
/// Scans in increasing token id and only a strictly greater logit replaces
/// the current best, so ties go to the lowest id. Returns `None` for an
/// empty distribution.
pub fn argmax(logits: &[f32]) -> Option<(LlamaToken, f32)> {
    let (&first, rest) = logits.split_first()?;
    let mut best_id = 0usize;
    let mut best_logit = first;
    for (offset, &logit) in rest.iter().enumerate() {
        if logit > best_logit {
            best_logit = logit;
            best_id = offset + 1;
        }
    }
    let id = i32::try_from(best_id).ok()?;
    Some((LlamaToken(id), best_logit))
}

/// Log-probability of `token` under the softmax of `logits`.
///
/// `max_logit` must be the maximum of `logits`; it keeps the exponentials in
/// range (log-sum-exp). Returns `None` if the token is outside the
/// distribution.
pub fn log_prob_of(logits: &[f32], token: LlamaToken, max_logit: f32) -> Option<f32> {
    let target = *logits.get(usize::try_from(token.0).ok()?)?;
    let sum_exp: f32 = logits.iter().map(|&x| (x - max_logit).exp()).sum();
    Some(target - max_logit - sum_exp.ln())
}

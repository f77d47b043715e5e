pub mod decode;
pub mod engine;
pub mod error;
pub mod hf_download;
pub mod lossy;
pub mod model_config;
pub mod prompt;
pub mod runtime;
pub mod text;

pub use decode::{CandidateEvaluation, GreedyOutput, StopReason};
pub use engine::{NOT_INITIALIZED_TEXT, SESSION_ERROR_TEXT, TokenPiece, ZenzEngine};
pub use error::{Result, ZenzError};
pub use lossy::reconstruct_lossy;
pub use prompt::{Conditions, build_context_prompt, build_prompt};
pub use runtime::llamacpp::LlamaCppRuntime;
pub use runtime::{ModelRuntime, RuntimeConfig};
pub use text::normalize_text;

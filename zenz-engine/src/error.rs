//! Error types for generation and candidate evaluation

/// Errors that can occur while loading a model or running inference.
#[derive(Debug, thiserror::Error)]
pub enum ZenzError {
    #[error("model not initialized")]
    NotInitialized,

    #[error("unknown model variant: '{0}'")]
    UnknownVariant(String),

    #[error("download failed")]
    Download(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("model load failed")]
    ModelLoad(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("failed to create inference session")]
    SessionCreation(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("tokenization failed")]
    Tokenize(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("batch decode rejected")]
    Decode(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    #[error("precondition failed: {0}")]
    Precondition(&'static str),
}

pub type Result<T> = std::result::Result<T, ZenzError>;

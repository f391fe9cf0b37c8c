use thiserror::Error;

use crate::providers::error::{ProviderError, ProviderErrorKind};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("tool error: {0}")]
    Tool(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("turn timed out after {secs}s")]
    TurnTimeout { secs: u64 },

    #[error("command '{command}' for '{actor}' is failing repeatedly; cooling down")]
    LoopGuard { actor: String, command: String },

    #[error("all {attempts} attempts failed; last failure: {last_reason}")]
    AttemptsExhausted {
        attempts: usize,
        last_reason: String,
        /// Kind of the last provider failure, when the last attempt failed upstream.
        last_provider_error: Option<ProviderErrorKind>,
    },
}

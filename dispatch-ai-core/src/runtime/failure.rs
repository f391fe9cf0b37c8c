use serde::Serialize;

use crate::error::Error;
use crate::providers::error::ProviderErrorKind;

/// What the user is told when a turn fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    RateLimit,
    Auth,
    LoopGuard,
    Generic,
}

impl FailureKind {
    pub fn classify(error: &Error) -> Self {
        match error {
            Error::TurnTimeout { .. } => Self::Timeout,
            Error::LoopGuard { .. } => Self::LoopGuard,
            Error::Provider(err) => Self::from_provider(err.kind),
            Error::AttemptsExhausted {
                last_provider_error: Some(kind),
                ..
            } => Self::from_provider(*kind),
            _ => Self::Generic,
        }
    }

    fn from_provider(kind: ProviderErrorKind) -> Self {
        match kind {
            ProviderErrorKind::Timeout => Self::Timeout,
            ProviderErrorKind::RateLimit => Self::RateLimit,
            ProviderErrorKind::Auth | ProviderErrorKind::Billing => Self::Auth,
            _ => Self::Generic,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::Auth => "auth",
            Self::LoopGuard => "loop_guard",
            Self::Generic => "generic",
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            Self::Timeout => {
                "That took too long and I had to stop. Try a smaller request or try again in a moment."
            }
            Self::RateLimit => {
                "The model service is rate limiting me right now. Please try again in a minute."
            }
            Self::Auth => {
                "I can't reach the model service with the current credentials. An admin needs to check the API key or billing."
            }
            Self::LoopGuard => {
                "This command has failed several times in a row, so I'm pausing it for a few minutes. Try rephrasing or wait a bit."
            }
            Self::Generic => "Something went wrong while handling that. Please try again.",
        }
    }
}

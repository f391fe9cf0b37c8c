use std::fmt;

/// Classified provider failure. Callers use the kind to pick a recovery strategy.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub status: Option<u16>,
    pub message: String,
    /// Seconds to wait before retrying, from a 429 body when the provider sends one.
    pub retry_after_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// 401/403
    Auth,
    /// 402
    Billing,
    /// 429
    RateLimit,
    /// 404 or unknown model.
    NotFound,
    Timeout,
    Network,
    /// 5xx
    ServerError,
    /// Response body could not be decoded.
    Malformed,
    /// Remaining 4xx responses.
    Client,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            401 | 403 => ProviderErrorKind::Auth,
            402 => ProviderErrorKind::Billing,
            404 => ProviderErrorKind::NotFound,
            408 => ProviderErrorKind::Timeout,
            429 => ProviderErrorKind::RateLimit,
            500..=599 => ProviderErrorKind::ServerError,
            _ => ProviderErrorKind::Client,
        };

        let retry_after_secs = if kind == ProviderErrorKind::RateLimit {
            extract_retry_after(body)
        } else {
            None
        };

        Self {
            kind,
            status: Some(status),
            message: truncate_body(body),
            retry_after_secs,
        }
    }

    pub fn network(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ProviderErrorKind::Timeout
        } else if err.is_decode() {
            ProviderErrorKind::Malformed
        } else {
            ProviderErrorKind::Network
        };
        Self::new(kind, err.to_string())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Malformed, message)
    }

    /// Worth retrying with the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ProviderErrorKind::RateLimit
                | ProviderErrorKind::Timeout
                | ProviderErrorKind::Network
                | ProviderErrorKind::ServerError
                | ProviderErrorKind::Malformed
        )
    }

    /// Credentials or billing problems; no other model or rung will succeed either.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            ProviderErrorKind::Auth | ProviderErrorKind::Billing
        )
    }

    /// Request-shaped failures that end the current attempt without retrying.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind,
            ProviderErrorKind::Client | ProviderErrorKind::NotFound
        )
    }

    /// Neutral text for the end user; never includes the provider body.
    pub fn user_message(&self) -> String {
        match self.kind {
            ProviderErrorKind::Auth => {
                "The model service rejected the configured credentials.".to_owned()
            }
            ProviderErrorKind::Billing => {
                "The model service account needs attention (billing or quota).".to_owned()
            }
            ProviderErrorKind::RateLimit => match self.retry_after_secs {
                Some(secs) => format!("The model service is busy. Try again in {secs}s."),
                None => "The model service is busy. Try again shortly.".to_owned(),
            },
            ProviderErrorKind::NotFound => "The configured model is not available.".to_owned(),
            ProviderErrorKind::Timeout => "The model service took too long to answer.".to_owned(),
            ProviderErrorKind::Network | ProviderErrorKind::ServerError => {
                "The model service is unreachable right now.".to_owned()
            }
            ProviderErrorKind::Malformed | ProviderErrorKind::Client => {
                "The model service returned an unusable reply.".to_owned()
            }
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{:?} ({status}): {}", self.kind, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Handles `{"error": {"retry_after": 5}}` and `{"retry_after": 5}`, integer or float.
fn extract_retry_after(body: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let candidate = if value["error"]["retry_after"].is_null() {
        &value["retry_after"]
    } else {
        &value["error"]["retry_after"]
    };
    candidate
        .as_u64()
        .or_else(|| candidate.as_f64().map(|secs| secs.ceil() as u64))
}

fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 300;
    if body.chars().count() <= LIMIT {
        return body.to_owned();
    }
    let truncated: String = body.chars().take(LIMIT).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_status_codes() {
        assert_eq!(
            ProviderError::from_status(401, "").kind,
            ProviderErrorKind::Auth
        );
        assert_eq!(
            ProviderError::from_status(402, "").kind,
            ProviderErrorKind::Billing
        );
        assert_eq!(
            ProviderError::from_status(503, "").kind,
            ProviderErrorKind::ServerError
        );
        assert_eq!(
            ProviderError::from_status(422, "").kind,
            ProviderErrorKind::Client
        );
    }

    #[test]
    fn rate_limit_reads_retry_after_from_body() {
        let err = ProviderError::from_status(429, r#"{"error":{"retry_after":2.4}}"#);
        assert!(err.is_retryable());
        assert_eq!(err.retry_after_secs, Some(3));
    }

    #[test]
    fn auth_and_billing_are_terminal_not_retryable() {
        for status in [401, 402, 403] {
            let err = ProviderError::from_status(status, "nope");
            assert!(err.is_terminal());
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn user_messages_stay_neutral() {
        let err = ProviderError::from_status(401, "sk-secret rejected");
        assert!(!err.user_message().contains("sk-secret"));

        let err = ProviderError::from_status(429, r#"{"retry_after":7}"#);
        assert!(err.user_message().contains("7s"));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(1_000);
        let err = ProviderError::from_status(500, &body);
        assert!(err.message.len() < 320);
        assert!(err.message.ends_with("..."));
    }
}

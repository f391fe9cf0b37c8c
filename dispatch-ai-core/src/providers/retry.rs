use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::{sleep, Duration};

use crate::config::schema::RetryConfig;
use crate::providers::error::ProviderError;
use crate::providers::types::{Completion, CompletionRequest, ModelProvider};

pub const CLIENT_ERROR_PLACEHOLDER: &str =
    "I couldn't complete that request as asked. Try a simpler approach or rephrase it.";

/// Clock-derived spread, not random: calls in the same instant get the same value.
fn jitter_ms(max_jitter_ms: u64) -> u64 {
    if max_jitter_ms == 0 {
        return 0;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::from(elapsed.subsec_nanos()))
        .unwrap_or_default();
    nanos % (max_jitter_ms + 1)
}

fn retry_delay(policy: &RetryConfig, attempt: usize, error: &ProviderError) -> Duration {
    let shift = (attempt as u32).min(12);
    let exp = 1u64 << shift;
    let base = policy.base_delay_ms.saturating_mul(exp);
    let capped = base.min(policy.max_delay_ms.max(policy.base_delay_ms));
    let hinted = error
        .retry_after_secs
        .map(|secs| secs.saturating_mul(1_000).min(policy.max_delay_ms))
        .unwrap_or_default();
    Duration::from_millis(capped.max(hinted).saturating_add(jitter_ms(policy.jitter_ms)))
}

/// Sends `request`, retrying transient failures with exponential backoff and jitter.
///
/// On retry number `policy.downgrade_on_retry` the request is switched once to
/// `reliable_model`; the change stays visible in `request.model` so the caller keeps
/// using the model that answered. Client errors (4xx other than 402/429) end the attempt
/// with a degraded placeholder completion instead of an error.
pub async fn complete_with_retry(
    provider: &dyn ModelProvider,
    request: &mut CompletionRequest,
    policy: &RetryConfig,
    reliable_model: &str,
) -> std::result::Result<Completion, ProviderError> {
    let total_attempts = policy.max_retries.saturating_add(1);
    let mut downgraded = false;

    for attempt in 0..total_attempts {
        let error = match provider.complete(request).await {
            Ok(completion) => return Ok(completion),
            Err(error) => error,
        };

        if error.is_client_error() {
            tracing::warn!(
                model = %request.model,
                error = %error,
                "provider rejected request; returning placeholder for this attempt"
            );
            return Ok(Completion {
                text: Some(CLIENT_ERROR_PLACEHOLDER.to_owned()),
                degraded: true,
                ..Completion::default()
            });
        }

        if !error.is_retryable() || attempt + 1 >= total_attempts {
            return Err(error);
        }

        let retry_number = attempt + 1;
        if !downgraded
            && retry_number == policy.downgrade_on_retry
            && request.model != reliable_model
        {
            tracing::warn!(
                from = %request.model,
                to = reliable_model,
                retry_number,
                "downgrading to reliable model for remaining retries"
            );
            request.model = reliable_model.to_owned();
            downgraded = true;
        }

        let delay = retry_delay(policy, attempt, &error);
        tracing::warn!(
            model = %request.model,
            error = %error,
            attempt,
            total_attempts,
            delay_ms = delay.as_millis(),
            "retrying completion after transient provider error"
        );
        sleep(delay).await;
    }

    Err(ProviderError::malformed(
        "completion retry budget was exhausted",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::error::ProviderErrorKind;
    use crate::testing::{fast_retry, sample_request, ScriptedProvider};

    #[test]
    fn jitter_stays_within_its_bound() {
        assert_eq!(jitter_ms(0), 0);
        for _ in 0..50 {
            assert!(jitter_ms(7) <= 7);
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_then_succeeds() {
        let provider = ScriptedProvider::new(vec![
            Err(ProviderError::from_status(503, "busy")),
            Ok(Completion::text("hello")),
        ]);
        let mut request = sample_request("primary/model");

        let completion = complete_with_retry(&provider, &mut request, &fast_retry(), "safe/model")
            .await
            .expect("second attempt succeeds");

        assert_eq!(completion.text.as_deref(), Some("hello"));
        assert_eq!(provider.request_count(), 2);
        assert_eq!(request.model, "primary/model");
    }

    #[tokio::test]
    async fn downgrades_to_reliable_model_on_second_retry() {
        let provider = ScriptedProvider::new(vec![
            Err(ProviderError::from_status(500, "")),
            Err(ProviderError::from_status(502, "")),
            Ok(Completion::text("ok")),
        ]);
        let mut request = sample_request("primary/model");

        complete_with_retry(&provider, &mut request, &fast_retry(), "safe/model")
            .await
            .expect("third attempt succeeds");

        let models = provider.models_seen();
        assert_eq!(models, vec!["primary/model", "primary/model", "safe/model"]);
        assert_eq!(request.model, "safe/model");
    }

    #[tokio::test]
    async fn client_error_yields_degraded_placeholder_without_retry() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::from_status(400, "bad"))]);
        let mut request = sample_request("primary/model");

        let completion = complete_with_retry(&provider, &mut request, &fast_retry(), "safe/model")
            .await
            .expect("client errors are not raised");

        assert!(completion.degraded);
        assert_eq!(completion.text.as_deref(), Some(CLIENT_ERROR_PLACEHOLDER));
        assert_eq!(provider.request_count(), 1);
    }

    #[tokio::test]
    async fn auth_error_is_returned_immediately() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::from_status(401, ""))]);
        let mut request = sample_request("primary/model");

        let error = complete_with_retry(&provider, &mut request, &fast_retry(), "safe/model")
            .await
            .expect_err("auth failures are terminal");

        assert_eq!(error.kind, ProviderErrorKind::Auth);
        assert_eq!(provider.request_count(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_retry_budget() {
        let provider = ScriptedProvider::new(
            (0..4)
                .map(|_| Err(ProviderError::from_status(429, "")))
                .collect(),
        );
        let mut request = sample_request("primary/model");

        let error = complete_with_retry(&provider, &mut request, &fast_retry(), "safe/model")
            .await
            .expect_err("budget exhausted");

        assert_eq!(error.kind, ProviderErrorKind::RateLimit);
        assert_eq!(provider.request_count(), 4);
    }
}

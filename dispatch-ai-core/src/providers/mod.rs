pub mod error;
pub mod openai;
pub mod retry;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use crate::config::schema::ProviderConfig;
use crate::error::{Error, Result};

pub use error::{ProviderError, ProviderErrorKind};
pub use types::{ChatMessage, Completion, CompletionRequest, ModelProvider, Role};

/// Builds the configured provider, reading its API key from the environment.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn ModelProvider>> {
    let api_key = std::env::var(&config.api_key_env).map_err(|_| {
        Error::Config(format!(
            "environment variable '{}' with the provider api key is not set",
            config.api_key_env
        ))
    })?;

    let provider = openai::OpenAiCompatibleProvider::new(
        config.name.clone(),
        &config.base_url,
        &api_key,
        Duration::from_secs(config.request_timeout_secs),
    )?;
    Ok(Arc::new(provider))
}

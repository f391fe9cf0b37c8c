use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::providers::error::ProviderError;
use crate::providers::types::{
    ChatMessage, Completion, CompletionRequest, ModelProvider, Role, ToolCallRequest,
};

/// Chat-completions provider for OpenAI-compatible endpoints (OpenAI, OpenRouter, vLLM, ...).
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    name: String,
    endpoint: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(name: String, base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        let auth = format!("Bearer {api_key}").parse().map_err(|err| {
            Error::Config(format!("provider '{name}' api key is not a valid header: {err}"))
        })?;
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| Error::Config(format!("failed to build http client: {err}")))?;

        Ok(Self {
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            name,
            client,
        })
    }

    fn message_json(message: &ChatMessage) -> Value {
        match message.role {
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": message.tool_call_id.clone().unwrap_or_default(),
                "content": message.content,
            }),
            Role::Assistant if !message.tool_calls.is_empty() => json!({
                "role": "assistant",
                "content": message.content,
                "tool_calls": message
                    .tool_calls
                    .iter()
                    .map(|call| json!({
                        "id": call.id,
                        "type": "function",
                        "function": { "name": call.name, "arguments": call.arguments },
                    }))
                    .collect::<Vec<_>>(),
            }),
            role => json!({ "role": role, "content": message.content }),
        }
    }

    fn request_body(request: &CompletionRequest) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(json!({ "role": "system", "content": request.system }));
        messages.extend(request.messages.iter().map(Self::message_json));

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        if !request.tools.is_empty() {
            body["tools"] = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect::<Vec<_>>()
                .into();
        }

        body
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
    #[serde(alias = "reasoning")]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    id: Option<String>,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[async_trait]
impl ModelProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<Completion, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(request.timeout)
            .json(&Self::request_body(request))
            .send()
            .await
            .map_err(|err| ProviderError::network(&err))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ProviderError::network(&err))?;

        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|err| {
            ProviderError::malformed(format!("undecodable completion payload: {err}"))
        })?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::malformed("completion payload had no choices"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .enumerate()
            .map(|(index, call)| ToolCallRequest {
                id: call.id.unwrap_or_else(|| format!("call_{index}")),
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        Ok(Completion {
            text: choice.message.content.filter(|text| !text.trim().is_empty()),
            tool_calls,
            reasoning: choice.message.reasoning_content,
            degraded: false,
        })
    }
}

//! Test doubles shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::schema::{Config, RetryConfig};
use crate::conversation::transport::ChatTransport;
use crate::conversation::types::{MessageHandle, Turn, TurnRole};
use crate::error::{Error, Result};
use crate::providers::error::{ProviderError, ProviderErrorKind};
use crate::providers::types::{
    ChatMessage, Completion, CompletionRequest, ModelProvider, ToolCallRequest,
};
use crate::tools::types::{ToolBackend, ToolInvocation, ToolOutput};

/// A user turn whose timestamp orders by `seconds`.
pub fn turn(id: &str, text: &str, seconds: i64) -> Turn {
    Turn {
        id: id.to_owned(),
        role: TurnRole::User,
        text: text.to_owned(),
        timestamp: DateTime::<Utc>::from_timestamp(1_700_000_000 + seconds, 0)
            .expect("valid timestamp"),
        reaction_summary: None,
    }
}

pub fn sample_request(model: &str) -> CompletionRequest {
    CompletionRequest {
        model: model.to_owned(),
        system: "You are a test assistant.".to_owned(),
        messages: vec![ChatMessage::user("hello")],
        tools: Vec::new(),
        temperature: 0.0,
        max_tokens: 64,
        timeout: Duration::from_secs(1),
    }
}

pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 3,
        base_delay_ms: 1,
        max_delay_ms: 2,
        jitter_ms: 0,
        downgrade_on_retry: 2,
    }
}

/// Default configuration with millisecond retry delays.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.retry = fast_retry();
    config.models.primary = "primary/model".to_owned();
    config.models.fast = "fast/model".to_owned();
    config.models.alternate = "alternate/model".to_owned();
    config.models.reliable = "reliable/model".to_owned();
    config
}

pub fn tool_call(id: &str, name: &str, arguments: &str) -> ToolCallRequest {
    ToolCallRequest {
        id: id.to_owned(),
        name: name.to_owned(),
        arguments: arguments.to_owned(),
    }
}

pub fn with_calls(calls: Vec<ToolCallRequest>) -> Completion {
    Completion {
        tool_calls: calls,
        ..Completion::default()
    }
}

/// Replays canned completions in order and records every request.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<std::result::Result<Completion, ProviderError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<std::result::Result<Completion, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn models_seen(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|request| request.model)
            .collect()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<Completion, ProviderError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| {
                Err(ProviderError::new(
                    ProviderErrorKind::Client,
                    "scripted provider has no more responses",
                ))
            })
    }
}

/// In-memory chat transport that records what the runtime sends.
#[derive(Default)]
pub struct RecordingTransport {
    history: Mutex<HashMap<String, Vec<Turn>>>,
    fetch_delay: Option<Duration>,
    fetches: AtomicUsize,
    failing_fetches: AtomicBool,
    failing_edits: AtomicBool,
    next_id: AtomicUsize,
    sent: Mutex<Vec<(String, String)>>,
    edits: Mutex<Vec<(MessageHandle, String)>>,
}

impl RecordingTransport {
    pub fn with_fetch_delay(delay: Duration) -> Self {
        Self {
            fetch_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn seed_history(&self, conversation_id: &str, turns: Vec<Turn>) {
        self.history
            .lock()
            .expect("history lock")
            .insert(conversation_id.to_owned(), turns);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.failing_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_edits(&self, fail: bool) {
        self.failing_edits.store(fail, Ordering::SeqCst);
    }

    /// Texts passed to `send`, in order.
    pub fn sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .expect("sent lock")
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Texts passed to successful `edit` calls, in order.
    pub fn edits(&self) -> Vec<String> {
        self.edits
            .lock()
            .expect("edits lock")
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn fetch_history(&self, conversation_id: &str, limit: usize) -> Result<Vec<Turn>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_fetches.load(Ordering::SeqCst) {
            return Err(Error::Transport("history unavailable".to_owned()));
        }

        let history = self.history.lock().expect("history lock");
        let turns = history.get(conversation_id).cloned().unwrap_or_default();
        let start = turns.len().saturating_sub(limit);
        Ok(turns[start..].to_vec())
    }

    async fn send(&self, conversation_id: &str, text: &str) -> Result<MessageHandle> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sent
            .lock()
            .expect("sent lock")
            .push((conversation_id.to_owned(), text.to_owned()));
        Ok(MessageHandle {
            conversation_id: conversation_id.to_owned(),
            message_id: format!("sent-{id}"),
        })
    }

    async fn edit(&self, handle: &MessageHandle, text: &str) -> Result<()> {
        if self.failing_edits.load(Ordering::SeqCst) {
            return Err(Error::Transport("reply window closed".to_owned()));
        }
        self.edits
            .lock()
            .expect("edits lock")
            .push((handle.clone(), text.to_owned()));
        Ok(())
    }
}

/// Tool backend returning canned outputs and tracking concurrency.
#[derive(Default)]
pub struct RecordingBackend {
    responses: Mutex<HashMap<String, VecDeque<Result<ToolOutput>>>>,
    calls: Mutex<Vec<ToolInvocation>>,
    delay: Option<Duration>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl RecordingBackend {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Queues a response for the next call of `tool`. Unscripted calls answer `"<tool> ok"`.
    pub fn respond(&self, tool: &str, output: Result<ToolOutput>) {
        self.responses
            .lock()
            .expect("responses lock")
            .entry(tool.to_owned())
            .or_default()
            .push_back(output);
    }

    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_names(&self) -> Vec<&'static str> {
        self.calls().iter().map(ToolInvocation::name).collect()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolBackend for RecordingBackend {
    async fn execute(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(invocation.clone());

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let scripted = self
            .responses
            .lock()
            .expect("responses lock")
            .get_mut(invocation.name())
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| Ok(ToolOutput::ok(format!("{} ok", invocation.name()))))
    }
}

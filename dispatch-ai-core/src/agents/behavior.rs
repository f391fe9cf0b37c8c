use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::Value;

use crate::agents::prompt::{self, FINAL_ANSWER_NUDGE, NO_CHANGES_MADE};
use crate::agents::state::{LoopState, StopReason, ToolCallRecord};
use crate::config::schema::{AgentLoopConfig, Config, ModelConfig, RetryConfig, ToolPolicy};
use crate::conversation::actions::{ActionCache, ActionRecord};
use crate::error::Result;
use crate::events::{Event, EventBus};
use crate::providers::retry::complete_with_retry;
use crate::providers::types::{
    ChatMessage, Completion, CompletionRequest, ModelProvider, ToolCallRequest, ToolDefinition,
};
use crate::tools::catalog;
use crate::tools::types::{ToolBackend, ToolInvocation, ToolOutput};

const MAX_TOOL_MESSAGE_CHARS: usize = 12_000;
const MAX_RECORDED_OUTPUT_CHARS: usize = 500;
const MAX_ACTION_SUMMARY_CHARS: usize = 160;

/// Everything one loop invocation needs besides the shared collaborators.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub conversation_id: String,
    pub system_prompt: String,
    pub history: Vec<ChatMessage>,
    /// Extra system-prompt blocks such as recent actions or routing guidance.
    pub context_blocks: Vec<String>,
    pub user_message: String,
    pub tools: ToolPolicy,
    pub model: String,
    /// The advisory intent expects a change. Disables the read-only cap (unless configured
    /// otherwise) and enables the false-success check.
    pub write_intent: bool,
}

#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub text: String,
    pub degraded: bool,
    pub stop: StopReason,
    pub iterations: usize,
    pub primary_actions: usize,
    pub tool_calls: Vec<ToolCallRecord>,
    /// Model that produced the final answer.
    pub model: String,
}

struct CallResult {
    output: ToolOutput,
    duration: Duration,
}

impl CallResult {
    fn refused(message: impl Into<String>) -> Self {
        Self {
            output: ToolOutput::failed(message),
            duration: Duration::ZERO,
        }
    }
}

struct PreparedCall {
    call: ToolCallRequest,
    invocation: std::result::Result<ToolInvocation, String>,
}

struct BatchSummary {
    all_read_only: bool,
    primary_actions: usize,
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str("\n[truncated]");
    truncated
}

fn render_tool_message(output: &ToolOutput) -> String {
    if output.success {
        truncate_chars(&output.text, MAX_TOOL_MESSAGE_CHARS)
    } else {
        format!("Error: {}", truncate_chars(&output.text, MAX_TOOL_MESSAGE_CHARS))
    }
}

/// Drives one model turn to convergence through tool calls.
#[derive(Clone)]
pub struct AgentLoop {
    provider: Arc<dyn ModelProvider>,
    tools: Arc<dyn ToolBackend>,
    actions: Arc<ActionCache>,
    events: EventBus,
    config: AgentLoopConfig,
    retry: RetryConfig,
    models: ModelConfig,
    request_timeout: Duration,
}

impl AgentLoop {
    pub fn new(
        config: &Config,
        provider: Arc<dyn ModelProvider>,
        tools: Arc<dyn ToolBackend>,
        actions: Arc<ActionCache>,
        events: EventBus,
    ) -> Self {
        Self {
            provider,
            tools,
            actions,
            events,
            config: config.agent.clone(),
            retry: config.retry.clone(),
            models: config.models.clone(),
            request_timeout: Duration::from_secs(config.provider.request_timeout_secs.max(1)),
        }
    }

    pub async fn run(&self, request: AgentRequest) -> Result<LoopOutcome> {
        let allow_switch = !self.models.switchable.is_empty();
        let offered = catalog::names_for(request.tools, allow_switch);
        let definitions = catalog::tools_for(request.tools, allow_switch);
        let system = prompt::compose_system(&request.system_prompt, &request.context_blocks);
        let mut messages = prompt::initial_messages(&request.history, &request.user_message);
        let mut state = LoopState::new(request.model.clone());

        let max_iterations = self.config.max_iterations.max(1);
        let max_read_only = self.config.max_read_only_iterations.max(1);
        let read_only_cap_applies =
            !request.write_intent || self.config.read_only_cap_for_write_intents;

        let (stop, mut completion) = loop {
            if state.iteration >= max_iterations {
                tracing::info!(
                    conversation_id = %request.conversation_id,
                    iterations = state.iteration,
                    "iteration cap reached"
                );
                break (StopReason::IterationCap, Completion::default());
            }
            state.iteration += 1;

            let completion = self
                .complete(
                    &request.conversation_id,
                    &mut state,
                    &system,
                    &messages,
                    definitions.clone(),
                )
                .await?;

            if completion.degraded {
                break (StopReason::Degraded, completion);
            }
            if completion.tool_calls.is_empty() {
                break (StopReason::Completed, completion);
            }

            messages.push(ChatMessage::assistant_with_calls(
                completion.text_or_empty(),
                completion.tool_calls.clone(),
            ));
            let (tool_messages, batch) = self
                .execute_batch(&request, &mut state, &offered, &completion.tool_calls)
                .await;
            messages.extend(tool_messages);

            if batch.primary_actions > 0 {
                break (StopReason::PrimaryAction, Completion::default());
            }
            let streak = state.note_batch(batch.all_read_only);
            if read_only_cap_applies && batch.all_read_only && streak >= max_read_only {
                tracing::info!(
                    conversation_id = %request.conversation_id,
                    streak,
                    "read-only iterations exhausted"
                );
                break (StopReason::ReadOnlyExhausted, Completion::default());
            }
        };

        if stop.needs_final_completion() {
            completion = self
                .final_completion(&request.conversation_id, &mut state, &system, &messages)
                .await?;
        }

        Ok(self.finish(&request, state, stop, completion))
    }

    async fn complete(
        &self,
        conversation_id: &str,
        state: &mut LoopState,
        system: &str,
        messages: &[ChatMessage],
        tools: Vec<ToolDefinition>,
    ) -> Result<Completion> {
        let mut request = CompletionRequest {
            model: state.model.clone(),
            system: system.to_owned(),
            messages: messages.to_vec(),
            tools,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            timeout: self.request_timeout,
        };

        let completion = complete_with_retry(
            self.provider.as_ref(),
            &mut request,
            &self.retry,
            &self.models.reliable,
        )
        .await;

        if request.model != state.model {
            self.events.publish(Event::ModelSwitched {
                conversation_id: conversation_id.to_owned(),
                from: state.model.clone(),
                to: request.model.clone(),
                reason: "retry downgrade".to_owned(),
            });
            state.model = request.model;
        }

        completion.map_err(Into::into)
    }

    /// Tool-disabled completion that turns the transcript into a reply.
    async fn final_completion(
        &self,
        conversation_id: &str,
        state: &mut LoopState,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<Completion> {
        let mut closing = messages.to_vec();
        closing.push(ChatMessage::user(FINAL_ANSWER_NUDGE));

        match self
            .complete(conversation_id, state, system, &closing, Vec::new())
            .await
        {
            Ok(completion) => Ok(completion),
            // Changes already happened; report them rather than failing the attempt.
            Err(err) if state.primary_actions > 0 => {
                tracing::warn!(
                    conversation_id,
                    error = %err,
                    "final completion failed after primary actions; using action summary"
                );
                Ok(Completion::default())
            }
            Err(err) => Err(err),
        }
    }

    fn prepare(call: &ToolCallRequest, offered: &[&str]) -> std::result::Result<ToolInvocation, String> {
        if !offered.contains(&call.name.as_str()) {
            if catalog::is_known_tool(&call.name) {
                return Err(format!(
                    "tool '{}' is not available for this request",
                    call.name
                ));
            }
            return Err(format!("unknown tool '{}'", call.name));
        }
        ToolInvocation::parse(&call.name, &call.arguments)
    }

    /// Runs one batch: read-only calls concurrently, everything else in request order.
    /// Returns tool messages in the order the model asked for them.
    async fn execute_batch(
        &self,
        request: &AgentRequest,
        state: &mut LoopState,
        offered: &[&str],
        calls: &[ToolCallRequest],
    ) -> (Vec<ChatMessage>, BatchSummary) {
        let iteration = state.iteration;
        let prepared: Vec<PreparedCall> = calls
            .iter()
            .map(|call| PreparedCall {
                call: call.clone(),
                invocation: Self::prepare(call, offered),
            })
            .collect();

        let mut summary = BatchSummary {
            all_read_only: prepared
                .iter()
                .all(|p| matches!(&p.invocation, Ok(invocation) if invocation.is_read_only())),
            primary_actions: 0,
        };

        for prepared_call in &prepared {
            let args = match &prepared_call.invocation {
                Ok(invocation) => invocation.arguments_json(),
                Err(_) => Value::String(prepared_call.call.arguments.clone()),
            };
            self.events.publish(Event::ToolStarted {
                conversation_id: request.conversation_id.clone(),
                iteration,
                tool: prepared_call.call.name.clone(),
                args,
            });
        }

        let mut results: Vec<Option<CallResult>> = prepared.iter().map(|_| None).collect();

        let read_only: Vec<(usize, &ToolInvocation)> = prepared
            .iter()
            .enumerate()
            .filter_map(|(index, p)| match &p.invocation {
                Ok(invocation) if invocation.is_read_only() => Some((index, invocation)),
                _ => None,
            })
            .collect();
        let finished: Vec<(usize, CallResult)> = stream::iter(read_only)
            .map(|(index, invocation)| async move { (index, self.run_tool(invocation).await) })
            .buffer_unordered(self.config.max_parallel_tools.max(1))
            .collect()
            .await;
        for (index, result) in finished {
            results[index] = Some(result);
        }

        for (index, prepared_call) in prepared.iter().enumerate() {
            if results[index].is_some() {
                continue;
            }
            let result = match &prepared_call.invocation {
                Err(message) => CallResult::refused(message.clone()),
                Ok(invocation) => {
                    self.run_mutating(request, state, invocation, &mut summary)
                        .await
                }
            };
            results[index] = Some(result);
        }

        let mut messages = Vec::with_capacity(prepared.len());
        for (prepared_call, result) in prepared.iter().zip(results) {
            let result =
                result.unwrap_or_else(|| CallResult::refused("tool call was not executed"));
            let duration_ms = u64::try_from(result.duration.as_millis()).unwrap_or(u64::MAX);

            tracing::debug!(
                conversation_id = %request.conversation_id,
                iteration,
                tool = %prepared_call.call.name,
                success = result.output.success,
                duration_ms,
                "tool call finished"
            );
            self.events.publish(Event::ToolFinished {
                conversation_id: request.conversation_id.clone(),
                iteration,
                tool: prepared_call.call.name.clone(),
                success: result.output.success,
                duration_ms,
            });

            state.records.push(ToolCallRecord {
                iteration,
                call_id: prepared_call.call.id.clone(),
                tool: prepared_call.call.name.clone(),
                arguments: prepared_call
                    .invocation
                    .as_ref()
                    .map(ToolInvocation::arguments_json)
                    .unwrap_or_else(|_| Value::String(prepared_call.call.arguments.clone())),
                success: result.output.success,
                output: truncate_chars(&result.output.text, MAX_RECORDED_OUTPUT_CHARS),
                duration_ms,
            });
            messages.push(ChatMessage::tool_result(
                prepared_call.call.id.clone(),
                render_tool_message(&result.output),
            ));
        }

        (messages, summary)
    }

    async fn run_mutating(
        &self,
        request: &AgentRequest,
        state: &mut LoopState,
        invocation: &ToolInvocation,
        summary: &mut BatchSummary,
    ) -> CallResult {
        if let ToolInvocation::SwitchModel(args) = invocation {
            return self.switch_model(&request.conversation_id, state, &args.model);
        }

        if let Some(path) = invocation.edited_path() {
            if state.already_edited(path) {
                return CallResult::refused(format!(
                    "'{path}' was already changed during this request; not changing it again. Summarize the change for the user instead."
                ));
            }
        }

        let result = self.run_tool(invocation).await;
        if !result.output.success {
            return result;
        }

        if let Some(kind) = invocation.action_kind() {
            state.primary_actions += 1;
            summary.primary_actions += 1;
            if let Some(path) = invocation.edited_path() {
                state.mark_edited(path);
            }

            let targets = invocation.targets();
            state.action_summaries.push(if targets.is_empty() {
                kind.to_string()
            } else {
                format!("{kind} {}", targets.join(" -> "))
            });
            self.actions.record(
                &request.conversation_id,
                ActionRecord {
                    kind,
                    targets,
                    summary: truncate_chars(&result.output.text, MAX_ACTION_SUMMARY_CHARS),
                    timestamp: Utc::now(),
                },
            );
            tracing::info!(
                conversation_id = %request.conversation_id,
                tool = invocation.name(),
                "primary action performed"
            );
        }
        result
    }

    fn switch_model(&self, conversation_id: &str, state: &mut LoopState, model: &str) -> CallResult {
        if !self.models.switchable.iter().any(|candidate| candidate == model) {
            return CallResult::refused(format!(
                "model '{model}' is not available; choose one of: {}",
                self.models.switchable.join(", ")
            ));
        }
        if state.model != model {
            self.events.publish(Event::ModelSwitched {
                conversation_id: conversation_id.to_owned(),
                from: state.model.clone(),
                to: model.to_owned(),
                reason: "requested by agent".to_owned(),
            });
            state.model = model.to_owned();
        }
        CallResult {
            output: ToolOutput::ok(format!("now using model '{model}'; continue with the request")),
            duration: Duration::ZERO,
        }
    }

    async fn run_tool(&self, invocation: &ToolInvocation) -> CallResult {
        let started = Instant::now();
        let timeout = Duration::from_secs(self.config.tool_timeout_secs.max(1));
        let output = match tokio::time::timeout(timeout, self.tools.execute(invocation)).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => ToolOutput::failed(err.to_string()),
            Err(_) => ToolOutput::failed(format!(
                "'{}' timed out after {}s",
                invocation.name(),
                timeout.as_secs()
            )),
        };
        CallResult {
            output,
            duration: started.elapsed(),
        }
    }

    fn finish(
        &self,
        request: &AgentRequest,
        state: LoopState,
        stop: StopReason,
        completion: Completion,
    ) -> LoopOutcome {
        let mut text = completion.text_or_empty().trim().to_owned();

        if !completion.degraded
            && request.write_intent
            && state.primary_actions == 0
            && prompt::claims_success(&text)
        {
            tracing::warn!(
                conversation_id = %request.conversation_id,
                "reply claims changes but no primary action ran; replacing it"
            );
            text = NO_CHANGES_MADE.to_owned();
        }

        // A synthesized no-op reply counts as degraded so callers may still retry.
        let mut degraded = completion.degraded;
        if text.is_empty() {
            if state.primary_actions > 0 {
                text = format!(
                    "Completed {} action(s): {}.",
                    state.primary_actions,
                    state.action_summaries.join("; ")
                );
            } else {
                text = prompt::NOTHING_COMPLETED.to_owned();
                degraded = true;
            }
        }

        tracing::info!(
            conversation_id = %request.conversation_id,
            iterations = state.iteration,
            primary_actions = state.primary_actions,
            stop = ?stop,
            model = %state.model,
            "agent loop finished"
        );

        LoopOutcome {
            text,
            degraded,
            stop,
            iterations: state.iteration,
            primary_actions: state.primary_actions,
            tool_calls: state.records,
            model: state.model,
        }
    }
}

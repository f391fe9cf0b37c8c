pub mod cleanup;
pub mod failure;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agents::prompt::DEFAULT_SYSTEM_PROMPT;
use crate::agents::{AgentLoop, AgentRequest};
use crate::config::schema::ToolPolicy;
use crate::config::Config;
use crate::conversation::{
    ActionCache, ChatTransport, ConversationCache, InboundTurn, MessageHandle, Turn, TurnRole,
};
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::guard::ErrorLoopGuard;
use crate::intent::{Intent, IntentClassifier, IntentKind};
use crate::orchestrator::{LadderRequest, Orchestrator};
use crate::providers::types::{ChatMessage, ModelProvider};
use crate::routing::{RoutingContext, RoutingPlan, RoutingPlanner};
use crate::tools::ToolBackend;

pub use cleanup::clean_response;
pub use failure::FailureKind;

/// Result of one handled turn, as delivered to the chat.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub conversation_id: String,
    pub text: String,
    pub failure: Option<FailureKind>,
    pub primary_actions: usize,
    /// Fast path or ladder strategy that produced the reply.
    pub strategy: Option<String>,
}

impl TurnReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

struct Reply {
    text: String,
    primary_actions: usize,
    strategy: String,
}

/// Wires the caches, guard, classifiers, agent loop and ladder into one turn handler.
pub struct Runtime {
    config: Config,
    transport: Arc<dyn ChatTransport>,
    conversations: ConversationCache,
    actions: Arc<ActionCache>,
    guard: Arc<ErrorLoopGuard>,
    classifier: IntentClassifier,
    planner: RoutingPlanner,
    agent: AgentLoop,
    orchestrator: Orchestrator,
    events: EventBus,
    system_prompt: String,
}

impl Runtime {
    pub fn new(
        config: Config,
        provider: Arc<dyn ModelProvider>,
        tools: Arc<dyn ToolBackend>,
        transport: Arc<dyn ChatTransport>,
        events: EventBus,
    ) -> Self {
        let actions = Arc::new(ActionCache::new(config.action_cache.clone()));
        let guard = Arc::new(ErrorLoopGuard::new(config.error_guard.clone()));
        let conversations =
            ConversationCache::new(transport.clone(), config.conversation_cache.clone());
        let classifier = IntentClassifier::new(
            Some(provider.clone()),
            config.models.fast.clone(),
            config.intent.clone(),
        );
        let planner = RoutingPlanner::new(
            Some(provider.clone()),
            config.models.fast.clone(),
            config.routing.clone(),
        );
        let agent = AgentLoop::new(&config, provider, tools, actions.clone(), events.clone());
        let orchestrator = Orchestrator::new(&config, agent.clone(), events.clone());
        let system_prompt = config
            .agent
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_owned());

        Self {
            config,
            transport,
            conversations,
            actions,
            guard,
            classifier,
            planner,
            agent,
            orchestrator,
            events,
            system_prompt,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn actions(&self) -> &Arc<ActionCache> {
        &self.actions
    }

    pub fn conversations(&self) -> &ConversationCache {
        &self.conversations
    }

    /// Periodically drops expired guard streaks and action lists until `cancel` fires.
    pub fn spawn_sweeper(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let guard = self.guard.clone();
        let actions = self.actions.clone();
        let period = Duration::from_secs(self.config.transport.sweep_interval_secs.max(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let streaks = guard.sweep();
                        let lists = actions.sweep();
                        if streaks + lists > 0 {
                            tracing::debug!(streaks, lists, "swept expired state");
                        }
                    }
                }
            }
        })
    }

    /// Overall budget for one turn, kept inside the transport's reply window.
    fn turn_deadline(&self) -> Duration {
        let mut secs = self.config.orchestrator.turn_timeout_secs.max(1);
        if let Some(window) = self.config.transport.reply_window_secs {
            let usable = window
                .saturating_sub(self.config.transport.reply_margin_secs)
                .max(1);
            secs = secs.min(usable);
        }
        Duration::from_secs(secs)
    }

    pub async fn handle_turn(&self, turn: InboundTurn) -> TurnReport {
        let started = Instant::now();
        let conversation_id = turn.conversation_id.clone();
        self.events.publish(Event::TurnStarted {
            conversation_id: conversation_id.clone(),
            actor_id: turn.actor_id.clone(),
            command_id: turn.command_id.clone(),
        });

        // A live streak counts this attempt now, so a refusal never reaches the model.
        let counted_upfront = self.guard.has_streak(&turn.actor_id, &turn.command_id);
        if counted_upfront && self.guard.check_and_record(&turn.actor_id, &turn.command_id) {
            tracing::warn!(
                conversation_id = %conversation_id,
                actor = %turn.actor_id,
                command = %turn.command_id,
                "refusing repeatedly failing command"
            );
            let error = Error::LoopGuard {
                actor: turn.actor_id.clone(),
                command: turn.command_id.clone(),
            };
            return self.fail(&turn, None, &error, false, started).await;
        }

        let placeholder = match self
            .transport
            .send(&conversation_id, &self.config.transport.placeholder_text)
            .await
        {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!(conversation_id = %conversation_id, error = %err, "placeholder reply failed");
                None
            }
        };

        let deadline = self.turn_deadline();
        let result = match tokio::time::timeout(deadline, self.respond(&turn)).await {
            Ok(result) => result,
            Err(_) => Err(Error::TurnTimeout {
                secs: deadline.as_secs(),
            }),
        };

        match result {
            Ok(reply) => {
                self.guard.clear(&turn.actor_id, &turn.command_id);
                let text = clean_response(&reply.text, self.config.transport.max_reply_chars);
                let delivered = self.deliver(&conversation_id, placeholder.as_ref(), &text).await;

                if reply.primary_actions > 0 {
                    // Files changed; the next turn refetches authoritative history.
                    self.conversations.invalidate(&conversation_id);
                } else {
                    self.conversations.upsert(&conversation_id, turn.as_turn());
                    self.conversations.upsert(
                        &conversation_id,
                        Turn {
                            id: delivered
                                .map(|handle| handle.message_id)
                                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                            role: TurnRole::Assistant,
                            text: text.clone(),
                            timestamp: Utc::now(),
                            reaction_summary: None,
                        },
                    );
                }

                self.finish(&conversation_id, None, started);
                TurnReport {
                    conversation_id,
                    text,
                    failure: None,
                    primary_actions: reply.primary_actions,
                    strategy: Some(reply.strategy),
                }
            }
            Err(error) => {
                if !counted_upfront {
                    self.guard.check_and_record(&turn.actor_id, &turn.command_id);
                }
                self.fail(&turn, placeholder.as_ref(), &error, true, started)
                    .await
            }
        }
    }

    async fn respond(&self, turn: &InboundTurn) -> Result<Reply> {
        let conversation_id = &turn.conversation_id;
        let window = self
            .config
            .orchestrator
            .context_messages
            .max(self.config.orchestrator.rich_context_messages);
        let history: Vec<ChatMessage> = self
            .conversations
            .get(conversation_id, window)
            .await
            .iter()
            .filter(|prior| prior.id != turn.message_id)
            .map(Turn::to_chat_message)
            .collect();

        let intent = self.classifier.classify(&turn.text).await;
        let routing = RoutingContext {
            recent_files: self.actions.recent_targets(conversation_id),
            conversation_len: history.len(),
        };
        let plan = self.planner.plan(&turn.text, &routing).await;

        tracing::info!(
            conversation_id = %conversation_id,
            intent = intent.kind.label(),
            plan = plan.as_ref().map(|plan| plan.intent.label()),
            "turn classified"
        );
        self.events.publish(Event::IntentClassified {
            conversation_id: conversation_id.clone(),
            intent: intent.kind,
            method: intent.method,
            plan: plan.as_ref().map(|plan| plan.intent),
            plan_confidence: plan.as_ref().map(|plan| plan.confidence),
        });

        let mut context_blocks = Vec::new();
        if let Some(summary) = self.actions.summarize(conversation_id) {
            context_blocks.push(summary);
        }
        if let Some(plan) = &plan {
            context_blocks.push(plan.guidance_text());
        }
        let write_intent = intent.expects_mutation()
            || plan.as_ref().is_some_and(RoutingPlan::is_write_type);

        if let Some(tools) = fast_path(&intent) {
            match self
                .fast_reply(turn, &history, &context_blocks, tools, write_intent)
                .await
            {
                Ok(Some(reply)) => return Ok(reply),
                Ok(None) => {}
                Err(Error::Provider(err)) if err.is_terminal() => return Err(Error::Provider(err)),
                Err(err) => {
                    tracing::warn!(
                        conversation_id = %conversation_id,
                        error = %err,
                        "fast path failed; falling back to strategies"
                    );
                }
            }
        }

        let ladder = LadderRequest {
            conversation_id: conversation_id.clone(),
            user_message: turn.text.clone(),
            history,
            context_blocks,
            functionality_fix: intent.is_functionality_fix,
            write_intent,
        };
        let result = self.orchestrator.run(&ladder).await?;
        Ok(Reply {
            text: result.outcome.text,
            primary_actions: result.outcome.primary_actions,
            strategy: result.strategy,
        })
    }

    /// Single agent run for the simple intents. `None` means the reply was unusable and
    /// nothing was changed, so the ladder may try again.
    async fn fast_reply(
        &self,
        turn: &InboundTurn,
        history: &[ChatMessage],
        context_blocks: &[String],
        tools: ToolPolicy,
        write_intent: bool,
    ) -> Result<Option<Reply>> {
        let start = history
            .len()
            .saturating_sub(self.config.orchestrator.context_messages);
        let outcome = self
            .agent
            .run(AgentRequest {
                conversation_id: turn.conversation_id.clone(),
                system_prompt: self.system_prompt.clone(),
                history: history[start..].to_vec(),
                context_blocks: context_blocks.to_vec(),
                user_message: turn.text.clone(),
                tools,
                model: self.config.models.primary.clone(),
                write_intent,
            })
            .await?;

        let unusable = outcome.degraded
            || outcome.text.trim().chars().count() < self.config.orchestrator.min_response_chars;
        if unusable && outcome.primary_actions == 0 {
            tracing::info!(
                conversation_id = %turn.conversation_id,
                "fast path reply unusable; escalating"
            );
            return Ok(None);
        }

        Ok(Some(Reply {
            text: outcome.text,
            primary_actions: outcome.primary_actions,
            strategy: format!("fast_path:{}", tool_policy_label(tools)),
        }))
    }

    /// Edits the placeholder, or posts a new message when editing is not possible.
    async fn deliver(
        &self,
        conversation_id: &str,
        placeholder: Option<&MessageHandle>,
        text: &str,
    ) -> Option<MessageHandle> {
        if let Some(handle) = placeholder {
            match self.transport.edit(handle, text).await {
                Ok(()) => return Some(handle.clone()),
                Err(err) => tracing::warn!(
                    conversation_id,
                    error = %err,
                    "editing placeholder failed; sending out-of-band reply"
                ),
            }
        }

        match self.transport.send(conversation_id, text).await {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::error!(conversation_id, error = %err, "reply could not be delivered");
                None
            }
        }
    }

    async fn fail(
        &self,
        turn: &InboundTurn,
        placeholder: Option<&MessageHandle>,
        error: &Error,
        logged: bool,
        started: Instant,
    ) -> TurnReport {
        let kind = FailureKind::classify(error);
        if logged {
            tracing::error!(
                conversation_id = %turn.conversation_id,
                failure = kind.label(),
                error = %error,
                "turn failed"
            );
        }

        let text = match error {
            Error::Provider(err) if err.is_terminal() => err.user_message(),
            _ => kind.user_message().to_owned(),
        };
        // After a timeout the placeholder may be outside the reply window.
        let placeholder = match kind {
            FailureKind::Timeout => None,
            _ => placeholder,
        };
        self.deliver(&turn.conversation_id, placeholder, &text).await;
        self.finish(&turn.conversation_id, Some(kind), started);

        TurnReport {
            conversation_id: turn.conversation_id.clone(),
            text,
            failure: Some(kind),
            primary_actions: 0,
            strategy: None,
        }
    }

    fn finish(&self, conversation_id: &str, failure: Option<FailureKind>, started: Instant) {
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.events.publish(Event::TurnFinished {
            conversation_id: conversation_id.to_owned(),
            success: failure.is_none(),
            failure: failure.map(|kind| kind.label().to_owned()),
            elapsed_ms,
        });
    }
}

fn fast_path(intent: &Intent) -> Option<ToolPolicy> {
    match intent.kind {
        IntentKind::Conversation => Some(ToolPolicy::None),
        IntentKind::ReadOnly => Some(ToolPolicy::ReadOnly),
        IntentKind::Create => Some(ToolPolicy::All),
        IntentKind::Edit if intent.is_file_management => Some(ToolPolicy::All),
        IntentKind::Edit => Some(ToolPolicy::EditOnly),
        IntentKind::FunctionalityFix | IntentKind::Commit | IntentKind::General => None,
    }
}

fn tool_policy_label(policy: ToolPolicy) -> &'static str {
    match policy {
        ToolPolicy::All => "all",
        ToolPolicy::ReadOnly => "read_only",
        ToolPolicy::EditOnly => "edit_only",
        ToolPolicy::None => "none",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::prompt::NO_CHANGES_MADE;
    use crate::providers::error::ProviderError;
    use crate::providers::types::Completion;
    use crate::testing::{
        test_config, tool_call, turn, with_calls, RecordingBackend, RecordingTransport,
        ScriptedProvider,
    };
    use crate::tools::ToolOutput;

    type Script = Vec<std::result::Result<Completion, ProviderError>>;

    struct Harness {
        runtime: Runtime,
        provider: Arc<ScriptedProvider>,
        backend: Arc<RecordingBackend>,
        transport: Arc<RecordingTransport>,
    }

    fn runtime_config() -> Config {
        let mut config = test_config();
        config.intent.model_fallback = false;
        config.routing.use_model = false;
        config
    }

    fn harness_with(config: Config, script: Script, backend: RecordingBackend) -> Harness {
        let provider = Arc::new(ScriptedProvider::new(script));
        let backend = Arc::new(backend);
        let transport = Arc::new(RecordingTransport::default());
        let runtime = Runtime::new(
            config,
            provider.clone(),
            backend.clone(),
            transport.clone(),
            EventBus::default(),
        );
        Harness {
            runtime,
            provider,
            backend,
            transport,
        }
    }

    fn inbound(id: &str, command: &str, text: &str) -> InboundTurn {
        InboundTurn {
            conversation_id: "c1".to_owned(),
            actor_id: "alice".to_owned(),
            command_id: command.to_owned(),
            message_id: id.to_owned(),
            text: text.to_owned(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn chat_takes_the_tool_free_fast_path() {
        let h = harness_with(
            runtime_config(),
            vec![Ok(Completion::text("<think>greet back</think>Hi! How can I help?"))],
            RecordingBackend::default(),
        );

        let report = h.runtime.handle_turn(inbound("m1", "chat", "hello there")).await;

        assert!(report.succeeded());
        assert_eq!(report.text, "Hi! How can I help?");
        assert_eq!(report.strategy.as_deref(), Some("fast_path:none"));
        assert!(h.provider.requests()[0].tools.is_empty());
        assert_eq!(h.transport.sent(), vec!["Working on it..."]);
        assert_eq!(h.transport.edits(), vec!["Hi! How can I help?"]);
    }

    #[tokio::test]
    async fn fix_request_goes_through_the_ladder_and_invalidates_history() {
        let backend = RecordingBackend::default();
        backend.respond("read", Ok(ToolOutput::ok("setInterval(tick, 1000);")));
        let h = harness_with(
            runtime_config(),
            vec![
                Ok(with_calls(vec![tool_call("r1", "read", r#"{"path":"game.js"}"#)])),
                Ok(with_calls(vec![tool_call(
                    "e1",
                    "edit",
                    r#"{"path":"game.js","find":"1000","replace":"500"}"#,
                )])),
                Ok(Completion::text("Fixed the timer in game.js.")),
            ],
            backend,
        );
        h.transport
            .seed_history("c1", vec![turn("m0", "the timer in game.js stops", 0)]);

        let report = h
            .runtime
            .handle_turn(inbound("m1", "chat", "fix the timer bug in game.js"))
            .await;

        assert!(report.succeeded());
        assert_eq!(report.strategy.as_deref(), Some("primary"));
        assert_eq!(report.primary_actions, 1);
        assert_eq!(h.backend.call_names(), vec!["read", "edit"]);
        assert_eq!(h.runtime.conversations().state("c1"), None);

        let requests = h.provider.requests();
        assert!(requests[0].system.contains("Suggested approach"));
        assert!(requests[2].tools.is_empty());
        assert_eq!(h.runtime.actions().recent("c1").len(), 1);
    }

    #[tokio::test]
    async fn delete_request_reaches_the_backend() {
        let h = harness_with(
            runtime_config(),
            vec![
                Ok(with_calls(vec![tool_call("d1", "delete", r#"{"path":"old.txt"}"#)])),
                Ok(Completion::text("Deleted old.txt.")),
            ],
            RecordingBackend::default(),
        );

        let report = h.runtime.handle_turn(inbound("m1", "chat", "delete old.txt")).await;

        assert!(report.succeeded());
        assert_eq!(report.strategy.as_deref(), Some("fast_path:all"));
        assert_eq!(report.primary_actions, 1);
        assert_eq!(h.backend.call_names(), vec!["delete"]);
        assert_eq!(report.text, "Deleted old.txt.");
    }

    #[test]
    fn file_management_requests_get_tools_that_can_do_them() {
        use crate::intent::classifier::classify_heuristic;
        use crate::tools::catalog;

        for text in ["delete old.txt", "move notes.md into docs", "rename index.js to main.js"] {
            let intent = classify_heuristic(text).expect("signals");
            let policy = fast_path(&intent).expect("fast path");
            let tools = catalog::names_for(policy, false);
            assert!(tools.contains(&"delete") && tools.contains(&"move"), "{text}");
        }

        let intent = classify_heuristic("change the title color").expect("signals");
        assert_eq!(fast_path(&intent), Some(ToolPolicy::EditOnly));
    }

    #[tokio::test]
    async fn claimed_delete_without_tool_calls_is_caught() {
        let h = harness_with(
            runtime_config(),
            vec![Ok(Completion::text("Done, I deleted the readme."))],
            RecordingBackend::default(),
        );

        let report = h
            .runtime
            .handle_turn(inbound("m1", "chat", "delete the readme"))
            .await;

        assert_eq!(report.primary_actions, 0);
        assert!(h.backend.calls().is_empty());
        assert_eq!(report.text, NO_CHANGES_MADE);
    }

    #[tokio::test]
    async fn repeated_failures_are_refused_before_reaching_the_model() {
        let h = harness_with(
            runtime_config(),
            vec![
                Err(ProviderError::from_status(401, "bad key")),
                Err(ProviderError::from_status(401, "bad key")),
            ],
            RecordingBackend::default(),
        );

        for id in ["m1", "m2"] {
            let report = h.runtime.handle_turn(inbound(id, "deploy", "hello")).await;
            assert_eq!(report.failure, Some(FailureKind::Auth));
            assert!(report.text.contains("credentials"));
            assert!(!report.text.contains("bad key"));
        }
        assert_eq!(h.provider.request_count(), 2);

        let report = h.runtime.handle_turn(inbound("m3", "deploy", "hello")).await;
        assert_eq!(report.failure, Some(FailureKind::LoopGuard));
        assert_eq!(h.provider.request_count(), 2);

        let other = h.runtime.handle_turn(inbound("m4", "other", "hello")).await;
        assert_ne!(other.failure, Some(FailureKind::LoopGuard));
    }

    #[tokio::test]
    async fn timeout_falls_back_to_an_out_of_band_message() {
        let mut config = runtime_config();
        config.orchestrator.turn_timeout_secs = 1;
        let h = harness_with(
            config,
            vec![
                Ok(with_calls(vec![tool_call("l1", "list", "{}")])),
                Ok(Completion::text("never delivered")),
            ],
            RecordingBackend::with_delay(Duration::from_secs(3)),
        );

        let report = h
            .runtime
            .handle_turn(inbound("m1", "chat", "list the files in src"))
            .await;

        assert_eq!(report.failure, Some(FailureKind::Timeout));
        assert!(h.transport.edits().is_empty());
        assert_eq!(
            h.transport.sent(),
            vec!["Working on it...", FailureKind::Timeout.user_message()]
        );
    }

    #[tokio::test]
    async fn failed_edit_is_delivered_as_a_new_message() {
        let h = harness_with(
            runtime_config(),
            vec![Ok(Completion::text("Thanks, happy to help."))],
            RecordingBackend::default(),
        );
        h.transport.fail_edits(true);

        let report = h.runtime.handle_turn(inbound("m1", "chat", "thanks!")).await;

        assert!(report.succeeded());
        assert_eq!(
            h.transport.sent(),
            vec!["Working on it...", "Thanks, happy to help."]
        );
        let cached = h.runtime.conversations().get("c1", 10).await;
        let texts: Vec<_> = cached.iter().map(|turn| turn.text.as_str()).collect();
        assert_eq!(texts, vec!["thanks!", "Thanks, happy to help."]);
        assert_eq!(h.transport.fetch_count(), 1);
    }

    #[test]
    fn deadline_stays_inside_the_reply_window() {
        let mut config = runtime_config();
        config.orchestrator.turn_timeout_secs = 600;
        config.transport.reply_window_secs = Some(120);
        config.transport.reply_margin_secs = 30;
        let h = harness_with(config, Vec::new(), RecordingBackend::default());
        assert_eq!(h.runtime.turn_deadline(), Duration::from_secs(90));
    }
}

use crate::agents::prompt::{DEFAULT_SYSTEM_PROMPT, MINIMAL_SYSTEM_PROMPT};
use crate::agents::{AgentLoop, AgentRequest, LoopOutcome};
use crate::config::schema::{
    Config, ContextPolicy, ModelConfig, OrchestratorConfig, PromptPolicy, StrategyConfig,
};
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::providers::types::ChatMessage;

/// Input shared by every rung of one turn.
#[derive(Debug, Clone)]
pub struct LadderRequest {
    pub conversation_id: String,
    pub user_message: String,
    /// Prior conversation, oldest first. Each rung takes its own tail of it.
    pub history: Vec<ChatMessage>,
    pub context_blocks: Vec<String>,
    pub functionality_fix: bool,
    pub write_intent: bool,
}

/// The validated result and the rung that produced it.
#[derive(Debug, Clone)]
pub struct LadderOutcome {
    pub outcome: LoopOutcome,
    pub strategy: String,
    pub attempts: usize,
}

/// Runs the agent loop under successively more conservative strategies until one
/// produces an acceptable reply.
#[derive(Clone)]
pub struct Orchestrator {
    agent: AgentLoop,
    events: EventBus,
    models: ModelConfig,
    config: OrchestratorConfig,
    system_prompt: String,
}

impl Orchestrator {
    pub fn new(config: &Config, agent: AgentLoop, events: EventBus) -> Self {
        Self {
            agent,
            events,
            models: config.models.clone(),
            config: config.orchestrator.clone(),
            system_prompt: config
                .agent
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_owned()),
        }
    }

    fn eligible(&self, functionality_fix: bool) -> Vec<&StrategyConfig> {
        self.config
            .rungs
            .iter()
            .filter(|rung| functionality_fix || !rung.fix_only)
            .collect()
    }

    pub async fn run(&self, request: &LadderRequest) -> Result<LadderOutcome> {
        let rungs = self.eligible(request.functionality_fix);
        let mut last_reason = String::from("no strategies configured");
        let mut last_provider_error = None;

        for (index, strategy) in rungs.iter().enumerate() {
            let rung = index + 1;
            let is_last = rung == rungs.len();
            let agent_request = self.agent_request(strategy, request);

            tracing::info!(
                conversation_id = %request.conversation_id,
                rung,
                strategy = %strategy.name,
                model = %agent_request.model,
                "starting attempt"
            );
            self.events.publish(Event::RungStarted {
                conversation_id: request.conversation_id.clone(),
                rung,
                strategy: strategy.name.clone(),
                model: agent_request.model.clone(),
            });

            let reason = match self.agent.run(agent_request).await {
                Ok(outcome) => match self.rejection(strategy, &outcome, is_last) {
                    None => {
                        return Ok(LadderOutcome {
                            outcome,
                            strategy: strategy.name.clone(),
                            attempts: rung,
                        })
                    }
                    // Retrying would repeat the mutations this attempt already made.
                    Some(reason) if outcome.primary_actions > 0 => {
                        tracing::warn!(
                            conversation_id = %request.conversation_id,
                            rung,
                            strategy = %strategy.name,
                            reason = %reason,
                            primary_actions = outcome.primary_actions,
                            "keeping reply from an attempt that changed files"
                        );
                        return Ok(LadderOutcome {
                            outcome,
                            strategy: strategy.name.clone(),
                            attempts: rung,
                        });
                    }
                    Some(reason) => {
                        last_provider_error = None;
                        reason
                    }
                },
                Err(Error::Provider(err)) if err.is_terminal() => {
                    tracing::error!(
                        conversation_id = %request.conversation_id,
                        strategy = %strategy.name,
                        error = %err,
                        "terminal provider error; not trying further strategies"
                    );
                    return Err(Error::Provider(err));
                }
                Err(Error::Provider(err)) => {
                    last_provider_error = Some(err.kind);
                    format!("request failed: {err}")
                }
                Err(err) => {
                    last_provider_error = None;
                    format!("request failed: {err}")
                }
            };

            tracing::warn!(
                conversation_id = %request.conversation_id,
                rung,
                strategy = %strategy.name,
                reason = %reason,
                "attempt rejected"
            );
            self.events.publish(Event::RungRejected {
                conversation_id: request.conversation_id.clone(),
                rung,
                strategy: strategy.name.clone(),
                reason: reason.clone(),
            });
            last_reason = reason;
        }

        Err(Error::AttemptsExhausted {
            attempts: rungs.len(),
            last_reason,
            last_provider_error,
        })
    }

    fn agent_request(&self, strategy: &StrategyConfig, request: &LadderRequest) -> AgentRequest {
        let window = match strategy.context {
            ContextPolicy::Full => self.config.context_messages,
            ContextPolicy::Reduced => self.config.reduced_context_messages,
            ContextPolicy::Rich => self.config.rich_context_messages,
            ContextPolicy::Empty => 0,
        };
        let start = request.history.len().saturating_sub(window);
        let context_blocks = match strategy.context {
            ContextPolicy::Empty => Vec::new(),
            _ => request.context_blocks.clone(),
        };
        let system_prompt = match strategy.prompt {
            PromptPolicy::Full => self.system_prompt.clone(),
            PromptPolicy::Minimal => MINIMAL_SYSTEM_PROMPT.to_owned(),
        };

        AgentRequest {
            conversation_id: request.conversation_id.clone(),
            system_prompt,
            history: request.history[start..].to_vec(),
            context_blocks,
            user_message: request.user_message.clone(),
            tools: strategy.tools,
            model: self.models.resolve(strategy.model).to_owned(),
            write_intent: request.write_intent,
        }
    }

    /// Reason to reject `outcome`, or `None` when it is acceptable.
    fn rejection(
        &self,
        strategy: &StrategyConfig,
        outcome: &LoopOutcome,
        is_last: bool,
    ) -> Option<String> {
        let text = outcome.text.trim();
        if text.is_empty() {
            return Some("empty response".to_owned());
        }
        if text.chars().count() < self.config.min_response_chars {
            return Some(format!(
                "response shorter than {} characters",
                self.config.min_response_chars
            ));
        }
        if outcome.degraded && !is_last {
            return Some("placeholder reply".to_owned());
        }
        if strategy.reject_error_marker {
            let lowered = text.to_lowercase();
            if let Some(marker) = self
                .config
                .error_markers
                .iter()
                .find(|marker| lowered.contains(&marker.to_lowercase()))
            {
                return Some(format!("response contains error marker '{marker}'"));
            }
        }
        None
    }
}

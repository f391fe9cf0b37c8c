use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::schema::RoutingConfig;
use crate::providers::types::{ChatMessage, CompletionRequest, ModelProvider};
use crate::tools::catalog;

/// Task category a plan was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanIntent {
    Commit,
    Create,
    Build,
    Fix,
    Edit,
    Read,
}

impl PlanIntent {
    /// Tie-break order when several categories match equally.
    const PRIORITY: [PlanIntent; 6] = [
        PlanIntent::Commit,
        PlanIntent::Create,
        PlanIntent::Build,
        PlanIntent::Fix,
        PlanIntent::Edit,
        PlanIntent::Read,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Create => "create",
            Self::Build => "build",
            Self::Fix => "fix",
            Self::Edit => "edit",
            Self::Read => "read",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::PRIORITY
            .into_iter()
            .find(|intent| intent.label() == label.trim().to_lowercase())
    }

    pub fn is_write_type(self) -> bool {
        !matches!(self, Self::Read)
    }

    fn default_sequence(self, has_recent_files: bool) -> Vec<&'static str> {
        match self {
            Self::Commit => vec!["status", "commit"],
            Self::Create | Self::Build => vec!["list", "write"],
            Self::Fix if has_recent_files => vec!["read", "edit"],
            Self::Fix => vec!["search", "read", "edit"],
            Self::Edit if has_recent_files => vec!["read", "edit"],
            Self::Edit => vec!["search", "read", "edit"],
            Self::Read => vec!["list", "search", "read"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMethod {
    Keywords,
    Model,
}

/// Advisory plan for one turn. The tool sequence is guidance, never enforced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingPlan {
    pub intent: PlanIntent,
    pub tool_sequence: Vec<String>,
    pub confidence: f32,
    pub method: PlanMethod,
    #[serde(default)]
    pub keyword_matches: Vec<String>,
    #[serde(default)]
    pub likely_targets: Vec<String>,
}

impl RoutingPlan {
    pub fn is_write_type(&self) -> bool {
        self.intent.is_write_type()
    }

    /// Text block injected into the agent prompt.
    pub fn guidance_text(&self) -> String {
        let mut text = format!(
            "Suggested approach ({} task, confidence {:.2}): {}.",
            self.intent.label(),
            self.confidence,
            self.tool_sequence.join(" -> ")
        );
        if !self.likely_targets.is_empty() {
            text.push_str(&format!(
                " Recently touched files: {}.",
                self.likely_targets.join(", ")
            ));
        }
        text.push_str(" This is a suggestion; use whichever tools the request actually needs.");
        text
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoutingContext {
    pub recent_files: Vec<String>,
    pub conversation_len: usize,
}

#[derive(Debug, Deserialize)]
struct ModelPlan {
    intent: String,
    #[serde(default)]
    tools: Vec<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

const PLAN_PROMPT: &str = "You plan tool usage for a workspace assistant. Reply with only a JSON object: {\"intent\": one of commit|create|build|fix|edit|read, \"tools\": ordered tool names, \"confidence\": number between 0 and 1}.";

struct Keyword {
    text: String,
    pattern: Regex,
}

impl Keyword {
    /// Whole-word match, allowing a plural suffix: "bug" hits "bugs", "read" misses "readme".
    fn compile(text: &str) -> Option<Self> {
        let trimmed = text.trim().to_lowercase();
        if trimmed.is_empty() {
            return None;
        }
        let pattern = Regex::new(&format!(r"(?i)\b{}(?:e?s)?\b", regex::escape(&trimmed)));
        match pattern {
            Ok(pattern) => Some(Self {
                text: text.to_owned(),
                pattern,
            }),
            Err(err) => {
                tracing::warn!(keyword = text, error = %err, "ignoring routing keyword");
                None
            }
        }
    }
}

/// Builds advisory routing plans from keywords and, optionally, a model.
pub struct RoutingPlanner {
    provider: Option<Arc<dyn ModelProvider>>,
    model: String,
    config: RoutingConfig,
    keywords: Vec<(PlanIntent, Vec<Keyword>)>,
}

impl RoutingPlanner {
    pub fn new(
        provider: Option<Arc<dyn ModelProvider>>,
        model: String,
        config: RoutingConfig,
    ) -> Self {
        let keywords: Vec<(PlanIntent, Vec<Keyword>)> = PlanIntent::PRIORITY
            .into_iter()
            .map(|intent| {
                let compiled: Vec<Keyword> = config
                    .task_keywords
                    .get(intent.label())
                    .map(|words| words.iter().filter_map(|word| Keyword::compile(word)).collect())
                    .unwrap_or_default();
                (intent, compiled)
            })
            .collect();

        Self {
            provider,
            model,
            config,
            keywords,
        }
    }

    /// Plan for `text`, or `None` when routing is off or nothing confident was found.
    pub async fn plan(&self, text: &str, context: &RoutingContext) -> Option<RoutingPlan> {
        if !self.config.enabled {
            return None;
        }

        let plan = if self.config.use_model {
            match self.plan_with_model(text, context).await {
                Some(plan) => Some(plan),
                None => self.plan_with_keywords(text, context),
            }
        } else {
            self.plan_with_keywords(text, context)
        }?;

        if plan.confidence < self.config.min_confidence {
            tracing::debug!(
                intent = plan.intent.label(),
                confidence = plan.confidence,
                "discarding low-confidence routing plan"
            );
            return None;
        }

        tracing::debug!(
            intent = plan.intent.label(),
            confidence = plan.confidence,
            method = ?plan.method,
            tools = %plan.tool_sequence.join(","),
            "routing plan ready"
        );
        Some(plan)
    }

    fn plan_with_keywords(&self, text: &str, context: &RoutingContext) -> Option<RoutingPlan> {
        let (intent, keyword_matches) = self.best_task_type(text)?;
        let has_recent = !context.recent_files.is_empty();

        let mut confidence = 0.4 + 0.2 * keyword_matches.len() as f32;
        if has_recent && matches!(intent, PlanIntent::Edit | PlanIntent::Fix) {
            confidence += 0.1;
        }
        if context.conversation_len == 0 && intent == PlanIntent::Edit && !has_recent {
            confidence -= 0.1;
        }

        Some(RoutingPlan {
            intent,
            tool_sequence: intent
                .default_sequence(has_recent)
                .into_iter()
                .map(str::to_owned)
                .collect(),
            confidence: confidence.clamp(0.0, 0.95),
            method: PlanMethod::Keywords,
            keyword_matches,
            likely_targets: context.recent_files.iter().take(3).cloned().collect(),
        })
    }

    /// Category with the most keyword hits; ties go to the earlier entry in the priority list.
    fn best_task_type(&self, text: &str) -> Option<(PlanIntent, Vec<String>)> {
        let mut best: Option<(PlanIntent, Vec<String>)> = None;

        for (intent, keywords) in &self.keywords {
            let intent = *intent;
            let matches: Vec<String> = keywords
                .iter()
                .filter(|keyword| keyword.pattern.is_match(text))
                .map(|keyword| keyword.text.clone())
                .collect();

            let better = match &best {
                None => !matches.is_empty(),
                Some((_, current)) => matches.len() > current.len(),
            };
            if better {
                best = Some((intent, matches));
            }
        }

        best
    }

    async fn plan_with_model(&self, text: &str, context: &RoutingContext) -> Option<RoutingPlan> {
        let provider = self.provider.as_ref()?;
        let timeout = Duration::from_millis(self.config.timeout_ms.max(1));

        let mut prompt = format!("Request: {text}");
        if !context.recent_files.is_empty() {
            prompt.push_str(&format!(
                "\nRecently touched files: {}",
                context.recent_files.join(", ")
            ));
        }
        let request = CompletionRequest {
            model: self.model.clone(),
            system: format!(
                "{PLAN_PROMPT} Available tools: {}.",
                catalog::TOOL_NAMES.join(", ")
            ),
            messages: vec![ChatMessage::user(prompt)],
            tools: Vec::new(),
            temperature: 0.0,
            max_tokens: 200,
            timeout,
        };

        let completion = match tokio::time::timeout(timeout, provider.complete(&request)).await {
            Ok(Ok(completion)) => completion,
            Ok(Err(err)) => {
                tracing::debug!(error = %err, "routing model call failed; continuing without it");
                return None;
            }
            Err(_) => {
                tracing::debug!(timeout_ms = self.config.timeout_ms, "routing model call timed out");
                return None;
            }
        };

        let parsed = parse_model_plan(completion.text_or_empty())?;
        let intent = PlanIntent::from_label(&parsed.intent)?;
        let tool_sequence: Vec<String> = parsed
            .tools
            .into_iter()
            .filter(|tool| catalog::is_known_tool(tool))
            .collect();
        if tool_sequence.is_empty() {
            return None;
        }

        Some(RoutingPlan {
            intent,
            tool_sequence,
            confidence: parsed.confidence.unwrap_or(0.6).clamp(0.0, 1.0),
            method: PlanMethod::Model,
            keyword_matches: Vec::new(),
            likely_targets: context.recent_files.iter().take(3).cloned().collect(),
        })
    }
}

/// Accepts bare JSON or JSON wrapped in prose or code fences.
fn parse_model_plan(raw: &str) -> Option<ModelPlan> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    match serde_json::from_str(&raw[start..=end]) {
        Ok(plan) => Some(plan),
        Err(err) => {
            tracing::debug!(error = %err, "routing model returned malformed plan");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::error::ProviderError;
    use crate::providers::types::Completion;
    use crate::testing::ScriptedProvider;

    fn keyword_planner() -> RoutingPlanner {
        RoutingPlanner::new(None, String::new(), RoutingConfig::default())
    }

    fn model_planner(provider: Arc<ScriptedProvider>) -> RoutingPlanner {
        RoutingPlanner::new(
            Some(provider as Arc<dyn ModelProvider>),
            "fast/model".to_owned(),
            RoutingConfig {
                use_model: true,
                ..RoutingConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn read_requests_get_a_read_only_plan() {
        let plan = keyword_planner()
            .plan("list the files in src", &RoutingContext::default())
            .await
            .expect("plan");

        assert_eq!(plan.intent, PlanIntent::Read);
        assert!(!plan.is_write_type());
        assert_eq!(plan.tool_sequence.first().map(String::as_str), Some("list"));
    }

    #[tokio::test]
    async fn fix_with_recent_files_reads_then_edits() {
        let context = RoutingContext {
            recent_files: vec!["game.js".to_owned()],
            conversation_len: 4,
        };
        let plan = keyword_planner()
            .plan("the timer is broken, fix it", &context)
            .await
            .expect("plan");

        assert_eq!(plan.intent, PlanIntent::Fix);
        assert!(plan.is_write_type());
        assert_eq!(plan.tool_sequence, vec!["read", "edit"]);
        assert!(plan.guidance_text().contains("game.js"));
    }

    #[tokio::test]
    async fn keywords_only_match_whole_words() {
        let planner = keyword_planner();
        let context = RoutingContext::default();

        let plan = planner
            .plan("delete the readme", &context)
            .await
            .expect("plan");
        assert_eq!(plan.intent, PlanIntent::Edit);
        assert_eq!(plan.keyword_matches, vec!["delete"]);

        for text in ["add the song to my playlist", "that thread already got shown"] {
            assert!(planner.plan(text, &context).await.is_none(), "{text}");
        }

        let plan = planner
            .plan("there are bugs in the parser", &context)
            .await
            .expect("plural keyword");
        assert_eq!(plan.intent, PlanIntent::Fix);
    }

    #[tokio::test]
    async fn no_keywords_means_no_plan() {
        let plan = keyword_planner()
            .plan("good morning", &RoutingContext::default())
            .await;
        assert!(plan.is_none());
    }

    #[tokio::test]
    async fn disabled_routing_never_plans() {
        let planner = RoutingPlanner::new(
            None,
            String::new(),
            RoutingConfig {
                enabled: false,
                ..RoutingConfig::default()
            },
        );
        assert!(planner
            .plan("list the files", &RoutingContext::default())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn model_plan_is_parsed_and_unknown_tools_dropped() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(Completion::text(
            "```json\n{\"intent\": \"edit\", \"tools\": [\"read\", \"teleport\", \"edit\"], \"confidence\": 0.8}\n```",
        ))]));
        let plan = model_planner(provider)
            .plan("make the title bigger", &RoutingContext::default())
            .await
            .expect("plan");

        assert_eq!(plan.method, PlanMethod::Model);
        assert_eq!(plan.intent, PlanIntent::Edit);
        assert_eq!(plan.tool_sequence, vec!["read", "edit"]);
    }

    #[tokio::test]
    async fn model_failure_falls_back_to_keywords() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::from_status(
            500, "",
        ))]));
        let plan = model_planner(provider)
            .plan("commit the changes", &RoutingContext::default())
            .await
            .expect("keyword plan");

        assert_eq!(plan.method, PlanMethod::Keywords);
        assert_eq!(plan.intent, PlanIntent::Commit);
    }

    #[tokio::test]
    async fn malformed_model_output_is_not_fatal() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(Completion::text("sure!"))]));
        let plan = model_planner(provider)
            .plan("do the thing", &RoutingContext::default())
            .await;
        assert!(plan.is_none());
    }
}

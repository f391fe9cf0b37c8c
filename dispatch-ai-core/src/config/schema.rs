use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub models: ModelConfig,
    pub agent: AgentLoopConfig,
    pub retry: RetryConfig,
    pub orchestrator: OrchestratorConfig,
    pub conversation_cache: ConversationCacheConfig,
    pub action_cache: ActionCacheConfig,
    pub error_guard: ErrorGuardConfig,
    pub intent: IntentConfig,
    pub routing: RoutingConfig,
    pub workspace: WorkspaceConfig,
    pub transport: TransportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub api_key_env: String,
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "openrouter".to_owned(),
            base_url: "https://openrouter.ai/api/v1".to_owned(),
            api_key_env: "OPENROUTER_API_KEY".to_owned(),
            request_timeout_secs: 60,
        }
    }
}

/// Model ids addressed by the ladder through [`ModelSlot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub primary: String,
    pub fast: String,
    pub alternate: String,
    /// Known-reliable model used for the mid-retry downgrade.
    pub reliable: String,
    /// Models the agent may select through the `switch_model` tool.
    pub switchable: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            primary: "anthropic/claude-sonnet-4".to_owned(),
            fast: "openai/gpt-4o-mini".to_owned(),
            alternate: "google/gemini-2.5-flash".to_owned(),
            reliable: "openai/gpt-4o".to_owned(),
            switchable: Vec::new(),
        }
    }
}

impl ModelConfig {
    pub fn resolve(&self, slot: ModelSlot) -> &str {
        match slot {
            ModelSlot::Primary => &self.primary,
            ModelSlot::Fast => &self.fast,
            ModelSlot::Alternate => &self.alternate,
            ModelSlot::Reliable => &self.reliable,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentLoopConfig {
    pub system_prompt: Option<String>,
    pub max_iterations: usize,
    pub max_read_only_iterations: usize,
    /// Apply the read-only cap even when the advisory intent is a write.
    pub read_only_cap_for_write_intents: bool,
    pub max_parallel_tools: usize,
    pub tool_timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_iterations: 6,
            max_read_only_iterations: 3,
            read_only_cap_for_write_intents: false,
            max_parallel_tools: 4,
            tool_timeout_secs: 30,
            temperature: 0.3,
            max_tokens: 2_048,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
    /// Retry number (1-based) on which the request switches to the reliable model.
    pub downgrade_on_retry: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            jitter_ms: 250,
            downgrade_on_retry: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSlot {
    Primary,
    Fast,
    Alternate,
    Reliable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextPolicy {
    /// Standard history window plus injected blocks.
    Full,
    /// Short history window.
    Reduced,
    /// Whole cached history plus injected blocks.
    Rich,
    /// No prior conversation.
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPolicy {
    All,
    ReadOnly,
    /// Read-only tools plus write/edit.
    EditOnly,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptPolicy {
    Full,
    Minimal,
}

/// One rung of the fallback ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    pub model: ModelSlot,
    pub context: ContextPolicy,
    pub tools: ToolPolicy,
    pub prompt: PromptPolicy,
    #[serde(default)]
    pub reject_error_marker: bool,
    /// Only attempted when the turn was classified as a functionality fix.
    #[serde(default)]
    pub fix_only: bool,
}

pub fn default_ladder() -> Vec<StrategyConfig> {
    vec![
        StrategyConfig {
            name: "primary".to_owned(),
            model: ModelSlot::Primary,
            context: ContextPolicy::Full,
            tools: ToolPolicy::All,
            prompt: PromptPolicy::Full,
            reject_error_marker: true,
            fix_only: false,
        },
        StrategyConfig {
            name: "reduced_context".to_owned(),
            model: ModelSlot::Fast,
            context: ContextPolicy::Reduced,
            tools: ToolPolicy::All,
            prompt: PromptPolicy::Full,
            reject_error_marker: true,
            fix_only: false,
        },
        StrategyConfig {
            name: "isolated".to_owned(),
            model: ModelSlot::Alternate,
            context: ContextPolicy::Empty,
            tools: ToolPolicy::All,
            prompt: PromptPolicy::Full,
            reject_error_marker: true,
            fix_only: false,
        },
        StrategyConfig {
            name: "fix_rich_context".to_owned(),
            model: ModelSlot::Primary,
            context: ContextPolicy::Rich,
            tools: ToolPolicy::All,
            prompt: PromptPolicy::Full,
            reject_error_marker: false,
            fix_only: true,
        },
        StrategyConfig {
            name: "text_only".to_owned(),
            model: ModelSlot::Fast,
            context: ContextPolicy::Empty,
            tools: ToolPolicy::None,
            prompt: PromptPolicy::Minimal,
            reject_error_marker: false,
            fix_only: false,
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub turn_timeout_secs: u64,
    pub context_messages: usize,
    pub reduced_context_messages: usize,
    pub rich_context_messages: usize,
    pub min_response_chars: usize,
    pub error_markers: Vec<String>,
    pub rungs: Vec<StrategyConfig>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            turn_timeout_secs: 180,
            context_messages: 20,
            reduced_context_messages: 6,
            rich_context_messages: 50,
            min_response_chars: 2,
            error_markers: vec![
                "[error]".to_owned(),
                "error:".to_owned(),
                "traceback (most recent call last)".to_owned(),
            ],
            rungs: default_ladder(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationCacheConfig {
    pub max_conversations: usize,
    pub max_messages: usize,
    pub ttl_secs: u64,
    pub fetch_timeout_secs: u64,
}

impl Default for ConversationCacheConfig {
    fn default() -> Self {
        Self {
            max_conversations: 200,
            max_messages: 50,
            ttl_secs: 300,
            fetch_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionCacheConfig {
    pub max_actions: usize,
    pub ttl_secs: u64,
}

impl Default for ActionCacheConfig {
    fn default() -> Self {
        Self {
            max_actions: 10,
            ttl_secs: 1_800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorGuardConfig {
    pub lockout_threshold: u32,
    pub reset_window_secs: u64,
}

impl Default for ErrorGuardConfig {
    fn default() -> Self {
        Self {
            lockout_threshold: 3,
            reset_window_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentConfig {
    /// Ask the fast model when keyword heuristics find nothing.
    pub model_fallback: bool,
    pub timeout_ms: u64,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            model_fallback: false,
            timeout_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub enabled: bool,
    pub use_model: bool,
    pub timeout_ms: u64,
    /// Plans below this confidence are discarded.
    pub min_confidence: f32,
    /// Plan intent label -> keywords that suggest it.
    pub task_keywords: BTreeMap<String, Vec<String>>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        let mut task_keywords = BTreeMap::new();
        let mut insert = |intent: &str, words: &[&str]| {
            task_keywords.insert(
                intent.to_owned(),
                words.iter().map(|word| (*word).to_owned()).collect(),
            );
        };
        insert(
            "fix",
            &["fix", "bug", "broken", "not working", "crash", "doesn't work"],
        );
        insert(
            "edit",
            &[
                "change", "update", "modify", "rename", "replace", "bigger", "smaller", "color",
                "tweak", "delete", "remove", "move",
            ],
        );
        insert("create", &["create", "new file", "add a page", "make a new"]);
        insert("build", &["build", "implement", "make a game", "generate"]);
        insert("commit", &["commit", "push", "deploy", "publish"]);
        insert(
            "read",
            &["list", "show", "what's in", "find", "search", "read", "look up"],
        );

        Self {
            enabled: true,
            use_model: false,
            timeout_ms: 4_000,
            min_confidence: 0.3,
            task_keywords,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub root: String,
    pub web_lookup_url: String,
    pub max_search_hits: usize,
    pub max_read_bytes: u64,
    pub commit_author_name: String,
    pub commit_author_email: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: ".".to_owned(),
            web_lookup_url: "https://api.duckduckgo.com/".to_owned(),
            max_search_hits: 50,
            max_read_bytes: 200_000,
            commit_author_name: "dispatch-ai".to_owned(),
            commit_author_email: "dispatch-ai@localhost".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// How long the platform keeps a reply handle editable, if it limits it.
    pub reply_window_secs: Option<u64>,
    /// Safety margin kept free at the end of the reply window.
    pub reply_margin_secs: u64,
    pub max_reply_chars: usize,
    pub placeholder_text: String,
    pub sweep_interval_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            reply_window_secs: Some(900),
            reply_margin_secs: 30,
            max_reply_chars: 2_000,
            placeholder_text: "Working on it...".to_owned(),
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Text,
        }
    }
}

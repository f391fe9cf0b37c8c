use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::schema::IntentConfig;
use crate::providers::types::{ChatMessage, CompletionRequest, ModelProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Commit,
    Create,
    FunctionalityFix,
    Edit,
    ReadOnly,
    Conversation,
    General,
}

impl IntentKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Create => "create",
            Self::FunctionalityFix => "fix",
            Self::Edit => "edit",
            Self::ReadOnly => "read",
            Self::Conversation => "chat",
            Self::General => "general",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "commit" => Some(Self::Commit),
            "create" => Some(Self::Create),
            "fix" => Some(Self::FunctionalityFix),
            "edit" => Some(Self::Edit),
            "read" => Some(Self::ReadOnly),
            "chat" => Some(Self::Conversation),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    Heuristic,
    Model,
    /// Nothing matched and no model answered.
    Default,
}

/// Coarse category of an incoming message, computed once per turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub kind: IntentKind,
    pub is_conversation: bool,
    pub is_create: bool,
    pub is_edit: bool,
    pub is_functionality_fix: bool,
    pub is_commit: bool,
    pub is_read_only: bool,
    /// Delete, move or rename; needs more than the edit-only tool set.
    #[serde(default)]
    pub is_file_management: bool,
    pub method: ClassificationMethod,
}

impl Intent {
    /// Resolves the flags into one kind: commit, create, fix, edit, read-only, conversation.
    fn from_flags(flags: Signals, method: ClassificationMethod) -> Self {
        let kind = if flags.commit {
            IntentKind::Commit
        } else if flags.create {
            IntentKind::Create
        } else if flags.fix {
            IntentKind::FunctionalityFix
        } else if flags.edit {
            IntentKind::Edit
        } else if flags.read_only {
            IntentKind::ReadOnly
        } else if flags.conversation {
            IntentKind::Conversation
        } else {
            IntentKind::General
        };

        Self {
            kind,
            is_conversation: flags.conversation,
            is_create: flags.create,
            is_edit: flags.edit,
            is_functionality_fix: flags.fix,
            is_commit: flags.commit,
            is_read_only: flags.read_only,
            is_file_management: flags.manage,
            method,
        }
    }

    fn from_kind(kind: IntentKind, method: ClassificationMethod) -> Self {
        let flags = Signals {
            commit: kind == IntentKind::Commit,
            create: kind == IntentKind::Create,
            fix: kind == IntentKind::FunctionalityFix,
            edit: kind == IntentKind::Edit,
            read_only: kind == IntentKind::ReadOnly,
            conversation: kind == IntentKind::Conversation,
            manage: false,
        };
        Self::from_flags(flags, method)
    }

    pub fn general() -> Self {
        Self::from_kind(IntentKind::General, ClassificationMethod::Default)
    }

    /// Whether the user expects something to change.
    pub fn expects_mutation(&self) -> bool {
        matches!(
            self.kind,
            IntentKind::Commit | IntentKind::Create | IntentKind::FunctionalityFix | IntentKind::Edit
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Signals {
    commit: bool,
    create: bool,
    fix: bool,
    edit: bool,
    read_only: bool,
    conversation: bool,
    manage: bool,
}

impl Signals {
    fn any(&self) -> bool {
        self.commit || self.create || self.fix || self.edit || self.read_only || self.conversation
    }
}

struct Patterns {
    commit: Regex,
    create: Regex,
    fix: Regex,
    edit: Regex,
    read_only: Regex,
    conversation: Regex,
    manage: Regex,
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                commit: Regex::new(r"(?i)\b(commit|push|deploy|publish)\b").ok()?,
                create: Regex::new(
                    r"(?i)\b(create|scaffold)\b|\b(make|build|generate|write)\s+(me\s+)?(a|an|new)\b|\bnew\s+(file|page|game|project|site)\b",
                )
                .ok()?,
                fix: Regex::new(
                    r"(?i)\b(fix|bug|bugs|broken|crash|crashes|crashing|not working)\b|\bdoesn'?t work\b",
                )
                .ok()?,
                edit: Regex::new(
                    r"(?i)\b(change|update|modify|edit|replace|tweak|adjust)\b",
                )
                .ok()?,
                read_only: Regex::new(
                    r"(?i)\b(list|show|read|find|search|display|status|log|explain)\b|\blook\s+up\b|\bwhat'?s\s+in\b",
                )
                .ok()?,
                conversation: Regex::new(
                    r"(?i)^\s*(hi|hello|hey|thanks|thank you|thx|good (morning|evening|night)|how are you|who are you|lol|ok|okay|cool|nice)\b",
                )
                .ok()?,
                manage: Regex::new(r"(?i)\b(delete|remove|move|rename)\b").ok()?,
            })
        })
        .as_ref()
}

/// Keyword classification; `None` when no signal matched.
pub fn classify_heuristic(text: &str) -> Option<Intent> {
    let patterns = patterns()?;
    let manage = patterns.manage.is_match(text);
    let signals = Signals {
        commit: patterns.commit.is_match(text),
        create: patterns.create.is_match(text),
        fix: patterns.fix.is_match(text),
        edit: manage || patterns.edit.is_match(text),
        read_only: patterns.read_only.is_match(text),
        conversation: patterns.conversation.is_match(text),
        manage,
    };

    signals
        .any()
        .then(|| Intent::from_flags(signals, ClassificationMethod::Heuristic))
}

const CLASSIFY_PROMPT: &str = "Classify the user's request into exactly one category and reply with that single word: commit, create, fix, edit, read, chat, general.";

pub struct IntentClassifier {
    provider: Option<Arc<dyn ModelProvider>>,
    model: String,
    config: IntentConfig,
}

impl IntentClassifier {
    pub fn new(provider: Option<Arc<dyn ModelProvider>>, model: String, config: IntentConfig) -> Self {
        Self {
            provider,
            model,
            config,
        }
    }

    pub fn heuristic_only() -> Self {
        Self::new(None, String::new(), IntentConfig::default())
    }

    pub async fn classify(&self, text: &str) -> Intent {
        if let Some(intent) = classify_heuristic(text) {
            tracing::debug!(intent = intent.kind.label(), "classified by keywords");
            return intent;
        }

        if self.config.model_fallback {
            if let Some(intent) = self.classify_with_model(text).await {
                tracing::debug!(intent = intent.kind.label(), "classified by model");
                return intent;
            }
        }

        Intent::general()
    }

    async fn classify_with_model(&self, text: &str) -> Option<Intent> {
        let provider = self.provider.as_ref()?;
        let timeout = Duration::from_millis(self.config.timeout_ms.max(1));
        let request = CompletionRequest {
            model: self.model.clone(),
            system: CLASSIFY_PROMPT.to_owned(),
            messages: vec![ChatMessage::user(text)],
            tools: Vec::new(),
            temperature: 0.0,
            max_tokens: 8,
            timeout,
        };

        let completion = match tokio::time::timeout(timeout, provider.complete(&request)).await {
            Ok(Ok(completion)) => completion,
            Ok(Err(err)) => {
                tracing::debug!(error = %err, "intent model call failed");
                return None;
            }
            Err(_) => {
                tracing::debug!(timeout_ms = self.config.timeout_ms, "intent model call timed out");
                return None;
            }
        };

        let answer = completion.text_or_empty().trim().to_lowercase();
        let label = answer
            .split(|c: char| !c.is_ascii_alphabetic())
            .find(|word| !word.is_empty())?;
        IntentKind::from_label(label).map(|kind| Intent::from_kind(kind, ClassificationMethod::Model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::types::Completion;
    use crate::testing::ScriptedProvider;

    fn kind_of(text: &str) -> Option<IntentKind> {
        classify_heuristic(text).map(|intent| intent.kind)
    }

    #[test]
    fn keywords_map_to_expected_kinds() {
        assert_eq!(kind_of("list the files in src"), Some(IntentKind::ReadOnly));
        assert_eq!(kind_of("fix the timer bug in game.js"), Some(IntentKind::FunctionalityFix));
        assert_eq!(kind_of("make the title bigger"), None);
        assert_eq!(kind_of("change the title color to red"), Some(IntentKind::Edit));
        assert_eq!(kind_of("create a landing page"), Some(IntentKind::Create));
        assert_eq!(kind_of("hello there"), Some(IntentKind::Conversation));
    }

    #[test]
    fn file_management_is_an_edit_that_needs_more_tools() {
        for text in ["delete old.txt", "move notes.md into docs", "rename index.js to main.js"] {
            let intent = classify_heuristic(text).expect("signals");
            assert_eq!(intent.kind, IntentKind::Edit, "{text}");
            assert!(intent.is_file_management, "{text}");
            assert!(intent.expects_mutation());
        }

        let intent = classify_heuristic("change the title color").expect("signals");
        assert!(!intent.is_file_management);
        assert!(!Intent::from_kind(IntentKind::Edit, ClassificationMethod::Model).is_file_management);
    }

    #[test]
    fn precedence_is_commit_create_fix_edit_read_chat() {
        let intent = classify_heuristic("fix the bug and commit it").expect("signals");
        assert_eq!(intent.kind, IntentKind::Commit);
        assert!(intent.is_functionality_fix);
        assert!(intent.is_commit);

        let intent = classify_heuristic("create a new file and update the nav").expect("signals");
        assert_eq!(intent.kind, IntentKind::Create);
        assert!(intent.is_edit);

        let intent = classify_heuristic("show me what's broken").expect("signals");
        assert_eq!(intent.kind, IntentKind::FunctionalityFix);
        assert!(intent.is_read_only);
    }

    #[test]
    fn expects_mutation_only_for_write_kinds() {
        assert!(classify_heuristic("update the readme").map_or(false, |i| i.expects_mutation()));
        assert!(!classify_heuristic("list files").map_or(true, |i| i.expects_mutation()));
        assert!(!Intent::general().expects_mutation());
    }

    #[tokio::test]
    async fn falls_back_to_model_when_keywords_are_silent() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(Completion::text("Edit."))]));
        let classifier = IntentClassifier::new(
            Some(provider.clone() as Arc<dyn ModelProvider>),
            "fast/model".to_owned(),
            IntentConfig {
                model_fallback: true,
                timeout_ms: 1_000,
            },
        );

        let intent = classifier.classify("make the title bigger").await;
        assert_eq!(intent.kind, IntentKind::Edit);
        assert_eq!(intent.method, ClassificationMethod::Model);
        assert_eq!(provider.request_count(), 1);
    }

    #[tokio::test]
    async fn unparseable_model_answer_defaults_to_general() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(Completion::text("no idea"))]));
        let classifier = IntentClassifier::new(
            Some(provider as Arc<dyn ModelProvider>),
            "fast/model".to_owned(),
            IntentConfig {
                model_fallback: true,
                timeout_ms: 1_000,
            },
        );

        let intent = classifier.classify("make the title bigger").await;
        assert_eq!(intent, Intent::general());
    }

    #[tokio::test]
    async fn heuristic_only_never_calls_a_model() {
        let intent = IntentClassifier::heuristic_only()
            .classify("make the title bigger")
            .await;
        assert_eq!(intent.kind, IntentKind::General);
        assert_eq!(intent.method, ClassificationMethod::Default);
    }
}

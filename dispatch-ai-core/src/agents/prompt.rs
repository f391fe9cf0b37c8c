use std::sync::OnceLock;

use regex::Regex;

use crate::providers::types::ChatMessage;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a workspace automation assistant in a group chat. \
Use the provided tools to inspect and change files, look things up and commit work. \
Only claim a change was made when a tool call actually made it. \
Keep replies short and plain; the chat shows at most a few paragraphs.";

pub const MINIMAL_SYSTEM_PROMPT: &str =
    "You are a helpful assistant in a group chat. Answer briefly in plain text.";

pub const FINAL_ANSWER_NUDGE: &str = "Tools are no longer available for this request. \
Reply to the user now with a short summary of what was done and what you found.";

pub const NOTHING_COMPLETED: &str =
    "Completed 0 action(s). I ran out of steps before finishing, and nothing was changed.";

pub const NO_CHANGES_MADE: &str = "I tried, but no changes were made to any files. \
Could you tell me which file to change, or rephrase the request?";

/// System prompt with injected context blocks appended.
pub fn compose_system(base: &str, context_blocks: &[String]) -> String {
    let blocks: Vec<&str> = context_blocks
        .iter()
        .map(|block| block.trim())
        .filter(|block| !block.is_empty())
        .collect();
    if blocks.is_empty() {
        return base.to_owned();
    }
    format!("{base}\n\n{}", blocks.join("\n\n"))
}

/// Prior conversation followed by the new user message.
pub fn initial_messages(history: &[ChatMessage], user_message: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(user_message));
    messages
}

/// Whether `text` tells the user something was changed.
pub fn claims_success(text: &str) -> bool {
    static CLAIM: OnceLock<Option<Regex>> = OnceLock::new();
    CLAIM
        .get_or_init(|| {
            Regex::new(
                r"(?i)\b(done|updated|pushed|saved|committed|created|fixed|changed|edited|deployed|wrote|written|deleted|removed|moved|renamed|applied)\b",
            )
            .ok()
        })
        .as_ref()
        .is_some_and(|regex| regex.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_claims_are_detected() {
        assert!(claims_success("I've updated the title for you."));
        assert!(claims_success("Done!"));
        assert!(claims_success("Pushed to main."));
        assert!(!claims_success("The file contains a timer set to 1000ms."));
        assert!(!claims_success("Should I change it?"));
    }

    #[test]
    fn compose_system_skips_blank_blocks() {
        let composed = compose_system("base", &["  ".to_owned(), "Recent actions".to_owned()]);
        assert_eq!(composed, "base\n\nRecent actions");
        assert_eq!(compose_system("base", &[]), "base");
    }
}

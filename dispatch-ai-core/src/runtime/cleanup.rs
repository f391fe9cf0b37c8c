use std::sync::OnceLock;

use regex::Regex;

const ELLIPSIS: char = '…';

fn think_block() -> Option<&'static Regex> {
    static THINK: OnceLock<Option<Regex>> = OnceLock::new();
    THINK
        .get_or_init(|| Regex::new(r"(?is)<think>.*?(</think>|\z)").ok())
        .as_ref()
}

fn blank_runs() -> Option<&'static Regex> {
    static BLANKS: OnceLock<Option<Regex>> = OnceLock::new();
    BLANKS
        .get_or_init(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").ok())
        .as_ref()
}

/// Prepares model output for the chat: drops reasoning blocks, trims, collapses runs of
/// blank lines and truncates to `max_chars`.
pub fn clean_response(text: &str, max_chars: usize) -> String {
    let without_think = match think_block() {
        Some(regex) => regex.replace_all(text, "").into_owned(),
        None => text.to_owned(),
    };
    let normalized = without_think.replace("\r\n", "\n");
    let collapsed = match blank_runs() {
        Some(regex) => regex.replace_all(normalized.trim(), "\n\n").into_owned(),
        None => normalized.trim().to_owned(),
    };
    truncate(&collapsed, max_chars)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if max_chars == 0 || text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut truncated: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    truncated.truncate(truncated.trim_end().len());
    truncated.push(ELLIPSIS);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_reasoning_blocks() {
        let raw = "<think>the user wants a list</think>\n\nHere are the files.";
        assert_eq!(clean_response(raw, 2000), "Here are the files.");

        let unclosed = "Answer first.\n<think>trailing thoughts";
        assert_eq!(clean_response(unclosed, 2000), "Answer first.");
    }

    #[test]
    fn collapses_blank_line_runs() {
        let raw = "one\n\n\n\ntwo\r\n\r\n\r\nthree\n\nfour";
        assert_eq!(clean_response(raw, 2000), "one\n\ntwo\n\nthree\n\nfour");
    }

    #[test]
    fn truncates_to_the_reply_limit() {
        let cleaned = clean_response(&"a".repeat(50), 10);
        assert_eq!(cleaned.chars().count(), 10);
        assert!(cleaned.ends_with(ELLIPSIS));
        assert_eq!(clean_response("short", 10), "short");
    }
}

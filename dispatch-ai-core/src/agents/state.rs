use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

/// Why the loop stopped requesting completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model answered without tool calls.
    Completed,
    /// A batch performed at least one primary action.
    PrimaryAction,
    /// Too many consecutive read-only batches.
    ReadOnlyExhausted,
    IterationCap,
    /// The provider returned a neutral placeholder instead of an answer.
    Degraded,
}

impl StopReason {
    /// Stops that end with one extra tool-disabled completion.
    pub fn needs_final_completion(self) -> bool {
        matches!(
            self,
            Self::PrimaryAction | Self::ReadOnlyExhausted | Self::IterationCap
        )
    }
}

/// Audit entry for one executed (or refused) tool call.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub iteration: usize,
    pub call_id: String,
    pub tool: String,
    pub arguments: Value,
    pub success: bool,
    pub output: String,
    pub duration_ms: u64,
}

/// Mutable bookkeeping of one loop invocation.
#[derive(Debug)]
pub struct LoopState {
    pub iteration: usize,
    pub consecutive_read_only: usize,
    pub edited_paths: HashSet<String>,
    pub primary_actions: usize,
    /// Short descriptions of primary actions, e.g. "edited game.js".
    pub action_summaries: Vec<String>,
    pub records: Vec<ToolCallRecord>,
    pub model: String,
}

impl LoopState {
    pub fn new(model: String) -> Self {
        Self {
            iteration: 0,
            consecutive_read_only: 0,
            edited_paths: HashSet::new(),
            primary_actions: 0,
            action_summaries: Vec::new(),
            records: Vec::new(),
            model,
        }
    }

    /// Updates the read-only streak after a batch and returns its new length.
    pub fn note_batch(&mut self, all_read_only: bool) -> usize {
        if all_read_only {
            self.consecutive_read_only += 1;
        } else {
            self.consecutive_read_only = 0;
        }
        self.consecutive_read_only
    }

    pub fn already_edited(&self, path: &str) -> bool {
        self.edited_paths.contains(&normalize_target(path))
    }

    pub fn mark_edited(&mut self, path: &str) {
        self.edited_paths.insert(normalize_target(path));
    }
}

fn normalize_target(path: &str) -> String {
    path.trim().trim_start_matches("./").to_owned()
}

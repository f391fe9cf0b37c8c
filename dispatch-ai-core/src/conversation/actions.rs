use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::schema::ActionCacheConfig;
use crate::conversation::types::ConversationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Write,
    Edit,
    Delete,
    Move,
    Commit,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Write => "wrote",
            Self::Edit => "edited",
            Self::Delete => "deleted",
            Self::Move => "moved",
            Self::Commit => "committed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub kind: ActionKind,
    pub targets: Vec<String>,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
struct ActionList {
    actions: VecDeque<ActionRecord>,
    touched: Instant,
}

/// Recent successful mutations per conversation, so follow-ups can refer to them.
#[derive(Debug)]
pub struct ActionCache {
    lists: Mutex<HashMap<ConversationId, ActionList>>,
    config: ActionCacheConfig,
}

impl ActionCache {
    pub fn new(config: ActionCacheConfig) -> Self {
        Self {
            lists: Mutex::new(HashMap::new()),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConversationId, ActionList>> {
        self.lists.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.config.ttl_secs)
    }

    pub fn record(&self, conversation_id: &str, action: ActionRecord) {
        self.record_at(conversation_id, action, Instant::now());
    }

    fn record_at(&self, conversation_id: &str, action: ActionRecord, now: Instant) {
        let mut lists = self.lock();
        let list = lists
            .entry(conversation_id.to_owned())
            .or_insert_with(|| ActionList {
                actions: VecDeque::new(),
                touched: now,
            });

        if now.saturating_duration_since(list.touched) > self.ttl() {
            list.actions.clear();
        }

        list.actions.push_back(action);
        while list.actions.len() > self.config.max_actions {
            list.actions.pop_front();
        }
        list.touched = now;
    }

    /// Recorded actions, oldest first; an expired list is dropped and reads as empty.
    pub fn recent(&self, conversation_id: &str) -> Vec<ActionRecord> {
        self.recent_at(conversation_id, Instant::now())
    }

    fn recent_at(&self, conversation_id: &str, now: Instant) -> Vec<ActionRecord> {
        let mut lists = self.lock();
        let expired = match lists.get(conversation_id) {
            None => return Vec::new(),
            Some(list) => now.saturating_duration_since(list.touched) > self.ttl(),
        };

        if expired {
            lists.remove(conversation_id);
            return Vec::new();
        }

        lists
            .get(conversation_id)
            .map(|list| list.actions.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Context block listing recent actions, or `None` when there are none.
    pub fn summarize(&self, conversation_id: &str) -> Option<String> {
        render_summary(&self.recent(conversation_id))
    }

    /// Recently touched paths, newest first, without duplicates.
    pub fn recent_targets(&self, conversation_id: &str) -> Vec<String> {
        let mut targets: Vec<String> = Vec::new();
        for action in self.recent(conversation_id).iter().rev() {
            for target in &action.targets {
                if !targets.contains(target) {
                    targets.push(target.clone());
                }
            }
        }
        targets
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let ttl = self.ttl();
        let mut lists = self.lock();
        let before = lists.len();
        lists.retain(|_, list| now.saturating_duration_since(list.touched) <= ttl);
        before - lists.len()
    }
}

fn render_summary(actions: &[ActionRecord]) -> Option<String> {
    if actions.is_empty() {
        return None;
    }

    let lines = actions
        .iter()
        .map(|action| {
            format!(
                "- {} {} at {}: {}",
                action.kind,
                action.targets.join(" -> "),
                action.timestamp.format("%H:%M:%S UTC"),
                action.summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    Some(format!(
        "Recent actions in this conversation (most recent last). When the user refers to \"it\" or \"the file\", they most likely mean one of these:\n{lines}"
    ))
}

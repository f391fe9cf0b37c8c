use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::providers::types::ChatMessage;

pub type ConversationId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One message in a conversation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub role: TurnRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction_summary: Option<String>,
}

impl Turn {
    pub fn to_chat_message(&self) -> ChatMessage {
        let mut content = self.text.clone();
        if let Some(reactions) = &self.reaction_summary {
            content.push_str(&format!("\n[reactions: {reactions}]"));
        }
        match self.role {
            TurnRole::User => ChatMessage::user(content),
            TurnRole::Assistant => ChatMessage::assistant(content),
        }
    }
}

/// Opaque reference to a message the transport delivered, used for later edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub conversation_id: ConversationId,
    pub message_id: String,
}

/// A user message arriving from the chat platform.
#[derive(Debug, Clone)]
pub struct InboundTurn {
    pub conversation_id: ConversationId,
    pub actor_id: String,
    /// Slash-command name, or a stable label for free-form messages.
    pub command_id: String,
    pub message_id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl InboundTurn {
    pub fn as_turn(&self) -> Turn {
        Turn {
            id: self.message_id.clone(),
            role: TurnRole::User,
            text: self.text.clone(),
            timestamp: self.timestamp,
            reaction_summary: None,
        }
    }
}

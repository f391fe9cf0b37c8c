use serde::Serialize;
use serde_json::Value;

use crate::intent::{ClassificationMethod, IntentKind};
use crate::routing::PlanIntent;

/// Progress notifications for one turn, published on the [`super::EventBus`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TurnStarted {
        conversation_id: String,
        actor_id: String,
        command_id: String,
    },
    IntentClassified {
        conversation_id: String,
        intent: IntentKind,
        method: ClassificationMethod,
        plan: Option<PlanIntent>,
        plan_confidence: Option<f32>,
    },
    RungStarted {
        conversation_id: String,
        rung: usize,
        strategy: String,
        model: String,
    },
    RungRejected {
        conversation_id: String,
        rung: usize,
        strategy: String,
        reason: String,
    },
    /// Retry downgrade or an agent-requested `switch_model`.
    ModelSwitched {
        conversation_id: String,
        from: String,
        to: String,
        reason: String,
    },
    ToolStarted {
        conversation_id: String,
        iteration: usize,
        tool: String,
        args: Value,
    },
    ToolFinished {
        conversation_id: String,
        iteration: usize,
        tool: String,
        success: bool,
        duration_ms: u64,
    },
    TurnFinished {
        conversation_id: String,
        success: bool,
        failure: Option<String>,
        elapsed_ms: u64,
    },
}

impl Event {
    pub fn conversation_id(&self) -> &str {
        match self {
            Self::TurnStarted {
                conversation_id, ..
            }
            | Self::IntentClassified {
                conversation_id, ..
            }
            | Self::RungStarted {
                conversation_id, ..
            }
            | Self::RungRejected {
                conversation_id, ..
            }
            | Self::ModelSwitched {
                conversation_id, ..
            }
            | Self::ToolStarted {
                conversation_id, ..
            }
            | Self::ToolFinished {
                conversation_id, ..
            }
            | Self::TurnFinished {
                conversation_id, ..
            } => conversation_id,
        }
    }
}

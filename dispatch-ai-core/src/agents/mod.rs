pub mod behavior;
pub mod prompt;
pub mod state;

pub use behavior::{AgentLoop, AgentRequest, LoopOutcome};
pub use state::{StopReason, ToolCallRecord};

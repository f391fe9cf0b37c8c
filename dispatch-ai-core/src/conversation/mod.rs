pub mod actions;
pub mod cache;
pub mod transport;
pub mod types;

pub use actions::{ActionCache, ActionKind, ActionRecord};
pub use cache::{ConversationCache, EntryState};
pub use transport::ChatTransport;
pub use types::{ConversationId, InboundTurn, MessageHandle, Turn, TurnRole};

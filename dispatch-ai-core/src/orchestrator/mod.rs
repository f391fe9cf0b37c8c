pub mod ladder;

pub use ladder::{LadderOutcome, LadderRequest, Orchestrator};

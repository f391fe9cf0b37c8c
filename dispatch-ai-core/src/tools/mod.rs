pub mod catalog;
pub mod types;
pub mod workspace;

pub use types::{ToolBackend, ToolInvocation, ToolOutput};
pub use workspace::LocalWorkspace;

pub mod agents;
pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod guard;
pub mod intent;
pub mod logging;
pub mod orchestrator;
pub mod providers;
pub mod routing;
pub mod runtime;
pub mod tools;

#[cfg(test)]
mod testing;

use std::path::Path;
use std::sync::Arc;

pub use config::Config;
pub use conversation::{ChatTransport, InboundTurn, MessageHandle, Turn};
pub use error::{Error, Result};
pub use events::{Event, EventBus};
pub use runtime::{FailureKind, Runtime, TurnReport};

/// Fully wired assistant: configured provider, local workspace tools and the turn runtime.
pub struct DispatchAI {
    runtime: Runtime,
    workspace_root: std::path::PathBuf,
}

impl DispatchAI {
    pub fn new(config: Config, transport: Arc<dyn ChatTransport>) -> Result<Self> {
        config::validate_config(&config)?;
        let provider = providers::create_provider(&config.provider)?;
        let workspace = tools::LocalWorkspace::new(config.workspace.clone())?;
        let workspace_root = workspace.root().to_path_buf();
        tracing::info!(
            provider = provider.name(),
            model = %config.models.primary,
            workspace = %workspace_root.display(),
            "assistant initialized"
        );

        let runtime = Runtime::new(
            config,
            provider,
            Arc::new(workspace),
            transport,
            EventBus::default(),
        );
        Ok(Self {
            runtime,
            workspace_root,
        })
    }

    pub fn from_config_path(path: &Path, transport: Arc<dyn ChatTransport>) -> Result<Self> {
        let config = config::load(Some(path))?;
        Self::new(config, transport)
    }

    pub fn config(&self) -> &Config {
        self.runtime.config()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn events(&self) -> &EventBus {
        self.runtime.events()
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }
}

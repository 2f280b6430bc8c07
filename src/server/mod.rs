//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - MCP server implementation over stdio
//! - Tool call handlers and routing
//! - Shared application state

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;

use crate::config::Config;
use crate::storage::FileStorage;
use crate::thinking::SequentialThinking;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Sequential thinking service over the configured session.
    pub thinking: SequentialThinking,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, storage: FileStorage) -> Self {
        tracing::info!(
            session = %storage.paths().data.display(),
            max_related = config.analysis.max_related,
            "AppState initializing"
        );

        let thinking = SequentialThinking::new(storage, &config);
        Self { config, thinking }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalysisConfig, LoggingConfig, StorageConfig};
    use crate::storage::ThoughtStorage;
    use tempfile::TempDir;

    fn create_test_config(dir: &TempDir) -> Config {
        Config {
            storage: StorageConfig::new(dir.path()),
            logging: LoggingConfig::default(),
            analysis: AnalysisConfig { max_related: 2 },
        }
    }

    #[tokio::test]
    async fn test_app_state_new() {
        let dir = TempDir::new().unwrap();
        let config = create_test_config(&dir);
        let storage = FileStorage::open(
            config.storage.session_paths(),
            config.storage.lock_timeout(),
        )
        .await
        .unwrap();

        let state = AppState::new(config, storage);
        assert_eq!(state.config.analysis.max_related, 2);
        assert_eq!(state.thinking.storage().thought_count().await, 0);
        assert_eq!(
            state.thinking.storage().paths().data,
            dir.path().join("current_session.json")
        );
    }

    #[tokio::test]
    async fn test_shared_state_clones_share_session() {
        let dir = TempDir::new().unwrap();
        let config = create_test_config(&dir);
        let storage = FileStorage::open(
            config.storage.session_paths(),
            config.storage.lock_timeout(),
        )
        .await
        .unwrap();

        let state: SharedState = Arc::new(AppState::new(config, storage));
        let cloned = (*state).clone();
        cloned
            .thinking
            .submit(crate::thought::ThoughtInput::new(
                "shared",
                1,
                1,
                crate::thought::ThoughtStage::Conclusion,
            ))
            .await
            .unwrap();

        assert_eq!(state.thinking.storage().thought_count().await, 1);
    }
}

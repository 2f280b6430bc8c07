//! # MCP Sequential Thinking Server
//!
//! A Model Context Protocol (MCP) server that records a structured thinking
//! process as a sequence of staged, revisable and branchable thoughts, keeps
//! each session in a JSON file shared safely between processes, and offers
//! lightweight analysis of the session.
//!
//! ## Features
//!
//! - **Stages**: Problem Definition, Research, Analysis, Synthesis, Conclusion
//! - **Revisions and branches**: thoughts reference earlier thoughts by number
//! - **Durable sessions**: atomic writes under an advisory file lock, with
//!   automatic backup and reset when a session file is unreadable
//! - **Analysis**: related thoughts, per-stage counts, timeline, top tags
//!
//! ## Architecture
//!
//! ```text
//! MCP Client → McpServer → SequentialThinking → FileStorage → <session>.json
//!                                   ↓
//!                               analysis
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mcp_sequential_thinking::{AppState, Config, McpServer};
//! use mcp_sequential_thinking::storage::FileStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = FileStorage::open(
//!         config.storage.session_paths(),
//!         config.storage.lock_timeout(),
//!     )
//!     .await?;
//!     let state = Arc::new(AppState::new(config, storage));
//!     McpServer::new(state).run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Stateless analysis over session snapshots.
pub mod analysis;
/// Command-line interface.
pub mod cli;
/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// MCP server implementation and request handling.
pub mod server;
/// Session storage: file store and advisory lock.
pub mod storage;
/// The sequential thinking service.
pub mod thinking;
/// Thought records and the stage vocabulary.
pub mod thought;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use server::{AppState, McpServer, SharedState};
pub use thinking::SequentialThinking;
pub use thought::{ThoughtInput, ThoughtRecord, ThoughtStage};

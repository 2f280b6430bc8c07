//! The sequential-thinking service that transports call into.
//!
//! [`SequentialThinking`] validates submissions, persists them through the
//! session store and runs the analyzer over store snapshots.

use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::{self, SummaryReport, ThoughtAnalysis};
use crate::config::Config;
use crate::error::{AppResult, ThoughtError};
use crate::storage::{FileStorage, ThoughtStorage};
use crate::thought::{ThoughtInput, ThoughtRecord};

/// Caller-facing projection returned after a thought is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResult {
    /// Position of the stored thought.
    pub thought_number: u32,
    /// Estimated length of the sequence.
    pub total_thoughts: u32,
    /// Whether the caller intends to continue.
    pub next_thought_needed: bool,
    /// Every branch label in the session, first-seen order.
    pub branches: Vec<String>,
    /// Records in the session once this one was stored.
    pub thought_history_length: usize,
}

/// Sequential thinking over one session.
#[derive(Clone)]
pub struct SequentialThinking {
    storage: FileStorage,
    max_related: usize,
}

impl SequentialThinking {
    /// Create a new service over an opened session.
    pub fn new(storage: FileStorage, config: &Config) -> Self {
        Self::with_max_related(storage, config.analysis.max_related)
    }

    /// Create a service with an explicit related-thought limit.
    pub fn with_max_related(storage: FileStorage, max_related: usize) -> Self {
        Self {
            storage,
            max_related,
        }
    }

    /// The underlying session store.
    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    /// Validate and store a thought.
    ///
    /// Nothing is stored when validation or persistence fails.
    pub async fn submit(&self, input: ThoughtInput) -> AppResult<SubmitResult> {
        let start = Instant::now();
        let thought = ThoughtRecord::create(input)?;

        let previous_estimate = self
            .storage
            .get_all_thoughts()
            .await
            .iter()
            .map(|t| t.total_thoughts)
            .max();
        if let Some(previous) = previous_estimate {
            if thought.total_thoughts < previous {
                warn!(
                    previous_total = previous,
                    total_thoughts = thought.total_thoughts,
                    "Estimated total thoughts lowered"
                );
            }
        }

        let headline = thought.headline();
        let stage = thought.stage;
        let thought_number = thought.thought_number;
        let total_thoughts = thought.total_thoughts;
        let next_thought_needed = thought.next_thought_needed;
        let appended = self.storage.append(thought).await?;
        let thought_history_length = appended.history_length;

        info!(
            thought = %headline,
            stage = %stage,
            history_length = thought_history_length,
            latency_ms = start.elapsed().as_millis() as u64,
            "Thought recorded"
        );

        Ok(SubmitResult {
            thought_number,
            total_thoughts,
            next_thought_needed,
            branches: appended.branches,
            thought_history_length,
        })
    }

    /// Summarize the session.
    pub async fn summary(&self) -> SummaryReport {
        let thoughts = self.storage.get_all_thoughts().await;
        analysis::generate_summary(&thoughts)
    }

    /// Analyze the most recent thought with the given number.
    pub async fn analyze(&self, thought_number: u32) -> AppResult<ThoughtAnalysis> {
        let thoughts = self.storage.get_all_thoughts().await;
        let target = thoughts
            .iter()
            .rev()
            .find(|t| t.thought_number == thought_number)
            .ok_or_else(|| {
                ThoughtError::validation(
                    "thoughtNumber",
                    format!("no thought numbered {} in this session", thought_number),
                )
            })?;

        debug!(thought_id = %target.id(), thought_number, "Analyzing thought");
        Ok(analysis::analyze_thought(
            target,
            &thoughts,
            self.max_related,
        ))
    }

    /// Discard every thought in the session.
    pub async fn clear(&self) -> AppResult<()> {
        self.storage.clear().await?;
        Ok(())
    }

    /// Export the session to `path`, returning the number of thoughts written.
    pub async fn export(&self, path: impl Into<PathBuf>) -> AppResult<usize> {
        Ok(self.storage.export_session(path).await?)
    }

    /// Replace the session with the contents of `path`.
    pub async fn import(&self, path: impl Into<PathBuf>) -> AppResult<usize> {
        Ok(self.storage.import_session(path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionPaths;
    use crate::error::AppError;
    use crate::thought::ThoughtStage;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn service(dir: &TempDir) -> SequentialThinking {
        let storage = FileStorage::open(
            SessionPaths::new(dir.path(), "session"),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        SequentialThinking::with_max_related(storage, 3)
    }

    #[tokio::test]
    async fn test_submit_returns_projection() {
        let dir = TempDir::new().unwrap();
        let thinking = service(&dir).await;

        let result = thinking
            .submit(
                ThoughtInput::new("Explore options", 2, 5, ThoughtStage::Research)
                    .branching_from(1, "explore-A"),
            )
            .await
            .unwrap();

        assert_eq!(
            result,
            SubmitResult {
                thought_number: 2,
                total_thoughts: 5,
                next_thought_needed: true,
                branches: vec!["explore-A".to_string()],
                thought_history_length: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_submission_stores_nothing() {
        let dir = TempDir::new().unwrap();
        let thinking = service(&dir).await;

        let err = thinking
            .submit(ThoughtInput::new("", 1, 3, ThoughtStage::Research))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Thought(ThoughtError::Validation { .. })));
        assert_eq!(thinking.storage().thought_count().await, 0);
        assert!(!thinking.storage().paths().data.exists());
    }

    #[tokio::test]
    async fn test_revision_keeps_original() {
        let dir = TempDir::new().unwrap();
        let thinking = service(&dir).await;

        thinking
            .submit(ThoughtInput::new("First", 1, 3, ThoughtStage::ProblemDefinition))
            .await
            .unwrap();
        thinking
            .submit(ThoughtInput::new("First, restated", 2, 3, ThoughtStage::ProblemDefinition).revising(1))
            .await
            .unwrap();

        let summary = thinking.summary().await;
        assert_eq!(summary.revision_count, 1);
        assert_eq!(summary.total_thoughts, 2);
    }

    #[tokio::test]
    async fn test_analyze_uses_latest_record_with_number() {
        let dir = TempDir::new().unwrap();
        let thinking = service(&dir).await;

        thinking
            .submit(ThoughtInput::new("draft", 1, 2, ThoughtStage::Research))
            .await
            .unwrap();
        thinking
            .submit(ThoughtInput::new("other", 2, 2, ThoughtStage::Analysis))
            .await
            .unwrap();
        thinking
            .submit(ThoughtInput::new("second take", 1, 2, ThoughtStage::Analysis))
            .await
            .unwrap();

        let analysis = thinking.analyze(1).await.unwrap();
        assert_eq!(analysis.current_stage, ThoughtStage::Analysis);
        assert_eq!(analysis.thought_history_length, 3);
        assert_eq!(analysis.related_thoughts[0].thought_number, 2);
    }

    #[tokio::test]
    async fn test_analyze_unknown_number() {
        let dir = TempDir::new().unwrap();
        let thinking = service(&dir).await;
        assert!(thinking.analyze(7).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submits_see_their_own_history_length() {
        let dir = TempDir::new().unwrap();
        let thinking = service(&dir).await;

        let handles: Vec<_> = (1..=10)
            .map(|n| {
                let thinking = thinking.clone();
                tokio::spawn(async move {
                    thinking
                        .submit(ThoughtInput::new(format!("step {}", n), n, 10, ThoughtStage::Analysis))
                        .await
                })
            })
            .collect();

        let mut lengths = Vec::new();
        for handle in handles {
            lengths.push(handle.await.unwrap().unwrap().thought_history_length);
        }
        lengths.sort_unstable();
        assert_eq!(lengths, (1..=10usize).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_lowered_estimate_is_accepted() {
        let dir = TempDir::new().unwrap();
        let thinking = service(&dir).await;

        thinking
            .submit(ThoughtInput::new("a", 1, 8, ThoughtStage::Research))
            .await
            .unwrap();
        let result = thinking
            .submit(ThoughtInput::new("b", 2, 3, ThoughtStage::Analysis))
            .await
            .unwrap();
        assert_eq!(result.total_thoughts, 3);
    }
}

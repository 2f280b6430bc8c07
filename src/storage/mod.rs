//! Storage layer for thought sessions.
//!
//! A session is one ordered sequence of [`ThoughtRecord`]s held in memory and
//! mirrored to a JSON file. [`FileStorage`] serializes access with an
//! in-process mutex and, around every touch of the file, an advisory
//! [`FileLock`] shared with other processes.
//!
//! ```text
//! add_thought ─► mutex ─► encode ─► FileLock ─► write tmp ─► rename ─► commit to memory
//! ```
//!
//! Everything after the mutex runs as one blocking task that owns the guard,
//! so a caller that gives up mid-write cannot leave memory behind the file.

mod file;
mod lock;

pub use file::{Appended, FileStorage};
pub use lock::FileLock;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis;
use crate::error::StorageResult;
use crate::thought::{ThoughtRecord, ThoughtStage};

/// Operations over one session's ordered thought sequence.
///
/// Read operations return snapshots; callers never hold a view into the
/// store's own sequence.
#[async_trait]
pub trait ThoughtStorage: Send + Sync {
    /// Append a record and persist the full sequence. The record is only
    /// visible to readers once the durable write has succeeded.
    async fn add_thought(&self, thought: ThoughtRecord) -> StorageResult<()>;

    /// Snapshot of every committed record in submission order.
    async fn get_all_thoughts(&self) -> Vec<ThoughtRecord>;

    /// Records in the given stage, in submission order.
    async fn get_thoughts_by_stage(&self, stage: ThoughtStage) -> Vec<ThoughtRecord> {
        self.get_all_thoughts()
            .await
            .into_iter()
            .filter(|t| t.stage == stage)
            .collect()
    }

    /// Records carrying the given branch label, in submission order.
    async fn get_thoughts_by_branch(&self, branch_id: &str) -> Vec<ThoughtRecord> {
        self.get_all_thoughts()
            .await
            .into_iter()
            .filter(|t| t.branch_id.as_deref() == Some(branch_id))
            .collect()
    }

    /// Distinct branch labels in order of first appearance.
    async fn list_branches(&self) -> Vec<String> {
        analysis::branch_ids(&self.get_all_thoughts().await)
    }

    /// Number of committed records.
    async fn thought_count(&self) -> usize {
        self.get_all_thoughts().await.len()
    }

    /// Empty the session, in memory and on disk.
    async fn clear(&self) -> StorageResult<()>;
}

/// On-disk session layout.
///
/// Unknown keys are ignored so that exported sessions (which add
/// `exportedAt` and `metadata`) can be read back with the same type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDocument {
    /// Records in submission order.
    #[serde(default)]
    pub thoughts: Vec<ThoughtRecord>,
}

/// Borrowing form of [`SessionDocument`] used when writing.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionFileRef<'a> {
    thoughts: Vec<&'a ThoughtRecord>,
    last_updated: DateTime<Utc>,
}

/// Layout written by [`FileStorage::export_session`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    /// Records in submission order.
    pub thoughts: Vec<ThoughtRecord>,
    /// When the export was taken.
    pub exported_at: DateTime<Utc>,
    /// Counts describing the export.
    pub metadata: ExportMetadata,
}

/// Summary counts embedded in an export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    /// Number of records exported.
    pub total_thoughts: usize,
    /// Records per stage, every stage listed.
    pub stages: BTreeMap<ThoughtStage, usize>,
}

impl ExportDocument {
    /// Build an export of the given snapshot.
    pub fn new(thoughts: Vec<ThoughtRecord>) -> Self {
        let metadata = ExportMetadata {
            total_thoughts: thoughts.len(),
            stages: analysis::stage_counts(&thoughts),
        };
        Self {
            thoughts,
            exported_at: Utc::now(),
            metadata,
        }
    }
}

/// Serialize a session sequence for the data file.
fn encode_session<'a>(
    thoughts: impl Iterator<Item = &'a ThoughtRecord>,
) -> StorageResult<Vec<u8>> {
    let document = SessionFileRef {
        thoughts: thoughts.collect(),
        last_updated: Utc::now(),
    };
    Ok(serde_json::to_vec_pretty(&document)?)
}

/// Parse and re-validate a session or export file.
///
/// Returns a description of the first problem found.
fn decode_session(raw: &[u8]) -> Result<Vec<ThoughtRecord>, String> {
    let document: SessionDocument =
        serde_json::from_slice(raw).map_err(|e| format!("invalid session JSON: {}", e))?;
    for (index, thought) in document.thoughts.iter().enumerate() {
        thought
            .validate()
            .map_err(|e| format!("thought at index {}: {}", index, e))?;
    }
    Ok(document.thoughts)
}

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::{decode_session, encode_session, ExportDocument, FileLock, ThoughtStorage};
use crate::analysis;
use crate::config::SessionPaths;
use crate::error::{StorageError, StorageResult};
use crate::thought::{ThoughtRecord, ThoughtStage};

/// File-backed session store.
///
/// Cloning is cheap and every clone shares the same in-memory sequence.
#[derive(Clone)]
pub struct FileStorage {
    inner: Arc<Inner>,
}

struct Inner {
    paths: SessionPaths,
    lock_timeout: Duration,
    state: Arc<Mutex<SessionState>>,
}

#[derive(Default)]
struct SessionState {
    thoughts: Vec<ThoughtRecord>,
    last_backup: Option<PathBuf>,
}

/// Result of reading the session file.
struct Loaded {
    thoughts: Vec<ThoughtRecord>,
    backup: Option<PathBuf>,
}

impl FileStorage {
    /// Open the session at `paths`, loading any existing records.
    ///
    /// An unreadable session file is moved aside to a timestamped backup and
    /// the session starts empty; see [`FileStorage::last_backup`].
    pub async fn open(paths: SessionPaths, lock_timeout: Duration) -> StorageResult<Self> {
        let loaded = {
            let paths = paths.clone();
            run_blocking(move || load_session(&paths, lock_timeout)).await?
        };

        info!(
            path = %paths.data.display(),
            thoughts = loaded.thoughts.len(),
            "Session opened"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                paths,
                lock_timeout,
                state: Arc::new(Mutex::new(SessionState {
                    thoughts: loaded.thoughts,
                    last_backup: loaded.backup,
                })),
            }),
        })
    }

    /// Locations of the session and lock files.
    pub fn paths(&self) -> &SessionPaths {
        &self.inner.paths
    }

    /// Backup created the last time an unreadable session file was recovered.
    pub async fn last_backup(&self) -> Option<PathBuf> {
        self.inner.state.lock().await.last_backup.clone()
    }

    /// Replace the in-memory sequence with the current contents of the
    /// session file, picking up writes made by other processes.
    pub async fn reload(&self) -> StorageResult<usize> {
        self.mutate(|state, paths, timeout| {
            let loaded = load_session(paths, timeout)?;
            state.thoughts = loaded.thoughts;
            if loaded.backup.is_some() {
                state.last_backup = loaded.backup;
            }
            debug!(thoughts = state.thoughts.len(), "Session reloaded");
            Ok(state.thoughts.len())
        })
        .await
    }

    /// Write the current session, with summary metadata, to `path`.
    pub async fn export_session(&self, path: impl Into<PathBuf>) -> StorageResult<usize> {
        let path = path.into();
        let snapshot = self.get_all_thoughts().await;
        let count = snapshot.len();
        let encoded = serde_json::to_vec_pretty(&ExportDocument::new(snapshot))?;

        let target = path.clone();
        run_blocking(move || write_atomically(&target, &encoded)).await?;

        info!(path = %path.display(), thoughts = count, "Session exported");
        Ok(count)
    }

    /// Replace the session with the records in an exported (or session) file.
    ///
    /// The file is fully parsed and validated before anything changes.
    pub async fn import_session(&self, path: impl Into<PathBuf>) -> StorageResult<usize> {
        let path = path.into();
        let source = path.clone();
        let thoughts = run_blocking(move || {
            let raw = fs::read(&source).map_err(|e| StorageError::io(&source, e))?;
            decode_session(&raw).map_err(|reason| StorageError::InvalidSession {
                path: source.clone(),
                reason,
            })
        })
        .await?;

        self.mutate(move |state, paths, timeout| {
            persist(paths, timeout, &encode_session(thoughts.iter())?)?;

            let count = thoughts.len();
            state.thoughts = thoughts;
            info!(path = %path.display(), thoughts = count, "Session imported");
            Ok(count)
        })
        .await
    }

    /// Append a record and report the session as it stood right after the
    /// append, under the same guard.
    pub async fn append(&self, thought: ThoughtRecord) -> StorageResult<Appended> {
        self.mutate(move |state, paths, timeout| {
            let encoded = encode_session(state.thoughts.iter().chain(std::iter::once(&thought)))?;
            persist(paths, timeout, &encoded)?;

            debug!(
                thought_id = %thought.id(),
                thought_number = thought.thought_number,
                history_length = state.thoughts.len() + 1,
                "Thought persisted"
            );
            state.thoughts.push(thought);
            Ok(Appended {
                history_length: state.thoughts.len(),
                branches: analysis::branch_ids(&state.thoughts),
            })
        })
        .await
    }

    /// Run `change` against the session state on the blocking pool.
    ///
    /// The state guard moves into the blocking task, which runs to
    /// completion even if the calling future is dropped. File and memory
    /// therefore always change together.
    async fn mutate<T, F>(&self, change: F) -> StorageResult<T>
    where
        F: FnOnce(&mut SessionState, &SessionPaths, Duration) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut state = Arc::clone(&self.inner.state).lock_owned().await;
        let paths = self.inner.paths.clone();
        let timeout = self.inner.lock_timeout;
        run_blocking(move || change(&mut *state, &paths, timeout)).await
    }
}

/// Session shape immediately after an append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appended {
    /// Number of records including the new one.
    pub history_length: usize,
    /// Distinct branch labels in order of first appearance.
    pub branches: Vec<String>,
}

#[async_trait]
impl ThoughtStorage for FileStorage {
    async fn add_thought(&self, thought: ThoughtRecord) -> StorageResult<()> {
        self.append(thought).await.map(|_| ())
    }

    async fn get_all_thoughts(&self) -> Vec<ThoughtRecord> {
        self.inner.state.lock().await.thoughts.clone()
    }

    async fn get_thoughts_by_stage(&self, stage: ThoughtStage) -> Vec<ThoughtRecord> {
        let state = self.inner.state.lock().await;
        state
            .thoughts
            .iter()
            .filter(|t| t.stage == stage)
            .cloned()
            .collect()
    }

    async fn get_thoughts_by_branch(&self, branch_id: &str) -> Vec<ThoughtRecord> {
        let state = self.inner.state.lock().await;
        state
            .thoughts
            .iter()
            .filter(|t| t.branch_id.as_deref() == Some(branch_id))
            .cloned()
            .collect()
    }

    async fn list_branches(&self) -> Vec<String> {
        analysis::branch_ids(&self.inner.state.lock().await.thoughts)
    }

    async fn thought_count(&self) -> usize {
        self.inner.state.lock().await.thoughts.len()
    }

    async fn clear(&self) -> StorageResult<()> {
        self.mutate(|state, paths, timeout| {
            persist(paths, timeout, &encode_session(std::iter::empty())?)?;

            info!(discarded = state.thoughts.len(), "Session cleared");
            state.thoughts.clear();
            Ok(())
        })
        .await
    }
}

async fn run_blocking<T, F>(task: F) -> StorageResult<T>
where
    F: FnOnce() -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| StorageError::Task {
            message: e.to_string(),
        })?
}

/// Hold the advisory lock and replace the data file with `encoded`.
fn persist(paths: &SessionPaths, timeout: Duration, encoded: &[u8]) -> StorageResult<()> {
    let _lock = FileLock::acquire(&paths.lock, timeout)?;
    write_atomically(&paths.data, encoded)
}

fn load_session(paths: &SessionPaths, timeout: Duration) -> StorageResult<Loaded> {
    let _lock = FileLock::acquire(&paths.lock, timeout)?;

    let raw = match fs::read(&paths.data) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Ok(Loaded {
                thoughts: Vec::new(),
                backup: None,
            })
        }
        Err(e) => return Err(StorageError::io(&paths.data, e)),
    };

    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Loaded {
            thoughts: Vec::new(),
            backup: None,
        });
    }

    match decode_session(&raw) {
        Ok(thoughts) => Ok(Loaded {
            thoughts,
            backup: None,
        }),
        Err(reason) => {
            let backup = backup_path(&paths.data, Utc::now());
            fs::rename(&paths.data, &backup).map_err(|e| StorageError::io(&paths.data, e))?;
            error!(
                path = %paths.data.display(),
                backup = %backup.display(),
                reason = %reason,
                "Session file unreadable, moved to backup and starting empty"
            );
            Ok(Loaded {
                thoughts: Vec::new(),
                backup: Some(backup),
            })
        }
    }
}

/// `<file>.bak.<YYYYmmddHHMMSS>` beside the data file. A numeric suffix is
/// appended if a backup with that second's stamp already exists.
fn backup_path(data: &Path, now: DateTime<Utc>) -> PathBuf {
    let stem = data
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "session".to_string());
    let base = data.with_file_name(format!("{}.bak.{}", stem, now.format("%Y%m%d%H%M%S")));

    let mut candidate = base.clone();
    let mut attempt = 1;
    while candidate.exists() {
        candidate = PathBuf::from(format!("{}.{}", base.display(), attempt));
        attempt += 1;
    }
    candidate
}

/// Write through a sibling temp file and rename it over `path`.
fn write_atomically(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let mut file = File::create(&tmp).map_err(|e| StorageError::io(&tmp, e))?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| StorageError::io(&tmp, e))?;
    drop(file);

    fs::rename(&tmp, path).map_err(|e| StorageError::io(path, e))
}

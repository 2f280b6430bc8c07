use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};

/// How often a contended lock is retried while waiting.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Exclusive advisory lock on a session's companion lock file.
///
/// Held for the duration of every read or write of the session file so that
/// cooperating processes sharing a storage root serialize their access. The
/// lock is released when the guard is dropped.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire the lock, waiting at most `timeout`.
    ///
    /// Blocks the calling thread; async callers run this on the blocking pool.
    pub fn acquire(path: &Path, timeout: Duration) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StorageError::io(path, e))?;

        let started = Instant::now();
        let contended = fs2::lock_contended_error().raw_os_error();
        let mut logged_wait = false;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    if logged_wait {
                        debug!(
                            path = %path.display(),
                            waited_ms = started.elapsed().as_millis() as u64,
                            "Acquired session lock"
                        );
                    }
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.raw_os_error() == contended => {
                    let elapsed = started.elapsed();
                    if elapsed >= timeout {
                        warn!(
                            path = %path.display(),
                            timeout_ms = timeout.as_millis() as u64,
                            "Gave up waiting for session lock"
                        );
                        return Err(StorageError::LockTimeout {
                            path: path.to_path_buf(),
                            timeout_ms: timeout.as_millis() as u64,
                        });
                    }
                    if !logged_wait {
                        debug!(path = %path.display(), "Session lock held elsewhere, waiting");
                        logged_wait = true;
                    }
                    thread::sleep(LOCK_POLL_INTERVAL.min(timeout - elapsed));
                }
                Err(e) => return Err(StorageError::io(path, e)),
            }
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "Failed to release session lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_creates_lock_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("s.lock");

        let lock = FileLock::acquire(&path, Duration::from_millis(100)).unwrap();
        assert!(path.exists());
        assert_eq!(lock.path(), path.as_path());
    }

    #[test]
    fn test_second_holder_times_out() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.lock");

        let _held = FileLock::acquire(&path, Duration::from_millis(100)).unwrap();
        let started = Instant::now();
        let err = FileLock::acquire(&path, Duration::from_millis(60)).unwrap_err();

        assert!(matches!(err, StorageError::LockTimeout { timeout_ms: 60, .. }));
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.lock");

        drop(FileLock::acquire(&path, Duration::from_millis(100)).unwrap());
        assert!(FileLock::acquire(&path, Duration::from_millis(100)).is_ok());
    }

    #[test]
    fn test_waiter_acquires_after_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.lock");

        let held = FileLock::acquire(&path, Duration::from_millis(100)).unwrap();
        let waiter_path = path.clone();
        let waiter =
            thread::spawn(move || FileLock::acquire(&waiter_path, Duration::from_secs(5)).is_ok());

        thread::sleep(Duration::from_millis(50));
        drop(held);
        assert!(waiter.join().unwrap());
    }
}

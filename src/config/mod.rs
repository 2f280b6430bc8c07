use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

/// Directory under the home directory used when `STORAGE_DIR` is unset.
pub const DEFAULT_STORAGE_DIR_NAME: &str = ".mcp_sequential_thinking";

/// Session name used when `SESSION_NAME` is unset.
pub const DEFAULT_SESSION_NAME: &str = "current_session";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Session storage settings.
    pub storage: StorageConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Analyzer settings.
    pub analysis: AnalysisConfig,
}

/// Session storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding session files.
    pub dir: PathBuf,
    /// Session file stem.
    pub session_name: String,
    /// Longest wait for the file lock, in milliseconds.
    pub lock_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    /// Human-readable lines.
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Analyzer tuning
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Related thoughts returned per analysis.
    pub max_related: usize,
}

/// Resolved on-disk locations for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    /// The JSON session file.
    pub data: PathBuf,
    /// Companion file used only to hold the advisory lock.
    pub lock: PathBuf,
}

impl SessionPaths {
    /// Paths for `<dir>/<name>.json` and `<dir>/<name>.lock`.
    pub fn new(dir: impl Into<PathBuf>, name: &str) -> Self {
        let dir = dir.into();
        Self {
            data: dir.join(format!("{}.json", name)),
            lock: dir.join(format!("{}.lock", name)),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let storage = StorageConfig {
            dir: match env::var("STORAGE_DIR") {
                Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
                _ => default_storage_dir()?,
            },
            session_name: env::var("SESSION_NAME")
                .unwrap_or_else(|_| DEFAULT_SESSION_NAME.to_string()),
            lock_timeout_ms: env::var("LOCK_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10_000),
        };
        storage.validate()?;

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let analysis = AnalysisConfig {
            max_related: env::var("RELATED_MAX_RESULTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
        };

        Ok(Config {
            storage,
            logging,
            analysis,
        })
    }
}

impl StorageConfig {
    /// Storage rooted at `dir` with default session name and lock timeout.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            session_name: DEFAULT_SESSION_NAME.to_string(),
            lock_timeout_ms: 10_000,
        }
    }

    /// Reject session names that would escape the storage directory.
    pub fn validate(&self) -> Result<(), AppError> {
        let name = self.session_name.trim();
        if name.is_empty() {
            return Err(AppError::Config {
                message: "SESSION_NAME cannot be empty".to_string(),
            });
        }
        if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
            return Err(AppError::Config {
                message: format!("SESSION_NAME must be a plain file name, got '{}'", name),
            });
        }
        Ok(())
    }

    /// Resolve the data and lock paths for the configured session.
    pub fn session_paths(&self) -> SessionPaths {
        SessionPaths::new(&self.dir, self.session_name.trim())
    }

    /// Bounded wait for the cross-process lock.
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self { max_related: 3 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

fn default_storage_dir() -> Result<PathBuf, AppError> {
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_STORAGE_DIR_NAME))
        .ok_or_else(|| AppError::Config {
            message: "STORAGE_DIR is unset and no home directory could be determined"
                .to_string(),
        })
}

// # File State Store
//
// File-based implementation of StateStore with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: new document written to a temporary file, then renamed
// - Corruption detection: JSON validated on load
// - Automatic backup: keeps .backup of the last known good document
// - Recovery: falls back to the backup if corruption is detected, and to an
//   empty state if both copies are unreadable; corruption is never fatal
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "state": {
//     "sources": {
//       "arena": {
//         "models": { "gpt-x": { "name": "GPT X" } },
//         "waitlist": { "old-model": "2025-06-01T12:00:00Z" }
//       }
//     },
//     "subscribers": [123456789]
//   }
// }
// ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::Error;
use crate::model::WatcherState;
use crate::traits::StateStore;

/// State file format version, for future migration if the format changes
const STATE_FILE_VERSION: &str = "1.0";

/// Serializable state file envelope
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    #[serde(default)]
    state: WatcherState,
}

/// File-based state store with crash recovery
///
/// The store is stateless between calls: `load` reads the document fresh and
/// `save` replaces it atomically. Write serialization is the engine's job.
///
/// # Example
///
/// ```rust,no_run
/// use modelwatch_core::state::FileStateStore;
/// use modelwatch_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::new("/var/lib/modelwatch/state.json").await?;
///     let mut state = store.load().await?;
///     state.subscribers.insert(42);
///     store.save(&state).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    /// Create a file state store, creating parent directories if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create state directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        Ok(Self { path })
    }

    /// Load the document from one file
    async fn load_document(path: &Path) -> Result<WatcherState, Error> {
        if !path.exists() {
            tracing::debug!("State file does not exist: {}", path.display());
            return Ok(WatcherState::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to read state file {}: {}",
                path.display(),
                e
            ))
        })?;

        let envelope: StateFileFormat = serde_json::from_str(&content).map_err(|e| {
            Error::state_store(format!(
                "Failed to parse state file {}: {}",
                path.display(),
                e
            ))
        })?;

        if envelope.version != STATE_FILE_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. Loading anyway.",
                STATE_FILE_VERSION,
                envelope.version
            );
        }

        Ok(envelope.state)
    }

    /// Load with automatic recovery: main file, then backup, then empty
    async fn load_with_recovery(&self) -> WatcherState {
        match Self::load_document(&self.path).await {
            Ok(state) => {
                tracing::debug!(
                    "Loaded state: {} source(s), {} subscriber(s)",
                    state.sources.len(),
                    state.subscribers.len()
                );
                return state;
            }
            Err(e) => {
                tracing::warn!(
                    "State file unreadable: {}. Attempting recovery from backup.",
                    e
                );
            }
        }

        let backup_path = Self::backup_path(&self.path);
        if backup_path.exists() {
            match Self::load_document(&backup_path).await {
                Ok(state) => {
                    tracing::info!(
                        "Recovered state from backup: {} source(s)",
                        state.sources.len()
                    );
                    return state;
                }
                Err(e) => {
                    tracing::error!("Backup also unreadable: {}. Starting with empty state.", e);
                }
            }
        } else {
            tracing::warn!("No backup file found. Starting with empty state.");
        }

        WatcherState::new()
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<WatcherState, Error> {
        Ok(self.load_with_recovery().await)
    }

    async fn save(&self, state: &WatcherState) -> Result<(), Error> {
        let envelope = StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            state: state.clone(),
        };

        let json = serde_json::to_string_pretty(&envelope)
            .map_err(|e| Error::state_store(format!("Failed to serialize state: {}", e)))?;

        // Write to temporary file first.
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        // Keep a backup of the current document, if any.
        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        // Atomic rename (temp -> actual).
        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("State written to file: {}", self.path.display());
        Ok(())
    }
}

//! Durable JSON persistence of the task set with self-healing on corruption
//!
//! The store never serves partially-trusted configuration: a file that is
//! unreadable, empty, malformed or mostly invalid is treated as absent.
//!
//! | File state                       | Outcome                                  |
//! |----------------------------------|------------------------------------------|
//! | missing                          | empty set                                |
//! | unreadable / empty               | file deleted, empty set                  |
//! | malformed JSON                   | backed up, deleted, empty set            |
//! | all entries invalid              | file deleted, empty set                  |
//! | more than half entries invalid   | file deleted, empty set                  |
//! | some entries invalid             | valid subset kept and re-saved           |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::error::MonitoringResult;
use crate::model::MonitoringTask;

/// Share of invalid entries above which the whole file is discarded
pub const MAX_INVALID_RATIO: f64 = 0.5;

/// Share of valid entries below which `validate_and_clean` removes the file
pub const MIN_VALID_RATIO: f64 = 0.5;

/// Infix of the backup written for a config file with JSON syntax errors
pub const CORRUPTED_BACKUP_INFIX: &str = ".corrupted.";

/// Suffix of the sibling file a save is staged in before the rename
pub const STAGING_SUFFIX: &str = ".tmp";

/// Snapshot persistence for the full task set
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    save_lock: Arc<Mutex<()>>,
}

/// Result of checking each raw entry of a parsed config file
struct Classified {
    valid: Vec<MonitoringTask>,
    invalid: usize,
    total: usize,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            save_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = path.into();
    }

    /// Load every valid task, healing the file along the way
    ///
    /// Never fails: every corruption case resolves to an empty set.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn load_all(&self) -> Vec<MonitoringTask> {
        if !self.path.exists() {
            return Vec::new();
        }

        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) => {
                error!("failed to read config file, removing it: {e}");
                self.remove_file("unreadable");
                return Vec::new();
            }
        };

        if String::from_utf8_lossy(&data).trim().is_empty() {
            warn!("config file is empty, removing it");
            self.remove_file("empty");
            return Vec::new();
        }

        let entries: Vec<serde_json::Value> = match serde_json::from_slice(&data) {
            Ok(entries) => entries,
            Err(e) => {
                error!("config file contains invalid JSON, removing it: {e}");
                self.backup_corrupted(&data);
                self.remove_file("corrupted");
                return Vec::new();
            }
        };

        let Classified {
            valid,
            invalid,
            total,
        } = classify(entries);

        if valid.is_empty() {
            warn!(total, invalid, "no valid tasks found in config, removing file");
            self.remove_file("invalid");
            return Vec::new();
        }

        if invalid > 0 && invalid as f64 / total as f64 > MAX_INVALID_RATIO {
            error!(
                total,
                invalid,
                valid = valid.len(),
                "more than half of the tasks are invalid, removing config file"
            );
            self.remove_file("mostly invalid");
            return Vec::new();
        }

        if invalid > 0 {
            info!(
                original = total,
                valid = valid.len(),
                removed = invalid,
                "removed invalid tasks, saving cleaned config"
            );
            if let Err(e) = self.save_all(&valid) {
                error!("failed to save cleaned config: {e}");
            }
        }

        valid
    }

    /// Replace the file with the given tasks as 2-space indented JSON
    ///
    /// The JSON is staged in a sibling file and renamed over the original, so
    /// a crash mid-save leaves either the old or the new file, never a torn one.
    pub fn save_all(&self, tasks: &[MonitoringTask]) -> MonitoringResult<()> {
        let data = serde_json::to_string_pretty(tasks)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let staging = self.staging_path();
        std::fs::write(&staging, data)?;
        std::fs::rename(&staging, &self.path)?;
        Ok(())
    }

    /// [`save_all`](Self::save_all) off the async executor
    ///
    /// Concurrent saves through clones of this store are applied one at a time.
    pub async fn persist(&self, tasks: Vec<MonitoringTask>) -> MonitoringResult<()> {
        let _guard = self.save_lock.lock().await;

        let store = self.clone();
        tokio::task::spawn_blocking(move || store.save_all(&tasks))
            .await
            .map_err(std::io::Error::other)?
    }

    /// Check the file in place and remove it if it cannot be trusted
    ///
    /// Unlike [`load_all`](Self::load_all) this does not rewrite the file and
    /// does not back up malformed content.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn validate_and_clean(&self) -> MonitoringResult<()> {
        if !self.path.exists() {
            info!("config file does not exist, nothing to validate");
            return Ok(());
        }

        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) => {
                error!("cannot read config file, removing it: {e}");
                std::fs::remove_file(&self.path)?;
                return Ok(());
            }
        };

        if String::from_utf8_lossy(&data).trim().is_empty() {
            warn!("config file is empty, removing it");
            std::fs::remove_file(&self.path)?;
            return Ok(());
        }

        let entries: Vec<serde_json::Value> = match serde_json::from_slice(&data) {
            Ok(entries) => entries,
            Err(e) => {
                error!("config file contains invalid JSON, removing it: {e}");
                std::fs::remove_file(&self.path)?;
                return Ok(());
            }
        };

        let Classified { valid, total, .. } = classify(entries);

        if valid.is_empty() || (valid.len() as f64 / total as f64) < MIN_VALID_RATIO {
            error!(
                total,
                valid = valid.len(),
                "config file contains mostly invalid data, removing it"
            );
            std::fs::remove_file(&self.path)?;
            return Ok(());
        }

        info!(total, valid = valid.len(), "config file validation passed");
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut staging = self.path.clone().into_os_string();
        staging.push(STAGING_SUFFIX);
        PathBuf::from(staging)
    }

    fn backup_corrupted(&self, data: &[u8]) {
        let mut backup = self.path.clone().into_os_string();
        backup.push(CORRUPTED_BACKUP_INFIX);
        backup.push(Local::now().format("%Y%m%d-%H%M%S").to_string());

        if let Err(e) = std::fs::write(&backup, data) {
            warn!("failed to back up corrupted config file: {e}");
        }
    }

    fn remove_file(&self, reason: &str) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            error!("failed to remove {reason} config file: {e}");
        }
    }
}

fn classify(entries: Vec<serde_json::Value>) -> Classified {
    let total = entries.len();
    let mut valid = Vec::with_capacity(total);
    let mut invalid = 0;

    for entry in entries {
        match serde_json::from_value::<MonitoringTask>(entry.clone()) {
            Ok(task) if task.is_valid() => valid.push(task),
            _ => {
                invalid += 1;
                let field = |name: &str| {
                    entry
                        .get(name)
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown")
                        .to_string()
                };
                warn!(serial = %field("serial"), host = %field("host"), "found invalid task, skipping");
            }
        }
    }

    Classified {
        valid,
        invalid,
        total,
    }
}

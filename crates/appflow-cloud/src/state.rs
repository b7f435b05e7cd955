//! State persistence
//!
//! Manages the `.appflow/state.json` file, which keeps the last run of a
//! project and the records pinned by `retainAll` teardowns.

use crate::error::{CloudError, Result};
use crate::executor::RunResult;
use crate::registry::ResourceRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".appflow";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "lock.json";

/// Persistent store for runs and pins
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Replace the stored run
    async fn record_run(&self, run: &RunResult) -> Result<()>;

    /// The stored run, if any
    async fn last_run(&self) -> Result<Option<RunResult>>;

    /// Keys of pinned records
    async fn pinned(&self) -> Result<BTreeSet<String>>;

    /// Protect records from future teardowns
    async fn pin(&self, records: &[ResourceRecord]) -> Result<()>;

    /// Stop tracking records (deleted or orphaned)
    async fn forget(&self, keys: &[String]) -> Result<()>;
}

/// Contents of `state.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<RunResult>,

    /// Pinned records indexed by `type:effective_name`
    #[serde(default)]
    pub pinned: BTreeMap<String, PinnedResource>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            last_run: None,
            pinned: BTreeMap::new(),
        }
    }
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_last_run(&mut self, run: RunResult) {
        self.last_run = Some(run);
        self.updated_at = Utc::now();
    }

    pub fn pin(&mut self, record: &ResourceRecord) {
        self.pinned.insert(
            record.key(),
            PinnedResource {
                type_tag: record.type_tag.clone(),
                effective_name: record.effective_name.clone(),
                provider: record.provider.clone(),
                pinned_at: Utc::now(),
            },
        );
        self.updated_at = Utc::now();
    }

    pub fn is_pinned(&self, key: &str) -> bool {
        self.pinned.contains_key(key)
    }

    /// Drop records from the last run and from the pin list
    ///
    /// Returns how many entries were removed.
    pub fn forget(&mut self, keys: &[String]) -> usize {
        let mut removed = 0;
        if let Some(run) = self.last_run.as_mut() {
            let before = run.resources.len();
            run.resources.retain(|r| !keys.contains(&r.key()));
            removed += before - run.resources.len();
        }
        for key in keys {
            if self.pinned.remove(key).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            self.updated_at = Utc::now();
        }
        removed
    }
}

/// A record protected from teardown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedResource {
    pub type_tag: String,
    pub effective_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub pinned_at: DateTime<Utc>,
}

/// State manager for reading/writing state files
pub struct StateManager {
    /// Project root directory
    project_root: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    /// Get the state file path
    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the current state
    pub async fn load(&self) -> Result<GlobalState> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(GlobalState::new());
        }

        let content = fs::read_to_string(&path).await?;
        let state: GlobalState = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!(
            resources = state.last_run.as_ref().map_or(0, |r| r.resources.len()),
            pinned = state.pinned.len(),
            "Loaded state"
        );
        Ok(state)
    }

    /// Save the state, keeping the previous file as a backup
    pub async fn save(&self, state: &GlobalState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let backup = self.backup_path();

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Created state backup");
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content).await?;

        tracing::debug!(pinned = state.pinned.len(), "Saved state");
        Ok(())
    }

    /// Load, modify and save under the state lock
    async fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut GlobalState) + Send,
    {
        let lock = self.acquire_lock().await?;
        let mut state = self.load().await?;
        f(&mut state);
        self.save(&state).await?;
        lock.release().await
    }

    /// Acquire a lock for exclusive access
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            // Locks older than an hour are considered stale
            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(CloudError::LockError(format!(
                    "State is locked by {} since {}",
                    lock_info.holder, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[async_trait]
impl StateStore for StateManager {
    async fn record_run(&self, run: &RunResult) -> Result<()> {
        let run = run.clone();
        self.update(move |state| state.set_last_run(run)).await
    }

    async fn last_run(&self) -> Result<Option<RunResult>> {
        Ok(self.load().await?.last_run)
    }

    async fn pinned(&self) -> Result<BTreeSet<String>> {
        Ok(self.load().await?.pinned.into_keys().collect())
    }

    async fn pin(&self, records: &[ResourceRecord]) -> Result<()> {
        self.update(|state| {
            for record in records {
                state.pin(record);
            }
        })
        .await
    }

    async fn forget(&self, keys: &[String]) -> Result<()> {
        self.update(|state| {
            state.forget(keys);
        })
        .await
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released state lock");
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::RunStatus;
    use crate::registry::Properties;
    use tempfile::tempdir;

    fn record(name: &str, ordinal: u64) -> ResourceRecord {
        ResourceRecord {
            logical_name: name.to_string(),
            type_tag: "queue".to_string(),
            name_prefix: None,
            effective_name: name.to_string(),
            provider: Some("aws".to_string()),
            ordinal,
            properties: Properties::new(),
            outputs: Properties::new(),
        }
    }

    fn run(resources: Vec<ResourceRecord>) -> RunResult {
        RunResult {
            descriptor: None,
            resources,
            status: RunStatus::Success,
            errors: Vec::new(),
            duration_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_state_save_load() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        manager
            .record_run(&run(vec![record("a", 1), record("b", 2)]))
            .await
            .unwrap();

        let loaded = manager.last_run().await.unwrap().unwrap();
        assert_eq!(loaded.resources.len(), 2);
        assert!(manager.state_path().exists());
        // the lock is released after every update
        assert!(!temp_dir.path().join(".appflow/lock.json").exists());
    }

    #[tokio::test]
    async fn test_empty_state() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        assert!(manager.last_run().await.unwrap().is_none());
        assert!(manager.pinned().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pin_and_forget() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        manager
            .record_run(&run(vec![record("a", 1), record("b", 2)]))
            .await
            .unwrap();

        manager.pin(&[record("a", 1)]).await.unwrap();
        let pinned = manager.pinned().await.unwrap();
        assert!(pinned.contains("queue:a"));

        manager.forget(&["queue:a".to_string()]).await.unwrap();
        let state = manager.load().await.unwrap();
        assert!(!state.is_pinned("queue:a"));
        let names: Vec<_> = state
            .last_run
            .unwrap()
            .resources
            .iter()
            .map(|r| r.effective_name.clone())
            .collect();
        assert_eq!(names, vec!["b"]);
    }

    #[tokio::test]
    async fn test_backup_is_written() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        manager.save(&GlobalState::new()).await.unwrap();
        manager.save(&GlobalState::new()).await.unwrap();

        assert!(temp_dir.path().join(".appflow/state.json.backup").exists());
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());

        let lock = manager.acquire_lock().await.unwrap();
        assert!(matches!(
            manager.acquire_lock().await,
            Err(CloudError::LockError(_))
        ));
        lock.release().await.unwrap();
        assert!(manager.acquire_lock().await.is_ok());
    }

    #[tokio::test]
    async fn test_newer_version_rejected() {
        let temp_dir = tempdir().unwrap();
        let manager = StateManager::new(temp_dir.path());
        let mut state = GlobalState::new();
        state.version = STATE_VERSION + 1;
        manager.save(&state).await.unwrap();

        assert!(matches!(
            manager.load().await,
            Err(CloudError::StateError(_))
        ));
    }
}

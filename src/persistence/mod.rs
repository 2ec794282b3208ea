//! Persistence layer for run state between invocations

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteStateStore;

use crate::core::{BatchProgress, PipelineState, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Who last wrote a pipeline's state, and when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMetadata {
    pub owner: String,
    pub updated_at: DateTime<Utc>,
}

/// Trait for state store backends.
///
/// Holds at most one `PipelineState`, one `BatchProgress` and one run data
/// object per pipeline ID. Every method is keyed by pipeline ID so that
/// unrelated pipelines never interfere.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Whether a state is stored for the pipeline
    async fn is_persisted(&self, pipeline_id: &str) -> Result<bool, StorageError>;

    /// Load the stored state, if any
    async fn get_state(&self, pipeline_id: &str) -> Result<Option<PipelineState>, StorageError>;

    /// Store the state, recording `owner` in its metadata
    async fn set_state(&self, state: &PipelineState, owner: &str) -> Result<(), StorageError>;

    /// Load the stored batch progress, or a fresh one if none is stored
    async fn get_batch_progress(&self, pipeline_id: &str) -> Result<BatchProgress, StorageError>;

    async fn set_batch_progress(
        &self,
        pipeline_id: &str,
        progress: &BatchProgress,
    ) -> Result<(), StorageError>;

    /// Delete only the batch progress
    async fn reset_batch_progress(&self, pipeline_id: &str) -> Result<(), StorageError>;

    /// Load the run data, or an empty object if none is stored
    async fn get_run_data(&self, pipeline_id: &str) -> Result<Map<String, Value>, StorageError>;

    async fn set_run_data(
        &self,
        pipeline_id: &str,
        data: &Map<String, Value>,
    ) -> Result<(), StorageError>;

    /// Delete state, batch progress and run data. Deleting nothing is fine.
    async fn reset(&self, pipeline_id: &str) -> Result<(), StorageError>;

    /// Metadata of the stored state, if any
    async fn state_metadata(&self, pipeline_id: &str)
        -> Result<Option<StateMetadata>, StorageError>;

    /// Take the pipeline's lock for `owner`. Fails with
    /// `StorageError::Locked` while another owner holds a lock that has not
    /// expired yet; the same owner may re-acquire.
    async fn acquire_lock(&self, pipeline_id: &str, owner: &str) -> Result<(), StorageError>;

    /// Release the lock if `owner` holds it
    async fn release_lock(&self, pipeline_id: &str, owner: &str) -> Result<(), StorageError>;
}

/// Default age after which a lock is considered abandoned
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Default)]
struct Entry {
    state: Option<(PipelineState, StateMetadata)>,
    // Kept serialized so reads behave like a real reload
    batch_progress: Option<String>,
    run_data: Option<Map<String, Value>>,
}

/// In-memory state store (for testing or ephemeral use)
pub struct InMemoryStateStore {
    entries: RwLock<HashMap<String, Entry>>,
    locks: RwLock<HashMap<String, (String, DateTime<Utc>)>>,
    lock_timeout: Duration,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            locks: RwLock::new(HashMap::new()),
            lock_timeout: Duration::seconds(DEFAULT_LOCK_TIMEOUT_SECS as i64),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.lock_timeout = Duration::from_std(timeout).unwrap_or(self.lock_timeout);
        self
    }

    /// Whether anything at all is stored for the pipeline
    pub async fn has_entry(&self, pipeline_id: &str) -> bool {
        self.entries.read().await.contains_key(pipeline_id)
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn is_persisted(&self, pipeline_id: &str) -> Result<bool, StorageError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(pipeline_id)
            .is_some_and(|entry| entry.state.is_some()))
    }

    async fn get_state(&self, pipeline_id: &str) -> Result<Option<PipelineState>, StorageError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(pipeline_id)
            .and_then(|entry| entry.state.as_ref())
            .map(|(state, _)| state.clone()))
    }

    async fn set_state(&self, state: &PipelineState, owner: &str) -> Result<(), StorageError> {
        let metadata = StateMetadata {
            owner: owner.to_string(),
            updated_at: Utc::now(),
        };
        let mut entries = self.entries.write().await;
        entries
            .entry(state.pipeline_id().to_string())
            .or_default()
            .state = Some((state.clone(), metadata));
        Ok(())
    }

    async fn get_batch_progress(&self, pipeline_id: &str) -> Result<BatchProgress, StorageError> {
        let entries = self.entries.read().await;
        match entries
            .get(pipeline_id)
            .and_then(|entry| entry.batch_progress.as_ref())
        {
            Some(stored) => Ok(serde_json::from_str(stored)?),
            None => Ok(BatchProgress::new()),
        }
    }

    async fn set_batch_progress(
        &self,
        pipeline_id: &str,
        progress: &BatchProgress,
    ) -> Result<(), StorageError> {
        let stored = serde_json::to_string(progress)?;
        let mut entries = self.entries.write().await;
        entries
            .entry(pipeline_id.to_string())
            .or_default()
            .batch_progress = Some(stored);
        Ok(())
    }

    async fn reset_batch_progress(&self, pipeline_id: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(pipeline_id) {
            entry.batch_progress = None;
        }
        Ok(())
    }

    async fn get_run_data(&self, pipeline_id: &str) -> Result<Map<String, Value>, StorageError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(pipeline_id)
            .and_then(|entry| entry.run_data.clone())
            .unwrap_or_default())
    }

    async fn set_run_data(
        &self,
        pipeline_id: &str,
        data: &Map<String, Value>,
    ) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        entries.entry(pipeline_id.to_string()).or_default().run_data = Some(data.clone());
        Ok(())
    }

    async fn reset(&self, pipeline_id: &str) -> Result<(), StorageError> {
        self.entries.write().await.remove(pipeline_id);
        Ok(())
    }

    async fn state_metadata(
        &self,
        pipeline_id: &str,
    ) -> Result<Option<StateMetadata>, StorageError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(pipeline_id)
            .and_then(|entry| entry.state.as_ref())
            .map(|(_, metadata)| metadata.clone()))
    }

    async fn acquire_lock(&self, pipeline_id: &str, owner: &str) -> Result<(), StorageError> {
        let mut locks = self.locks.write().await;
        let now = Utc::now();
        if let Some((holder, acquired_at)) = locks.get(pipeline_id) {
            if holder != owner && now - *acquired_at < self.lock_timeout {
                return Err(StorageError::Locked {
                    pipeline_id: pipeline_id.to_string(),
                    owner: holder.clone(),
                });
            }
        }
        locks.insert(pipeline_id.to_string(), (owner.to_string(), now));
        Ok(())
    }

    async fn release_lock(&self, pipeline_id: &str, owner: &str) -> Result<(), StorageError> {
        let mut locks = self.locks.write().await;
        if locks
            .get(pipeline_id)
            .is_some_and(|(holder, _)| holder == owner)
        {
            locks.remove(pipeline_id);
        }
        Ok(())
    }
}

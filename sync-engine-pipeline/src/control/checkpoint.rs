//! Persisted progress of a bulk migration run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use sync_engine_repository::DurableMedium;
use sync_engine_shared::OwnerId;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::checksum::ChecksumVerifier;
use crate::errors::CheckpointError;

const CHECKPOINT_KEY_PREFIX: &str = "sync-engine:migration-checkpoint:v1";

pub fn checkpoint_key(owner: &OwnerId) -> String {
    format!("{}:{}", CHECKPOINT_KEY_PREFIX, owner)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub run_id: Uuid,
    pub owner_id: String,
    pub processed_count: usize,
    pub total_count: usize,
    pub last_completed_index: Option<usize>,
    pub paused_at: Option<DateTime<Utc>>,
    /// SHA-256 over every other field.
    pub integrity_digest: String,
}

/// The digested part of a checkpoint. Field order is the serialization order.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckpointBody<'a> {
    run_id: &'a Uuid,
    owner_id: &'a str,
    processed_count: usize,
    total_count: usize,
    last_completed_index: Option<usize>,
    paused_at: Option<&'a DateTime<Utc>>,
}

impl Checkpoint {
    /// Build a checkpoint for `processed` of `total` items and seal it.
    pub fn seal(
        run_id: Uuid,
        owner: &OwnerId,
        processed: usize,
        total: usize,
        paused_at: Option<DateTime<Utc>>,
    ) -> Result<Self, CheckpointError> {
        let mut checkpoint = Self {
            run_id,
            owner_id: owner.to_string(),
            processed_count: processed,
            total_count: total,
            last_completed_index: processed.checked_sub(1),
            paused_at,
            integrity_digest: String::new(),
        };
        checkpoint.integrity_digest = checkpoint.compute_digest()?;
        Ok(checkpoint)
    }

    fn body(&self) -> CheckpointBody<'_> {
        CheckpointBody {
            run_id: &self.run_id,
            owner_id: &self.owner_id,
            processed_count: self.processed_count,
            total_count: self.total_count,
            last_completed_index: self.last_completed_index,
            paused_at: self.paused_at.as_ref(),
        }
    }

    fn compute_digest(&self) -> Result<String, CheckpointError> {
        Ok(ChecksumVerifier::digest_json(&self.body())?)
    }

    /// The digest matches and the counters agree with each other.
    pub fn is_intact(&self) -> bool {
        let digest_ok =
            ChecksumVerifier::verify_json(&self.body(), &self.integrity_digest).unwrap_or(false);
        digest_ok
            && self.processed_count <= self.total_count
            && self.next_index() == self.processed_count
    }

    /// Index of the first item not yet written.
    pub fn next_index(&self) -> usize {
        self.last_completed_index.map(|i| i + 1).unwrap_or(0)
    }
}

/// Reads and writes the checkpoint of one owner.
///
/// Writes are compare-and-swap against the value this store last wrote or
/// loaded, so a checkpoint changed by anyone else is never silently
/// overwritten.
pub struct CheckpointStore {
    medium: Arc<dyn DurableMedium>,
    owner: OwnerId,
    key: String,
    last_raw: Mutex<Option<String>>,
}

impl CheckpointStore {
    pub fn new(medium: Arc<dyn DurableMedium>, owner: OwnerId) -> Self {
        Self {
            key: checkpoint_key(&owner),
            medium,
            owner,
            last_raw: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn remember(&self, raw: Option<String>) {
        if let Ok(mut last) = self.last_raw.lock() {
            *last = raw;
        }
    }

    fn remembered(&self) -> Option<String> {
        self.last_raw.lock().ok().and_then(|last| last.clone())
    }

    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let raw = serde_json::to_string(checkpoint)?;
        let expected = self.remembered();
        let swapped = self
            .medium
            .compare_and_swap(&self.key, expected.as_deref(), Some(&raw))
            .await?;
        if !swapped {
            return Err(CheckpointError::corrupt(
                "checkpoint was modified outside this run",
            ));
        }
        debug!(
            key = %self.key,
            processed = checkpoint.processed_count,
            total = checkpoint.total_count,
            "Checkpoint saved"
        );
        self.remember(Some(raw));
        Ok(())
    }

    /// The stored checkpoint, or `None` when absent or unparseable.
    pub async fn load(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        let Some(raw) = self.medium.get(&self.key).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<Checkpoint>(&raw) {
            Ok(checkpoint) => Ok(Some(checkpoint)),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Ignoring unparseable checkpoint");
                Ok(None)
            }
        }
    }

    /// Load the checkpoint of `run_id` and fail closed on anything suspicious.
    pub async fn load_verified(&self, run_id: Uuid) -> Result<Checkpoint, CheckpointError> {
        let raw = self
            .medium
            .get(&self.key)
            .await?
            .ok_or_else(|| CheckpointError::corrupt("no checkpoint stored"))?;
        let checkpoint: Checkpoint = serde_json::from_str(&raw)
            .map_err(|e| CheckpointError::corrupt(format!("unreadable checkpoint: {}", e)))?;

        if !checkpoint.is_intact() {
            return Err(CheckpointError::corrupt("integrity digest mismatch"));
        }
        if checkpoint.run_id != run_id {
            return Err(CheckpointError::corrupt(format!(
                "checkpoint belongs to run {}",
                checkpoint.run_id
            )));
        }
        if checkpoint.owner_id != self.owner.as_str() {
            return Err(CheckpointError::corrupt("checkpoint belongs to another owner"));
        }

        self.remember(Some(raw));
        Ok(checkpoint)
    }

    /// Remove whatever checkpoint is stored, including one left by an
    /// earlier run.
    pub async fn clear(&self) -> Result<(), CheckpointError> {
        self.medium.delete(&self.key).await?;
        self.remember(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_engine_repository::MemoryMedium;

    fn owner() -> OwnerId {
        OwnerId::parse("owner-1").unwrap()
    }

    #[test]
    fn test_sealed_checkpoint_is_intact() {
        let checkpoint = Checkpoint::seal(Uuid::new_v4(), &owner(), 20, 45, None).unwrap();
        assert!(checkpoint.is_intact());
        assert_eq!(checkpoint.last_completed_index, Some(19));
        assert_eq!(checkpoint.next_index(), 20);
    }

    #[test]
    fn test_edited_counter_breaks_integrity() {
        let mut checkpoint = Checkpoint::seal(Uuid::new_v4(), &owner(), 20, 45, None).unwrap();
        checkpoint.processed_count = 30;
        checkpoint.last_completed_index = Some(29);
        assert!(!checkpoint.is_intact());
    }

    #[test]
    fn test_empty_run_has_no_completed_index() {
        let checkpoint = Checkpoint::seal(Uuid::new_v4(), &owner(), 0, 3, None).unwrap();
        assert_eq!(checkpoint.last_completed_index, None);
        assert_eq!(checkpoint.next_index(), 0);
        assert!(checkpoint.is_intact());
    }

    #[tokio::test]
    async fn test_save_then_load_verified() {
        let medium = Arc::new(MemoryMedium::new());
        let store = CheckpointStore::new(medium.clone(), owner());
        let run_id = Uuid::new_v4();

        store
            .save(&Checkpoint::seal(run_id, &owner(), 10, 30, None).unwrap())
            .await
            .unwrap();
        store
            .save(&Checkpoint::seal(run_id, &owner(), 20, 30, Some(Utc::now())).unwrap())
            .await
            .unwrap();

        let loaded = store.load_verified(run_id).await.unwrap();
        assert_eq!(loaded.processed_count, 20);
        assert!(loaded.paused_at.is_some());
    }

    #[tokio::test]
    async fn test_tampered_value_fails_closed() {
        let medium = Arc::new(MemoryMedium::new());
        let store = CheckpointStore::new(medium.clone(), owner());
        let run_id = Uuid::new_v4();
        store
            .save(&Checkpoint::seal(run_id, &owner(), 10, 30, None).unwrap())
            .await
            .unwrap();

        let raw = medium.get(store.key()).await.unwrap().unwrap();
        let tampered = raw.replace("\"processedCount\":10", "\"processedCount\":25");
        medium.put(store.key(), &tampered).await.unwrap();

        let err = store.load_verified(run_id).await.unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_other_run_and_missing_fail_closed() {
        let medium = Arc::new(MemoryMedium::new());
        let store = CheckpointStore::new(medium.clone(), owner());

        assert!(matches!(
            store.load_verified(Uuid::new_v4()).await,
            Err(CheckpointError::Corrupt(_))
        ));

        store
            .save(&Checkpoint::seal(Uuid::new_v4(), &owner(), 1, 2, None).unwrap())
            .await
            .unwrap();
        assert!(matches!(
            store.load_verified(Uuid::new_v4()).await,
            Err(CheckpointError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_save_refuses_to_overwrite_foreign_write() {
        let medium = Arc::new(MemoryMedium::new());
        let store = CheckpointStore::new(medium.clone(), owner());
        let run_id = Uuid::new_v4();
        store
            .save(&Checkpoint::seal(run_id, &owner(), 1, 5, None).unwrap())
            .await
            .unwrap();

        medium.put(store.key(), "{}").await.unwrap();

        let err = store
            .save(&Checkpoint::seal(run_id, &owner(), 2, 5, None).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_unparseable_checkpoint_loads_as_absent() {
        let medium = Arc::new(MemoryMedium::new());
        let store = CheckpointStore::new(medium.clone(), owner());
        medium.put(store.key(), "not json").await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }
}

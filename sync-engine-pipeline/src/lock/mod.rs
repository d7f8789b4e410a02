//! Cross-session mutual exclusion over a durable medium.
//!
//! The lock is a single JSON record under
//! `sync-engine:migration-lock:v1:{owner}`. Every state change (claim,
//! heartbeat, release) is a compare-and-swap against the exact value that was
//! read, so two sessions racing for the record cannot both win.

mod handle;
mod record;

pub use handle::LockHandle;
pub use record::LockRecord;

use chrono::Duration as ChronoDuration;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use sync_engine_repository::DurableMedium;
use sync_engine_shared::OwnerId;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::errors::LockError;

const LOCK_KEY_PREFIX: &str = "sync-engine:migration-lock:v1";
const DEFAULT_EXPIRES_AFTER: Duration = Duration::from_secs(30);
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    /// A record whose last heartbeat is older than this may be reclaimed.
    pub expires_after: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            expires_after: DEFAULT_EXPIRES_AFTER,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

impl LockConfig {
    pub fn new(expires_after: Duration, heartbeat_interval: Duration) -> Self {
        Self {
            expires_after,
            heartbeat_interval,
        }
    }
}

pub fn lock_key(owner: &OwnerId) -> String {
    format!("{}:{}", LOCK_KEY_PREFIX, owner)
}

pub struct CrossSessionLock {
    medium: Arc<dyn DurableMedium>,
    clock: Arc<dyn Clock>,
    key: String,
    config: LockConfig,
}

impl CrossSessionLock {
    pub fn new(
        medium: Arc<dyn DurableMedium>,
        clock: Arc<dyn Clock>,
        owner: &OwnerId,
        config: LockConfig,
    ) -> Self {
        Self {
            medium,
            clock,
            key: lock_key(owner),
            config,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Claims the lock with the configured expiry.
    pub async fn acquire(&self) -> Result<LockHandle, LockError> {
        self.acquire_with(self.config.expires_after).await
    }

    /// Non-blocking claim. Fails with [`LockError::Held`] when another
    /// session's record is still fresh.
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn acquire_with(&self, expires_after: Duration) -> Result<LockHandle, LockError> {
        let now = self.clock.now();
        let current_raw = self.medium.get(&self.key).await?;

        if let Some(raw) = &current_raw {
            match LockRecord::parse(raw) {
                Some(existing) if !existing.is_stale(now) => {
                    debug!(holder_since = %existing.acquired_at, "Lock is held by a live session");
                    return Err(LockError::Held {
                        acquired_at: existing.acquired_at,
                    });
                }
                Some(existing) => {
                    warn!(
                        last_heartbeat_at = %existing.last_heartbeat_at,
                        "Reclaiming abandoned lock"
                    );
                }
                None => warn!("Replacing unreadable lock record"),
            }
        }

        let token = Uuid::new_v4().to_string();
        let record = LockRecord::new(token.clone(), now, expires_after);
        let new_raw = serde_json::to_string(&record)?;

        let claimed = self
            .medium
            .compare_and_swap(&self.key, current_raw.as_deref(), Some(&new_raw))
            .await?;
        if !claimed {
            // Someone else won the race between our read and our swap.
            let acquired_at = self
                .medium
                .get(&self.key)
                .await?
                .as_deref()
                .and_then(LockRecord::parse)
                .map(|r| r.acquired_at)
                .unwrap_or(now);
            return Err(LockError::Held { acquired_at });
        }

        info!(token = %token, "Acquired migration lock");

        let lost = Arc::new(AtomicBool::new(false));
        let heartbeat = tokio::spawn(handle::heartbeat_loop(
            self.medium.clone(),
            self.clock.clone(),
            self.key.clone(),
            token.clone(),
            self.config.heartbeat_interval,
            lost.clone(),
        ));

        Ok(LockHandle::new(
            self.medium.clone(),
            self.key.clone(),
            token,
            heartbeat,
            lost,
        ))
    }

    /// Releases `handle`. Releasing a lock that was already reclaimed by
    /// another session leaves that session's record alone.
    pub async fn release(&self, handle: LockHandle) -> Result<(), LockError> {
        handle.release().await
    }

    /// The record currently stored, if it parses.
    pub async fn current(&self) -> Result<Option<LockRecord>, LockError> {
        Ok(self
            .medium
            .get(&self.key)
            .await?
            .as_deref()
            .and_then(LockRecord::parse))
    }

    /// True when a fresh record exists, regardless of who holds it.
    pub async fn is_held(&self) -> Result<bool, LockError> {
        let now = self.clock.now();
        Ok(self
            .current()
            .await?
            .map(|record| !record.is_stale(now))
            .unwrap_or(false))
    }
}

pub(crate) fn to_chrono(duration: Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};
    use sync_engine_repository::MemoryMedium;

    fn setup() -> (Arc<MemoryMedium>, Arc<ManualClock>, CrossSessionLock) {
        let medium = Arc::new(MemoryMedium::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        ));
        let lock = CrossSessionLock::new(
            medium.clone(),
            clock.clone(),
            &OwnerId::parse("u1").unwrap(),
            LockConfig::new(Duration::from_secs(30), Duration::from_secs(5)),
        );
        (medium, clock, lock)
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_acquire_fails_while_fresh() {
        let (_medium, clock, lock) = setup();
        let _first = lock.acquire().await.unwrap();

        clock.advance(ChronoDuration::seconds(10));
        let err = lock.acquire().await.unwrap_err();
        assert!(matches!(err, LockError::Held { .. }));
        assert!(err.to_string().contains("already in progress elsewhere"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_lock_is_reclaimed() {
        let (medium, clock, lock) = setup();
        let first = lock.acquire().await.unwrap();
        // Simulate a suspended session: the heartbeat stops.
        first.stop_heartbeat();

        clock.advance(ChronoDuration::seconds(31));
        let second = lock.acquire().await.unwrap();

        let stored = LockRecord::parse(&medium.get(lock.key()).await.unwrap().unwrap()).unwrap();
        assert_eq!(stored.owner_token, second.token());
        assert_ne!(stored.owner_token, first.token());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_keeps_lock_fresh() {
        let (_medium, clock, lock) = setup();
        let _held = lock.acquire().await.unwrap();

        clock.advance(ChronoDuration::seconds(25));
        tokio::time::sleep(Duration::from_secs(6)).await;
        clock.advance(ChronoDuration::seconds(25));

        // 50s since acquisition but only 25s since the last heartbeat.
        assert!(matches!(
            lock.acquire().await.unwrap_err(),
            LockError::Held { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_allows_immediate_reacquire() {
        let (medium, _clock, lock) = setup();
        let handle = lock.acquire().await.unwrap();

        lock.release(handle).await.unwrap();
        assert!(medium.get(lock.key()).await.unwrap().is_none());

        lock.acquire().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_of_reclaimed_lock_leaves_new_holder() {
        let (medium, clock, lock) = setup();
        let first = lock.acquire().await.unwrap();
        first.stop_heartbeat();
        clock.advance(ChronoDuration::seconds(31));
        let second = lock.acquire().await.unwrap();

        lock.release(first).await.unwrap();

        let stored = LockRecord::parse(&medium.get(lock.key()).await.unwrap().unwrap()).unwrap();
        assert_eq!(stored.owner_token, second.token());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_record_is_treated_as_absent() {
        let (medium, _clock, lock) = setup();
        medium.put(lock.key(), "{not json").await.unwrap();

        lock.acquire().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_releases_in_background() {
        let (medium, _clock, lock) = setup();
        let handle = lock.acquire().await.unwrap();

        drop(handle);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(medium.get(lock.key()).await.unwrap().is_none());
    }
}

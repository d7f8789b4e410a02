use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sync_engine_repository::DurableMedium;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::LockRecord;
use crate::clock::Clock;
use crate::errors::LockError;

/// Proof of holding the cross-session lock.
///
/// Dropping a handle without calling [`LockHandle::release`] stops the
/// heartbeat and schedules a best-effort release on the current runtime.
pub struct LockHandle {
    medium: Arc<dyn DurableMedium>,
    key: String,
    token: String,
    heartbeat: Option<JoinHandle<()>>,
    lost: Arc<AtomicBool>,
    released: bool,
}

impl LockHandle {
    pub(super) fn new(
        medium: Arc<dyn DurableMedium>,
        key: String,
        token: String,
        heartbeat: JoinHandle<()>,
        lost: Arc<AtomicBool>,
    ) -> Self {
        Self {
            medium,
            key,
            token,
            heartbeat: Some(heartbeat),
            lost,
            released: false,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// True once a heartbeat found the record owned by someone else.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    /// Stops refreshing the record without releasing it.
    pub fn stop_heartbeat(&self) {
        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.abort();
        }
    }

    pub async fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        self.stop_heartbeat();
        release_record(self.medium.as_ref(), &self.key, &self.token).await
    }
}

impl std::fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockHandle")
            .field("key", &self.key)
            .field("token", &self.token)
            .field("lost", &self.lost)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.stop_heartbeat();

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(key = %self.key, "Lock handle dropped outside a runtime; record left to expire");
            return;
        };
        let medium = self.medium.clone();
        let key = self.key.clone();
        let token = self.token.clone();
        runtime.spawn(async move {
            if let Err(e) = release_record(medium.as_ref(), &key, &token).await {
                warn!(key = %key, error = %e, "Best-effort lock release failed");
            }
        });
    }
}

/// Delete the record only if it still carries `token`.
async fn release_record(
    medium: &dyn DurableMedium,
    key: &str,
    token: &str,
) -> Result<(), LockError> {
    let Some(raw) = medium.get(key).await? else {
        return Ok(());
    };
    match LockRecord::parse(&raw) {
        Some(record) if record.owner_token == token => {
            if medium.compare_and_swap(key, Some(&raw), None).await? {
                info!(key = %key, "Released migration lock");
            }
        }
        _ => debug!(key = %key, "Lock no longer ours, nothing to release"),
    }
    Ok(())
}

pub(super) async fn heartbeat_loop(
    medium: Arc<dyn DurableMedium>,
    clock: Arc<dyn Clock>,
    key: String,
    token: String,
    interval: Duration,
    lost: Arc<AtomicBool>,
) {
    loop {
        tokio::time::sleep(interval).await;

        let raw = match medium.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                warn!(key = %key, "Lock record disappeared");
                lost.store(true, Ordering::SeqCst);
                return;
            }
            Err(e) => {
                // The next tick may succeed before the record expires.
                warn!(key = %key, error = %e, "Heartbeat read failed");
                continue;
            }
        };

        let Some(record) = LockRecord::parse(&raw).filter(|r| r.owner_token == token) else {
            warn!(key = %key, "Lock was reclaimed by another session");
            lost.store(true, Ordering::SeqCst);
            return;
        };

        let refreshed = match serde_json::to_string(&record.heartbeat(clock.now())) {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!(key = %key, error = %e, "Could not encode heartbeat");
                continue;
            }
        };

        match medium.compare_and_swap(&key, Some(&raw), Some(&refreshed)).await {
            Ok(true) => debug!(key = %key, "Lock heartbeat"),
            Ok(false) => warn!(key = %key, "Heartbeat lost a race, retrying next tick"),
            Err(e) => warn!(key = %key, error = %e, "Heartbeat write failed"),
        }
    }
}

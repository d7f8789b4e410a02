use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub owner_token: String,
    pub acquired_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub expires_after_ms: u64,
}

impl LockRecord {
    pub fn new(owner_token: String, now: DateTime<Utc>, expires_after: Duration) -> Self {
        Self {
            owner_token,
            acquired_at: now,
            last_heartbeat_at: now,
            expires_after_ms: u64::try_from(expires_after.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Unparseable records are treated as absent.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let expires_after = super::to_chrono(Duration::from_millis(self.expires_after_ms));
        now - self.last_heartbeat_at > expires_after
    }

    pub fn heartbeat(&self, now: DateTime<Utc>) -> Self {
        Self {
            last_heartbeat_at: now,
            ..self.clone()
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single warmup plan a user keeps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupPlan {
    pub id: String,
    /// Schema version of the plan document itself.
    #[serde(default = "default_plan_version")]
    pub version: u32,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub sections: Vec<WarmupSection>,
}

fn default_plan_version() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupSection {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
}

impl WarmupPlan {
    /// Stamp the plan the way every save does.
    ///
    /// An edited plan is never the built-in default any more, and its
    /// modification time is the time of the save, not whatever the caller
    /// carried around.
    pub fn normalized_for_save(mut self, now: DateTime<Utc>) -> Self {
        self.last_modified = now;
        self.is_default = false;
        self
    }
}

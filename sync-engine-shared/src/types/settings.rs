use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Per-user application settings.
///
/// Only the fields the engine reasons about are typed; anything else the
/// application stores is kept verbatim in `extra` so a migration never drops
/// settings it does not understand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(default)]
    pub current_game_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_team_name: Option<String>,
    #[serde(default)]
    pub has_seen_app_guide: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_settings_survive_round_trip() {
        let raw = r#"{"currentGameId":"g1","language":"fi","autoBackup":true}"#;
        let settings: AppSettings = serde_json::from_str(raw).unwrap();
        assert_eq!(settings.current_game_id.as_deref(), Some("g1"));
        assert_eq!(settings.extra.get("autoBackup"), Some(&Value::Bool(true)));

        let back = serde_json::to_value(&settings).unwrap();
        assert_eq!(back["autoBackup"], Value::Bool(true));
    }
}

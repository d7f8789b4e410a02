//! Input files the binary migrates from.

use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use sync_engine_repository::{
    ConflictPolicy, DataStore, DurableMedium, LocalDataStore, MemoryMedium,
};
use sync_engine_shared::{DatasetExport, OwnerId, EXPORT_SCHEMA_VERSION};
use tracing::info;

use crate::errors::SyncEngineError;

/// Load a JSON object of legacy keys into an in-memory medium.
///
/// String values are stored verbatim since the legacy layout kept
/// JSON-encoded strings. Any other value is stored as its JSON text.
pub async fn load_legacy_medium(path: &Path) -> Result<MemoryMedium, SyncEngineError> {
    let raw = tokio::fs::read_to_string(path).await?;
    let Value::Object(entries) = serde_json::from_str::<Value>(&raw)? else {
        return Err(SyncEngineError::config(format!(
            "{} must contain a JSON object of legacy keys",
            path.display()
        )));
    };

    let medium = MemoryMedium::new();
    for (key, value) in &entries {
        let stored = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        medium.put(key, &stored).await?;
    }
    info!(path = %path.display(), keys = entries.len(), "Loaded legacy data");
    Ok(medium)
}

/// Load a dataset export into a throwaway local store owned by `owner`.
pub async fn load_export_store(
    path: &Path,
    owner: OwnerId,
) -> Result<Arc<LocalDataStore>, SyncEngineError> {
    let raw = tokio::fs::read_to_string(path).await?;
    let dataset: DatasetExport = serde_json::from_str(&raw)?;
    if dataset.schema_version > EXPORT_SCHEMA_VERSION {
        return Err(SyncEngineError::config(format!(
            "export schema version {} is newer than supported version {}",
            dataset.schema_version, EXPORT_SCHEMA_VERSION
        )));
    }

    let store = Arc::new(LocalDataStore::new(Arc::new(MemoryMedium::new()), owner));
    let summary = store.import_all(&dataset, ConflictPolicy::Overwrite).await?;
    info!(
        path = %path.display(),
        imported = summary.total_imported(),
        "Loaded dataset export"
    );
    Ok(store)
}

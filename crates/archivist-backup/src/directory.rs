//! Collaborators backed by a directory of JSON collection files.
//!
//! Each `<name>.json` in the collections directory holds one collection as
//! a JSON array of records.

use crate::snapshot::{ApplyOutcome, Collections, RestoreApplier, Snapshot, SnapshotSource};
use anyhow::{bail, Context, Result};
use archivist_core::SourceConfig;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

const COLLECTION_EXTENSION: &str = "json";

/// Reads collections and file roots from the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshotSource {
    collections_dir: Option<PathBuf>,
    file_roots: Vec<PathBuf>,
}

impl DirectorySnapshotSource {
    pub fn new(collections_dir: Option<PathBuf>, file_roots: Vec<PathBuf>) -> Self {
        Self {
            collections_dir,
            file_roots,
        }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(
            config.collections_dir.as_ref().map(|p| p.as_std_path().to_path_buf()),
            config
                .file_roots
                .iter()
                .map(|p| p.as_std_path().to_path_buf())
                .collect(),
        )
    }
}

#[async_trait]
impl SnapshotSource for DirectorySnapshotSource {
    async fn produce_snapshot(&self) -> Result<Snapshot> {
        let collections = match &self.collections_dir {
            Some(dir) => read_collections(dir).await?,
            None => Collections::new(),
        };

        Ok(Snapshot::from_collections(collections).with_file_roots(self.file_roots.clone()))
    }
}

async fn read_collections(dir: &Path) -> Result<Collections> {
    let mut collections = Collections::new();
    if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
        debug!("Collections directory {} does not exist", dir.display());
        return Ok(collections);
    }

    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read collections directory {}", dir.display()))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(name) = collection_name(&path) else {
            continue;
        };
        if !entry.file_type().await?.is_file() {
            continue;
        }

        let content = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let value: Value = serde_json::from_slice(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        match value {
            Value::Array(records) => {
                debug!("Read collection {} ({} records)", name, records.len());
                collections.insert(name, records);
            }
            _ => bail!("{} is not a JSON array", path.display()),
        }
    }

    Ok(collections)
}

fn collection_name(path: &Path) -> Option<String> {
    if path.extension()? != COLLECTION_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_string_lossy().to_string();
    if stem.is_empty() || stem.starts_with('.') {
        return None;
    }
    Some(stem)
}

/// Writes restored collections back as `<name>.json` files, replacing each
/// collection wholesale. Collections absent from the restored data are left
/// untouched.
#[derive(Debug, Clone)]
pub struct DirectoryApplier {
    collections_dir: PathBuf,
}

impl DirectoryApplier {
    pub fn new(collections_dir: impl Into<PathBuf>) -> Self {
        Self {
            collections_dir: collections_dir.into(),
        }
    }
}

#[async_trait]
impl RestoreApplier for DirectoryApplier {
    async fn apply_restored_data(&self, data: &Value) -> Result<ApplyOutcome> {
        let Some(object) = data.as_object() else {
            bail!("Restored data is not an object of collections");
        };

        // Check everything before writing anything.
        let mut pending = Vec::with_capacity(object.len());
        for (name, value) in object {
            if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\', '\0']) {
                bail!("Invalid collection name: {}", name);
            }
            let Some(records) = value.as_array() else {
                bail!("Collection {} is not an array", name);
            };
            pending.push((name, records));
        }

        tokio::fs::create_dir_all(&self.collections_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.collections_dir.display()))?;

        let mut outcome = ApplyOutcome::default();
        for (name, records) in pending {
            let target = self
                .collections_dir
                .join(format!("{}.{}", name, COLLECTION_EXTENSION));
            let temp = self
                .collections_dir
                .join(format!(".{}.{}.tmp", name, COLLECTION_EXTENSION));

            let content = serde_json::to_vec_pretty(records)?;
            tokio::fs::write(&temp, &content)
                .await
                .with_context(|| format!("Failed to write {}", temp.display()))?;
            tokio::fs::rename(&temp, &target)
                .await
                .with_context(|| format!("Failed to replace {}", target.display()))?;

            debug!("Replaced collection {} ({} records)", name, records.len());
            outcome.collections += 1;
            outcome.records += records.len();
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_collections_and_roots() {
        let temp_dir = TempDir::new().unwrap();
        let data = temp_dir.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join("users.json"), r#"[{"id":1},{"id":2}]"#).unwrap();
        std::fs::write(data.join("rooms.json"), "[]").unwrap();
        std::fs::write(data.join("README.md"), "ignored").unwrap();
        std::fs::write(data.join(".users.json.tmp"), "ignored").unwrap();

        let source = DirectorySnapshotSource::new(Some(data), vec![temp_dir.path().join("uploads")]);
        let snapshot = source.produce_snapshot().await.unwrap();

        assert_eq!(snapshot.collections.len(), 2);
        assert_eq!(snapshot.collections["users"].len(), 2);
        assert_eq!(snapshot.total_records(), 2);
        assert_eq!(snapshot.file_roots.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_dir_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let source = DirectorySnapshotSource::new(Some(temp_dir.path().join("nope")), vec![]);
        assert!(source.produce_snapshot().await.unwrap().collections.is_empty());
        assert!(DirectorySnapshotSource::default()
            .produce_snapshot()
            .await
            .unwrap()
            .collections
            .is_empty());
    }

    #[tokio::test]
    async fn test_non_array_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("settings.json"), r#"{"theme":"dark"}"#).unwrap();

        let source = DirectorySnapshotSource::new(Some(temp_dir.path().to_path_buf()), vec![]);
        let err = source.produce_snapshot().await.unwrap_err();
        assert!(err.to_string().contains("not a JSON array"));
    }

    #[tokio::test]
    async fn test_applier_replaces_collections() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("users.json"), r#"[{"id":99}]"#).unwrap();
        std::fs::write(temp_dir.path().join("audit.json"), r#"[{"id":"keep"}]"#).unwrap();

        let applier = DirectoryApplier::new(temp_dir.path());
        let outcome = applier
            .apply_restored_data(&json!({
                "users": [{"id": 1}, {"id": 2}],
                "rooms": [{"id": "general"}]
            }))
            .await
            .unwrap();

        assert_eq!(outcome, ApplyOutcome { collections: 2, records: 3 });

        let source = DirectorySnapshotSource::new(Some(temp_dir.path().to_path_buf()), vec![]);
        let snapshot = source.produce_snapshot().await.unwrap();
        assert_eq!(snapshot.collections["users"], vec![json!({"id": 1}), json!({"id": 2})]);
        assert_eq!(snapshot.collections["audit"], vec![json!({"id": "keep"})]);
    }

    #[tokio::test]
    async fn test_applier_rejects_bad_data_before_writing() {
        let temp_dir = TempDir::new().unwrap();
        let applier = DirectoryApplier::new(temp_dir.path());

        assert!(applier.apply_restored_data(&json!([1, 2])).await.is_err());
        assert!(applier
            .apply_restored_data(&json!({"users": [], "../escape": []}))
            .await
            .is_err());
        assert!(applier
            .apply_restored_data(&json!({"users": [], "broken": {"not": "array"}}))
            .await
            .is_err());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }
}

//! Collaborator contracts: where snapshots come from and where restored
//! envelope data goes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Named collections of records, each an ordered sequence.
pub type Collections = BTreeMap<String, Vec<Value>>;

/// Point-in-time view of the live store, produced on demand and discarded
/// after one backup call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Structured records by collection name
    pub collections: Collections,

    /// Media trees captured by tree artifacts
    pub file_roots: Vec<PathBuf>,
}

impl Snapshot {
    /// Snapshot with collections only
    pub fn from_collections(collections: Collections) -> Self {
        Self {
            collections,
            file_roots: Vec::new(),
        }
    }

    /// Adds file roots
    pub fn with_file_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.file_roots = roots;
        self
    }

    /// Total number of records across all collections
    pub fn total_records(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }
}

/// Supplies snapshots of the live system.
///
/// Failures are reported per call; the engine treats one as a failed
/// backup cycle, never as fatal.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn produce_snapshot(&self) -> anyhow::Result<Snapshot>;
}

/// What an applier did with restored data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    /// Collections written
    pub collections: usize,
    /// Records written
    pub records: usize,
}

/// Writes validated envelope data back to the live store.
///
/// Merge semantics (upsert, full replace) are the implementor's choice.
#[async_trait]
pub trait RestoreApplier: Send + Sync {
    async fn apply_restored_data(&self, data: &Value) -> anyhow::Result<ApplyOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_total_records() {
        let mut collections = Collections::new();
        collections.insert("users".to_string(), vec![json!({"id": 1}), json!({"id": 2})]);
        collections.insert("messages".to_string(), vec![json!({"id": 10})]);
        collections.insert("rooms".to_string(), vec![]);

        let snapshot = Snapshot::from_collections(collections);
        assert_eq!(snapshot.total_records(), 3);
        assert!(snapshot.file_roots.is_empty());
    }

    #[test]
    fn test_with_file_roots() {
        let snapshot = Snapshot::default().with_file_roots(vec![PathBuf::from("/srv/uploads")]);
        assert_eq!(snapshot.file_roots.len(), 1);
        assert_eq!(snapshot.total_records(), 0);
    }
}

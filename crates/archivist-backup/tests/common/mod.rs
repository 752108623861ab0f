//! Common test helpers for archivist-backup integration tests
//!
//! - Mock SnapshotSource implementations (fixed, failing, counting)
//! - A recording RestoreApplier
//! - Engine and fixture builders over a temporary backup root

#![allow(dead_code)]

use archivist_backup::{ApplyOutcome, BackupEngine, Collections, RestoreApplier, Snapshot, SnapshotSource};
use archivist_core::EngineConfig;
use async_trait::async_trait;
use camino::Utf8PathBuf;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ─── Sources ─────────────────────────────────────────────────────────────────

/// Returns the same snapshot on every call and counts calls.
pub struct MockSource {
    snapshot: Snapshot,
    pub calls: AtomicUsize,
}

impl MockSource {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for MockSource {
    async fn produce_snapshot(&self) -> anyhow::Result<Snapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.snapshot.clone())
    }
}

/// Always fails.
pub struct FailingSource;

#[async_trait]
impl SnapshotSource for FailingSource {
    async fn produce_snapshot(&self) -> anyhow::Result<Snapshot> {
        anyhow::bail!("record store unreachable")
    }
}

// ─── Applier ─────────────────────────────────────────────────────────────────

/// Records every payload it is asked to apply.
#[derive(Default)]
pub struct RecordingApplier {
    pub applied: Mutex<Vec<Value>>,
}

#[async_trait]
impl RestoreApplier for RecordingApplier {
    async fn apply_restored_data(&self, data: &Value) -> anyhow::Result<ApplyOutcome> {
        let collections: Collections = serde_json::from_value(data.clone())?;
        self.applied.lock().unwrap().push(data.clone());
        Ok(ApplyOutcome {
            collections: collections.len(),
            records: collections.values().map(Vec::len).sum(),
        })
    }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

/// Three collections totalling 40 records.
pub fn fixture_collections() -> Collections {
    let mut collections = Collections::new();
    collections.insert(
        "users".to_string(),
        (0..10).map(|i| json!({"id": i, "name": format!("user-{}", i)})).collect(),
    );
    collections.insert(
        "messages".to_string(),
        (0..25)
            .map(|i| json!({"id": i, "room": "general", "body": format!("message {}", i)}))
            .collect(),
    );
    collections.insert(
        "rooms".to_string(),
        (0..5).map(|i| json!({"id": format!("room-{}", i), "members": [1, 2, 3]})).collect(),
    );
    collections
}

/// Three collections of 40 records each.
pub fn forty_each_collections() -> Collections {
    ["users", "messages", "rooms"]
        .iter()
        .map(|name| {
            let records: Vec<_> = (0..40).map(|i| json!({"id": i, "collection": name})).collect();
            (name.to_string(), records)
        })
        .collect()
}

pub fn fixture_snapshot() -> Snapshot {
    Snapshot::from_collections(fixture_collections())
}

pub fn utf8(path: &Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).expect("temp paths are UTF-8")
}

/// Default configuration rooted at `root`.
pub fn config_for(root: &Path) -> EngineConfig {
    let mut config = EngineConfig::with_root(utf8(root));
    config.created_by = "integration-tests".to_string();
    config
}

/// Temporary backup root plus an engine over the fixture snapshot.
pub struct TestEngine {
    pub root: TempDir,
    pub engine: BackupEngine,
    pub source: Arc<MockSource>,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_snapshot(fixture_snapshot(), |_| {})
    }

    pub fn with_snapshot(snapshot: Snapshot, configure: impl FnOnce(&mut EngineConfig)) -> Self {
        let root = TempDir::new().unwrap();
        let mut config = config_for(root.path());
        configure(&mut config);

        let source = Arc::new(MockSource::new(snapshot));
        let engine = BackupEngine::new(config, source.clone()).unwrap();
        Self { root, engine, source }
    }

    pub fn kind_dir(&self, kind: &str) -> PathBuf {
        self.root.path().join(kind)
    }

    /// Every file under the backup root, relative, sorted.
    pub fn tree(&self) -> Vec<String> {
        let mut files: Vec<String> = walkdir::WalkDir::new(self.root.path())
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                e.path()
                    .strip_prefix(self.root.path())
                    .unwrap()
                    .to_string_lossy()
                    .to_string()
            })
            .collect();
        files.sort();
        files
    }
}

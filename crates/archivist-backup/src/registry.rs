//! Durable, capped side index of backup metadata.
//!
//! The registry lives at `<backup-root>/registry.json`:
//!
//! ```json
//! { "backups": [ { "filename": "...", "kind": "manual", ... } ], "lastUpdate": "..." }
//! ```
//!
//! It is never the source of truth for whether an artifact exists; restore
//! always resolves against the filesystem. A missing or unreadable registry
//! degrades listing only.

use crate::artifact::{list_artifacts, Artifact, ArtifactStrategy};
use crate::error::{BackupError, Result};
use archivist_core::ArtifactKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Registry file name under the backup root
pub const REGISTRY_FILENAME: &str = "registry.json";

/// One registered backup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub filename: String,
    pub kind: ArtifactKind,
    pub strategy: ArtifactStrategy,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub compressed: bool,

    /// SHA-256 of the artifact when it was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl From<&Artifact> for RegistryEntry {
    fn from(artifact: &Artifact) -> Self {
        Self {
            filename: artifact.filename.clone(),
            kind: artifact.kind,
            strategy: artifact.strategy,
            path: artifact.path.clone(),
            size_bytes: artifact.size_bytes,
            created_at: artifact.created_at,
            compressed: artifact.compressed,
            checksum: artifact.checksum.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryDocument {
    #[serde(default)]
    backups: Vec<RegistryEntry>,
    #[serde(default)]
    last_update: Option<DateTime<Utc>>,
}

/// Which kinds a listing covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindFilter {
    All,
    Only(ArtifactKind),
}

impl KindFilter {
    pub fn matches(&self, kind: ArtifactKind) -> bool {
        match self {
            KindFilter::All => true,
            KindFilter::Only(k) => *k == kind,
        }
    }
}

impl From<Option<ArtifactKind>> for KindFilter {
    fn from(kind: Option<ArtifactKind>) -> Self {
        kind.map_or(KindFilter::All, KindFilter::Only)
    }
}

/// Registry handle. Mutations within one process are serialized; the file
/// is rewritten wholesale on each one.
#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    cap: usize,
    lock: Mutex<()>,
}

impl Registry {
    /// Registry stored in `root`, holding at most `cap` entries.
    pub fn new(root: &Path, cap: usize) -> Self {
        Self {
            path: root.join(REGISTRY_FILENAME),
            cap: cap.max(1),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Prepend an entry, keeping the `cap` most recent.
    pub async fn append(&self, entry: RegistryEntry) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;

        entries.retain(|e| !(e.kind == entry.kind && e.filename == entry.filename));
        debug!("Registering {} backup {}", entry.kind, entry.filename);
        entries.insert(0, entry);

        if entries.len() > self.cap {
            let dropped = entries.len() - self.cap;
            entries.truncate(self.cap);
            debug!("Registry over capacity, dropped {} oldest entries", dropped);
        }

        self.write_entries(&entries).await
    }

    /// Drop entries whose file no longer exists. Returns the number removed.
    pub async fn reconcile(&self) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;
        let before = entries.len();

        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries.drain(..) {
            if tokio::fs::try_exists(&entry.path).await.unwrap_or(false) {
                kept.push(entry);
            } else {
                debug!("Removing dangling registry entry {}", entry.filename);
            }
        }

        let removed = before - kept.len();
        if removed > 0 {
            info!("Reconciled registry: removed {} dangling entries", removed);
            self.write_entries(&kept).await?;
        }

        Ok(removed)
    }

    /// Entries matching `filter`, newest first.
    pub async fn list(&self, filter: KindFilter) -> Result<Vec<RegistryEntry>> {
        let _guard = self.lock.lock().await;
        let mut entries: Vec<_> = self
            .read_entries()
            .await?
            .into_iter()
            .filter(|e| filter.matches(e.kind))
            .collect();

        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    /// Find an entry by kind and filename.
    pub async fn find(&self, kind: ArtifactKind, filename: &str) -> Result<Option<RegistryEntry>> {
        let _guard = self.lock.lock().await;
        Ok(self
            .read_entries()
            .await?
            .into_iter()
            .find(|e| e.kind == kind && e.filename == filename))
    }

    /// Regenerate the registry from the kind directories under `root`.
    ///
    /// Checksums are not recomputed; rebuilt entries carry none.
    pub async fn rebuild(&self, root: &Path) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let root = root.to_path_buf();

        let mut entries: Vec<RegistryEntry> = tokio::task::spawn_blocking(move || {
            let mut entries = Vec::new();
            for kind in ArtifactKind::all() {
                let artifacts = list_artifacts(&root, kind)
                    .map_err(BackupError::io(format!("Failed to scan {} backups", kind)))?;
                entries.extend(artifacts.iter().map(RegistryEntry::from));
            }
            Ok::<_, BackupError>(entries)
        })
        .await??;

        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(self.cap);

        info!("Rebuilt registry with {} entries", entries.len());
        self.write_entries(&entries).await?;
        Ok(entries.len())
    }

    async fn read_entries(&self) -> Result<Vec<RegistryEntry>> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(BackupError::io(format!(
                    "Failed to read registry {}",
                    self.path.display()
                ))(e))
            }
        };

        match serde_json::from_slice::<RegistryDocument>(&content) {
            Ok(document) => Ok(document.backups),
            Err(e) => {
                warn!(
                    "Registry {} is unreadable, treating as empty: {}",
                    self.path.display(),
                    e
                );
                Ok(Vec::new())
            }
        }
    }

    /// Atomic rewrite: temp file in the same directory, then rename.
    async fn write_entries(&self, entries: &[RegistryEntry]) -> Result<()> {
        let document = RegistryDocument {
            backups: entries.to_vec(),
            last_update: Some(Utc::now()),
        };
        let content = serde_json::to_vec_pretty(&document)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BackupError::io("Failed to create backup root"))?;
        }

        let temp_path = self
            .path
            .with_file_name(format!(".{}.{}.tmp", REGISTRY_FILENAME, uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&temp_path, &content)
            .await
            .map_err(BackupError::io("Failed to write registry"))?;

        if let Err(e) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(BackupError::io("Failed to replace registry")(e));
        }

        Ok(())
    }
}

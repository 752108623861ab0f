//! The engine facade tying snapshot source, artifact writers, registry,
//! retention and restore together.

use crate::artifact::{list_artifacts, Artifact, ArtifactStrategy, BackupOptions, EnvelopeWriter, TreeWriter};
use crate::compression::calculate_checksum;
use crate::envelope::{EnvelopeMetadata, EnvelopeStatistics};
use crate::error::{BackupError, Result};
use crate::filters::ExclusionConfig;
use crate::registry::{KindFilter, Registry, RegistryEntry};
use crate::restore::{RestoreEngine, RestoreOutcome};
use crate::retention::RetentionPolicy;
use crate::snapshot::{ApplyOutcome, RestoreApplier, SnapshotSource};
use archivist_core::{ArtifactKind, EngineConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of comparing an artifact with its registered checksum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumStatus {
    Match,
    Mismatch { expected: String },
    /// No registry entry (or no checksum) to compare with
    Unregistered,
}

/// Integrity report for one artifact
#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub filename: String,
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub checksum: String,
    pub checksum_status: ChecksumStatus,
    pub metadata: EnvelopeMetadata,
    pub statistics: EnvelopeStatistics,
}

impl VerifyReport {
    /// True unless the checksum contradicts the registry.
    pub fn is_intact(&self) -> bool {
        !matches!(self.checksum_status, ChecksumStatus::Mismatch { .. })
    }
}

/// A backup engine bound to one backup root.
///
/// Instances are independent; two engines on different roots share nothing.
/// Running two engines on the same root concurrently is unsupported.
pub struct BackupEngine {
    config: EngineConfig,
    root: PathBuf,
    source: Arc<dyn SnapshotSource>,
    applier: Option<Arc<dyn RestoreApplier>>,
    registry: Arc<Registry>,
    retention: RetentionPolicy,
    restorer: RestoreEngine,
    envelopes: EnvelopeWriter,
    trees: TreeWriter,
}

impl std::fmt::Debug for BackupEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupEngine")
            .field("root", &self.root)
            .field("registry_cap", &self.registry.cap())
            .field("has_applier", &self.applier.is_some())
            .finish()
    }
}

impl BackupEngine {
    /// Creates an engine. Fails only if the configured tree exclusions are invalid.
    pub fn new(config: EngineConfig, source: Arc<dyn SnapshotSource>) -> Result<Self> {
        let root = config.backup_root.as_std_path().to_path_buf();
        let registry = Arc::new(Registry::new(&root, config.registry_cap));
        let exclusions = ExclusionConfig::new(&config.tree.exclude)?;

        Ok(Self {
            retention: RetentionPolicy::new(root.clone(), registry.clone()),
            restorer: RestoreEngine::new(root.clone()),
            envelopes: EnvelopeWriter::new(root.clone()),
            trees: TreeWriter::new(config.tree.compression_level, exclusions),
            registry,
            root,
            source,
            applier: None,
            config,
        })
    }

    /// Sets the applier used by [`restore_and_apply`](Self::restore_and_apply).
    pub fn with_applier(mut self, applier: Arc<dyn RestoreApplier>) -> Self {
        self.applier = Some(applier);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Produce a snapshot, write it as an artifact, register it and, if
    /// requested, apply retention for `kind`.
    ///
    /// The artifact is registered only after its write has completed. A
    /// registry or retention failure afterwards is logged; the artifact is
    /// still returned.
    pub async fn create_backup(&self, kind: ArtifactKind, options: BackupOptions) -> Result<Artifact> {
        debug!("Requesting snapshot for {} {} backup", kind, options.strategy);
        let snapshot = self
            .source
            .produce_snapshot()
            .await
            .map_err(|e| BackupError::source_failed(format!("{:#}", e)))?;

        let created_by = options
            .created_by
            .clone()
            .unwrap_or_else(|| self.config.created_by.clone());

        let artifact = match options.strategy {
            ArtifactStrategy::Envelope => {
                self.envelopes
                    .write(&snapshot.collections, kind, options.compressed, &created_by)
                    .await?
            }
            ArtifactStrategy::Tree => {
                self.trees
                    .clone()
                    .with_created_by(created_by)
                    .write_artifact(&self.root, kind, &snapshot.file_roots)
                    .await?
            }
        };

        if let Err(e) = self.registry.append(RegistryEntry::from(&artifact)).await {
            warn!("Failed to register backup {}: {}", artifact.filename, e);
        }

        if options.auto_cleanup {
            let keep_count = self.config.retention.keep_for(kind);
            if let Err(e) = self.retention.cleanup_old_backups(kind, keep_count).await {
                warn!("Retention after {} failed: {}", artifact.filename, e);
            }
        }

        Ok(artifact)
    }

    /// Registered backups, newest first.
    pub async fn list_backups(&self, filter: KindFilter) -> Result<Vec<RegistryEntry>> {
        self.registry.list(filter).await
    }

    /// Artifacts actually present for `kind`, newest first.
    pub async fn list_artifacts(&self, kind: ArtifactKind) -> Result<Vec<Artifact>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || list_artifacts(&root, kind))
            .await?
            .map_err(BackupError::io(format!("Failed to list {} backups", kind)))
    }

    /// Keep the `keep_count` newest artifacts of `kind`. Returns the number deleted.
    pub async fn cleanup_old_backups(&self, kind: ArtifactKind, keep_count: usize) -> Result<usize> {
        self.retention.cleanup_old_backups(kind, keep_count).await
    }

    /// Restore an artifact. Envelope data is returned, not applied.
    pub async fn restore(&self, kind: ArtifactKind, filename: &str) -> Result<RestoreOutcome> {
        self.restorer.restore(kind, filename).await
    }

    /// Restore an envelope artifact and hand its data to the configured applier.
    pub async fn restore_and_apply(&self, kind: ArtifactKind, filename: &str) -> Result<ApplyOutcome> {
        let applier = self
            .applier
            .as_ref()
            .ok_or_else(|| BackupError::apply("No restore applier configured"))?;

        let restored = self.restorer.load_envelope(kind, filename).await?;
        let outcome = applier
            .apply_restored_data(&restored.data)
            .await
            .map_err(|e| BackupError::apply(format!("{:#}", e)))?;

        info!(
            "Applied {}: {} collections, {} records",
            filename, outcome.collections, outcome.records
        );
        Ok(outcome)
    }

    /// Recompute the artifact's checksum, compare it with the registry and
    /// validate its envelope (or tree manifest).
    pub async fn verify(&self, kind: ArtifactKind, filename: &str) -> Result<VerifyReport> {
        let path = self.restorer.locate(kind, filename)?;

        let checksum_path = path.clone();
        let checksum = tokio::task::spawn_blocking(move || calculate_checksum(&checksum_path))
            .await?
            .map_err(BackupError::io(format!("Failed to checksum {}", filename)))?;
        let size_bytes = tokio::fs::metadata(&path)
            .await
            .map_err(BackupError::io(format!("Failed to stat {}", filename)))?
            .len();

        let checksum_status = match self.registry.find(kind, filename).await? {
            Some(RegistryEntry {
                checksum: Some(expected),
                ..
            }) if expected == checksum => ChecksumStatus::Match,
            Some(RegistryEntry {
                checksum: Some(expected),
                ..
            }) => ChecksumStatus::Mismatch { expected },
            _ => ChecksumStatus::Unregistered,
        };

        if let ChecksumStatus::Mismatch { expected } = &checksum_status {
            warn!("Checksum mismatch for {}: expected {}, got {}", filename, expected, checksum);
        }

        let (metadata, statistics) = self.restorer.inspect(kind, filename).await?;

        Ok(VerifyReport {
            filename: filename.to_string(),
            kind,
            path,
            size_bytes,
            checksum,
            checksum_status,
            metadata,
            statistics,
        })
    }

    /// Delete one artifact and drop it from the registry.
    pub async fn delete_backup(&self, kind: ArtifactKind, filename: &str) -> Result<()> {
        let path = self.restorer.locate(kind, filename)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(BackupError::io(format!("Failed to delete {}", filename)))?;
        info!("Deleted {} backup {}", kind, filename);

        if let Err(e) = self.registry.reconcile().await {
            warn!("Registry reconcile after delete failed: {}", e);
        }
        Ok(())
    }

    /// Regenerate the registry from the backup directories.
    pub async fn rebuild_registry(&self) -> Result<usize> {
        self.registry.rebuild(&self.root).await
    }
}

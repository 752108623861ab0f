//! Retention policy: keep the newest N artifacts of a kind.

use crate::artifact::list_artifacts;
use crate::error::{BackupError, Result};
use crate::registry::Registry;
use archivist_core::ArtifactKind;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Keep count used when none is configured.
pub const DEFAULT_KEEP_COUNT: usize = 10;

/// Deletes artifacts beyond a keep count, then reconciles the registry.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    root: PathBuf,
    registry: Arc<Registry>,
}

impl RetentionPolicy {
    pub fn new(root: impl Into<PathBuf>, registry: Arc<Registry>) -> Self {
        Self {
            root: root.into(),
            registry,
        }
    }

    /// Delete every artifact of `kind` beyond the `keep_count` newest.
    ///
    /// Candidates come from the kind directory rather than the registry, so
    /// artifacts past the registry cap are still swept. A file that cannot
    /// be deleted is logged and skipped. Returns the number deleted.
    pub async fn cleanup_old_backups(&self, kind: ArtifactKind, keep_count: usize) -> Result<usize> {
        let root = self.root.clone();
        let artifacts = tokio::task::spawn_blocking(move || list_artifacts(&root, kind))
            .await?
            .map_err(BackupError::io(format!("Failed to list {} backups", kind)))?;

        if artifacts.len() <= keep_count {
            debug!(
                "{} {} backups, keeping up to {}: nothing to delete",
                artifacts.len(),
                kind,
                keep_count
            );
            return Ok(0);
        }

        let mut deleted = 0;
        for artifact in artifacts.iter().skip(keep_count) {
            match tokio::fs::remove_file(&artifact.path).await {
                Ok(()) => {
                    debug!("Deleted old backup {}", artifact.filename);
                    deleted += 1;
                }
                Err(e) => {
                    warn!("Failed to delete old backup {}: {}", artifact.filename, e);
                }
            }
        }

        if let Err(e) = self.registry.reconcile().await {
            warn!("Registry reconcile after cleanup failed: {}", e);
        }

        info!("Cleaned up {} old {} backups (keeping {})", deleted, kind, keep_count);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactStrategy;
    use crate::registry::{KindFilter, RegistryEntry};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    async fn seed(root: &std::path::Path, registry: &Registry, kind: ArtifactKind, count: u32) {
        let dir = root.join(kind.as_str());
        std::fs::create_dir_all(&dir).unwrap();

        for day in 1..=count {
            let filename = format!("backup-2026-01-{:02}T00-00-00-000000Z.json", day);
            let path = dir.join(&filename);
            std::fs::write(&path, b"{}").unwrap();
            registry
                .append(RegistryEntry {
                    filename,
                    kind,
                    strategy: ArtifactStrategy::Envelope,
                    path,
                    size_bytes: 2,
                    created_at: Utc.with_ymd_and_hms(2026, 1, day, 0, 0, 0).unwrap(),
                    compressed: false,
                    checksum: None,
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_cleanup_keeps_newest() {
        let temp_dir = TempDir::new().unwrap();
        let registry = Arc::new(Registry::new(temp_dir.path(), 50));
        seed(temp_dir.path(), &registry, ArtifactKind::Manual, 7).await;

        let policy = RetentionPolicy::new(temp_dir.path(), registry.clone());
        assert_eq!(policy.cleanup_old_backups(ArtifactKind::Manual, 3).await.unwrap(), 4);

        let remaining = list_artifacts(temp_dir.path(), ArtifactKind::Manual).unwrap();
        let names: Vec<_> = remaining.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "backup-2026-01-07T00-00-00-000000Z.json",
                "backup-2026-01-06T00-00-00-000000Z.json",
                "backup-2026-01-05T00-00-00-000000Z.json",
            ]
        );

        let entries = registry.list(KindFilter::All).await.unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.path.exists()));
    }

    #[tokio::test]
    async fn test_cleanup_only_touches_one_kind() {
        let temp_dir = TempDir::new().unwrap();
        let registry = Arc::new(Registry::new(temp_dir.path(), 50));
        seed(temp_dir.path(), &registry, ArtifactKind::Manual, 4).await;
        seed(temp_dir.path(), &registry, ArtifactKind::Auto, 4).await;

        let policy = RetentionPolicy::new(temp_dir.path(), registry.clone());
        assert_eq!(policy.cleanup_old_backups(ArtifactKind::Auto, 1).await.unwrap(), 3);

        assert_eq!(list_artifacts(temp_dir.path(), ArtifactKind::Manual).unwrap().len(), 4);
        assert_eq!(list_artifacts(temp_dir.path(), ArtifactKind::Auto).unwrap().len(), 1);
        assert_eq!(registry.list(KindFilter::All).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_cleanup_under_keep_count_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let registry = Arc::new(Registry::new(temp_dir.path(), 50));
        seed(temp_dir.path(), &registry, ArtifactKind::Manual, 2).await;

        let policy = RetentionPolicy::new(temp_dir.path(), registry);
        assert_eq!(
            policy.cleanup_old_backups(ArtifactKind::Manual, DEFAULT_KEEP_COUNT).await.unwrap(),
            0
        );
        assert_eq!(policy.cleanup_old_backups(ArtifactKind::Auto, 0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_keep_zero_deletes_everything() {
        let temp_dir = TempDir::new().unwrap();
        let registry = Arc::new(Registry::new(temp_dir.path(), 50));
        seed(temp_dir.path(), &registry, ArtifactKind::Auto, 3).await;

        let policy = RetentionPolicy::new(temp_dir.path(), registry.clone());
        assert_eq!(policy.cleanup_old_backups(ArtifactKind::Auto, 0).await.unwrap(), 3);
        assert!(registry.list(KindFilter::All).await.unwrap().is_empty());
    }
}

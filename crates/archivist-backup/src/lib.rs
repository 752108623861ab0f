//! Archivist backup engine
//!
//! Turns a live store (structured collections plus media file trees) into
//! durable, verifiable, space-bounded artifacts and restores them without
//! corrupting live state.
//!
//! # Features
//!
//! - **Two artifact strategies**: JSON envelopes (optionally gzipped) for
//!   collections, tar+gzip trees for file roots
//! - **Atomic writes**: artifacts appear under their final name only once
//!   fully synced; concurrent writers never collide
//! - **Registry**: capped side index of backups, rebuildable from disk
//! - **Retention**: per-kind keep counts, best-effort deletion
//! - **Restore**: validation before any live write; tree restores are
//!   staged and swapped in one top-level entry at a time
//! - **Scheduler**: periodic backups with single-flight cycles
//!
//! # Examples
//!
//! ```no_run
//! use archivist_backup::{BackupEngine, BackupOptions, DirectorySnapshotSource, KindFilter};
//! use archivist_core::{ArtifactKind, EngineConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EngineConfig::with_root("/var/lib/archivist/backups");
//!     let source = DirectorySnapshotSource::from_config(&config.source);
//!     let engine = BackupEngine::new(config, Arc::new(source))?;
//!
//!     let artifact = engine
//!         .create_backup(ArtifactKind::Manual, BackupOptions::default())
//!         .await?;
//!     println!("Backup created: {} ({} bytes)", artifact.filename, artifact.size_bytes);
//!
//!     for entry in engine.list_backups(KindFilter::All).await? {
//!         println!("{} {}", entry.kind, entry.filename);
//!     }
//!     Ok(())
//! }
//! ```

pub mod artifact;
pub mod compression;
pub mod directory;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod filters;
pub mod naming;
pub mod registry;
pub mod restore;
pub mod retention;
pub mod scheduler;
pub mod snapshot;

// Re-export commonly used types
pub use artifact::{
    Artifact, ArtifactStrategy, BackupOptions, EnvelopeWriter, TreeEntry, TreeEntryType,
    TreeManifest, TreeWriteResult, TreeWriter, MANIFEST_FILENAME,
};
pub use compression::{calculate_checksum, DEFAULT_COMPRESSION_LEVEL, MAX_COMPRESSION_LEVEL};
pub use directory::{DirectoryApplier, DirectorySnapshotSource};
pub use engine::{BackupEngine, ChecksumStatus, VerifyReport};
pub use envelope::{Envelope, EnvelopeMetadata, EnvelopeStatistics, ENVELOPE_VERSION};
pub use error::{BackupError, ErrorKind, Result};
pub use filters::ExclusionConfig;
pub use registry::{KindFilter, Registry, RegistryEntry, REGISTRY_FILENAME};
pub use restore::{
    RestoreEngine, RestoreOutcome, RestoreSession, RestoredEntry, RestoredEnvelope,
    TreeRestoreReport,
};
pub use retention::{RetentionPolicy, DEFAULT_KEEP_COUNT};
pub use scheduler::{CycleOutcome, Scheduler, SchedulerHandle};
pub use snapshot::{ApplyOutcome, Collections, RestoreApplier, Snapshot, SnapshotSource};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_format_constants() {
        assert_eq!(MANIFEST_FILENAME, ".backup-manifest.json");
        assert_eq!(ENVELOPE_VERSION, "1.0.0");
        assert_eq!(REGISTRY_FILENAME, "registry.json");
        assert_eq!(DEFAULT_KEEP_COUNT, 10);
    }

    #[test]
    fn test_compression_levels() {
        assert_eq!(DEFAULT_COMPRESSION_LEVEL, 6);
        assert_eq!(MAX_COMPRESSION_LEVEL, 9);
    }
}

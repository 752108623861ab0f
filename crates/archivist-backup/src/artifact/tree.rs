//! Tree artifact writer.
//!
//! A tree artifact is a gzip-compressed tar container. Its first entry is
//! [`MANIFEST_FILENAME`], an envelope listing the top-level entries, so a
//! restore can validate the artifact before extracting anything else.

use super::{kind_dir, new_stem, Artifact, ArtifactStrategy, PendingArtifact};
use crate::compression::{ChecksumWriter, MAX_COMPRESSION_LEVEL};
use crate::envelope::{Envelope, EnvelopeStatistics};
use crate::error::{BackupError, Result};
use crate::filters::ExclusionConfig;
use crate::naming::{extension_for, validate_filename};
use archivist_core::ArtifactKind;
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tar::{Builder as TarBuilder, EntryType, Header};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Manifest entry name; always the first entry of a tree artifact.
pub const MANIFEST_FILENAME: &str = ".backup-manifest.json";

/// Whether a top-level entry is a single file or a directory subtree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeEntryType {
    File,
    Directory,
}

/// One top-level entry of a tree artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeEntry {
    /// Name inside the archive (final component of the source path)
    pub name: String,

    /// Live location the entry was captured from and restores to
    pub source_path: PathBuf,

    pub kind: TreeEntryType,
}

/// The `data` block of a tree manifest envelope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeManifest {
    pub entries: Vec<TreeEntry>,
}

impl TreeManifest {
    /// Read and check the entry list carried by a manifest envelope.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self> {
        let manifest: TreeManifest = serde_json::from_value(envelope.data.clone())
            .map_err(|e| BackupError::validation(format!("Malformed tree manifest: {}", e)))?;

        let mut seen = HashSet::new();
        for entry in &manifest.entries {
            validate_filename(&entry.name)?;
            if entry.name == MANIFEST_FILENAME {
                return Err(BackupError::validation("Tree manifest lists itself as an entry"));
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(BackupError::validation(format!(
                    "Duplicate tree entry: {}",
                    entry.name
                )));
            }
        }

        Ok(manifest)
    }
}

/// Result of writing a tree artifact
#[derive(Debug, Clone)]
pub struct TreeWriteResult {
    pub filename: String,
    pub path: PathBuf,

    /// Compressed artifact size
    pub size_bytes: u64,

    /// SHA-256 of the artifact file
    pub checksum: String,

    pub created_at: DateTime<Utc>,
    pub entries: Vec<TreeEntry>,

    /// Regular files archived, across all entries
    pub file_count: usize,

    /// Uncompressed bytes of archived files
    pub total_bytes: u64,
}

/// Something to append to the archive
#[derive(Debug)]
struct Member {
    source: PathBuf,
    archive_path: PathBuf,
}

#[derive(Debug, Default)]
struct ArchivePlan {
    entries: Vec<TreeEntry>,
    members: Vec<Member>,
    file_count: usize,
    total_bytes: u64,
}

/// Streams file roots into tar+gzip artifacts.
#[derive(Debug, Clone)]
pub struct TreeWriter {
    compression_level: u32,
    exclusions: ExclusionConfig,
    created_by: String,
}

impl TreeWriter {
    /// Creates a writer; the level is clamped to 0..=9.
    pub fn new(compression_level: u32, exclusions: ExclusionConfig) -> Self {
        Self {
            compression_level: compression_level.min(MAX_COMPRESSION_LEVEL),
            exclusions,
            created_by: format!("archivist v{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Sets the manifest's `metadata.createdBy`.
    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = created_by.into();
        self
    }

    pub fn compression_level(&self) -> u32 {
        self.compression_level
    }

    /// Archive `roots` into exactly `destination`.
    ///
    /// Roots that do not exist are skipped. The destination only appears
    /// once the archive has been fully flushed and synced; on error nothing
    /// is left behind.
    pub async fn write(
        &self,
        roots: &[PathBuf],
        destination: &Path,
        kind: ArtifactKind,
    ) -> Result<TreeWriteResult> {
        let writer = self.clone();
        let roots = roots.to_vec();
        let destination = destination.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let plan = writer.plan(&roots)?;
            let pending = PendingArtifact::at(&destination).map_err(BackupError::io(format!(
                "Failed to create {}",
                destination.display()
            )))?;
            writer.write_plan(plan, pending, kind, Utc::now())
        })
        .await?
    }

    /// Archive `roots` as a new artifact under `<root>/<kind>/`.
    pub async fn write_artifact(
        &self,
        root: &Path,
        kind: ArtifactKind,
        roots: &[PathBuf],
    ) -> Result<Artifact> {
        let writer = self.clone();
        let roots = roots.to_vec();
        let dir = kind_dir(root, kind);

        let result = tokio::task::spawn_blocking(move || {
            let plan = writer.plan(&roots)?;
            let created_at = Utc::now();
            let extension = extension_for(ArtifactStrategy::Tree, true);
            let pending = PendingArtifact::reserve(&dir, &new_stem(created_at), &extension)
                .map_err(BackupError::io(format!("Failed to create artifact in {}", dir.display())))?;
            writer.write_plan(plan, pending, kind, created_at)
        })
        .await??;

        info!(
            "Wrote {} tree backup {} ({} entries, {} files, {} bytes)",
            kind,
            result.filename,
            result.entries.len(),
            result.file_count,
            result.size_bytes
        );

        Ok(Artifact {
            filename: result.filename,
            kind,
            strategy: ArtifactStrategy::Tree,
            compressed: true,
            path: result.path,
            size_bytes: result.size_bytes,
            created_at: result.created_at,
            checksum: Some(result.checksum),
        })
    }

    /// Resolve roots into top-level entries and archive members.
    fn plan(&self, roots: &[PathBuf]) -> Result<ArchivePlan> {
        let mut plan = ArchivePlan::default();
        let mut names = HashSet::new();

        for root in roots {
            if !root.exists() {
                debug!("Skipping non-existent root: {}", root.display());
                continue;
            }

            let source = fs::canonicalize(root)
                .map_err(BackupError::io(format!("Failed to resolve {}", root.display())))?;
            let name = source
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .ok_or_else(|| {
                    BackupError::validation(format!("Root has no final component: {}", root.display()))
                })?;

            if name == MANIFEST_FILENAME {
                return Err(BackupError::validation(format!(
                    "Root name is reserved: {}",
                    root.display()
                )));
            }
            if !names.insert(name.clone()) {
                return Err(BackupError::validation(format!(
                    "Duplicate top-level entry '{}' from {}",
                    name,
                    root.display()
                )));
            }

            let metadata = fs::metadata(&source)
                .map_err(BackupError::io(format!("Failed to stat {}", source.display())))?;

            if metadata.is_dir() {
                self.plan_directory(&mut plan, &source, &name)?;
                plan.entries.push(TreeEntry {
                    name,
                    source_path: source,
                    kind: TreeEntryType::Directory,
                });
            } else {
                plan.file_count += 1;
                plan.total_bytes += metadata.len();
                plan.members.push(Member {
                    source: source.clone(),
                    archive_path: PathBuf::from(&name),
                });
                plan.entries.push(TreeEntry {
                    name,
                    source_path: source,
                    kind: TreeEntryType::File,
                });
            }
        }

        Ok(plan)
    }

    fn plan_directory(&self, plan: &mut ArchivePlan, source: &Path, name: &str) -> Result<()> {
        plan.members.push(Member {
            source: source.to_path_buf(),
            archive_path: PathBuf::from(name),
        });

        let walker = WalkDir::new(source)
            .follow_links(false)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                let rel_path = e.path().strip_prefix(source).unwrap_or(e.path());
                !self.exclusions.should_exclude(&Path::new(name).join(rel_path))
            });

        for entry in walker {
            let entry = entry.map_err(|e| {
                let message = format!("Failed to walk {}", source.display());
                match e.into_io_error() {
                    Some(io_err) => BackupError::io(message)(io_err),
                    None => BackupError::validation(format!("{}: filesystem loop", message)),
                }
            })?;

            let rel_path = entry
                .path()
                .strip_prefix(source)
                .map_err(|e| BackupError::validation(format!("Failed to compute relative path: {}", e)))?;

            if entry.file_type().is_file() {
                plan.file_count += 1;
                plan.total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }

            plan.members.push(Member {
                source: entry.path().to_path_buf(),
                archive_path: Path::new(name).join(rel_path),
            });
        }

        Ok(())
    }

    fn write_plan(
        &self,
        plan: ArchivePlan,
        mut pending: PendingArtifact,
        kind: ArtifactKind,
        created_at: DateTime<Utc>,
    ) -> Result<TreeWriteResult> {
        let manifest = TreeManifest {
            entries: plan.entries.clone(),
        };
        let envelope = Envelope::new(
            kind.as_str(),
            self.created_by.clone(),
            created_at,
            serde_json::to_value(&manifest)?,
            EnvelopeStatistics {
                collections: plan.entries.len(),
                total_documents: plan.file_count,
                size: plan.total_bytes,
            },
        );
        let manifest_bytes = envelope.to_vec()?;

        let filename = pending.filename().to_string();
        let path = pending.final_path().to_path_buf();

        let file = pending
            .take_file()
            .map_err(BackupError::io("Failed to open artifact file"))?;
        let (file, checksum) = self
            .stream_archive(file, &manifest_bytes, &plan.members, created_at)
            .map_err(BackupError::io(format!("Failed to write {}", filename)))?;
        let size_bytes = pending
            .commit(file)
            .map_err(BackupError::io(format!("Failed to finalize {}", filename)))?;

        Ok(TreeWriteResult {
            filename,
            path,
            size_bytes,
            checksum,
            created_at,
            entries: plan.entries,
            file_count: plan.file_count,
            total_bytes: plan.total_bytes,
        })
    }

    /// File -> checksum -> gzip -> tar. Each layer is finished in order so
    /// every byte is on disk before the checksum is taken.
    fn stream_archive(
        &self,
        file: File,
        manifest: &[u8],
        members: &[Member],
        created_at: DateTime<Utc>,
    ) -> io::Result<(File, String)> {
        let encoder = GzEncoder::new(
            ChecksumWriter::new(file),
            Compression::new(self.compression_level),
        );
        let mut tar = TarBuilder::new(encoder);
        tar.follow_symlinks(false);

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(manifest.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(created_at.timestamp().max(0) as u64);
        header.set_cksum();
        tar.append_data(&mut header, MANIFEST_FILENAME, manifest)?;

        for member in members {
            tar.append_path_with_name(&member.source, &member.archive_path)?;
        }

        let encoder = tar.into_inner()?;
        let checksum_writer = encoder.finish()?;
        let (file, checksum, _) = checksum_writer.finish()?;
        Ok((file, checksum))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::calculate_checksum;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    fn create_media_tree(base: &Path) -> PathBuf {
        let uploads = base.join("uploads");
        fs::create_dir_all(uploads.join("avatars")).unwrap();
        fs::create_dir_all(uploads.join("tmp")).unwrap();
        fs::write(uploads.join("avatars/ada.png"), b"png-bytes").unwrap();
        fs::write(uploads.join("notes.txt"), b"hello").unwrap();
        fs::write(uploads.join("tmp/upload.tmp"), b"partial").unwrap();
        uploads
    }

    fn archive_names(path: &Path) -> Vec<String> {
        let mut archive = tar::Archive::new(GzDecoder::new(File::open(path).unwrap()));
        archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().trim_end_matches('/').to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_write_tree_artifact() {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let uploads = create_media_tree(source.path());
        let export = source.path().join("export.csv");
        fs::write(&export, b"a,b\n1,2\n").unwrap();

        let writer = TreeWriter::new(9, ExclusionConfig::none());
        let artifact = writer
            .write_artifact(output.path(), ArtifactKind::Manual, &[uploads, export])
            .await
            .unwrap();

        assert_eq!(artifact.strategy, ArtifactStrategy::Tree);
        assert!(artifact.compressed);
        assert!(artifact.filename.ends_with(".tar.gz"));
        assert_eq!(artifact.checksum.as_deref(), Some(calculate_checksum(&artifact.path).unwrap().as_str()));

        let names = archive_names(&artifact.path);
        assert_eq!(names[0], MANIFEST_FILENAME);
        assert!(names.contains(&"uploads".to_string()));
        assert!(names.contains(&"uploads/avatars/ada.png".to_string()));
        assert!(names.contains(&"export.csv".to_string()));
    }

    #[tokio::test]
    async fn test_manifest_is_an_envelope() {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let uploads = create_media_tree(source.path());
        let destination = output.path().join("media.tar.gz");

        let writer = TreeWriter::new(9, ExclusionConfig::none()).with_created_by("tests");
        let result = writer
            .write(&[uploads.clone()], &destination, ArtifactKind::Auto)
            .await
            .unwrap();

        assert_eq!(result.file_count, 3);
        assert_eq!(result.total_bytes, 9 + 5 + 7);
        assert_eq!(result.size_bytes, fs::metadata(&destination).unwrap().len());

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&destination).unwrap()));
        let mut first = archive.entries().unwrap().next().unwrap().unwrap();
        let mut bytes = Vec::new();
        first.read_to_end(&mut bytes).unwrap();

        let envelope = Envelope::parse(&bytes).unwrap();
        assert_eq!(envelope.metadata.backup_type, "auto");
        assert_eq!(envelope.metadata.created_by, "tests");
        assert_eq!(envelope.statistics.total_documents, 3);

        let manifest = TreeManifest::from_envelope(&envelope).unwrap();
        assert_eq!(manifest.entries.len(), 1);
        assert_eq!(manifest.entries[0].name, "uploads");
        assert_eq!(manifest.entries[0].kind, TreeEntryType::Directory);
        assert_eq!(manifest.entries[0].source_path, fs::canonicalize(&uploads).unwrap());
    }

    #[tokio::test]
    async fn test_missing_roots_are_skipped() {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let uploads = create_media_tree(source.path());
        let destination = output.path().join("media.tar.gz");

        let writer = TreeWriter::new(9, ExclusionConfig::none());
        let result = writer
            .write(
                &[source.path().join("not-created-yet"), uploads],
                &destination,
                ArtifactKind::Manual,
            )
            .await
            .unwrap();

        assert_eq!(result.entries.len(), 1);
        assert!(destination.exists());
    }

    #[tokio::test]
    async fn test_exclusions_apply_below_top_level() {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let uploads = create_media_tree(source.path());
        let destination = output.path().join("media.tar.gz");

        let exclusions = ExclusionConfig::new(&["**/*.tmp".to_string()]).unwrap();
        let writer = TreeWriter::new(9, exclusions);
        let result = writer
            .write(&[uploads], &destination, ArtifactKind::Manual)
            .await
            .unwrap();

        assert_eq!(result.file_count, 2);
        let names = archive_names(&destination);
        assert!(!names.contains(&"uploads/tmp/upload.tmp".to_string()));
        assert!(names.contains(&"uploads/tmp".to_string()));
    }

    #[tokio::test]
    async fn test_duplicate_top_level_names_rejected() {
        let source = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        fs::create_dir_all(source.path().join("a/media")).unwrap();
        fs::create_dir_all(source.path().join("b/media")).unwrap();
        let destination = output.path().join("media.tar.gz");

        let writer = TreeWriter::new(9, ExclusionConfig::none());
        let err = writer
            .write(
                &[source.path().join("a/media"), source.path().join("b/media")],
                &destination,
                ArtifactKind::Manual,
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
        assert!(!destination.exists());
        assert_eq!(fs::read_dir(output.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_manifest_rejects_unsafe_names() {
        let envelope = Envelope::new(
            "manual",
            "tests",
            Utc::now(),
            serde_json::json!({
                "entries": [{ "name": "../etc", "sourcePath": "/etc", "kind": "directory" }]
            }),
            EnvelopeStatistics::default(),
        );
        assert!(TreeManifest::from_envelope(&envelope).is_err());
    }

    #[test]
    fn test_compression_level_is_clamped() {
        let writer = TreeWriter::new(42, ExclusionConfig::none());
        assert_eq!(writer.compression_level(), MAX_COMPRESSION_LEVEL);
    }
}

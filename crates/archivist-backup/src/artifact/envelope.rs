//! Envelope artifact writer.

use super::{kind_dir, new_stem, Artifact, ArtifactStrategy, PendingArtifact};
use crate::compression::{ChecksumWriter, DEFAULT_COMPRESSION_LEVEL};
use crate::envelope::Envelope;
use crate::error::{BackupError, Result};
use crate::naming::extension_for;
use crate::snapshot::Collections;
use archivist_core::ArtifactKind;
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes snapshot collections as envelope artifacts under `<root>/<kind>/`.
#[derive(Debug, Clone)]
pub struct EnvelopeWriter {
    root: PathBuf,
}

impl EnvelopeWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Build the envelope and write it durably.
    ///
    /// The artifact is returned only after the file has been synced and
    /// renamed to its final name.
    pub async fn write(
        &self,
        collections: &Collections,
        kind: ArtifactKind,
        compressed: bool,
        created_by: &str,
    ) -> Result<Artifact> {
        let created_at = Utc::now();
        let envelope = Envelope::from_collections(collections, kind.as_str(), created_by, created_at)?;
        let dir = kind_dir(&self.root, kind);

        let artifact = tokio::task::spawn_blocking(move || {
            write_envelope(&dir, &envelope, kind, compressed, created_at)
        })
        .await??;

        info!(
            "Wrote {} backup {} ({} bytes)",
            kind, artifact.filename, artifact.size_bytes
        );
        Ok(artifact)
    }
}

fn write_envelope(
    dir: &Path,
    envelope: &Envelope,
    kind: ArtifactKind,
    compressed: bool,
    created_at: DateTime<Utc>,
) -> Result<Artifact> {
    let bytes = envelope.to_vec()?;
    let extension = extension_for(ArtifactStrategy::Envelope, compressed);

    let mut pending = PendingArtifact::reserve(dir, &new_stem(created_at), &extension)
        .map_err(BackupError::io(format!("Failed to create artifact in {}", dir.display())))?;
    let filename = pending.filename().to_string();
    let path = pending.final_path().to_path_buf();

    let file = pending
        .take_file()
        .map_err(BackupError::io("Failed to open artifact file"))?;
    let (file, checksum) = stream_bytes(file, &bytes, compressed)
        .map_err(BackupError::io(format!("Failed to write {}", filename)))?;
    let size_bytes = pending
        .commit(file)
        .map_err(BackupError::io(format!("Failed to finalize {}", filename)))?;

    Ok(Artifact {
        filename,
        kind,
        strategy: ArtifactStrategy::Envelope,
        compressed,
        path,
        size_bytes,
        created_at,
        checksum: Some(checksum),
    })
}

/// Write `bytes` to `file`, gzipping when asked; returns the file and the
/// checksum of what landed on disk.
fn stream_bytes(file: File, bytes: &[u8], compressed: bool) -> io::Result<(File, String)> {
    let mut writer = ChecksumWriter::new(file);

    if compressed {
        let mut encoder = GzEncoder::new(writer, Compression::new(DEFAULT_COMPRESSION_LEVEL));
        encoder.write_all(bytes)?;
        writer = encoder.finish()?;
    } else {
        writer.write_all(bytes)?;
    }

    let (file, checksum, _) = writer.finish()?;
    Ok((file, checksum))
}

//! Artifact strategies and on-disk artifact bookkeeping.
//!
//! Two interchangeable backends turn a snapshot into one durable file:
//! - [`EnvelopeWriter`]: collections + metadata + statistics as JSON, optionally gzipped
//! - [`TreeWriter`]: file roots streamed into one tar+gzip container
//!
//! Both write through [`PendingArtifact`], so a file only appears under its
//! final name once every byte has been flushed and synced.

mod envelope;
mod tree;

pub use envelope::EnvelopeWriter;
pub use tree::{TreeEntry, TreeEntryType, TreeManifest, TreeWriteResult, TreeWriter, MANIFEST_FILENAME};

use crate::naming::{self, artifact_filename, parse_filename};
use archivist_core::ArtifactKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// How an artifact was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStrategy {
    /// tar+gzip of file roots
    Tree,
    /// JSON envelope of structured collections
    Envelope,
}

impl fmt::Display for ArtifactStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactStrategy::Tree => write!(f, "tree"),
            ArtifactStrategy::Envelope => write!(f, "envelope"),
        }
    }
}

/// A durable backup file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub filename: String,
    pub kind: ArtifactKind,
    pub strategy: ArtifactStrategy,
    pub compressed: bool,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,

    /// SHA-256 of the file; known for artifacts this engine wrote
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Options for one backup call
#[derive(Debug, Clone)]
pub struct BackupOptions {
    /// Artifact backend
    pub strategy: ArtifactStrategy,

    /// Gzip envelope artifacts (tree artifacts are always compressed)
    pub compressed: bool,

    /// Overrides the configured `metadata.createdBy`
    pub created_by: Option<String>,

    /// Run the retention policy for the kind after a successful write
    pub auto_cleanup: bool,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            strategy: ArtifactStrategy::Envelope,
            compressed: true,
            created_by: None,
            auto_cleanup: true,
        }
    }
}

impl BackupOptions {
    /// Sets the strategy.
    pub fn with_strategy(mut self, strategy: ArtifactStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets envelope compression.
    pub fn with_compression(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    /// Sets the creator recorded in metadata.
    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    /// Sets whether retention runs afterwards.
    pub fn with_auto_cleanup(mut self, auto_cleanup: bool) -> Self {
        self.auto_cleanup = auto_cleanup;
        self
    }
}

/// Directory holding artifacts of one kind.
pub fn kind_dir(root: &Path, kind: ArtifactKind) -> PathBuf {
    root.join(kind.as_str())
}

/// An artifact being written under a temporary name.
///
/// The temporary file is created exclusively, so concurrent writers that
/// computed the same timestamp pick different sequence numbers. Dropping
/// without [`commit`](Self::commit) removes the partial file.
pub struct PendingArtifact {
    filename: String,
    final_path: PathBuf,
    temp_path: PathBuf,
    file: Option<File>,
    committed: bool,
}

impl PendingArtifact {
    /// Reserve `backup-<stem>[-n]<extension>` in `dir`.
    pub fn reserve(dir: &Path, stem: &str, extension: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;

        for sequence in 0..1000 {
            let filename = artifact_filename(stem, sequence, extension);
            let final_path = dir.join(&filename);
            if final_path.exists() {
                continue;
            }

            match Self::open_temp(final_path, filename) {
                Ok(pending) => return Ok(pending),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }

        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("No free artifact name for stem {}", stem),
        ))
    }

    /// Write to exactly `destination`; fails if it already exists.
    pub fn at(destination: &Path) -> io::Result<Self> {
        if destination.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", destination.display()),
            ));
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }

        let filename = destination
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Destination has no file name"))?;

        Self::open_temp(destination.to_path_buf(), filename)
    }

    fn open_temp(final_path: PathBuf, filename: String) -> io::Result<Self> {
        let temp_path = final_path.with_file_name(format!(".{}.partial", filename));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;

        Ok(Self {
            filename,
            final_path,
            temp_path,
            file: Some(file),
            committed: false,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Take the temporary file handle for writing.
    pub fn take_file(&mut self) -> io::Result<File> {
        self.file
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "Artifact file already taken"))
    }

    /// Move the finished temporary file to its final name. `file` must be the
    /// handle returned by [`take_file`](Self::take_file), fully written.
    pub fn commit(mut self, file: File) -> io::Result<u64> {
        file.sync_all()?;
        drop(file);

        fs::rename(&self.temp_path, &self.final_path)?;
        self.committed = true;

        let size = fs::metadata(&self.final_path)?.len();
        debug!("Committed artifact {} ({} bytes)", self.final_path.display(), size);
        Ok(size)
    }
}

impl Drop for PendingArtifact {
    fn drop(&mut self) {
        if !self.committed {
            self.file.take();
            if let Err(e) = fs::remove_file(&self.temp_path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove partial artifact {}: {}", self.temp_path.display(), e);
                }
            }
        }
    }
}

/// List artifacts of one kind from the filesystem, newest first.
///
/// Ordering uses the timestamp embedded in the filename, falling back to
/// the file's modification time for foreign names.
pub fn list_artifacts(root: &Path, kind: ArtifactKind) -> io::Result<Vec<Artifact>> {
    let dir = kind_dir(root, kind);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut artifacts = Vec::new();
    let mut order_keys = Vec::new();

    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let filename = entry.file_name().to_string_lossy().to_string();
        let Some(parsed) = parse_filename(&filename) else {
            continue;
        };

        let metadata = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };

        let created_at = match parsed.created_at {
            Some(ts) => ts,
            None => metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now()),
        };

        order_keys.push((created_at, parsed.sequence, filename.clone()));
        artifacts.push(Artifact {
            filename,
            kind,
            strategy: parsed.strategy,
            compressed: parsed.compressed,
            path: entry.path(),
            size_bytes: metadata.len(),
            created_at,
            checksum: None,
        });
    }

    let mut indexed: Vec<_> = order_keys.into_iter().zip(artifacts).collect();
    indexed.sort_by(|(a, _), (b, _)| b.cmp(a));

    Ok(indexed.into_iter().map(|(_, artifact)| artifact).collect())
}

/// Timestamp stem for a new artifact.
pub(crate) fn new_stem(now: DateTime<Utc>) -> String {
    naming::timestamp_stem(now)
}

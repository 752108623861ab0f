//! Restore engine
//!
//! Each restore call runs Locate → Load → Validate → Apply and stops at the
//! first failure. Nothing touches live state before validation succeeds.
//!
//! - Envelope artifacts are decompressed, validated and handed back to the
//!   caller; the engine never writes them to the live store itself.
//! - Tree artifacts are extracted into a [`RestoreSession`], checked against
//!   their manifest, then swapped into place one top-level entry at a time.

mod session;
mod swap;

pub use session::{RestoreSession, STAGING_DIR};

use crate::artifact::{kind_dir, ArtifactStrategy, TreeEntryType, TreeManifest, MANIFEST_FILENAME};
use crate::compression::gunzip_bytes;
use crate::envelope::{Envelope, EnvelopeMetadata, EnvelopeStatistics};
use crate::error::{BackupError, Result};
use crate::naming::{parse_filename, validate_filename};
use crate::snapshot::Collections;
use archivist_core::ArtifactKind;
use flate2::read::GzDecoder;
use serde_json::Value;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Entries};
use tracing::{debug, info, warn};

/// Validated envelope contents, returned to the caller for application
#[derive(Debug, Clone, PartialEq)]
pub struct RestoredEnvelope {
    pub filename: String,
    pub kind: ArtifactKind,
    pub metadata: EnvelopeMetadata,
    pub data: Value,
    pub statistics: EnvelopeStatistics,
}

impl RestoredEnvelope {
    /// Interpret `data` as named collections.
    pub fn collections(&self) -> Result<Collections> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            BackupError::validation(format!("Backup data is not a set of collections: {}", e))
        })
    }
}

/// One top-level entry put back in place
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredEntry {
    pub name: String,
    pub destination: PathBuf,
    pub kind: TreeEntryType,

    /// Whether a live copy was replaced (as opposed to created)
    pub replaced_existing: bool,
}

/// Result of a tree restore
#[derive(Debug, Clone)]
pub struct TreeRestoreReport {
    pub filename: String,
    pub kind: ArtifactKind,
    pub metadata: EnvelopeMetadata,
    pub statistics: EnvelopeStatistics,
    pub session_id: String,
    pub entries: Vec<RestoredEntry>,
}

/// What a restore produced
#[derive(Debug, Clone)]
pub enum RestoreOutcome {
    Envelope(RestoredEnvelope),
    Tree(TreeRestoreReport),
}

impl RestoreOutcome {
    pub fn metadata(&self) -> &EnvelopeMetadata {
        match self {
            RestoreOutcome::Envelope(envelope) => &envelope.metadata,
            RestoreOutcome::Tree(report) => &report.metadata,
        }
    }

    pub fn statistics(&self) -> &EnvelopeStatistics {
        match self {
            RestoreOutcome::Envelope(envelope) => &envelope.statistics,
            RestoreOutcome::Tree(report) => &report.statistics,
        }
    }
}

/// Resolves and restores artifacts under one backup root.
#[derive(Debug, Clone)]
pub struct RestoreEngine {
    root: PathBuf,
}

impl RestoreEngine {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of `filename` for `kind`; the only place it may live.
    pub fn locate(&self, kind: ArtifactKind, filename: &str) -> Result<PathBuf> {
        validate_filename(filename)?;

        let path = kind_dir(&self.root, kind).join(filename);
        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(BackupError::not_found(filename)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BackupError::not_found(filename)),
            Err(e) => Err(BackupError::io(format!("Failed to stat {}", path.display()))(e)),
        }
    }

    /// Restore `filename` of `kind`, dispatching on its strategy.
    pub async fn restore(&self, kind: ArtifactKind, filename: &str) -> Result<RestoreOutcome> {
        let path = self.locate(kind, filename)?;
        info!("Restoring {} backup {}", kind, filename);

        match classify(filename)? {
            ArtifactStrategy::Envelope => {
                let envelope = self.load_envelope_at(&path, kind, filename).await?;
                Ok(RestoreOutcome::Envelope(envelope))
            }
            ArtifactStrategy::Tree => {
                let report = self.restore_tree_at(path, kind, filename).await?;
                Ok(RestoreOutcome::Tree(report))
            }
        }
    }

    /// Load and validate an envelope artifact without applying it.
    pub async fn load_envelope(&self, kind: ArtifactKind, filename: &str) -> Result<RestoredEnvelope> {
        let path = self.locate(kind, filename)?;
        match classify(filename)? {
            ArtifactStrategy::Envelope => self.load_envelope_at(&path, kind, filename).await,
            ArtifactStrategy::Tree => Err(BackupError::validation(format!(
                "{} is a tree artifact, not an envelope",
                filename
            ))),
        }
    }

    /// Check an artifact is admissible without touching live state.
    /// For tree artifacts only the manifest is read.
    pub async fn inspect(
        &self,
        kind: ArtifactKind,
        filename: &str,
    ) -> Result<(EnvelopeMetadata, EnvelopeStatistics)> {
        let path = self.locate(kind, filename)?;

        match classify(filename)? {
            ArtifactStrategy::Envelope => {
                let envelope = self.load_envelope_at(&path, kind, filename).await?;
                Ok((envelope.metadata, envelope.statistics))
            }
            ArtifactStrategy::Tree => {
                let filename = filename.to_string();
                let (envelope, _) = tokio::task::spawn_blocking(move || {
                    let mut archive = open_archive(&path, &filename)?;
                    let mut entries = archive
                        .entries()
                        .map_err(BackupError::io(format!("Failed to read {}", filename)))?;
                    read_manifest(&mut entries, &filename)
                })
                .await??;
                Ok((envelope.metadata, envelope.statistics))
            }
        }
    }

    async fn load_envelope_at(
        &self,
        path: &Path,
        kind: ArtifactKind,
        filename: &str,
    ) -> Result<RestoredEnvelope> {
        let raw = tokio::fs::read(path)
            .await
            .map_err(BackupError::io(format!("Failed to read {}", filename)))?;

        let bytes = if is_compressed(filename) {
            tokio::task::spawn_blocking(move || gunzip_bytes(&raw))
                .await?
                .map_err(BackupError::io(format!("Failed to decompress {}", filename)))?
        } else {
            raw
        };

        let envelope = Envelope::parse(&bytes)?;
        debug!(
            "Validated envelope {} (version {}, {} collections)",
            filename, envelope.metadata.version, envelope.statistics.collections
        );

        Ok(RestoredEnvelope {
            filename: filename.to_string(),
            kind,
            metadata: envelope.metadata,
            data: envelope.data,
            statistics: envelope.statistics,
        })
    }

    async fn restore_tree_at(
        &self,
        path: PathBuf,
        kind: ArtifactKind,
        filename: &str,
    ) -> Result<TreeRestoreReport> {
        let root = self.root.clone();
        let filename = filename.to_string();

        tokio::task::spawn_blocking(move || {
            let session = RestoreSession::begin(&root)?;
            let result = restore_tree_blocking(&session, &path, kind, &filename);
            session.close();
            result
        })
        .await?
    }
}

fn classify(filename: &str) -> Result<ArtifactStrategy> {
    parse_filename(filename)
        .map(|name| name.strategy)
        .ok_or_else(|| BackupError::validation(format!("Not a backup artifact: {}", filename)))
}

fn is_compressed(filename: &str) -> bool {
    parse_filename(filename).is_some_and(|name| name.compressed)
}

fn open_archive(path: &Path, filename: &str) -> Result<Archive<GzDecoder<File>>> {
    let file = File::open(path).map_err(BackupError::io(format!("Failed to open {}", filename)))?;
    Ok(Archive::new(GzDecoder::new(file)))
}

/// Read the leading manifest entry and validate it as an envelope.
fn read_manifest<R: Read>(
    entries: &mut Entries<'_, R>,
    filename: &str,
) -> Result<(Envelope, TreeManifest)> {
    let mut first = match entries.next() {
        Some(entry) => entry.map_err(BackupError::io(format!("Failed to read {}", filename)))?,
        None => return Err(BackupError::validation(format!("{} is an empty archive", filename))),
    };

    let is_manifest = first
        .path()
        .map(|p| p.as_os_str() == MANIFEST_FILENAME)
        .unwrap_or(false);
    if !is_manifest {
        return Err(BackupError::validation(format!(
            "{} does not begin with {}",
            filename, MANIFEST_FILENAME
        )));
    }

    let mut bytes = Vec::new();
    first
        .read_to_end(&mut bytes)
        .map_err(BackupError::io(format!("Failed to read manifest of {}", filename)))?;

    let envelope = Envelope::parse(&bytes)?;
    let manifest = TreeManifest::from_envelope(&envelope)?;
    Ok((envelope, manifest))
}

/// Reject absolute paths, `..`, and anything outside a manifest entry.
fn check_entry_path(path: &Path, names: &HashSet<&str>) -> Result<()> {
    let mut components = path.components();
    let top = match components.next() {
        Some(Component::Normal(name)) => name.to_string_lossy(),
        _ => {
            return Err(BackupError::validation(format!(
                "Unsafe archive path: {}",
                path.display()
            )))
        }
    };

    if components.any(|c| !matches!(c, Component::Normal(_) | Component::CurDir)) {
        return Err(BackupError::validation(format!(
            "Unsafe archive path: {}",
            path.display()
        )));
    }

    if !names.contains(top.as_ref()) {
        return Err(BackupError::validation(format!(
            "Archive path {} is not listed in the manifest",
            path.display()
        )));
    }

    Ok(())
}

fn restore_tree_blocking(
    session: &RestoreSession,
    path: &Path,
    kind: ArtifactKind,
    filename: &str,
) -> Result<TreeRestoreReport> {
    let mut archive = open_archive(path, filename)?;
    let mut entries = archive
        .entries()
        .map_err(BackupError::io(format!("Failed to read {}", filename)))?;

    let (envelope, manifest) = read_manifest(&mut entries, filename)?;

    for entry in &manifest.entries {
        if !entry.source_path.is_absolute() || entry.source_path.file_name().is_none() {
            return Err(BackupError::validation(format!(
                "Manifest entry {} has an unusable source path: {}",
                entry.name,
                entry.source_path.display()
            )));
        }
    }

    // Stage
    let names: HashSet<&str> = manifest.entries.iter().map(|e| e.name.as_str()).collect();
    let mut staged_members = 0usize;
    for entry in entries {
        let mut entry = entry.map_err(BackupError::io(format!("Failed to read {}", filename)))?;
        let entry_path = entry
            .path()
            .map_err(BackupError::io(format!("Invalid path in {}", filename)))?
            .into_owned();

        check_entry_path(&entry_path, &names)?;

        let unpacked = entry.unpack_in(session.path()).map_err(BackupError::io(format!(
            "Failed to extract {} from {}",
            entry_path.display(),
            filename
        )))?;
        if !unpacked {
            return Err(BackupError::validation(format!(
                "Unsafe archive path: {}",
                entry_path.display()
            )));
        }
        staged_members += 1;
    }
    debug!("Staged {} archive members in session {}", staged_members, session.id());

    for entry in &manifest.entries {
        let staged = session.entry_path(&entry.name);
        let present = match fs::symlink_metadata(&staged) {
            Ok(meta) => match entry.kind {
                TreeEntryType::Directory => meta.is_dir(),
                TreeEntryType::File => !meta.is_dir(),
            },
            Err(_) => false,
        };
        if !present {
            return Err(BackupError::validation(format!(
                "Manifest entry {} is missing from {}",
                entry.name, filename
            )));
        }
    }

    // Apply
    let mut restored = Vec::with_capacity(manifest.entries.len());
    for entry in &manifest.entries {
        let staged = session.entry_path(&entry.name);
        let replaced_existing = swap::swap_into_place(&staged, &entry.source_path, session.id())
            .map_err(|e| {
                if !restored.is_empty() {
                    warn!(
                        "Tree restore of {} stopped at {}; {} of {} entries were already restored",
                        filename,
                        entry.name,
                        restored.len(),
                        manifest.entries.len()
                    );
                }
                BackupError::io(format!("Failed to restore {}", entry.source_path.display()))(e)
            })?;

        info!("Restored {} to {}", entry.name, entry.source_path.display());
        restored.push(RestoredEntry {
            name: entry.name.clone(),
            destination: entry.source_path.clone(),
            kind: entry.kind,
            replaced_existing,
        });
    }

    Ok(TreeRestoreReport {
        filename: filename.to_string(),
        kind,
        metadata: envelope.metadata,
        statistics: envelope.statistics,
        session_id: session.id().to_string(),
        entries: restored,
    })
}

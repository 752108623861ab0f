//! Staging area for one tree restore.

use crate::error::{BackupError, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Directory under the backup root that holds restore sessions
pub const STAGING_DIR: &str = ".staging";

/// A fresh staging directory owned by exactly one restore call.
///
/// The directory is removed by [`close`](Self::close) or, failing that,
/// when the session is dropped, so it never outlives the call.
#[derive(Debug)]
pub struct RestoreSession {
    id: String,
    dir: TempDir,
}

impl RestoreSession {
    /// Create a session under `<root>/.staging/`.
    pub fn begin(root: &Path) -> Result<Self> {
        let staging = root.join(STAGING_DIR);
        std::fs::create_dir_all(&staging).map_err(BackupError::io(format!(
            "Failed to create staging directory {}",
            staging.display()
        )))?;

        let dir = tempfile::Builder::new()
            .prefix("session-")
            .tempdir_in(&staging)
            .map_err(BackupError::io("Failed to create restore session"))?;

        let id = dir
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        debug!("Opened restore session {}", id);

        Ok(Self { id, dir })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Staged location of a top-level entry.
    pub fn entry_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Remove the staging directory now, logging rather than failing.
    pub fn close(self) {
        let id = self.id;
        if let Err(e) = self.dir.close() {
            warn!("Failed to remove restore session {}: {}", id, e);
        } else {
            debug!("Closed restore session {}", id);
        }
    }
}

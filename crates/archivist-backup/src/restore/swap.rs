//! Per-entry swap of a staged tree into its live location.
//!
//! For each top-level entry:
//! 1. move the staged copy next to the destination (`.<name>.incoming-<token>`)
//! 2. rename the live path aside (`.<name>.previous-<token>`)
//! 3. rename the incoming copy into place
//! 4. delete the aside copy
//!
//! Steps 2 and 3 are same-directory renames. If step 3 fails the aside copy
//! is renamed back, so a failure leaves the entry as it was.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Replace `destination` with `staged`. Returns whether something was
/// already present at `destination`.
pub(crate) fn swap_into_place(staged: &Path, destination: &Path, token: &str) -> io::Result<bool> {
    let (parent, name) = split_destination(destination)?;
    fs::create_dir_all(&parent)?;

    let incoming = parent.join(format!(".{}.incoming-{}", name, token));
    move_path(staged, &incoming)?;

    let aside = parent.join(format!(".{}.previous-{}", name, token));
    let replaced = fs::symlink_metadata(destination).is_ok();
    if replaced {
        if let Err(e) = fs::rename(destination, &aside) {
            remove_path(&incoming);
            return Err(e);
        }
    }

    if let Err(e) = fs::rename(&incoming, destination) {
        if replaced {
            if let Err(restore_err) = fs::rename(&aside, destination) {
                warn!(
                    "Failed to put {} back after a failed swap; previous copy kept at {}: {}",
                    destination.display(),
                    aside.display(),
                    restore_err
                );
            }
        }
        remove_path(&incoming);
        return Err(e);
    }

    if replaced {
        remove_path(&aside);
    }

    debug!("Swapped {} into place", destination.display());
    Ok(replaced)
}

fn split_destination(destination: &Path) -> io::Result<(PathBuf, String)> {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no final component", destination.display()),
            )
        })?;
    let parent = destination
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((parent, name))
}

/// Rename, falling back to a recursive copy when the rename crosses
/// filesystems. The source is left in place after a copy.
fn move_path(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            debug!(
                "Rename {} -> {} failed ({}), copying instead",
                from.display(),
                to.display(),
                rename_err
            );
            copy_recursive(from, to).inspect_err(|_| remove_path(to))
        }
    }
}

fn copy_recursive(from: &Path, to: &Path) -> io::Result<()> {
    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let rel_path = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let target = if rel_path.as_os_str().is_empty() {
            to.to_path_buf()
        } else {
            to.join(rel_path)
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(from)?, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, _to: &Path) -> io::Result<()> {
    warn!("Skipping symlink {}", from.display());
    Ok(())
}

fn remove_path(path: &Path) {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(_) => return,
    };
    if let Err(e) = result {
        warn!("Failed to remove {}: {}", path.display(), e);
    }
}

//! Path utilities

use anyhow::anyhow;
use std::path::PathBuf;

/// Get the per-user data directory used for the default backup root.
///
/// `ARCHIVIST_HOME` takes precedence so containers can relocate state,
/// then the platform data dir (`~/.local/share` on Linux).
pub fn get_data_dir() -> anyhow::Result<PathBuf> {
    if let Ok(home) = std::env::var("ARCHIVIST_HOME") {
        return Ok(PathBuf::from(home));
    }

    dirs::data_dir()
        .map(|d| d.join("archivist"))
        .ok_or_else(|| anyhow!("Could not determine data directory"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_get_data_dir_from_env() {
        std::env::set_var("ARCHIVIST_HOME", "/tmp/archivist-home");
        let dir = get_data_dir().unwrap();
        std::env::remove_var("ARCHIVIST_HOME");
        assert_eq!(dir, PathBuf::from("/tmp/archivist-home"));
    }
}

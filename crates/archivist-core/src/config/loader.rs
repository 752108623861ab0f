//! Configuration file loading and parsing
//!
//! Precedence (low to high):
//! 1. Built-in defaults
//! 2. `archivist.yaml` (explicit path, or searched upward from the current directory)
//! 3. Environment variables (`ARCHIVIST_*`)
//! 4. CLI flags (handled by caller)

use crate::error::{Error, Result};
use crate::types::{RetentionConfig, ScheduleConfig, SourceConfig, TreeConfig};
use crate::utils::get_data_dir;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use tracing::debug;

/// Configuration file names to search for
pub const CONFIG_FILE_NAMES: &[&str] = &["archivist.yaml", "archivist.yml"];

/// Maximum registry entries unless configured otherwise
pub const DEFAULT_REGISTRY_CAP: usize = 50;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Root backup directory; kind directories and the registry live beneath it
    pub backup_root: Utf8PathBuf,

    /// Default `metadata.createdBy` value
    pub created_by: String,

    /// Maximum number of registry entries
    pub registry_cap: usize,

    /// Per-kind retention counts
    pub retention: RetentionConfig,

    /// Scheduler settings
    pub schedule: ScheduleConfig,

    /// Tree artifact settings
    pub tree: TreeConfig,

    /// Live data locations for the bundled directory source
    pub source: SourceConfig,

    /// File this configuration was read from, if any
    #[serde(skip)]
    pub config_path: Option<Utf8PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backup_root: Utf8PathBuf::from("backups"),
            created_by: format!("archivist v{}", env!("CARGO_PKG_VERSION")),
            registry_cap: DEFAULT_REGISTRY_CAP,
            retention: RetentionConfig::default(),
            schedule: ScheduleConfig::default(),
            tree: TreeConfig::default(),
            source: SourceConfig::default(),
            config_path: None,
        }
    }
}

impl EngineConfig {
    /// Configuration rooted at `backup_root` with defaults for everything else.
    pub fn with_root(backup_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            backup_root: backup_root.into(),
            ..Self::default()
        }
    }

    /// Load configuration from the specified path or search for it.
    ///
    /// When no path is given and no file is found, defaults are used with the
    /// backup root placed in the per-user data directory.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self> {
        let found = match path {
            Some(p) => {
                let content = fs::read_to_string(p).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        Error::config_not_found(p.as_str())
                    } else {
                        Error::Io(e)
                    }
                })?;
                Some((p.to_owned(), content))
            }
            None => Self::find_config()?,
        };

        let mut config = match found {
            Some((config_path, content)) => {
                debug!("Loading configuration from {}", config_path);
                Self::from_yaml(&content, Some(config_path))?
            }
            None => {
                debug!("No configuration file found, using defaults");
                let data_dir = get_data_dir().map_err(|e| Error::invalid_config(e.to_string()))?;
                let data_dir = Utf8PathBuf::from_path_buf(data_dir)
                    .map_err(|_| Error::invalid_config("Data directory path is not valid UTF-8"))?;
                Self::with_root(data_dir.join("backups"))
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration text. Relative paths are resolved against the
    /// directory containing `config_path`.
    pub fn from_yaml(content: &str, config_path: Option<Utf8PathBuf>) -> Result<Self> {
        let mut config: EngineConfig = serde_yaml_ng::from_str(content)?;

        if let Some(base) = config_path.as_ref().and_then(|p| p.parent()) {
            config.resolve_relative_paths(base);
        }
        config.config_path = config_path;

        Ok(config)
    }

    fn resolve_relative_paths(&mut self, base: &Utf8Path) {
        let resolve = |p: &Utf8PathBuf| {
            if p.is_relative() && !base.as_str().is_empty() {
                base.join(p)
            } else {
                p.clone()
            }
        };

        self.backup_root = resolve(&self.backup_root);
        self.source.collections_dir = self.source.collections_dir.as_ref().map(resolve);
        self.source.file_roots = self.source.file_roots.iter().map(resolve).collect();
    }

    /// Search the current directory and its parents for a config file
    fn find_config() -> Result<Option<(Utf8PathBuf, String)>> {
        let cwd = env::current_dir().map_err(Error::Io)?;
        let cwd = Utf8PathBuf::try_from(cwd)
            .map_err(|_| Error::invalid_config("Current directory path is not valid UTF-8"))?;

        let mut current = cwd.as_path();

        loop {
            for name in CONFIG_FILE_NAMES {
                let path = current.join(name);
                if path.exists() {
                    let content = fs::read_to_string(&path)?;
                    return Ok(Some((path, content)));
                }
            }

            match current.parent() {
                Some(parent) => current = parent,
                None => return Ok(None),
            }
        }
    }

    /// Apply `ARCHIVIST_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = env::var("ARCHIVIST_BACKUP_ROOT") {
            self.backup_root = Utf8PathBuf::from(val);
        }

        if let Ok(val) = env::var("ARCHIVIST_INTERVAL_HOURS") {
            self.schedule.interval_hours = val.parse().map_err(|_| {
                Error::invalid_config("ARCHIVIST_INTERVAL_HOURS must be a valid number")
            })?;
        }

        if let Ok(val) = env::var("ARCHIVIST_KEEP_AUTO") {
            self.retention.auto = val
                .parse()
                .map_err(|_| Error::invalid_config("ARCHIVIST_KEEP_AUTO must be a valid number"))?;
        }

        if let Ok(val) = env::var("ARCHIVIST_KEEP_MANUAL") {
            self.retention.manual = val.parse().map_err(|_| {
                Error::invalid_config("ARCHIVIST_KEEP_MANUAL must be a valid number")
            })?;
        }

        Ok(())
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.registry_cap == 0 {
            return Err(Error::invalid_config("registry-cap must be at least 1"));
        }

        if self.schedule.interval_hours == 0 {
            return Err(Error::invalid_config(
                "schedule.interval-hours must be at least 1",
            ));
        }

        if self.tree.compression_level > 9 {
            return Err(Error::invalid_config(format!(
                "tree.compression-level must be 0-9, got {}",
                self.tree.compression_level
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.registry_cap, 50);
        assert_eq!(config.retention.auto, 10);
        assert_eq!(config.schedule.interval_hours, 24);
        assert_eq!(config.tree.compression_level, 9);
        assert!(config.created_by.starts_with("archivist v"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_resolves_relative_paths() {
        let yaml = r#"
backup-root: backups
retention:
  auto: 4
  manual: 7
source:
  collections-dir: data
  file-roots: [uploads, /srv/avatars]
"#;
        let config =
            EngineConfig::from_yaml(yaml, Some(Utf8PathBuf::from("/etc/archivist/archivist.yaml")))
                .unwrap();

        assert_eq!(config.backup_root, Utf8PathBuf::from("/etc/archivist/backups"));
        assert_eq!(config.retention.auto, 4);
        assert_eq!(config.retention.manual, 7);
        assert_eq!(
            config.source.collections_dir,
            Some(Utf8PathBuf::from("/etc/archivist/data"))
        );
        assert_eq!(
            config.source.file_roots,
            vec![
                Utf8PathBuf::from("/etc/archivist/uploads"),
                Utf8PathBuf::from("/srv/avatars")
            ]
        );
    }

    #[test]
    fn test_invalid_yaml() {
        let result = EngineConfig::from_yaml("registry-cap: [not, a, number]", None);
        assert!(matches!(result, Err(Error::YamlParse(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.registry_cap = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.schedule.interval_hours = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.tree.compression_level = 12;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_missing_file() {
        let result = EngineConfig::load(Some(Utf8Path::new("/nonexistent/archivist.yaml")));
        assert!(matches!(result, Err(Error::ConfigNotFound { .. })));
    }

    #[test]
    #[serial]
    fn test_load_explicit_file_with_env_override() {
        let temp_dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp_dir.path().join("archivist.yaml")).unwrap();
        fs::write(&path, "registry-cap: 20\nretention:\n  manual: 2\n").unwrap();

        env::set_var("ARCHIVIST_KEEP_MANUAL", "5");
        let config = EngineConfig::load(Some(&path));
        env::remove_var("ARCHIVIST_KEEP_MANUAL");

        let config = config.unwrap();
        assert_eq!(config.registry_cap, 20);
        assert_eq!(config.retention.manual, 5);
        assert_eq!(config.config_path, Some(path));
    }

    #[test]
    #[serial]
    fn test_env_override_invalid_number() {
        env::set_var("ARCHIVIST_INTERVAL_HOURS", "daily");
        let mut config = EngineConfig::default();
        let result = config.apply_env_overrides();
        env::remove_var("ARCHIVIST_INTERVAL_HOURS");

        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }
}

//! Configuration type definitions shared by the engine and CLI.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Who initiated a backup. Each kind has its own directory and retention count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Produced by the scheduler
    Auto,
    /// Produced on request (CLI `create`, API call)
    Manual,
}

impl ArtifactKind {
    /// Returns all kinds in lookup order.
    pub fn all() -> [ArtifactKind; 2] {
        [ArtifactKind::Manual, ArtifactKind::Auto]
    }

    /// Directory name under the backup root.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Auto => "auto",
            ArtifactKind::Manual => "manual",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ArtifactKind::Auto),
            "manual" => Ok(ArtifactKind::Manual),
            other => Err(Error::invalid_config(format!(
                "Unknown backup kind: {}. Valid kinds: auto, manual",
                other
            ))),
        }
    }
}

/// Per-kind retention counts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetentionConfig {
    /// Number of scheduler-created backups to keep
    #[serde(default = "default_keep_count")]
    pub auto: usize,

    /// Number of manually created backups to keep
    #[serde(default = "default_keep_count")]
    pub manual: usize,
}

impl RetentionConfig {
    /// Keep count configured for a kind.
    pub fn keep_for(&self, kind: ArtifactKind) -> usize {
        match kind {
            ArtifactKind::Auto => self.auto,
            ArtifactKind::Manual => self.manual,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            auto: default_keep_count(),
            manual: default_keep_count(),
        }
    }
}

/// Periodic backup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScheduleConfig {
    /// Hours between scheduled cycles
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,

    /// Gzip scheduled envelope artifacts
    #[serde(default = "default_true")]
    pub compressed: bool,

    /// Run retention after each scheduled backup
    #[serde(default = "default_true")]
    pub auto_cleanup: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_interval_hours(),
            compressed: true,
            auto_cleanup: true,
        }
    }
}

/// Tree artifact settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TreeConfig {
    /// Gzip level for tree artifacts (0-9)
    #[serde(default = "default_tree_compression_level")]
    pub compression_level: u32,

    /// Glob patterns excluded while walking file roots
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            compression_level: default_tree_compression_level(),
            exclude: Vec::new(),
        }
    }
}

/// Where the bundled directory source reads live data from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    /// Directory holding one `<collection>.json` array per collection
    #[serde(default)]
    pub collections_dir: Option<Utf8PathBuf>,

    /// Media trees captured by tree artifacts
    #[serde(default)]
    pub file_roots: Vec<Utf8PathBuf>,
}

fn default_keep_count() -> usize {
    10
}
fn default_interval_hours() -> u64 {
    24
}
fn default_tree_compression_level() -> u32 {
    9
}
fn default_true() -> bool {
    true
}

//! Glob exclusions applied while archiving file roots.
//!
//! Patterns match archive paths, i.e. paths that start with the top-level
//! entry name (`uploads/tmp/x.part`), so `**/*.tmp` and `uploads/cache/**`
//! both behave as expected.

use crate::error::{BackupError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;

/// Compiled exclusion patterns for tree artifacts.
#[derive(Debug, Clone)]
pub struct ExclusionConfig {
    globset: GlobSet,
    patterns: Vec<String>,
}

impl ExclusionConfig {
    /// Compile the given patterns. An invalid pattern is a validation error.
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();

        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                BackupError::validation(format!("Invalid exclusion pattern '{}': {}", pattern, e))
            })?;
            builder.add(glob);
        }

        let globset = builder.build().map_err(|e| {
            BackupError::validation(format!("Failed to build exclusion globset: {}", e))
        })?;

        Ok(Self {
            globset,
            patterns: patterns.to_vec(),
        })
    }

    /// No exclusions.
    pub fn none() -> Self {
        Self {
            globset: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }

    /// Checks if an archive path should be left out.
    pub fn should_exclude(&self, path: &Path) -> bool {
        self.globset.is_match(path)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for ExclusionConfig {
    fn default() -> Self {
        Self::none()
    }
}

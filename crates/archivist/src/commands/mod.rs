//! CLI command implementations

pub mod cleanup;
pub mod create;
pub mod delete;
pub mod list;
pub mod rebuild;
pub mod restore;
pub mod schedule;
pub mod verify;

use anyhow::{Context, Result};
use archivist_backup::{ArtifactStrategy, BackupEngine, DirectoryApplier, DirectorySnapshotSource, KindFilter};
use archivist_core::{ArtifactKind, EngineConfig};
use camino::Utf8Path;
use clap::ValueEnum;
use std::sync::Arc;

/// Artifact kind as accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Manual,
    Auto,
}

impl From<KindArg> for ArtifactKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Manual => ArtifactKind::Manual,
            KindArg::Auto => ArtifactKind::Auto,
        }
    }
}

/// Kind selector for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindFilterArg {
    All,
    Auto,
    Manual,
}

impl From<KindFilterArg> for KindFilter {
    fn from(filter: KindFilterArg) -> Self {
        match filter {
            KindFilterArg::All => KindFilter::All,
            KindFilterArg::Auto => KindFilter::Only(ArtifactKind::Auto),
            KindFilterArg::Manual => KindFilter::Only(ArtifactKind::Manual),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// Structured collections as one JSON document
    Envelope,
    /// Media file roots as a tar.gz archive
    Tree,
}

impl From<StrategyArg> for ArtifactStrategy {
    fn from(strategy: StrategyArg) -> Self {
        match strategy {
            StrategyArg::Envelope => ArtifactStrategy::Envelope,
            StrategyArg::Tree => ArtifactStrategy::Tree,
        }
    }
}

/// Load configuration from `--config` or the usual search path.
pub(crate) fn load_config(config_path: Option<&Utf8Path>) -> Result<EngineConfig> {
    EngineConfig::load(config_path).context("Failed to load configuration")
}

/// Engine over the bundled directory source. When a collections directory is
/// configured, restored data can be applied back into it.
pub(crate) fn build_engine(config: EngineConfig) -> Result<BackupEngine> {
    let source = Arc::new(DirectorySnapshotSource::from_config(&config.source));
    let collections_dir = config.source.collections_dir.clone();

    let mut engine = BackupEngine::new(config, source).context("Failed to initialize backup engine")?;
    if let Some(dir) = collections_dir {
        engine = engine.with_applier(Arc::new(DirectoryApplier::new(dir.into_std_path_buf())));
    }
    Ok(engine)
}

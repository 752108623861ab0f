//! # archivist-core
//!
//! Core library for the Archivist backup engine providing:
//! - Configuration file parsing (archivist.yaml) with environment overrides
//! - Configuration type definitions (retention, schedule, tree and source settings)
//! - Core error type shared by the engine and CLI

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use types::{ArtifactKind, RetentionConfig, ScheduleConfig, SourceConfig, TreeConfig};
pub use utils::get_data_dir;

//! Configuration loading and management

mod loader;

pub use loader::{EngineConfig, CONFIG_FILE_NAMES, DEFAULT_REGISTRY_CAP};

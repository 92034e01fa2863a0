//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML file loading
//! - Environment variable overrides
//! - Validation, including construction of the scoring models

pub mod loader;

pub use loader::{ConfigError, ConfigLoader, CONFIG_FILE, ENV_PREFIX, LOCAL_CONFIG_FILE};

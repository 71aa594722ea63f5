//! Persistent configuration.

pub mod config;

pub use config::{load_config, parse_config, ConfigError, FileConfig};

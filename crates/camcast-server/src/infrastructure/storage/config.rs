//! TOML configuration file.
//!
//! Every field is optional; a missing field takes the same default as
//! [`ServerConfig::default`].  Example:
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! port = 8080
//! write_timeout_ms = 2000
//! log_level = "info"
//!
//! [capture]
//! frames_dir = "/var/lib/camcast/frames"
//! fps = 15
//! jpeg_quality = 80
//!
//! [[controls]]
//! id = 1
//! name = "Brightness"
//! value = 128
//! min = 0
//! max = 255
//! ```
//!
//! Command-line flags override the file (see `main.rs`).

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use camcast_core::Control;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::config::{ServerConfig, DEFAULT_FPS, DEFAULT_PORT};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but makes no sense.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub capture: CaptureSection,
    #[serde(default)]
    pub controls: Vec<Control>,
}

/// Listener, timeouts and logging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// IP address to bind.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_request_line")]
    pub max_request_line: usize,
    /// Multipart boundary token.
    #[serde(default = "default_boundary")]
    pub boundary: String,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Capture source settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_dir: Option<PathBuf>,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: i32,
    #[serde(default = "default_fps_report_interval_secs")]
    pub fps_report_interval_secs: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_write_timeout_ms() -> u64 {
    ServerConfig::default().write_timeout.as_millis() as u64
}
fn default_request_timeout_ms() -> u64 {
    ServerConfig::default().request_timeout.as_millis() as u64
}
fn default_max_request_line() -> usize {
    ServerConfig::default().max_request_line
}
fn default_boundary() -> String {
    ServerConfig::default().boundary
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_fps() -> u32 {
    DEFAULT_FPS
}
fn default_jpeg_quality() -> i32 {
    ServerConfig::default().jpeg_quality
}
fn default_fps_report_interval_secs() -> u64 {
    ServerConfig::default().fps_report_interval.as_secs()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            write_timeout_ms: default_write_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            max_request_line: default_max_request_line(),
            boundary: default_boundary(),
            log_level: default_log_level(),
        }
    }
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            frames_dir: None,
            fps: default_fps(),
            jpeg_quality: default_jpeg_quality(),
            fps_report_interval_secs: default_fps_report_interval_secs(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Reads and parses the config file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read (including when it
/// does not exist: an explicitly named file must be present) and
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Parses config TOML.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed.
pub fn parse_config(content: &str) -> Result<FileConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

impl FileConfig {
    /// Validates the file and converts it to a [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unparsable bind address, a
    /// zero frame rate or a zero timeout.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let ip: IpAddr = self
            .server
            .bind_address
            .parse()
            .map_err(|e| ConfigError::Invalid {
                field: "server.bind_address",
                reason: format!("{e}"),
            })?;

        if self.capture.fps == 0 {
            return Err(ConfigError::Invalid {
                field: "capture.fps",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.server.write_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "server.write_timeout_ms",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.server.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "server.request_timeout_ms",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.server.boundary.is_empty() {
            return Err(ConfigError::Invalid {
                field: "server.boundary",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(ServerConfig {
            bind_addr: SocketAddr::new(ip, self.server.port),
            fps: self.capture.fps,
            frames_dir: self.capture.frames_dir.clone(),
            write_timeout: Duration::from_millis(self.server.write_timeout_ms),
            request_timeout: Duration::from_millis(self.server.request_timeout_ms),
            max_request_line: self.server.max_request_line.max(16),
            fps_report_interval: Duration::from_secs(self.capture.fps_report_interval_secs.max(1)),
            boundary: self.server.boundary.clone(),
            jpeg_quality: self.capture.jpeg_quality,
            controls: self.controls.clone(),
            log_level: self.server.log_level.clone(),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Server configuration types.
//!
//! [`ServerConfig`] is the single source of truth for all runtime settings.
//! It is built once at startup from the TOML file and the command line (see
//! `infrastructure::storage::config` and `main.rs`), or from defaults in
//! tests.
//!
//! Nothing in this module reads the environment or the file system; the
//! infrastructure layer populates the struct.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use camcast_core::domain::controls::DEFAULT_JPEG_QUALITY;
use camcast_core::protocol::mjpeg::DEFAULT_BOUNDARY;
use camcast_core::Control;

/// Default TCP port for the HTTP/MJPEG listener.
pub const DEFAULT_PORT: u16 = 8080;

/// Default capture rate in frames per second.
pub const DEFAULT_FPS: u32 = 15;

/// All runtime configuration for the broadcast server.
///
/// # Example
///
/// ```rust
/// use camcast_server::domain::ServerConfig;
///
/// let cfg = ServerConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 8080);
/// assert_eq!(cfg.fps, 15);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address and port the listener binds to.  Port `0` lets the OS pick one
    /// (tests use this).
    pub bind_addr: SocketAddr,

    /// Frames per second requested from the capture source.
    pub fps: u32,

    /// Directory of JPEG files replayed by the directory frame source.
    pub frames_dir: Option<PathBuf>,

    /// Deadline for writing one frame (or the stream preamble) to one
    /// subscriber.  A viewer that cannot keep up within this window is
    /// dropped so the others are not held back.
    pub write_timeout: Duration,

    /// How long a freshly accepted connection may take to send its first line.
    pub request_timeout: Duration,

    /// Upper bound on the bytes read for the request line.
    pub max_request_line: usize,

    /// Window over which the delivered frame rate is measured and logged.
    pub fps_report_interval: Duration,

    /// Multipart boundary token used on the stream.
    pub boundary: String,

    /// Initial JPEG quality shown on the control page.
    pub jpeg_quality: i32,

    /// Additional camera controls shown on the control page.
    pub controls: Vec<Control>,

    /// `tracing` filter used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for ServerConfig {
    /// | Field               | Default          |
    /// |---------------------|------------------|
    /// | bind_addr           | `0.0.0.0:8080`   |
    /// | fps                 | 15               |
    /// | frames_dir          | none             |
    /// | write_timeout       | 2 seconds        |
    /// | request_timeout     | 10 seconds       |
    /// | max_request_line    | 8 KiB            |
    /// | fps_report_interval | 10 seconds       |
    /// | boundary            | `camcastframe`   |
    /// | jpeg_quality        | 80               |
    /// | log_level           | `info`           |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            fps: DEFAULT_FPS,
            frames_dir: None,
            write_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
            max_request_line: 8 * 1024,
            fps_report_interval: Duration::from_secs(10),
            boundary: DEFAULT_BOUNDARY.to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            controls: Vec::new(),
            log_level: "info".to_string(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_binds_all_interfaces_on_8080() {
        // Arrange / Act
        let cfg = ServerConfig::default();

        // Assert
        assert!(cfg.bind_addr.ip().is_unspecified());
        assert_eq!(cfg.bind_addr.port(), 8080);
    }

    #[test]
    fn test_default_timeouts_are_positive() {
        let cfg = ServerConfig::default();
        assert!(cfg.write_timeout > Duration::ZERO);
        assert!(cfg.request_timeout > Duration::ZERO);
        assert!(cfg.fps_report_interval > Duration::ZERO);
    }

    #[test]
    fn test_default_has_no_frame_directory_and_no_extra_controls() {
        let cfg = ServerConfig::default();
        assert!(cfg.frames_dir.is_none());
        assert!(cfg.controls.is_empty());
        assert_eq!(cfg.jpeg_quality, 80);
    }
}

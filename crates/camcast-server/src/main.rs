//! camcast: webcam MJPEG broadcast server, entry point.
//!
//! Serves a live MJPEG stream plus a small set of HTML pages to any number of
//! viewers over plain TCP.  Capture runs only while at least one viewer is
//! subscribed to the stream.
//!
//! # Usage
//!
//! ```text
//! camcast-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>            TOML configuration file
//!   --bind <IP>                Address to listen on [default: 0.0.0.0]
//!   --port <PORT>              Port to listen on [default: 8080]
//!   --fps <N>                  Capture frame rate [default: 15]
//!   --frames-dir <DIR>         Directory of JPEG files to replay
//!   --write-timeout-ms <MS>    Per-viewer write deadline [default: 2000]
//!   --log-level <LEVEL>        Log level when RUST_LOG is unset [default: info]
//! ```
//!
//! Flags override the configuration file; every flag can also be set with
//! the matching `CAMCAST_*` environment variable.
//!
//! | URL                       | Response                          |
//! |---------------------------|-----------------------------------|
//! | `/`                       | frameset of controls + webcam     |
//! | `/webcam`                 | page embedding the stream         |
//! | `/control`                | control list                      |
//! | `/update?id=N&val=V`      | apply a control, then control list|
//! | `/stream`, `/*.jpg`       | the MJPEG stream                  |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use camcast_server::application::HtmlPageRenderer;
use camcast_server::domain::ServerConfig;
use camcast_server::infrastructure::frame_source::DirectoryFrameSource;
use camcast_server::infrastructure::storage::{load_config, FileConfig};
use camcast_server::infrastructure::StreamServer;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Webcam MJPEG broadcast server.
#[derive(Debug, Parser)]
#[command(
    name = "camcast-server",
    about = "Serves a live MJPEG webcam stream to browsers and media players",
    version
)]
struct Cli {
    /// TOML configuration file.  Flags below override its values.
    #[arg(long, env = "CAMCAST_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to listen on (`0.0.0.0` for all interfaces).
    #[arg(long, env = "CAMCAST_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "CAMCAST_PORT")]
    port: Option<u16>,

    /// Capture frame rate.
    #[arg(long, env = "CAMCAST_FPS")]
    fps: Option<u32>,

    /// Directory of JPEG files replayed as the camera feed.
    #[arg(long, env = "CAMCAST_FRAMES_DIR")]
    frames_dir: Option<PathBuf>,

    /// Deadline in milliseconds for writing one frame to one viewer.
    #[arg(long, env = "CAMCAST_WRITE_TIMEOUT_MS")]
    write_timeout_ms: Option<u64>,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, env = "CAMCAST_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Loads the config file (if any), applies the flags on top and
    /// validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded or the merged
    /// values are invalid (bad bind address, zero fps, ...).
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let mut file = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => FileConfig::default(),
        };

        if let Some(bind) = self.bind {
            file.server.bind_address = bind;
        }
        if let Some(port) = self.port {
            file.server.port = port;
        }
        if let Some(fps) = self.fps {
            file.capture.fps = fps;
        }
        if let Some(dir) = self.frames_dir {
            file.capture.frames_dir = Some(dir);
        }
        if let Some(ms) = self.write_timeout_ms {
            file.server.write_timeout_ms = ms;
        }
        if let Some(level) = self.log_level {
            file.server.log_level = level;
        }

        file.to_server_config().context("invalid configuration")
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_server_config()?;

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let frames_dir = config
        .frames_dir
        .clone()
        .context("no frame directory configured: pass --frames-dir or set capture.frames_dir")?;
    let source = DirectoryFrameSource::open(&frames_dir, config.fps)
        .with_context(|| format!("cannot replay frames from {}", frames_dir.display()))?;

    let server = StreamServer::bind(
        config,
        Arc::new(source),
        Arc::new(HtmlPageRenderer::default()),
    )
    .await?;

    info!(
        "camcast {} serving http://{}/",
        env!("CARGO_PKG_VERSION"),
        server.local_addr()
    );

    tokio::select! {
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("received Ctrl+C, initiating graceful shutdown"),
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        },
        () = server.acceptor_stopped() => warn!("accept loop stopped on its own"),
    }

    server.shutdown().await?;
    info!("camcast stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cli_without_flags_produces_default_config() {
        // Arrange
        let cli = Cli::parse_from(["camcast-server"]);

        // Act
        let config = cli.into_server_config().expect("config");

        // Assert
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_cli_port_override() {
        let cli = Cli::parse_from(["camcast-server", "--port", "9999"]);
        let config = cli.into_server_config().expect("config");
        assert_eq!(config.bind_addr.port(), 9999);
    }

    #[test]
    fn test_cli_bind_override() {
        let cli = Cli::parse_from(["camcast-server", "--bind", "127.0.0.1"]);
        let config = cli.into_server_config().expect("config");
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn test_cli_fps_and_frames_dir_override() {
        let cli = Cli::parse_from(["camcast-server", "--fps", "30", "--frames-dir", "/srv/frames"]);
        let config = cli.into_server_config().expect("config");
        assert_eq!(config.fps, 30);
        assert_eq!(config.frames_dir, Some(PathBuf::from("/srv/frames")));
    }

    #[test]
    fn test_cli_write_timeout_override() {
        let cli = Cli::parse_from(["camcast-server", "--write-timeout-ms", "250"]);
        let config = cli.into_server_config().expect("config");
        assert_eq!(config.write_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_cli_invalid_bind_returns_error() {
        // Arrange
        let cli = Cli::parse_from(["camcast-server", "--bind", "not.an.ip"]);

        // Act
        let result = cli.into_server_config();

        // Assert: must return an error, not panic
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_zero_fps_returns_error() {
        let cli = Cli::parse_from(["camcast-server", "--fps", "0"]);
        assert!(cli.into_server_config().is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        // Arrange
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("camcast.toml");
        std::fs::write(&path, "[server]\nport = 7000\n[capture]\nfps = 5\n").expect("write");
        let path_arg = path.to_string_lossy().into_owned();

        // Act
        let cli = Cli::parse_from(["camcast-server", "--config", path_arg.as_str(), "--fps", "20"]);
        let config = cli.into_server_config().expect("config");

        // Assert
        assert_eq!(config.bind_addr.port(), 7000);
        assert_eq!(config.fps, 20);
    }

    #[test]
    fn test_missing_config_file_returns_error() {
        let cli = Cli::parse_from(["camcast-server", "--config", "/nonexistent/camcast.toml"]);
        assert!(cli.into_server_config().is_err());
    }
}

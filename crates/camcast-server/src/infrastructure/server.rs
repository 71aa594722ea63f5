//! Server wiring and ordered shutdown.
//!
//! [`StreamServer::bind`] builds the whole object graph:
//!
//! ```text
//! FrameSource ◄── CaptureLifecycleController ◄── ClientRegistry ◄── FrameBroadcaster
//!      │                                               ▲                  ▲
//!      └──────────── Weak<dyn FrameSink> ──────────────┼──────────────────┘
//!                                                      │
//!                         Acceptor ── ConnectionContext┘
//! ```
//!
//! and returns a [`ServerHandle`].  The handle owns the broadcaster (the
//! source only holds a `Weak` to it) and the accept task.
//!
//! # Shutdown order
//!
//! 1. Signal the acceptor and wait for its task; the listener is closed.
//! 2. Stop capture.
//! 3. Close the registry (no new subscribers) and close every subscriber.
//!
//! Capture stops before subscribers are closed, so no frame is written to a
//! connection that is being torn down.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use camcast_core::{ControlPanel, FrameSink, FrameSource, MjpegFraming};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::application::{
    CaptureLifecycleController, ClientRegistry, FrameBroadcaster, PageRenderer,
};
use crate::domain::ServerConfig;
use crate::infrastructure::acceptor::{bind_listener, Acceptor};
use crate::infrastructure::connection::ConnectionContext;

/// Errors raised by the server itself (not by individual connections).
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("listener failed: {0}")]
    Accept(#[source] std::io::Error),

    #[error("accept task ended abnormally: {0}")]
    AcceptTask(#[from] tokio::task::JoinError),
}

/// Entry point: binds the listener and starts accepting viewers.
pub struct StreamServer;

impl StreamServer {
    /// Binds `config.bind_addr`, registers the broadcaster with `source` and
    /// spawns the accept loop.  Capture is not started until the first viewer
    /// subscribes.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the listener cannot be bound.
    pub async fn bind(
        config: ServerConfig,
        source: Arc<dyn FrameSource>,
        renderer: Arc<dyn PageRenderer>,
    ) -> Result<ServerHandle, ServerError> {
        let listener = bind_listener(config.bind_addr).map_err(|source| ServerError::Bind {
            addr: config.bind_addr,
            source,
        })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: config.bind_addr,
            source,
        })?;

        let framing = MjpegFraming::new(config.boundary.clone());
        let capture = Arc::new(CaptureLifecycleController::new(Arc::clone(&source)));
        let registry = Arc::new(ClientRegistry::new(Arc::clone(&capture)));
        let broadcaster = Arc::new(FrameBroadcaster::new(
            Arc::clone(&registry),
            framing.clone(),
            config.write_timeout,
            config.fps_report_interval,
        ));
        let sink: Arc<dyn FrameSink> = broadcaster.clone();
        source.register_callback(Arc::downgrade(&sink));

        let controls = ControlPanel::new(config.jpeg_quality, config.controls.clone());
        let context = Arc::new(ConnectionContext {
            registry: Arc::clone(&registry),
            renderer,
            controls: Arc::new(Mutex::new(controls)),
            framing,
            request_timeout: config.request_timeout,
            write_timeout: config.write_timeout,
            max_request_line: config.max_request_line,
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (stopped_tx, stopped_rx) = watch::channel(false);
        let acceptor = Acceptor::new(listener, context);
        let accept_task = tokio::spawn(async move {
            let result = acceptor.run(shutdown_rx).await;
            stopped_tx.send_replace(true);
            result
        });

        info!("camcast listening on {local_addr}");

        Ok(ServerHandle {
            local_addr,
            registry,
            capture,
            _broadcaster: broadcaster,
            shutdown_tx,
            acceptor_stopped: stopped_rx,
            accept_task: tokio::sync::Mutex::new(Some(accept_task)),
            shut_down: AtomicBool::new(false),
        })
    }
}

/// A running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    registry: Arc<ClientRegistry>,
    capture: Arc<CaptureLifecycleController>,
    /// Keeps the sink alive; the source only holds a `Weak`.
    _broadcaster: Arc<FrameBroadcaster>,
    shutdown_tx: watch::Sender<bool>,
    acceptor_stopped: watch::Receiver<bool>,
    accept_task: tokio::sync::Mutex<Option<JoinHandle<Result<(), ServerError>>>>,
    shut_down: AtomicBool,
}

impl ServerHandle {
    /// The address the listener is bound to (useful with port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub fn capture(&self) -> &Arc<CaptureLifecycleController> {
        &self.capture
    }

    /// Resolves once the accept loop has ended, for whatever reason.
    pub async fn acceptor_stopped(&self) {
        let mut stopped = self.acceptor_stopped.clone();
        // An error means the task is gone, which also counts as stopped.
        let _ = stopped.wait_for(|stopped| *stopped).await;
    }

    /// Stops the server in order.  Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the accept loop's own error if it had already failed before
    /// shutdown was requested.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("shutting down");

        self.shutdown_tx.send_replace(true);
        let accept_result = match self.accept_task.lock().await.take() {
            Some(task) => task.await.map_err(ServerError::from).and_then(|r| r),
            None => Ok(()),
        };
        if let Err(e) = &accept_result {
            error!("accept loop ended with an error: {e}");
        }

        self.capture.stop();

        let remaining = self.registry.close();
        let closed = remaining.len();
        for subscriber in remaining {
            subscriber.close().await;
        }

        info!(viewers_closed = closed, "server stopped");
        accept_result
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

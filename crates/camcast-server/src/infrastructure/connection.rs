//! Per-connection worker and the socket-backed subscription.
//!
//! Every accepted connection runs [`handle_connection`] in its own task:
//!
//! 1. Read one request line (bounded in length and time).
//! 2. Classify it.
//! 3. Either answer with a page and close, or write the stream preamble and
//!    promote the connection to a [`ClientSubscription`] in the registry.
//!
//! A promoted connection is not closed when the worker returns.  From then
//! on it is written to by the broadcaster and closed by whichever path gives
//! up on it first: a failed write, the peer hanging up, or server shutdown.
//! "Hanging up" means end of stream on the read side.  A client that
//! half-closes after its request (`nc -N`, `shutdown(SHUT_WR)`) is therefore
//! treated as gone and its connection is closed.
//!
//! The worker is generic over the stream type so tests can drive it with an
//! in-memory duplex pipe instead of a socket.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use camcast_core::protocol::mjpeg::PART_TRAILER;
use camcast_core::protocol::request::strip_line_terminator;
use camcast_core::{
    classify, ClassificationError, ControlPanel, Frame, MjpegFraming, RequestAction,
};
use thiserror::Error;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::application::pages::{PageRenderer, RenderError};
use crate::application::registry::{ClientRegistry, RegistryError, SendFailure, Subscriber};
use crate::domain::ConnectionId;

// ── Shared context ────────────────────────────────────────────────────────────

/// Everything a connection worker needs, shared by all workers.
pub struct ConnectionContext {
    pub registry: Arc<ClientRegistry>,
    pub renderer: Arc<dyn PageRenderer>,
    pub controls: Arc<Mutex<ControlPanel>>,
    pub framing: MjpegFraming,
    pub request_timeout: Duration,
    pub write_timeout: Duration,
    pub max_request_line: usize,
}

impl ConnectionContext {
    fn lock_controls(&self) -> MutexGuard<'_, ControlPanel> {
        self.controls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Why a connection was closed without being served.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to read request line: {0}")]
    Read(#[source] std::io::Error),

    #[error("no request line within {0:?}")]
    RequestTimeout(Duration),

    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error("failed to render page: {0}")]
    Render(#[from] RenderError),

    #[error("failed to write response: {0}")]
    Write(#[source] std::io::Error),

    #[error("response not written within {0:?}")]
    WriteTimeout(Duration),

    #[error("subscription rejected: {0}")]
    Registry(#[from] RegistryError),
}

enum Outcome {
    Responded(RequestAction),
    Subscribed,
}

// ── Worker ────────────────────────────────────────────────────────────────────

/// Serves one accepted connection and logs the outcome.
pub async fn handle_connection<S>(
    id: ConnectionId,
    stream: S,
    peer: SocketAddr,
    ctx: Arc<ConnectionContext>,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    match serve_connection(id, stream, peer, &ctx).await {
        Ok(Outcome::Responded(action)) => {
            debug!(connection = %id, %peer, %action, "response sent, connection closed")
        }
        Ok(Outcome::Subscribed) => {}
        Err(ConnectionError::Classification(e)) => debug!(connection = %id, %peer, "{e}"),
        Err(e) => warn!(connection = %id, %peer, "connection closed: {e}"),
    }
}

async fn serve_connection<S>(
    id: ConnectionId,
    stream: S,
    peer: SocketAddr,
    ctx: &ConnectionContext,
) -> Result<Outcome, ConnectionError>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (read_half, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    let line = timeout(
        ctx.request_timeout,
        read_request_line(&mut reader, ctx.max_request_line),
    )
    .await
    .map_err(|_| ConnectionError::RequestTimeout(ctx.request_timeout))?
    .map_err(ConnectionError::Read)?;

    let action = classify(line.as_deref())?;
    let line = line.unwrap_or_default();
    debug!(
        connection = %id,
        %peer,
        request = strip_line_terminator(&line),
        %action,
        "request classified"
    );

    let response = match action {
        RequestAction::VideoStream => {
            subscribe(id, peer, reader, writer, ctx).await?;
            return Ok(Outcome::Subscribed);
        }
        RequestAction::MainPage => ctx.renderer.render_main()?,
        RequestAction::WebcamPage => ctx.renderer.render_webcam()?,
        RequestAction::ControlPage => render_controls(ctx)?,
        RequestAction::UpdateControlValue => update_controls(ctx, &line)?,
    };

    write_within(&mut writer, &response, ctx.write_timeout).await?;
    // Best effort: the peer may already be gone.
    let _ = writer.shutdown().await;
    Ok(Outcome::Responded(action))
}

fn render_controls(ctx: &ConnectionContext) -> Result<Vec<u8>, RenderError> {
    let panel = ctx.lock_controls();
    ctx.renderer.render_control_list(&panel)
}

fn update_controls(ctx: &ConnectionContext, line: &str) -> Result<Vec<u8>, RenderError> {
    let mut panel = ctx.lock_controls();
    ctx.renderer.apply_control_update(&mut panel, line)?;
    ctx.renderer.render_control_list(&panel)
}

/// Writes the stream preamble and registers the connection as a subscriber.
async fn subscribe<R, W>(
    id: ConnectionId,
    peer: SocketAddr,
    reader: R,
    mut writer: W,
    ctx: &ConnectionContext,
) -> Result<(), ConnectionError>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    write_within(&mut writer, &ctx.framing.preamble(), ctx.write_timeout).await?;

    let subscription = Arc::new(ClientSubscription::new(id, peer, writer));
    if let Err(e) = ctx.registry.add(subscription.clone()) {
        subscription.close().await;
        return Err(e.into());
    }

    info!(connection = %id, %peer, viewers = ctx.registry.len(), "viewer subscribed");
    tokio::spawn(watch_for_hangup(
        reader,
        subscription,
        Arc::clone(&ctx.registry),
    ));
    Ok(())
}

/// Removes the subscription as soon as the peer hangs up.
///
/// Anything the peer sends after the request line is discarded.  End of
/// stream counts as a hangup, including a peer that only half-closed its
/// sending side.
/// The task ends early when the subscription is closed by another path.
async fn watch_for_hangup<R, W>(
    mut reader: R,
    subscription: Arc<ClientSubscription<W>>,
    registry: Arc<ClientRegistry>,
) where
    R: AsyncRead + Send + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let mut closed = subscription.closed_signal();
    let mut scratch = [0u8; 512];

    let hung_up = async {
        loop {
            match reader.read(&mut scratch).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    };

    // The `Ref` returned by `wait_for` must not outlive this branch.
    let closed_elsewhere = async move {
        let _ = closed.wait_for(|closed| *closed).await;
    };

    tokio::select! {
        () = closed_elsewhere => {}
        () = hung_up => {
            if registry.remove(subscription.id()).is_some() {
                info!(connection = %subscription.id(), peer = %subscription.peer(), "viewer disconnected");
            }
            subscription.close().await;
        }
    }
}

/// Reads one line of at most `max_len` bytes.
///
/// Returns `Ok(None)` if the peer closed the connection before sending
/// anything.  A line longer than `max_len` is truncated; bytes that are not
/// valid UTF-8 are replaced.
pub async fn read_request_line<R>(reader: &mut R, max_len: usize) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let read = reader
        .take(max_len as u64)
        .read_until(b'\n', &mut buf)
        .await?;

    if read == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

async fn write_within<W>(writer: &mut W, bytes: &[u8], limit: Duration) -> Result<(), ConnectionError>
where
    W: AsyncWrite + Unpin,
{
    let write = async {
        writer.write_all(bytes).await?;
        writer.flush().await
    };
    timeout(limit, write)
        .await
        .map_err(|_| ConnectionError::WriteTimeout(limit))?
        .map_err(ConnectionError::Write)
}

// ── Subscription ──────────────────────────────────────────────────────────────

/// A stream viewer backed by the write half of its connection.
///
/// The writer sits behind an async mutex so a frame write and a concurrent
/// close never interleave.  After [`close`](Subscriber::close) the writer is
/// gone and further sends fail with [`SendFailure::Closed`].
pub struct ClientSubscription<W> {
    id: ConnectionId,
    peer: SocketAddr,
    writer: tokio::sync::Mutex<Option<W>>,
    closed: watch::Sender<bool>,
}

impl<W> ClientSubscription<W> {
    pub fn new(id: ConnectionId, peer: SocketAddr, writer: W) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id,
            peer,
            writer: tokio::sync::Mutex::new(Some(writer)),
            closed,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// A receiver that flips to `true` once the subscription is closed.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }
}

#[async_trait]
impl<W> Subscriber for ClientSubscription<W>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send_frame(
        &self,
        frame: &Frame<'_>,
        framing: &MjpegFraming,
    ) -> Result<(), SendFailure> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(SendFailure::Closed)?;

        let header = framing.part_header(frame.len(), frame.capture_timestamp_us);
        writer.write_all(&header).await?;
        writer.write_all(frame.payload).await?;
        writer.write_all(PART_TRAILER).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&self) {
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                debug!(connection = %self.id, "error while closing viewer connection: {e}");
            }
        }
        self.closed.send_replace(true);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

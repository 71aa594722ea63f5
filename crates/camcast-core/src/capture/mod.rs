//! The capture producer seam.
//!
//! A capture backend implements [`FrameSource`].  The server registers a
//! [`FrameSink`] with it, then starts the source when the first viewer
//! subscribes and stops it when the last one leaves.
//!
//! # Delivery contract
//!
//! - The source calls [`FrameSink::next_frame`] serially: it awaits each call
//!   before producing the next frame, so two frames are never in flight.
//! - The [`Frame`] passed to the sink borrows the source's buffer.  Once the
//!   call returns, the source may overwrite that buffer.
//! - A failure inside the source is reported once through
//!   [`FrameSink::exception_received`]; the session then ends.
//!
//! # Callback ownership
//!
//! The sink is registered as a `Weak` reference.  The server owns the sink
//! (the broadcaster), and the broadcaster indirectly owns the source through
//! the capture controller; a strong reference here would form a cycle.

use std::sync::Weak;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::frame::Frame;

/// Errors raised by a capture backend.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no frame sink registered with the capture source")]
    NoSink,
    #[error("capture source has no frames to deliver")]
    NoFrames,
    #[error("failed to read frame {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("capture device error: {0}")]
    Device(String),
}

/// Receives frames from a [`FrameSource`].
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Called once per captured frame, never concurrently.
    async fn next_frame(&self, frame: &Frame<'_>);

    /// Called when the source hits an unrecoverable error.
    fn exception_received(&self, error: CaptureError);
}

/// A producer of encoded frames.
///
/// `start` and `stop` are synchronous and must not block on frame delivery:
/// they may be called from inside [`FrameSink::next_frame`] (a viewer write
/// failing during a broadcast can stop the capture).
pub trait FrameSource: Send + Sync {
    /// Registers the sink that receives every frame.
    fn register_callback(&self, sink: Weak<dyn FrameSink>);

    /// Begins producing frames.
    fn start(&self) -> Result<(), CaptureError>;

    /// Stops producing frames.  A frame already being delivered completes.
    fn stop(&self) -> Result<(), CaptureError>;
}

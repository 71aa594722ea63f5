//! Captured frames and frame-rate measurement.
//!
//! # Ownership of frame bytes
//!
//! A capture backend owns the buffer that holds an encoded frame.  It lends
//! the buffer to the broadcaster for exactly one call and reuses it for the
//! next capture once the call returns.  [`Frame`] encodes that contract in
//! its lifetime parameter: the payload is a `&'a [u8]`, so nothing can keep
//! the bytes after the broadcast call without copying them explicitly (for
//! example with [`Frame::to_owned_payload`]).

use std::time::{Duration, Instant};

/// One encoded frame, borrowed from the producer for a single delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Capture time in microseconds, as reported by the producer.
    pub capture_timestamp_us: u64,
    /// Monotonically increasing sequence number assigned by the producer.
    pub sequence: u64,
    /// The encoded image (a complete JPEG for MJPEG streaming).
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Creates a frame borrowing `payload`.
    pub fn new(sequence: u64, capture_timestamp_us: u64, payload: &'a [u8]) -> Self {
        Self {
            capture_timestamp_us,
            sequence,
            payload,
        }
    }

    /// Length of the payload in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns `true` when the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Copies the payload out of the producer's buffer.
    pub fn to_owned_payload(&self) -> Vec<u8> {
        self.payload.to_vec()
    }
}

/// Measures the rate at which frames are delivered.
///
/// Call [`record`](Self::record) once per delivered frame.  When at least
/// `window` has elapsed since the first frame of the current window, it
/// returns the measured frames per second and starts a new window.
#[derive(Debug, Clone)]
pub struct FrameRateMeter {
    window: Duration,
    window_start: Option<Instant>,
    frames: u64,
}

impl FrameRateMeter {
    /// Creates a meter reporting once per `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            window_start: None,
            frames: 0,
        }
    }

    /// Records one frame delivered at `now`.
    ///
    /// Returns `Some(fps)` when the current window has closed.
    pub fn record(&mut self, now: Instant) -> Option<f32> {
        let start = match self.window_start {
            Some(start) => start,
            None => {
                self.window_start = Some(now);
                self.frames = 1;
                return None;
            }
        };

        self.frames += 1;
        let elapsed = now.saturating_duration_since(start);
        if elapsed < self.window || elapsed.is_zero() {
            return None;
        }

        // Frames after the first one span `elapsed`.
        let fps = (self.frames - 1) as f32 / elapsed.as_secs_f32();
        self.reset();
        Some(fps)
    }

    /// Discards the current window, e.g. when the capture session restarts.
    pub fn reset(&mut self) {
        self.window_start = None;
        self.frames = 0;
    }
}

impl Default for FrameRateMeter {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

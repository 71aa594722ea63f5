//! Hand-driven frame source for unit and integration tests.
//!
//! Tests call [`ManualFrameSource::deliver`] to push a frame through the
//! registered sink exactly when they want, and [`ManualFrameSource::raise`]
//! to simulate a device failure.  Start and stop calls are counted so tests
//! can check the capture lifecycle.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use camcast_core::{CaptureError, Frame, FrameSink, FrameSource};

/// A [`FrameSource`] whose frames are delivered by the test itself.
pub struct ManualFrameSource {
    sink: Mutex<Option<Weak<dyn FrameSink>>>,
    running: AtomicBool,
    fail_next_start: AtomicBool,
    start_calls: AtomicU32,
    stop_calls: AtomicU32,
    sequence: AtomicU64,
}

impl ManualFrameSource {
    pub fn new() -> Self {
        Self {
            sink: Mutex::new(None),
            running: AtomicBool::new(false),
            fail_next_start: AtomicBool::new(false),
            start_calls: AtomicU32::new(0),
            stop_calls: AtomicU32::new(0),
            sequence: AtomicU64::new(0),
        }
    }

    /// Delivers one frame to the sink if the source is running.
    ///
    /// Returns `false` when nothing was delivered (stopped, or no live sink).
    pub async fn deliver(&self, payload: &[u8]) -> bool {
        if !self.is_running() {
            return false;
        }
        let Some(sink) = self.live_sink() else {
            return false;
        };

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let frame = Frame::new(sequence, now_us(), payload);
        sink.next_frame(&frame).await;
        true
    }

    /// Reports `error` to the sink, as a failing device would.
    pub fn raise(&self, error: CaptureError) {
        if let Some(sink) = self.live_sink() {
            sink.exception_received(error);
        }
    }

    /// Makes the next `start` call fail with a device error.
    pub fn fail_next_start(&self) {
        self.fail_next_start.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of `start` calls received (including failed ones).
    pub fn start_calls(&self) -> u32 {
        self.start_calls.load(Ordering::SeqCst)
    }

    /// Number of `stop` calls received.
    pub fn stop_calls(&self) -> u32 {
        self.stop_calls.load(Ordering::SeqCst)
    }

    fn live_sink(&self) -> Option<std::sync::Arc<dyn FrameSink>> {
        self.sink
            .lock()
            .expect("lock poisoned")
            .as_ref()
            .and_then(Weak::upgrade)
    }
}

impl Default for ManualFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for ManualFrameSource {
    fn register_callback(&self, sink: Weak<dyn FrameSink>) {
        *self.sink.lock().expect("lock poisoned") = Some(sink);
    }

    fn start(&self) -> Result<(), CaptureError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_start.swap(false, Ordering::SeqCst) {
            return Err(CaptureError::Device("simulated start failure".to_string()));
        }
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), CaptureError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}

fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

//! Capture lifecycle use case.
//!
//! [`CaptureLifecycleController`] turns "a viewer arrived" and "the last
//! viewer left" into start/stop calls on the [`FrameSource`].  Both calls are
//! idempotent: the controller keeps its own running flag and only forwards a
//! real transition to the source.
//!
//! Source errors never propagate to the caller.  The caller is usually the
//! registry (holding its lock) or the broadcaster (mid-frame), and neither
//! has anything useful to do with a failed device call, so the error is
//! logged and the flag reflects what actually happened.
//!
//! A start that the source refused is remembered as pending.  The registry
//! retries it on every later add, so a transient device error does not leave
//! viewers registered with capture idle.  A stop clears the pending start.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camcast_core::FrameSource;
use tracing::{error, info};

#[derive(Debug, Default)]
struct CaptureState {
    running: bool,
    /// The last start attempt failed and no stop has happened since.
    start_pending: bool,
}

/// Idempotent start/stop of the capture producer.
pub struct CaptureLifecycleController {
    source: Arc<dyn FrameSource>,
    /// Held while calling into the source so check-and-transition is atomic.
    state: Mutex<CaptureState>,
    starts: AtomicU64,
    stops: AtomicU64,
}

impl CaptureLifecycleController {
    pub fn new(source: Arc<dyn FrameSource>) -> Self {
        Self {
            source,
            state: Mutex::new(CaptureState::default()),
            starts: AtomicU64::new(0),
            stops: AtomicU64::new(0),
        }
    }

    /// Starts the source unless it is already running.
    ///
    /// If the source refuses to start, the error is logged, the controller
    /// stays stopped and the start is marked pending; the next call retries.
    pub fn start(&self) {
        let mut state = self.lock();
        if state.running {
            return;
        }

        match self.source.start() {
            Ok(()) => {
                state.running = true;
                state.start_pending = false;
                self.starts.fetch_add(1, Ordering::Relaxed);
                info!("capture started");
            }
            Err(e) => {
                state.start_pending = true;
                error!("failed to start capture: {e}");
            }
        }
    }

    /// Stops the source if it is running.
    ///
    /// The controller counts as stopped afterwards even if the source reports
    /// an error.
    pub fn stop(&self) {
        let mut state = self.lock();
        state.start_pending = false;
        if !state.running {
            return;
        }

        state.running = false;
        self.stops.fetch_add(1, Ordering::Relaxed);
        match self.source.stop() {
            Ok(()) => info!("capture stopped"),
            Err(e) => error!("error while stopping capture: {e}"),
        }
    }

    /// Returns `true` while capture is running.
    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Returns `true` if the last start failed and has not been retried
    /// successfully or cancelled by a stop.
    pub fn start_pending(&self) -> bool {
        self.lock().start_pending
    }

    /// Number of stopped → running transitions so far.
    pub fn starts(&self) -> u64 {
        self.starts.load(Ordering::Relaxed)
    }

    /// Number of running → stopped transitions so far.
    pub fn stops(&self) -> u64 {
        self.stops.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

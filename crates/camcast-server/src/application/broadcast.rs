//! Frame fan-out use case.
//!
//! [`FrameBroadcaster`] is the [`FrameSink`] registered with the capture
//! source.  For every frame it:
//!
//! 1. takes a snapshot of the registry,
//! 2. writes the framed part to every subscriber concurrently, each write
//!    bounded by the configured deadline,
//! 3. removes and closes every subscriber whose write failed or timed out.
//!
//! The source awaits `next_frame` before producing the next frame, so frames
//! reach each subscriber in capture order and the borrowed payload is never
//! touched after the call returns.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use camcast_core::{CaptureError, Frame, FrameRateMeter, FrameSink, MjpegFraming};
use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::application::registry::{ClientRegistry, SendFailure, Subscriber};

/// Outcome of broadcasting one frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers that received the frame.
    pub delivered: usize,
    /// Subscribers removed because their write failed.
    pub dropped: usize,
}

/// Writes every captured frame to every registered subscriber.
pub struct FrameBroadcaster {
    registry: Arc<ClientRegistry>,
    framing: MjpegFraming,
    write_timeout: Duration,
    meter: Mutex<FrameRateMeter>,
}

impl FrameBroadcaster {
    pub fn new(
        registry: Arc<ClientRegistry>,
        framing: MjpegFraming,
        write_timeout: Duration,
        fps_report_interval: Duration,
    ) -> Self {
        Self {
            registry,
            framing,
            write_timeout,
            meter: Mutex::new(FrameRateMeter::new(fps_report_interval)),
        }
    }

    /// Delivers `frame` to a snapshot of the registry.
    pub async fn broadcast(&self, frame: &Frame<'_>) -> BroadcastReport {
        let subscribers = self.registry.snapshot();
        if subscribers.is_empty() {
            return BroadcastReport::default();
        }

        let writes = subscribers.iter().map(|subscriber| async move {
            let result = self.write_one(subscriber.as_ref(), frame).await;
            (subscriber, result)
        });
        let results = join_all(writes).await;

        let mut report = BroadcastReport::default();
        for (subscriber, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.dropped += 1;
                    debug!(subscriber = %subscriber.id(), "dropping viewer: {e}");
                    // Another path (hangup, shutdown) may have removed it first.
                    if self.registry.remove(subscriber.id()).is_some() {
                        info!(subscriber = %subscriber.id(), "viewer disconnected");
                    }
                    subscriber.close().await;
                }
            }
        }

        self.record_delivery(report);
        report
    }

    async fn write_one(
        &self,
        subscriber: &dyn Subscriber,
        frame: &Frame<'_>,
    ) -> Result<(), SendFailure> {
        match tokio::time::timeout(
            self.write_timeout,
            subscriber.send_frame(frame, &self.framing),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SendFailure::Timeout(self.write_timeout)),
        }
    }

    fn record_delivery(&self, report: BroadcastReport) {
        if report.delivered == 0 {
            return;
        }
        let mut meter = self.meter.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(fps) = meter.record(Instant::now()) {
            info!(fps = format_args!("{fps:.1}"), viewers = report.delivered, "streaming");
        }
    }
}

#[async_trait]
impl FrameSink for FrameBroadcaster {
    async fn next_frame(&self, frame: &Frame<'_>) {
        self.broadcast(frame).await;
    }

    /// Stops capture; subscribers stay registered until pruned or shut down.
    fn exception_received(&self, error: CaptureError) {
        warn!("capture failed: {error}");
        self.registry.capture().stop();
        self.meter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::capture::CaptureLifecycleController;
    use crate::application::mock::{Behaviour, RecordingSubscriber};
    use crate::domain::ConnectionId;
    use crate::infrastructure::frame_source::mock::ManualFrameSource;

    struct Fixture {
        source: Arc<ManualFrameSource>,
        registry: Arc<ClientRegistry>,
        broadcaster: FrameBroadcaster,
    }

    fn fixture(write_timeout: Duration) -> Fixture {
        let source = Arc::new(ManualFrameSource::new());
        let capture = Arc::new(CaptureLifecycleController::new(source.clone()));
        let registry = Arc::new(ClientRegistry::new(capture));
        let broadcaster = FrameBroadcaster::new(
            Arc::clone(&registry),
            MjpegFraming::default(),
            write_timeout,
            Duration::from_secs(10),
        );
        Fixture {
            source,
            registry,
            broadcaster,
        }
    }

    fn frame(sequence: u64, payload: &[u8]) -> Frame<'_> {
        Frame::new(sequence, 1_000 + sequence, payload)
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber() {
        // Arrange
        let f = fixture(Duration::from_secs(1));
        let viewers: Vec<_> = (1..=3).map(RecordingSubscriber::new).collect();
        for v in &viewers {
            f.registry.add(v.clone()).expect("add");
        }

        // Act
        let report = f.broadcaster.broadcast(&frame(0, b"jpeg-0")).await;

        // Assert
        assert_eq!(report, BroadcastReport { delivered: 3, dropped: 0 });
        for v in &viewers {
            assert_eq!(v.payloads(), vec![b"jpeg-0".to_vec()]);
        }
    }

    #[tokio::test]
    async fn test_broadcast_preserves_order_per_subscriber() {
        let f = fixture(Duration::from_secs(1));
        let viewer = RecordingSubscriber::new(1);
        f.registry.add(viewer.clone()).expect("add");

        for seq in 0..5 {
            f.broadcaster.broadcast(&frame(seq, b"x")).await;
        }

        assert_eq!(viewer.sequences(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_failed_writes_are_pruned_and_others_keep_streaming() {
        // Arrange: 5 viewers, 2 of which are dead.
        let f = fixture(Duration::from_secs(1));
        let healthy: Vec<_> = [1, 2, 3].into_iter().map(RecordingSubscriber::new).collect();
        let dead: Vec<_> = [4, 5].into_iter().map(RecordingSubscriber::failing).collect();
        for v in healthy.iter().chain(dead.iter()) {
            f.registry.add(v.clone()).expect("add");
        }

        // Act
        let report = f.broadcaster.broadcast(&frame(0, b"jpeg")).await;

        // Assert
        assert_eq!(report, BroadcastReport { delivered: 3, dropped: 2 });
        assert_eq!(f.registry.len(), 3);
        assert!(f.registry.capture().is_running());
        for v in &dead {
            assert!(v.is_closed());
            assert!(!f.registry.contains(v.id()));
        }
        for v in &healthy {
            assert!(!v.is_closed());
        }
    }

    #[tokio::test]
    async fn test_all_writes_failing_stops_capture() {
        // Arrange
        let f = fixture(Duration::from_secs(1));
        f.registry.add(RecordingSubscriber::failing(1)).expect("add");
        f.registry.add(RecordingSubscriber::failing(2)).expect("add");

        // Act
        f.broadcaster.broadcast(&frame(0, b"jpeg")).await;

        // Assert
        assert!(f.registry.is_empty());
        assert!(!f.registry.capture().is_running());
        assert_eq!(f.source.stop_calls(), 1);
    }

    #[tokio::test]
    async fn test_stalled_subscriber_is_dropped_after_deadline() {
        // Arrange
        let f = fixture(Duration::from_millis(50));
        let fast = RecordingSubscriber::new(1);
        let stalled = RecordingSubscriber::stalling(2);
        f.registry.add(fast.clone()).expect("add");
        f.registry.add(stalled.clone()).expect("add");

        // Act
        let report = f.broadcaster.broadcast(&frame(0, b"jpeg")).await;

        // Assert
        assert_eq!(report.dropped, 1);
        assert_eq!(fast.sequences(), vec![0]);
        assert!(stalled.is_closed());
        assert!(!f.registry.contains(ConnectionId::new(2)));
    }

    #[tokio::test]
    async fn test_subscriber_removed_before_snapshot_is_not_written() {
        let f = fixture(Duration::from_secs(1));
        let viewer = RecordingSubscriber::new(1);
        f.registry.add(viewer.clone()).expect("add");
        f.registry.add(RecordingSubscriber::new(2)).expect("add");

        viewer.set_behaviour(Behaviour::Fail);
        f.registry.remove(viewer.id());
        // Not in the snapshot any more, so the broadcaster never sees it.
        f.broadcaster.broadcast(&frame(0, b"jpeg")).await;

        assert_eq!(viewer.close_calls(), 0);
        assert_eq!(f.registry.len(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_with_no_subscribers_is_a_no_op() {
        let f = fixture(Duration::from_secs(1));
        let report = f.broadcaster.broadcast(&frame(0, b"jpeg")).await;
        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test]
    async fn test_exception_received_stops_capture_but_keeps_subscribers() {
        // Arrange
        let f = fixture(Duration::from_secs(1));
        let viewer = RecordingSubscriber::new(1);
        f.registry.add(viewer.clone()).expect("add");

        // Act
        f.broadcaster
            .exception_received(CaptureError::Device("unplugged".to_string()));

        // Assert
        assert!(!f.registry.capture().is_running());
        assert_eq!(f.registry.len(), 1);
        assert!(!viewer.is_closed());
    }
}

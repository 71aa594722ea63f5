//! Directory replay frame source.
//!
//! [`DirectoryFrameSource`] loops over the `*.jpg` / `*.jpeg` files of a
//! directory, in file name order, at a fixed frame rate.  It stands in for a
//! camera on machines without one and gives the server something real to
//! stream in tests and demos.
//!
//! # Sessions
//!
//! Each `start` spawns a producer task with its own stop flag; `stop` clears
//! the flag and the task exits before its next frame.  All sessions share one
//! frame buffer behind an async mutex.  The producer holds the lock while it
//! fills the buffer and while the sink consumes it, so even a session started
//! while the previous one is finishing its last delivery never has two frames
//! in flight.
//!
//! A read error is reported once through
//! [`FrameSink::exception_received`] and ends the session.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use camcast_core::{CaptureError, Frame, FrameSink, FrameSource};
use tokio::io::AsyncReadExt;
use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Replays a directory of JPEG files as a live capture.
pub struct DirectoryFrameSource {
    files: Arc<[PathBuf]>,
    interval: Duration,
    runtime: Handle,
    sink: Mutex<Option<Weak<dyn FrameSink>>>,
    /// Stop flag of the current session, if one is running.
    session: Mutex<Option<Arc<AtomicBool>>>,
    buffer: Arc<tokio::sync::Mutex<Vec<u8>>>,
    sequence: Arc<AtomicU64>,
}

impl DirectoryFrameSource {
    /// Lists the JPEG files in `dir` and prepares to replay them at `fps`.
    ///
    /// Must be called from within a Tokio runtime; producer tasks are spawned
    /// on it.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::Read`] if the directory cannot be listed.
    /// - [`CaptureError::NoFrames`] if it contains no JPEG files.
    /// - [`CaptureError::Device`] if `fps` is zero or no runtime is active.
    pub fn open(dir: &Path, fps: u32) -> Result<Self, CaptureError> {
        if fps == 0 {
            return Err(CaptureError::Device("frame rate must be positive".to_string()));
        }
        let runtime = Handle::try_current()
            .map_err(|e| CaptureError::Device(format!("no async runtime: {e}")))?;

        let files = list_jpegs(dir)?;
        if files.is_empty() {
            return Err(CaptureError::NoFrames);
        }
        info!(dir = %dir.display(), frames = files.len(), fps, "replaying frames from directory");

        Ok(Self {
            files: files.into(),
            interval: Duration::from_secs(1) / fps,
            runtime,
            sink: Mutex::new(None),
            session: Mutex::new(None),
            buffer: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            sequence: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Number of frames in one loop of the directory.
    pub fn frame_count(&self) -> usize {
        self.files.len()
    }

    fn session(&self) -> MutexGuard<'_, Option<Arc<AtomicBool>>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FrameSource for DirectoryFrameSource {
    fn register_callback(&self, sink: Weak<dyn FrameSink>) {
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    fn start(&self) -> Result<(), CaptureError> {
        let sink = self
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(CaptureError::NoSink)?;

        let mut session = self.session();
        if session.as_ref().is_some_and(|active| active.load(Ordering::SeqCst)) {
            return Ok(());
        }

        let active = Arc::new(AtomicBool::new(true));
        *session = Some(Arc::clone(&active));

        let producer = Producer {
            files: Arc::clone(&self.files),
            interval: self.interval,
            sink,
            active,
            buffer: Arc::clone(&self.buffer),
            sequence: Arc::clone(&self.sequence),
        };
        self.runtime.spawn(producer.run());
        Ok(())
    }

    fn stop(&self) -> Result<(), CaptureError> {
        if let Some(active) = self.session().take() {
            active.store(false, Ordering::SeqCst);
        }
        Ok(())
    }
}

struct Producer {
    files: Arc<[PathBuf]>,
    interval: Duration,
    sink: Weak<dyn FrameSink>,
    active: Arc<AtomicBool>,
    buffer: Arc<tokio::sync::Mutex<Vec<u8>>>,
    sequence: Arc<AtomicU64>,
}

impl Producer {
    async fn run(self) {
        debug!("capture session started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        for path in self.files.iter().cycle() {
            ticker.tick().await;

            let mut buffer = self.buffer.lock().await;
            if !self.active.load(Ordering::SeqCst) {
                break;
            }
            let Some(sink) = self.sink.upgrade() else {
                break;
            };

            if let Err(source) = read_into(path, &mut buffer).await {
                self.active.store(false, Ordering::SeqCst);
                sink.exception_received(CaptureError::Read {
                    path: path.display().to_string(),
                    source,
                });
                break;
            }

            let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
            let frame = Frame::new(sequence, now_us(), &buffer);
            sink.next_frame(&frame).await;
        }
        debug!("capture session ended");
    }
}

/// Replaces the contents of `buffer` with the file at `path`.
async fn read_into(path: &Path, buffer: &mut Vec<u8>) -> std::io::Result<()> {
    buffer.clear();
    let mut file = tokio::fs::File::open(path).await?;
    file.read_to_end(buffer).await?;
    Ok(())
}

fn list_jpegs(dir: &Path) -> Result<Vec<PathBuf>, CaptureError> {
    let read_error = |source| CaptureError::Read {
        path: dir.display().to_string(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_error)? {
        let path = entry.map_err(read_error)?.path();
        if path.is_file() && is_jpeg(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
}

fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    /// Forwards every frame (and every fault) to a channel.
    struct ChannelSink {
        frames: mpsc::UnboundedSender<(u64, Vec<u8>)>,
        faults: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl FrameSink for ChannelSink {
        async fn next_frame(&self, frame: &Frame<'_>) {
            let _ = self.frames.send((frame.sequence, frame.to_owned_payload()));
        }

        fn exception_received(&self, error: CaptureError) {
            let _ = self.faults.send(error.to_string());
        }
    }

    struct Harness {
        dir: tempfile::TempDir,
        source: DirectoryFrameSource,
        _sink: Arc<dyn FrameSink>,
        frames: mpsc::UnboundedReceiver<(u64, Vec<u8>)>,
        faults: mpsc::UnboundedReceiver<String>,
    }

    fn harness(files: &[(&str, &[u8])], fps: u32) -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");
        for (name, contents) in files {
            std::fs::write(dir.path().join(name), contents).expect("write frame");
        }
        let source = DirectoryFrameSource::open(dir.path(), fps).expect("open");

        let (frames_tx, frames) = mpsc::unbounded_channel();
        let (faults_tx, faults) = mpsc::unbounded_channel();
        let sink: Arc<dyn FrameSink> = Arc::new(ChannelSink {
            frames: frames_tx,
            faults: faults_tx,
        });
        source.register_callback(Arc::downgrade(&sink));

        Harness {
            dir,
            source,
            _sink: sink,
            frames,
            faults,
        }
    }

    async fn next(frames: &mut mpsc::UnboundedReceiver<(u64, Vec<u8>)>) -> (u64, Vec<u8>) {
        tokio::time::timeout(Duration::from_secs(2), frames.recv())
            .await
            .expect("frame within deadline")
            .expect("channel open")
    }

    #[tokio::test]
    async fn test_open_lists_only_jpegs() {
        let h = harness(
            &[("a.jpg", b"A"), ("b.JPEG", b"B"), ("notes.txt", b"x")],
            10,
        );
        assert_eq!(h.source.frame_count(), 2);
    }

    #[tokio::test]
    async fn test_open_empty_directory_fails_with_no_frames() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = DirectoryFrameSource::open(dir.path(), 10);
        assert!(matches!(result, Err(CaptureError::NoFrames)));
    }

    #[tokio::test]
    async fn test_open_missing_directory_fails_with_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope");
        let result = DirectoryFrameSource::open(&missing, 10);
        assert!(matches!(result, Err(CaptureError::Read { .. })));
    }

    #[tokio::test]
    async fn test_open_zero_fps_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.jpg"), b"A").expect("write");
        let result = DirectoryFrameSource::open(dir.path(), 0);
        assert!(matches!(result, Err(CaptureError::Device(_))));
    }

    #[tokio::test]
    async fn test_start_without_sink_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.jpg"), b"A").expect("write");
        let source = DirectoryFrameSource::open(dir.path(), 10).expect("open");

        assert!(matches!(source.start(), Err(CaptureError::NoSink)));
    }

    #[tokio::test]
    async fn test_frames_replay_in_name_order_and_loop() {
        // Arrange
        let mut h = harness(&[("02.jpg", b"second"), ("01.jpg", b"first")], 100);

        // Act
        h.source.start().expect("start");
        let received = [
            next(&mut h.frames).await,
            next(&mut h.frames).await,
            next(&mut h.frames).await,
        ];
        h.source.stop().expect("stop");

        // Assert
        let payloads: Vec<&[u8]> = received.iter().map(|(_, p)| p.as_slice()).collect();
        assert_eq!(payloads, vec![&b"first"[..], &b"second"[..], &b"first"[..]]);
        let sequences: Vec<u64> = received.iter().map(|(s, _)| *s).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_stop_ends_delivery() {
        // Arrange
        let mut h = harness(&[("a.jpg", b"A")], 100);
        h.source.start().expect("start");
        next(&mut h.frames).await;

        // Act
        h.source.stop().expect("stop");
        // Let an in-flight tick finish, then drain.
        tokio::time::sleep(Duration::from_millis(50)).await;
        while h.frames.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Assert
        assert!(h.frames.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_start_twice_then_stop_once_ends_delivery() {
        // Arrange
        let mut h = harness(&[("a.jpg", b"A")], 100);

        // Act
        h.source.start().expect("start");
        h.source.start().expect("second start");
        next(&mut h.frames).await;
        h.source.stop().expect("stop");
        tokio::time::sleep(Duration::from_millis(50)).await;
        while h.frames.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Assert: a second session would still be producing.
        assert!(h.frames.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sequence_keeps_increasing_across_sessions() {
        let mut h = harness(&[("a.jpg", b"A")], 100);

        h.source.start().expect("start");
        let (first, _) = next(&mut h.frames).await;
        h.source.stop().expect("stop");
        tokio::time::sleep(Duration::from_millis(50)).await;
        while h.frames.try_recv().is_ok() {}

        h.source.start().expect("restart");
        let (after_restart, _) = next(&mut h.frames).await;
        h.source.stop().expect("stop");

        assert!(after_restart > first);
    }

    #[tokio::test]
    async fn test_vanished_file_is_reported_once_and_ends_session() {
        // Arrange
        let mut h = harness(&[("a.jpg", b"A")], 100);
        std::fs::remove_file(h.dir.path().join("a.jpg")).expect("remove");

        // Act
        h.source.start().expect("start");
        let fault = tokio::time::timeout(Duration::from_secs(2), h.faults.recv())
            .await
            .expect("fault within deadline")
            .expect("channel open");
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Assert
        assert!(fault.contains("a.jpg"));
        assert!(h.faults.try_recv().is_err());
        assert!(h.frames.try_recv().is_err());
    }
}

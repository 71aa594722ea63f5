//! Recording subscriber for unit and integration tests.
//!
//! Lets tests observe exactly which frames reached a viewer, and simulate a
//! viewer whose connection has died or stalled, without opening sockets.

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use camcast_core::{Frame, MjpegFraming};

use super::registry::{SendFailure, Subscriber};
use crate::domain::ConnectionId;

/// How a [`RecordingSubscriber`] reacts to `send_frame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Record the frame and succeed.
    Accept,
    /// Fail immediately, as a reset connection would.
    Fail,
    /// Never complete, as a viewer with a full socket buffer would.
    Stall,
}

/// A [`Subscriber`] that records every frame it receives.
pub struct RecordingSubscriber {
    id: ConnectionId,
    behaviour: Mutex<Behaviour>,
    frames: Mutex<Vec<(u64, Vec<u8>)>>,
    close_calls: AtomicU32,
}

impl RecordingSubscriber {
    /// Creates a subscriber that accepts every frame.
    pub fn new(id: u64) -> Arc<Self> {
        Self::with_behaviour(id, Behaviour::Accept)
    }

    /// Creates a subscriber whose writes always fail.
    pub fn failing(id: u64) -> Arc<Self> {
        Self::with_behaviour(id, Behaviour::Fail)
    }

    /// Creates a subscriber whose writes never complete.
    pub fn stalling(id: u64) -> Arc<Self> {
        Self::with_behaviour(id, Behaviour::Stall)
    }

    pub fn with_behaviour(id: u64, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::new(id),
            behaviour: Mutex::new(behaviour),
            frames: Mutex::new(Vec::new()),
            close_calls: AtomicU32::new(0),
        })
    }

    /// Changes the behaviour for subsequent frames.
    pub fn set_behaviour(&self, behaviour: Behaviour) {
        *self.behaviour.lock().expect("lock poisoned") = behaviour;
    }

    /// Sequence numbers of the frames received, in arrival order.
    pub fn sequences(&self) -> Vec<u64> {
        self.frames
            .lock()
            .expect("lock poisoned")
            .iter()
            .map(|(seq, _)| *seq)
            .collect()
    }

    /// Payloads of the frames received, in arrival order.
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.frames
            .lock()
            .expect("lock poisoned")
            .iter()
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Number of times [`Subscriber::close`] was called.
    pub fn close_calls(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.close_calls() > 0
    }
}

#[async_trait]
impl Subscriber for RecordingSubscriber {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send_frame(
        &self,
        frame: &Frame<'_>,
        _framing: &MjpegFraming,
    ) -> Result<(), SendFailure> {
        let behaviour = *self.behaviour.lock().expect("lock poisoned");
        match behaviour {
            Behaviour::Accept => {
                self.frames
                    .lock()
                    .expect("lock poisoned")
                    .push((frame.sequence, frame.to_owned_payload()));
                Ok(())
            }
            Behaviour::Fail => Err(SendFailure::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "viewer went away",
            ))),
            Behaviour::Stall => std::future::pending::<Result<(), SendFailure>>().await,
        }
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

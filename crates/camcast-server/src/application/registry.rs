//! Subscriber registry use case.
//!
//! [`ClientRegistry`] holds every connection currently promoted to a stream
//! viewer.  Membership changes and capture transitions happen under one lock:
//!
//! - the add that makes the registry size 1 starts capture,
//! - any later add retries a start the source refused,
//! - the remove that makes it 0 stops capture,
//!
//! so no interleaving of concurrent adds and removes can leave viewers
//! waiting on a stopped producer, or a producer running for nobody.
//!
//! The broadcaster never iterates the live map.  It takes a
//! [`snapshot`](ClientRegistry::snapshot) and writes to that copy, so
//! subscribers can join or leave while a frame is in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use camcast_core::{Frame, MjpegFraming};
use thiserror::Error;
use tracing::debug;

use crate::application::capture::CaptureLifecycleController;
use crate::domain::ConnectionId;

// ── Subscriber seam ───────────────────────────────────────────────────────────

/// Why a frame could not be delivered to a subscriber.
#[derive(Debug, Error)]
pub enum SendFailure {
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("write did not complete within {0:?}")]
    Timeout(Duration),

    #[error("subscriber is already closed")]
    Closed,
}

/// A viewer that receives every broadcast frame.
///
/// The TCP implementation lives in `infrastructure::connection`; tests use
/// [`RecordingSubscriber`](crate::application::mock::RecordingSubscriber).
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// The id of the connection this subscription was promoted from.
    fn id(&self) -> ConnectionId;

    /// Writes one framed part.  Frames arrive in capture order.
    async fn send_frame(&self, frame: &Frame<'_>, framing: &MjpegFraming)
        -> Result<(), SendFailure>;

    /// Releases the connection.  Calling it more than once is harmless.
    async fn close(&self);
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Errors returned by [`ClientRegistry::add`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("the server is shutting down")]
    Closed,

    #[error("subscriber {0} is already registered")]
    Duplicate(ConnectionId),
}

struct RegistryState {
    members: HashMap<ConnectionId, Arc<dyn Subscriber>>,
    closed: bool,
}

/// The set of active stream subscribers.
pub struct ClientRegistry {
    state: Mutex<RegistryState>,
    capture: Arc<CaptureLifecycleController>,
}

impl ClientRegistry {
    pub fn new(capture: Arc<CaptureLifecycleController>) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                members: HashMap::new(),
                closed: false,
            }),
            capture,
        }
    }

    /// Registers `subscriber`, starting capture if it is the first one.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::Closed`] once [`close`](Self::close) has run.
    /// - [`RegistryError::Duplicate`] if a subscriber with the same id is
    ///   already present.
    pub fn add(&self, subscriber: Arc<dyn Subscriber>) -> Result<(), RegistryError> {
        let mut state = self.lock();
        if state.closed {
            return Err(RegistryError::Closed);
        }

        let id = subscriber.id();
        if state.members.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }

        state.members.insert(id, subscriber);
        let size = state.members.len();
        if size == 1 || self.capture.start_pending() {
            self.capture.start();
        }

        debug!(subscriber = %id, subscribers = size, "subscriber added");
        Ok(())
    }

    /// Removes the subscriber with `id`, stopping capture if it was the last.
    ///
    /// Returns the removed subscriber, or `None` if it was not registered
    /// (already removed by another path).  The caller is responsible for
    /// closing it.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<dyn Subscriber>> {
        let mut state = self.lock();
        let removed = state.members.remove(&id)?;

        let size = state.members.len();
        if size == 0 {
            self.capture.stop();
        }

        debug!(subscriber = %id, subscribers = size, "subscriber removed");
        Some(removed)
    }

    /// Returns a point-in-time copy of the current subscribers.
    pub fn snapshot(&self) -> Vec<Arc<dyn Subscriber>> {
        self.lock().members.values().cloned().collect()
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.lock().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if a subscriber with `id` is registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().members.contains_key(&id)
    }

    /// Rejects all future adds and drains the registry.
    ///
    /// Capture is stopped if anyone was registered.  The drained subscribers
    /// are returned so the caller can close them outside the lock.
    pub fn close(&self) -> Vec<Arc<dyn Subscriber>> {
        let mut state = self.lock();
        state.closed = true;

        let drained: Vec<_> = state.members.drain().map(|(_, s)| s).collect();
        if !drained.is_empty() {
            self.capture.stop();
        }
        drained
    }

    /// The capture controller driven by this registry.
    pub fn capture(&self) -> &Arc<CaptureLifecycleController> {
        &self.capture
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

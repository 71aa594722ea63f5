//! Application layer use cases for the broadcast server.
//!
//! Everything here depends on abstractions ([`FrameSource`], [`Subscriber`],
//! [`PageRenderer`]) rather than sockets, so the lifecycle and fan-out rules
//! can be tested without a network.
//!
//! # Sub-modules
//!
//! - **`registry`**  – The set of active stream subscribers.  Membership
//!   edges drive the capture lifecycle: first viewer in starts capture, last
//!   viewer out stops it.
//!
//! - **`capture`**   – Idempotent start/stop wrapper around the frame source.
//!
//! - **`broadcast`** – Fans each captured frame out to every subscriber and
//!   prunes the ones whose writes fail.
//!
//! - **`pages`**     – Renders the HTML pages and applies control updates.
//!
//! - **`mock`**      – Recording subscriber for tests.
//!
//! [`FrameSource`]: camcast_core::FrameSource

pub mod broadcast;
pub mod capture;
pub mod mock;
pub mod pages;
pub mod registry;

pub use broadcast::{BroadcastReport, FrameBroadcaster};
pub use capture::CaptureLifecycleController;
pub use pages::{HtmlPageRenderer, PageRenderer, RenderError};
pub use registry::{ClientRegistry, RegistryError, SendFailure, Subscriber};

//! # camcast-core
//!
//! Shared library for the camcast webcam server containing the request
//! classifier, the MJPEG multipart framing, the frame type handed from the
//! capture producer to the broadcaster, and the camera control model.
//!
//! It has zero dependencies on sockets, async runtimes, or capture hardware.
//!
//! # Architecture overview
//!
//! camcast serves a live MJPEG stream to any number of viewers (browsers,
//! VLC, ffplay) over plain TCP.  A viewer connects, sends one line (usually
//! an HTTP request line), and receives either a small HTML page or an
//! open-ended stream of JPEG frames.
//!
//! - **`protocol`** – What travels over the wire: classification of the
//!   request line into a [`RequestAction`], and the multipart framing that
//!   wraps every JPEG frame sent to a viewer.
//!
//! - **`domain`** – Pure data: the borrowed [`Frame`] handed to the
//!   broadcaster once per capture, the frame-rate meter, and the
//!   [`ControlPanel`] of adjustable camera controls.
//!
//! - **`capture`** – The producer seam: the [`FrameSource`] and
//!   [`FrameSink`] traits that connect a capture backend to the server.

pub mod capture;
pub mod domain;
pub mod protocol;

pub use capture::{CaptureError, FrameSink, FrameSource};
pub use domain::controls::{Control, ControlError, ControlPanel, ControlUpdate};
pub use domain::frame::{Frame, FrameRateMeter};
pub use protocol::mjpeg::MjpegFraming;
pub use protocol::request::{classify, ClassificationError, RequestAction};

//! Wire-level protocol: request classification and MJPEG stream framing.

pub mod mjpeg;
pub mod request;

pub use mjpeg::MjpegFraming;
pub use request::{classify, ClassificationError, RequestAction};

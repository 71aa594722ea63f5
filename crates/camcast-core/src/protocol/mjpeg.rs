//! MJPEG multipart framing.
//!
//! Browsers, VLC and ffplay all understand an MJPEG stream sent as a single
//! never-ending HTTP response of type `multipart/x-mixed-replace`.  Each JPEG
//! frame becomes one part of the multipart body:
//!
//! ```text
//! HTTP/1.0 200 OK\r\n
//! Content-Type: multipart/x-mixed-replace; boundary=camcastframe\r\n
//! \r\n
//! --camcastframe\r\n
//! Content-Type: image/jpeg\r\n
//! Content-Length: 5120\r\n
//! X-Timestamp: 1718000000123456\r\n
//! \r\n
//! <5120 bytes of JPEG>\r\n
//! --camcastframe\r\n
//! ...
//! ```
//!
//! Only the small part header and trailer are produced here.  The JPEG
//! payload itself is written straight from the producer's buffer, so no frame
//! bytes are ever copied into the framing.

/// Boundary string used when none is configured.
pub const DEFAULT_BOUNDARY: &str = "camcastframe";

/// Trailer written after every frame payload.
pub const PART_TRAILER: &[u8] = b"\r\n";

/// Builds the byte sequences that wrap frames into a multipart stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MjpegFraming {
    boundary: String,
}

impl MjpegFraming {
    /// Creates a framing with a custom boundary string.
    ///
    /// The boundary must not occur inside any JPEG payload in practice; a
    /// short alphanumeric token is sufficient because every part carries an
    /// explicit `Content-Length`.
    pub fn new(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
        }
    }

    /// Returns the boundary token (without the leading `--`).
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// The HTTP response head sent once when a viewer subscribes.
    pub fn preamble(&self) -> Vec<u8> {
        format!(
            "HTTP/1.0 200 OK\r\n\
             Connection: close\r\n\
             Cache-Control: no-cache, no-store, must-revalidate\r\n\
             Pragma: no-cache\r\n\
             Content-Type: multipart/x-mixed-replace; boundary={}\r\n\
             \r\n",
            self.boundary
        )
        .into_bytes()
    }

    /// The header written before a frame payload of `payload_len` bytes.
    ///
    /// `capture_timestamp_us` is exposed to clients as `X-Timestamp` so that
    /// viewers can measure end-to-end latency.
    pub fn part_header(&self, payload_len: usize, capture_timestamp_us: u64) -> Vec<u8> {
        format!(
            "--{}\r\n\
             Content-Type: image/jpeg\r\n\
             Content-Length: {}\r\n\
             X-Timestamp: {}\r\n\
             \r\n",
            self.boundary, payload_len, capture_timestamp_us
        )
        .into_bytes()
    }
}

impl Default for MjpegFraming {
    fn default() -> Self {
        Self::new(DEFAULT_BOUNDARY)
    }
}

//! Request line classification.
//!
//! Every connection starts with exactly one line of text from the viewer.
//! Browsers send an HTTP request line such as `GET /webcam HTTP/1.1`; VLC and
//! ffplay send `GET /stream HTTP/1.1`.  The server never parses HTTP properly:
//! it only looks for keywords in the first line and picks a response.
//!
//! # Matching rules
//!
//! Matching is case-sensitive and substring-based, evaluated in a fixed
//! priority order.  The first rule that matches wins:
//!
//! | Line contains / ends with            | Action                 |
//! |--------------------------------------|------------------------|
//! | `webcam`                             | `WebcamPage`           |
//! | `control`                            | `ControlPage`          |
//! | `stream`, or a `jpg` suffix          | `VideoStream`          |
//! | `update`                             | `UpdateControlValue`   |
//! | none of the above                    | `MainPage`             |
//!
//! The `jpg` suffix is checked on the whole line and, for an HTTP request
//! line, on the request target (`GET /snap.jpg HTTP/1.1` names `/snap.jpg`,
//! with any query string removed).
//!
//! Because `control` outranks `update`, control update requests must not
//! mention `control` anywhere in the line.  The control page forms submit to
//! `/update?id=..&val=..` for that reason.

use std::fmt;

use thiserror::Error;

/// The response selected for a connection from its first line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestAction {
    /// The frameset page pointing at the control list and the webcam view.
    MainPage,
    /// The page embedding the live stream in an `<img>` tag.
    WebcamPage,
    /// The table of camera controls with one form per control.
    ControlPage,
    /// The open-ended MJPEG stream.
    VideoStream,
    /// Apply a control change, then answer with the control page.
    UpdateControlValue,
}

impl RequestAction {
    /// Returns `true` for the only action that keeps the connection open
    /// after the response starts.
    pub fn is_streaming(self) -> bool {
        matches!(self, RequestAction::VideoStream)
    }
}

impl fmt::Display for RequestAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestAction::MainPage => "main page",
            RequestAction::WebcamPage => "webcam page",
            RequestAction::ControlPage => "control page",
            RequestAction::VideoStream => "video stream",
            RequestAction::UpdateControlValue => "control update",
        };
        f.write_str(name)
    }
}

/// The viewer closed the connection before sending a request line.
///
/// This is distinct from a line that matches no keyword, which is a valid
/// request for the main page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("connection closed before a request line was received")]
pub struct ClassificationError;

/// Classifies the first line received from a viewer.
///
/// `line` is `None` when the peer closed the connection before sending any
/// data.  A trailing `\n` or `\r\n` is ignored, so the `jpg` suffix rule
/// applies to the line content itself.
///
/// # Errors
///
/// Returns [`ClassificationError`] when `line` is `None`.
///
/// # Examples
///
/// ```rust
/// use camcast_core::{classify, RequestAction};
///
/// assert_eq!(
///     classify(Some("GET /webcam?control HTTP/1.1")).unwrap(),
///     RequestAction::WebcamPage
/// );
/// assert_eq!(classify(Some("GET /snap.jpg")).unwrap(), RequestAction::VideoStream);
/// assert!(classify(None).is_err());
/// ```
pub fn classify(line: Option<&str>) -> Result<RequestAction, ClassificationError> {
    let line = strip_line_terminator(line.ok_or(ClassificationError)?);

    let action = if line.contains("webcam") {
        RequestAction::WebcamPage
    } else if line.contains("control") {
        RequestAction::ControlPage
    } else if line.contains("stream") || has_jpg_suffix(line) {
        RequestAction::VideoStream
    } else if line.contains("update") {
        RequestAction::UpdateControlValue
    } else {
        RequestAction::MainPage
    };

    Ok(action)
}

/// Returns `true` when the line, or the target of an HTTP request line,
/// ends with `jpg`.
fn has_jpg_suffix(line: &str) -> bool {
    if line.ends_with("jpg") {
        return true;
    }

    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(_method), Some(target)) => {
            let path = target.split(['?', '#']).next().unwrap_or(target);
            path.ends_with("jpg")
        }
        _ => false,
    }
}

/// Removes one trailing `\n` or `\r\n` from `line`.
pub fn strip_line_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(line: &str) -> RequestAction {
        classify(Some(line)).expect("present line must classify")
    }

    #[test]
    fn test_absent_line_is_classification_error() {
        assert_eq!(classify(None), Err(ClassificationError));
    }

    #[test]
    fn test_empty_line_falls_through_to_main_page() {
        // An empty line was still received, so it is a request, not an error.
        assert_eq!(action(""), RequestAction::MainPage);
        assert_eq!(action("\r\n"), RequestAction::MainPage);
    }

    #[test]
    fn test_root_request_is_main_page() {
        assert_eq!(action("GET / HTTP/1.1"), RequestAction::MainPage);
    }

    #[test]
    fn test_webcam_outranks_control() {
        assert_eq!(
            action("GET /webcam?control HTTP/1.1"),
            RequestAction::WebcamPage
        );
    }

    #[test]
    fn test_control_page() {
        assert_eq!(action("GET /control HTTP/1.1"), RequestAction::ControlPage);
    }

    #[test]
    fn test_control_outranks_stream_and_update() {
        assert_eq!(
            action("GET /update?control=1&stream HTTP/1.1"),
            RequestAction::ControlPage
        );
    }

    #[test]
    fn test_stream_keyword_is_video_stream() {
        assert_eq!(action("GET /stream HTTP/1.1"), RequestAction::VideoStream);
        assert_eq!(action("GET /stream.jpg HTTP/1.1"), RequestAction::VideoStream);
    }

    #[test]
    fn test_jpg_suffix_is_video_stream() {
        assert_eq!(action("GET /foo.jpg"), RequestAction::VideoStream);
        assert_eq!(action("GET /foo.jpg\r\n"), RequestAction::VideoStream);
    }

    #[test]
    fn test_jpg_request_target_is_video_stream() {
        assert_eq!(action("GET /foo.jpg HTTP/1.1"), RequestAction::VideoStream);
        assert_eq!(action("GET /foo.jpg?t=17 HTTP/1.1"), RequestAction::VideoStream);
    }

    #[test]
    fn test_jpg_inside_a_word_is_not_video_stream() {
        assert_eq!(action("GET /jpgs/index.html HTTP/1.1"), RequestAction::MainPage);
        assert_eq!(action("GET /foo.jpeg HTTP/1.1"), RequestAction::MainPage);
    }

    #[test]
    fn test_stream_outranks_update() {
        assert_eq!(action("GET /update/stream"), RequestAction::VideoStream);
    }

    #[test]
    fn test_update_request() {
        assert_eq!(
            action("GET /update?id=2&val=40 HTTP/1.1"),
            RequestAction::UpdateControlValue
        );
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        assert_eq!(action("GET /WEBCAM HTTP/1.1"), RequestAction::MainPage);
        assert_eq!(action("GET /Stream HTTP/1.1"), RequestAction::MainPage);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let line = "GET /control HTTP/1.1";
        let first = action(line);
        for _ in 0..10 {
            assert_eq!(action(line), first);
        }
    }

    #[test]
    fn test_only_video_stream_is_streaming() {
        assert!(RequestAction::VideoStream.is_streaming());
        assert!(!RequestAction::MainPage.is_streaming());
        assert!(!RequestAction::UpdateControlValue.is_streaming());
    }

    #[test]
    fn test_strip_line_terminator_removes_one_terminator() {
        assert_eq!(strip_line_terminator("abc\r\n"), "abc");
        assert_eq!(strip_line_terminator("abc\n"), "abc");
        assert_eq!(strip_line_terminator("abc"), "abc");
        assert_eq!(strip_line_terminator("abc\n\n"), "abc\n");
    }
}

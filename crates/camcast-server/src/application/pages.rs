//! HTML page rendering.
//!
//! The connection worker answers every non-streaming request with one of
//! three pages.  [`PageRenderer`] is the seam between the worker and the
//! markup, so the worker can be tested with a mock and the markup can be
//! swapped without touching the socket code.
//!
//! Each method returns a complete HTTP response (status line, headers and
//! body), ready to be written to the socket.
//!
//! # Pages
//!
//! | Page     | Content                                                 |
//! |----------|---------------------------------------------------------|
//! | main     | frameset with the control list and the webcam view     |
//! | webcam   | `<img src="stream.jpg">`, i.e. the live MJPEG stream    |
//! | control  | one form per control; submitting it requests `/update`  |
//!
//! The control forms target `update`.  Classification checks `control`
//! before `update`, so an update URL that also contained `control` would
//! only re-render the page.

use std::fmt::Write as _;

use camcast_core::{ControlError, ControlPanel, ControlUpdate};
use thiserror::Error;
use tracing::info;

/// Errors raised while producing a page.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid control update: {0}")]
    Control(#[from] ControlError),

    #[error("failed to format page: {0}")]
    Format(#[from] std::fmt::Error),
}

/// Produces the HTML responses served to browsers.
#[cfg_attr(test, mockall::automock)]
pub trait PageRenderer: Send + Sync {
    /// The frameset page served for unrecognised requests.
    fn render_main(&self) -> Result<Vec<u8>, RenderError>;

    /// The page embedding the live stream.
    fn render_webcam(&self) -> Result<Vec<u8>, RenderError>;

    /// The control list reflecting the current `panel` values.
    fn render_control_list(&self, panel: &ControlPanel) -> Result<Vec<u8>, RenderError>;

    /// Parses the control update carried by `request_line` and applies it.
    fn apply_control_update(
        &self,
        panel: &mut ControlPanel,
        request_line: &str,
    ) -> Result<(), RenderError>;
}

/// The built-in renderer: small static HTML pages, HTTP/1.0, no caching.
#[derive(Debug, Clone)]
pub struct HtmlPageRenderer {
    title: String,
}

impl HtmlPageRenderer {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }
}

impl Default for HtmlPageRenderer {
    fn default() -> Self {
        Self::new("camcast")
    }
}

impl PageRenderer for HtmlPageRenderer {
    fn render_main(&self) -> Result<Vec<u8>, RenderError> {
        let mut html = String::new();
        writeln!(html, "<!DOCTYPE html>")?;
        writeln!(html, "<html>")?;
        writeln!(html, "<head><title>{}</title></head>", escape_html(&self.title))?;
        writeln!(html, "<frameset cols=\"30%,70%\">")?;
        writeln!(html, "  <frame src=\"control\" name=\"control\">")?;
        writeln!(html, "  <frame src=\"webcam\" name=\"webcam\">")?;
        writeln!(html, "</frameset>")?;
        writeln!(html, "</html>")?;
        Ok(http_response(&html))
    }

    fn render_webcam(&self) -> Result<Vec<u8>, RenderError> {
        let mut html = String::new();
        writeln!(html, "<!DOCTYPE html>")?;
        writeln!(html, "<html>")?;
        writeln!(html, "<head><title>{}</title></head>", escape_html(&self.title))?;
        writeln!(html, "<body>")?;
        writeln!(html, "<img src=\"stream.jpg\" alt=\"live stream\">")?;
        writeln!(html, "</body>")?;
        writeln!(html, "</html>")?;
        Ok(http_response(&html))
    }

    fn render_control_list(&self, panel: &ControlPanel) -> Result<Vec<u8>, RenderError> {
        let mut html = String::new();
        writeln!(html, "<!DOCTYPE html>")?;
        writeln!(html, "<html>")?;
        writeln!(html, "<head><title>{} controls</title></head>", escape_html(&self.title))?;
        writeln!(html, "<body>")?;
        writeln!(html, "<table>")?;
        for control in panel.controls() {
            writeln!(html, "<tr><form action=\"update\" method=\"get\">")?;
            writeln!(html, "  <td>{}</td>", escape_html(&control.name))?;
            writeln!(
                html,
                "  <td><input type=\"hidden\" name=\"id\" value=\"{}\">\
                 <input type=\"number\" name=\"val\" value=\"{}\" min=\"{}\" max=\"{}\" step=\"{}\"></td>",
                control.id, control.value, control.min, control.max, control.step
            )?;
            writeln!(html, "  <td><input type=\"submit\" value=\"Set\"></td>")?;
            writeln!(html, "</form></tr>")?;
        }
        writeln!(html, "</table>")?;
        writeln!(html, "</body>")?;
        writeln!(html, "</html>")?;
        Ok(http_response(&html))
    }

    fn apply_control_update(
        &self,
        panel: &mut ControlPanel,
        request_line: &str,
    ) -> Result<(), RenderError> {
        let update = ControlUpdate::parse(request_line)?;
        let stored = panel.apply(update)?;
        info!(control = update.id, requested = update.value, stored, "control updated");
        Ok(())
    }
}

/// Wraps `body` in an HTTP/1.0 200 response.
fn http_response(body: &str) -> Vec<u8> {
    let mut response = format!(
        "HTTP/1.0 200 OK\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Cache-Control: no-cache\r\n\
         Connection: close\r\n\
         \r\n",
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(body.as_bytes());
    response
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use camcast_core::{classify, Control, RequestAction};

    fn body(response: &[u8]) -> String {
        let text = String::from_utf8(response.to_vec()).expect("utf-8");
        let (_, body) = text.split_once("\r\n\r\n").expect("header terminator");
        body.to_string()
    }

    fn panel_with_brightness() -> ControlPanel {
        ControlPanel::new(
            80,
            vec![Control {
                id: 1,
                name: "Brightness".to_string(),
                value: 128,
                min: 0,
                max: 255,
                step: 1,
            }],
        )
    }

    #[test]
    fn test_main_page_is_a_frameset_of_control_and_webcam() {
        let response = HtmlPageRenderer::default().render_main().expect("render");
        let html = body(&response);

        assert!(response.starts_with(b"HTTP/1.0 200 OK\r\n"));
        assert!(html.contains("<frameset"));
        assert!(html.contains("src=\"control\""));
        assert!(html.contains("src=\"webcam\""));
    }

    #[test]
    fn test_webcam_page_links_to_a_stream_url() {
        // Arrange
        let html = body(&HtmlPageRenderer::default().render_webcam().expect("render"));

        // Act: the browser requests whatever the img points at.
        let line = "GET /stream.jpg HTTP/1.1";

        // Assert
        assert!(html.contains("<img src=\"stream.jpg\""));
        assert_eq!(classify(Some(line)), Ok(RequestAction::VideoStream));
    }

    #[test]
    fn test_content_length_matches_body() {
        let response = HtmlPageRenderer::default().render_webcam().expect("render");
        let text = String::from_utf8(response).expect("utf-8");
        let (head, body) = text.split_once("\r\n\r\n").expect("terminator");

        assert!(head.contains(&format!("Content-Length: {}", body.len())));
    }

    #[test]
    fn test_control_page_lists_every_control_with_its_value() {
        let renderer = HtmlPageRenderer::default();
        let html = body(&renderer.render_control_list(&panel_with_brightness()).expect("render"));

        assert!(html.contains("JPEG quality"));
        assert!(html.contains("Brightness"));
        assert!(html.contains("name=\"val\" value=\"128\""));
        assert!(html.contains("action=\"update\""));
    }

    #[test]
    fn test_control_form_submission_classifies_as_update() {
        // A browser submitting the form sends /update?id=..&val=..
        let line = "GET /update?id=1&val=10 HTTP/1.1";
        assert_eq!(classify(Some(line)), Ok(RequestAction::UpdateControlValue));
    }

    #[test]
    fn test_apply_control_update_changes_the_panel() {
        // Arrange
        let renderer = HtmlPageRenderer::default();
        let mut panel = panel_with_brightness();

        // Act
        renderer
            .apply_control_update(&mut panel, "GET /update?id=1&val=42 HTTP/1.1")
            .expect("apply");

        // Assert
        assert_eq!(panel.get(1).map(|c| c.value), Some(42));
    }

    #[test]
    fn test_apply_control_update_rejects_unknown_control() {
        let renderer = HtmlPageRenderer::default();
        let mut panel = ControlPanel::default();

        let result = renderer.apply_control_update(&mut panel, "GET /update?id=9&val=1 HTTP/1.1");

        assert!(matches!(
            result,
            Err(RenderError::Control(ControlError::UnknownControl(9)))
        ));
    }

    #[test]
    fn test_names_are_html_escaped() {
        let renderer = HtmlPageRenderer::new("<cam & co>");
        let html = body(&renderer.render_main().expect("render"));
        assert!(html.contains("&lt;cam &amp; co&gt;"));
    }
}

//! Camera controls exposed on the control page.
//!
//! A [`ControlPanel`] is an ordered list of integer [`Control`]s (brightness,
//! contrast, ...) plus the JPEG quality used by the encoder.  The control
//! page renders one HTML form per control; submitting a form sends
//!
//! ```text
//! GET /update?id=<control id>&val=<new value> HTTP/1.1
//! ```
//!
//! which is parsed by [`ControlUpdate::parse`] and applied with
//! [`ControlPanel::apply`].  Values are clamped to the control's range and
//! snapped to its step.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Id of the built-in JPEG quality control.
pub const JPEG_QUALITY_ID: u32 = 0;

/// Default JPEG quality (percent).
pub const DEFAULT_JPEG_QUALITY: i32 = 80;

/// Errors produced while parsing or applying a control update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("control update request has no query string")]
    MissingQuery,
    #[error("control update request is missing the `{0}` parameter")]
    MissingParameter(&'static str),
    #[error("invalid value for `{name}`: {value:?}")]
    InvalidNumber { name: &'static str, value: String },
    #[error("no control with id {0}")]
    UnknownControl(u32),
}

/// One adjustable integer control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub id: u32,
    pub name: String,
    pub value: i32,
    pub min: i32,
    pub max: i32,
    #[serde(default = "default_step")]
    pub step: i32,
}

fn default_step() -> i32 {
    1
}

impl Control {
    /// Clamps `requested` into `[min, max]` and snaps it to the step grid
    /// anchored at `min`.
    pub fn normalize(&self, requested: i32) -> i32 {
        let clamped = requested.clamp(self.min, self.max);
        let step = self.step.max(1) as i64;
        let offset = (clamped as i64 - self.min as i64) / step * step;
        (self.min as i64 + offset) as i32
    }
}

/// A parsed `update?id=..&val=..` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlUpdate {
    pub id: u32,
    pub value: i32,
}

impl ControlUpdate {
    /// Parses a control update from a request line.
    ///
    /// The query string is taken from the request target (the second
    /// whitespace-separated token) when present, otherwise from the whole
    /// line.  Unknown parameters are ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`ControlError`] when the query string, `id` or `val` is
    /// missing, or when either is not an integer.
    pub fn parse(request_line: &str) -> Result<Self, ControlError> {
        let mut tokens = request_line.split_whitespace();
        let target = match (tokens.next(), tokens.next()) {
            (Some(_method), Some(target)) => target,
            (Some(only), None) => only,
            _ => return Err(ControlError::MissingQuery),
        };

        let (_, query) = target.split_once('?').ok_or(ControlError::MissingQuery)?;

        let mut id = None;
        let mut value = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("id", v)) => id = Some(v),
                Some(("val", v)) => value = Some(v),
                _ => {}
            }
        }

        let id = id.ok_or(ControlError::MissingParameter("id"))?;
        let value = value.ok_or(ControlError::MissingParameter("val"))?;

        Ok(Self {
            id: parse_number("id", id)?,
            value: parse_number("val", value)?,
        })
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ControlError> {
    // Browsers encode a leading minus sign in form values as `%2D`.
    let decoded = raw.replace("%2D", "-").replace("%2d", "-");
    decoded.parse().map_err(|_| ControlError::InvalidNumber {
        name,
        value: raw.to_string(),
    })
}

/// The set of controls shown on the control page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPanel {
    controls: Vec<Control>,
}

impl ControlPanel {
    /// Creates a panel with the JPEG quality control followed by `controls`.
    ///
    /// Controls whose id collides with the JPEG quality id, or with an
    /// earlier control, are dropped with a warning.
    pub fn new(jpeg_quality: i32, controls: Vec<Control>) -> Self {
        let quality = Control {
            id: JPEG_QUALITY_ID,
            name: "JPEG quality".to_string(),
            value: 0,
            min: 0,
            max: 100,
            step: 1,
        };
        let quality = Control {
            value: quality.normalize(jpeg_quality),
            ..quality
        };

        let mut all = vec![quality];
        for control in controls {
            if all.iter().any(|c| c.id == control.id) {
                tracing::warn!(id = control.id, name = %control.name, "duplicate control id ignored");
                continue;
            }
            let value = control.normalize(control.value);
            all.push(Control { value, ..control });
        }

        Self { controls: all }
    }

    /// All controls in display order.
    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    /// Looks up a control by id.
    pub fn get(&self, id: u32) -> Option<&Control> {
        self.controls.iter().find(|c| c.id == id)
    }

    /// Current JPEG quality (percent).
    pub fn jpeg_quality(&self) -> i32 {
        self.get(JPEG_QUALITY_ID)
            .map(|c| c.value)
            .unwrap_or(DEFAULT_JPEG_QUALITY)
    }

    /// Applies an update and returns the value actually stored.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::UnknownControl`] when no control has the id.
    pub fn apply(&mut self, update: ControlUpdate) -> Result<i32, ControlError> {
        let control = self
            .controls
            .iter_mut()
            .find(|c| c.id == update.id)
            .ok_or(ControlError::UnknownControl(update.id))?;

        control.value = control.normalize(update.value);
        Ok(control.value)
    }
}

impl Default for ControlPanel {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY, Vec::new())
    }
}

//! Domain types with no I/O.
//!
//! - **`frame`** – The borrowed [`Frame`] handed to the broadcaster once per
//!   capture, and the [`FrameRateMeter`] used to report the delivered FPS.
//! - **`controls`** – The [`ControlPanel`] of adjustable camera controls and
//!   the parser for control update requests.

pub mod controls;
pub mod frame;

pub use controls::{Control, ControlError, ControlPanel, ControlUpdate};
pub use frame::{Frame, FrameRateMeter};

//! Frame source implementations.
//!
//! | Module      | Source                                                   |
//! |-------------|----------------------------------------------------------|
//! | `directory` | Replays the JPEG files of a directory at a fixed rate    |
//! | `mock`      | Hand-driven source for tests                             |
//!
//! Device-specific capture backends plug in by implementing
//! [`camcast_core::FrameSource`].

pub mod directory;
pub mod mock;

pub use directory::DirectoryFrameSource;

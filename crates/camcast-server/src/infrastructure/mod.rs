//! Infrastructure layer for camcast-server.
//!
//! Handles all I/O: the listening socket, per-connection reads and writes,
//! frame sources and the configuration file.
//!
//! # What does NOT belong here?
//!
//! - Subscriber bookkeeping and the capture lifecycle (application layer)
//! - Request classification and stream framing (`camcast-core`)
//! - Command-line parsing (that is done in `main.rs`)

pub mod acceptor;
pub mod connection;
pub mod frame_source;
pub mod server;
pub mod storage;

pub use server::{ServerError, ServerHandle, StreamServer};

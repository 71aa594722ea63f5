//! Domain layer for camcast-server.
//!
//! Plain types with no dependencies on sockets, runtimes or the file system:
//!
//! - [`ServerConfig`], the single source of truth for runtime settings.
//! - [`ConnectionId`] and its generator, owned by the acceptor.

pub mod config;
pub mod connection;

pub use config::ServerConfig;
pub use connection::{ConnectionId, ConnectionIdGenerator};

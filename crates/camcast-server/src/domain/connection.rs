//! Connection identity.
//!
//! Every accepted connection gets a [`ConnectionId`].  The same id names the
//! subscription if the connection is promoted to a stream viewer, so log
//! lines for one viewer can be followed from accept to disconnect.
//!
//! The generator is a plain counter owned by the acceptor.  There is exactly
//! one accept loop per server, so no atomics or global state are needed.

use std::fmt;

/// Unique id of an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wraps a raw id.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out monotonically increasing connection ids, starting at 1.
#[derive(Debug)]
pub struct ConnectionIdGenerator {
    next: u64,
}

impl ConnectionIdGenerator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Returns the next id.
    pub fn next_id(&mut self) -> ConnectionId {
        let id = ConnectionId(self.next);
        self.next += 1;
        id
    }
}

impl Default for ConnectionIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

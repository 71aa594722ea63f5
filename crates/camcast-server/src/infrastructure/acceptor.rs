//! TCP accept loop.
//!
//! The [`Acceptor`] owns the listening socket and the connection id counter.
//! Each accepted connection gets a fresh id, `TCP_NODELAY`, and its own
//! worker task, so a slow viewer never delays the next accept.
//!
//! The loop ends when the shutdown signal fires, or on an accept error that
//! is not one of the per-connection kinds a busy server sees routinely.  The
//! listener is dropped (closed) when [`Acceptor::run`] returns.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::domain::ConnectionIdGenerator;
use crate::infrastructure::connection::{handle_connection, ConnectionContext};
use crate::infrastructure::server::ServerError;

/// Listen backlog for the viewer socket.
const LISTEN_BACKLOG: u32 = 128;

/// Pause after running out of file descriptors, before accepting again.
const FD_EXHAUSTION_BACKOFF: Duration = Duration::from_millis(100);

/// Binds the viewer listener.
///
/// `SO_KEEPALIVE` is set on the listening socket so accepted connections
/// inherit it; idle viewers of a stopped stream are eventually detected.
///
/// # Errors
///
/// Returns the underlying I/O error if the socket cannot be created, bound or
/// put into listening state (e.g. the port is in use).
pub fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };

    #[cfg(unix)]
    socket.set_reuseaddr(true)?;
    socket.set_keepalive(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

/// Accepts viewer connections and hands each one to a worker task.
pub struct Acceptor {
    listener: TcpListener,
    context: Arc<ConnectionContext>,
    ids: ConnectionIdGenerator,
}

impl Acceptor {
    pub fn new(listener: TcpListener, context: Arc<ConnectionContext>) -> Self {
        Self {
            listener,
            context,
            ids: ConnectionIdGenerator::new(),
        }
    }

    /// Runs the accept loop until `shutdown` turns `true` (or its sender is
    /// dropped).
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Accept`] when the listener fails in a way that
    /// retrying will not fix.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), ServerError> {
        loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => {
                    info!("accept loop stopping");
                    return Ok(());
                }
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => self.dispatch(stream, peer),
                Err(e) if is_fd_exhaustion(&e) => {
                    warn!("accept failed, out of file descriptors: {e}");
                    tokio::time::sleep(FD_EXHAUSTION_BACKOFF).await;
                }
                Err(e) if is_transient(&e) => {
                    debug!("accept failed for one connection: {e}");
                }
                Err(e) => {
                    error!("accept loop failed: {e}");
                    return Err(ServerError::Accept(e));
                }
            }
        }
    }

    fn dispatch(&mut self, stream: TcpStream, peer: SocketAddr) {
        let id = self.ids.next_id();
        if let Err(e) = stream.set_nodelay(true) {
            warn!(connection = %id, %peer, "failed to configure connection, dropping it: {e}");
            return;
        }

        debug!(connection = %id, %peer, "connection accepted");
        tokio::spawn(handle_connection(id, stream, peer, Arc::clone(&self.context)));
    }
}

/// Errors that concern only the connection being accepted.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

/// `EMFILE` / `ENFILE`: the process or system is out of descriptors.
fn is_fd_exhaustion(e: &io::Error) -> bool {
    cfg!(unix) && matches!(e.raw_os_error(), Some(23) | Some(24))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_are_transient() {
        for kind in [
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::Interrupted,
        ] {
            assert!(is_transient(&io::Error::from(kind)), "{kind:?}");
        }
    }

    #[test]
    fn test_listener_level_errors_are_not_transient() {
        assert!(!is_transient(&io::Error::from(io::ErrorKind::InvalidInput)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[cfg(unix)]
    #[test]
    fn test_emfile_is_fd_exhaustion() {
        assert!(is_fd_exhaustion(&io::Error::from_raw_os_error(24)));
        assert!(!is_fd_exhaustion(&io::Error::from(io::ErrorKind::Other)));
    }

    #[tokio::test]
    async fn test_bind_listener_on_ephemeral_port() {
        let listener = bind_listener("127.0.0.1:0".parse().expect("addr")).expect("bind");
        let addr = listener.local_addr().expect("local addr");
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_bind_listener_fails_when_port_is_taken() {
        let first = bind_listener("127.0.0.1:0".parse().expect("addr")).expect("bind");
        let addr = first.local_addr().expect("local addr");

        let second = bind_listener(addr);

        assert!(second.is_err());
    }
}

//! camcast-server library crate.
//!
//! This crate serves a live MJPEG stream to any number of TCP viewers and
//! answers the small set of HTML pages that go with it.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Viewer (one request line over TCP)
//!         ↕
//! [camcast-server]
//!   ├── domain/           ServerConfig, ConnectionId
//!   ├── application/
//!   │     ├── registry/   ClientRegistry: who is subscribed to the stream
//!   │     ├── capture/    CaptureLifecycleController: start/stop the producer
//!   │     ├── broadcast/  FrameBroadcaster: one frame → every subscriber
//!   │     └── pages/      PageRenderer + HtmlPageRenderer
//!   └── infrastructure/
//!         ├── acceptor/   TCP accept loop
//!         ├── connection/ per-connection worker and the TCP subscription
//!         ├── frame_source/ DirectoryFrameSource
//!         ├── storage/    TOML configuration file
//!         └── server/     StreamServer: wiring and ordered shutdown
//! ```
//!
//! # Data flow
//!
//! ```text
//! Acceptor → ConnectionWorker → classify ─┬─► page response, close
//!                                         └─► ClientRegistry::add (first viewer starts capture)
//!
//! FrameSource → FrameBroadcaster → snapshot → write to each subscriber
//!                                     └─ on failure: remove (last viewer stops capture) + close
//! ```

/// Domain layer: configuration and identity types (no I/O).
pub mod domain;

/// Application layer: registry, capture lifecycle, broadcasting, pages.
pub mod application;

/// Infrastructure layer: sockets, frame sources, config files, server wiring.
pub mod infrastructure;

//! The injected collaborator contracts: a WebSocket listener factory and
//! its per-connection object, plus the borrowed-HTTP-listener handle used
//! by deployment modes B and C.
//!
//! These traits are the Rust realisation of the external interfaces the
//! core treats as opaque collaborators: nothing in this module parses
//! WebSocket frames or owns an HTTP server's internals.

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Lifecycle state of a per-connection object, mirroring the WebSocket
/// spec's `readyState`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadyState {
    /// The opening handshake has not yet completed.
    Connecting,
    /// The connection is open and ready to send/receive.
    Open,
    /// The closing handshake has started.
    Closing,
    /// The connection is fully closed.
    Closed,
}

/// An event emitted by a connected peer.
#[derive(Clone, Debug)]
pub enum ConnectionEvent {
    /// A text frame was received.
    Message(String),
    /// A non-text (binary) frame was received. The core classifies this as
    /// a protocol violation and disconnects the client.
    Binary(Vec<u8>),
    /// A pong frame was received, answering an outstanding ping.
    Pong,
    /// The peer initiated (or completed) a close handshake.
    Close {
        /// WebSocket close code, if known.
        code: Option<u16>,
        /// Close reason text.
        reason: String,
    },
}

/// The per-connection object the core drives: send/ping/close/terminate
/// plus an event stream of inbound `message`/`pong`/`close`.
#[async_trait]
pub trait WsConnection: Send + Sync {
    /// Send a text frame. Resolves with an error if the write fails.
    async fn send(&self, message: String) -> Result<(), String>;

    /// Send a ping frame. Resolves with an error if the write fails.
    async fn ping(&self) -> Result<(), String>;

    /// Start an orderly close handshake with the given code and reason.
    fn close(&self, code: u16, reason: &str);

    /// Forcibly tear down the underlying socket without a close handshake.
    fn terminate(&self);

    /// Current `readyState`.
    fn ready_state(&self) -> ReadyState;

    /// Take ownership of this connection's inbound event stream. Must be
    /// called exactly once per connection, immediately after it is
    /// accepted and before any event can be missed.
    fn take_events(&self) -> mpsc::Receiver<ConnectionEvent>;
}

/// An event emitted by an owned ([`WsListener`]) listener.
pub enum WsListenerEvent {
    /// The listener is bound and accepting connections.
    Listening,
    /// A new connection completed its handshake.
    Connection(Box<dyn WsConnection>),
    /// The listener closed (in response to a requested close, or
    /// unexpectedly).
    Close,
    /// The listener failed.
    Error(String),
}

/// A listener the core owns outright (deployment Mode A).
#[async_trait]
pub trait WsListener: Send {
    /// Wait for the next listener-level event.
    async fn next_event(&mut self) -> WsListenerEvent;

    /// Request the listener close. Resolves once the close is acknowledged.
    async fn close(&mut self);
}

/// A lifecycle event of a borrowed, externally-owned HTTP listener
/// (deployment Modes B/C).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BorrowedHttpEvent {
    /// The HTTP listener started accepting connections.
    Listening,
    /// The HTTP listener closed.
    Close,
    /// The HTTP listener emitted an error.
    Error(String),
}

/// A raw, already-accepted TCP stream handed to the core for a WebSocket
/// upgrade, together with the originating HTTP request. Produced by a
/// [`BorrowedHttpHandle`]'s upgrade channel, or passed directly to
/// `handle_upgrade` in no-listener mode.
pub struct UpgradeHandoff {
    /// The accepted TCP stream, still at the pre-handshake stage.
    pub stream: tokio::net::TcpStream,
    /// The client-proposed subprotocols from the HTTP upgrade request.
    pub proposed_subprotocols: Vec<String>,
}

/// A handle onto an externally-owned HTTP listener (deployment Modes B/C).
#[async_trait]
pub trait BorrowedHttpHandle: Send + Sync {
    /// Whether the HTTP listener is currently accepting connections.
    fn is_listening(&self) -> bool;

    /// Wait for the next lifecycle event of the HTTP listener.
    async fn next_event(&self) -> BorrowedHttpEvent;

    /// Take ownership of the channel of raw upgrade hand-offs the host
    /// pushes WebSocket upgrade requests onto. Called exactly once, at
    /// controller startup.
    fn take_upgrades(&self) -> mpsc::Receiver<UpgradeHandoff>;
}

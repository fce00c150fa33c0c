//! Error taxonomy for the feedme WebSocket transport.
//!
//! Every error raised or emitted by the transport core carries one of four
//! kinds: [`ServerError::InvalidArgument`] and [`ServerError::InvalidState`]
//! are caller-induced and raised synchronously from the public API;
//! [`ServerError::Failure`] is operational and never raised to a caller,
//! only ever surfaced as a notification; [`ServerError::Stopping`] marks a
//! per-client disconnect caused by a graceful or forced server shutdown.

use thiserror::Error;

/// Operational failure sub-kinds. Always wrapped in [`ServerError::Failure`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureKind {
    /// The injected listener factory failed to construct a listener.
    #[error("listener failed to initialize: {0}")]
    ListenerInit(String),

    /// An already-started listener emitted `close` or `error` unexpectedly.
    #[error("listener collapsed: {0}")]
    ListenerCollapsed(String),

    /// A borrowed HTTP listener never emitted `listening` within the
    /// allocated startup deadline.
    #[error("external http listener did not start within the allocated time")]
    HttpListenTimeout,

    /// A borrowed HTTP listener that was listening has stopped.
    #[error("external http listener stopped listening")]
    HttpListenerStopped,

    /// A borrowed HTTP listener emitted `close`/`error` before it ever
    /// reached `listening`.
    #[error("external http listener failed to start: {0}")]
    HttpListenerStartupFailed(String),

    /// A background task tracked by the process-wide shutdown coordinator
    /// did not finish within its allotted drain window.
    #[error("graceful shutdown timed out waiting for background tasks")]
    ShutdownTimedOut,

    /// A connection missed too many consecutive heartbeat pongs.
    #[error("heartbeat failed")]
    HeartbeatFailed,

    /// A `send` completion callback reported an error.
    #[error("transmit failed: {0}")]
    TransmitFailed(String),

    /// The peer sent a non-text (binary) frame.
    #[error("received non-string message")]
    NonStringMessage,

    /// The peer closed the connection.
    #[error("peer closed")]
    PeerClosed,
}

/// Top-level error type for the transport core.
#[derive(Debug, Clone, Error)]
pub enum ServerError {
    /// A caller passed an argument of the wrong type or shape.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A caller invoked an operation in a state that does not permit it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An operational failure, never raised synchronously to a caller.
    #[error("failure: {0}")]
    Failure(#[from] FailureKind),

    /// The connection was torn down as part of a server shutdown.
    #[error("stopping")]
    Stopping,
}

impl ServerError {
    /// The wire-level error kind string fixed by contract.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::Failure(_) => "FAILURE",
            Self::Stopping => "STOPPING",
        }
    }

    /// Whether this error is operational, i.e. never raised synchronously
    /// to a caller and always delivered as a notification.
    #[must_use]
    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Failure(_) | Self::Stopping)
    }

    /// Shorthand for an [`ServerError::InvalidArgument`].
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Shorthand for an [`ServerError::InvalidState`].
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }
}

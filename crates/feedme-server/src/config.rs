//! The server's data model: the deployment selector, `ServerOptions`, and
//! `ServerState`.

use std::sync::Arc;

use feedme_core::ServerError;

use crate::clock::{DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_HEARTBEAT_TIMEOUT_MS};
use crate::listener::BorrowedHttpHandle;

/// Selects exactly one of the four deployment modes. A tagged enum rather
/// than an inheritance hierarchy: the controller matches on this once at
/// startup and the match arms are the four documented behaviors.
pub enum DeploymentMode {
    /// Mode A: the core owns its own `TcpListener` bound to `port`.
    OwnListener {
        /// Port to bind. `0` selects an OS-assigned ephemeral port.
        port: u16,
    },
    /// Modes B/C: an externally-owned HTTP listener the core borrows,
    /// which may already be listening (B) or not yet (C).
    BorrowedHttp {
        /// Handle onto the borrowed listener.
        handle: Arc<dyn BorrowedHttpHandle>,
    },
    /// Mode D: no listener at all; upgrades arrive solely through calls to
    /// `handle_upgrade`.
    NoListener,
}

impl std::fmt::Debug for DeploymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OwnListener { port } => f.debug_struct("OwnListener").field("port", port).finish(),
            Self::BorrowedHttp { .. } => f.debug_struct("BorrowedHttp").finish_non_exhaustive(),
            Self::NoListener => write!(f, "NoListener"),
        }
    }
}

/// Options accepted at server construction time.
pub struct ServerOptions {
    /// Exactly one of the four supported deployment modes.
    pub deployment: DeploymentMode,
    /// Heartbeat interval in milliseconds. `0` disables heartbeat
    /// supervision entirely.
    pub heartbeat_interval_ms: u64,
    /// Heartbeat pong timeout in milliseconds. Ignored when
    /// `heartbeat_interval_ms` is `0`. Must be strictly less than the
    /// interval when heartbeat is enabled.
    pub heartbeat_timeout_ms: u64,
}

impl ServerOptions {
    /// Construct options for deployment Mode A (own listener) with default
    /// heartbeat timing.
    #[must_use]
    pub fn own_listener(port: u16) -> Self {
        Self {
            deployment: DeploymentMode::OwnListener { port },
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            heartbeat_timeout_ms: DEFAULT_HEARTBEAT_TIMEOUT_MS,
        }
    }

    /// Construct options for deployment Modes B/C (borrowed HTTP listener)
    /// with default heartbeat timing.
    #[must_use]
    pub fn borrowed_http(handle: Arc<dyn BorrowedHttpHandle>) -> Self {
        Self {
            deployment: DeploymentMode::BorrowedHttp { handle },
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            heartbeat_timeout_ms: DEFAULT_HEARTBEAT_TIMEOUT_MS,
        }
    }

    /// Construct options for deployment Mode D (no listener) with default
    /// heartbeat timing.
    #[must_use]
    pub fn no_listener() -> Self {
        Self {
            deployment: DeploymentMode::NoListener,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            heartbeat_timeout_ms: DEFAULT_HEARTBEAT_TIMEOUT_MS,
        }
    }

    /// Disable heartbeat supervision.
    #[must_use]
    pub fn without_heartbeat(mut self) -> Self {
        self.heartbeat_interval_ms = 0;
        self
    }

    /// Override the heartbeat interval/timeout pair.
    #[must_use]
    pub fn with_heartbeat(mut self, interval_ms: u64, timeout_ms: u64) -> Self {
        self.heartbeat_interval_ms = interval_ms;
        self.heartbeat_timeout_ms = timeout_ms;
        self
    }

    /// Validate the interval/timeout relationship. Called once at
    /// `start()`, not at construction time, so options can be built
    /// incrementally.
    pub(crate) fn validate(&self) -> Result<(), ServerError> {
        if self.heartbeat_interval_ms > 0 && self.heartbeat_timeout_ms >= self.heartbeat_interval_ms
        {
            return Err(ServerError::invalid_argument(format!(
                "heartbeat_timeout_ms ({}) must be less than heartbeat_interval_ms ({}) when heartbeat is enabled",
                self.heartbeat_timeout_ms, self.heartbeat_interval_ms
            )));
        }
        Ok(())
    }

    /// Whether heartbeat supervision is enabled.
    pub(crate) fn heartbeat_enabled(&self) -> bool {
        self.heartbeat_interval_ms > 0
    }
}

/// The server's externally observable lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServerState {
    /// Not started, or fully stopped.
    Stopped,
    /// `start()` has been called and has not yet resolved.
    Starting,
    /// Started and accepting/serving connections.
    Started,
    /// `stop()` has been called and has not yet resolved.
    Stopping,
}

impl ServerState {
    /// Whether a `start()` call is permitted from this state.
    pub(crate) fn can_start(self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Whether a `stop()` call is permitted from this state.
    pub(crate) fn can_stop(self) -> bool {
        matches!(self, Self::Started)
    }
}

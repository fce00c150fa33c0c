//! The actor-owned record of one connected client.

use std::sync::Arc;

use feedme_core::ClientId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::listener::WsConnection;

/// Everything the actor tracks for one connected client.
///
/// Owned exclusively by the actor task: no field here is ever locked,
/// because nothing outside the actor's own turn ever touches it. The
/// heartbeat task for this connection gets its own handle to the
/// connection object plus the cancellation token and pong notifier, never
/// a reference to this struct itself.
pub struct ConnectionRecord {
    /// This connection's opaque identifier.
    pub id: ClientId,
    /// The underlying send/ping/close/terminate object.
    pub connection: Arc<dyn WsConnection>,
    /// Cancelled when the connection is disposed, tearing down its
    /// heartbeat task.
    pub heartbeat_cancel: CancellationToken,
    /// Notifies the heartbeat task that a pong arrived.
    pub pong_tx: mpsc::Sender<()>,
    /// Set once the Failure Resolver (or an explicit `disconnect`) has
    /// processed this connection, so a second report for the same
    /// connection becomes a silent no-op.
    disposed: bool,
}

impl ConnectionRecord {
    /// Build a new record for a freshly accepted connection.
    #[must_use]
    pub fn new(id: ClientId, connection: Arc<dyn WsConnection>, pong_tx: mpsc::Sender<()>) -> Self {
        Self {
            id,
            connection,
            heartbeat_cancel: CancellationToken::new(),
            pong_tx,
            disposed: false,
        }
    }

    /// Whether this record has already been torn down.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Mark this record as torn down and stop its heartbeat task. Safe to
    /// call more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.heartbeat_cancel.cancel();
    }
}

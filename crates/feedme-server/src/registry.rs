//! The connection table and the Failure Resolver funnel every connection
//! teardown path runs through.

use std::collections::HashMap;

use feedme_core::{ClientId, FailureKind, ServerError};

use crate::websocket::connection::ConnectionRecord;

/// The live set of connected clients.
///
/// A plain `HashMap`, not a `RwLock<HashMap<..>>`: this type is owned
/// exclusively by the actor task and mutated only from within its
/// serialised turn, so no internal synchronisation is needed.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ClientId, ConnectionRecord>,
}

impl ConnectionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly accepted connection.
    pub fn insert(&mut self, record: ConnectionRecord) {
        let _ = self.connections.insert(record.id.clone(), record);
    }

    /// Look up a connection by id.
    #[must_use]
    pub fn get(&self, id: &ClientId) -> Option<&ConnectionRecord> {
        self.connections.get(id)
    }

    /// Whether a connection with this id is currently registered.
    #[must_use]
    pub fn contains(&self, id: &ClientId) -> bool {
        self.connections.contains_key(id)
    }

    /// Number of currently registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the registry holds no connections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// All currently registered connection ids.
    pub fn ids(&self) -> impl Iterator<Item = &ClientId> {
        self.connections.keys()
    }

    /// Remove and return a connection's record, disposing it first.
    pub fn remove(&mut self, id: &ClientId) -> Option<ConnectionRecord> {
        let mut record = self.connections.remove(id)?;
        record.dispose();
        Some(record)
    }

    /// The idempotent teardown funnel every failure path runs through:
    /// heartbeat timeout, ping error, transmit error, peer close, and
    /// non-string inbound messages all call this with the `FailureKind`
    /// that explains the disconnect.
    ///
    /// Checks registry membership first. If the connection is already
    /// gone — because another path tore it down first, or because a
    /// send-completion error arrived after teardown already happened —
    /// this returns `None` and the caller emits nothing, rather than
    /// reporting a disconnect for a client that already disconnected.
    pub fn resolve_failure(&mut self, id: &ClientId, kind: FailureKind) -> Option<ServerError> {
        let mut record = self.connections.remove(id)?;
        record.dispose();
        record.connection.terminate();
        Some(ServerError::from(kind))
    }

    /// Dispose every connection without emitting per-connection events.
    /// Used during shutdown, where the controller emits one aggregate
    /// `disconnect` round rather than relying on the Failure Resolver.
    pub fn drain(&mut self) -> Vec<ConnectionRecord> {
        let mut records: Vec<ConnectionRecord> = self.connections.drain().map(|(_, v)| v).collect();
        for record in &mut records {
            record.dispose();
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{ConnectionEvent, ReadyState, WsConnection};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct StubConnection;

    #[async_trait]
    impl WsConnection for StubConnection {
        async fn send(&self, _message: String) -> Result<(), String> {
            Ok(())
        }
        async fn ping(&self) -> Result<(), String> {
            Ok(())
        }
        fn close(&self, _code: u16, _reason: &str) {}
        fn terminate(&self) {}
        fn ready_state(&self) -> ReadyState {
            ReadyState::Open
        }
        fn take_events(&self) -> mpsc::Receiver<ConnectionEvent> {
            let (_tx, rx) = mpsc::channel(1);
            rx
        }
    }

    fn make_record(id: ClientId) -> ConnectionRecord {
        let (pong_tx, _pong_rx) = mpsc::channel(1);
        ConnectionRecord::new(id, Arc::new(StubConnection), pong_tx)
    }

    #[test]
    fn insert_and_contains() {
        let mut registry = ConnectionRegistry::new();
        let id = ClientId::default();
        registry.insert(make_record(id.clone()));
        assert!(registry.contains(&id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn resolve_failure_on_known_connection_returns_error() {
        let mut registry = ConnectionRegistry::new();
        let id = ClientId::default();
        registry.insert(make_record(id.clone()));

        let result = registry.resolve_failure(&id, FailureKind::PeerClosed);
        assert!(result.is_some());
        assert!(!registry.contains(&id));
    }

    #[test]
    fn resolve_failure_on_unknown_connection_is_silent() {
        let mut registry = ConnectionRegistry::new();
        let id = ClientId::default();

        let result = registry.resolve_failure(&id, FailureKind::PeerClosed);
        assert!(result.is_none());
    }

    #[test]
    fn resolve_failure_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        let id = ClientId::default();
        registry.insert(make_record(id.clone()));

        let first = registry.resolve_failure(&id, FailureKind::HeartbeatFailed);
        let second = registry.resolve_failure(&id, FailureKind::HeartbeatFailed);
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[test]
    fn remove_disposes_record() {
        let mut registry = ConnectionRegistry::new();
        let id = ClientId::default();
        registry.insert(make_record(id.clone()));

        let record = registry.remove(&id).unwrap();
        assert!(record.is_disposed());
        assert!(registry.is_empty());
    }

    #[test]
    fn drain_empties_registry_and_disposes_all() {
        let mut registry = ConnectionRegistry::new();
        registry.insert(make_record(ClientId::default()));
        registry.insert(make_record(ClientId::default()));

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(drained.iter().all(ConnectionRecord::is_disposed));
        assert!(registry.is_empty());
    }
}

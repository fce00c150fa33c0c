//! The fixed set of events the public API emits.

use feedme_core::{ClientId, ServerError};

/// An event broadcast to every `ServerEvent` subscriber.
///
/// Event names and payload shapes are fixed: hosts depend on matching
/// against these variants, not against string literals.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// `start()` has begun; the server is transitioning out of `Stopped`.
    Starting,
    /// The server reached `Started` and is ready to accept connections.
    Start,
    /// `stop()` has begun. Carries the error that triggered an
    /// unrequested stop, if any.
    Stopping(Option<ServerError>),
    /// The server reached `Stopped`. Carries the error that triggered an
    /// unrequested stop, if any.
    Stop(Option<ServerError>),
    /// A client completed its connection handshake.
    Connect(ClientId),
    /// A text message arrived from a client.
    Message(ClientId, String),
    /// A client was disconnected. Carries the failure that caused the
    /// disconnect, if it wasn't an explicit `disconnect()` call.
    Disconnect(ClientId, Option<ServerError>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_carries_client_id() {
        let id = ClientId::default();
        let event = ServerEvent::Connect(id.clone());
        match event {
            ServerEvent::Connect(got) => assert_eq!(got, id),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn stop_without_error_is_requested_stop() {
        let event = ServerEvent::Stop(None);
        assert!(matches!(event, ServerEvent::Stop(None)));
    }

    #[test]
    fn disconnect_carries_failure() {
        let id = ClientId::default();
        let event = ServerEvent::Disconnect(id, Some(ServerError::invalid_state("x")));
        assert!(matches!(event, ServerEvent::Disconnect(_, Some(_))));
    }
}

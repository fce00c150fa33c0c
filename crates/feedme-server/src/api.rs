//! The public, `Clone`-able handle onto a running (or not-yet-started)
//! transport server.

use feedme_core::{ClientId, ServerError};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::actor::{ActorMessage, ServerActor};
use crate::config::{ServerOptions, ServerState};
use crate::events::ServerEvent;
use crate::listener::UpgradeHandoff;

const EVENT_BROADCAST_CAPACITY: usize = 256;

/// A handle onto the transport server's actor. Cheap to clone; every
/// clone shares the same mailbox and event stream.
#[derive(Clone)]
pub struct FeedmeServer {
    mailbox_tx: mpsc::Sender<ActorMessage>,
    events_tx: broadcast::Sender<ServerEvent>,
}

impl FeedmeServer {
    /// Construct a server around `options`. Does not start it; call
    /// [`FeedmeServer::start`].
    #[must_use]
    pub fn new(options: ServerOptions) -> Self {
        let (events_tx, _events_rx) = broadcast::channel(EVENT_BROADCAST_CAPACITY);
        let (actor, mailbox_tx) = ServerActor::new(options, events_tx.clone());
        tokio::spawn(actor.run());
        Self {
            mailbox_tx,
            events_tx,
        }
    }

    /// Subscribe to the server's event stream. Each subscriber gets its
    /// own lagging-tolerant receiver; events emitted before a given
    /// subscription was created are not replayed to it.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events_tx.subscribe()
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ServerState {
        let (tx, rx) = oneshot::channel();
        if self.mailbox_tx.send(ActorMessage::StateQuery(tx)).await.is_err() {
            return ServerState::Stopped;
        }
        rx.await.unwrap_or(ServerState::Stopped)
    }

    /// Start the server. Resolves once `Started` is reached, or with the
    /// error that aborted startup.
    pub async fn start(&self) -> Result<(), ServerError> {
        self.call(ActorMessage::Start).await
    }

    /// Stop the server, disconnecting every connected client first.
    /// Resolves once `Stopped` is reached.
    pub async fn stop(&self) -> Result<(), ServerError> {
        self.call(ActorMessage::Stop).await
    }

    /// Send a text message to one connected client.
    pub async fn send(&self, client: ClientId, message: impl Into<String>) -> Result<(), ServerError> {
        let message = message.into();
        self.call(|ack| ActorMessage::Send(client, message, ack)).await
    }

    /// Disconnect a connected client without treating it as a failure.
    pub async fn disconnect(&self, client: ClientId) -> Result<(), ServerError> {
        self.call(|ack| ActorMessage::Disconnect(client, ack)).await
    }

    /// Hand a raw, externally accepted TCP stream to the server for a
    /// WebSocket upgrade. Valid only in no-listener deployment mode.
    pub async fn handle_upgrade(&self, handoff: UpgradeHandoff) -> Result<(), ServerError> {
        self.call(|ack| ActorMessage::HandleUpgrade(handoff, ack)).await
    }

    async fn call(&self, build: impl FnOnce(oneshot::Sender<Result<(), ServerError>>) -> ActorMessage) -> Result<(), ServerError> {
        let (tx, rx) = oneshot::channel();
        if self.mailbox_tx.send(build(tx)).await.is_err() {
            return Err(ServerError::invalid_state("server actor has shut down"));
        }
        rx.await
            .unwrap_or_else(|_| Err(ServerError::invalid_state("server actor dropped the response")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerOptions;

    #[tokio::test]
    async fn new_server_starts_stopped() {
        let server = FeedmeServer::new(ServerOptions::no_listener());
        assert_eq!(server.state().await, ServerState::Stopped);
    }

    #[tokio::test]
    async fn start_and_stop_no_listener_mode() {
        let server = FeedmeServer::new(ServerOptions::no_listener());
        server.start().await.unwrap();
        assert_eq!(server.state().await, ServerState::Started);
        server.stop().await.unwrap();
        assert_eq!(server.state().await, ServerState::Stopped);
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let server = FeedmeServer::new(ServerOptions::no_listener());
        server.start().await.unwrap();
        let second = server.start().await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn stop_before_start_is_rejected() {
        let server = FeedmeServer::new(ServerOptions::no_listener());
        let result = server.stop().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn invalid_heartbeat_relationship_rejected_at_start() {
        let server = FeedmeServer::new(ServerOptions::own_listener(0).with_heartbeat(100, 100));
        let result = server.start().await;
        assert!(result.is_err());
        assert_eq!(server.state().await, ServerState::Stopped);
    }

    #[tokio::test]
    async fn subscribers_see_starting_and_start_events() {
        let server = FeedmeServer::new(ServerOptions::no_listener());
        let mut events = server.subscribe();
        server.start().await.unwrap();

        let first = events.recv().await.unwrap();
        assert!(matches!(first, ServerEvent::Starting));
        let second = events.recv().await.unwrap();
        assert!(matches!(second, ServerEvent::Start));
    }

    #[tokio::test]
    async fn send_to_unknown_client_is_invalid_state() {
        let server = FeedmeServer::new(ServerOptions::no_listener());
        server.start().await.unwrap();
        let result = server.send(ClientId::default(), "hi").await;
        assert!(matches!(result, Err(ServerError::InvalidState(_))));
    }

    #[tokio::test]
    async fn disconnect_of_unknown_client_is_invalid_state() {
        let server = FeedmeServer::new(ServerOptions::no_listener());
        server.start().await.unwrap();
        let result = server.disconnect(ClientId::default()).await;
        assert!(matches!(result, Err(ServerError::InvalidState(_))));
    }
}

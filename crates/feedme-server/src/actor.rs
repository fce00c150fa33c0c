//! The lifecycle controller, realised as a single actor task.
//!
//! Every public-API call, every listener/connection event, and every
//! heartbeat outcome is a message posted to one `mpsc` mailbox and
//! processed strictly in arrival order. This is what "single-threaded
//! cooperative scheduling" becomes in async Rust: no field on
//! [`ServerActor`] is ever behind a lock, because nothing outside this
//! task's own turn ever touches it, and "emit on next turn" is simply
//! "post another message to this same mailbox" rather than a timer.

use std::sync::Arc;
use std::time::Duration;

use feedme_core::{ClientId, FailureKind, ServerError};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::clock::{ClockTimers, HTTP_LISTENING_MS, HTTP_POLLING_MS, TokioClock};
use crate::config::{DeploymentMode, ServerOptions, ServerState};
use crate::events::ServerEvent;
use crate::listener::{
    BorrowedHttpEvent, ConnectionEvent, UpgradeHandoff, WsListener, WsListenerEvent,
};
use crate::listener_tungstenite::{TcpWsListener, accept_handoff};
use crate::registry::ConnectionRegistry;
use crate::websocket::connection::ConnectionRecord;
use crate::websocket::heartbeat::{HeartbeatOutcome, run_heartbeat};

type Ack = oneshot::Sender<Result<(), ServerError>>;

/// Every message the actor's mailbox accepts.
pub enum ActorMessage {
    /// `start()` was called.
    Start(Ack),
    /// `stop()` was called.
    Stop(Ack),
    /// `send(client, message)` was called.
    Send(ClientId, String, Ack),
    /// `disconnect(client)` was called.
    Disconnect(ClientId, Ack),
    /// `handle_upgrade(handoff)` was called (Mode D only).
    HandleUpgrade(UpgradeHandoff, Ack),
    /// `state()` was called.
    StateQuery(oneshot::Sender<ServerState>),
    /// An event from an owned listener (Mode A).
    Listener(WsListenerEvent),
    /// An event from a borrowed HTTP listener (Modes B/C).
    BorrowedHttp(BorrowedHttpEvent),
    /// A raw upgrade hand-off pushed by a borrowed HTTP listener.
    BorrowedUpgrade(UpgradeHandoff),
    /// The borrowed-HTTP startup poll gave up waiting for `is_listening()`.
    BorrowedHttpStartupTimeout,
    /// A per-connection inbound event.
    Connection(ClientId, ConnectionEvent),
    /// A heartbeat task for one connection concluded.
    Heartbeat(ClientId, HeartbeatOutcome),
    /// The owned listener (Mode A) finished acknowledging a requested
    /// close, satisfying the shutdown ordering guarantee.
    ListenerClosed,
}

/// A handle the heartbeat/listener tasks use to post back into the
/// actor's mailbox.
pub type MailboxSender = mpsc::Sender<ActorMessage>;

struct PendingStop {
    acks: Vec<Ack>,
    cause: Option<ServerError>,
}

/// The lifecycle controller's owned state and mailbox loop.
pub struct ServerActor {
    options: ServerOptions,
    state: ServerState,
    registry: ConnectionRegistry,
    mailbox_tx: MailboxSender,
    mailbox_rx: mpsc::Receiver<ActorMessage>,
    events_tx: tokio::sync::broadcast::Sender<ServerEvent>,
    has_listener: bool,
    shutdown_token: CancellationToken,
    pending_stop: Option<PendingStop>,
    pending_start: Vec<Ack>,
}

impl ServerActor {
    /// Build a new actor and its mailbox handle. Does not start the
    /// server; call [`ServerActor::run`] after sending a `Start` message.
    #[must_use]
    pub fn new(
        options: ServerOptions,
        events_tx: tokio::sync::broadcast::Sender<ServerEvent>,
    ) -> (Self, MailboxSender) {
        let (mailbox_tx, mailbox_rx) = mpsc::channel(256);
        let actor = Self {
            options,
            state: ServerState::Stopped,
            registry: ConnectionRegistry::new(),
            mailbox_tx: mailbox_tx.clone(),
            mailbox_rx,
            events_tx,
            has_listener: false,
            shutdown_token: CancellationToken::new(),
            pending_stop: None,
            pending_start: Vec::new(),
        };
        (actor, mailbox_tx)
    }

    fn emit(&self, event: ServerEvent) {
        let _ = self.events_tx.send(event);
    }

    fn heartbeat_enabled(&self) -> bool {
        self.options.heartbeat_enabled()
    }

    /// Drive the mailbox loop until the channel closes (every sender
    /// handle, including the public API's, has been dropped).
    pub async fn run(mut self) {
        while let Some(message) = self.mailbox_rx.recv().await {
            self.handle(message).await;
        }
    }

    async fn handle(&mut self, message: ActorMessage) {
        match message {
            ActorMessage::Start(ack) => self.on_start(ack).await,
            ActorMessage::Stop(ack) => self.on_stop(ack).await,
            ActorMessage::Send(id, text, ack) => self.on_send(id, text, ack).await,
            ActorMessage::Disconnect(id, ack) => self.on_disconnect(id, ack).await,
            ActorMessage::HandleUpgrade(handoff, ack) => self.on_handle_upgrade(handoff, ack).await,
            ActorMessage::StateQuery(reply) => {
                let _ = reply.send(self.state);
            }
            ActorMessage::Listener(event) => self.on_listener_event(event).await,
            ActorMessage::BorrowedHttp(event) => self.on_borrowed_http_event(event).await,
            ActorMessage::BorrowedUpgrade(handoff) => self.on_borrowed_upgrade(handoff).await,
            ActorMessage::BorrowedHttpStartupTimeout => self.on_borrowed_http_startup_timeout().await,
            ActorMessage::Connection(id, event) => self.on_connection_event(id, event).await,
            ActorMessage::Heartbeat(id, outcome) => self.on_heartbeat_outcome(id, outcome).await,
            ActorMessage::ListenerClosed => {
                if self.state == ServerState::Stopping {
                    self.finish_stop();
                }
            }
        }
    }

    // ---- start() ----------------------------------------------------

    async fn on_start(&mut self, ack: Ack) {
        if !self.state.can_start() {
            let _ = ack.send(Err(ServerError::invalid_state(format!(
                "cannot start from state {:?}",
                self.state
            ))));
            return;
        }
        if let Err(err) = self.options.validate() {
            let _ = ack.send(Err(err));
            return;
        }

        self.state = ServerState::Starting;
        self.pending_start.push(ack);
        self.emit(ServerEvent::Starting);

        match &self.options.deployment {
            DeploymentMode::OwnListener { port } => {
                let host = "0.0.0.0".to_string();
                let port = *port;
                match TcpWsListener::bind(&host, port).await {
                    Ok(listener) => {
                        self.has_listener = true;
                        spawn_listener_pump(listener, self.shutdown_token.clone(), self.mailbox_tx.clone());
                        self.finish_start(None);
                    }
                    Err(err) => {
                        self.finish_start(Some(ServerError::from(FailureKind::ListenerInit(err))));
                    }
                }
            }
            DeploymentMode::BorrowedHttp { handle } => {
                let handle = handle.clone();
                let mailbox = self.mailbox_tx.clone();
                tokio::spawn(async move {
                    poll_borrowed_http_startup(handle, mailbox).await;
                });
            }
            DeploymentMode::NoListener => {
                self.finish_start(None);
            }
        }
    }

    fn finish_start(&mut self, failure: Option<ServerError>) {
        let acks = std::mem::take(&mut self.pending_start);
        match failure {
            None => {
                self.state = ServerState::Started;
                self.emit(ServerEvent::Start);
                for ack in acks {
                    let _ = ack.send(Ok(()));
                }
            }
            Some(err) => {
                self.state = ServerState::Stopped;
                self.emit(ServerEvent::Stopping(Some(err.clone())));
                self.emit(ServerEvent::Stop(Some(err.clone())));
                for ack in acks {
                    let _ = ack.send(Err(err.clone()));
                }
            }
        }
    }

    async fn on_borrowed_http_startup_timeout(&mut self) {
        if self.state != ServerState::Starting {
            return;
        }
        self.finish_start(Some(ServerError::from(FailureKind::HttpListenTimeout)));
    }

    async fn on_borrowed_http_event(&mut self, event: BorrowedHttpEvent) {
        match event {
            BorrowedHttpEvent::Listening if self.state == ServerState::Starting => {
                self.finish_start(None);
            }
            BorrowedHttpEvent::Close | BorrowedHttpEvent::Error(_) if self.state == ServerState::Starting => {
                let message = match event {
                    BorrowedHttpEvent::Error(msg) => msg,
                    _ => "borrowed http listener closed before it started listening".to_string(),
                };
                self.finish_start(Some(ServerError::from(FailureKind::HttpListenerStartupFailed(message))));
            }
            BorrowedHttpEvent::Close | BorrowedHttpEvent::Error(_) if self.state == ServerState::Started => {
                let message = match event {
                    BorrowedHttpEvent::Error(msg) => msg,
                    _ => "borrowed http listener stopped".to_string(),
                };
                self.begin_stop(Some(ServerError::from(FailureKind::HttpListenerStopped)));
                warn!(%message, "borrowed http listener collapsed");
            }
            _ => {}
        }
    }

    async fn on_borrowed_upgrade(&mut self, handoff: UpgradeHandoff) {
        if self.state != ServerState::Started {
            return;
        }
        self.accept_upgrade(handoff).await;
    }

    // ---- stop() -------------------------------------------------------

    async fn on_stop(&mut self, ack: Ack) {
        if !self.state.can_stop() {
            let _ = ack.send(Err(ServerError::invalid_state(format!(
                "cannot stop from state {:?}",
                self.state
            ))));
            return;
        }
        if let Some(pending) = self.pending_stop.as_mut() {
            pending.acks.push(ack);
            return;
        }
        self.pending_stop = Some(PendingStop {
            acks: vec![ack],
            cause: None,
        });
        self.begin_stop(None);
    }

    fn begin_stop(&mut self, cause: Option<ServerError>) {
        if self.state == ServerState::Stopping {
            return;
        }
        self.state = ServerState::Stopping;
        if self.pending_stop.is_none() {
            self.pending_stop = Some(PendingStop {
                acks: Vec::new(),
                cause: cause.clone(),
            });
        } else if let Some(pending) = self.pending_stop.as_mut() {
            pending.cause = pending.cause.take().or(cause.clone());
        }
        self.emit(ServerEvent::Stopping(cause));

        self.shutdown_token.cancel();
        for record in self.registry.drain() {
            record.connection.terminate();
            self.emit(ServerEvent::Disconnect(record.id, Some(ServerError::Stopping)));
        }

        if !self.has_listener {
            self.finish_stop();
        }
        // Else: wait for `ActorMessage::ListenerClosed`, the listener
        // task's acknowledgement of the cancellation it just observed,
        // before calling `finish_stop`. This is the "listener-close-ack
        // before final stop" ordering guarantee.
    }

    fn finish_stop(&mut self) {
        self.has_listener = false;
        self.shutdown_token = CancellationToken::new();
        self.state = ServerState::Stopped;
        let pending = self.pending_stop.take();
        let cause = pending.as_ref().and_then(|p| p.cause.clone());
        self.emit(ServerEvent::Stop(cause));
        if let Some(pending) = pending {
            for ack in pending.acks {
                let _ = ack.send(Ok(()));
            }
        }
    }

    // ---- send() / disconnect() ----------------------------------------

    async fn on_send(&mut self, id: ClientId, text: String, ack: Ack) {
        if self.state != ServerState::Started {
            let _ = ack.send(Err(ServerError::invalid_state("server is not started")));
            return;
        }
        let Some(record) = self.registry.get(&id) else {
            let _ = ack.send(Err(ServerError::invalid_state("unknown client id")));
            return;
        };
        let connection = record.connection.clone();
        let result = connection.send(text).await;
        match result {
            Ok(()) => {
                let _ = ack.send(Ok(()));
            }
            Err(message) => {
                let _ = ack.send(Ok(()));
                self.fail_connection(id, FailureKind::TransmitFailed(message)).await;
            }
        }
    }

    async fn on_disconnect(&mut self, id: ClientId, ack: Ack) {
        if self.state != ServerState::Started {
            let _ = ack.send(Err(ServerError::invalid_state("server is not started")));
            return;
        }
        let Some(record) = self.registry.remove(&id) else {
            let _ = ack.send(Err(ServerError::invalid_state("unknown client id")));
            return;
        };
        record.connection.close(1000, "");
        self.emit(ServerEvent::Disconnect(id, None));
        let _ = ack.send(Ok(()));
    }

    async fn on_handle_upgrade(&mut self, handoff: UpgradeHandoff, ack: Ack) {
        if !matches!(self.options.deployment, DeploymentMode::NoListener) {
            let _ = ack.send(Err(ServerError::invalid_state(
                "handle_upgrade is only valid in no-listener mode",
            )));
            return;
        }
        if self.state != ServerState::Started {
            let _ = ack.send(Err(ServerError::invalid_state("server is not started")));
            return;
        }
        self.accept_upgrade(handoff).await;
        let _ = ack.send(Ok(()));
    }

    // ---- listener / connection events ----------------------------------

    async fn on_listener_event(&mut self, event: WsListenerEvent) {
        match event {
            WsListenerEvent::Listening => {}
            WsListenerEvent::Connection(connection) => {
                if self.state == ServerState::Started {
                    self.register_connection(Arc::from(connection)).await;
                } else {
                    // Accept raced the cancellation that started a drain;
                    // the registry must stay empty in stopped/stopping.
                    connection.terminate();
                }
            }
            WsListenerEvent::Close => {
                if self.state == ServerState::Started {
                    self.begin_stop(Some(ServerError::from(FailureKind::ListenerCollapsed(
                        "listener closed unexpectedly".to_string(),
                    ))));
                }
            }
            WsListenerEvent::Error(message) => {
                if self.state == ServerState::Started {
                    self.begin_stop(Some(ServerError::from(FailureKind::ListenerCollapsed(message))));
                }
            }
        }
    }

    async fn accept_upgrade(&mut self, handoff: UpgradeHandoff) {
        match accept_handoff(handoff).await {
            Ok(connection) => {
                let connection: Box<dyn crate::listener::WsConnection> = connection;
                self.register_connection(Arc::from(connection)).await;
            }
            Err(err) => warn!(error = %err, "upgrade handshake failed"),
        }
    }

    async fn register_connection(&mut self, connection: Arc<dyn crate::listener::WsConnection>) {
        let id = ClientId::default();
        let (pong_tx, pong_rx) = mpsc::channel(4);
        let pong_forward_tx = pong_tx.clone();
        let record = ConnectionRecord::new(id.clone(), connection.clone(), pong_tx);
        let cancel = record.heartbeat_cancel.clone();
        self.registry.insert(record);
        self.emit(ServerEvent::Connect(id.clone()));

        let mut events_rx = connection.take_events();
        let mailbox = self.mailbox_tx.clone();
        let event_id = id.clone();
        let connection_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events_rx.recv() => {
                        let Some(event) = event else { return };
                        if matches!(event, ConnectionEvent::Pong) {
                            let _ = pong_forward_tx.try_send(());
                            continue;
                        }
                        if mailbox.send(ActorMessage::Connection(event_id.clone(), event)).await.is_err() {
                            return;
                        }
                    }
                    () = connection_cancel.cancelled() => return,
                }
            }
        });

        if self.heartbeat_enabled() {
            let interval_ms = self.options.heartbeat_interval_ms;
            let timeout_ms = self.options.heartbeat_timeout_ms;
            let mailbox = self.mailbox_tx.clone();
            let heartbeat_id = id.clone();
            let heartbeat_connection = connection;
            tokio::spawn(async move {
                let outcome = run_heartbeat(
                    heartbeat_connection,
                    interval_ms,
                    timeout_ms,
                    pong_rx,
                    cancel,
                    TokioClock,
                )
                .await;
                let _ = mailbox.send(ActorMessage::Heartbeat(heartbeat_id, outcome)).await;
            });
        }
    }

    async fn on_connection_event(&mut self, id: ClientId, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Message(text) => {
                if self.registry.contains(&id) {
                    self.emit(ServerEvent::Message(id, text));
                }
            }
            ConnectionEvent::Binary(_) => {
                self.fail_connection(id, FailureKind::NonStringMessage).await;
            }
            ConnectionEvent::Pong => {}
            ConnectionEvent::Close { .. } => {
                self.fail_connection(id, FailureKind::PeerClosed).await;
            }
        }
    }

    async fn on_heartbeat_outcome(&mut self, id: ClientId, outcome: HeartbeatOutcome) {
        if let HeartbeatOutcome::Failed(kind) = outcome {
            self.fail_connection(id, kind).await;
        }
    }

    async fn fail_connection(&mut self, id: ClientId, kind: FailureKind) {
        if let Some(error) = self.registry.resolve_failure(&id, kind) {
            self.emit(ServerEvent::Disconnect(id, Some(error)));
        }
    }
}

fn spawn_listener_pump(mut listener: TcpWsListener, cancel: CancellationToken, mailbox: MailboxSender) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    listener.close().await;
                    let _ = mailbox.send(ActorMessage::ListenerClosed).await;
                    return;
                }
                event = listener.next_event() => {
                    if mailbox.send(ActorMessage::Listener(event)).await.is_err() {
                        return;
                    }
                }
            }
        }
    });
}

async fn poll_borrowed_http_startup(
    handle: Arc<dyn crate::listener::BorrowedHttpHandle>,
    mailbox: MailboxSender,
) {
    if handle.is_listening() {
        let _ = mailbox
            .send(ActorMessage::BorrowedHttp(BorrowedHttpEvent::Listening))
            .await;
        spawn_borrowed_http_pumps(handle, mailbox);
        return;
    }

    let deadline = tokio::time::Instant::now() + Duration::from_millis(HTTP_LISTENING_MS);
    loop {
        if tokio::time::Instant::now() >= deadline {
            let _ = mailbox.send(ActorMessage::BorrowedHttpStartupTimeout).await;
            return;
        }
        tokio::select! {
            () = tokio::time::sleep(Duration::from_millis(HTTP_POLLING_MS)) => {
                if handle.is_listening() {
                    let _ = mailbox
                        .send(ActorMessage::BorrowedHttp(BorrowedHttpEvent::Listening))
                        .await;
                    spawn_borrowed_http_pumps(handle, mailbox);
                    return;
                }
            }
            // A borrowed listener can report its own startup failure
            // before the poll ever observes `is_listening()` flip, and
            // the startup-failure path must short-circuit rather than
            // wait out the rest of the deadline.
            event = handle.next_event() => {
                let became_listening = matches!(event, BorrowedHttpEvent::Listening);
                let is_terminal = matches!(event, BorrowedHttpEvent::Close | BorrowedHttpEvent::Error(_));
                let _ = mailbox.send(ActorMessage::BorrowedHttp(event)).await;
                if became_listening {
                    spawn_borrowed_http_pumps(handle, mailbox);
                    return;
                }
                if is_terminal {
                    return;
                }
            }
        }
    }
}

fn spawn_borrowed_http_pumps(handle: Arc<dyn crate::listener::BorrowedHttpHandle>, mailbox: MailboxSender) {
    let event_handle = handle.clone();
    let event_mailbox = mailbox.clone();
    tokio::spawn(async move {
        loop {
            let event = event_handle.next_event().await;
            let is_terminal = matches!(event, BorrowedHttpEvent::Close | BorrowedHttpEvent::Error(_));
            if event_mailbox.send(ActorMessage::BorrowedHttp(event)).await.is_err() || is_terminal {
                return;
            }
        }
    });

    let mut upgrades = handle.take_upgrades();
    let upgrade_mailbox = mailbox.clone();
    tokio::spawn(async move {
        while let Some(handoff) = upgrades.recv().await {
            if upgrade_mailbox.send(ActorMessage::BorrowedUpgrade(handoff)).await.is_err() {
                return;
            }
        }
    });

    // `next_event()` only surfaces what the borrowed host chooses to
    // report; a host that silently stops listening without emitting
    // `close`/`error` would otherwise never be detected. Poll the
    // cheaper `is_listening()` check at the same cadence as the startup
    // poll to catch that case too.
    let liveness_handle = handle.clone();
    let liveness_mailbox = mailbox;
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(HTTP_POLLING_MS)).await;
            if !liveness_handle.is_listening() {
                let _ = liveness_mailbox
                    .send(ActorMessage::BorrowedHttp(BorrowedHttpEvent::Close))
                    .await;
                return;
            }
        }
    });
}

//! The `tokio-tungstenite`-backed realisation of [`WsConnection`] and
//! [`WsListener`], shared by all four deployment modes.
//!
//! Every accepted socket converges to the same `WebSocketStream<TcpStream>`
//! type once its handshake completes, regardless of which deployment mode
//! produced it, so one connection implementation backs Modes A-D instead of
//! four. This mirrors the write-task-plus-command-channel split the
//! session-handling code this module is grounded on already used for its
//! single (Axum-native) connection type.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use http::HeaderValue;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

use crate::listener::{
    ConnectionEvent, ReadyState, UpgradeHandoff, WsConnection, WsListener, WsListenerEvent,
};
use crate::subprotocol::select_subprotocol;

const EVENT_BUFFER: usize = 64;
const OUTBOUND_BUFFER: usize = 64;

fn ready_state_from_u8(value: u8) -> ReadyState {
    match value {
        0 => ReadyState::Connecting,
        1 => ReadyState::Open,
        2 => ReadyState::Closing,
        _ => ReadyState::Closed,
    }
}

enum OutboundCommand {
    Send(String, oneshot::Sender<Result<(), String>>),
    Ping(oneshot::Sender<Result<(), String>>),
    Close(u16, String),
    Terminate,
}

/// A WebSocket connection backed by `tokio-tungstenite`.
pub struct TungsteniteConnection {
    outbound_tx: mpsc::Sender<OutboundCommand>,
    events_rx: parking_lot::Mutex<Option<mpsc::Receiver<ConnectionEvent>>>,
    ready_state: Arc<AtomicU8>,
}

impl TungsteniteConnection {
    /// Wrap an already-handshaken stream, spawning the task that owns its
    /// sink/stream halves.
    fn spawn(stream: WebSocketStream<TcpStream>) -> Box<Self> {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let ready_state = Arc::new(AtomicU8::new(1));

        tokio::spawn(run_connection_task(
            stream,
            outbound_rx,
            events_tx,
            ready_state.clone(),
        ));

        Box::new(Self {
            outbound_tx,
            events_rx: parking_lot::Mutex::new(Some(events_rx)),
            ready_state,
        })
    }
}

#[async_trait]
impl WsConnection for TungsteniteConnection {
    async fn send(&self, message: String) -> Result<(), String> {
        let (tx, rx) = oneshot::channel();
        self.outbound_tx
            .send(OutboundCommand::Send(message, tx))
            .await
            .map_err(|_| "connection task has exited".to_string())?;
        rx.await.map_err(|_| "connection task dropped response".to_string())?
    }

    async fn ping(&self) -> Result<(), String> {
        let (tx, rx) = oneshot::channel();
        self.outbound_tx
            .send(OutboundCommand::Ping(tx))
            .await
            .map_err(|_| "connection task has exited".to_string())?;
        rx.await.map_err(|_| "connection task dropped response".to_string())?
    }

    fn close(&self, code: u16, reason: &str) {
        let _ = self
            .outbound_tx
            .try_send(OutboundCommand::Close(code, reason.to_string()));
    }

    fn terminate(&self) {
        let _ = self.outbound_tx.try_send(OutboundCommand::Terminate);
    }

    fn ready_state(&self) -> ReadyState {
        ready_state_from_u8(self.ready_state.load(Ordering::Acquire))
    }

    fn take_events(&self) -> mpsc::Receiver<ConnectionEvent> {
        self.events_rx
            .lock()
            .take()
            .expect("take_events called more than once")
    }
}

async fn run_connection_task(
    stream: WebSocketStream<TcpStream>,
    mut outbound_rx: mpsc::Receiver<OutboundCommand>,
    events_tx: mpsc::Sender<ConnectionEvent>,
    ready_state: Arc<AtomicU8>,
) {
    let (mut sink, mut stream) = stream.split();

    loop {
        tokio::select! {
            command = outbound_rx.recv() => {
                match command {
                    Some(OutboundCommand::Send(text, ack)) => {
                        let result = sink.send(WsMessage::Text(text.into())).await.map_err(|err| err.to_string());
                        let _ = ack.send(result);
                    }
                    Some(OutboundCommand::Ping(ack)) => {
                        let result = sink.send(WsMessage::Ping(Vec::new().into())).await.map_err(|err| err.to_string());
                        let _ = ack.send(result);
                    }
                    Some(OutboundCommand::Close(code, reason)) => {
                        ready_state.store(2, Ordering::Release);
                        let frame = tokio_tungstenite::tungstenite::protocol::CloseFrame {
                            code: tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::from(code),
                            reason: reason.into(),
                        };
                        let _ = sink.send(WsMessage::Close(Some(frame))).await;
                    }
                    Some(OutboundCommand::Terminate) | None => {
                        ready_state.store(3, Ordering::Release);
                        return;
                    }
                }
            }
            message = stream.next() => {
                match message {
                    Some(Ok(WsMessage::Text(text))) => {
                        if events_tx.send(ConnectionEvent::Message(text.to_string())).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        if events_tx.send(ConnectionEvent::Binary(data.to_vec())).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(WsMessage::Pong(_))) => {
                        if events_tx.send(ConnectionEvent::Pong).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        ready_state.store(3, Ordering::Release);
                        let _ = events_tx.send(ConnectionEvent::Close {
                            code: frame.as_ref().map(|f| u16::from(f.code)),
                            reason: frame.map(|f| f.reason.to_string()).unwrap_or_default(),
                        }).await;
                        return;
                    }
                    Some(Ok(WsMessage::Ping(_) | WsMessage::Frame(_))) => {}
                    Some(Err(_)) | None => {
                        ready_state.store(3, Ordering::Release);
                        let _ = events_tx.send(ConnectionEvent::Close { code: None, reason: String::new() }).await;
                        return;
                    }
                }
            }
        }
    }
}

/// Perform the WebSocket opening handshake on an accepted TCP stream and
/// wrap the result, selecting the `feedme` subprotocol if the client
/// proposed it. Shared by all four deployment modes: Mode A's accept
/// loop, Modes B/C's upgrade hand-off, and Mode D's `handle_upgrade`.
pub async fn accept_and_wrap(stream: TcpStream) -> Result<Box<TungsteniteConnection>, String> {
    let callback = |request: &Request, mut response: Response| {
        let proposed: Vec<String> = request
            .headers()
            .get_all("sec-websocket-protocol")
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(',').map(|s| s.trim().to_string()))
            .collect();

        if let Some(selected) = select_subprotocol(&proposed) {
            if let Ok(header_value) = HeaderValue::from_str(selected) {
                response.headers_mut().insert("sec-websocket-protocol", header_value);
            }
        }

        Ok(response)
    };

    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, callback)
        .await
        .map_err(|err| err.to_string())?;

    Ok(TungsteniteConnection::spawn(ws_stream))
}

/// [`WsListener`] implementation for deployment Mode A: the core owns a
/// raw `TcpListener` outright.
pub struct TcpWsListener {
    listener: Option<TcpListener>,
    addr: SocketAddr,
}

impl TcpWsListener {
    /// Bind a `TcpListener` on `port` (0 selects an ephemeral port).
    pub async fn bind(host: &str, port: u16) -> Result<Self, String> {
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|err| err.to_string())?;
        let addr = listener.local_addr().map_err(|err| err.to_string())?;
        Ok(Self {
            listener: Some(listener),
            addr,
        })
    }

    /// The address this listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl WsListener for TcpWsListener {
    async fn next_event(&mut self) -> WsListenerEvent {
        let Some(listener) = self.listener.as_ref() else {
            return WsListenerEvent::Close;
        };

        match listener.accept().await {
            Ok((stream, _peer)) => match accept_and_wrap(stream).await {
                Ok(connection) => WsListenerEvent::Connection(connection),
                Err(err) => WsListenerEvent::Error(err),
            },
            Err(err) => WsListenerEvent::Error(err.to_string()),
        }
    }

    async fn close(&mut self) {
        self.listener = None;
    }
}

/// Wrap a raw upgrade hand-off produced by a borrowed HTTP listener
/// (Modes B/C) into a ready [`WsConnection`].
pub async fn accept_handoff(handoff: UpgradeHandoff) -> Result<Box<TungsteniteConnection>, String> {
    accept_and_wrap(handoff.stream).await
}

//! # feedme-server
//!
//! A single-threaded-cooperative WebSocket server transport core: a
//! lifecycle state machine over four deployment modes, heartbeat
//! supervision, and a connection registry, all driven by one actor task
//! and its mailbox.
//!
//! - [`api::FeedmeServer`] — the public handle: `start`/`stop`/`send`/
//!   `disconnect`/`handle_upgrade`, plus a [`events::ServerEvent`] stream.
//! - [`config`] — `ServerOptions`, the deployment selector, `ServerState`.
//! - [`listener`] / [`listener_tungstenite`] — the injected collaborator
//!   contracts and their `tokio-tungstenite` realisation.
//! - [`registry`] — the connection table and Failure Resolver.
//! - [`websocket::heartbeat`] — per-connection ping/pong supervision.
//! - [`health`] / [`server`] — the ambient `/health` HTTP surface, also
//!   usable as a borrowed-HTTP-listener deployment target.
//! - [`shutdown`] — process-wide graceful shutdown coordination that
//!   drives the transport's own `stop()` as one step of its drain.

#![deny(unsafe_code)]

pub mod actor;
pub mod api;
pub mod clock;
pub mod config;
pub mod events;
pub mod health;
pub mod listener;
pub mod listener_tungstenite;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod subprotocol;
pub mod websocket;

pub use api::FeedmeServer;
pub use config::{DeploymentMode, ServerOptions, ServerState};
pub use events::ServerEvent;

//! # feedme-logging
//!
//! Structured logging setup via `tracing` + `tracing-subscriber`. Installs a
//! process-global subscriber so the transport core and its host application
//! share one log format and filter policy.

#![deny(unsafe_code)]

mod init;

pub use init::{LogFormat, init_tracing};

//! # feedme-core
//!
//! Foundation types shared across the feedme WebSocket transport: the error
//! taxonomy and the branded [`ClientId`] type.

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;

pub use errors::{FailureKind, ServerError};
pub use ids::ClientId;

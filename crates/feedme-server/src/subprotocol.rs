//! The `feedme` subprotocol handshake predicate.

/// The fixed subprotocol label this transport negotiates.
pub const SUBPROTOCOL_LABEL: &str = "feedme";

/// Select the client-proposed subprotocol to accept.
///
/// Returns the first entry whose lowercase form equals `"feedme"`,
/// preserving the original case the client proposed it in. Returns `None`
/// when no proposed subprotocol matches.
#[must_use]
pub fn select_subprotocol(proposed: &[String]) -> Option<&str> {
    proposed
        .iter()
        .find(|candidate| candidate.to_lowercase() == SUBPROTOCOL_LABEL)
        .map(String::as_str)
}

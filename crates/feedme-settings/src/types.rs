//! Serializable settings for a standalone feedme server process.
//!
//! This covers only the subset of server options that can be expressed in a
//! config file or environment variable — the deployment selector's
//! "borrowed HTTP listener" and "no-listener" modes carry runtime handles
//! that cannot be loaded this way and are constructed by the host
//! application directly.

use serde::{Deserialize, Serialize};

/// Default heartbeat interval, in milliseconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5000;

/// Default heartbeat timeout, in milliseconds.
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 4500;

/// Settings for a feedme server bound to its own TCP listener.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Host to bind.
    pub host: String,
    /// Port to bind (0 lets the OS choose).
    pub port: u16,
    /// Heartbeat interval in milliseconds. 0 disables heartbeats entirely.
    pub heartbeat_interval_ms: u64,
    /// Heartbeat timeout in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Log output format: `"pretty"` or `"json"`.
    pub log_format: String,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            heartbeat_timeout_ms: DEFAULT_HEARTBEAT_TIMEOUT_MS,
            log_format: "pretty".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let settings = TransportSettings::default();
        assert_eq!(settings.heartbeat_interval_ms, 5000);
        assert_eq!(settings.heartbeat_timeout_ms, 4500);
        assert_eq!(settings.port, 0);
    }

    #[test]
    fn serde_roundtrip() {
        let settings = TransportSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let back: TransportSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }
}

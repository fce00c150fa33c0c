//! `/health` endpoint, the ambient HTTP surface's only route.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the process started.
    pub uptime_secs: u64,
    /// Current WebSocket connection count.
    pub connections: usize,
}

/// Build a health response from live counters.
#[must_use]
pub fn health_check(start_time: Instant, connections: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), 0);
        assert_eq!(resp.status, "ok");
    }

    #[test]
    fn uptime_starts_near_zero() {
        let resp = health_check(Instant::now(), 0);
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(start, 0);
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn connections_tracked() {
        let resp = health_check(Instant::now(), 5);
        assert_eq!(resp.connections, 5);
    }

    #[test]
    fn serialization() {
        let resp = health_check(Instant::now(), 2);
        let json = serde_json::to_string(&resp).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 2);
        assert!(parsed["uptime_secs"].is_number());
    }
}

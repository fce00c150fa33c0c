//! Timer abstraction used by the heartbeat supervisor and the lifecycle
//! controller's startup deadline / borrowed-HTTP liveness poll.
//!
//! The core never reads the wall clock directly; every delay goes through
//! this trait so tests can swap in Tokio's paused-time facilities without
//! the production code knowing the difference.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Deadline for a borrowed HTTP listener to start listening, per contract.
pub const HTTP_LISTENING_MS: u64 = 2000;

/// Poll interval for verifying a borrowed HTTP listener is still listening.
pub const HTTP_POLLING_MS: u64 = 500;

/// Default heartbeat interval, per contract.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5000;

/// Default heartbeat timeout, per contract.
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 4500;

/// A single source of time for the transport core.
///
/// Implementations must be cancellable: every sleep/interval race must be
/// abortable via the supplied [`CancellationToken`] so no timer ever
/// outlives the record or controller that armed it.
pub trait ClockTimers: Send + Sync + 'static {
    /// Sleep for `duration`, or return early if `cancel` fires first.
    /// Returns `true` if the sleep elapsed, `false` if cancelled.
    fn sleep(
        &self,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> impl std::future::Future<Output = bool> + Send;
}

/// The production [`ClockTimers`] implementation, backed by `tokio::time`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

impl ClockTimers for TokioClock {
    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            () = tokio::time::sleep(duration) => true,
            () = cancel.cancelled() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_elapses_without_cancellation() {
        let clock = TokioClock;
        let cancel = CancellationToken::new();
        let elapsed = clock.sleep(Duration::from_millis(100), &cancel).await;
        assert!(elapsed);
    }

    #[tokio::test]
    async fn sleep_short_circuits_on_cancellation() {
        let clock = TokioClock;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let elapsed = clock.sleep(Duration::from_secs(60), &cancel).await;
        assert!(!elapsed);
    }

    #[test]
    fn constants_match_contract() {
        assert_eq!(HTTP_LISTENING_MS, 2000);
        assert_eq!(HTTP_POLLING_MS, 500);
        assert_eq!(DEFAULT_HEARTBEAT_INTERVAL_MS, 5000);
        assert_eq!(DEFAULT_HEARTBEAT_TIMEOUT_MS, 4500);
    }
}

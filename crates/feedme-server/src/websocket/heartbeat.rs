//! Per-connection heartbeat supervision.
//!
//! One task per connection, independent of the actor's mailbox loop. Its
//! conclusion — a timeout, a ping failure, or a clean cancellation — is
//! reported back through the mailbox so the Failure Resolver still runs
//! inside the actor's serialised turn; the heartbeat task itself never
//! touches the registry.

use std::sync::Arc;
use std::time::Duration;

use feedme_core::FailureKind;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::clock::ClockTimers;
use crate::listener::WsConnection;

/// How a heartbeat supervision task for one connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// The connection missed its pong within the timeout window, or the
    /// ping write itself failed.
    Failed(FailureKind),
    /// The supervising cancellation token fired (the connection was
    /// disposed for another reason, or the server is stopping).
    Cancelled,
}

/// Drive one connection's heartbeat for as long as `cancel` stays live.
///
/// Each tick: drain any pong signal left over from a prior round (so a
/// pong that arrives between ticks cannot be mistaken for the next
/// round's), send a ping, and — on success — race a single timeout sleep
/// against the next pong. Exactly one of "pong cancels the timeout" or
/// "the timeout fires first" happens per outstanding ping, which is what
/// `tokio::select!`'s single-winning-branch semantics give for free.
pub async fn run_heartbeat<C: ClockTimers>(
    connection: Arc<dyn WsConnection>,
    interval_ms: u64,
    timeout_ms: u64,
    mut pong_rx: mpsc::Receiver<()>,
    cancel: CancellationToken,
    clock: C,
) -> HeartbeatOutcome {
    let interval = Duration::from_millis(interval_ms);
    let timeout = Duration::from_millis(timeout_ms);

    loop {
        if !clock.sleep(interval, &cancel).await {
            return HeartbeatOutcome::Cancelled;
        }

        while pong_rx.try_recv().is_ok() {}

        if let Err(err) = connection.ping().await {
            return HeartbeatOutcome::Failed(FailureKind::TransmitFailed(err));
        }

        tokio::select! {
            pong = pong_rx.recv() => {
                if pong.is_none() {
                    return HeartbeatOutcome::Cancelled;
                }
            }
            elapsed = clock.sleep(timeout, &cancel) => {
                if elapsed {
                    return HeartbeatOutcome::Failed(FailureKind::HeartbeatFailed);
                }
                return HeartbeatOutcome::Cancelled;
            }
        }
    }
}

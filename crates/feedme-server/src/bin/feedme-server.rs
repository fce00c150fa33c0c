//! Standalone `/health` server process: loads layered settings, installs
//! structured logging, and serves the ambient HTTP surface described in
//! the crate's top-level docs until interrupted.
//!
//! This binary does not itself run a WebSocket transport — `FeedmeServer`
//! is a library a host application constructs and starts in whichever
//! deployment mode fits it. What ships here is the standalone form of the
//! `/health` surface that an own-listener deployment can run alongside,
//! or that a host could hand to `FeedmeServer::new` as a borrowed listener
//! if it implemented `BorrowedHttpHandle` (see `DESIGN.md` for why this
//! one doesn't).

use std::sync::Arc;

use feedme_logging::{LogFormat, init_tracing};
use feedme_server::server::HealthServer;
use feedme_server::shutdown::ShutdownCoordinator;
use feedme_settings::get_settings;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let settings = get_settings();
    let log_format = match settings.log_format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Pretty,
    };
    init_tracing(log_format);

    let shutdown = Arc::new(ShutdownCoordinator::new());
    let health_server = HealthServer::new(settings.host.clone(), settings.port, shutdown.clone());

    let (addr, handle) = health_server.listen().await?;
    info!(%addr, "feedme health server started");

    tokio::signal::ctrl_c().await?;
    info!("received interrupt, shutting down");
    if let Err(err) = shutdown.graceful_shutdown(None, vec![handle], None).await {
        error!(%err, "graceful shutdown did not complete cleanly");
    }

    Ok(())
}

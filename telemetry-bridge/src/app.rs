//! Process wiring: server, scheduler and shutdown.

use std::sync::Arc;

use telemetry_core::{Broadcaster, ProducerStrategy, Scheduler, SubscriberRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cli::Args;
use crate::error::{Error, Result};
use crate::logging;
use crate::server::TelemetryServer;

/// Run the bridge until a shutdown signal arrives or the server fails.
///
/// A fatal producer error stops production only; connected clients stay
/// connected and the server keeps accepting new ones.
pub async fn run(args: Args) -> Result<()> {
    let cancel = CancellationToken::new();
    let registry = Arc::new(SubscriberRegistry::new());

    if args.parsed_source().is_none() {
        warn!(source = %args.source, "Unknown telemetry source, falling back to file replay");
    }
    let producer_config = args.producer_config();
    let server_config = args.server_config();
    info!(
        mode = %producer_config.mode,
        bind = %server_config.bind_address,
        port = server_config.port,
        "Starting telemetry bridge"
    );

    if let Some(log_dir) = &args.log_dir {
        logging::spawn_retention_cleanup(log_dir.clone(), cancel.clone());
    }
    tokio::spawn(shutdown_signal(cancel.clone()));

    let server = TelemetryServer::new(server_config, Arc::clone(&registry), cancel.clone());
    let server_task = tokio::spawn(async move { server.run().await });

    let scheduler = Scheduler::new(
        ProducerStrategy::from_config(&producer_config),
        Broadcaster::with_send_timeout(registry, args.send_timeout()),
        cancel.clone(),
    );
    let scheduler_task = tokio::spawn(scheduler.run());

    let server_result = server_task
        .await
        .map_err(|e| Error::server(format!("Server task failed: {e}")))
        .and_then(|result| result);

    // The server only returns on shutdown or failure; stop production either way.
    cancel.cancel();
    match scheduler_task.await {
        Ok(Ok(stats)) => info!(
            frames = stats.frames,
            restarts = stats.restarts,
            "Telemetry production stopped"
        ),
        // Already logged by the scheduler.
        Ok(Err(_)) => {}
        Err(e) => error!(error = %e, "Scheduler task failed"),
    }

    server_result
}

/// Cancel `cancel` on Ctrl-C or SIGTERM.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => return,
    }

    info!("Shutdown signal received");
    cancel.cancel();
}

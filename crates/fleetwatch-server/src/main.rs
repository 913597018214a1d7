//! Fleetwatch server: ingests geofence crossings and dispatches alerts.
//!
//! Crossings arrive as JSON lines on stdin, one `RawCrossing` per line.

mod config;

use std::process::ExitCode;

use fleetwatch_alerts::{AuditRecorder, EventIngestor, EventProcessor, LogSender, RecipientMatcher};
use fleetwatch_core::models::event::RawCrossing;
use fleetwatch_db::DbManager;
use fleetwatch_db::repository::{
    SurrealAuditLogRepository, SurrealDeliveryRepository, SurrealEventRepository,
    SurrealGeofenceRepository, SurrealRecipientRepository,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fleetwatch=info"));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();

    info!("Starting fleetwatch server...");
    let config = ServerConfig::from_env();

    let manager = match DbManager::connect_and_migrate(&config.db).await {
        Ok(manager) => manager,
        Err(e) => {
            error!(error = %e, "Database unavailable");
            return ExitCode::FAILURE;
        }
    };
    let db = manager.client();

    let ingestor = EventIngestor::new(
        SurrealEventRepository::new(db.clone()),
        config.alerts.dedupe_window_secs,
    );
    let processor = EventProcessor::new(
        SurrealEventRepository::new(db.clone()),
        RecipientMatcher::new(
            SurrealGeofenceRepository::new(db.clone()),
            SurrealRecipientRepository::new(db.clone()),
        ),
        SurrealDeliveryRepository::new(db.clone()),
        LogSender,
        AuditRecorder::new(SurrealAuditLogRepository::new(db.clone())),
        config.alerts.clone(),
    );

    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match serde_json::from_str::<RawCrossing>(&line) {
                    Ok(crossing) => {
                        if let Err(e) = ingestor.ingest(crossing).await {
                            warn!(error = %e, "Crossing rejected");
                        }
                    }
                    Err(e) => warn!(error = %e, "Malformed crossing"),
                },
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Crossing input failed");
                    break;
                }
            }
        }
        debug!("Crossing input closed");
    });

    let mut poll = tokio::time::interval(config.poll_interval);
    let mut sweep = tokio::time::interval(config.sweep_interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = poll.tick() => {
                match processor.drain().await {
                    Ok(0) => {}
                    Ok(handled) => debug!(handled, "Processed events"),
                    Err(e) => warn!(error = %e, "Event processing failed"),
                }
            }
            _ = sweep.tick() => {
                if let Err(e) = processor.release_stale().await {
                    warn!(error = %e, "Stale claim sweep failed");
                }
            }
        }
    }

    info!("Shutting down...");
    reader.abort();
    processor.shutdown().await;
    info!("Fleetwatch server stopped.");
    ExitCode::SUCCESS
}

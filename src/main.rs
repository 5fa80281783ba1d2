use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};

use material_allocation_api as api;
use api::events::{AuditSink, NotificationSink};
use api::services::{
    audit_logs::AuditLogService, notifications::NotificationService, ServiceSettings,
};

const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool)
            .await
            .context("failed running migrations")?;
    }
    let db_arc = Arc::new(db_pool);

    // Side effects run on their own task, fed by a bounded channel
    let (event_sender, event_rx) = api::events::EventSender::channel(cfg.event_channel_capacity);
    let settings = ServiceSettings::from(&cfg);
    let audit: Arc<dyn AuditSink> =
        Arc::new(AuditLogService::new(db_arc.clone(), settings.clone()));
    let notifications: Arc<dyn NotificationSink> =
        Arc::new(NotificationService::new(db_arc.clone(), settings));
    let event_task = tokio::spawn(api::events::process_events(
        event_rx,
        audit,
        notifications,
    ));

    let addr = SocketAddr::new(
        cfg.host
            .parse()
            .with_context(|| format!("invalid host address: {}", cfg.host))?,
        cfg.port,
    );
    let app = api::build_router(api::AppState::new(db_arc.clone(), cfg, event_sender));

    info!("material-allocation-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router owned the last event sender; let the dispatcher finish what is queued
    match tokio::time::timeout(EVENT_DRAIN_TIMEOUT, event_task).await {
        Ok(Ok(())) => info!("Pending side effects drained"),
        Ok(Err(e)) => error!(error = %e, "Event processing task failed"),
        Err(_) => warn!("Timed out draining pending side effects"),
    }

    match Arc::try_unwrap(db_arc) {
        Ok(pool) => api::db::close_pool(pool).await?,
        Err(_) => warn!("Database pool still shared at shutdown; skipping explicit close"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};
use tracing::{info, warn};

use pos_procurement as api;

#[derive(Debug, Parser)]
#[command(name = "pos-procurement", version, about = "Procurement-to-payment API server")]
struct Cli {
    /// Listen on this port instead of the configured one
    #[arg(long)]
    port: Option<u16>,

    /// Apply database migrations before serving
    #[arg(long)]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = api::config::load_config().context("failed to load configuration")?;
    if let Some(port) = cli.port {
        cfg.port = port;
    }
    if cli.migrate {
        cfg.auto_migrate = true;
    }
    api::config::init_tracing(&cfg.log_level, cfg.log_json);
    api::handlers::health::init_start_time();
    api::metrics::register_metrics();

    // Init events
    let (event_sender, event_rx) = api::events::channel(cfg.event_channel_capacity);
    let event_task = tokio::spawn(api::events::process_events(event_rx));

    let state = api::AppState::from_config(&cfg, event_sender)
        .await
        .context("failed to initialize services")?;

    let access_logger = api::logging::access_logger(!cfg.log_json);

    let cors_layer = if cfg.is_production() {
        CorsLayer::new()
    } else {
        CorsLayer::permissive()
    };

    let app = api::build_router(state)
        .layer(axum::middleware::from_fn_with_state(
            access_logger,
            api::logging::access_log,
        ))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors_layer);

    let addr = cfg.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("pos-procurement listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router owned the last senders; the consumer drains and stops.
    if tokio::time::timeout(Duration::from_secs(5), event_task)
        .await
        .is_err()
    {
        warn!("Event processor did not finish draining in time");
    }
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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

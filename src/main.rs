use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use mixnet_directory::{
    api::create_app,
    clock::{Clock, SystemClock},
    config::DirectoryConfig,
    database::{DatabasePool, MemoryStore, StatusStore},
    scheduler::Scheduler,
    service::DirectoryService,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = DirectoryConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {:#}", e);
        eprintln!("Please check MIXNET_DIR_* environment variables.");
        e
    })?;

    init_logging(&config)?;

    info!("Starting mixnet directory");
    info!(
        required_version = %config.admission.required_version,
        max_mixnodes = config.admission.max_mixnodes,
        max_gateways = config.admission.max_gateways,
        "Admission settings"
    );

    let store = open_store(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let service = Arc::new(DirectoryService::new(store, clock, &config));

    service
        .bootstrap()
        .await
        .context("Failed to bootstrap directory state")?;

    let mut scheduler = Scheduler::new(service.clone(), config.scheduler.clone());
    if config.scheduler.enabled {
        scheduler.start();
    } else {
        warn!("Background scheduler disabled, daily uptime will not be refreshed");
    }

    let app = create_app(service.clone());

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    info!("Mixnet directory listening on {}", bind_addr);

    // Serve with connect info for loopback checks and unregistration
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server failed")?;

    scheduler.stop().await;
    info!("Mixnet directory stopped");

    Ok(())
}

async fn open_store(config: &DirectoryConfig) -> Result<Arc<dyn StatusStore>> {
    if !config.database.enabled {
        info!("Using in-memory status store");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let pool = DatabasePool::new(&config.database)
        .await
        .context("Failed to connect to PostgreSQL")?;
    pool.init_schema()
        .await
        .context("Failed to initialize database schema")?;

    Ok(Arc::new(pool))
}

/// `RUST_LOG` wins over the configured level when set
fn init_logging(config: &DirectoryConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.logging.level.to_lowercase()))
        .context("Invalid log level")?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(if config.logging.log_requests {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

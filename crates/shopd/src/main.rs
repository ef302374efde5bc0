//! Order service entry point.

use std::sync::Arc;

use distributed_lock::{InMemoryLockManager, LockManager, PostgresLockManager};
use orders::InMemoryPaymentGateway;
use outbox::LoggingPublisher;
use shopd::{Config, ShopContext, StartupError, telemetry};
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryShopStore, PostgresShopStore, ShopStore};
use tokio::signal;
use tracing::{error, info, warn};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn serve<S, L>(store: Arc<S>, locks: Arc<L>, config: &Config) -> shopd::Result<()>
where
    S: ShopStore + 'static,
    L: LockManager + 'static,
{
    let context = ShopContext::new(
        store,
        locks,
        InMemoryPaymentGateway::new(),
        LoggingPublisher,
        config,
    );
    info!(
        poll_interval_ms = config.outbox_poll_interval.as_millis() as u64,
        batch_size = config.outbox_batch_size,
        "shop service ready"
    );
    context.run_until(shutdown_signal()).await
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    // 1. Configuration, logging, metrics
    let config = Config::from_env();
    telemetry::init_tracing(&config)?;
    telemetry::init_metrics(&config)?;

    // 2. Storage and locks, then run until signalled
    match config.database_url.as_deref() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await?;
            info!("connected to PostgreSQL");

            let store = PostgresShopStore::new(pool.clone());
            store.run_migrations().await?;
            let locks = PostgresLockManager::new(pool);
            serve(Arc::new(store), Arc::new(locks), &config).await?;
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory storage");
            serve(
                Arc::new(InMemoryShopStore::new()),
                Arc::new(InMemoryLockManager::new()),
                &config,
            )
            .await?;
        }
    }

    info!("shop service shut down gracefully");
    Ok(())
}

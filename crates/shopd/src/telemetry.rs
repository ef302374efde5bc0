//! Logging and metrics setup.

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, LogFormat};
use crate::error::{Result, StartupError};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when it holds a valid filter.
pub fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.log_format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };
    installed.map_err(|e| StartupError::Telemetry(e.to_string()))
}

/// Installs the Prometheus recorder with its own scrape listener.
///
/// Without `METRICS_ADDR` no recorder is installed and metric calls are no-ops.
/// Must run inside the tokio runtime.
pub fn init_metrics(config: &Config) -> Result<()> {
    let Some(addr) = config.metrics_addr else {
        return Ok(());
    };

    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe_metrics();
    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

fn describe_metrics() {
    metrics::describe_counter!("orders_created_total", "Orders placed");
    metrics::describe_counter!("orders_paid_total", "Orders paid");
    metrics::describe_counter!("orders_cancelled_total", "Orders cancelled");
    metrics::describe_counter!(
        "stock_decrements_total",
        "Stock decrement attempts by outcome"
    );
    metrics::describe_counter!("cache_hits_total", "Read-through cache hits");
    metrics::describe_counter!("cache_misses_total", "Read-through cache misses");
    metrics::describe_counter!(
        "cache_stale_loads_total",
        "Loads discarded because their key was invalidated meanwhile"
    );
    metrics::describe_histogram!(
        "lock_wait_seconds",
        metrics::Unit::Seconds,
        "Time spent waiting for a lock"
    );
    metrics::describe_counter!(
        "payment_gateway_attempts_total",
        "Payment gateway calls by operation and outcome"
    );
    metrics::describe_counter!(
        "outbox_events_delivered_total",
        "Outbox events handed to the publisher"
    );
    metrics::describe_counter!("outbox_events_failed_total", "Failed outbox deliveries");
    metrics::describe_counter!(
        "outbox_events_unrecognized_total",
        "Outbox rows with an unknown event type"
    );
    metrics::describe_histogram!(
        "outbox_relay_batch_seconds",
        metrics::Unit::Seconds,
        "Duration of one relay pass"
    );
}

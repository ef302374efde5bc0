use thiserror::Error;

/// Failures that stop the process from starting or shutting down cleanly.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to initialise logging: {0}")]
    Telemetry(String),

    #[error("Failed to install metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("Failed to connect to database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage setup failed: {0}")]
    Store(#[from] store::StoreError),

    #[error("Outbox relay task ended abnormally: {0}")]
    Relay(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, StartupError>;

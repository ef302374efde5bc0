//! Order service process.
//!
//! Loads [`Config`], sets up tracing and the Prometheus exporter, picks
//! Postgres or in-memory storage, and runs the outbox relay beside the order
//! core until the process is told to stop.

pub mod config;
pub mod context;
pub mod error;
pub mod telemetry;

pub use config::{Config, LogFormat};
pub use context::{Orchestrator, ShopContext};
pub use error::{Result, StartupError};

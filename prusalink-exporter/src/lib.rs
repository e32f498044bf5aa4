//! Prometheus metrics exporter for PrusaLink 3D printers.
//!
//! The exporter polls each configured printer's PrusaLink HTTP API on a
//! fixed interval and exposes the latest values via an HTTP `/metrics`
//! endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  PrusaLink API  │────>│     Poller      │────>│    Registry     │
//! │ (per printer)   │     │ (fetch + map)   │     │  (instruments)  │
//! └─────────────────┘     └─────────────────┘     └────────┬────────┘
//!                                                          │
//!                                                 ┌────────┴────────┐
//!                                                 │   HTTP Server   │
//!                                                 │   (/metrics)    │
//!                                                 └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! prusalink-exporter --config prusalink.json5
//! ```
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod client;
pub mod config;
pub mod http;
pub mod mapping;
pub mod poller;
pub mod registry;
pub mod rules;
pub mod status;

pub use client::{ClientError, PrinterClient};
pub use config::{ConfigError, ExporterConfig, LogFormat, LoggingConfig};
pub use http::HttpServer;
pub use poller::PrinterPoller;
pub use registry::{MetricRegistry, PrinterMetrics, SharedRegistry};
pub use rules::{AlertMonitor, RuleEvaluator, default_rules};
pub use status::PrinterSnapshot;

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
    }

    Ok(())
}

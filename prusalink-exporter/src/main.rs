//! Prometheus exporter for PrusaLink printers.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use prusalink_exporter::http::supervise;
use prusalink_exporter::{
    AlertMonitor, ExporterConfig, HttpServer, MetricRegistry, PrinterPoller, default_rules,
    init_tracing,
};

/// Prometheus exporter for PrusaLink 3D printers.
#[derive(Parser, Debug)]
#[command(name = "prusalink-exporter")]
#[command(about = "Export PrusaLink printer status as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long, default_value = "prusalink.json5")]
    config: PathBuf,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ExporterConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    if let Some(listen) = args.listen {
        config.exporter.listen = listen;
        config.validate()?;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_tracing(&config.logging)?;

    info!("Starting PrusaLink exporter");
    info!("Loaded configuration from {:?}", args.config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let registry = Arc::new(MetricRegistry::new(
        config.printers.iter().map(|p| p.label().to_string()),
    ));

    let listen_addr: SocketAddr = config
        .exporter
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;
    let http_server =
        HttpServer::bind(registry.clone(), listen_addr, config.exporter.path.clone()).await?;

    let mut tasks = Vec::new();

    for printer in &config.printers {
        let metrics = registry
            .printer(printer.label())
            .with_context(|| format!("No metrics registered for {}", printer.label()))?;
        let poller = PrinterPoller::new(printer, &config.scrape, metrics)
            .with_context(|| format!("Failed to create poller for {}", printer.label()))?;

        let poller_shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            poller.run(poller_shutdown).await;
        }));
    }

    if config.alerts.enabled {
        let monitor = AlertMonitor::new(
            registry.clone(),
            default_rules(),
            config.scrape.interval(),
        );
        let monitor_shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            monitor.run(monitor_shutdown).await;
        }));
    }

    let http_shutdown = shutdown_rx.clone();
    let mut http_task = tokio::spawn(async move { http_server.run(http_shutdown).await });

    info!(printers = config.printers.len(), "PrusaLink exporter running");

    let outcome = supervise(&mut http_task, shutdown_signal()).await;
    if let Err(e) = &outcome {
        error!("{:#}", e);
    }

    shutdown_tx.send(true)?;

    // In-flight printer requests are bounded by the scrape timeout.
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        if outcome.is_ok() {
            let _ = (&mut http_task).await;
        }
        for task in tasks {
            let _ = task.await;
        }
    })
    .await;

    outcome?;

    info!("Exporter stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(_) => std::future::pending::<()>().await,
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

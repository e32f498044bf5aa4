//! Periodic printer polling.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::client::{ClientError, PrinterClient};
use crate::config::{PrinterConfig, ScrapeConfig};
use crate::mapping::{apply, map_outcome};
use crate::registry::PrinterMetrics;

/// Runs scrape cycles for one printer.
pub struct PrinterPoller {
    client: PrinterClient,
    metrics: Arc<PrinterMetrics>,
    interval: Duration,
}

impl PrinterPoller {
    /// Create a poller writing into `metrics`.
    pub fn new(
        printer: &PrinterConfig,
        scrape: &ScrapeConfig,
        metrics: Arc<PrinterMetrics>,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            client: PrinterClient::new(printer, scrape.timeout())?,
            metrics,
            interval: scrape.interval(),
        })
    }

    /// Perform a single scrape cycle. Returns whether the scrape succeeded.
    pub async fn poll_once(&self) -> bool {
        let outcome = self.client.fetch().await;

        match &outcome {
            Ok(snapshot) => {
                debug!(
                    printer = %self.metrics.printer(),
                    state = snapshot.printer().and_then(|p| p.state.as_deref()).unwrap_or("-"),
                    "Scrape succeeded"
                );
            }
            Err(e) => {
                warn!(
                    printer = %self.metrics.printer(),
                    url = %self.client.base_url(),
                    error = %e,
                    "Scrape failed"
                );
            }
        }

        apply(&self.metrics, &map_outcome(&outcome));
        outcome.is_ok()
    }

    /// Run the polling loop until the shutdown signal is received.
    ///
    /// Cycles never overlap: the interval is measured from the end of one
    /// cycle to the start of the next.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            printer = %self.metrics.printer(),
            url = %self.client.base_url(),
            interval_secs = self.interval.as_secs(),
            "Starting printer poller"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.poll_once().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(printer = %self.metrics.printer(), "Printer poller stopped");
    }
}

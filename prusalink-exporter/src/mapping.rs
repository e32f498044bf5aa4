//! Mapping from PrusaLink API responses to registry updates.
//!
//! [`map_outcome`] is pure: it turns a scrape result into a list of
//! [`MetricUpdate`]s without touching the registry. [`apply`] writes them.
//! A field the printer did not report produces no update, so the previous
//! value stays exposed.

use crate::registry::{GaugeMetric, InfoMetric, PrinterMetrics};
use crate::status::PrinterSnapshot;

/// A single write to one instrument.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricUpdate {
    ScrapeSuccessful(bool),
    Gauge(GaugeMetric, f64),
    State(String),
    /// Label values in [`InfoMetric::label_names`] order; `None` leaves a label as is.
    Info(InfoMetric, Vec<Option<String>>),
}

/// Where each gauge comes from in the API responses.
pub fn gauge_value(metric: GaugeMetric, snapshot: &PrinterSnapshot) -> Option<f64> {
    let printer = snapshot.printer();
    match metric {
        GaugeMetric::NozzleDiameter => snapshot.info.nozzle_diameter,
        GaugeMetric::Speed => printer.and_then(|p| p.speed),
        GaugeMetric::FlowRate => printer.and_then(|p| p.flow),
        GaugeMetric::BedTempCurrent => printer.and_then(|p| p.temp_bed),
        GaugeMetric::BedTempDesired => printer.and_then(|p| p.target_bed),
        GaugeMetric::NozzleTempCurrent => printer.and_then(|p| p.temp_nozzle),
        GaugeMetric::NozzleTempDesired => printer.and_then(|p| p.target_nozzle),
        GaugeMetric::AxisZ => printer.and_then(|p| p.axis_z),
        GaugeMetric::JobProgress => snapshot.job_progress(),
        GaugeMetric::JobTimeElapsed => snapshot.job_time_elapsed(),
        GaugeMetric::JobTimeRemaining => snapshot.job_time_remaining(),
    }
}

/// Label values for an info metric, `None` where the API left them out.
pub fn info_values(metric: InfoMetric, snapshot: &PrinterSnapshot) -> Vec<Option<String>> {
    match metric {
        InfoMetric::Firmware => vec![
            snapshot.version.server.clone(),
            snapshot.version.api.clone(),
        ],
        InfoMetric::Printer => vec![
            snapshot.info.serial.clone(),
            snapshot
                .info
                .hostname
                .clone()
                .or_else(|| snapshot.version.hostname.clone()),
        ],
        InfoMetric::Job => {
            let file = snapshot.job.as_ref().and_then(|j| j.file.as_ref());
            vec![
                file.and_then(|f| f.label()).map(str::to_string),
                file.and_then(|f| f.size).map(|s| s.to_string()),
            ]
        }
    }
}

/// Updates for a successful scrape.
pub fn map_snapshot(snapshot: &PrinterSnapshot) -> Vec<MetricUpdate> {
    let mut updates = vec![MetricUpdate::ScrapeSuccessful(true)];

    for metric in GaugeMetric::ALL {
        if let Some(value) = gauge_value(metric, snapshot) {
            updates.push(MetricUpdate::Gauge(metric, value));
        }
    }

    if let Some(state) = snapshot.printer().and_then(|p| p.state.as_deref()) {
        updates.push(MetricUpdate::State(state.to_string()));
    }

    for metric in InfoMetric::ALL {
        let values = info_values(metric, snapshot);
        if values.iter().any(Option::is_some) {
            updates.push(MetricUpdate::Info(metric, values));
        }
    }

    updates
}

/// Updates for a scrape outcome. A failure only clears `scrape_successful`.
pub fn map_outcome<E>(outcome: &Result<PrinterSnapshot, E>) -> Vec<MetricUpdate> {
    match outcome {
        Ok(snapshot) => map_snapshot(snapshot),
        Err(_) => vec![MetricUpdate::ScrapeSuccessful(false)],
    }
}

/// Write updates into a printer's instruments.
pub fn apply(metrics: &PrinterMetrics, updates: &[MetricUpdate]) {
    for update in updates {
        match update {
            MetricUpdate::ScrapeSuccessful(up) => metrics.set_scrape_successful(*up),
            MetricUpdate::Gauge(metric, value) => metrics.set_gauge(*metric, *value),
            MetricUpdate::State(state) => metrics.set_state(state),
            MetricUpdate::Info(metric, values) => metrics.set_info(*metric, values),
        }
    }
}

//! Metric registry holding every instrument exposed by the exporter.
//!
//! Instruments for all configured printers are created up front so the
//! exposition output is complete before the first scrape finishes. Each
//! gauge is an atomic cell and each label-carrying instrument has its own
//! lock; there is no registry-wide lock.

use std::fmt::Write;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use parking_lot::RwLock;
use prometheus_client::metrics::gauge::Gauge;

/// Printer states reported by PrusaLink.
pub const KNOWN_STATES: &[&str] = &[
    "IDLE",
    "BUSY",
    "PRINTING",
    "PAUSED",
    "FINISHED",
    "STOPPED",
    "ERROR",
    "ATTENTION",
    "READY",
    "UNKNOWN",
];

pub const SCRAPE_SUCCESSFUL: &str = "prusalink_scrape_successful";
pub const PRINTER_STATE: &str = "prusalink_printer_state";

type FloatGauge = Gauge<f64, AtomicU64>;

const GAUGE_COUNT: usize = 11;
const INFO_COUNT: usize = 3;

/// Numeric gauges mapped from the printer API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GaugeMetric {
    NozzleDiameter,
    Speed,
    FlowRate,
    BedTempCurrent,
    BedTempDesired,
    NozzleTempCurrent,
    NozzleTempDesired,
    AxisZ,
    JobProgress,
    JobTimeElapsed,
    JobTimeRemaining,
}

impl GaugeMetric {
    pub const ALL: [GaugeMetric; GAUGE_COUNT] = [
        GaugeMetric::NozzleDiameter,
        GaugeMetric::Speed,
        GaugeMetric::FlowRate,
        GaugeMetric::BedTempCurrent,
        GaugeMetric::BedTempDesired,
        GaugeMetric::NozzleTempCurrent,
        GaugeMetric::NozzleTempDesired,
        GaugeMetric::AxisZ,
        GaugeMetric::JobProgress,
        GaugeMetric::JobTimeElapsed,
        GaugeMetric::JobTimeRemaining,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GaugeMetric::NozzleDiameter => "prusalink_nozzle_diameter",
            GaugeMetric::Speed => "prusalink_speed",
            GaugeMetric::FlowRate => "prusalink_flow_rate",
            GaugeMetric::BedTempCurrent => "prusalink_bed_temp_current",
            GaugeMetric::BedTempDesired => "prusalink_bed_temp_desired",
            GaugeMetric::NozzleTempCurrent => "prusalink_nozzle_temp_current",
            GaugeMetric::NozzleTempDesired => "prusalink_nozzle_temp_desired",
            GaugeMetric::AxisZ => "prusalink_axis_z",
            GaugeMetric::JobProgress => "prusalink_job_progress",
            GaugeMetric::JobTimeElapsed => "prusalink_job_time_elapsed",
            GaugeMetric::JobTimeRemaining => "prusalink_job_time_remaining",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            GaugeMetric::NozzleDiameter => "Nozzle Diameter in mm",
            GaugeMetric::Speed => "Current Printer Configured Speed in Percent",
            GaugeMetric::FlowRate => "Current Printer Configured Flow Rate in Percent",
            GaugeMetric::BedTempCurrent => "Current Printer Bed Temperature in Celsius",
            GaugeMetric::BedTempDesired => "Set (Desired) Printer Bed Temperature in Celsius",
            GaugeMetric::NozzleTempCurrent => "Current Extruder Nozzle Temperature in Celsius",
            GaugeMetric::NozzleTempDesired => {
                "Set (Desired) Extruder Nozzle Temperature in Celsius"
            }
            GaugeMetric::AxisZ => "Current Z Axis Position in mm",
            GaugeMetric::JobProgress => "Current Job Progress in Percent",
            GaugeMetric::JobTimeElapsed => "Current Job Elapsed Time Printing in Seconds",
            GaugeMetric::JobTimeRemaining => "Current Job Time Remaining in Seconds",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Info metrics: constant 1, payload carried in labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfoMetric {
    Firmware,
    Printer,
    Job,
}

impl InfoMetric {
    pub const ALL: [InfoMetric; INFO_COUNT] =
        [InfoMetric::Firmware, InfoMetric::Printer, InfoMetric::Job];

    pub fn name(&self) -> &'static str {
        match self {
            InfoMetric::Firmware => "prusalink_server_firmware_version_info",
            InfoMetric::Printer => "prusalink_printer_info",
            InfoMetric::Job => "prusalink_job_info",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            InfoMetric::Firmware => "Prusa Firmware Running on the Printer",
            InfoMetric::Printer => "Printer Identity",
            InfoMetric::Job => "Information on the Current Active Job",
        }
    }

    /// Label names carried by this metric, after `printer`.
    pub fn label_names(&self) -> &'static [&'static str] {
        match self {
            InfoMetric::Firmware => &["version", "api"],
            InfoMetric::Printer => &["serialnumber", "hostname"],
            InfoMetric::Job => &["filename", "filesize"],
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// One exposed series.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: &'static str,
    /// Label pairs in exposition order, `printer` first.
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

impl Sample {
    /// Value of a label, if present.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// All series sharing a metric name.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: &'static str,
    pub help: &'static str,
    pub samples: Vec<Sample>,
}

/// Instruments for a single printer.
pub struct PrinterMetrics {
    printer: String,
    scrape_successful: FloatGauge,
    gauges: [FloatGauge; GAUGE_COUNT],
    state: RwLock<Option<String>>,
    info: [RwLock<Vec<String>>; INFO_COUNT],
}

impl PrinterMetrics {
    /// Create zeroed instruments for a printer label.
    pub fn new(printer: impl Into<String>) -> Self {
        Self {
            printer: printer.into(),
            scrape_successful: FloatGauge::default(),
            gauges: std::array::from_fn(|_| FloatGauge::default()),
            state: RwLock::new(None),
            info: std::array::from_fn(|i| {
                RwLock::new(vec![String::new(); InfoMetric::ALL[i].label_names().len()])
            }),
        }
    }

    /// The `printer` label value.
    pub fn printer(&self) -> &str {
        &self.printer
    }

    pub fn set_scrape_successful(&self, up: bool) {
        self.scrape_successful.set(if up { 1.0 } else { 0.0 });
    }

    pub fn scrape_successful(&self) -> f64 {
        self.scrape_successful.get()
    }

    pub fn set_gauge(&self, metric: GaugeMetric, value: f64) {
        self.gauges[metric.index()].set(value);
    }

    pub fn gauge(&self, metric: GaugeMetric) -> f64 {
        self.gauges[metric.index()].get()
    }

    pub fn set_state(&self, state: &str) {
        *self.state.write() = Some(state.to_string());
    }

    /// The last reported state, if any was ever reported.
    pub fn state(&self) -> Option<String> {
        self.state.read().clone()
    }

    /// Overwrite the labels that are `Some`; `None` keeps the previous value.
    pub fn set_info(&self, metric: InfoMetric, values: &[Option<String>]) {
        let mut current = self.info[metric.index()].write();
        for (slot, value) in current.iter_mut().zip(values) {
            if let Some(value) = value {
                slot.clone_from(value);
            }
        }
    }

    pub fn info(&self, metric: InfoMetric) -> Vec<String> {
        self.info[metric.index()].read().clone()
    }

    fn printer_label(&self) -> (String, String) {
        ("printer".to_string(), self.printer.clone())
    }

    fn gauge_sample(&self, name: &'static str, value: f64) -> Sample {
        Sample {
            name,
            labels: vec![self.printer_label()],
            value,
        }
    }

    fn state_samples(&self) -> Vec<Sample> {
        let current = self.state();
        let mut states: Vec<&str> = KNOWN_STATES.to_vec();
        if let Some(state) = current.as_deref()
            && !KNOWN_STATES.contains(&state)
        {
            states.push(state);
        }

        states
            .into_iter()
            .map(|state| Sample {
                name: PRINTER_STATE,
                labels: vec![
                    self.printer_label(),
                    ("state".to_string(), state.to_string()),
                ],
                value: if current.as_deref() == Some(state) {
                    1.0
                } else {
                    0.0
                },
            })
            .collect()
    }

    fn info_sample(&self, metric: InfoMetric) -> Sample {
        let values = self.info(metric);
        let mut labels = vec![self.printer_label()];
        labels.extend(
            metric
                .label_names()
                .iter()
                .zip(values)
                .map(|(k, v)| (k.to_string(), v)),
        );

        Sample {
            name: metric.name(),
            labels,
            value: 1.0,
        }
    }
}

/// Thread-safe registry of all printers' instruments.
pub struct MetricRegistry {
    printers: Vec<Arc<PrinterMetrics>>,
}

/// Create a shareable registry handle.
pub type SharedRegistry = Arc<MetricRegistry>;

impl MetricRegistry {
    /// Create instruments for each printer label, in order.
    pub fn new<I, S>(printers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            printers: printers
                .into_iter()
                .map(|p| Arc::new(PrinterMetrics::new(p)))
                .collect(),
        }
    }

    /// Instruments for one printer.
    pub fn printer(&self, printer: &str) -> Option<Arc<PrinterMetrics>> {
        self.printers.iter().find(|p| p.printer == printer).cloned()
    }

    pub fn printers(&self) -> &[Arc<PrinterMetrics>] {
        &self.printers
    }

    /// Snapshot every metric family. Each instrument is read independently.
    pub fn families(&self) -> Vec<MetricFamily> {
        let mut families = Vec::with_capacity(GAUGE_COUNT + INFO_COUNT + 2);

        families.push(MetricFamily {
            name: SCRAPE_SUCCESSFUL,
            help: "Indicates if the scrape from the printer was successful",
            samples: self
                .printers
                .iter()
                .map(|p| p.gauge_sample(SCRAPE_SUCCESSFUL, p.scrape_successful()))
                .collect(),
        });

        for metric in GaugeMetric::ALL {
            families.push(MetricFamily {
                name: metric.name(),
                help: metric.help(),
                samples: self
                    .printers
                    .iter()
                    .map(|p| p.gauge_sample(metric.name(), p.gauge(metric)))
                    .collect(),
            });
        }

        for metric in InfoMetric::ALL {
            families.push(MetricFamily {
                name: metric.name(),
                help: metric.help(),
                samples: self.printers.iter().map(|p| p.info_sample(metric)).collect(),
            });
        }

        families.push(MetricFamily {
            name: PRINTER_STATE,
            help: "Current Printer State",
            samples: self.printers.iter().flat_map(|p| p.state_samples()).collect(),
        });

        families
    }

    /// Every series of every family.
    pub fn samples(&self) -> Vec<Sample> {
        self.families()
            .into_iter()
            .flat_map(|f| f.samples)
            .collect()
    }

    /// Render metrics in Prometheus exposition format.
    pub fn render(&self) -> String {
        let families = self.families();
        let mut output = String::with_capacity(families.len() * 256);

        for family in &families {
            writeln!(output, "# HELP {} {}", family.name, family.help).ok();
            writeln!(output, "# TYPE {} gauge", family.name).ok();

            for sample in &family.samples {
                writeln!(
                    output,
                    "{}{} {}",
                    sample.name,
                    format_labels(&sample.labels),
                    format_value(sample.value)
                )
                .ok();
            }
        }

        output
    }
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else {
        // Debug keeps the decimal point on whole numbers: 215.0, not 215.
        format!("{:?}", value)
    }
}

/// Format labels for Prometheus exposition format.
fn format_labels(labels: &[(String, String)]) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    format!("{{{}}}", parts.join(","))
}

//! PrusaLink API response bodies.
//!
//! Every field is optional: firmware revisions differ in what they report,
//! and a field the printer leaves out must stay absent rather than default
//! to zero. Unknown fields are ignored.

use serde::Deserialize;

/// Body of `GET /api/version`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct VersionResponse {
    /// API version, e.g. `"2.0.0"`.
    pub api: Option<String>,
    /// PrusaLink server (firmware) version.
    pub server: Option<String>,
    pub text: Option<String>,
    pub hostname: Option<String>,
}

/// Body of `GET /api/v1/status`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StatusResponse {
    pub printer: Option<PrinterStatus>,
    /// Short job summary, present while a job is loaded.
    pub job: Option<StatusJob>,
}

/// Live printer telemetry from the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PrinterStatus {
    /// Printer state string, e.g. `"PRINTING"`.
    pub state: Option<String>,
    /// Nozzle temperature in Celsius.
    pub temp_nozzle: Option<f64>,
    /// Target nozzle temperature in Celsius.
    pub target_nozzle: Option<f64>,
    /// Bed temperature in Celsius.
    pub temp_bed: Option<f64>,
    /// Target bed temperature in Celsius.
    pub target_bed: Option<f64>,
    /// Z axis position in millimeters.
    pub axis_z: Option<f64>,
    /// Flow rate in percent.
    pub flow: Option<f64>,
    /// Speed in percent.
    pub speed: Option<f64>,
}

/// Job summary embedded in the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StatusJob {
    pub id: Option<u64>,
    pub progress: Option<f64>,
    pub time_remaining: Option<f64>,
    pub time_printing: Option<f64>,
}

/// Body of `GET /api/v1/info`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct InfoResponse {
    /// Nozzle diameter in millimeters.
    pub nozzle_diameter: Option<f64>,
    pub serial: Option<String>,
    pub hostname: Option<String>,
}

/// Body of `GET /api/v1/job`. The endpoint answers 204 when no job is loaded.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct JobResponse {
    pub id: Option<u64>,
    pub state: Option<String>,
    /// Progress in percent (0-100).
    pub progress: Option<f64>,
    /// Seconds spent printing so far.
    pub time_printing: Option<f64>,
    /// Estimated seconds left.
    pub time_remaining: Option<f64>,
    pub file: Option<JobFile>,
}

/// File metadata for the active job.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct JobFile {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub path: Option<String>,
    /// Size in bytes.
    pub size: Option<u64>,
}

impl JobFile {
    /// Human readable file name, falling back to the short name.
    pub fn label(&self) -> Option<&str> {
        self.display_name.as_deref().or(self.name.as_deref())
    }
}

/// Everything fetched from one printer in a single scrape cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrinterSnapshot {
    pub version: VersionResponse,
    pub status: StatusResponse,
    pub info: InfoResponse,
    /// `None` when the job endpoint reported no content.
    pub job: Option<JobResponse>,
}

impl PrinterSnapshot {
    /// Printer telemetry block, if the status endpoint carried one.
    pub fn printer(&self) -> Option<&PrinterStatus> {
        self.status.printer.as_ref()
    }

    /// Job progress, preferring the job endpoint over the status summary.
    pub fn job_progress(&self) -> Option<f64> {
        self.job
            .as_ref()
            .and_then(|j| j.progress)
            .or_else(|| self.status.job.as_ref().and_then(|j| j.progress))
    }

    /// Elapsed printing time in seconds.
    pub fn job_time_elapsed(&self) -> Option<f64> {
        self.job
            .as_ref()
            .and_then(|j| j.time_printing)
            .or_else(|| self.status.job.as_ref().and_then(|j| j.time_printing))
    }

    /// Remaining printing time in seconds.
    pub fn job_time_remaining(&self) -> Option<f64> {
        self.job
            .as_ref()
            .and_then(|j| j.time_remaining)
            .or_else(|| self.status.job.as_ref().and_then(|j| j.time_remaining))
    }
}

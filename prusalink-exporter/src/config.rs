//! Configuration for the PrusaLink exporter.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::http::HEALTH_PATH;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// HTTP exposition settings.
    #[serde(default)]
    pub exporter: HttpConfig,

    /// Printer polling settings.
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Printers to poll.
    #[serde(default)]
    pub printers: Vec<PrinterConfig>,

    /// Built-in alert rule evaluation.
    #[serde(default)]
    pub alerts: AlertsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Exposition endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Address to listen on (default: "127.0.0.1:9528").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_listen() -> String {
    "127.0.0.1:9528".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
        }
    }
}

/// Polling interval and upstream timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Seconds between the end of one cycle and the start of the next.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Per-request timeout against the printer, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_interval() -> u64 {
    30
}

fn default_timeout() -> u64 {
    10
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            timeout_secs: default_timeout(),
        }
    }
}

impl ScrapeConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// A single printer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterConfig {
    /// Hostname, `host:port`, or full base URL of the printer.
    pub host: String,

    /// Value of the `printer` label (default: the host).
    #[serde(default)]
    pub name: Option<String>,

    /// Username for HTTP authentication.
    #[serde(default)]
    pub username: Option<String>,

    /// Password for HTTP authentication.
    #[serde(default)]
    pub password: Option<String>,

    /// PrusaLink API key, sent as `X-Api-Key`.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl PrinterConfig {
    /// Create a printer entry with no credentials.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            name: None,
            username: None,
            password: None,
            api_key: None,
        }
    }

    /// The `printer` label value.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.host)
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{}", host)
        }
    }
}

/// Alert rule evaluation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Evaluate the default rules and log transitions.
    #[serde(default = "default_alerts_enabled")]
    pub enabled: bool,
}

fn default_alerts_enabled() -> bool {
    true
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            enabled: default_alerts_enabled(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.printers.is_empty() {
            return Err(ConfigError::Validation(
                "no printers configured, nothing to do".to_string(),
            ));
        }

        let mut labels = HashSet::new();
        for printer in &self.printers {
            if printer.host.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "printer host must not be empty".to_string(),
                ));
            }
            if !labels.insert(printer.label()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate printer name: {}",
                    printer.label()
                )));
            }
        }

        if self.scrape.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "interval_secs must be > 0".to_string(),
            ));
        }

        if self.scrape.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "timeout_secs must be > 0".to_string(),
            ));
        }

        if self
            .exporter
            .listen
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.exporter.listen
            )));
        }

        if !self.exporter.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if self.exporter.path == HEALTH_PATH {
            return Err(ConfigError::Validation(format!(
                "Metrics path must not be {}",
                HEALTH_PATH
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let json = r#"{ printers: [{ host: "prusaxl.local" }] }"#;
        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.exporter.listen, "127.0.0.1:9528");
        assert_eq!(config.exporter.path, "/metrics");
        assert_eq!(config.scrape.interval_secs, 30);
        assert_eq!(config.scrape.timeout_secs, 10);
        assert!(config.alerts.enabled);
        assert_eq!(config.printers[0].label(), "prusaxl.local");
        assert_eq!(config.printers[0].base_url(), "http://prusaxl.local");
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = ExporterConfig::parse(include_str!("../prusalink.example.json5")).unwrap();

        assert_eq!(config.printers.len(), 1);
        assert_eq!(config.printers[0].label(), "XL1");
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            exporter: { listen: "0.0.0.0:9100", path: "/prusa/metrics" },
            scrape: { interval_secs: 15, timeout_secs: 5 },
            printers: [
                {
                    host: "https://10.0.0.21/",
                    name: "XL1",
                    username: "maker",
                    password: "secret",
                },
                { host: "mk4.lan:8080", api_key: "abc123" },
            ],
            alerts: { enabled: false },
            logging: { level: "debug", format: "json" },
        }"#;

        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.exporter.listen, "0.0.0.0:9100");
        assert_eq!(config.exporter.path, "/prusa/metrics");
        assert_eq!(config.scrape.interval(), Duration::from_secs(15));
        assert_eq!(config.scrape.timeout(), Duration::from_secs(5));
        assert_eq!(config.printers.len(), 2);
        assert_eq!(config.printers[0].label(), "XL1");
        assert_eq!(config.printers[0].base_url(), "https://10.0.0.21");
        assert_eq!(config.printers[0].username.as_deref(), Some("maker"));
        assert_eq!(config.printers[1].base_url(), "http://mk4.lan:8080");
        assert_eq!(config.printers[1].api_key.as_deref(), Some("abc123"));
        assert!(!config.alerts.enabled);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_validate_no_printers() {
        let result = ExporterConfig::parse("{}");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("no printers configured")
        );
    }

    #[test]
    fn test_validate_duplicate_printer_names() {
        let json = r#"{
            printers: [
                { host: "10.0.0.21", name: "XL1" },
                { host: "10.0.0.22", name: "XL1" },
            ]
        }"#;

        let result = ExporterConfig::parse(json);
        assert!(result.unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_validate_invalid_listen() {
        let json = r#"{
            exporter: { listen: "not-an-address" },
            printers: [{ host: "xl" }]
        }"#;

        let result = ExporterConfig::parse(json);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid listen address")
        );
    }

    #[test]
    fn test_validate_invalid_path() {
        let json = r#"{
            exporter: { path: "no-leading-slash" },
            printers: [{ host: "xl" }]
        }"#;

        let result = ExporterConfig::parse(json);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("must start with /")
        );
    }

    #[test]
    fn test_validate_health_path_conflict() {
        let json = r#"{
            exporter: { path: "/health" },
            printers: [{ host: "xl" }]
        }"#;

        let result = ExporterConfig::parse(json);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("must not be /health")
        );
    }

    #[test]
    fn test_validate_zero_interval() {
        let json = r#"{
            scrape: { interval_secs: 0 },
            printers: [{ host: "xl" }]
        }"#;

        assert!(ExporterConfig::parse(json).is_err());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let json = r#"{
            scrape: { timeout_secs: 0 },
            printers: [{ host: "xl" }]
        }"#;

        assert!(ExporterConfig::parse(json).is_err());
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ printers: [{{ host: "xl", name: "XL1" }}] }}"#).unwrap();

        let config = ExporterConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.printers[0].label(), "XL1");
    }

    #[test]
    fn test_load_missing_file() {
        let result = ExporterConfig::load_from_file("/nonexistent/prusalink.json5");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}

//! Alert rules over exported metrics.
//!
//! A rule matches samples by metric name and labels, compares the value
//! against a threshold, and fires once the comparison has held for the
//! rule's hold duration. [`default_rules`] mirrors the thresholds operators
//! are expected to alert on; [`AlertMonitor`] evaluates them in-process and
//! logs transitions.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::registry::{PRINTER_STATE, SCRAPE_SUCCESSFUL, Sample, SharedRegistry};

/// Printer states that do not need operator attention.
pub const HEALTHY_STATES: &[&str] = &[
    "IDLE", "BUSY", "PRINTING", "PAUSED", "FINISHED", "STOPPED", "READY",
];

/// Comparison operators for alert rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComparisonOp {
    #[default]
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Equal,
    NotEqual,
}

impl ComparisonOp {
    /// Get the symbol for this operator.
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::GreaterThan => ">",
            ComparisonOp::GreaterOrEqual => ">=",
            ComparisonOp::LessThan => "<",
            ComparisonOp::LessOrEqual => "<=",
            ComparisonOp::Equal => "==",
            ComparisonOp::NotEqual => "!=",
        }
    }

    pub fn compare(&self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOp::GreaterThan => value > threshold,
            ComparisonOp::GreaterOrEqual => value >= threshold,
            ComparisonOp::LessThan => value < threshold,
            ComparisonOp::LessOrEqual => value <= threshold,
            ComparisonOp::Equal => (value - threshold).abs() < f64::EPSILON,
            ComparisonOp::NotEqual => (value - threshold).abs() >= f64::EPSILON,
        }
    }
}

impl std::fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Label selector for a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelMatcher {
    /// Label must equal the value.
    Equals(String, String),
    /// Label must be present and not one of the values.
    NotIn(String, Vec<String>),
}

impl LabelMatcher {
    pub fn matches(&self, sample: &Sample) -> bool {
        match self {
            LabelMatcher::Equals(label, value) => sample.label(label) == Some(value.as_str()),
            LabelMatcher::NotIn(label, values) => sample
                .label(label)
                .is_some_and(|v| !values.iter().any(|x| x == v)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Severity {
    Warning,
    #[default]
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// Alert rule definition.
#[derive(Debug, Clone)]
pub struct AlertRule {
    /// Rule name.
    pub name: String,
    /// Metric the rule applies to.
    pub metric: String,
    /// Additional label constraints.
    pub matchers: Vec<LabelMatcher>,
    /// Comparison operator.
    pub operator: ComparisonOp,
    /// Threshold value.
    pub threshold: f64,
    /// How long the condition must hold before the alert fires.
    pub hold: Duration,
    pub severity: Severity,
}

impl AlertRule {
    /// Create a new alert rule.
    pub fn new(
        name: impl Into<String>,
        metric: impl Into<String>,
        operator: ComparisonOp,
        threshold: f64,
        hold: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            metric: metric.into(),
            matchers: Vec::new(),
            operator,
            threshold,
            hold,
            severity: Severity::default(),
        }
    }

    pub fn with_matcher(mut self, matcher: LabelMatcher) -> Self {
        self.matchers.push(matcher);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Check if a sample is selected by this rule.
    pub fn matches(&self, sample: &Sample) -> bool {
        sample.name == self.metric && self.matchers.iter().all(|m| m.matches(sample))
    }

    /// Evaluate if the value triggers this rule.
    pub fn evaluate(&self, value: f64) -> bool {
        self.operator.compare(value, self.threshold)
    }
}

/// Rules matching the exporter's reference alerting thresholds.
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule::new(
            "PrusaLinkScrapeFailed",
            SCRAPE_SUCCESSFUL,
            ComparisonOp::Equal,
            0.0,
            Duration::from_secs(5 * 60),
        ),
        AlertRule::new(
            "NozzleTooHot",
            "prusalink_nozzle_temp_current",
            ComparisonOp::GreaterThan,
            295.0,
            Duration::from_secs(5 * 60),
        ),
        AlertRule::new(
            "BedTooHot",
            "prusalink_bed_temp_current",
            ComparisonOp::GreaterThan,
            125.0,
            Duration::from_secs(5 * 60),
        ),
        AlertRule::new(
            "UnexpectedPrinterState",
            PRINTER_STATE,
            ComparisonOp::Equal,
            1.0,
            Duration::from_secs(60),
        )
        .with_matcher(LabelMatcher::NotIn(
            "state".to_string(),
            HEALTHY_STATES.iter().map(|s| s.to_string()).collect(),
        )),
    ]
}

/// Alert lifecycle reported by an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    /// Condition true, hold not yet elapsed.
    Pending,
    Firing,
    /// A firing alert whose condition is no longer true.
    Resolved,
}

/// A state change for one rule and series.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub rule: String,
    pub severity: Severity,
    pub labels: Vec<(String, String)>,
    pub value: f64,
    pub status: AlertStatus,
}

impl AlertEvent {
    /// The `printer` label of the series, if any.
    pub fn printer(&self) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == "printer")
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
struct ActiveAlert {
    since: Instant,
    value: f64,
    firing: bool,
}

type SeriesId = (usize, Vec<(String, String)>);

/// Stateful evaluator tracking how long each condition has held.
#[derive(Debug)]
pub struct RuleEvaluator {
    rules: Vec<AlertRule>,
    active: HashMap<SeriesId, ActiveAlert>,
}

impl RuleEvaluator {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        Self {
            rules,
            active: HashMap::new(),
        }
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    /// Evaluate all rules against `samples` at time `now`.
    ///
    /// Returns the transitions caused by this evaluation. A series whose
    /// condition is false, or which is no longer exported, is cleared.
    pub fn evaluate(&mut self, now: Instant, samples: &[Sample]) -> Vec<AlertEvent> {
        let mut events = Vec::new();
        let mut seen = Vec::new();

        for (idx, rule) in self.rules.iter().enumerate() {
            for sample in samples.iter().filter(|s| rule.matches(s)) {
                if !rule.evaluate(sample.value) {
                    continue;
                }

                let id: SeriesId = (idx, sample.labels.clone());
                let entry = self.active.entry(id.clone()).or_insert_with(|| {
                    events.push(event(rule, sample, AlertStatus::Pending));
                    ActiveAlert {
                        since: now,
                        value: sample.value,
                        firing: false,
                    }
                });
                entry.value = sample.value;

                if !entry.firing && now.saturating_duration_since(entry.since) >= rule.hold {
                    entry.firing = true;
                    events.push(event(rule, sample, AlertStatus::Firing));
                }

                seen.push(id);
            }
        }

        let rules = &self.rules;
        self.active.retain(|id, alert| {
            if seen.contains(id) {
                return true;
            }
            if alert.firing {
                let rule = &rules[id.0];
                events.push(AlertEvent {
                    rule: rule.name.clone(),
                    severity: rule.severity,
                    labels: id.1.clone(),
                    value: alert.value,
                    status: AlertStatus::Resolved,
                });
            }
            false
        });

        events
    }

    /// Alerts currently firing.
    pub fn firing(&self) -> Vec<AlertEvent> {
        self.active
            .iter()
            .filter(|(_, alert)| alert.firing)
            .map(|((idx, labels), alert)| {
                let rule = &self.rules[*idx];
                AlertEvent {
                    rule: rule.name.clone(),
                    severity: rule.severity,
                    labels: labels.clone(),
                    value: alert.value,
                    status: AlertStatus::Firing,
                }
            })
            .collect()
    }

    /// Whether `rule` is firing for `printer`.
    pub fn is_firing(&self, rule: &str, printer: &str) -> bool {
        self.firing()
            .iter()
            .any(|a| a.rule == rule && a.printer() == Some(printer))
    }
}

fn event(rule: &AlertRule, sample: &Sample, status: AlertStatus) -> AlertEvent {
    AlertEvent {
        rule: rule.name.clone(),
        severity: rule.severity,
        labels: sample.labels.clone(),
        value: sample.value,
        status,
    }
}

/// Periodically evaluates rules against the registry and logs transitions.
pub struct AlertMonitor {
    registry: SharedRegistry,
    evaluator: RuleEvaluator,
    interval: Duration,
}

impl AlertMonitor {
    pub fn new(registry: SharedRegistry, rules: Vec<AlertRule>, interval: Duration) -> Self {
        Self {
            registry,
            evaluator: RuleEvaluator::new(rules),
            interval,
        }
    }

    /// Evaluate once against the current registry contents.
    pub fn check(&mut self, now: Instant) -> Vec<AlertEvent> {
        let samples = self.registry.samples();
        let events = self.evaluator.evaluate(now, &samples);

        for e in &events {
            let printer = e.printer().unwrap_or("-");
            match e.status {
                AlertStatus::Pending => {
                    debug!(rule = %e.rule, printer, value = e.value, "Alert pending")
                }
                AlertStatus::Firing => warn!(
                    rule = %e.rule,
                    printer,
                    severity = e.severity.as_str(),
                    value = e.value,
                    "Alert firing"
                ),
                AlertStatus::Resolved => {
                    info!(rule = %e.rule, printer, "Alert resolved")
                }
            }
        }

        events
    }

    /// Run until the shutdown signal is received.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.check(Instant::now());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        debug!("Alert monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &'static str, printer: &str, value: f64) -> Sample {
        Sample {
            name,
            labels: vec![("printer".to_string(), printer.to_string())],
            value,
        }
    }

    fn state_sample(printer: &str, state: &str, value: f64) -> Sample {
        Sample {
            name: PRINTER_STATE,
            labels: vec![
                ("printer".to_string(), printer.to_string()),
                ("state".to_string(), state.to_string()),
            ],
            value,
        }
    }

    #[test]
    fn test_comparison_operators() {
        assert!(ComparisonOp::GreaterThan.compare(300.0, 295.0));
        assert!(!ComparisonOp::GreaterThan.compare(295.0, 295.0));
        assert!(ComparisonOp::GreaterOrEqual.compare(295.0, 295.0));
        assert!(ComparisonOp::LessThan.compare(1.0, 2.0));
        assert!(ComparisonOp::LessOrEqual.compare(2.0, 2.0));
        assert!(ComparisonOp::Equal.compare(0.0, 0.0));
        assert!(ComparisonOp::NotEqual.compare(1.0, 0.0));
        assert_eq!(ComparisonOp::NotEqual.to_string(), "!=");
    }

    #[test]
    fn test_rule_matches_metric_and_labels() {
        let rule = AlertRule::new(
            "test",
            "prusalink_speed",
            ComparisonOp::LessThan,
            50.0,
            Duration::ZERO,
        )
        .with_matcher(LabelMatcher::Equals(
            "printer".to_string(),
            "XL1".to_string(),
        ));

        assert!(rule.matches(&sample("prusalink_speed", "XL1", 10.0)));
        assert!(!rule.matches(&sample("prusalink_speed", "MK4", 10.0)));
        assert!(!rule.matches(&sample("prusalink_flow_rate", "XL1", 10.0)));
    }

    #[test]
    fn test_not_in_matcher() {
        let matcher = LabelMatcher::NotIn("state".to_string(), vec!["IDLE".to_string()]);

        assert!(matcher.matches(&state_sample("XL1", "ERROR", 1.0)));
        assert!(!matcher.matches(&state_sample("XL1", "IDLE", 1.0)));
        assert!(!matcher.matches(&sample("prusalink_speed", "XL1", 1.0)));
    }

    #[test]
    fn test_pending_until_hold_elapsed() {
        let mut evaluator = RuleEvaluator::new(default_rules());
        let start = Instant::now();
        let failed = [sample(SCRAPE_SUCCESSFUL, "XL1", 0.0)];

        let events = evaluator.evaluate(start, &failed);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, AlertStatus::Pending);

        for minute in 1..5 {
            let events = evaluator.evaluate(start + Duration::from_secs(minute * 60), &failed);
            assert!(events.is_empty());
            assert!(!evaluator.is_firing("PrusaLinkScrapeFailed", "XL1"));
        }

        let events = evaluator.evaluate(start + Duration::from_secs(300), &failed);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, AlertStatus::Firing);
        assert_eq!(events[0].severity, Severity::Critical);
        assert!(evaluator.is_firing("PrusaLinkScrapeFailed", "XL1"));
    }

    #[test]
    fn test_interrupted_condition_restarts_hold() {
        let mut evaluator = RuleEvaluator::new(default_rules());
        let start = Instant::now();
        let failed = [sample(SCRAPE_SUCCESSFUL, "XL1", 0.0)];
        let ok = [sample(SCRAPE_SUCCESSFUL, "XL1", 1.0)];

        evaluator.evaluate(start, &failed);
        evaluator.evaluate(start + Duration::from_secs(240), &ok);
        evaluator.evaluate(start + Duration::from_secs(270), &failed);
        evaluator.evaluate(start + Duration::from_secs(300), &failed);

        assert!(!evaluator.is_firing("PrusaLinkScrapeFailed", "XL1"));

        evaluator.evaluate(start + Duration::from_secs(570), &failed);
        assert!(evaluator.is_firing("PrusaLinkScrapeFailed", "XL1"));
    }

    #[test]
    fn test_resolved_after_firing() {
        let mut evaluator = RuleEvaluator::new(default_rules());
        let start = Instant::now();

        evaluator.evaluate(start, &[sample("prusalink_bed_temp_current", "XL1", 130.0)]);
        evaluator.evaluate(
            start + Duration::from_secs(300),
            &[sample("prusalink_bed_temp_current", "XL1", 130.0)],
        );
        assert!(evaluator.is_firing("BedTooHot", "XL1"));

        let events = evaluator.evaluate(
            start + Duration::from_secs(330),
            &[sample("prusalink_bed_temp_current", "XL1", 60.0)],
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, AlertStatus::Resolved);
        assert_eq!(events[0].value, 130.0);
        assert!(evaluator.firing().is_empty());
    }

    #[test]
    fn test_unexpected_state_rule() {
        let mut evaluator = RuleEvaluator::new(default_rules());
        let start = Instant::now();
        let samples = [
            state_sample("XL1", "PRINTING", 0.0),
            state_sample("XL1", "ERROR", 1.0),
            state_sample("MK4", "PRINTING", 1.0),
            state_sample("MK4", "ERROR", 0.0),
        ];

        evaluator.evaluate(start, &samples);
        evaluator.evaluate(start + Duration::from_secs(60), &samples);

        assert!(evaluator.is_firing("UnexpectedPrinterState", "XL1"));
        assert!(!evaluator.is_firing("UnexpectedPrinterState", "MK4"));
    }

    #[test]
    fn test_series_tracked_per_printer() {
        let mut evaluator = RuleEvaluator::new(default_rules());
        let start = Instant::now();

        evaluator.evaluate(
            start,
            &[sample("prusalink_nozzle_temp_current", "XL1", 300.0)],
        );
        evaluator.evaluate(
            start + Duration::from_secs(200),
            &[
                sample("prusalink_nozzle_temp_current", "XL1", 300.0),
                sample("prusalink_nozzle_temp_current", "MK4", 300.0),
            ],
        );
        evaluator.evaluate(
            start + Duration::from_secs(300),
            &[
                sample("prusalink_nozzle_temp_current", "XL1", 300.0),
                sample("prusalink_nozzle_temp_current", "MK4", 300.0),
            ],
        );

        assert!(evaluator.is_firing("NozzleTooHot", "XL1"));
        assert!(!evaluator.is_firing("NozzleTooHot", "MK4"));
    }

    #[test]
    fn test_monitor_reads_registry() {
        use crate::registry::MetricRegistry;
        use std::sync::Arc;

        let registry = Arc::new(MetricRegistry::new(["XL1"]));
        let mut monitor = AlertMonitor::new(
            registry.clone(),
            default_rules(),
            Duration::from_secs(30),
        );

        // Fresh registry: scrape_successful starts at 0.
        let events = monitor.check(Instant::now());
        assert!(
            events
                .iter()
                .any(|e| e.rule == "PrusaLinkScrapeFailed" && e.status == AlertStatus::Pending)
        );
    }
}

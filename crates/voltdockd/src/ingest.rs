//! Telemetry ingestion engine.
//!
//! Re-reads the controller's telemetry file on a fixed cadence and pushes
//! per-bay charge levels to the display. The file is rewritten in place by
//! a separate process, so any cycle can catch it missing, truncated, or
//! half-written; those are degraded states to ride out, not errors to
//! escalate. The display keeps its last good values until fresh data lands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use voltdock_common::config::{TelemetrySettings, MAX_MODULES};

use crate::diag::{Once, Throttle};
use crate::sink::DisplaySink;
use crate::source::load_json;

const FAILURE_KEY: &str = "telemetry-load";

/// Ingestion health, carried across cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionHealth {
    /// Whether the previous cycle parsed successfully.
    pub last_success: bool,
    /// Failed cycles since the last success.
    pub consecutive_failures: u32,
}

impl Default for IngestionHealth {
    fn default() -> Self {
        // Starts as if healthy, so the very first failure is a boundary.
        Self {
            last_success: true,
            consecutive_failures: 0,
        }
    }
}

/// What one poll cycle did, for callers and tests.
#[derive(Debug, Clone, Default)]
pub struct PollReport {
    /// Bays pushed to the display this cycle.
    pub applied: usize,
    /// Load or shape failure detail, when the cycle failed.
    pub failure: Option<String>,
    /// Whether a failure diagnostic line went out.
    pub diagnostic_emitted: bool,
    /// Whether this cycle ended a failed run.
    pub recovered: bool,
}

pub struct TelemetryEngine {
    path: PathBuf,
    min_bytes: u64,
    max_bytes: u64,
    low_voltage: f64,
    high_voltage: f64,
    voltage_warn_interval: Duration,
    burst_threshold: u32,
    burst_window: Duration,
    sink: Arc<dyn DisplaySink>,
    health: IngestionHealth,
    failure_throttle: Throttle<&'static str>,
    voltage_warns: Throttle<usize>,
    missing_field_once: Once<usize>,
    overflow_warned: bool,
}

impl TelemetryEngine {
    pub fn new(settings: &TelemetrySettings, sink: Arc<dyn DisplaySink>) -> Self {
        let (low_voltage, high_voltage) = settings.effective_voltage_range();
        if settings.voltage_range_was_replaced() {
            warn!(
                "configured voltage range {:.1}-{:.1} V unusable, using {:.1}-{:.1} V",
                settings.low_voltage, settings.high_voltage, low_voltage, high_voltage
            );
        }
        Self {
            path: PathBuf::from(&settings.metrics_path),
            min_bytes: settings.min_file_bytes,
            max_bytes: settings.max_file_bytes,
            low_voltage,
            high_voltage,
            voltage_warn_interval: Duration::from_secs(settings.voltage_warn_secs),
            burst_threshold: settings.burst_threshold,
            burst_window: Duration::from_secs(settings.burst_log_secs),
            sink,
            health: IngestionHealth::default(),
            failure_throttle: Throttle::new(),
            voltage_warns: Throttle::new(),
            missing_field_once: Once::new(),
            overflow_warned: false,
        }
    }

    pub fn health(&self) -> IngestionHealth {
        self.health
    }

    /// One poll cycle against the wall clock.
    pub fn poll_once(&mut self) -> PollReport {
        self.poll_once_at(Instant::now())
    }

    /// One poll cycle against an explicit clock, so tests can compress time.
    pub fn poll_once_at(&mut self, now: Instant) -> PollReport {
        let doc = match load_json(&self.path, self.min_bytes, self.max_bytes) {
            Ok(doc) => doc,
            Err(e) => return self.record_failure(e.to_string(), now),
        };

        let modules = match doc.get("modules").and_then(|m| m.as_array()) {
            Some(modules) => modules,
            None => return self.record_failure("document has no modules array".to_string(), now),
        };

        let mut report = self.record_success();
        self.apply_modules(modules, now, &mut report);
        report
    }

    /// Failure path: count it, maybe say something, keep the display as is.
    fn record_failure(&mut self, detail: String, now: Instant) -> PollReport {
        let was_success = self.health.last_success;
        self.health.last_success = false;
        self.health.consecutive_failures = self.health.consecutive_failures.saturating_add(1);

        let mut emitted = false;
        if was_success {
            warn!("telemetry unreadable, keeping last good display: {}", detail);
            self.failure_throttle.mark(FAILURE_KEY, now);
            emitted = true;
        } else if self.health.consecutive_failures > self.burst_threshold
            && self.failure_throttle.ready(FAILURE_KEY, self.burst_window, now)
        {
            warn!(
                "telemetry still unreadable after {} cycles: {}",
                self.health.consecutive_failures, detail
            );
            emitted = true;
        }

        PollReport {
            applied: 0,
            failure: Some(detail),
            diagnostic_emitted: emitted,
            recovered: false,
        }
    }

    /// Success path: announce the end of a failed run exactly once, reset.
    fn record_success(&mut self) -> PollReport {
        let failures = self.health.consecutive_failures;
        let recovered = !self.health.last_success;
        if recovered {
            info!("telemetry recovered after {} failed cycles", failures);
        }
        self.health.last_success = true;
        self.health.consecutive_failures = 0;
        PollReport {
            recovered,
            ..Default::default()
        }
    }

    fn apply_modules(
        &mut self,
        modules: &[serde_json::Value],
        now: Instant,
        report: &mut PollReport,
    ) {
        if modules.len() > MAX_MODULES && !self.overflow_warned {
            warn!(
                "telemetry reports {} bays, dock has {}; extras ignored",
                modules.len(),
                MAX_MODULES
            );
            self.overflow_warned = true;
        }

        for (index, module) in modules.iter().take(MAX_MODULES).enumerate() {
            let voltage = match module.get("bus_voltage").and_then(|v| v.as_f64()) {
                Some(v) => v,
                None => {
                    if self.missing_field_once.first(index) {
                        debug!("bay {}: no usable bus_voltage, skipping", index);
                    }
                    continue;
                }
            };

            if (voltage < self.low_voltage || voltage > self.high_voltage)
                && self.voltage_warns.ready(index, self.voltage_warn_interval, now)
            {
                warn!(
                    "bay {}: {:.2} V outside calibration range {:.1}-{:.1} V",
                    index, voltage, self.low_voltage, self.high_voltage
                );
            }

            let percent = self.voltage_percent(voltage);
            self.sink.module_level(index, percent, voltage);
            report.applied += 1;
        }
    }

    /// Map pack voltage onto percent of the calibration range.
    fn voltage_percent(&self, voltage: f64) -> u8 {
        let span = self.high_voltage - self.low_voltage;
        let raw = ((voltage - self.low_voltage) / span * 100.0).round();
        raw.clamp(0.0, 100.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::Severity;

    struct NullSink;

    impl DisplaySink for NullSink {
        fn module_level(&self, _index: usize, _percent: u8, _voltage: f64) {}
        fn stat_field(&self, _field: &str, _value: &str) {}
        fn status(&self, _message: &str, _severity: Severity) {}
    }

    fn engine() -> TelemetryEngine {
        TelemetryEngine::new(&TelemetrySettings::default(), Arc::new(NullSink))
    }

    #[test]
    fn test_percent_at_calibration_edges() {
        let engine = engine();
        assert_eq!(engine.voltage_percent(18.0), 0);
        assert_eq!(engine.voltage_percent(21.0), 100);
    }

    #[test]
    fn test_percent_clamps_out_of_range() {
        let engine = engine();
        assert_eq!(engine.voltage_percent(13.0), 0);
        assert_eq!(engine.voltage_percent(26.0), 100);
    }

    #[test]
    fn test_percent_interpolates_and_rounds() {
        let engine = engine();
        assert_eq!(engine.voltage_percent(19.5), 50);
        assert_eq!(engine.voltage_percent(18.75), 25);
        assert_eq!(engine.voltage_percent(19.8), 60);
        // 18.01 -> 0.333...%, rounds to 0
        assert_eq!(engine.voltage_percent(18.01), 0);
        // 18.02 -> 0.666...%, rounds to 1
        assert_eq!(engine.voltage_percent(18.02), 1);
    }

    #[test]
    fn test_health_starts_clean() {
        let engine = engine();
        assert!(engine.health().last_success);
        assert_eq!(engine.health().consecutive_failures, 0);
    }

    #[test]
    fn test_custom_calibration_range() {
        let mut settings = TelemetrySettings::default();
        settings.low_voltage = 10.0;
        settings.high_voltage = 20.0;
        let engine = TelemetryEngine::new(&settings, Arc::new(NullSink));
        assert_eq!(engine.voltage_percent(15.0), 50);
        assert_eq!(engine.voltage_percent(10.0), 0);
        assert_eq!(engine.voltage_percent(20.0), 100);
    }
}

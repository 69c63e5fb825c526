//! Display sink seam.
//!
//! The daemon never talks to a toolkit. Everything user-visible funnels
//! through [`DisplaySink`]; the stock implementation renders to the log,
//! and a GUI shell implements the same trait in its own process space.

use tracing::{debug, error, info, warn};

/// Status message severity, mapped by the shell to color/urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// Everything the daemon shows an operator.
pub trait DisplaySink: Send + Sync {
    /// Update one charge bay gauge.
    fn module_level(&self, index: usize, percent: u8, voltage: f64);

    /// Update one labeled field on the aggregate stats panel.
    fn stat_field(&self, field: &str, value: &str);

    /// Show a transient status message.
    fn status(&self, message: &str, severity: Severity);
}

/// Renders every display update through the log.
///
/// Gauge and panel updates land on every poll cycle, so they go out at
/// debug level; status messages are the operator-facing ones.
pub struct LogSink;

impl DisplaySink for LogSink {
    fn module_level(&self, index: usize, percent: u8, voltage: f64) {
        debug!("bay {}: {}% ({:.2} V)", index, percent, voltage);
    }

    fn stat_field(&self, field: &str, value: &str) {
        debug!("stats {}: {}", field, value);
    }

    fn status(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info => info!("{}", message),
            Severity::Success => info!("✅  {}", message),
            Severity::Warning => warn!("{}", message),
            Severity::Error => error!("❌  {}", message),
        }
    }
}

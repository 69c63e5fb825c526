//! Aggregate battery statistics panel.
//!
//! Statistics live in a second controller-owned file and are read on demand
//! when an operator selects a bay, then re-read on a slow cadence while the
//! selection holds. A load failure blanks the panel to N/A: for a
//! user-triggered view an explicit unknown beats silently stale numbers.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use voltdock_common::config::TelemetrySettings;

use crate::sink::DisplaySink;
use crate::source::{load_json, LoadError};

/// Placeholder pushed to every field when stats cannot be read.
pub const NOT_AVAILABLE: &str = "N/A";

/// Panel fields, in display order. Keys match the stats file.
const FIELDS: [&str; 7] = [
    "total_charging_time",
    "wh",
    "ah",
    "min_temp",
    "max_temp",
    "soh",
    "soc",
];

/// Why a stats lookup produced nothing.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("stats file has no modules array")]
    BadShape,

    #[error("no stats entry for module {0}")]
    ModuleMissing(u64),
}

/// Per-bay aggregate record. Fields the controller omitted stay None.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatteryAggregate {
    pub module_id: u64,
    pub total_charging_secs: Option<u64>,
    pub watt_hours: Option<f64>,
    pub amp_hours: Option<f64>,
    pub min_temp_c: Option<f64>,
    pub max_temp_c: Option<f64>,
    pub soh_percent: Option<f64>,
    pub soc_percent: Option<f64>,
}

pub struct StatsPanel {
    path: PathBuf,
    max_bytes: u64,
    sink: Arc<dyn DisplaySink>,
    selected: Option<u64>,
}

impl StatsPanel {
    pub fn new(settings: &TelemetrySettings, sink: Arc<dyn DisplaySink>) -> Self {
        Self {
            path: PathBuf::from(&settings.stats_path),
            max_bytes: settings.max_file_bytes,
            sink,
            selected: None,
        }
    }

    /// Select a bay and populate the panel for it.
    pub fn select(&mut self, module_id: u64) -> Result<BatteryAggregate, LookupError> {
        self.selected = Some(module_id);
        self.lookup(module_id)
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<u64> {
        self.selected
    }

    /// Re-run the lookup for the selected bay, if any. Driven by the slow
    /// refresh timer; failures are already surfaced by `lookup`.
    pub fn refresh_selected(&mut self) {
        if let Some(id) = self.selected {
            if let Err(e) = self.lookup(id) {
                debug!("stats refresh for module {} failed: {}", id, e);
            }
        }
    }

    /// Load stats for one bay and push its fields to the display.
    pub fn lookup(&self, module_id: u64) -> Result<BatteryAggregate, LookupError> {
        let doc = match load_json(&self.path, 1, self.max_bytes) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("battery stats unreadable: {}", e);
                self.blank_panel();
                return Err(e.into());
            }
        };

        let modules = match doc.get("modules").and_then(|m| m.as_array()) {
            Some(modules) => modules,
            None => {
                warn!("battery stats file has no modules array");
                self.blank_panel();
                return Err(LookupError::BadShape);
            }
        };

        let entry = modules
            .iter()
            .find(|m| m.get("id").and_then(|v| v.as_u64()) == Some(module_id));
        let entry = match entry {
            Some(entry) => entry,
            None => {
                warn!("no stats recorded for module {}", module_id);
                return Err(LookupError::ModuleMissing(module_id));
            }
        };

        let aggregate = BatteryAggregate {
            module_id,
            total_charging_secs: read_secs(entry, "total_charging_time"),
            watt_hours: read_f64(entry, "wh"),
            amp_hours: read_f64(entry, "ah"),
            min_temp_c: read_f64(entry, "min_temp"),
            max_temp_c: read_f64(entry, "max_temp"),
            soh_percent: read_f64(entry, "soh"),
            soc_percent: read_f64(entry, "soc"),
        };
        self.render(&aggregate);
        Ok(aggregate)
    }

    /// Push every present field; absent ones keep their previous display.
    fn render(&self, agg: &BatteryAggregate) {
        if let Some(secs) = agg.total_charging_secs {
            self.sink.stat_field("total_charging_time", &format_hms(secs));
        }
        if let Some(wh) = agg.watt_hours {
            self.sink.stat_field("wh", &format!("{:.2} Wh", wh));
        }
        if let Some(ah) = agg.amp_hours {
            self.sink.stat_field("ah", &format!("{:.3} Ah", ah));
        }
        if let Some(t) = agg.min_temp_c {
            self.sink.stat_field("min_temp", &format!("{:.1} C", t));
        }
        if let Some(t) = agg.max_temp_c {
            self.sink.stat_field("max_temp", &format!("{:.1} C", t));
        }
        if let Some(soh) = agg.soh_percent {
            self.sink.stat_field("soh", &format!("{:.1} %", soh));
        }
        if let Some(soc) = agg.soc_percent {
            self.sink.stat_field("soc", &format!("{:.1} %", soc));
        }
    }

    fn blank_panel(&self) {
        for field in FIELDS {
            self.sink.stat_field(field, NOT_AVAILABLE);
        }
    }
}

fn read_f64(entry: &serde_json::Value, key: &str) -> Option<f64> {
    entry.get(key).and_then(|v| v.as_f64())
}

// The controller nominally writes integer seconds, but its JSON layer has
// emitted floats before; accept both.
fn read_secs(entry: &serde_json::Value, key: &str) -> Option<u64> {
    let value = entry.get(key)?;
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
}

/// Seconds to HH:MM:SS by integer division.
pub fn format_hms(total_secs: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60
    )
}

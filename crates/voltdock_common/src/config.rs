//! VoltDock configuration.
//!
//! Configuration lives in /etc/voltdock/config.toml. Every field has a
//! default, so a missing or partial file behaves like a stock install and
//! never an error. Out-of-range values are clamped through the
//! `effective_*()` accessors rather than rejected.
//!
//! v1.0.2: calibration range and diagnostic pacing made configurable
//! v1.0.3: update mode (auto/manual) and startup check gate

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// System configuration directory
pub const SYSTEM_CONFIG_DIR: &str = "/etc/voltdock";
const CONFIG_FILE: &str = "config.toml";

/// Charge bays a dock chassis can physically hold.
pub const MAX_MODULES: usize = 8;

/// Telemetry ingestion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySettings {
    /// Live telemetry file written by the charger controller
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,

    /// Aggregate battery statistics file
    #[serde(default = "default_stats_path")]
    pub stats_path: String,

    /// How often to re-read the telemetry file (ms, valid: 100-10000)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How often to refresh the selected stats panel (seconds, valid: 1-60)
    #[serde(default = "default_stats_refresh_secs")]
    pub stats_refresh_secs: u64,

    /// Files smaller than this are treated as mid-write and rejected
    #[serde(default = "default_min_file_bytes")]
    pub min_file_bytes: u64,

    /// Files larger than this are rejected outright
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Pack voltage mapped to 0% charge
    #[serde(default = "default_low_voltage")]
    pub low_voltage: f64,

    /// Pack voltage mapped to 100% charge
    #[serde(default = "default_high_voltage")]
    pub high_voltage: f64,

    /// Minimum spacing of out-of-range voltage warnings, per bay (seconds)
    #[serde(default = "default_voltage_warn_secs")]
    pub voltage_warn_secs: u64,

    /// Consecutive failures before the burst diagnostic path re-arms
    #[serde(default = "default_burst_threshold")]
    pub burst_threshold: u32,

    /// Minimum spacing of burst diagnostics (seconds)
    #[serde(default = "default_burst_log_secs")]
    pub burst_log_secs: u64,
}

fn default_metrics_path() -> String {
    "/run/voltdock/telemetry.json".to_string()
}

fn default_stats_path() -> String {
    "/run/voltdock/battery_stats.json".to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_stats_refresh_secs() -> u64 {
    2
}

fn default_min_file_bytes() -> u64 {
    50 // anything shorter cannot be a complete telemetry document
}

fn default_max_file_bytes() -> u64 {
    256 * 1024
}

fn default_low_voltage() -> f64 {
    18.0
}

fn default_high_voltage() -> f64 {
    21.0
}

fn default_voltage_warn_secs() -> u64 {
    60
}

fn default_burst_threshold() -> u32 {
    20
}

fn default_burst_log_secs() -> u64 {
    10
}

impl TelemetrySettings {
    /// Validate and clamp poll_interval_ms to valid range (100-10000)
    pub fn effective_poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms.clamp(100, 10_000)
    }

    /// Validate and clamp stats_refresh_secs to valid range (1-60)
    pub fn effective_stats_refresh_secs(&self) -> u64 {
        self.stats_refresh_secs.clamp(1, 60)
    }

    /// Calibration range, falling back to stock values when inverted
    pub fn effective_voltage_range(&self) -> (f64, f64) {
        if self.high_voltage > self.low_voltage {
            (self.low_voltage, self.high_voltage)
        } else {
            (default_low_voltage(), default_high_voltage())
        }
    }

    /// Check if poll_interval_ms was clamped
    pub fn poll_interval_was_clamped(&self) -> bool {
        self.poll_interval_ms != self.effective_poll_interval_ms()
    }

    /// Check if the configured calibration range was unusable
    pub fn voltage_range_was_replaced(&self) -> bool {
        self.effective_voltage_range() != (self.low_voltage, self.high_voltage)
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            metrics_path: default_metrics_path(),
            stats_path: default_stats_path(),
            poll_interval_ms: default_poll_interval_ms(),
            stats_refresh_secs: default_stats_refresh_secs(),
            min_file_bytes: default_min_file_bytes(),
            max_file_bytes: default_max_file_bytes(),
            low_voltage: default_low_voltage(),
            high_voltage: default_high_voltage(),
            voltage_warn_secs: default_voltage_warn_secs(),
            burst_threshold: default_burst_threshold(),
            burst_log_secs: default_burst_log_secs(),
        }
    }
}

/// Update mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Install as soon as a newer release is found
    Auto,
    /// Hold at AwaitingConfirmation until the operator confirms
    #[default]
    Manual,
}

impl UpdateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateMode::Auto => "auto",
            UpdateMode::Manual => "manual",
        }
    }
}

/// Self-update settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSettings {
    /// Whether update checks are allowed at all
    #[serde(default = "default_update_enabled")]
    pub enabled: bool,

    /// auto installs immediately, manual waits for confirmation
    #[serde(default)]
    pub mode: UpdateMode,

    /// Run one check right after boot (still preflight-gated)
    #[serde(default = "default_check_on_startup")]
    pub check_on_startup: bool,

    /// GitHub repository owner
    #[serde(default = "default_repo_owner")]
    pub repo_owner: String,

    /// GitHub repository name
    #[serde(default = "default_repo_name")]
    pub repo_name: String,

    /// Optional token file ({"github_token": "..."}); absent is fine
    #[serde(default = "default_token_path")]
    pub token_path: String,

    /// Token files larger than this are ignored as corrupt
    #[serde(default = "default_token_max_bytes")]
    pub token_max_bytes: u64,

    /// Installer launched detached with (owner, repo, version)
    #[serde(default = "default_installer")]
    pub installer: String,

    /// Release API timeout (seconds, valid: 1-120)
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_update_enabled() -> bool {
    true
}

fn default_check_on_startup() -> bool {
    true
}

fn default_repo_owner() -> String {
    "voltdock".to_string()
}

fn default_repo_name() -> String {
    "voltdock".to_string()
}

fn default_token_path() -> String {
    "/etc/voltdock/ota.json".to_string()
}

fn default_token_max_bytes() -> u64 {
    10_000
}

fn default_installer() -> String {
    "/usr/local/lib/voltdock/ota-install".to_string()
}

fn default_http_timeout_secs() -> u64 {
    10
}

impl UpdateSettings {
    /// Validate and clamp http_timeout_secs to valid range (1-120)
    pub fn effective_http_timeout_secs(&self) -> u64 {
        self.http_timeout_secs.clamp(1, 120)
    }
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            enabled: default_update_enabled(),
            mode: UpdateMode::Manual,
            check_on_startup: default_check_on_startup(),
            repo_owner: default_repo_owner(),
            repo_name: default_repo_name(),
            token_path: default_token_path(),
            token_max_bytes: default_token_max_bytes(),
            installer: default_installer(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

/// Network settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Wireless interface checked by the reachability preflight
    #[serde(default = "default_wifi_interface")]
    pub wifi_interface: String,
}

fn default_wifi_interface() -> String {
    "wlan0".to_string()
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            wifi_interface: default_wifi_interface(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Complete daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockConfig {
    #[serde(default)]
    pub telemetry: TelemetrySettings,

    #[serde(default)]
    pub update: UpdateSettings,

    #[serde(default)]
    pub network: NetworkSettings,

    #[serde(default)]
    pub log: LogSettings,
}

impl DockConfig {
    /// Load config from the system config file (/etc/voltdock/config.toml)
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    /// Load config from an explicit path, falling back to defaults on any
    /// read or parse failure.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            if let Ok(content) = fs::read_to_string(path) {
                if let Ok(config) = toml::from_str(&content) {
                    return config;
                }
            }
        }
        Self::default()
    }

    /// Save config to the system config file
    pub fn save(&self) -> std::io::Result<()> {
        let path = config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, content)
    }
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    PathBuf::from(SYSTEM_CONFIG_DIR).join(CONFIG_FILE)
}

/// Get the config directory
pub fn config_dir() -> PathBuf {
    PathBuf::from(SYSTEM_CONFIG_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DockConfig::default();
        assert_eq!(config.telemetry.metrics_path, "/run/voltdock/telemetry.json");
        assert_eq!(config.telemetry.poll_interval_ms, 500);
        assert_eq!(config.telemetry.low_voltage, 18.0);
        assert_eq!(config.telemetry.high_voltage, 21.0);
        assert_eq!(config.update.mode, UpdateMode::Manual);
        assert!(config.update.enabled);
        assert_eq!(config.update.http_timeout_secs, 10);
        assert_eq!(config.network.wifi_interface, "wlan0");
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_poll_interval_clamping() {
        let mut settings = TelemetrySettings::default();
        settings.poll_interval_ms = 10;
        assert_eq!(settings.effective_poll_interval_ms(), 100);
        assert!(settings.poll_interval_was_clamped());

        settings.poll_interval_ms = 60_000;
        assert_eq!(settings.effective_poll_interval_ms(), 10_000);

        settings.poll_interval_ms = 500;
        assert!(!settings.poll_interval_was_clamped());
    }

    #[test]
    fn test_inverted_voltage_range_replaced() {
        let mut settings = TelemetrySettings::default();
        settings.low_voltage = 22.0;
        settings.high_voltage = 18.0;
        assert_eq!(settings.effective_voltage_range(), (18.0, 21.0));
        assert!(settings.voltage_range_was_replaced());

        settings.low_voltage = 16.0;
        settings.high_voltage = 20.0;
        assert_eq!(settings.effective_voltage_range(), (16.0, 20.0));
        assert!(!settings.voltage_range_was_replaced());
    }

    #[test]
    fn test_http_timeout_clamping() {
        let mut settings = UpdateSettings::default();
        settings.http_timeout_secs = 0;
        assert_eq!(settings.effective_http_timeout_secs(), 1);
        settings.http_timeout_secs = 600;
        assert_eq!(settings.effective_http_timeout_secs(), 120);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = DockConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: DockConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.telemetry.poll_interval_ms, config.telemetry.poll_interval_ms);
        assert_eq!(parsed.update.repo_owner, config.update.repo_owner);
        assert_eq!(parsed.update.mode, config.update.mode);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let content = r#"
[telemetry]
poll_interval_ms = 250

[update]
mode = "auto"
repo_owner = "powerdock-labs"
"#;
        let config: DockConfig = toml::from_str(content).unwrap();
        assert_eq!(config.telemetry.poll_interval_ms, 250);
        assert_eq!(config.telemetry.stats_refresh_secs, 2);
        assert_eq!(config.update.mode, UpdateMode::Auto);
        assert_eq!(config.update.repo_owner, "powerdock-labs");
        assert_eq!(config.update.repo_name, "voltdock");
        assert_eq!(config.network.wifi_interface, "wlan0");
    }

    #[test]
    fn test_load_from_missing_or_bad_file() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("nope.toml");
        let config = DockConfig::load_from(&missing);
        assert_eq!(config.telemetry.poll_interval_ms, 500);

        let bad = dir.path().join("bad.toml");
        fs::write(&bad, "this is [not valid toml").unwrap();
        let config = DockConfig::load_from(&bad);
        assert_eq!(config.telemetry.poll_interval_ms, 500);
    }
}

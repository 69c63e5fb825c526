//! VoltDock daemon - dock-side telemetry monitor and updater.
//!
//! Polls charger telemetry for the bay gauges, refreshes the selected
//! battery's statistics on a slower cadence, and drives self-update
//! sessions. Display output goes through the sink seam; a GUI shell
//! embeds the same components through the library crate.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time;
use tracing::{info, warn};

use voltdock_common::config::DockConfig;
use voltdock_common::exec::SystemRunner;
use voltdock_common::version::CURRENT_VERSION;

use voltdockd::ingest::TelemetryEngine;
use voltdockd::ota::UpdateOrchestrator;
use voltdockd::preflight::Preflight;
use voltdockd::sink::LogSink;
use voltdockd::stats::StatsPanel;

#[tokio::main]
async fn main() -> Result<()> {
    // Config first so its log level can seed the filter.
    let config = DockConfig::load();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.level)),
        )
        .init();

    info!("[BOOT] VoltDock daemon v{} starting...", CURRENT_VERSION);

    let config_file = voltdock_common::config::config_path();
    if config_file.exists() {
        info!("[BOOT] config: {}", config_file.display());
    } else {
        info!("[BOOT] config: built-in defaults ({} absent)", config_file.display());
    }
    info!(
        "[BOOT] telemetry {} every {}ms, stats {} every {}s",
        config.telemetry.metrics_path,
        config.telemetry.effective_poll_interval_ms(),
        config.telemetry.stats_path,
        config.telemetry.effective_stats_refresh_secs()
    );
    if config.telemetry.poll_interval_was_clamped() {
        warn!(
            "[BOOT] poll_interval_ms {} out of range, clamped to {}",
            config.telemetry.poll_interval_ms,
            config.telemetry.effective_poll_interval_ms()
        );
    }

    let runner = Arc::new(SystemRunner);
    let sink = Arc::new(LogSink);

    let mut engine = TelemetryEngine::new(&config.telemetry, sink.clone());
    let mut stats = StatsPanel::new(&config.telemetry, sink.clone());
    let preflight = Preflight::new(runner.clone(), config.network.wifi_interface.clone());

    match preflight.active_link() {
        Some(link) => match link.signal {
            Some(signal) => info!("[BOOT] wifi: {} ({}%)", link.ssid, signal),
            None => info!("[BOOT] wifi: {}", link.ssid),
        },
        None => info!("[BOOT] wifi: not associated"),
    }

    let mut updates = UpdateOrchestrator::new(
        config.update.clone(),
        preflight,
        runner.clone(),
        sink.clone(),
    );

    if config.update.enabled && config.update.check_on_startup {
        updates.run_check().await;
    }

    let mut poll_tick = time::interval(Duration::from_millis(
        config.telemetry.effective_poll_interval_ms(),
    ));
    let mut stats_tick = time::interval(Duration::from_secs(
        config.telemetry.effective_stats_refresh_secs(),
    ));

    info!("[BOOT] VoltDock daemon ready");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down gracefully");
                break;
            }

            _ = poll_tick.tick() => {
                engine.poll_once();
            }

            _ = stats_tick.tick() => {
                stats.refresh_selected();
            }
        }
    }

    Ok(())
}

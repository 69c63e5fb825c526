//! System power actions.
//!
//! The dock shell has hard power controls; the daemon just relays them to
//! systemd through the command layer.

use tracing::{info, warn};

use voltdock_common::exec::CommandRunner;

/// Ask systemd to power the dock off.
pub fn shutdown(runner: &dyn CommandRunner) -> bool {
    power_action(runner, "poweroff")
}

/// Ask systemd to reboot the dock.
pub fn reboot(runner: &dyn CommandRunner) -> bool {
    power_action(runner, "reboot")
}

fn power_action(runner: &dyn CommandRunner, verb: &str) -> bool {
    info!("requesting system {}", verb);
    let result = runner.run("systemctl", &[verb]);
    if !result.ok() {
        warn!("systemctl {} failed: {}", verb, result.stderr.trim());
    }
    result.ok()
}

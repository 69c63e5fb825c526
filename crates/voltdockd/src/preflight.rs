//! Network reachability preflight.
//!
//! Answers one question before anything touches the release API: is there a
//! usable route out right now. Probes NetworkManager first and falls back to
//! the routing table only when the device probe itself cannot run. Ambiguity
//! means unreachable; skipping a check cycle is cheaper than hanging on a
//! dead network.

use std::sync::Arc;

use tracing::debug;

use voltdock_common::exec::{CommandRunner, ExecStatus};

/// What a positive verdict was based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evidence {
    /// NetworkManager reported the interface connected.
    ServiceCheck,
    /// Only the routing table vouched for a default route.
    RouteCheck,
}

/// Preflight verdict. Computed fresh per call, never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReachabilityResult {
    pub reachable: bool,
    pub evidence: Option<Evidence>,
}

impl ReachabilityResult {
    fn unreachable() -> Self {
        Self {
            reachable: false,
            evidence: None,
        }
    }

    fn via(evidence: Evidence) -> Self {
        Self {
            reachable: true,
            evidence: Some(evidence),
        }
    }
}

/// Active wireless association, when one exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiLink {
    pub ssid: String,
    pub signal: Option<u8>,
}

pub struct Preflight {
    runner: Arc<dyn CommandRunner>,
    interface: String,
}

impl Preflight {
    pub fn new(runner: Arc<dyn CommandRunner>, interface: impl Into<String>) -> Self {
        Self {
            runner,
            interface: interface.into(),
        }
    }

    /// Layered reachability check, cheapest and most reliable layer first.
    pub fn check(&self) -> ReachabilityResult {
        // NetworkManager must be running at all.
        let service = self
            .runner
            .run("systemctl", &["is-active", "NetworkManager.service"]);
        if !(service.ok() && service.stdout.trim() == "active") {
            debug!(
                "preflight: NetworkManager not active ({})",
                service.stdout.trim()
            );
            return ReachabilityResult::unreachable();
        }

        // Overall connectivity state. "connected (site only)" still counts;
        // "disconnected" and "connecting" do not.
        let general = self.runner.run("nmcli", &["-t", "-f", "STATE", "general"]);
        let general_state = general.stdout.trim();
        if !(general.ok() && general_state.starts_with("connected")) {
            debug!("preflight: general state '{}'", general_state);
            return ReachabilityResult::unreachable();
        }

        // The wireless device itself. Terse output looks like
        // "GENERAL.STATE:100 (connected)".
        let device = self.runner.run(
            "nmcli",
            &["-t", "-f", "GENERAL.STATE", "device", "show", &self.interface],
        );
        match device.status {
            ExecStatus::Success => {
                let state = device.stdout.trim();
                if state.contains("100") || state.contains("(connected)") {
                    ReachabilityResult::via(Evidence::ServiceCheck)
                } else {
                    debug!("preflight: {} not connected ({})", self.interface, state);
                    ReachabilityResult::unreachable()
                }
            }
            ExecStatus::NonZeroExit => {
                // The tool ran and said no (unknown device, radio off).
                debug!(
                    "preflight: device probe rejected ({})",
                    device.stderr.trim()
                );
                ReachabilityResult::unreachable()
            }
            ExecStatus::CommandNotFound | ExecStatus::PermissionDenied | ExecStatus::OsError => {
                // The probe itself could not run; weaker routing-table check.
                self.route_fallback()
            }
        }
    }

    fn route_fallback(&self) -> ReachabilityResult {
        let route = self.runner.run("ip", &["route"]);
        if route.ok() && route.stdout.lines().any(|l| l.starts_with("default")) {
            debug!("preflight: accepting on default route only");
            ReachabilityResult::via(Evidence::RouteCheck)
        } else {
            ReachabilityResult::unreachable()
        }
    }

    /// Current wireless association, for the boot banner. Best effort.
    pub fn active_link(&self) -> Option<WifiLink> {
        let scan = self
            .runner
            .run("nmcli", &["-t", "-f", "ACTIVE,SSID,SIGNAL", "dev", "wifi"]);
        if !scan.ok() {
            return None;
        }

        // Lines look like "yes:HomeNet:87"; SSIDs with colons are rare on
        // our hardware and not worth an escape-aware parser.
        scan.stdout.lines().find_map(|line| {
            let mut parts = line.splitn(3, ':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some("yes"), Some(ssid), signal) if !ssid.is_empty() => Some(WifiLink {
                    ssid: ssid.to_string(),
                    signal: signal.and_then(|s| s.trim().parse().ok()),
                }),
                _ => None,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use voltdock_common::exec::{ExecError, ExecResult};

    /// Answers from a canned table keyed by rendered command; anything not
    /// scripted behaves like a missing binary.
    struct ScriptedRunner {
        responses: HashMap<String, (ExecStatus, String)>,
    }

    impl ScriptedRunner {
        fn new() -> Self {
            Self {
                responses: HashMap::new(),
            }
        }

        fn with(mut self, command: &str, status: ExecStatus, stdout: &str) -> Self {
            self.responses
                .insert(command.to_string(), (status, stdout.to_string()));
            self
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, program: &str, args: &[&str]) -> ExecResult {
            let command = if args.is_empty() {
                program.to_string()
            } else {
                format!("{} {}", program, args.join(" "))
            };
            let (status, stdout) = self
                .responses
                .get(&command)
                .cloned()
                .unwrap_or((ExecStatus::CommandNotFound, String::new()));
            ExecResult {
                command,
                exit_code: match status {
                    ExecStatus::Success => Some(0),
                    ExecStatus::NonZeroExit => Some(1),
                    _ => None,
                },
                stdout,
                stdout_truncated: false,
                stderr: String::new(),
                stderr_truncated: false,
                duration_ms: 1,
                status,
            }
        }

        fn spawn_detached(&self, _program: &str, _args: &[&str]) -> Result<(), ExecError> {
            Ok(())
        }
    }

    fn preflight(runner: ScriptedRunner) -> Preflight {
        Preflight::new(Arc::new(runner), "wlan0")
    }

    const SERVICE: &str = "systemctl is-active NetworkManager.service";
    const GENERAL: &str = "nmcli -t -f STATE general";
    const DEVICE: &str = "nmcli -t -f GENERAL.STATE device show wlan0";
    const ROUTE: &str = "ip route";

    #[test]
    fn test_all_layers_green() {
        let runner = ScriptedRunner::new()
            .with(SERVICE, ExecStatus::Success, "active\n")
            .with(GENERAL, ExecStatus::Success, "connected\n")
            .with(DEVICE, ExecStatus::Success, "GENERAL.STATE:100 (connected)\n");
        let verdict = preflight(runner).check();
        assert!(verdict.reachable);
        assert_eq!(verdict.evidence, Some(Evidence::ServiceCheck));
    }

    #[test]
    fn test_inactive_service_short_circuits() {
        let runner = ScriptedRunner::new().with(SERVICE, ExecStatus::NonZeroExit, "inactive\n");
        let verdict = preflight(runner).check();
        assert!(!verdict.reachable);
        assert_eq!(verdict.evidence, None);
    }

    #[test]
    fn test_disconnected_general_state_rejected() {
        let runner = ScriptedRunner::new()
            .with(SERVICE, ExecStatus::Success, "active\n")
            .with(GENERAL, ExecStatus::Success, "disconnected\n");
        assert!(!preflight(runner).check().reachable);
    }

    #[test]
    fn test_site_only_general_state_accepted() {
        let runner = ScriptedRunner::new()
            .with(SERVICE, ExecStatus::Success, "active\n")
            .with(GENERAL, ExecStatus::Success, "connected (site only)\n")
            .with(DEVICE, ExecStatus::Success, "GENERAL.STATE:100 (connected)\n");
        assert!(preflight(runner).check().reachable);
    }

    #[test]
    fn test_disconnected_device_rejected() {
        let runner = ScriptedRunner::new()
            .with(SERVICE, ExecStatus::Success, "active\n")
            .with(GENERAL, ExecStatus::Success, "connected\n")
            .with(DEVICE, ExecStatus::Success, "GENERAL.STATE:30 (disconnected)\n");
        assert!(!preflight(runner).check().reachable);
    }

    #[test]
    fn test_device_probe_failure_does_not_fall_back() {
        // The tool ran and rejected; that is an answer, not an outage.
        let runner = ScriptedRunner::new()
            .with(SERVICE, ExecStatus::Success, "active\n")
            .with(GENERAL, ExecStatus::Success, "connected\n")
            .with(DEVICE, ExecStatus::NonZeroExit, "")
            .with(ROUTE, ExecStatus::Success, "default via 192.168.1.1 dev wlan0\n");
        assert!(!preflight(runner).check().reachable);
    }

    #[test]
    fn test_missing_probe_falls_back_to_route() {
        let runner = ScriptedRunner::new()
            .with(SERVICE, ExecStatus::Success, "active\n")
            .with(GENERAL, ExecStatus::Success, "connected\n")
            .with(ROUTE, ExecStatus::Success, "default via 192.168.1.1 dev wlan0\n");
        let verdict = preflight(runner).check();
        assert!(verdict.reachable);
        assert_eq!(verdict.evidence, Some(Evidence::RouteCheck));
    }

    #[test]
    fn test_fallback_without_default_route_rejected() {
        let runner = ScriptedRunner::new()
            .with(SERVICE, ExecStatus::Success, "active\n")
            .with(GENERAL, ExecStatus::Success, "connected\n")
            .with(ROUTE, ExecStatus::Success, "192.168.1.0/24 dev wlan0 proto kernel\n");
        assert!(!preflight(runner).check().reachable);
    }

    #[test]
    fn test_active_link_parsing() {
        let scan = "nmcli -t -f ACTIVE,SSID,SIGNAL dev wifi";
        let runner = ScriptedRunner::new().with(
            scan,
            ExecStatus::Success,
            "no:Neighbors:42\nyes:DockNet:87\nno:Guest:12\n",
        );
        let link = preflight(runner).active_link();
        assert_eq!(
            link,
            Some(WifiLink {
                ssid: "DockNet".to_string(),
                signal: Some(87),
            })
        );
    }

    #[test]
    fn test_active_link_none_when_not_associated() {
        let scan = "nmcli -t -f ACTIVE,SSID,SIGNAL dev wifi";
        let runner = ScriptedRunner::new().with(scan, ExecStatus::Success, "no:Guest:12\n");
        assert_eq!(preflight(runner).active_link(), None);
    }
}

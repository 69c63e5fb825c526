//! OTA update orchestration.
//!
//! One session at a time walks Idle -> Checking -> Available ->
//! AwaitingConfirmation -> Installing and back, with every failure mapped
//! to a distinct operator-facing message. The release check is the only
//! network operation in the daemon; it runs the reachability preflight
//! first and carries its own timeout so a stalled endpoint cannot starve
//! the scheduler.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use voltdock_common::config::{UpdateMode, UpdateSettings};
use voltdock_common::exec::CommandRunner;
use voltdock_common::version::{is_newer, normalize, CURRENT_VERSION};

use crate::preflight::{Evidence, Preflight};
use crate::sink::{DisplaySink, Severity};
use crate::source::{load_json, LoadError};

/// Latest-release manifest, as much of it as we use.
#[derive(Debug, Deserialize)]
struct ReleaseManifest {
    tag_name: String,
}

/// Where the update session currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdatePhase {
    Idle,
    Checking,
    Available(String),
    AwaitingConfirmation(String),
    Installing(String),
    Failed(String),
}

impl UpdatePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdatePhase::Idle => "idle",
            UpdatePhase::Checking => "checking",
            UpdatePhase::Available(_) => "available",
            UpdatePhase::AwaitingConfirmation(_) => "awaiting_confirmation",
            UpdatePhase::Installing(_) => "installing",
            UpdatePhase::Failed(_) => "failed",
        }
    }
}

/// Handle for one in-flight check; completions must present it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckTicket {
    generation: u64,
}

/// Classified result of one release-manifest fetch. Total: every way the
/// fetch can end maps to exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    UpToDate { latest: String },
    Newer { version: String },
    AuthRejected,
    NoRelease,
    HttpError { code: u16 },
    Transport { detail: String },
    BadManifest { detail: String },
}

pub struct UpdateOrchestrator {
    settings: UpdateSettings,
    phase: UpdatePhase,
    generation: u64,
    client: reqwest::Client,
    preflight: Preflight,
    runner: Arc<dyn CommandRunner>,
    sink: Arc<dyn DisplaySink>,
}

impl UpdateOrchestrator {
    pub fn new(
        settings: UpdateSettings,
        preflight: Preflight,
        runner: Arc<dyn CommandRunner>,
        sink: Arc<dyn DisplaySink>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(format!("voltdockd/{}", CURRENT_VERSION))
            .timeout(Duration::from_secs(settings.effective_http_timeout_secs()))
            .build()
            .unwrap_or_default();
        Self {
            settings,
            phase: UpdatePhase::Idle,
            generation: 0,
            client,
            preflight,
            runner,
            sink,
        }
    }

    pub fn phase(&self) -> &UpdatePhase {
        &self.phase
    }

    /// Open a check session if the current phase allows one. Returns the
    /// ticket a completion must present, or None when nothing was started.
    pub fn begin_check(&mut self) -> Option<CheckTicket> {
        if !self.settings.enabled {
            debug!("update check requested but updates are disabled");
            return None;
        }

        match &self.phase {
            UpdatePhase::Checking => {
                debug!("update check already running, ignoring");
                return None;
            }
            UpdatePhase::Installing(_) => {
                debug!("installer already launched, ignoring check request");
                return None;
            }
            UpdatePhase::AwaitingConfirmation(version) => {
                // A pending version is never silently replaced; dismiss it
                // first if a fresh check is wanted.
                self.sink.status(
                    &format!("update v{} still awaiting confirmation", version),
                    Severity::Warning,
                );
                return None;
            }
            UpdatePhase::Idle | UpdatePhase::Available(_) | UpdatePhase::Failed(_) => {}
        }

        let verdict = self.preflight.check();
        if !verdict.reachable {
            info!("update check skipped: no network connection");
            self.sink.status("no network connection", Severity::Warning);
            self.phase = UpdatePhase::Idle;
            return None;
        }
        if verdict.evidence == Some(Evidence::RouteCheck) {
            debug!("proceeding on default-route evidence only");
        }

        self.generation += 1;
        self.phase = UpdatePhase::Checking;
        self.sink.status("checking for updates...", Severity::Info);
        Some(CheckTicket {
            generation: self.generation,
        })
    }

    /// Fetch the latest-release manifest and classify the result. Never
    /// touches the session; the caller applies the outcome via
    /// [`complete_check`](Self::complete_check).
    pub async fn fetch_outcome(&self) -> CheckOutcome {
        let token = load_token(
            Path::new(&self.settings.token_path),
            self.settings.token_max_bytes,
        );

        let url = format!(
            "https://api.github.com/repos/{}/{}/releases/latest",
            self.settings.repo_owner, self.settings.repo_name
        );
        debug!("fetching release manifest from {}", url);

        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github.v3+json");
        if let Some(token) = token {
            request = request.header("Authorization", format!("token {}", token));
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let detail = if e.is_timeout() {
                    "request timed out".to_string()
                } else if e.is_connect() {
                    format!("connection failed: {}", e)
                } else {
                    e.to_string()
                };
                return CheckOutcome::Transport { detail };
            }
        };

        let status = response.status().as_u16();
        if status == 200 {
            match response.json::<ReleaseManifest>().await {
                Ok(manifest) => classify_tag(CURRENT_VERSION, &manifest.tag_name),
                Err(e) => CheckOutcome::BadManifest {
                    detail: e.to_string(),
                },
            }
        } else {
            classify_status(status)
        }
    }

    /// Apply a fetch outcome, unless the session moved on while the request
    /// was in flight.
    pub fn complete_check(&mut self, ticket: CheckTicket, outcome: CheckOutcome) {
        if self.phase != UpdatePhase::Checking || ticket.generation != self.generation {
            debug!(
                "dropping stale update check result (session now {})",
                self.phase.as_str()
            );
            return;
        }

        match outcome {
            CheckOutcome::Newer { version } => {
                info!("update available: v{} (running v{})", version, CURRENT_VERSION);
                self.phase = UpdatePhase::Available(version);
            }
            CheckOutcome::UpToDate { latest } => {
                debug!("already up to date (latest {})", latest);
                self.sink.status("already up to date", Severity::Success);
                self.phase = UpdatePhase::Idle;
            }
            CheckOutcome::AuthRejected => {
                self.fail("update auth failed, check token");
            }
            CheckOutcome::NoRelease => {
                self.fail("no releases found (private repo without token?)");
            }
            CheckOutcome::HttpError { code } => {
                self.fail(&format!("release API error (HTTP {})", code));
            }
            CheckOutcome::Transport { detail } => {
                self.fail(&format!("update check failed: {}", detail));
            }
            CheckOutcome::BadManifest { detail } => {
                self.fail(&format!("release manifest unreadable: {}", detail));
            }
        }
    }

    /// Surface an Available version to the operator for confirmation.
    pub fn present_available(&mut self) {
        if let UpdatePhase::Available(version) = self.phase.clone() {
            self.sink
                .status(&format!("update v{} available", version), Severity::Info);
            self.phase = UpdatePhase::AwaitingConfirmation(version);
        }
    }

    /// Operator accepted the pending version: hand off to the installer.
    pub fn confirm(&mut self) {
        let version = match &self.phase {
            UpdatePhase::AwaitingConfirmation(version) => version.clone(),
            _ => {
                debug!("confirm with nothing awaiting confirmation, ignoring");
                return;
            }
        };

        self.phase = UpdatePhase::Installing(version.clone());
        info!("launching installer for v{}", version);

        let spawn = self.runner.spawn_detached(
            &self.settings.installer,
            &[&self.settings.repo_owner, &self.settings.repo_name, &version],
        );
        match spawn {
            Ok(()) => {
                // Fire and forget: the installer owns the rest of the update.
                self.sink.status("update started", Severity::Success);
                self.phase = UpdatePhase::Idle;
            }
            Err(e) => {
                warn!("installer spawn failed: {}", e);
                self.sink
                    .status("failed to launch installer", Severity::Error);
                self.phase = UpdatePhase::Failed(format!("installer spawn failed: {}", e));
            }
        }
    }

    /// Operator declined the pending version.
    pub fn dismiss(&mut self) {
        if matches!(self.phase, UpdatePhase::AwaitingConfirmation(_)) {
            self.sink.status("update dismissed", Severity::Info);
            self.phase = UpdatePhase::Idle;
        }
    }

    /// Advisory cancel of an in-flight check. The network call may still
    /// complete; its result is dropped by the ticket guard.
    pub fn cancel_check(&mut self) {
        if self.phase == UpdatePhase::Checking {
            self.generation += 1;
            self.phase = UpdatePhase::Idle;
        }
    }

    /// Full check flow: begin, fetch, apply, and in auto mode confirm.
    pub async fn run_check(&mut self) {
        let Some(ticket) = self.begin_check() else {
            return;
        };
        let outcome = self.fetch_outcome().await;
        self.complete_check(ticket, outcome);
        self.present_available();
        if self.settings.mode == UpdateMode::Auto {
            self.confirm();
        }
    }

    fn fail(&mut self, message: &str) {
        warn!("{}", message);
        self.sink.status(message, Severity::Error);
        self.phase = UpdatePhase::Failed(message.to_string());
    }
}

/// Map a 200 body's tag against the running version.
pub fn classify_tag(current: &str, tag_name: &str) -> CheckOutcome {
    let latest = normalize(tag_name).to_string();
    if latest.is_empty() {
        return CheckOutcome::BadManifest {
            detail: "empty tag_name".to_string(),
        };
    }
    if is_newer(current, &latest) {
        CheckOutcome::Newer { version: latest }
    } else {
        CheckOutcome::UpToDate { latest }
    }
}

/// Map a non-200 status. 401 and 404 get their own outcomes so the operator
/// message can say credentials vs configuration instead of "network error".
pub fn classify_status(status: u16) -> CheckOutcome {
    match status {
        401 => CheckOutcome::AuthRejected,
        404 => CheckOutcome::NoRelease,
        code => CheckOutcome::HttpError { code },
    }
}

/// Read the optional bearer token. Every failure is a quiet None; an
/// unusable token file must never block the check itself.
fn load_token(path: &Path, max_bytes: u64) -> Option<String> {
    let doc = match load_json(path, 1, max_bytes) {
        Ok(doc) => doc,
        Err(LoadError::NotFound) => return None,
        Err(e) => {
            debug!("update token unusable: {}", e);
            return None;
        }
    };
    let token = doc.get("github_token")?.as_str()?.trim().to_string();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

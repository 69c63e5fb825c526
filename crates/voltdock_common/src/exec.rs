//! External command execution layer.
//!
//! Every place the daemon touches an OS tool (network probes, installer
//! launch, power actions) goes through [`CommandRunner`], so tests can swap
//! in a scripted runner and walk the full decision tree without a live
//! system.

use std::process::{Command, Stdio};
use std::time::Instant;

use thiserror::Error;

/// Cap on captured stdout/stderr, per stream.
pub const MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// How a command invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    /// Exit code 0.
    Success,
    /// Ran to completion with a non-zero exit code.
    NonZeroExit,
    /// The binary was not found on PATH.
    CommandNotFound,
    /// The OS refused to run it.
    PermissionDenied,
    /// Any other OS-level launch failure.
    OsError,
}

impl ExecStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecStatus::Success => "success",
            ExecStatus::NonZeroExit => "non_zero_exit",
            ExecStatus::CommandNotFound => "command_not_found",
            ExecStatus::PermissionDenied => "permission_denied",
            ExecStatus::OsError => "os_error",
        }
    }
}

/// Captured outcome of one command run.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Command as rendered for logs, e.g. "nmcli -t -f STATE general".
    pub command: String,
    /// Exit code, if the process actually ran.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stdout_truncated: bool,
    pub stderr: String,
    pub stderr_truncated: bool,
    pub duration_ms: u64,
    pub status: ExecStatus,
}

impl ExecResult {
    pub fn ok(&self) -> bool {
        self.status == ExecStatus::Success
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// The one seam between the daemon and external processes.
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture output. Duration is bounded by the
    /// invoked tool's own timeouts; this layer does not impose one.
    fn run(&self, program: &str, args: &[&str]) -> ExecResult;

    /// Fire and forget. Ok means the process launched, nothing more.
    fn spawn_detached(&self, program: &str, args: &[&str]) -> Result<(), ExecError>;
}

/// Real runner over std::process.
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> ExecResult {
        let command = render_command(program, args);
        let started = Instant::now();

        match Command::new(program).args(args).output() {
            Ok(output) => {
                let (stdout, stdout_truncated) = truncate_output(&output.stdout);
                let (stderr, stderr_truncated) = truncate_output(&output.stderr);
                let status = if output.status.success() {
                    ExecStatus::Success
                } else {
                    ExecStatus::NonZeroExit
                };
                ExecResult {
                    command,
                    exit_code: output.status.code(),
                    stdout,
                    stdout_truncated,
                    stderr,
                    stderr_truncated,
                    duration_ms: started.elapsed().as_millis() as u64,
                    status,
                }
            }
            Err(e) => {
                let status = match e.kind() {
                    std::io::ErrorKind::NotFound => ExecStatus::CommandNotFound,
                    std::io::ErrorKind::PermissionDenied => ExecStatus::PermissionDenied,
                    _ => ExecStatus::OsError,
                };
                ExecResult {
                    command,
                    exit_code: None,
                    stdout: String::new(),
                    stdout_truncated: false,
                    stderr: e.to_string(),
                    stderr_truncated: false,
                    duration_ms: started.elapsed().as_millis() as u64,
                    status,
                }
            }
        }
    }

    fn spawn_detached(&self, program: &str, args: &[&str]) -> Result<(), ExecError> {
        // The child owns its lifecycle from here; nobody waits on it.
        let _child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: program.to_string(),
                source,
            })?;
        Ok(())
    }
}

fn render_command(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

fn truncate_output(bytes: &[u8]) -> (String, bool) {
    let text = String::from_utf8_lossy(bytes);
    if text.len() > MAX_OUTPUT_BYTES {
        let mut end = MAX_OUTPUT_BYTES;
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        (text[..end].to_string(), true)
    } else {
        (text.into_owned(), false)
    }
}

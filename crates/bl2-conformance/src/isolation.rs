//! Parent side of process isolation: spawn one child per combination, capture
//! its output through capped reader threads, and wait with a bounded timeout.

use crate::child::{CHILD_EXIT_ASSERTION, CHILD_EXIT_PASSED, ChildRequest};
use crate::report::{CaseRunner, TestOutcome};
use crate::{DEFAULT_CHILD_TIMEOUT_MS, LIBRARY_ENV};
use bl2_dtype::NumericKind;
use bl2_ffi::Operation;
use bl2_runtime::ConcurrencyMode;
use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

pub const MAX_CAPTURE_BYTES: usize = 64 * 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildCommand {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl ChildCommand {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    #[must_use]
    pub fn arg_list(&self) -> &[OsString] {
        &self.args
    }

    /// Shell-like rendering for diagnostics.
    #[must_use]
    pub fn display(&self) -> String {
        let mut out = self.program.display().to_string();
        for arg in &self.args {
            out.push(' ');
            out.push_str(&arg.to_string_lossy());
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsolationPolicy {
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub max_capture_bytes: usize,
}

impl Default for IsolationPolicy {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_millis(DEFAULT_CHILD_TIMEOUT_MS)),
            max_capture_bytes: MAX_CAPTURE_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    Exited(i32),
    /// Terminated by a signal; the number is unavailable on some platforms.
    Signaled(Option<i32>),
    /// Killed by the parent after the timeout elapsed.
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildReport {
    pub status: ChildStatus,
    pub stdout: String,
    pub stderr: String,
    pub stderr_truncated: bool,
    pub elapsed: Duration,
}

struct CappedCapture {
    bytes: Vec<u8>,
    total_bytes: usize,
}

/// Keeps at most `max_bytes` but drains the stream to EOF so the child never
/// blocks on a full pipe.
fn read_stream_capped<R: Read>(
    mut reader: R,
    max_bytes: usize,
    stream_label: &str,
) -> Result<CappedCapture, String> {
    let mut bytes = Vec::with_capacity(max_bytes.min(8192));
    let mut total_bytes = 0usize;
    let mut chunk = [0_u8; 8192];
    loop {
        let read_len = reader
            .read(&mut chunk)
            .map_err(|err| format!("child {stream_label} read failed: {err}"))?;
        if read_len == 0 {
            break;
        }
        total_bytes = total_bytes.saturating_add(read_len);
        if bytes.len() < max_bytes {
            let copy_len = read_len.min(max_bytes - bytes.len());
            bytes.extend_from_slice(&chunk[..copy_len]);
        }
    }
    Ok(CappedCapture { bytes, total_bytes })
}

fn terminate_and_reap_child(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// `Ok(None)` means the child was killed after `timeout`.
fn wait_bounded(child: &mut Child, timeout: Option<Duration>) -> Result<Option<ExitStatus>, String> {
    let started_at = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) => {}
            Err(err) => {
                terminate_and_reap_child(child);
                return Err(format!("child wait failed: {err}"));
            }
        }
        if timeout.is_some_and(|limit| started_at.elapsed() > limit) {
            terminate_and_reap_child(child);
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn exit_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: ExitStatus) -> Option<i32> {
    None
}

fn decode_status(status: ExitStatus) -> ChildStatus {
    match status.code() {
        Some(code) => ChildStatus::Exited(code),
        None => ChildStatus::Signaled(exit_signal(status)),
    }
}

/// Runs `command` to completion, or until `policy.timeout` elapses, in which
/// case the child is killed and reaped. Errors are reserved for failures to
/// launch or observe the child; any way the child itself ends is a report.
pub fn run_isolated(command: &ChildCommand, policy: &IsolationPolicy) -> Result<ChildReport, String> {
    let started_at = Instant::now();
    let mut child = Command::new(&command.program)
        .args(&command.args)
        .envs(command.envs.iter().map(|(k, v)| (k, v)))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| format!("failed to spawn {}: {err}", command.display()))?;

    let Some(stdout) = child.stdout.take() else {
        terminate_and_reap_child(&mut child);
        return Err("child stdout stream unavailable".to_string());
    };
    let Some(stderr) = child.stderr.take() else {
        terminate_and_reap_child(&mut child);
        return Err("child stderr stream unavailable".to_string());
    };

    let cap = policy.max_capture_bytes;
    let stdout_reader = thread::spawn(move || read_stream_capped(stdout, cap, "stdout"));
    let stderr_reader = thread::spawn(move || read_stream_capped(stderr, cap, "stderr"));

    let wait_result = wait_bounded(&mut child, policy.timeout);
    let stdout_capture = stdout_reader
        .join()
        .map_err(|_| "child stdout reader thread panicked".to_string())??;
    let stderr_capture = stderr_reader
        .join()
        .map_err(|_| "child stderr reader thread panicked".to_string())??;
    let status = match wait_result? {
        Some(status) => decode_status(status),
        None => ChildStatus::TimedOut,
    };

    Ok(ChildReport {
        status,
        stdout: String::from_utf8_lossy(&stdout_capture.bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_capture.bytes).into_owned(),
        stderr_truncated: stderr_capture.total_bytes > stderr_capture.bytes.len(),
        elapsed: started_at.elapsed(),
    })
}

#[must_use]
pub fn signal_name(signal: i32) -> Option<&'static str> {
    match signal {
        4 => Some("SIGILL"),
        6 => Some("SIGABRT"),
        7 => Some("SIGBUS"),
        8 => Some("SIGFPE"),
        9 => Some("SIGKILL"),
        11 => Some("SIGSEGV"),
        15 => Some("SIGTERM"),
        _ => None,
    }
}

fn diagnostic_text(report: &ChildReport) -> String {
    let mut text = report.stderr.trim_end().to_string();
    if report.stderr_truncated {
        text.push_str("\n[stderr truncated]");
    }
    text
}

/// Maps a finished child onto the outcome taxonomy: exit 0 passes, exit 1 is
/// an assertion failure, and every other ending is abnormal.
#[must_use]
pub fn classify(report: &ChildReport) -> TestOutcome {
    let diagnostic = diagnostic_text(report);
    match report.status {
        ChildStatus::Exited(CHILD_EXIT_PASSED) => TestOutcome::Passed,
        ChildStatus::Exited(CHILD_EXIT_ASSERTION) => TestOutcome::FailedAssertion { diagnostic },
        ChildStatus::Exited(code) => TestOutcome::Crashed {
            exit_code: Some(code),
            signal: None,
            diagnostic,
        },
        ChildStatus::Signaled(signal) => TestOutcome::Crashed {
            exit_code: None,
            signal,
            diagnostic,
        },
        ChildStatus::TimedOut => TestOutcome::TimedOut {
            after_ms: u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            diagnostic,
        },
    }
}

/// Runs every combination in a fresh copy of `program`, which must accept the
/// `child` subcommand.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: PathBuf,
    library_path: PathBuf,
    policy: IsolationPolicy,
}

impl ProcessRunner {
    #[must_use]
    pub fn new(program: PathBuf, library_path: PathBuf, policy: IsolationPolicy) -> Self {
        Self {
            program,
            library_path,
            policy,
        }
    }

    /// A runner that re-executes the current binary.
    pub fn current_exe(library_path: PathBuf, policy: IsolationPolicy) -> Result<Self, String> {
        let program = std::env::current_exe()
            .map_err(|err| format!("failed resolving current executable: {err}"))?;
        Ok(Self::new(program, library_path, policy))
    }

    #[must_use]
    pub fn child_command(&self, request: &ChildRequest) -> ChildCommand {
        ChildCommand::new(&self.program)
            .args(request.to_args())
            .env(LIBRARY_ENV, &self.library_path)
    }
}

impl CaseRunner for ProcessRunner {
    fn run_case(
        &self,
        kind: NumericKind,
        operation: Operation,
        mode: ConcurrencyMode,
    ) -> TestOutcome {
        let request = ChildRequest {
            kind,
            operation,
            mode,
        };
        let command = self.child_command(&request);
        match run_isolated(&command, &self.policy) {
            Ok(report) => classify(&report),
            Err(message) => TestOutcome::LaunchFailed { message },
        }
    }
}

//! Drives every (kind, operation, mode) combination through a [`CaseRunner`]
//! and renders one labeled line per combination.

use crate::isolation::signal_name;
use crate::{HarnessConfig, OutcomeLog, OutcomeLogEntry, now_unix_ms};
use bl2_dtype::NumericKind;
use bl2_ffi::Operation;
use bl2_runtime::{ConcurrencyMode, DEFAULT_REPEATS_PER_WORKER};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

pub const REPORT_SCHEMA_VERSION: u32 = 1;

const RED: &str = "\x1b[0;31m";
const GREEN: &str = "\x1b[0;32m";
const YELLOW: &str = "\x1b[1;33m";
const CYAN: &str = "\x1b[0;36m";
const NC: &str = "\x1b[0m";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Skipped {
        reason: String,
    },
    /// The child ran the check and the numbers were wrong.
    FailedAssertion {
        diagnostic: String,
    },
    /// Any other exit code, or death by signal.
    Crashed {
        exit_code: Option<i32>,
        signal: Option<i32>,
        diagnostic: String,
    },
    TimedOut {
        after_ms: u64,
        diagnostic: String,
    },
    LaunchFailed {
        message: String,
    },
}

impl TestOutcome {
    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Skipped { .. } => "skipped",
            Self::FailedAssertion { .. } => "failed_assertion",
            Self::Crashed { .. } => "crashed",
            Self::TimedOut { .. } => "timed_out",
            Self::LaunchFailed { .. } => "launch_failed",
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Passed | Self::Skipped { .. })
    }

    #[must_use]
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::Passed => None,
            Self::Skipped { reason } => Some(reason.as_str()),
            Self::FailedAssertion { diagnostic }
            | Self::Crashed { diagnostic, .. }
            | Self::TimedOut { diagnostic, .. } => Some(diagnostic.as_str()),
            Self::LaunchFailed { message } => Some(message.as_str()),
        }
    }
}

/// Executes one combination and reports how it ended.
pub trait CaseRunner {
    fn run_case(
        &self,
        kind: NumericKind,
        operation: Operation,
        mode: ConcurrencyMode,
    ) -> TestOutcome;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseRecord {
    pub kind: NumericKind,
    pub operation: Operation,
    pub mode: ConcurrencyMode,
    pub outcome: TestOutcome,
    pub duration: Duration,
}

impl CaseRecord {
    #[must_use]
    pub fn label(&self) -> String {
        self.operation.label(self.kind)
    }

    /// `One Thread Test: dgemv` or `Multithread Test: dgemv [8T]`.
    #[must_use]
    pub fn headline(&self) -> String {
        match self.mode {
            ConcurrencyMode::Single => format!("One Thread Test: {}", self.label()),
            ConcurrencyMode::Multi { workers, .. } => {
                format!("Multithread Test: {} [{workers}T]", self.label())
            }
        }
    }
}

/// Why `operation` is not run for `kind`, if it is not.
#[must_use]
pub fn skip_reason(kind: NumericKind, operation: Operation) -> Option<String> {
    (!operation.applies_to(kind)).then(|| {
        format!(
            "{operation} has no {} variant (complex rank-1 updates use geru/gerc)",
            kind.name()
        )
    })
}

/// Runs the single-thread case and then the `workers`-thread case. Skipped
/// combinations produce both records without touching the runner.
pub fn run_test_pair<R: CaseRunner + ?Sized>(
    runner: &R,
    kind: NumericKind,
    operation: Operation,
    workers: usize,
) -> [CaseRecord; 2] {
    [ConcurrencyMode::Single, ConcurrencyMode::multi(workers)].map(|mode| {
        let started_at = Instant::now();
        let outcome = match skip_reason(kind, operation) {
            Some(reason) => TestOutcome::Skipped { reason },
            None => runner.run_case(kind, operation, mode),
        };
        CaseRecord {
            kind,
            operation,
            mode,
            outcome,
            duration: started_at.elapsed(),
        }
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConformanceRun {
    pub records: Vec<CaseRecord>,
    /// Outcome log appends that failed; the matrix carries on regardless.
    pub log_errors: Vec<String>,
}

impl ConformanceRun {
    #[must_use]
    pub fn totals(&self) -> RunTotals {
        let mut totals = RunTotals {
            total: self.records.len(),
            ..RunTotals::default()
        };
        for record in &self.records {
            match record.outcome {
                TestOutcome::Passed => totals.passed += 1,
                TestOutcome::Skipped { .. } => totals.skipped += 1,
                _ => totals.failed += 1,
            }
        }
        totals
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.records.iter().any(|record| record.outcome.is_failure())
    }

    /// 1 when anything failed unless `allow_failures` is set.
    #[must_use]
    pub fn exit_code(&self, allow_failures: bool) -> i32 {
        i32::from(self.has_failures() && !allow_failures)
    }
}

fn paint(text: &str, color: &str, enabled: bool) -> String {
    if enabled {
        format!("{color}{text}{NC}")
    } else {
        text.to_string()
    }
}

fn failure_status(outcome: &TestOutcome) -> String {
    match outcome {
        TestOutcome::Crashed {
            signal: Some(signal),
            ..
        } => match signal_name(*signal) {
            Some(name) => format!("CRASHED (signal {signal}, {name})"),
            None => format!("CRASHED (signal {signal})"),
        },
        TestOutcome::Crashed {
            exit_code: Some(code),
            ..
        } => format!("CRASHED (exit code {code})"),
        TestOutcome::Crashed { .. } => "CRASHED".to_string(),
        TestOutcome::TimedOut { after_ms, .. } => format!("TIMED OUT (after {after_ms} ms)"),
        TestOutcome::LaunchFailed { .. } => "FAILED TO LAUNCH".to_string(),
        _ => "FAILED".to_string(),
    }
}

/// The record's line plus, for failures, the captured diagnostic beneath it.
#[must_use]
pub fn render_record(record: &CaseRecord, color: bool) -> String {
    let headline = record.headline();
    match &record.outcome {
        TestOutcome::Passed => {
            let tint = if record.mode.is_multi() { YELLOW } else { GREEN };
            paint(&format!("{headline} PASSED"), tint, color)
        }
        TestOutcome::Skipped { reason } => {
            paint(&format!("{headline} SKIPPED ({reason})"), CYAN, color)
        }
        failed => {
            let mut text = paint(
                &format!("{headline} {}", failure_status(failed)),
                RED,
                color,
            );
            if let Some(diagnostic) = failed.diagnostic().filter(|d| !d.trim().is_empty()) {
                text.push('\n');
                text.push_str(diagnostic.trim_end());
            }
            text
        }
    }
}

#[must_use]
pub fn render_header(kind: NumericKind) -> String {
    format!(
        "\n=== PREFIX {} ===",
        kind.prefix().to_ascii_uppercase()
    )
}

#[must_use]
pub fn render_summary(totals: &RunTotals) -> String {
    format!(
        "\nSummary: {} cases, {} passed, {} failed, {} skipped",
        totals.total, totals.passed, totals.failed, totals.skipped
    )
}

/// Iterates the configured kinds and operations in report order, printing
/// each record to `out` as soon as it finishes and appending it to `log`.
/// Every combination is attempted regardless of earlier results; a failed log
/// append is collected in [`ConformanceRun::log_errors`].
pub fn run_all<R: CaseRunner + ?Sized>(
    config: &HarnessConfig,
    runner: &R,
    mut log: Option<&mut OutcomeLog>,
    out: &mut dyn Write,
) -> Result<ConformanceRun, String> {
    let mut run = ConformanceRun::default();
    for &kind in &config.kinds {
        writeln!(out, "{}", render_header(kind))
            .map_err(|err| format!("failed writing report: {err}"))?;
        for &operation in &config.operations {
            for record in run_test_pair(runner, kind, operation, config.workers) {
                writeln!(out, "{}", render_record(&record, config.color))
                    .map_err(|err| format!("failed writing report: {err}"))?;
                if let Some(log) = log.as_deref_mut() {
                    let entry = OutcomeLogEntry {
                        ts_millis: now_unix_ms(),
                        case: CaseArtifact::from(&record),
                    };
                    if let Err(err) = log.append(&entry) {
                        run.log_errors.push(err);
                    }
                }
                run.records.push(record);
            }
        }
    }
    writeln!(out, "{}", render_summary(&run.totals()))
        .map_err(|err| format!("failed writing report: {err}"))?;
    out.flush()
        .map_err(|err| format!("failed flushing report: {err}"))?;
    Ok(run)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseArtifact {
    pub label: String,
    pub kind: String,
    pub operation: String,
    /// Absent for combinations that were skipped.
    pub symbol: Option<String>,
    pub mode: String,
    pub workers: usize,
    pub status: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub duration_ms: u64,
    pub diagnostic: Option<String>,
}

impl From<&CaseRecord> for CaseArtifact {
    fn from(record: &CaseRecord) -> Self {
        let (exit_code, signal) = match &record.outcome {
            TestOutcome::Crashed {
                exit_code, signal, ..
            } => (*exit_code, *signal),
            TestOutcome::FailedAssertion { .. } => (Some(1), None),
            TestOutcome::Passed => (Some(0), None),
            _ => (None, None),
        };
        Self {
            label: record.label(),
            kind: record.kind.name().to_string(),
            operation: record.operation.test_name().to_string(),
            symbol: record
                .operation
                .applies_to(record.kind)
                .then(|| record.operation.symbol(record.kind)),
            mode: record.mode.wire_token().to_string(),
            workers: record.mode.workers(),
            status: record.outcome.status().to_string(),
            exit_code,
            signal,
            duration_ms: u64::try_from(record.duration.as_millis()).unwrap_or(u64::MAX),
            diagnostic: record.outcome.diagnostic().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConformanceReportArtifact {
    pub schema_version: u32,
    pub generated_at_unix_ms: u128,
    pub library_path: String,
    pub library_sha256: String,
    pub workers: usize,
    pub repeats_per_worker: usize,
    pub child_timeout_ms: Option<u64>,
    pub totals: RunTotals,
    pub cases: Vec<CaseArtifact>,
}

#[must_use]
pub fn build_report_artifact(
    config: &HarnessConfig,
    library_path: &Path,
    library_sha256: &str,
    run: &ConformanceRun,
) -> ConformanceReportArtifact {
    ConformanceReportArtifact {
        schema_version: REPORT_SCHEMA_VERSION,
        generated_at_unix_ms: now_unix_ms(),
        library_path: library_path.display().to_string(),
        library_sha256: library_sha256.to_string(),
        workers: config.workers,
        repeats_per_worker: DEFAULT_REPEATS_PER_WORKER,
        child_timeout_ms: config
            .child_timeout
            .map(|timeout| u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)),
        totals: run.totals(),
        cases: run.records.iter().map(CaseArtifact::from).collect(),
    }
}

pub fn write_conformance_report(
    path: &Path,
    report: &ConformanceReportArtifact,
) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| format!("failed creating {}: {err}", parent.display()))?;
    }

    let raw = serde_json::to_string_pretty(report)
        .map_err(|err| format!("failed to serialize conformance report: {err}"))?;
    fs::write(path, raw).map_err(|err| format!("failed writing {}: {err}", path.display()))
}

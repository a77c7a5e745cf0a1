#![forbid(unsafe_code)]

pub mod child;
pub mod fixtures;
pub mod isolation;
pub mod operations;
pub mod report;

use bl2_dtype::NumericKind;
use bl2_ffi::Operation;
use bl2_runtime::DEFAULT_WORKERS;
use isolation::{IsolationPolicy, MAX_CAPTURE_BYTES};
use report::CaseArtifact;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const LIBRARY_ENV: &str = "BL2_BLAS_LIBRARY";
pub const CHILD_TIMEOUT_ENV: &str = "BL2_CHILD_TIMEOUT_MS";
pub const OUTCOME_LOG_ENV: &str = "BL2_OUTCOME_LOG_PATH";
pub const NO_COLOR_ENV: &str = "NO_COLOR";
pub const DEFAULT_CHILD_TIMEOUT_MS: u64 = 120_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    pub library_path: Option<PathBuf>,
    pub workers: usize,
    /// `None` disables the bound on each child's run time.
    pub child_timeout: Option<Duration>,
    pub kinds: Vec<NumericKind>,
    pub operations: Vec<Operation>,
    pub report_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    pub color: bool,
    pub allow_failures: bool,
}

impl HarnessConfig {
    /// Full 4 x 6 matrix, 8 workers, two minute child timeout, no library.
    #[must_use]
    pub fn default_settings() -> Self {
        Self {
            library_path: None,
            workers: DEFAULT_WORKERS,
            child_timeout: Some(Duration::from_millis(DEFAULT_CHILD_TIMEOUT_MS)),
            kinds: NumericKind::ALL.to_vec(),
            operations: Operation::ALL.to_vec(),
            report_path: None,
            log_path: None,
            color: true,
            allow_failures: false,
        }
    }

    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    /// Applies `BL2_BLAS_LIBRARY`, `BL2_CHILD_TIMEOUT_MS`, `BL2_OUTCOME_LOG_PATH`
    /// and `NO_COLOR` from `lookup` on top of [`HarnessConfig::default_settings`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let mut config = Self::default_settings();
        if let Some(path) = lookup(LIBRARY_ENV).filter(|value| !value.is_empty()) {
            config.library_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = lookup(CHILD_TIMEOUT_ENV) {
            let raw = raw
                .into_string()
                .map_err(|_| format!("{CHILD_TIMEOUT_ENV} is not valid unicode"))?;
            config.child_timeout = parse_timeout_ms(&raw)?;
        }
        if let Some(path) = lookup(OUTCOME_LOG_ENV).filter(|value| !value.is_empty()) {
            config.log_path = Some(PathBuf::from(path));
        }
        if lookup(NO_COLOR_ENV).is_some_and(|value| !value.is_empty()) {
            config.color = false;
        }
        Ok(config)
    }

    pub fn library(&self) -> Result<&Path, String> {
        self.library_path.as_deref().ok_or_else(|| {
            format!("no BLAS library configured; pass --library <path> or set {LIBRARY_ENV}")
        })
    }

    #[must_use]
    pub fn isolation_policy(&self) -> IsolationPolicy {
        IsolationPolicy {
            timeout: self.child_timeout,
            max_capture_bytes: MAX_CAPTURE_BYTES,
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_settings()
    }
}

/// Milliseconds; `0` disables the timeout.
pub fn parse_timeout_ms(raw: &str) -> Result<Option<Duration>, String> {
    let millis = raw
        .trim()
        .parse::<u64>()
        .map_err(|err| format!("invalid timeout '{raw}': {err}"))?;
    Ok((millis > 0).then(|| Duration::from_millis(millis)))
}

pub fn parse_worker_count(raw: &str) -> Result<usize, String> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err("worker count must be at least 1".to_string()),
        Ok(workers) => Ok(workers),
        Err(err) => Err(format!("invalid worker count '{raw}': {err}")),
    }
}

/// Comma-separated prefixes or kind names, kept in report order.
pub fn parse_kind_list(raw: &str) -> Result<Vec<NumericKind>, String> {
    let mut selected = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let kind = NumericKind::parse(token).ok_or_else(|| format!("unknown type prefix '{token}'"))?;
        selected.push(kind);
    }
    if selected.is_empty() {
        return Err("type prefix list is empty".to_string());
    }
    Ok(NumericKind::ALL
        .into_iter()
        .filter(|kind| selected.contains(kind))
        .collect())
}

/// Comma-separated test names, kept in report order.
pub fn parse_operation_list(raw: &str) -> Result<Vec<Operation>, String> {
    let mut selected = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let operation = Operation::parse(token).ok_or_else(|| format!("unknown test name '{token}'"))?;
        selected.push(operation);
    }
    if selected.is_empty() {
        return Err("test name list is empty".to_string());
    }
    Ok(Operation::ALL
        .into_iter()
        .filter(|operation| selected.contains(operation))
        .collect())
}

pub(crate) fn now_unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(&mut out, "{byte:02x}");
    }
    out
}

/// Fingerprint recorded in the report so results can be tied to the exact
/// library build.
pub fn fingerprint_library(path: &Path) -> Result<String, String> {
    let bytes = fs::read(path).map_err(|err| format!("failed reading {}: {err}", path.display()))?;
    Ok(sha256_hex(&bytes))
}

/// One JSON line per finished combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeLogEntry {
    pub ts_millis: u128,
    #[serde(flatten)]
    pub case: CaseArtifact,
}

/// JSONL sink held open for a whole run.
#[derive(Debug)]
pub struct OutcomeLog {
    path: PathBuf,
    file: File,
}

impl OutcomeLog {
    /// Creates missing parent directories and opens `path` for appending.
    pub fn open(path: &Path) -> Result<Self, String> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|err| format!("failed creating {}: {err}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| format!("failed opening {}: {err}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, entry: &OutcomeLogEntry) -> Result<(), String> {
        let mut line = serde_json::to_string(entry)
            .map_err(|err| format!("failed serializing outcome log entry: {err}"))?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .map_err(|err| format!("failed appending outcome log {}: {err}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CHILD_TIMEOUT_ENV, HarnessConfig, LIBRARY_ENV, NO_COLOR_ENV, OUTCOME_LOG_ENV, OutcomeLog,
        OutcomeLogEntry, now_unix_ms, parse_kind_list, parse_operation_list, parse_timeout_ms,
        parse_worker_count, sha256_hex,
    };
    use crate::report::{CaseArtifact, CaseRecord, TestOutcome};
    use bl2_dtype::NumericKind;
    use bl2_ffi::Operation;
    use bl2_runtime::ConcurrencyMode;
    use std::ffi::OsString;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    fn scratch_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        let dir = std::env::temp_dir().join(format!("bl2_lib_{tag}_{}_{nanos}", std::process::id()));
        fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    fn entry(operation: Operation) -> OutcomeLogEntry {
        OutcomeLogEntry {
            ts_millis: now_unix_ms(),
            case: CaseArtifact::from(&CaseRecord {
                kind: NumericKind::Real32,
                operation,
                mode: ConcurrencyMode::Single,
                outcome: TestOutcome::Passed,
                duration: Duration::from_millis(1),
            }),
        }
    }

    #[test]
    fn defaults_cover_the_full_matrix() {
        let config = HarnessConfig::default();
        assert_eq!(config.kinds.len(), 4);
        assert_eq!(config.operations.len(), 6);
        assert_eq!(config.workers, 8);
        assert_eq!(config.child_timeout, Some(Duration::from_secs(120)));
        assert!(config.color);
        assert!(config.library().is_err());
    }

    #[test]
    fn environment_overrides_are_applied() {
        let config = HarnessConfig::from_lookup(|key| match key {
            LIBRARY_ENV => Some(OsString::from("/usr/lib/libopenblas.so")),
            CHILD_TIMEOUT_ENV => Some(OsString::from("2500")),
            OUTCOME_LOG_ENV => Some(OsString::from("/tmp/bl2/outcomes.jsonl")),
            NO_COLOR_ENV => Some(OsString::from("1")),
            _ => None,
        })
        .expect("config");
        assert_eq!(
            config.library().expect("library"),
            Path::new("/usr/lib/libopenblas.so")
        );
        assert_eq!(config.child_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(
            config.log_path.as_deref(),
            Some(Path::new("/tmp/bl2/outcomes.jsonl"))
        );
        assert!(!config.color);
        assert_eq!(config.isolation_policy().timeout, config.child_timeout);
    }

    #[test]
    fn empty_no_color_keeps_color() {
        let config = HarnessConfig::from_lookup(|key| {
            (key == NO_COLOR_ENV).then(OsString::new)
        })
        .expect("config");
        assert!(config.color);
    }

    #[test]
    fn bad_timeout_from_environment_is_reported() {
        let err = HarnessConfig::from_lookup(|key| {
            (key == CHILD_TIMEOUT_ENV).then(|| OsString::from("soon"))
        })
        .expect_err("invalid timeout");
        assert!(err.contains("invalid timeout 'soon'"), "{err}");
    }

    #[test]
    fn zero_timeout_means_unbounded() {
        assert_eq!(parse_timeout_ms("0").expect("zero"), None);
        assert_eq!(
            parse_timeout_ms(" 50 ").expect("fifty"),
            Some(Duration::from_millis(50))
        );
    }

    #[test]
    fn worker_counts_must_be_positive() {
        assert_eq!(parse_worker_count("16"), Ok(16));
        assert!(parse_worker_count("0").is_err());
        assert!(parse_worker_count("-2").is_err());
    }

    #[test]
    fn filters_keep_report_order() {
        assert_eq!(
            parse_kind_list("z,s").expect("kinds"),
            vec![NumericKind::Real32, NumericKind::Complex128]
        );
        assert_eq!(
            parse_operation_list("ger, gemv").expect("ops"),
            vec![Operation::Gemv, Operation::Ger]
        );
        assert!(parse_kind_list("q").is_err());
        assert!(parse_operation_list(",").is_err());
    }

    #[test]
    fn sha256_matches_known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn outcome_log_appends_one_line_per_entry() {
        let dir = scratch_dir("log");
        let path = dir.join("nested").join("outcomes.jsonl");
        let mut log = OutcomeLog::open(&path).expect("open log");
        log.append(&entry(Operation::Gemv)).expect("first line");
        log.append(&entry(Operation::Trsv)).expect("second line");
        assert_eq!(log.path(), path.as_path());

        let raw = fs::read_to_string(&path).expect("read log");
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: OutcomeLogEntry = serde_json::from_str(lines[1]).expect("json line");
        assert_eq!(second.case.label, "strsv");
        assert_eq!(second.case.status, "passed");
    }

    #[test]
    fn outcome_log_on_a_directory_fails_to_open() {
        let dir = scratch_dir("logdir");
        let err = OutcomeLog::open(&dir).expect_err("directory is not a log file");
        assert!(err.starts_with("failed opening"), "{err}");
    }
}

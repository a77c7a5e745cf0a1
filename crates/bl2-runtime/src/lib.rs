#![forbid(unsafe_code)]

use core::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::thread;

pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_REPEATS_PER_WORKER: usize = 5;

/// Whether a check runs once on the calling thread or repeatedly across
/// concurrent workers sharing one loaded library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConcurrencyMode {
    Single,
    Multi { workers: usize, repeats: usize },
}

impl ConcurrencyMode {
    #[must_use]
    pub const fn multi(workers: usize) -> Self {
        Self::Multi {
            workers,
            repeats: DEFAULT_REPEATS_PER_WORKER,
        }
    }

    /// `one` or `multi`, as passed to child processes.
    #[must_use]
    pub const fn wire_token(self) -> &'static str {
        match self {
            Self::Single => "one",
            Self::Multi { .. } => "multi",
        }
    }

    #[must_use]
    pub const fn workers(self) -> usize {
        match self {
            Self::Single => 1,
            Self::Multi { workers, .. } => workers,
        }
    }

    #[must_use]
    pub const fn is_multi(self) -> bool {
        matches!(self, Self::Multi { .. })
    }

    /// Parses the child-side `<mode> [workers]` pair. A missing worker count
    /// in multi mode means [`DEFAULT_WORKERS`].
    pub fn parse_wire(mode: &str, workers: Option<&str>) -> Result<Self, RuntimeError> {
        match mode {
            "one" => Ok(Self::Single),
            "multi" => {
                let workers = match workers {
                    None => DEFAULT_WORKERS,
                    Some(raw) => raw
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| RuntimeError::InvalidWorkerCount(raw.to_string()))?,
                };
                if workers == 0 {
                    return Err(RuntimeError::InvalidWorkerCount("0".to_string()));
                }
                Ok(Self::multi(workers))
            }
            other => Err(RuntimeError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for ConcurrencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "one"),
            Self::Multi { workers, repeats } => write!(f, "multi[{workers}Tx{repeats}]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    InvalidMode(String),
    InvalidWorkerCount(String),
    SpawnFailed {
        spawned: usize,
        requested: usize,
        detail: String,
    },
}

impl RuntimeError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::InvalidMode(_) => "runtime_mode_invalid",
            Self::InvalidWorkerCount(_) => "runtime_worker_count_invalid",
            Self::SpawnFailed { .. } => "runtime_worker_spawn_failed",
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidMode(raw) => write!(f, "mode must be one|multi, got '{raw}'"),
            Self::InvalidWorkerCount(raw) => {
                write!(f, "worker count must be a positive integer, got '{raw}'")
            }
            Self::SpawnFailed {
                spawned,
                requested,
                detail,
            } => write!(
                f,
                "spawned {spawned} of {requested} workers before failing: {detail}"
            ),
        }
    }
}

impl std::error::Error for RuntimeError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadedSummary {
    pub workers: usize,
    pub repeats: usize,
    pub completed_iterations: usize,
}

/// At least one worker failed. `first_error` is whichever error was recorded
/// first in completion order, which is not deterministic across runs.
#[derive(Debug)]
pub struct ThreadedFailure<E> {
    pub first_error: E,
    pub failed_workers: usize,
    pub summary: ThreadedSummary,
}

impl<E: fmt::Display> fmt::Display for ThreadedFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} workers failed ({} of {} iterations completed); first error: {}",
            self.failed_workers,
            self.summary.workers,
            self.summary.completed_iterations,
            self.summary.workers * self.summary.repeats,
            self.first_error
        )
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for ThreadedFailure<E> {}

const GATE_CLOSED: u8 = 0;
const GATE_OPEN: u8 = 1;
const GATE_CANCELLED: u8 = 2;

/// Holds spawned workers until all of them exist, or sends them home if
/// spawning fails partway.
struct StartGate(AtomicU8);

impl StartGate {
    const fn new() -> Self {
        Self(AtomicU8::new(GATE_CLOSED))
    }

    /// Spins until the gate opens (`true`) or is cancelled (`false`).
    fn wait(&self) -> bool {
        loop {
            match self.0.load(Ordering::Acquire) {
                GATE_OPEN => return true,
                GATE_CANCELLED => return false,
                _ => thread::yield_now(),
            }
        }
    }

    fn open(&self) {
        self.0.store(GATE_OPEN, Ordering::Release);
    }

    fn cancel(&self) {
        self.0.store(GATE_CANCELLED, Ordering::Release);
    }
}

/// Runs `test` `repeats` times on each of `workers` scoped threads.
///
/// Workers are released together once all of them are running, to maximize
/// overlap inside the code under test. A worker stops its own loop at its
/// first error; the others keep going. Every worker is joined before
/// returning. `test` is shared by reference and called without any
/// harness-side lock.
///
/// If a worker thread cannot be spawned, the ones already started exit
/// without calling `test` and the failure carries
/// [`RuntimeError::SpawnFailed`].
pub fn run_threaded<E, F>(
    workers: usize,
    repeats: usize,
    test: F,
) -> Result<ThreadedSummary, ThreadedFailure<E>>
where
    E: Send + Sync + From<RuntimeError>,
    F: Fn() -> Result<(), E> + Sync,
{
    run_gated(workers, repeats, test, |index| {
        thread::Builder::new().name(format!("bl2-worker-{index}"))
    })
}

fn run_gated<E, F, B>(
    workers: usize,
    repeats: usize,
    test: F,
    builder: B,
) -> Result<ThreadedSummary, ThreadedFailure<E>>
where
    E: Send + Sync + From<RuntimeError>,
    F: Fn() -> Result<(), E> + Sync,
    B: Fn(usize) -> thread::Builder,
{
    let first_error: OnceLock<E> = OnceLock::new();
    let failed_workers = AtomicUsize::new(0);
    let completed = AtomicUsize::new(0);
    let gate = StartGate::new();

    let worker = || {
        if !gate.wait() {
            return;
        }
        for _ in 0..repeats {
            match test() {
                Ok(()) => {
                    completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    failed_workers.fetch_add(1, Ordering::Relaxed);
                    let _ = first_error.set(err);
                    return;
                }
            }
        }
    };

    let spawned = thread::scope(|scope| {
        for index in 0..workers {
            if let Err(err) = builder(index).spawn_scoped(scope, &worker) {
                gate.cancel();
                return Err(RuntimeError::SpawnFailed {
                    spawned: index,
                    requested: workers,
                    detail: err.to_string(),
                });
            }
        }
        gate.open();
        Ok(())
    });

    let summary = ThreadedSummary {
        workers,
        repeats,
        completed_iterations: completed.into_inner(),
    };
    if let Err(err) = spawned {
        return Err(ThreadedFailure {
            first_error: E::from(err),
            failed_workers: 0,
            summary,
        });
    }
    match first_error.into_inner() {
        None => Ok(summary),
        Some(first_error) => Err(ThreadedFailure {
            first_error,
            failed_workers: failed_workers.into_inner(),
            summary,
        }),
    }
}

/// Runs `test` according to `mode`: once inline for [`ConcurrencyMode::Single`],
/// through [`run_threaded`] otherwise.
pub fn run_in_mode<E, F>(mode: ConcurrencyMode, test: F) -> Result<ThreadedSummary, ThreadedFailure<E>>
where
    E: Send + Sync + From<RuntimeError>,
    F: Fn() -> Result<(), E> + Sync,
{
    match mode {
        ConcurrencyMode::Single => match test() {
            Ok(()) => Ok(ThreadedSummary {
                workers: 1,
                repeats: 1,
                completed_iterations: 1,
            }),
            Err(first_error) => Err(ThreadedFailure {
                first_error,
                failed_workers: 1,
                summary: ThreadedSummary {
                    workers: 1,
                    repeats: 1,
                    completed_iterations: 0,
                },
            }),
        },
        ConcurrencyMode::Multi { workers, repeats } => run_threaded(workers, repeats, test),
    }
}

//! The child side of process isolation: loads the library, runs one
//! (kind, operation, mode) combination and maps the verdict to an exit code.

use crate::operations::{ExecutionError, execute};
use bl2_dtype::NumericKind;
use bl2_ffi::{BlasLibrary, Operation};
use bl2_runtime::ConcurrencyMode;
use std::io::Write;
use std::path::Path;

pub const CHILD_SUBCOMMAND: &str = "child";

pub const CHILD_EXIT_PASSED: i32 = 0;
pub const CHILD_EXIT_ASSERTION: i32 = 1;
pub const CHILD_EXIT_USAGE: i32 = 2;
/// Library load, symbol resolution or argument contract failure.
pub const CHILD_EXIT_SETUP: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildRequest {
    pub kind: NumericKind,
    pub operation: Operation,
    pub mode: ConcurrencyMode,
}

impl ChildRequest {
    /// Parses `<prefix> <test_name> <one|multi> [workers]`, the arguments
    /// following the `child` subcommand.
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let [prefix, test, mode, rest @ ..] = args else {
            return Err(format!(
                "expected <prefix> <test_name> <one|multi> [workers], got {} argument(s)",
                args.len()
            ));
        };
        if rest.len() > 1 {
            return Err(format!("unexpected trailing arguments: {}", rest[1..].join(" ")));
        }
        let kind = NumericKind::from_prefix(prefix)
            .ok_or_else(|| format!("unknown type prefix '{prefix}' (expected s, d, c or z)"))?;
        let operation =
            Operation::parse(test).ok_or_else(|| format!("unknown test name '{test}'"))?;
        let mode = ConcurrencyMode::parse_wire(mode, rest.first().map(String::as_str))
            .map_err(|err| err.to_string())?;
        Ok(Self {
            kind,
            operation,
            mode,
        })
    }

    /// The full child command line after the program name.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            CHILD_SUBCOMMAND.to_string(),
            self.kind.prefix().to_string(),
            self.operation.test_name().to_string(),
            self.mode.wire_token().to_string(),
        ];
        if self.mode.is_multi() {
            args.push(self.mode.workers().to_string());
        }
        args
    }

    #[must_use]
    pub fn label(&self) -> String {
        self.operation.label(self.kind)
    }
}

/// Runs `request` against the library at `library_path` and returns the
/// process exit code. Diagnostics for any failure are written to
/// `diagnostics`; nothing is written on success.
///
/// A signal raised inside the library is not caught here and ends the
/// process, which the parent observes as a crash.
pub fn run_child(request: &ChildRequest, library_path: &Path, diagnostics: &mut dyn Write) -> i32 {
    let library = match BlasLibrary::open(library_path) {
        Ok(library) => library,
        Err(err) => {
            write_diagnostic(diagnostics, request, err.reason_code(), &err.to_string());
            return CHILD_EXIT_SETUP;
        }
    };

    match execute(&library, request.kind, request.operation, request.mode) {
        Ok(_) => CHILD_EXIT_PASSED,
        Err(err) => {
            write_diagnostic(diagnostics, request, err.reason_code(), &describe(request, &err));
            if err.is_assertion() {
                CHILD_EXIT_ASSERTION
            } else {
                CHILD_EXIT_SETUP
            }
        }
    }
}

fn describe(request: &ChildRequest, err: &ExecutionError) -> String {
    let symbol = request.operation.symbol(request.kind);
    match err {
        ExecutionError::Setup(inner) => format!("binding {symbol}: {inner}"),
        ExecutionError::Failed(failure) if request.mode.is_multi() => {
            format!("{symbol}: {failure}")
        }
        ExecutionError::Failed(failure) => format!("{symbol}: {}", failure.first_error),
    }
}

fn write_diagnostic(out: &mut dyn Write, request: &ChildRequest, reason_code: &str, detail: &str) {
    // A closed stderr does not change the exit code.
    let _ = writeln!(
        out,
        "{} [{}] {reason_code}: {detail}",
        request.label(),
        request.mode
    );
}

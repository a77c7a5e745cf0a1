//! One check per operation family. Each check builds fresh fixtures, computes
//! the expected result with the dense oracles, calls the routine under test
//! through [`Level2Routines`], and compares the mutated buffer.

use crate::fixtures::{
    FIXTURE_BAND_LDA, FIXTURE_KL, FIXTURE_KU, FIXTURE_N, band_matrix, base_matrix, base_vectors,
    zero_matrix,
};
use bl2_dtype::{BlasElement, Complex64, Complex128, NumericKind};
use bl2_ffi::{BlasLibrary, CblasElement, CblasRoutines, FfiError, Level2Routines, Operation};
use bl2_linalg::{Diag, LinAlgError, OracleMismatch, Tolerance, Transpose, Uplo, verify};
use bl2_runtime::{ConcurrencyMode, RuntimeError, ThreadedFailure, ThreadedSummary, run_in_mode};
use std::fmt;

#[derive(Debug)]
pub enum CaseError {
    Mismatch(OracleMismatch),
    Oracle(LinAlgError),
    Ffi(FfiError),
    /// Workers could not be started.
    Runtime(RuntimeError),
}

impl CaseError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Mismatch(err) => err.reason_code(),
            Self::Oracle(err) => err.reason_code(),
            Self::Ffi(err) => err.reason_code(),
            Self::Runtime(err) => err.reason_code(),
        }
    }

    /// True only for a wrong numeric result; every other error means the
    /// check could not be carried out.
    #[must_use]
    pub fn is_assertion(&self) -> bool {
        matches!(self, Self::Mismatch(_))
    }
}

impl fmt::Display for CaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mismatch(err) => write!(f, "{err}"),
            Self::Oracle(err) => write!(f, "oracle rejected fixture: {err}"),
            Self::Ffi(err) => write!(f, "{err}"),
            Self::Runtime(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for CaseError {}

impl From<OracleMismatch> for CaseError {
    fn from(err: OracleMismatch) -> Self {
        Self::Mismatch(err)
    }
}

impl From<LinAlgError> for CaseError {
    fn from(err: LinAlgError) -> Self {
        Self::Oracle(err)
    }
}

impl From<FfiError> for CaseError {
    fn from(err: FfiError) -> Self {
        Self::Ffi(err)
    }
}

impl From<RuntimeError> for CaseError {
    fn from(err: RuntimeError) -> Self {
        Self::Runtime(err)
    }
}

const N: usize = FIXTURE_N;

pub fn check_gemv<E, R>(routines: &R) -> Result<(), CaseError>
where
    E: BlasElement,
    R: Level2Routines<E> + ?Sized,
{
    let a = base_matrix::<E>();
    let (x, mut y) = base_vectors::<E>();
    let expected = bl2_linalg::gemv(Transpose::NoTrans, N, N, E::one(), &a, N, &x, E::zero(), &y)?;
    routines.gemv(Transpose::NoTrans, N, N, E::one(), &a, N, &x, E::zero(), &mut y)?;
    verify("gemv", &y, &expected, Tolerance::DEFAULT)?;
    Ok(())
}

/// The expected value comes from the dense matrix, so a bad band layout in
/// the routine under test shows up as a mismatch.
pub fn check_gbmv<E, R>(routines: &R) -> Result<(), CaseError>
where
    E: BlasElement,
    R: Level2Routines<E> + ?Sized,
{
    let dense = base_matrix::<E>();
    let band = band_matrix::<E>()?;
    let (x, mut y) = base_vectors::<E>();
    let expected =
        bl2_linalg::gemv(Transpose::NoTrans, N, N, E::one(), &dense, N, &x, E::zero(), &y)?;
    routines.gbmv(
        Transpose::NoTrans,
        N,
        N,
        FIXTURE_KL,
        FIXTURE_KU,
        E::one(),
        &band,
        FIXTURE_BAND_LDA,
        &x,
        E::zero(),
        &mut y,
    )?;
    verify("gbmv", &y, &expected, Tolerance::DEFAULT)?;
    Ok(())
}

pub fn check_trmv<E, R>(routines: &R) -> Result<(), CaseError>
where
    E: BlasElement,
    R: Level2Routines<E> + ?Sized,
{
    let a = base_matrix::<E>();
    let (mut x, _) = base_vectors::<E>();
    let expected = bl2_linalg::trmv(Uplo::Upper, Transpose::NoTrans, Diag::NonUnit, N, &a, N, &x)?;
    routines.trmv(Uplo::Upper, Transpose::NoTrans, Diag::NonUnit, N, &a, N, &mut x)?;
    verify("trmv", &x, &expected, Tolerance::DEFAULT)?;
    Ok(())
}

pub fn check_trsv<E, R>(routines: &R) -> Result<(), CaseError>
where
    E: BlasElement,
    R: Level2Routines<E> + ?Sized,
{
    let a = base_matrix::<E>();
    let (mut x, _) = base_vectors::<E>();
    let expected = bl2_linalg::trsv(Uplo::Upper, Transpose::NoTrans, Diag::NonUnit, N, &a, N, &x)?;
    routines.trsv(Uplo::Upper, Transpose::NoTrans, Diag::NonUnit, N, &a, N, &mut x)?;
    verify("trsv", &x, &expected, Tolerance::DEFAULT)?;
    Ok(())
}

/// symv for real kinds, hemv for complex kinds; both report as `symv/hemv`.
pub fn check_symv_hemv<E, R>(routines: &R) -> Result<(), CaseError>
where
    E: BlasElement,
    R: Level2Routines<E> + ?Sized,
{
    let a = base_matrix::<E>();
    let (x, mut y) = base_vectors::<E>();
    let expected = if E::KIND.is_complex() {
        bl2_linalg::hemv(Uplo::Upper, N, E::one(), &a, N, &x, E::zero(), &y)?
    } else {
        bl2_linalg::symv(Uplo::Upper, N, E::one(), &a, N, &x, E::zero(), &y)?
    };
    routines.symv_hemv(Uplo::Upper, N, E::one(), &a, N, &x, E::zero(), &mut y)?;
    verify("symv/hemv", &y, &expected, Tolerance::DEFAULT)?;
    Ok(())
}

/// No call is made for complex kinds.
pub fn check_ger<E, R>(routines: &R) -> Result<(), CaseError>
where
    E: BlasElement,
    R: Level2Routines<E> + ?Sized,
{
    if !Operation::Ger.applies_to(E::KIND) {
        return Ok(());
    }
    let mut a = zero_matrix::<E>();
    let (x, y) = base_vectors::<E>();
    let expected = bl2_linalg::ger(N, N, E::one(), &x, &y, &a, N)?;
    routines.ger(N, N, E::one(), &x, &y, &mut a, N)?;
    verify("ger", &a, &expected, Tolerance::DEFAULT)?;
    Ok(())
}

pub fn check_operation<E, R>(operation: Operation, routines: &R) -> Result<(), CaseError>
where
    E: BlasElement,
    R: Level2Routines<E> + ?Sized,
{
    match operation {
        Operation::Gemv => check_gemv(routines),
        Operation::Gbmv => check_gbmv(routines),
        Operation::Trmv => check_trmv(routines),
        Operation::Trsv => check_trsv(routines),
        Operation::SymvHemv => check_symv_hemv(routines),
        Operation::Ger => check_ger(routines),
    }
}

/// Runs `operation` against `routines` once or across workers, per `mode`.
pub fn run_checks<E, R>(
    operation: Operation,
    mode: ConcurrencyMode,
    routines: &R,
) -> Result<ThreadedSummary, ThreadedFailure<CaseError>>
where
    E: BlasElement,
    R: Level2Routines<E> + ?Sized,
{
    run_in_mode(mode, || check_operation::<E, R>(operation, routines))
}

#[derive(Debug)]
pub enum ExecutionError {
    /// The routine table could not be bound; no worker started.
    Setup(FfiError),
    Failed(ThreadedFailure<CaseError>),
}

impl ExecutionError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Setup(err) => err.reason_code(),
            Self::Failed(failure) => failure.first_error.reason_code(),
        }
    }

    #[must_use]
    pub fn is_assertion(&self) -> bool {
        matches!(self, Self::Failed(failure) if failure.first_error.is_assertion())
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup(err) => write!(f, "setup failed: {err}"),
            Self::Failed(failure) => write!(f, "{failure}"),
        }
    }
}

impl std::error::Error for ExecutionError {}

/// Binds the routine for (`kind`, `operation`) from `library` once, then runs
/// the check per `mode`. An operation that does not apply to `kind` is a
/// no-op that binds nothing.
pub fn execute(
    library: &BlasLibrary,
    kind: NumericKind,
    operation: Operation,
    mode: ConcurrencyMode,
) -> Result<ThreadedSummary, ExecutionError> {
    match kind {
        NumericKind::Real32 => execute_typed::<f32>(library, operation, mode),
        NumericKind::Real64 => execute_typed::<f64>(library, operation, mode),
        NumericKind::Complex64 => execute_typed::<Complex64>(library, operation, mode),
        NumericKind::Complex128 => execute_typed::<Complex128>(library, operation, mode),
    }
}

fn execute_typed<E: CblasElement>(
    library: &BlasLibrary,
    operation: Operation,
    mode: ConcurrencyMode,
) -> Result<ThreadedSummary, ExecutionError> {
    if !operation.applies_to(E::KIND) {
        return Ok(ThreadedSummary {
            workers: mode.workers(),
            repeats: 0,
            completed_iterations: 0,
        });
    }
    let routines = CblasRoutines::<E>::bind(library, &[operation]).map_err(ExecutionError::Setup)?;
    run_checks::<E, _>(operation, mode, &routines).map_err(ExecutionError::Failed)
}

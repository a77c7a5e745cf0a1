//! Calls through the real `unsafe` wrappers into a loaded shared object and
//! compares against the dense oracles. Operands are rectangular, padded past
//! the leading dimension and use non-trivial alpha/beta, so a swapped
//! argument, a wrong integer width or a complex scalar passed by value shows
//! up as a wrong number or an abort.

use bl2_conformance::operations::{ExecutionError, execute};
use bl2_dtype::{BlasElement, Complex64, Complex128, NumericKind};
use bl2_ffi::{BlasLibrary, CblasElement, CblasRoutines, Level2Routines, Operation};
use bl2_linalg::{Diag, Tolerance, Transpose, Uplo, verify};
use bl2_runtime::ConcurrencyMode;

const TOLERANCE: Tolerance = Tolerance {
    abs: 1e-4,
    rel: 1e-4,
};
const PAD: f64 = -99.0;

fn fixture_library() -> BlasLibrary {
    BlasLibrary::open(bl2_fixture_cblas::library_path()).expect("fixture library loads")
}

trait Sample: CblasElement {
    fn sample(re: f64, im: f64) -> Self;
}

impl Sample for f32 {
    fn sample(re: f64, _: f64) -> Self {
        Self::from_f64(re)
    }
}

impl Sample for f64 {
    fn sample(re: f64, _: f64) -> Self {
        re
    }
}

impl Sample for Complex64 {
    #[allow(clippy::cast_possible_truncation)]
    fn sample(re: f64, im: f64) -> Self {
        Complex64::new(re as f32, im as f32)
    }
}

impl Sample for Complex128 {
    fn sample(re: f64, im: f64) -> Self {
        Complex128::new(re, im)
    }
}

fn ramp<E: Sample>(len: usize, start: f64) -> Vec<E> {
    (0..len)
        .map(|i| E::sample(start + 0.25 * i as f64, 0.125 * (i % 3) as f64))
        .collect()
}

/// `rows x cols` values in a `rows x lda` buffer whose tail columns hold
/// [`PAD`].
fn padded<E: Sample>(rows: usize, cols: usize, lda: usize) -> Vec<E> {
    let mut a = vec![E::sample(PAD, PAD); rows * lda];
    for i in 0..rows {
        for j in 0..cols {
            let step = ((i * cols + j) % 7) as f64;
            a[i * lda + j] = E::sample(0.5 + 0.25 * step, 0.125 * ((i + j) % 3) as f64);
        }
    }
    a
}

/// Diagonally dominant, so every triangle solves cleanly in single precision.
fn dominant<E: Sample>(n: usize, lda: usize) -> Vec<E> {
    let mut a = vec![E::sample(PAD, PAD); n * lda];
    for i in 0..n {
        for j in 0..n {
            a[i * lda + j] = if i == j {
                E::sample(4.0 + i as f64, 0.5)
            } else {
                E::sample(0.05 + 0.1 * ((i + 2 * j) % 5) as f64, 0.05 * ((i + j) % 2) as f64)
            };
        }
    }
    a
}

fn op_lengths(trans: Transpose, m: usize, n: usize) -> (usize, usize) {
    match trans {
        Transpose::NoTrans => (n, m),
        Transpose::Trans | Transpose::ConjTrans => (m, n),
    }
}

fn bind_all<E: CblasElement>(library: &BlasLibrary) -> CblasRoutines<'_, E> {
    let operations: Vec<Operation> = Operation::ALL
        .into_iter()
        .filter(|op| op.applies_to(E::KIND))
        .collect();
    CblasRoutines::<E>::bind(library, &operations).expect("every applicable symbol binds")
}

fn gemv_matches_oracle<E: Sample>(routines: &CblasRoutines<'_, E>) {
    let (m, n, lda) = (3, 5, 7);
    let a = padded::<E>(m, n, lda);
    let (alpha, beta) = (E::sample(1.5, -0.5), E::sample(0.5, 0.25));
    for trans in [Transpose::NoTrans, Transpose::Trans, Transpose::ConjTrans] {
        let (x_len, y_len) = op_lengths(trans, m, n);
        let x = ramp::<E>(x_len, 0.5);
        let mut y = ramp::<E>(y_len, 1.0);
        let expected =
            bl2_linalg::gemv(trans, m, n, alpha, &a, lda, &x, beta, &y).expect("oracle");
        routines
            .gemv(trans, m, n, alpha, &a, lda, &x, beta, &mut y)
            .expect("gemv call");
        verify(&format!("{} gemv {trans:?}", E::KIND), &y, &expected, TOLERANCE)
            .unwrap_or_else(|err| panic!("{err}"));
    }
}

fn gbmv_matches_oracle<E: Sample>(routines: &CblasRoutines<'_, E>) {
    let (m, n, kl, ku) = (5, 4, 1, 2);
    let lda = kl + ku + 2;
    let dense = padded::<E>(m, n, n);
    let mut band = vec![E::sample(PAD, PAD); m * lda];
    for i in 0..m {
        for j in i.saturating_sub(kl)..(i + ku + 1).min(n) {
            band[i * lda + kl + j - i] = dense[i * n + j];
        }
    }
    let (alpha, beta) = (E::sample(-0.75, 0.5), E::sample(2.0, -1.0));
    for trans in [Transpose::NoTrans, Transpose::Trans] {
        let (x_len, y_len) = op_lengths(trans, m, n);
        let x = ramp::<E>(x_len, 0.25);
        let mut y = ramp::<E>(y_len, 2.0);
        let expected = bl2_linalg::gbmv(trans, m, n, kl, ku, alpha, &band, lda, &x, beta, &y)
            .expect("oracle");
        routines
            .gbmv(trans, m, n, kl, ku, alpha, &band, lda, &x, beta, &mut y)
            .expect("gbmv call");
        verify(&format!("{} gbmv {trans:?}", E::KIND), &y, &expected, TOLERANCE)
            .unwrap_or_else(|err| panic!("{err}"));
    }
}

fn triangular_matches_oracle<E: Sample>(routines: &CblasRoutines<'_, E>) {
    let (n, lda) = (4, 6);
    let a = dominant::<E>(n, lda);
    let b = ramp::<E>(n, -0.5);
    for uplo in [Uplo::Upper, Uplo::Lower] {
        for trans in [Transpose::NoTrans, Transpose::Trans, Transpose::ConjTrans] {
            for diag in [Diag::NonUnit, Diag::Unit] {
                let case = format!("{} {uplo:?} {trans:?} {diag:?}", E::KIND);

                let expected = bl2_linalg::trmv(uplo, trans, diag, n, &a, lda, &b).expect("oracle");
                let mut x = b.clone();
                routines
                    .trmv(uplo, trans, diag, n, &a, lda, &mut x)
                    .expect("trmv call");
                verify(&format!("trmv {case}"), &x, &expected, TOLERANCE)
                    .unwrap_or_else(|err| panic!("{err}"));

                let expected = bl2_linalg::trsv(uplo, trans, diag, n, &a, lda, &b).expect("oracle");
                let mut x = b.clone();
                routines
                    .trsv(uplo, trans, diag, n, &a, lda, &mut x)
                    .expect("trsv call");
                verify(&format!("trsv {case}"), &x, &expected, TOLERANCE)
                    .unwrap_or_else(|err| panic!("{err}"));
            }
        }
    }
}

fn symmetric_matches_oracle<E: Sample>(routines: &CblasRoutines<'_, E>) {
    let (n, lda) = (4, 5);
    // Not symmetric, so reading the wrong triangle changes the answer.
    let a = padded::<E>(n, n, lda);
    let x = ramp::<E>(n, 0.75);
    let (alpha, beta) = (E::sample(0.5, 1.0), E::sample(-1.0, 0.5));
    for uplo in [Uplo::Upper, Uplo::Lower] {
        let mut y = ramp::<E>(n, -1.0);
        let expected = if E::KIND.is_complex() {
            bl2_linalg::hemv(uplo, n, alpha, &a, lda, &x, beta, &y)
        } else {
            bl2_linalg::symv(uplo, n, alpha, &a, lda, &x, beta, &y)
        }
        .expect("oracle");
        routines
            .symv_hemv(uplo, n, alpha, &a, lda, &x, beta, &mut y)
            .expect("symv/hemv call");
        verify(&format!("{} symv/hemv {uplo:?}", E::KIND), &y, &expected, TOLERANCE)
            .unwrap_or_else(|err| panic!("{err}"));
    }
}

fn ger_matches_oracle<E: Sample>(routines: &CblasRoutines<'_, E>) {
    let (m, n, lda) = (3, 4, 6);
    let mut a = padded::<E>(m, n, lda);
    let (x, y) = (ramp::<E>(m, 1.0), ramp::<E>(n, -0.5));
    let alpha = E::sample(-1.25, 0.0);
    let expected = bl2_linalg::ger(m, n, alpha, &x, &y, &a, lda).expect("oracle");
    routines
        .ger(m, n, alpha, &x, &y, &mut a, lda)
        .expect("ger call");
    // Padding must come back untouched too.
    verify(&format!("{} ger", E::KIND), &a, &expected, TOLERANCE)
        .unwrap_or_else(|err| panic!("{err}"));
}

fn every_routine_matches_oracle<E: Sample>() {
    let library = fixture_library();
    let routines = bind_all::<E>(&library);
    gemv_matches_oracle(&routines);
    gbmv_matches_oracle(&routines);
    triangular_matches_oracle(&routines);
    symmetric_matches_oracle(&routines);
    if Operation::Ger.applies_to(E::KIND) {
        ger_matches_oracle(&routines);
    }
}

#[test]
fn real32_arguments_cross_the_boundary_intact() {
    every_routine_matches_oracle::<f32>();
}

#[test]
fn real64_arguments_cross_the_boundary_intact() {
    every_routine_matches_oracle::<f64>();
}

#[test]
fn complex64_arguments_cross_the_boundary_intact() {
    every_routine_matches_oracle::<Complex64>();
}

#[test]
fn complex128_arguments_cross_the_boundary_intact() {
    every_routine_matches_oracle::<Complex128>();
}

#[test]
fn every_combination_executes_in_both_modes() {
    let library = fixture_library();
    let mut failures = Vec::new();
    for kind in NumericKind::ALL {
        for operation in Operation::ALL {
            for mode in [ConcurrencyMode::Single, ConcurrencyMode::multi(8)] {
                match execute(&library, kind, operation, mode) {
                    Ok(summary) if operation.applies_to(kind) => {
                        assert_eq!(summary.completed_iterations, mode.workers() * summary.repeats);
                    }
                    Ok(summary) => assert_eq!(summary.completed_iterations, 0),
                    Err(err) => failures.push(format!("{} [{mode}]: {err}", operation.label(kind))),
                }
            }
        }
    }
    assert!(failures.is_empty(), "failures={failures:?}");
}

#[test]
fn binding_reports_inapplicable_and_unbound_routines() {
    let library = fixture_library();
    let err = CblasRoutines::<Complex64>::bind(&library, &[Operation::Ger])
        .expect_err("no complex ger");
    assert_eq!(err.reason_code(), "ffi_not_applicable");

    let routines = CblasRoutines::<f64>::bind(&library, &[Operation::Gemv]).expect("bind gemv");
    assert_eq!(routines.descriptors().len(), 1);
    assert_eq!(routines.descriptors()[0].symbol, "cblas_dgemv");
    let mut x = vec![1.0; 2];
    let err = routines
        .trmv(Uplo::Upper, Transpose::NoTrans, Diag::NonUnit, 2, &[1.0, 0.0, 0.0, 1.0], 2, &mut x)
        .expect_err("trmv was not bound");
    assert_eq!(err.reason_code(), "ffi_routine_unbound");
    assert!(err.to_string().contains("cblas_dtrmv"));
}

#[test]
fn setup_errors_are_not_assertions() {
    let library = fixture_library();
    let err = execute(&library, NumericKind::Real32, Operation::Gemv, ConcurrencyMode::Single)
        .map(|_| ())
        .err();
    assert!(err.is_none(), "{err:?}");
    let failure = ExecutionError::Setup(
        CblasRoutines::<Complex128>::bind(&library, &[Operation::Ger])
            .expect_err("not applicable"),
    );
    assert!(!failure.is_assertion());
}

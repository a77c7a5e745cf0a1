#![forbid(unsafe_code)]

//! Dense reference routines used as the expected-result oracle for Level-2
//! BLAS conformance checks, plus the tolerance comparator.
//!
//! All matrices are row-major with an explicit leading dimension, matching the
//! `CblasRowMajor` convention used on the foreign side.

use bl2_dtype::BlasElement;
use core::fmt;

pub const LINALG_REASON_CODES: [&str; 4] = [
    "linalg_shape_contract_violation",
    "linalg_band_contract_violation",
    "linalg_solver_singularity",
    "linalg_oracle_mismatch",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transpose {
    NoTrans,
    Trans,
    ConjTrans,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uplo {
    Upper,
    Lower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diag {
    NonUnit,
    Unit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinAlgError {
    ShapeContractViolation(&'static str),
    BandContractViolation(&'static str),
    SolverSingularity,
}

impl LinAlgError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::ShapeContractViolation(_) => "linalg_shape_contract_violation",
            Self::BandContractViolation(_) => "linalg_band_contract_violation",
            Self::SolverSingularity => "linalg_solver_singularity",
        }
    }
}

impl fmt::Display for LinAlgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShapeContractViolation(msg) | Self::BandContractViolation(msg) => {
                write!(f, "{msg}")
            }
            Self::SolverSingularity => {
                write!(f, "triangular solve hit a zero on the diagonal")
            }
        }
    }
}

impl std::error::Error for LinAlgError {}

/// Checks that a row-major `rows x cols` matrix with leading dimension `lda`
/// fits in a buffer of `len` elements.
pub fn validate_dense(rows: usize, cols: usize, lda: usize, len: usize) -> Result<(), LinAlgError> {
    if lda < cols.max(1) {
        return Err(LinAlgError::ShapeContractViolation(
            "leading dimension must be at least max(1, cols)",
        ));
    }
    if rows == 0 || cols == 0 {
        return Ok(());
    }
    let needed = (rows - 1)
        .checked_mul(lda)
        .and_then(|base| base.checked_add(cols))
        .ok_or(LinAlgError::ShapeContractViolation(
            "matrix extent overflowed",
        ))?;
    if len < needed {
        return Err(LinAlgError::ShapeContractViolation(
            "matrix buffer shorter than rows/cols/lda require",
        ));
    }
    Ok(())
}

fn validate_vector(len: usize, needed: usize, what: &'static str) -> Result<(), LinAlgError> {
    if len < needed {
        return Err(LinAlgError::ShapeContractViolation(what));
    }
    Ok(())
}

fn apply_trans<E: BlasElement>(value: E, trans: Transpose) -> E {
    match trans {
        Transpose::ConjTrans => value.conj(),
        Transpose::NoTrans | Transpose::Trans => value,
    }
}

/// `alpha * op(A) * x + beta * y` over a dense row-major `m x n` matrix.
#[allow(clippy::too_many_arguments)]
pub fn gemv<E: BlasElement>(
    trans: Transpose,
    m: usize,
    n: usize,
    alpha: E,
    a: &[E],
    lda: usize,
    x: &[E],
    beta: E,
    y: &[E],
) -> Result<Vec<E>, LinAlgError> {
    validate_dense(m, n, lda, a.len())?;
    let (out_len, in_len) = match trans {
        Transpose::NoTrans => (m, n),
        Transpose::Trans | Transpose::ConjTrans => (n, m),
    };
    validate_vector(x.len(), in_len, "gemv x shorter than op(A) columns")?;
    validate_vector(y.len(), out_len, "gemv y shorter than op(A) rows")?;

    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let mut acc = E::zero();
        for (j, &xj) in x.iter().enumerate().take(in_len) {
            let entry = match trans {
                Transpose::NoTrans => a[i * lda + j],
                Transpose::Trans | Transpose::ConjTrans => a[j * lda + i],
            };
            acc = acc + apply_trans(entry, trans) * xj;
        }
        out.push(alpha * acc + beta * y[i]);
    }
    Ok(out)
}

/// Row-major band encoding of a dense matrix with `kl` sub- and `ku`
/// super-diagonals. Row `i` of the result holds `A[i][i-kl ..= i+ku]`, so
/// `A[i][j]` lives at `band[i * (kl + ku + 1) + kl + j - i]`.
pub fn band_from_dense<E: BlasElement>(
    a: &[E],
    m: usize,
    n: usize,
    lda: usize,
    kl: usize,
    ku: usize,
) -> Result<Vec<E>, LinAlgError> {
    validate_dense(m, n, lda, a.len())?;
    let width = kl + ku + 1;
    let mut band = vec![E::zero(); m * width];
    for i in 0..m {
        let lo = i.saturating_sub(kl);
        let hi = (i + ku + 1).min(n);
        for j in lo..hi {
            band[i * width + kl + j - i] = a[i * lda + j];
        }
    }
    Ok(band)
}

/// Checks a row-major band buffer with `m` rows against `kl`, `ku` and `lda`.
pub fn validate_band(
    m: usize,
    kl: usize,
    ku: usize,
    lda: usize,
    len: usize,
) -> Result<(), LinAlgError> {
    if lda < kl + ku + 1 {
        return Err(LinAlgError::BandContractViolation(
            "band leading dimension must be at least kl + ku + 1",
        ));
    }
    if m > 0 && len < (m - 1) * lda + kl + ku + 1 {
        return Err(LinAlgError::BandContractViolation(
            "band buffer shorter than rows/lda require",
        ));
    }
    Ok(())
}

/// `alpha * op(A) * x + beta * y` where `A` is given in row-major band storage.
#[allow(clippy::too_many_arguments)]
pub fn gbmv<E: BlasElement>(
    trans: Transpose,
    m: usize,
    n: usize,
    kl: usize,
    ku: usize,
    alpha: E,
    band: &[E],
    lda: usize,
    x: &[E],
    beta: E,
    y: &[E],
) -> Result<Vec<E>, LinAlgError> {
    validate_band(m, kl, ku, lda, band.len())?;
    let mut dense = vec![E::zero(); m * n];
    for i in 0..m {
        let lo = i.saturating_sub(kl);
        let hi = (i + ku + 1).min(n);
        for j in lo..hi {
            dense[i * n + j] = band[i * lda + kl + j - i];
        }
    }
    gemv(trans, m, n, alpha, &dense, n.max(1), x, beta, y)
}

fn triangular_entry<E: BlasElement>(
    uplo: Uplo,
    diag: Diag,
    a: &[E],
    lda: usize,
    i: usize,
    j: usize,
) -> E {
    if i == j {
        return match diag {
            Diag::Unit => E::one(),
            Diag::NonUnit => a[i * lda + j],
        };
    }
    let stored = match uplo {
        Uplo::Upper => j > i,
        Uplo::Lower => j < i,
    };
    if stored { a[i * lda + j] } else { E::zero() }
}

/// Dense `op(T)` for the triangle of `a` selected by `uplo`/`diag`.
fn effective_triangle<E: BlasElement>(
    uplo: Uplo,
    trans: Transpose,
    diag: Diag,
    n: usize,
    a: &[E],
    lda: usize,
) -> Vec<E> {
    let mut op = vec![E::zero(); n * n];
    for i in 0..n {
        for j in 0..n {
            let value = match trans {
                Transpose::NoTrans => triangular_entry(uplo, diag, a, lda, i, j),
                Transpose::Trans | Transpose::ConjTrans => {
                    apply_trans(triangular_entry(uplo, diag, a, lda, j, i), trans)
                }
            };
            op[i * n + j] = value;
        }
    }
    op
}

/// `op(T) * x` for a triangular `n x n` matrix.
pub fn trmv<E: BlasElement>(
    uplo: Uplo,
    trans: Transpose,
    diag: Diag,
    n: usize,
    a: &[E],
    lda: usize,
    x: &[E],
) -> Result<Vec<E>, LinAlgError> {
    validate_dense(n, n, lda, a.len())?;
    validate_vector(x.len(), n, "trmv x shorter than n")?;
    let op = effective_triangle(uplo, trans, diag, n, a, lda);
    let zeros = vec![E::zero(); n];
    gemv(Transpose::NoTrans, n, n, E::one(), &op, n.max(1), x, E::zero(), &zeros)
}

/// Solves `op(T) * x = b` by substitution.
pub fn trsv<E: BlasElement>(
    uplo: Uplo,
    trans: Transpose,
    diag: Diag,
    n: usize,
    a: &[E],
    lda: usize,
    b: &[E],
) -> Result<Vec<E>, LinAlgError> {
    validate_dense(n, n, lda, a.len())?;
    validate_vector(b.len(), n, "trsv b shorter than n")?;
    let op = effective_triangle(uplo, trans, diag, n, a, lda);
    // Transposing swaps which triangle is populated.
    let upper = matches!(
        (uplo, trans),
        (Uplo::Upper, Transpose::NoTrans) | (Uplo::Lower, Transpose::Trans | Transpose::ConjTrans)
    );

    let mut x = b[..n].to_vec();
    let order: Vec<usize> = if upper {
        (0..n).rev().collect()
    } else {
        (0..n).collect()
    };
    for &i in &order {
        let pivot = op[i * n + i];
        if pivot.modulus() == 0.0 {
            return Err(LinAlgError::SolverSingularity);
        }
        let mut acc = x[i];
        for j in 0..n {
            let solved = if upper { j > i } else { j < i };
            if solved {
                acc = acc - op[i * n + j] * x[j];
            }
        }
        x[i] = acc / pivot;
    }
    Ok(x)
}

/// Expands the triangle selected by `uplo` into a full symmetric matrix, or
/// Hermitian when `hermitian` is set (mirrored entries conjugated, diagonal
/// imaginary parts ignored).
pub fn mirror_triangle<E: BlasElement>(
    uplo: Uplo,
    n: usize,
    a: &[E],
    lda: usize,
    hermitian: bool,
) -> Result<Vec<E>, LinAlgError> {
    validate_dense(n, n, lda, a.len())?;
    let mut full = vec![E::zero(); n * n];
    for i in 0..n {
        for j in 0..n {
            let in_triangle = match uplo {
                Uplo::Upper => j >= i,
                Uplo::Lower => j <= i,
            };
            let value = if i == j {
                let d = a[i * lda + i];
                if hermitian { d.real_part() } else { d }
            } else if in_triangle {
                a[i * lda + j]
            } else {
                let mirrored = a[j * lda + i];
                if hermitian { mirrored.conj() } else { mirrored }
            };
            full[i * n + j] = value;
        }
    }
    Ok(full)
}

/// `alpha * A * x + beta * y` with `A` symmetric, referenced through `uplo`.
#[allow(clippy::too_many_arguments)]
pub fn symv<E: BlasElement>(
    uplo: Uplo,
    n: usize,
    alpha: E,
    a: &[E],
    lda: usize,
    x: &[E],
    beta: E,
    y: &[E],
) -> Result<Vec<E>, LinAlgError> {
    let full = mirror_triangle(uplo, n, a, lda, false)?;
    gemv(Transpose::NoTrans, n, n, alpha, &full, n.max(1), x, beta, y)
}

/// `alpha * A * x + beta * y` with `A` Hermitian, referenced through `uplo`.
#[allow(clippy::too_many_arguments)]
pub fn hemv<E: BlasElement>(
    uplo: Uplo,
    n: usize,
    alpha: E,
    a: &[E],
    lda: usize,
    x: &[E],
    beta: E,
    y: &[E],
) -> Result<Vec<E>, LinAlgError> {
    let full = mirror_triangle(uplo, n, a, lda, true)?;
    gemv(Transpose::NoTrans, n, n, alpha, &full, n.max(1), x, beta, y)
}

/// Rank-1 update `A + alpha * x * y^T` (unconjugated).
pub fn ger<E: BlasElement>(
    m: usize,
    n: usize,
    alpha: E,
    x: &[E],
    y: &[E],
    a: &[E],
    lda: usize,
) -> Result<Vec<E>, LinAlgError> {
    validate_dense(m, n, lda, a.len())?;
    validate_vector(x.len(), m, "ger x shorter than m")?;
    validate_vector(y.len(), n, "ger y shorter than n")?;
    let mut out = a.to_vec();
    for i in 0..m {
        for j in 0..n {
            out[i * lda + j] = a[i * lda + j] + alpha * x[i] * y[j];
        }
    }
    Ok(out)
}

/// Closeness bounds: a pair passes when `|actual - expected| <= abs + rel * |expected|`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub abs: f64,
    pub rel: f64,
}

impl Tolerance {
    /// rtol=1e-5, atol=1e-8. Well above the rounding a 4-term single
    /// precision dot product can accumulate (about 2e-6 relative).
    pub const DEFAULT: Self = Self {
        abs: 1e-8,
        rel: 1e-5,
    };

    #[must_use]
    pub fn accepts<E: BlasElement>(&self, actual: E, expected: E) -> bool {
        let err = (actual - expected).modulus();
        err <= self.abs + self.rel * expected.modulus()
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[must_use]
pub fn allclose<E: BlasElement>(actual: &[E], expected: &[E], tolerance: Tolerance) -> bool {
    actual.len() == expected.len()
        && actual
            .iter()
            .zip(expected)
            .all(|(&a, &e)| tolerance.accepts(a, e))
}

#[must_use]
pub fn max_abs_error<E: BlasElement>(actual: &[E], expected: &[E]) -> f64 {
    actual
        .iter()
        .zip(expected)
        .map(|(&a, &e)| (a - e).modulus())
        .fold(0.0, f64::max)
}

/// Oracle disagreement raised by [`verify`].
#[derive(Debug, Clone, PartialEq)]
pub struct OracleMismatch {
    pub label: String,
    pub index: Option<usize>,
    pub actual: Option<(f64, f64)>,
    pub expected: Option<(f64, f64)>,
    pub actual_len: usize,
    pub expected_len: usize,
    pub max_abs_error: f64,
}

impl OracleMismatch {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        "linalg_oracle_mismatch"
    }

    /// The fixed headline, e.g. `Wrong result in gemv`.
    #[must_use]
    pub fn message(&self) -> String {
        format!("Wrong result in {}", self.label)
    }
}

fn format_pair((re, im): (f64, f64)) -> String {
    if im == 0.0 {
        format!("{re}")
    } else {
        format!("{re}{im:+}i")
    }
}

impl fmt::Display for OracleMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())?;
        match (self.index, self.actual, self.expected) {
            (Some(index), Some(actual), Some(expected)) => write!(
                f,
                " (index {index}: expected {} actual {}, max_abs_error {:e})",
                format_pair(expected),
                format_pair(actual),
                self.max_abs_error
            ),
            _ => write!(
                f,
                " (length mismatch: expected {} actual {})",
                self.expected_len, self.actual_len
            ),
        }
    }
}

impl std::error::Error for OracleMismatch {}

/// Compares a library result against its oracle.
pub fn verify<E: BlasElement>(
    label: &str,
    actual: &[E],
    expected: &[E],
    tolerance: Tolerance,
) -> Result<(), OracleMismatch> {
    let mut mismatch = OracleMismatch {
        label: label.to_string(),
        index: None,
        actual: None,
        expected: None,
        actual_len: actual.len(),
        expected_len: expected.len(),
        max_abs_error: f64::INFINITY,
    };
    if actual.len() != expected.len() {
        return Err(mismatch);
    }
    let Some(index) = actual
        .iter()
        .zip(expected)
        .position(|(&a, &e)| !tolerance.accepts(a, e))
    else {
        return Ok(());
    };
    mismatch.index = Some(index);
    mismatch.actual = Some((actual[index].real(), actual[index].imag()));
    mismatch.expected = Some((expected[index].real(), expected[index].imag()));
    mismatch.max_abs_error = max_abs_error(actual, expected);
    Err(mismatch)
}

//! Fixed operands shared by every operation check. Each call allocates fresh
//! buffers, so concurrent workers never share harness-side memory.

use bl2_dtype::BlasElement;
use bl2_linalg::{LinAlgError, band_from_dense};

/// Order of every fixture matrix and length of every fixture vector.
pub const FIXTURE_N: usize = 4;
/// Sub- and super-diagonal counts of the banded fixture.
pub const FIXTURE_KL: usize = 0;
pub const FIXTURE_KU: usize = 0;
/// Leading dimension of the banded fixture, `kl + ku + 1`.
pub const FIXTURE_BAND_LDA: usize = FIXTURE_KL + FIXTURE_KU + 1;

const X_VALUES: [f64; FIXTURE_N] = [1.0, 2.0, 3.0, 4.0];
const Y_VALUES: [f64; FIXTURE_N] = [4.0, 3.0, 2.0, 1.0];

/// `x = [1, 2, 3, 4]`, `y = [4, 3, 2, 1]`.
#[must_use]
pub fn base_vectors<E: BlasElement>() -> (Vec<E>, Vec<E>) {
    (
        X_VALUES.iter().copied().map(E::from_f64).collect(),
        Y_VALUES.iter().copied().map(E::from_f64).collect(),
    )
}

/// Row-major `FIXTURE_N x FIXTURE_N` identity.
#[must_use]
pub fn base_matrix<E: BlasElement>() -> Vec<E> {
    let mut a = zero_matrix::<E>();
    for i in 0..FIXTURE_N {
        a[i * FIXTURE_N + i] = E::one();
    }
    a
}

#[must_use]
pub fn zero_matrix<E: BlasElement>() -> Vec<E> {
    vec![E::zero(); FIXTURE_N * FIXTURE_N]
}

/// Band encoding of [`base_matrix`] with `kl = ku = 0`: a `FIXTURE_N x 1`
/// matrix whose single column is the diagonal.
pub fn band_matrix<E: BlasElement>() -> Result<Vec<E>, LinAlgError> {
    band_from_dense(
        &base_matrix::<E>(),
        FIXTURE_N,
        FIXTURE_N,
        FIXTURE_N,
        FIXTURE_KL,
        FIXTURE_KU,
    )
}

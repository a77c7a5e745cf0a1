//! Typed call boundary to a CBLAS Level-2 implementation loaded at runtime.
//!
//! Each operation has one `unsafe extern "C"` fn-pointer alias, generic over
//! the element type `E` and over the way `E` passes alpha/beta
//! ([`CblasElement::Scalar`]): by value for real kinds, by pointer to a packed
//! pair for complex kinds. Symbols are resolved once into a
//! [`CblasRoutines`] table; every call goes through a safe wrapper that checks
//! buffer extents against the dimensions before crossing the boundary.

use bl2_dtype::{BlasElement, Complex, NumericKind, ScalarConvention};
use bl2_linalg::{Diag, LinAlgError, Transpose, Uplo, validate_band, validate_dense};
use core::fmt;
use core::marker::PhantomData;
use std::os::raw::c_int;
use std::path::{Path, PathBuf};

pub const CBLAS_ROW_MAJOR: c_int = 101;
pub const CBLAS_NO_TRANS: c_int = 111;
pub const CBLAS_TRANS: c_int = 112;
pub const CBLAS_CONJ_TRANS: c_int = 113;
pub const CBLAS_UPPER: c_int = 121;
pub const CBLAS_LOWER: c_int = 122;
pub const CBLAS_NON_UNIT: c_int = 131;
pub const CBLAS_UNIT: c_int = 132;

pub const FFI_REASON_CODES: [&str; 6] = [
    "ffi_library_load_failed",
    "ffi_symbol_missing",
    "ffi_not_applicable",
    "ffi_routine_unbound",
    "ffi_dimension_overflow",
    "ffi_argument_contract_violation",
];

#[must_use]
pub const fn cblas_transpose(trans: Transpose) -> c_int {
    match trans {
        Transpose::NoTrans => CBLAS_NO_TRANS,
        Transpose::Trans => CBLAS_TRANS,
        Transpose::ConjTrans => CBLAS_CONJ_TRANS,
    }
}

#[must_use]
pub const fn cblas_uplo(uplo: Uplo) -> c_int {
    match uplo {
        Uplo::Upper => CBLAS_UPPER,
        Uplo::Lower => CBLAS_LOWER,
    }
}

#[must_use]
pub const fn cblas_diag(diag: Diag) -> c_int {
    match diag {
        Diag::NonUnit => CBLAS_NON_UNIT,
        Diag::Unit => CBLAS_UNIT,
    }
}

/// Level-2 operation families covered by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Gemv,
    Gbmv,
    Trmv,
    Trsv,
    SymvHemv,
    Ger,
}

impl Operation {
    /// Report order.
    pub const ALL: [Self; 6] = [
        Self::Gemv,
        Self::Gbmv,
        Self::Trmv,
        Self::Trsv,
        Self::SymvHemv,
        Self::Ger,
    ];

    /// Token used on the child command line and in report labels.
    #[must_use]
    pub const fn test_name(self) -> &'static str {
        match self {
            Self::Gemv => "gemv",
            Self::Gbmv => "gbmv",
            Self::Trmv => "trmv",
            Self::Trsv => "trsv",
            Self::SymvHemv => "symv_hemv",
            Self::Ger => "ger",
        }
    }

    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.test_name() == token)
    }

    /// Routine name without the type prefix; symv/hemv splits on complexity.
    #[must_use]
    pub const fn routine_name(self, kind: NumericKind) -> &'static str {
        match self {
            Self::SymvHemv if kind.is_complex() => "hemv",
            Self::SymvHemv => "symv",
            other => other.test_name(),
        }
    }

    /// `ger` is only defined for real kinds here; complex rank-1 updates
    /// would need the separate geru/gerc entry points.
    #[must_use]
    pub const fn applies_to(self, kind: NumericKind) -> bool {
        match self {
            Self::Ger => !kind.is_complex(),
            _ => true,
        }
    }

    #[must_use]
    pub fn symbol(self, kind: NumericKind) -> String {
        format!("cblas_{}{}", kind.prefix(), self.routine_name(kind))
    }

    /// Short report label such as `dgemv` or `zsymv_hemv`.
    #[must_use]
    pub fn label(self, kind: NumericKind) -> String {
        format!("{}{}", kind.prefix(), self.test_name())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.test_name())
    }
}

#[derive(Debug)]
pub enum FfiError {
    LibraryLoad { path: PathBuf, detail: String },
    SymbolMissing { symbol: String, detail: String },
    NotApplicable { kind: NumericKind, operation: Operation },
    Unbound { symbol: String },
    DimensionOverflow(&'static str),
    ArgumentContract(LinAlgError),
}

impl FfiError {
    #[must_use]
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::LibraryLoad { .. } => "ffi_library_load_failed",
            Self::SymbolMissing { .. } => "ffi_symbol_missing",
            Self::NotApplicable { .. } => "ffi_not_applicable",
            Self::Unbound { .. } => "ffi_routine_unbound",
            Self::DimensionOverflow(_) => "ffi_dimension_overflow",
            Self::ArgumentContract(_) => "ffi_argument_contract_violation",
        }
    }
}

impl fmt::Display for FfiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LibraryLoad { path, detail } => {
                write!(f, "failed loading {}: {detail}", path.display())
            }
            Self::SymbolMissing { symbol, detail } => {
                write!(f, "symbol {symbol} not found: {detail}")
            }
            Self::NotApplicable { kind, operation } => {
                write!(f, "{operation} is not defined for {kind}")
            }
            Self::Unbound { symbol } => write!(f, "{symbol} was not bound in this routine table"),
            Self::DimensionOverflow(what) => write!(f, "{what} does not fit in a C int"),
            Self::ArgumentContract(err) => write!(f, "argument contract violated: {err}"),
        }
    }
}

impl std::error::Error for FfiError {}

impl From<LinAlgError> for FfiError {
    fn from(err: LinAlgError) -> Self {
        Self::ArgumentContract(err)
    }
}

/// Element types that can cross the CBLAS boundary.
pub trait CblasElement: BlasElement {
    /// How alpha/beta are passed: `Self` for real kinds, `*const Self` for
    /// complex kinds.
    type Scalar: Copy;

    const CONVENTION: ScalarConvention;

    /// The argument for `value`. For complex kinds the pointer borrows
    /// `value`, which must stay alive until the foreign call returns.
    fn scalar_arg(value: &Self) -> Self::Scalar;
}

impl CblasElement for f32 {
    type Scalar = f32;
    const CONVENTION: ScalarConvention = ScalarConvention::ByValue;

    fn scalar_arg(value: &Self) -> f32 {
        *value
    }
}

impl CblasElement for f64 {
    type Scalar = f64;
    const CONVENTION: ScalarConvention = ScalarConvention::ByValue;

    fn scalar_arg(value: &Self) -> f64 {
        *value
    }
}

impl CblasElement for Complex<f32> {
    type Scalar = *const Complex<f32>;
    const CONVENTION: ScalarConvention = ScalarConvention::ByReference;

    fn scalar_arg(value: &Self) -> Self::Scalar {
        value
    }
}

impl CblasElement for Complex<f64> {
    type Scalar = *const Complex<f64>;
    const CONVENTION: ScalarConvention = ScalarConvention::ByReference;

    fn scalar_arg(value: &Self) -> Self::Scalar {
        value
    }
}

pub type ScalarArg<E> = <E as CblasElement>::Scalar;

pub type GemvFn<E> = unsafe extern "C" fn(
    c_int, // layout
    c_int, // trans
    c_int, // m
    c_int, // n
    ScalarArg<E>, // alpha
    *const E, // a
    c_int, // lda
    *const E, // x
    c_int, // incx
    ScalarArg<E>, // beta
    *mut E, // y
    c_int, // incy
);

pub type GbmvFn<E> = unsafe extern "C" fn(
    c_int, // layout
    c_int, // trans
    c_int, // m
    c_int, // n
    c_int, // kl
    c_int, // ku
    ScalarArg<E>, // alpha
    *const E, // a
    c_int, // lda
    *const E, // x
    c_int, // incx
    ScalarArg<E>, // beta
    *mut E, // y
    c_int, // incy
);

/// Shared by trmv and trsv.
pub type TriangularFn<E> = unsafe extern "C" fn(
    c_int, // layout
    c_int, // uplo
    c_int, // trans
    c_int, // diag
    c_int, // n
    *const E, // a
    c_int, // lda
    *mut E, // x
    c_int, // incx
);

/// symv for real kinds, hemv for complex kinds.
pub type SymmetricFn<E> = unsafe extern "C" fn(
    c_int, // layout
    c_int, // uplo
    c_int, // n
    ScalarArg<E>, // alpha
    *const E, // a
    c_int, // lda
    *const E, // x
    c_int, // incx
    ScalarArg<E>, // beta
    *mut E, // y
    c_int, // incy
);

pub type GerFn<E> = unsafe extern "C" fn(
    c_int, // layout
    c_int, // m
    c_int, // n
    ScalarArg<E>, // alpha
    *const E, // x
    c_int, // incx
    *const E, // y
    c_int, // incy
    *mut E, // a
    c_int, // lda
);

/// A loaded BLAS shared library.
#[derive(Debug)]
pub struct BlasLibrary {
    path: PathBuf,
    library: libloading::Library,
}

impl BlasLibrary {
    /// Loads the library at `path`. Its initializers run here, so this must
    /// only happen in a process that is allowed to die with the library.
    pub fn open(path: &Path) -> Result<Self, FfiError> {
        // SAFETY: loading runs the library's initialization routines; the
        // harness only does this inside disposable child processes.
        let library = unsafe { libloading::Library::new(path) }.map_err(|err| {
            FfiError::LibraryLoad {
                path: path.to_path_buf(),
                detail: err.to_string(),
            }
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            library,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// # Safety
    ///
    /// `F` must be the exact fn-pointer type of the exported symbol.
    unsafe fn resolve<F: Copy>(&self, symbol: &str) -> Result<F, FfiError> {
        // SAFETY: forwarded to the caller.
        let resolved = unsafe { self.library.get::<F>(symbol.as_bytes()) };
        resolved
            .map(|sym| *sym)
            .map_err(|err| FfiError::SymbolMissing {
                symbol: symbol.to_string(),
                detail: err.to_string(),
            })
    }
}

/// What one table slot is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineDescriptor {
    pub kind: NumericKind,
    pub operation: Operation,
    pub symbol: String,
    pub scalar_convention: ScalarConvention,
}

impl RoutineDescriptor {
    #[must_use]
    pub fn new(kind: NumericKind, operation: Operation) -> Self {
        Self {
            kind,
            operation,
            symbol: operation.symbol(kind),
            scalar_convention: kind.scalar_convention(),
        }
    }
}

/// Level-2 routines over element type `E`, with unit vector strides and
/// row-major storage. Implemented by [`CblasRoutines`] for a loaded library;
/// the trait is the seam the conformance checks are written against.
#[allow(clippy::too_many_arguments)]
pub trait Level2Routines<E: BlasElement>: Sync {
    fn gemv(
        &self,
        trans: Transpose,
        m: usize,
        n: usize,
        alpha: E,
        a: &[E],
        lda: usize,
        x: &[E],
        beta: E,
        y: &mut [E],
    ) -> Result<(), FfiError>;

    fn gbmv(
        &self,
        trans: Transpose,
        m: usize,
        n: usize,
        kl: usize,
        ku: usize,
        alpha: E,
        a: &[E],
        lda: usize,
        x: &[E],
        beta: E,
        y: &mut [E],
    ) -> Result<(), FfiError>;

    fn trmv(
        &self,
        uplo: Uplo,
        trans: Transpose,
        diag: Diag,
        n: usize,
        a: &[E],
        lda: usize,
        x: &mut [E],
    ) -> Result<(), FfiError>;

    fn trsv(
        &self,
        uplo: Uplo,
        trans: Transpose,
        diag: Diag,
        n: usize,
        a: &[E],
        lda: usize,
        x: &mut [E],
    ) -> Result<(), FfiError>;

    /// symv for real element types, hemv for complex ones.
    fn symv_hemv(
        &self,
        uplo: Uplo,
        n: usize,
        alpha: E,
        a: &[E],
        lda: usize,
        x: &[E],
        beta: E,
        y: &mut [E],
    ) -> Result<(), FfiError>;

    fn ger(
        &self,
        m: usize,
        n: usize,
        alpha: E,
        x: &[E],
        y: &[E],
        a: &mut [E],
        lda: usize,
    ) -> Result<(), FfiError>;
}

fn to_cint(value: usize, what: &'static str) -> Result<c_int, FfiError> {
    c_int::try_from(value).map_err(|_| FfiError::DimensionOverflow(what))
}

fn check_len(len: usize, needed: usize, what: &'static str) -> Result<(), FfiError> {
    if len < needed {
        return Err(FfiError::ArgumentContract(
            LinAlgError::ShapeContractViolation(what),
        ));
    }
    Ok(())
}

fn gemv_lengths(trans: Transpose, m: usize, n: usize) -> (usize, usize) {
    match trans {
        Transpose::NoTrans => (n, m),
        Transpose::Trans | Transpose::ConjTrans => (m, n),
    }
}

/// Resolved fn pointers for one element type. Slots are filled only for the
/// operations passed to [`CblasRoutines::bind`]; the table borrows the
/// library so pointers cannot outlive it.
pub struct CblasRoutines<'lib, E: CblasElement> {
    gemv: Option<GemvFn<E>>,
    gbmv: Option<GbmvFn<E>>,
    trmv: Option<TriangularFn<E>>,
    trsv: Option<TriangularFn<E>>,
    symv_hemv: Option<SymmetricFn<E>>,
    ger: Option<GerFn<E>>,
    bound: Vec<RoutineDescriptor>,
    _library: PhantomData<&'lib BlasLibrary>,
}

impl<E: CblasElement> fmt::Debug for CblasRoutines<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CblasRoutines")
            .field("kind", &E::KIND)
            .field("bound", &self.bound)
            .finish()
    }
}

impl<'lib, E: CblasElement> CblasRoutines<'lib, E> {
    /// Resolves `cblas_<prefix><op>` for each requested operation. Fails on
    /// the first missing symbol or on an operation not defined for `E`.
    pub fn bind(library: &'lib BlasLibrary, operations: &[Operation]) -> Result<Self, FfiError> {
        let mut table = Self {
            gemv: None,
            gbmv: None,
            trmv: None,
            trsv: None,
            symv_hemv: None,
            ger: None,
            bound: Vec::with_capacity(operations.len()),
            _library: PhantomData,
        };

        for &operation in operations {
            if !operation.applies_to(E::KIND) {
                return Err(FfiError::NotApplicable {
                    kind: E::KIND,
                    operation,
                });
            }
            let descriptor = RoutineDescriptor::new(E::KIND, operation);
            let symbol = descriptor.symbol.as_str();
            // SAFETY: each alias mirrors the CBLAS prototype of the symbol
            // it is resolved from, for E's element and scalar types.
            unsafe {
                match operation {
                    Operation::Gemv => table.gemv = Some(library.resolve(symbol)?),
                    Operation::Gbmv => table.gbmv = Some(library.resolve(symbol)?),
                    Operation::Trmv => table.trmv = Some(library.resolve(symbol)?),
                    Operation::Trsv => table.trsv = Some(library.resolve(symbol)?),
                    Operation::SymvHemv => table.symv_hemv = Some(library.resolve(symbol)?),
                    Operation::Ger => table.ger = Some(library.resolve(symbol)?),
                }
            }
            table.bound.push(descriptor);
        }
        Ok(table)
    }

    #[must_use]
    pub fn descriptors(&self) -> &[RoutineDescriptor] {
        &self.bound
    }

    fn unbound(operation: Operation) -> FfiError {
        FfiError::Unbound {
            symbol: operation.symbol(E::KIND),
        }
    }
}

impl<E: CblasElement> Level2Routines<E> for CblasRoutines<'_, E> {
    fn gemv(
        &self,
        trans: Transpose,
        m: usize,
        n: usize,
        alpha: E,
        a: &[E],
        lda: usize,
        x: &[E],
        beta: E,
        y: &mut [E],
    ) -> Result<(), FfiError> {
        let f = self.gemv.ok_or_else(|| Self::unbound(Operation::Gemv))?;
        validate_dense(m, n, lda, a.len())?;
        let (x_len, y_len) = gemv_lengths(trans, m, n);
        check_len(x.len(), x_len, "gemv x shorter than op(A) columns")?;
        check_len(y.len(), y_len, "gemv y shorter than op(A) rows")?;
        let (m, n, lda) = (to_cint(m, "m")?, to_cint(n, "n")?, to_cint(lda, "lda")?);
        let (alpha, beta) = (E::scalar_arg(&alpha), E::scalar_arg(&beta));
        // SAFETY: extents checked above; alpha/beta borrow locals that
        // outlive the call.
        unsafe {
            f(
                CBLAS_ROW_MAJOR,
                cblas_transpose(trans),
                m,
                n,
                alpha,
                a.as_ptr(),
                lda,
                x.as_ptr(),
                1,
                beta,
                y.as_mut_ptr(),
                1,
            );
        }
        Ok(())
    }

    fn gbmv(
        &self,
        trans: Transpose,
        m: usize,
        n: usize,
        kl: usize,
        ku: usize,
        alpha: E,
        a: &[E],
        lda: usize,
        x: &[E],
        beta: E,
        y: &mut [E],
    ) -> Result<(), FfiError> {
        let f = self.gbmv.ok_or_else(|| Self::unbound(Operation::Gbmv))?;
        validate_band(m, kl, ku, lda, a.len())?;
        let (x_len, y_len) = gemv_lengths(trans, m, n);
        check_len(x.len(), x_len, "gbmv x shorter than op(A) columns")?;
        check_len(y.len(), y_len, "gbmv y shorter than op(A) rows")?;
        let (m, n) = (to_cint(m, "m")?, to_cint(n, "n")?);
        let (kl, ku, lda) = (to_cint(kl, "kl")?, to_cint(ku, "ku")?, to_cint(lda, "lda")?);
        let (alpha, beta) = (E::scalar_arg(&alpha), E::scalar_arg(&beta));
        // SAFETY: band extent checked above; alpha/beta outlive the call.
        unsafe {
            f(
                CBLAS_ROW_MAJOR,
                cblas_transpose(trans),
                m,
                n,
                kl,
                ku,
                alpha,
                a.as_ptr(),
                lda,
                x.as_ptr(),
                1,
                beta,
                y.as_mut_ptr(),
                1,
            );
        }
        Ok(())
    }

    fn trmv(
        &self,
        uplo: Uplo,
        trans: Transpose,
        diag: Diag,
        n: usize,
        a: &[E],
        lda: usize,
        x: &mut [E],
    ) -> Result<(), FfiError> {
        let f = self.trmv.ok_or_else(|| Self::unbound(Operation::Trmv))?;
        validate_dense(n, n, lda, a.len())?;
        check_len(x.len(), n, "trmv x shorter than n")?;
        let (n, lda) = (to_cint(n, "n")?, to_cint(lda, "lda")?);
        // SAFETY: extents checked above.
        unsafe {
            f(
                CBLAS_ROW_MAJOR,
                cblas_uplo(uplo),
                cblas_transpose(trans),
                cblas_diag(diag),
                n,
                a.as_ptr(),
                lda,
                x.as_mut_ptr(),
                1,
            );
        }
        Ok(())
    }

    fn trsv(
        &self,
        uplo: Uplo,
        trans: Transpose,
        diag: Diag,
        n: usize,
        a: &[E],
        lda: usize,
        x: &mut [E],
    ) -> Result<(), FfiError> {
        let f = self.trsv.ok_or_else(|| Self::unbound(Operation::Trsv))?;
        validate_dense(n, n, lda, a.len())?;
        check_len(x.len(), n, "trsv x shorter than n")?;
        let (n, lda) = (to_cint(n, "n")?, to_cint(lda, "lda")?);
        // SAFETY: extents checked above.
        unsafe {
            f(
                CBLAS_ROW_MAJOR,
                cblas_uplo(uplo),
                cblas_transpose(trans),
                cblas_diag(diag),
                n,
                a.as_ptr(),
                lda,
                x.as_mut_ptr(),
                1,
            );
        }
        Ok(())
    }

    fn symv_hemv(
        &self,
        uplo: Uplo,
        n: usize,
        alpha: E,
        a: &[E],
        lda: usize,
        x: &[E],
        beta: E,
        y: &mut [E],
    ) -> Result<(), FfiError> {
        let f = self
            .symv_hemv
            .ok_or_else(|| Self::unbound(Operation::SymvHemv))?;
        validate_dense(n, n, lda, a.len())?;
        check_len(x.len(), n, "symv/hemv x shorter than n")?;
        check_len(y.len(), n, "symv/hemv y shorter than n")?;
        let (n, lda) = (to_cint(n, "n")?, to_cint(lda, "lda")?);
        let (alpha, beta) = (E::scalar_arg(&alpha), E::scalar_arg(&beta));
        // SAFETY: extents checked above; alpha/beta outlive the call.
        unsafe {
            f(
                CBLAS_ROW_MAJOR,
                cblas_uplo(uplo),
                n,
                alpha,
                a.as_ptr(),
                lda,
                x.as_ptr(),
                1,
                beta,
                y.as_mut_ptr(),
                1,
            );
        }
        Ok(())
    }

    fn ger(
        &self,
        m: usize,
        n: usize,
        alpha: E,
        x: &[E],
        y: &[E],
        a: &mut [E],
        lda: usize,
    ) -> Result<(), FfiError> {
        let f = self.ger.ok_or_else(|| Self::unbound(Operation::Ger))?;
        validate_dense(m, n, lda, a.len())?;
        check_len(x.len(), m, "ger x shorter than m")?;
        check_len(y.len(), n, "ger y shorter than n")?;
        let (m, n, lda) = (to_cint(m, "m")?, to_cint(n, "n")?, to_cint(lda, "lda")?);
        let alpha = E::scalar_arg(&alpha);
        // SAFETY: extents checked above; alpha outlives the call.
        unsafe {
            f(
                CBLAS_ROW_MAJOR,
                m,
                n,
                alpha,
                x.as_ptr(),
                1,
                y.as_ptr(),
                1,
                a.as_mut_ptr(),
                lda,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BlasLibrary, CBLAS_CONJ_TRANS, CBLAS_NO_TRANS, CBLAS_NON_UNIT, CBLAS_ROW_MAJOR,
        CBLAS_UPPER, CblasElement, FFI_REASON_CODES, FfiError, Operation, RoutineDescriptor,
        cblas_diag, cblas_transpose, cblas_uplo,
    };
    use bl2_dtype::{Complex64, Complex128, NumericKind, ScalarConvention};
    use bl2_linalg::{Diag, LinAlgError, Transpose, Uplo};
    use std::path::Path;

    #[test]
    fn cblas_enum_values_match_the_reference_header() {
        assert_eq!(CBLAS_ROW_MAJOR, 101);
        assert_eq!(cblas_transpose(Transpose::NoTrans), CBLAS_NO_TRANS);
        assert_eq!(cblas_transpose(Transpose::ConjTrans), CBLAS_CONJ_TRANS);
        assert_eq!(cblas_uplo(Uplo::Upper), CBLAS_UPPER);
        assert_eq!(cblas_uplo(Uplo::Lower), 122);
        assert_eq!(cblas_diag(Diag::NonUnit), CBLAS_NON_UNIT);
        assert_eq!(cblas_diag(Diag::Unit), 132);
    }

    #[test]
    fn symbol_table_covers_every_applicable_pair() {
        let mut symbols = Vec::new();
        for kind in NumericKind::ALL {
            for op in Operation::ALL {
                if op.applies_to(kind) {
                    symbols.push(op.symbol(kind));
                }
            }
        }
        assert_eq!(symbols.len(), 22);
        assert!(symbols.contains(&"cblas_dgemv".to_string()));
        assert!(symbols.contains(&"cblas_ssymv".to_string()));
        assert!(symbols.contains(&"cblas_chemv".to_string()));
        assert!(symbols.contains(&"cblas_zhemv".to_string()));
        assert!(symbols.contains(&"cblas_dger".to_string()));
        assert!(!symbols.iter().any(|s| s.starts_with("cblas_cger")));
        assert!(!symbols.iter().any(|s| s.starts_with("cblas_zger")));
    }

    #[test]
    fn operation_tokens_round_trip() {
        for op in Operation::ALL {
            assert_eq!(Operation::parse(op.test_name()), Some(op));
        }
        assert_eq!(Operation::parse("hemv"), None);
        assert_eq!(Operation::SymvHemv.label(NumericKind::Complex128), "zsymv_hemv");
    }

    #[test]
    fn descriptors_record_scalar_convention() {
        let real = RoutineDescriptor::new(NumericKind::Real64, Operation::Gemv);
        assert_eq!(real.symbol, "cblas_dgemv");
        assert_eq!(real.scalar_convention, ScalarConvention::ByValue);
        let complex = RoutineDescriptor::new(NumericKind::Complex64, Operation::SymvHemv);
        assert_eq!(complex.symbol, "cblas_chemv");
        assert_eq!(complex.scalar_convention, ScalarConvention::ByReference);
    }

    #[test]
    fn complex_scalars_are_passed_by_address() {
        let alpha = Complex128::new(1.0, -2.0);
        let arg = <Complex128 as CblasElement>::scalar_arg(&alpha);
        assert!(core::ptr::eq(arg, &alpha));
        assert_eq!(<Complex64 as CblasElement>::CONVENTION, ScalarConvention::ByReference);
        assert_eq!(<f32 as CblasElement>::scalar_arg(&3.5), 3.5);
    }

    #[test]
    fn opening_a_missing_library_is_a_load_error() {
        let err = BlasLibrary::open(Path::new("/nonexistent/libblas-l2-missing.so"))
            .expect_err("missing library should not load");
        assert_eq!(err.reason_code(), FFI_REASON_CODES[0]);
        assert!(err.to_string().contains("libblas-l2-missing"));
    }

    #[test]
    fn argument_errors_carry_linalg_detail() {
        let err = FfiError::from(LinAlgError::ShapeContractViolation("x too short"));
        assert_eq!(err.reason_code(), "ffi_argument_contract_violation");
        assert!(err.to_string().contains("x too short"));
        let err = FfiError::NotApplicable {
            kind: NumericKind::Complex64,
            operation: Operation::Ger,
        };
        assert_eq!(err.to_string(), "ger is not defined for complex64");
    }
}

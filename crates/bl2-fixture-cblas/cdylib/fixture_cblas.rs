//! Row-major, unit-stride CBLAS Level-2 routines for the conformance tests.
//! Any other layout, stride, enum value or short leading dimension aborts the
//! process.

use std::ffi::c_int;
use std::ops::{Add, Div, Mul, Sub};
use std::process::abort;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

const ROW_MAJOR: c_int = 101;
const NO_TRANS: c_int = 111;
const TRANS: c_int = 112;
const CONJ_TRANS: c_int = 113;
const UPPER: c_int = 121;
const LOWER: c_int = 122;
const NON_UNIT: c_int = 131;
const UNIT: c_int = 132;

const FAULT_ENV: &str = "BL2_FIXTURE_FAULT";

trait Elem:
    Copy + Add<Output = Self> + Sub<Output = Self> + Mul<Output = Self> + Div<Output = Self>
{
    const ZERO: Self;
    const ONE: Self;

    fn conj(self) -> Self;

    fn real_part(self) -> Self;

    fn is_zero(self) -> bool;
}

macro_rules! real_elem {
    ($t:ty) => {
        impl Elem for $t {
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;

            fn conj(self) -> Self {
                self
            }

            fn real_part(self) -> Self {
                self
            }

            fn is_zero(self) -> bool {
                self == 0.0
            }
        }
    };
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct Cx<T> {
    re: T,
    im: T,
}

macro_rules! complex_elem {
    ($t:ty) => {
        impl Add for Cx<$t> {
            type Output = Self;

            fn add(self, rhs: Self) -> Self {
                Cx { re: self.re + rhs.re, im: self.im + rhs.im }
            }
        }

        impl Sub for Cx<$t> {
            type Output = Self;

            fn sub(self, rhs: Self) -> Self {
                Cx { re: self.re - rhs.re, im: self.im - rhs.im }
            }
        }

        impl Mul for Cx<$t> {
            type Output = Self;

            fn mul(self, rhs: Self) -> Self {
                Cx {
                    re: self.re * rhs.re - self.im * rhs.im,
                    im: self.re * rhs.im + self.im * rhs.re,
                }
            }
        }

        impl Div for Cx<$t> {
            type Output = Self;

            fn div(self, rhs: Self) -> Self {
                let denom = rhs.re * rhs.re + rhs.im * rhs.im;
                Cx {
                    re: (self.re * rhs.re + self.im * rhs.im) / denom,
                    im: (self.im * rhs.re - self.re * rhs.im) / denom,
                }
            }
        }

        impl Elem for Cx<$t> {
            const ZERO: Self = Cx { re: 0.0, im: 0.0 };
            const ONE: Self = Cx { re: 1.0, im: 0.0 };

            fn conj(self) -> Self {
                Cx { re: self.re, im: -self.im }
            }

            fn real_part(self) -> Self {
                Cx { re: self.re, im: 0.0 }
            }

            fn is_zero(self) -> bool {
                self.re == 0.0 && self.im == 0.0
            }
        }
    };
}

real_elem!(f32);
real_elem!(f64);
complex_elem!(f32);
complex_elem!(f64);

type C32 = Cx<f32>;
type C64 = Cx<f64>;

/// alpha/beta as they arrive: by value for real kinds, by address for complex.
trait ScalarArg: Copy {
    type Elem: Elem;

    /// # Safety
    ///
    /// A pointer argument must be readable.
    unsafe fn value(self) -> Self::Elem;
}

impl ScalarArg for f32 {
    type Elem = f32;

    unsafe fn value(self) -> f32 {
        self
    }
}

impl ScalarArg for f64 {
    type Elem = f64;

    unsafe fn value(self) -> f64 {
        self
    }
}

impl<T: Copy> ScalarArg for *const Cx<T>
where
    Cx<T>: Elem,
{
    type Elem = Cx<T>;

    unsafe fn value(self) -> Cx<T> {
        require(!self.is_null());
        // SAFETY: non-null and readable per the caller.
        unsafe { self.read() }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Op {
    NoTrans,
    Trans,
    ConjTrans,
}

fn require(ok: bool) {
    if !ok {
        abort();
    }
}

fn row_major(layout: c_int) {
    require(layout == ROW_MAJOR);
}

fn unit_stride(inc: c_int) {
    require(inc == 1);
}

fn transpose(value: c_int) -> Op {
    match value {
        NO_TRANS => Op::NoTrans,
        TRANS => Op::Trans,
        CONJ_TRANS => Op::ConjTrans,
        _ => abort(),
    }
}

fn is_upper(value: c_int) -> bool {
    match value {
        UPPER => true,
        LOWER => false,
        _ => abort(),
    }
}

fn is_unit(value: c_int) -> bool {
    match value {
        UNIT => true,
        NON_UNIT => false,
        _ => abort(),
    }
}

fn dim(value: c_int) -> usize {
    usize::try_from(value).unwrap_or_else(|_| abort())
}

/// Elements a row-major `rows x cols` matrix with leading dimension `lda`
/// spans.
fn extent(rows: usize, cols: usize, lda: usize) -> usize {
    if rows == 0 || cols == 0 {
        0
    } else {
        (rows - 1) * lda + cols
    }
}

/// # Safety
///
/// `ptr` must be valid for `len` reads.
unsafe fn view<'a, T>(ptr: *const T, len: usize) -> &'a [T] {
    if len == 0 {
        return &[];
    }
    require(!ptr.is_null());
    // SAFETY: forwarded to the caller.
    unsafe { std::slice::from_raw_parts(ptr, len) }
}

/// # Safety
///
/// `ptr` must be valid for `len` writes and not aliased.
unsafe fn view_mut<'a, T>(ptr: *mut T, len: usize) -> &'a mut [T] {
    if len == 0 {
        return &mut [];
    }
    require(!ptr.is_null());
    // SAFETY: forwarded to the caller.
    unsafe { std::slice::from_raw_parts_mut(ptr, len) }
}

fn update<T: Elem>(product: T, beta: T, old: T) -> T {
    if beta.is_zero() {
        product
    } else {
        product + beta * old
    }
}

fn oriented<T: Elem>(value: T, op: Op) -> T {
    if op == Op::ConjTrans { value.conj() } else { value }
}

/// `op(A)` dimensions and the `(row, col)` of `A` behind `op(A)[r][c]`.
fn op_shape(op: Op, m: usize, n: usize) -> (usize, usize) {
    if op == Op::NoTrans { (m, n) } else { (n, m) }
}

fn source_index(op: Op, r: usize, c: usize) -> (usize, usize) {
    if op == Op::NoTrans { (r, c) } else { (c, r) }
}

#[allow(clippy::too_many_arguments)]
fn gemv<T: Elem>(op: Op, m: usize, n: usize, alpha: T, a: &[T], lda: usize, x: &[T], beta: T, y: &mut [T]) {
    let (rows, cols) = op_shape(op, m, n);
    for r in 0..rows {
        let mut sum = T::ZERO;
        for (c, &xc) in x.iter().enumerate().take(cols) {
            let (i, j) = source_index(op, r, c);
            sum = sum + oriented(a[i * lda + j], op) * xc;
        }
        y[r] = update(alpha * sum, beta, y[r]);
    }
}

#[allow(clippy::too_many_arguments)]
fn gbmv<T: Elem>(
    op: Op,
    m: usize,
    n: usize,
    kl: usize,
    ku: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    x: &[T],
    beta: T,
    y: &mut [T],
) {
    let (rows, cols) = op_shape(op, m, n);
    for r in 0..rows {
        let mut sum = T::ZERO;
        for (c, &xc) in x.iter().enumerate().take(cols) {
            let (i, j) = source_index(op, r, c);
            if j + kl >= i && j <= i + ku {
                sum = sum + oriented(a[i * lda + kl + j - i], op) * xc;
            }
        }
        y[r] = update(alpha * sum, beta, y[r]);
    }
}

struct Triangle<'a, T> {
    a: &'a [T],
    lda: usize,
    upper: bool,
    unit: bool,
    op: Op,
}

impl<T: Elem> Triangle<'_, T> {
    fn get(&self, r: usize, c: usize) -> T {
        let (i, j) = source_index(self.op, r, c);
        if i == j && self.unit {
            return T::ONE;
        }
        let stored = if self.upper { j >= i } else { j <= i };
        if stored {
            oriented(self.a[i * self.lda + j], self.op)
        } else {
            T::ZERO
        }
    }

    /// Whether `op(A)` is upper triangular.
    fn solves_backward(&self) -> bool {
        self.upper == (self.op == Op::NoTrans)
    }
}

fn trmv<T: Elem>(tri: &Triangle<'_, T>, n: usize, x: &mut [T]) {
    let input = x.to_vec();
    for (r, out) in x.iter_mut().enumerate().take(n) {
        let mut sum = T::ZERO;
        for (c, &xc) in input.iter().enumerate() {
            sum = sum + tri.get(r, c) * xc;
        }
        *out = sum;
    }
}

fn trsv<T: Elem>(tri: &Triangle<'_, T>, n: usize, x: &mut [T]) {
    if tri.solves_backward() {
        for r in (0..n).rev() {
            let mut acc = x[r];
            for c in r + 1..n {
                acc = acc - tri.get(r, c) * x[c];
            }
            x[r] = acc / tri.get(r, r);
        }
    } else {
        for r in 0..n {
            let mut acc = x[r];
            for c in 0..r {
                acc = acc - tri.get(r, c) * x[c];
            }
            x[r] = acc / tri.get(r, r);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn symmetric<T: Elem>(
    hermitian: bool,
    upper: bool,
    n: usize,
    alpha: T,
    a: &[T],
    lda: usize,
    x: &[T],
    beta: T,
    y: &mut [T],
) {
    for r in 0..n {
        let mut sum = T::ZERO;
        for c in 0..n {
            let stored = if upper { c >= r } else { c <= r };
            let entry = if r == c && hermitian {
                a[r * lda + c].real_part()
            } else if stored {
                a[r * lda + c]
            } else if hermitian {
                a[c * lda + r].conj()
            } else {
                a[c * lda + r]
            };
            sum = sum + entry * x[c];
        }
        y[r] = update(alpha * sum, beta, y[r]);
    }
}

#[allow(clippy::too_many_arguments)]
unsafe fn gemv_entry<S: ScalarArg>(
    layout: c_int,
    trans: c_int,
    m: c_int,
    n: c_int,
    alpha: S,
    a: *const S::Elem,
    lda: c_int,
    x: *const S::Elem,
    incx: c_int,
    beta: S,
    y: *mut S::Elem,
    incy: c_int,
) {
    row_major(layout);
    let op = transpose(trans);
    let (m, n, lda) = (dim(m), dim(n), dim(lda));
    require(lda >= n.max(1));
    unit_stride(incx);
    unit_stride(incy);
    let (rows, cols) = op_shape(op, m, n);
    // SAFETY: extents follow from the dimensions checked above.
    unsafe {
        let (alpha, beta) = (alpha.value(), beta.value());
        let a = view(a, extent(m, n, lda));
        let x = view(x, cols);
        let y = view_mut(y, rows);
        gemv(op, m, n, alpha, a, lda, x, beta, y);
    }
}

#[allow(clippy::too_many_arguments)]
unsafe fn gbmv_entry<S: ScalarArg>(
    layout: c_int,
    trans: c_int,
    m: c_int,
    n: c_int,
    kl: c_int,
    ku: c_int,
    alpha: S,
    a: *const S::Elem,
    lda: c_int,
    x: *const S::Elem,
    incx: c_int,
    beta: S,
    y: *mut S::Elem,
    incy: c_int,
) {
    row_major(layout);
    let op = transpose(trans);
    let (m, n, kl, ku, lda) = (dim(m), dim(n), dim(kl), dim(ku), dim(lda));
    require(lda > kl + ku);
    unit_stride(incx);
    unit_stride(incy);
    let (rows, cols) = op_shape(op, m, n);
    // SAFETY: extents follow from the dimensions checked above.
    unsafe {
        let (alpha, beta) = (alpha.value(), beta.value());
        let a = view(a, extent(m, kl + ku + 1, lda));
        let x = view(x, cols);
        let y = view_mut(y, rows);
        gbmv(op, m, n, kl, ku, alpha, a, lda, x, beta, y);
    }
}

#[allow(clippy::too_many_arguments)]
unsafe fn triangular_entry<T: Elem>(
    solve: bool,
    layout: c_int,
    uplo: c_int,
    trans: c_int,
    diag: c_int,
    n: c_int,
    a: *const T,
    lda: c_int,
    x: *mut T,
    incx: c_int,
) {
    row_major(layout);
    let (upper, op, unit) = (is_upper(uplo), transpose(trans), is_unit(diag));
    let (n, lda) = (dim(n), dim(lda));
    require(lda >= n.max(1));
    unit_stride(incx);
    // SAFETY: extents follow from the dimensions checked above.
    let (a, x) = unsafe { (view(a, extent(n, n, lda)), view_mut(x, n)) };
    let tri = Triangle {
        a,
        lda,
        upper,
        unit,
        op,
    };
    if solve {
        trsv(&tri, n, x);
    } else {
        trmv(&tri, n, x);
    }
}

#[allow(clippy::too_many_arguments)]
unsafe fn symmetric_entry<S: ScalarArg>(
    hermitian: bool,
    layout: c_int,
    uplo: c_int,
    n: c_int,
    alpha: S,
    a: *const S::Elem,
    lda: c_int,
    x: *const S::Elem,
    incx: c_int,
    beta: S,
    y: *mut S::Elem,
    incy: c_int,
) {
    row_major(layout);
    let upper = is_upper(uplo);
    let (n, lda) = (dim(n), dim(lda));
    require(lda >= n.max(1));
    unit_stride(incx);
    unit_stride(incy);
    // SAFETY: extents follow from the dimensions checked above.
    unsafe {
        let (alpha, beta) = (alpha.value(), beta.value());
        let a = view(a, extent(n, n, lda));
        let x = view(x, n);
        let y = view_mut(y, n);
        symmetric(hermitian, upper, n, alpha, a, lda, x, beta, y);
    }
}

#[allow(clippy::too_many_arguments)]
unsafe fn ger_entry<T: Elem>(
    layout: c_int,
    m: c_int,
    n: c_int,
    alpha: T,
    x: *const T,
    incx: c_int,
    y: *const T,
    incy: c_int,
    a: *mut T,
    lda: c_int,
) {
    row_major(layout);
    let (m, n, lda) = (dim(m), dim(n), dim(lda));
    require(lda >= n.max(1));
    unit_stride(incx);
    unit_stride(incy);
    // SAFETY: extents follow from the dimensions checked above.
    let (x, y, a) = unsafe { (view(x, m), view(y, n), view_mut(a, extent(m, n, lda))) };
    for i in 0..m {
        for j in 0..n {
            a[i * lda + j] = a[i * lda + j] + alpha * x[i] * y[j];
        }
    }
}

static SCRATCH: [AtomicU64; 64] = [const { AtomicU64::new(0) }; 64];

/// Routes `y` through [`SCRATCH`]: clear, accumulate, copy back, with pauses
/// in between. Any other caller inside the window adds its own values.
fn through_shared_scratch(y: &mut [f64]) {
    require(y.len() <= SCRATCH.len());
    let slots = &SCRATCH[..y.len()];
    for slot in slots {
        slot.store(0.0_f64.to_bits(), Ordering::Relaxed);
    }
    thread::sleep(Duration::from_millis(2));
    for (slot, value) in slots.iter().zip(y.iter()) {
        let current = f64::from_bits(slot.load(Ordering::Relaxed));
        slot.store((current + value).to_bits(), Ordering::Relaxed);
    }
    thread::sleep(Duration::from_millis(2));
    for (value, slot) in y.iter_mut().zip(slots) {
        *value = f64::from_bits(slot.load(Ordering::Relaxed));
    }
}

fn segfault() -> ! {
    // Page zero is never mapped.
    let unmapped = std::ptr::without_provenance_mut::<f64>(0x100);
    // SAFETY: none; the fault is the point.
    unsafe { unmapped.write_volatile(1.0) };
    abort()
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn cblas_sgemv(
    layout: c_int,
    trans: c_int,
    m: c_int,
    n: c_int,
    alpha: f32,
    a: *const f32,
    lda: c_int,
    x: *const f32,
    incx: c_int,
    beta: f32,
    y: *mut f32,
    incy: c_int,
) {
    // SAFETY: CBLAS contract.
    unsafe { gemv_entry(layout, trans, m, n, alpha, a, lda, x, incx, beta, y, incy) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn cblas_dgemv(
    layout: c_int,
    trans: c_int,
    m: c_int,
    n: c_int,
    alpha: f64,
    a: *const f64,
    lda: c_int,
    x: *const f64,
    incx: c_int,
    beta: f64,
    y: *mut f64,
    incy: c_int,
) {
    let fault = std::env::var(FAULT_ENV).unwrap_or_default();
    match fault.as_str() {
        "segv_dgemv" => segfault(),
        "stale_dgemv" => {}
        "racy_dgemv" => {
            // SAFETY: CBLAS contract; `y` spans op(A) rows once validated.
            unsafe {
                gemv_entry(layout, trans, m, n, alpha, a, lda, x, incx, beta, y, incy);
                let (rows, _) = op_shape(transpose(trans), dim(m), dim(n));
                through_shared_scratch(view_mut(y, rows));
            }
        }
        // SAFETY: CBLAS contract.
        _ => unsafe { gemv_entry(layout, trans, m, n, alpha, a, lda, x, incx, beta, y, incy) },
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn cblas_cgemv(
    layout: c_int,
    trans: c_int,
    m: c_int,
    n: c_int,
    alpha: *const C32,
    a: *const C32,
    lda: c_int,
    x: *const C32,
    incx: c_int,
    beta: *const C32,
    y: *mut C32,
    incy: c_int,
) {
    // SAFETY: CBLAS contract.
    unsafe { gemv_entry(layout, trans, m, n, alpha, a, lda, x, incx, beta, y, incy) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn cblas_zgemv(
    layout: c_int,
    trans: c_int,
    m: c_int,
    n: c_int,
    alpha: *const C64,
    a: *const C64,
    lda: c_int,
    x: *const C64,
    incx: c_int,
    beta: *const C64,
    y: *mut C64,
    incy: c_int,
) {
    // SAFETY: CBLAS contract.
    unsafe { gemv_entry(layout, trans, m, n, alpha, a, lda, x, incx, beta, y, incy) }
}

/// gbmv, trmv, trsv and symv/hemv for one element type.
macro_rules! export_level2 {
    (
        $elem:ty, $scalar:ty, hermitian = $hermitian:literal,
        $gbmv:ident, $trmv:ident, $trsv:ident, $symmetric:ident
    ) => {
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $gbmv(
            layout: c_int,
            trans: c_int,
            m: c_int,
            n: c_int,
            kl: c_int,
            ku: c_int,
            alpha: $scalar,
            a: *const $elem,
            lda: c_int,
            x: *const $elem,
            incx: c_int,
            beta: $scalar,
            y: *mut $elem,
            incy: c_int,
        ) {
            // SAFETY: CBLAS contract.
            unsafe {
                gbmv_entry(layout, trans, m, n, kl, ku, alpha, a, lda, x, incx, beta, y, incy)
            }
        }

        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $trmv(
            layout: c_int,
            uplo: c_int,
            trans: c_int,
            diag: c_int,
            n: c_int,
            a: *const $elem,
            lda: c_int,
            x: *mut $elem,
            incx: c_int,
        ) {
            // SAFETY: CBLAS contract.
            unsafe { triangular_entry(false, layout, uplo, trans, diag, n, a, lda, x, incx) }
        }

        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $trsv(
            layout: c_int,
            uplo: c_int,
            trans: c_int,
            diag: c_int,
            n: c_int,
            a: *const $elem,
            lda: c_int,
            x: *mut $elem,
            incx: c_int,
        ) {
            // SAFETY: CBLAS contract.
            unsafe { triangular_entry(true, layout, uplo, trans, diag, n, a, lda, x, incx) }
        }

        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $symmetric(
            layout: c_int,
            uplo: c_int,
            n: c_int,
            alpha: $scalar,
            a: *const $elem,
            lda: c_int,
            x: *const $elem,
            incx: c_int,
            beta: $scalar,
            y: *mut $elem,
            incy: c_int,
        ) {
            // SAFETY: CBLAS contract.
            unsafe {
                symmetric_entry(
                    $hermitian, layout, uplo, n, alpha, a, lda, x, incx, beta, y, incy,
                )
            }
        }
    };
}

export_level2!(f32, f32, hermitian = false, cblas_sgbmv, cblas_strmv, cblas_strsv, cblas_ssymv);
export_level2!(f64, f64, hermitian = false, cblas_dgbmv, cblas_dtrmv, cblas_dtrsv, cblas_dsymv);
export_level2!(C32, *const C32, hermitian = true, cblas_cgbmv, cblas_ctrmv, cblas_ctrsv, cblas_chemv);
export_level2!(C64, *const C64, hermitian = true, cblas_zgbmv, cblas_ztrmv, cblas_ztrsv, cblas_zhemv);

#[unsafe(no_mangle)]
pub unsafe extern "C" fn cblas_sger(
    layout: c_int,
    m: c_int,
    n: c_int,
    alpha: f32,
    x: *const f32,
    incx: c_int,
    y: *const f32,
    incy: c_int,
    a: *mut f32,
    lda: c_int,
) {
    // SAFETY: CBLAS contract.
    unsafe { ger_entry(layout, m, n, alpha, x, incx, y, incy, a, lda) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn cblas_dger(
    layout: c_int,
    m: c_int,
    n: c_int,
    alpha: f64,
    x: *const f64,
    incx: c_int,
    y: *const f64,
    incy: c_int,
    a: *mut f64,
    lda: c_int,
) {
    // SAFETY: CBLAS contract.
    unsafe { ger_entry(layout, m, n, alpha, x, incx, y, incy, a, lda) }
}

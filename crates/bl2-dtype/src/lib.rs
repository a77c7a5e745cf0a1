#![forbid(unsafe_code)]

use core::fmt;
use core::ops::{Add, Div, Mul, Neg, Sub};

/// Element kinds exercised by the Level-2 conformance matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NumericKind {
    Real32,
    Real64,
    Complex64,
    Complex128,
}

impl NumericKind {
    /// Matrix order used by the report: s, d, c, z.
    pub const ALL: [Self; 4] = [Self::Real32, Self::Real64, Self::Complex64, Self::Complex128];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Real32 => "real32",
            Self::Real64 => "real64",
            Self::Complex64 => "complex64",
            Self::Complex128 => "complex128",
        }
    }

    /// BLAS routine prefix letter.
    #[must_use]
    pub const fn prefix(self) -> char {
        match self {
            Self::Real32 => 's',
            Self::Real64 => 'd',
            Self::Complex64 => 'c',
            Self::Complex128 => 'z',
        }
    }

    #[must_use]
    pub const fn item_size(self) -> usize {
        match self {
            Self::Real32 => 4,
            Self::Real64 | Self::Complex64 => 8,
            Self::Complex128 => 16,
        }
    }

    #[must_use]
    pub const fn is_complex(self) -> bool {
        matches!(self, Self::Complex64 | Self::Complex128)
    }

    /// How alpha/beta coefficients cross the CBLAS boundary for this kind.
    #[must_use]
    pub const fn scalar_convention(self) -> ScalarConvention {
        if self.is_complex() {
            ScalarConvention::ByReference
        } else {
            ScalarConvention::ByValue
        }
    }

    #[must_use]
    pub fn from_prefix(token: &str) -> Option<Self> {
        match token {
            "s" | "S" => Some(Self::Real32),
            "d" | "D" => Some(Self::Real64),
            "c" | "C" => Some(Self::Complex64),
            "z" | "Z" => Some(Self::Complex128),
            _ => None,
        }
    }

    /// Accepts prefixes, long names and the short `f32`/`c8` aliases.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        if let Some(kind) = Self::from_prefix(name) {
            return Some(kind);
        }
        match name {
            "real32" | "f32" | "float32" => Some(Self::Real32),
            "real64" | "f64" | "float64" => Some(Self::Real64),
            "complex64" | "c8" => Some(Self::Complex64),
            "complex128" | "c16" => Some(Self::Complex128),
            _ => None,
        }
    }
}

impl fmt::Display for NumericKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarConvention {
    ByValue,
    ByReference,
}

/// Packed real/imaginary pair, laid out exactly as the C `float _Complex`
/// and `double _Complex` element types.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex<T> {
    pub re: T,
    pub im: T,
}

impl<T> Complex<T> {
    #[must_use]
    pub const fn new(re: T, im: T) -> Self {
        Self { re, im }
    }
}

pub type Complex64 = Complex<f32>;
pub type Complex128 = Complex<f64>;

impl<T: Add<Output = T>> Add for Complex<T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl<T: Sub<Output = T>> Sub for Complex<T> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl<T> Mul for Complex<T>
where
    T: Copy + Add<Output = T> + Sub<Output = T> + Mul<Output = T>,
{
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.re * rhs.re - self.im * rhs.im,
            self.re * rhs.im + self.im * rhs.re,
        )
    }
}

impl<T> Div for Complex<T>
where
    T: Copy + Add<Output = T> + Sub<Output = T> + Mul<Output = T> + Div<Output = T>,
{
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        let denom = rhs.re * rhs.re + rhs.im * rhs.im;
        Self::new(
            (self.re * rhs.re + self.im * rhs.im) / denom,
            (self.im * rhs.re - self.re * rhs.im) / denom,
        )
    }
}

impl<T: Neg<Output = T>> Neg for Complex<T> {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.re, -self.im)
    }
}

/// Host-side element type of a [`NumericKind`].
///
/// The mapping is total: each kind has exactly one implementor, and
/// `E::KIND` recovers the kind from the type.
pub trait BlasElement:
    Copy
    + Send
    + Sync
    + PartialEq
    + fmt::Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + 'static
{
    const KIND: NumericKind;

    fn from_f64(value: f64) -> Self;

    fn real(self) -> f64;

    fn imag(self) -> f64;

    /// Complex conjugate; identity for real kinds.
    #[must_use]
    fn conj(self) -> Self;

    /// The value with its imaginary part dropped.
    #[must_use]
    fn real_part(self) -> Self;

    #[must_use]
    fn zero() -> Self {
        Self::from_f64(0.0)
    }

    #[must_use]
    fn one() -> Self {
        Self::from_f64(1.0)
    }

    #[must_use]
    fn modulus(self) -> f64 {
        self.real().hypot(self.imag())
    }
}

macro_rules! real_element {
    ($ty:ty, $kind:expr) => {
        impl BlasElement for $ty {
            const KIND: NumericKind = $kind;

            #[allow(clippy::cast_possible_truncation)]
            fn from_f64(value: f64) -> Self {
                value as $ty
            }

            fn real(self) -> f64 {
                f64::from(self)
            }

            fn imag(self) -> f64 {
                0.0
            }

            fn conj(self) -> Self {
                self
            }

            fn real_part(self) -> Self {
                self
            }
        }
    };
}

macro_rules! complex_element {
    ($ty:ty, $kind:expr) => {
        impl BlasElement for Complex<$ty> {
            const KIND: NumericKind = $kind;

            #[allow(clippy::cast_possible_truncation)]
            fn from_f64(value: f64) -> Self {
                Self::new(value as $ty, 0.0)
            }

            fn real(self) -> f64 {
                f64::from(self.re)
            }

            fn imag(self) -> f64 {
                f64::from(self.im)
            }

            fn conj(self) -> Self {
                Self::new(self.re, -self.im)
            }

            fn real_part(self) -> Self {
                Self::new(self.re, 0.0)
            }
        }
    };
}

real_element!(f32, NumericKind::Real32);
real_element!(f64, NumericKind::Real64);
complex_element!(f32, NumericKind::Complex64);
complex_element!(f64, NumericKind::Complex128);

//! Complex scalars at a runtime-selected working precision.
//!
//! Every numeric routine in the crate is written once against
//! [`ComplexScalar`]. Two implementations exist: native `Complex<f64>` and
//! [`MpComplex`], an MPFR-backed complex whose precision is carried by each
//! value. Real control quantities (step sizes, norms, tolerances) stay `f64`
//! regardless of the working precision.

pub mod linalg;
pub mod mp;

pub use linalg::{LuDecomposition, Matrix, Vector};
pub use mp::{source_from_c64, MpComplex, SOURCE_PRECISION};

use num_complex::Complex;
use num_traits::{One, Zero};
use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Precision (mantissa bits) of native double arithmetic.
pub const DOUBLE_PRECISION: u32 = 53;

/// A complex number at some working precision.
pub trait ComplexScalar:
    Clone
    + Debug
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    fn zero_at(precision: u32) -> Self;

    fn one_at(precision: u32) -> Self {
        Self::from_f64_at(1.0, 0.0, precision)
    }

    fn from_f64_at(re: f64, im: f64, precision: u32) -> Self;

    /// Rounds a high-precision source value to this representation.
    fn from_mp(value: &rug::Complex, precision: u32) -> Self;

    /// Widens this value to an MPFR complex of the given precision.
    fn to_mp(&self, precision: u32) -> rug::Complex;

    fn to_c64(&self) -> Complex<f64>;

    fn precision(&self) -> u32;

    /// Re-rounds the value in place. No-op for fixed-width types.
    fn set_precision(&mut self, precision: u32);

    /// Modulus, rounded to double.
    fn norm(&self) -> f64;

    fn conj(&self) -> Self;

    /// Multiplies by a real double.
    fn scale(&self, factor: f64) -> Self;

    fn powi(&self, exponent: i32) -> Self;

    fn is_finite(&self) -> bool;

    fn is_exact_zero(&self) -> bool;

    /// Unit roundoff for the given precision.
    fn unit_roundoff(precision: u32) -> f64 {
        2f64.powi(1 - precision as i32)
    }

    fn from_c64_at(value: Complex<f64>, precision: u32) -> Self {
        Self::from_f64_at(value.re, value.im, precision)
    }

    /// Converts between representations through MPFR at `precision`.
    fn convert<U: ComplexScalar>(&self, precision: u32) -> U {
        U::from_mp(&self.to_mp(precision), precision)
    }
}

impl ComplexScalar for Complex<f64> {
    fn zero_at(_precision: u32) -> Self {
        Complex::zero()
    }

    fn one_at(_precision: u32) -> Self {
        Complex::one()
    }

    fn from_f64_at(re: f64, im: f64, _precision: u32) -> Self {
        Complex::new(re, im)
    }

    fn from_mp(value: &rug::Complex, _precision: u32) -> Self {
        Complex::new(value.real().to_f64(), value.imag().to_f64())
    }

    fn to_mp(&self, precision: u32) -> rug::Complex {
        rug::Complex::with_val(precision, (self.re, self.im))
    }

    fn to_c64(&self) -> Complex<f64> {
        *self
    }

    fn precision(&self) -> u32 {
        DOUBLE_PRECISION
    }

    fn set_precision(&mut self, _precision: u32) {}

    fn norm(&self) -> f64 {
        Complex::norm(*self)
    }

    fn conj(&self) -> Self {
        Complex::conj(self)
    }

    fn scale(&self, factor: f64) -> Self {
        *self * factor
    }

    fn powi(&self, exponent: i32) -> Self {
        Complex::powi(self, exponent)
    }

    fn is_finite(&self) -> bool {
        self.re.is_finite() && self.im.is_finite()
    }

    fn is_exact_zero(&self) -> bool {
        self.re == 0.0 && self.im == 0.0
    }

    fn unit_roundoff(_precision: u32) -> f64 {
        f64::EPSILON
    }
}

/// Euclidean norm of a slice of scalars, in double.
pub fn slice_norm<T: ComplexScalar>(values: &[T]) -> f64 {
    values
        .iter()
        .map(|v| {
            let n = v.norm();
            n * n
        })
        .sum::<f64>()
        .sqrt()
}

/// Euclidean distance between two equally sized slices, in double.
pub fn slice_distance<T: ComplexScalar>(a: &[T], b: &[T]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let n = (x.clone() - y.clone()).norm();
            n * n
        })
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_and_mp_agree_on_basic_arithmetic() {
        let a = Complex::new(1.25, -0.5);
        let b = Complex::new(-2.0, 3.0);
        let expected = (a * b - a) / b;

        let am = MpComplex::from_c64_at(a, 128);
        let bm = MpComplex::from_c64_at(b, 128);
        let got = (am.clone() * bm.clone() - am) / bm;

        assert!((got.to_c64() - expected).norm() < 1e-15);
        assert_eq!(got.precision(), 128);
    }

    #[test]
    fn conversion_preserves_value() {
        let z = Complex::new(0.1, 0.2);
        let mp: MpComplex = z.convert(256);
        let back: Complex<f64> = mp.convert(256);
        assert_eq!(back, z);
    }

    #[test]
    fn unit_roundoff_shrinks_with_precision() {
        assert_eq!(<Complex<f64> as ComplexScalar>::unit_roundoff(53), f64::EPSILON);
        assert!(MpComplex::unit_roundoff(128) < 1e-37);
    }

    #[test]
    fn slice_distance_matches_manual() {
        let a = [Complex::new(3.0, 0.0), Complex::new(0.0, 0.0)];
        let b = [Complex::new(0.0, 0.0), Complex::new(0.0, 4.0)];
        assert!((slice_distance(&a, &b) - 5.0).abs() < 1e-15);
        assert!((slice_norm(&a) - 3.0).abs() < 1e-15);
    }
}

use super::ComplexScalar;
use num_complex::Complex;
use rug::ops::Pow;
use rug::Float;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Precision at which immutable source data is stored. Working precisions
/// never exceed this.
pub const SOURCE_PRECISION: u32 = 1024;

/// Widens a double to a source-of-truth value.
pub fn source_from_c64(value: Complex<f64>) -> rug::Complex {
    rug::Complex::with_val(SOURCE_PRECISION, (value.re, value.im))
}

/// MPFR-backed complex number. The precision lives on the value.
#[derive(Debug, Clone, PartialEq)]
pub struct MpComplex(pub rug::Complex);

impl Add for MpComplex {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        MpComplex(self.0 + rhs.0)
    }
}

impl Sub for MpComplex {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        MpComplex(self.0 - rhs.0)
    }
}

impl Mul for MpComplex {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        MpComplex(self.0 * rhs.0)
    }
}

impl Div for MpComplex {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        MpComplex(self.0 / rhs.0)
    }
}

impl Neg for MpComplex {
    type Output = Self;
    fn neg(self) -> Self {
        MpComplex(-self.0)
    }
}

impl ComplexScalar for MpComplex {
    fn zero_at(precision: u32) -> Self {
        MpComplex(rug::Complex::new(precision))
    }

    fn from_f64_at(re: f64, im: f64, precision: u32) -> Self {
        MpComplex(rug::Complex::with_val(precision, (re, im)))
    }

    fn from_mp(value: &rug::Complex, precision: u32) -> Self {
        MpComplex(rug::Complex::with_val(precision, value))
    }

    fn to_mp(&self, precision: u32) -> rug::Complex {
        rug::Complex::with_val(precision, &self.0)
    }

    fn to_c64(&self) -> Complex<f64> {
        Complex::new(self.0.real().to_f64(), self.0.imag().to_f64())
    }

    fn precision(&self) -> u32 {
        self.0.prec().0
    }

    fn set_precision(&mut self, precision: u32) {
        self.0.set_prec(precision);
    }

    fn norm(&self) -> f64 {
        Float::with_val(64, self.0.abs_ref()).to_f64()
    }

    fn conj(&self) -> Self {
        MpComplex(self.0.clone().conj())
    }

    fn scale(&self, factor: f64) -> Self {
        MpComplex(self.0.clone() * factor)
    }

    fn powi(&self, exponent: i32) -> Self {
        MpComplex(self.0.clone().pow(exponent))
    }

    fn is_finite(&self) -> bool {
        self.0.real().is_finite() && self.0.imag().is_finite()
    }

    fn is_exact_zero(&self) -> bool {
        self.0.real().is_zero() && self.0.imag().is_zero()
    }
}

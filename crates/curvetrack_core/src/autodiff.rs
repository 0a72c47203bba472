use crate::numeric::ComplexScalar;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Dual number for forward-mode differentiation over a complex scalar.
/// val: value
/// eps: derivative along the seeded direction
#[derive(Debug, Clone, PartialEq)]
pub struct Dual<T> {
    pub val: T,
    pub eps: T,
}

impl<T: ComplexScalar> Dual<T> {
    pub fn new(val: T, eps: T) -> Self {
        Self { val, eps }
    }

    pub fn constant(val: T) -> Self {
        let eps = T::zero_at(val.precision());
        Self { val, eps }
    }

    pub fn variable(val: T) -> Self {
        let eps = T::one_at(val.precision());
        Self { val, eps }
    }

    pub fn powi(&self, n: i32) -> Self {
        let precision = self.val.precision();
        if n == 0 {
            return Self::new(T::one_at(precision), T::zero_at(precision));
        }
        let lower = self.val.powi(n - 1);
        let val = lower.clone() * self.val.clone();
        let eps = lower.scale(n as f64) * self.eps.clone();
        Self::new(val, eps)
    }
}

impl<T: ComplexScalar> Add for Dual<T> {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.eps + rhs.eps)
    }
}

impl<T: ComplexScalar> Sub for Dual<T> {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.val - rhs.val, self.eps - rhs.eps)
    }
}

impl<T: ComplexScalar> Mul for Dual<T> {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        let eps = self.val.clone() * rhs.eps + self.eps * rhs.val.clone();
        Self::new(self.val * rhs.val, eps)
    }
}

impl<T: ComplexScalar> Div for Dual<T> {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let denom = rhs.val.clone() * rhs.val.clone();
        let eps = (self.eps * rhs.val.clone() - self.val.clone() * rhs.eps) / denom;
        Self::new(self.val / rhs.val, eps)
    }
}

impl<T: ComplexScalar> Neg for Dual<T> {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.eps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex;

    #[test]
    fn quotient_rule() {
        // d/dz (z^2 / (z + 1)) at z = 2i
        let z = Complex::new(0.0, 2.0);
        let x = Dual::variable(z);
        let one = Dual::constant(Complex::new(1.0, 0.0));
        let f = x.powi(2) / (x.clone() + one);
        let expected = (z * z + 2.0 * z) / ((z + 1.0) * (z + 1.0));
        assert!((f.eps - expected).norm() < 1e-14);
        assert!((f.val - z * z / (z + 1.0)).norm() < 1e-14);
    }

    #[test]
    fn zeroth_power_has_no_derivative() {
        let x = Dual::variable(Complex::new(3.0, -1.0));
        let p = x.powi(0);
        assert_eq!(p.val, Complex::new(1.0, 0.0));
        assert_eq!(p.eps, Complex::new(0.0, 0.0));
    }
}

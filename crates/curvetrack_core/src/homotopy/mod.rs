//! Homotopies driven by the path tracker.
//!
//! - `detjac`: the detjac-to-detjac homotopy moving critical points of one
//!   projection to those of another.
//! - `linear`: moves a curve point to a new value of a linear projection.

pub mod detjac;
pub mod linear;

pub use detjac::{DetjacEvaluator, DetjacHomotopy};
pub use linear::{LinearProjectionEvaluator, LinearProjectionHomotopy};

use crate::numeric::{ComplexScalar, Matrix, Vector};
use num_complex::Complex;
use rand::Rng;
use std::f64::consts::PI;

/// Output buffers of one homotopy evaluation.
#[derive(Debug, Clone)]
pub struct HomotopyEval<T> {
    pub values: Vector<T>,
    pub jacobian_vars: Matrix<T>,
    pub jacobian_param: Vector<T>,
}

impl<T: ComplexScalar> HomotopyEval<T> {
    pub fn new(n: usize, precision: u32) -> Self {
        Self {
            values: Vector::zeros(n, precision),
            jacobian_vars: Matrix::zeros(n, n, precision),
            jacobian_param: Vector::zeros(n, precision),
        }
    }

    pub fn change_precision(&mut self, precision: u32) {
        self.values.change_precision(precision);
        self.jacobian_vars.change_precision(precision);
        self.jacobian_param.change_precision(precision);
    }

    pub fn is_finite(&self) -> bool {
        self.values.is_finite() && self.jacobian_vars.is_finite() && self.jacobian_param.is_finite()
    }
}

/// Random unit-modulus complex number for the gamma trick.
pub fn random_gamma<R: Rng + ?Sized>(rng: &mut R) -> Complex<f64> {
    let angle = rng.gen_range(0.0..2.0 * PI);
    Complex::from_polar(1.0, angle)
}

/// Random complex matrix with entries of modulus at most one.
pub fn random_matrix<R: Rng + ?Sized>(rng: &mut R, rows: usize, cols: usize) -> Vec<Vec<Complex<f64>>> {
    (0..rows)
        .map(|_| {
            (0..cols)
                .map(|_| Complex::from_polar(rng.gen_range(0.5..1.0), rng.gen_range(0.0..2.0 * PI)))
                .collect()
        })
        .collect()
}

/// Value of a linear projection at a homogeneous point: `(pi . x) / x0`.
pub fn projection_value(point: &[Complex<f64>], projection: &[Complex<f64>]) -> Complex<f64> {
    let numerator: Complex<f64> = point.iter().zip(projection).map(|(x, p)| x * p).sum();
    numerator / point[0]
}

/// Affine coordinates `x_i / x0` for `i >= 1`.
pub fn dehomogenize(point: &[Complex<f64>]) -> Vec<Complex<f64>> {
    point[1..].iter().map(|x| x / point[0]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn gamma_has_unit_modulus() {
        let mut rng = StdRng::seed_from_u64(7);
        let g = random_gamma(&mut rng);
        assert!((g.norm() - 1.0).abs() < 1e-15);
    }

    #[test]
    fn projection_value_is_scale_invariant() {
        let x = vec![Complex::new(2.0, 0.0), Complex::new(1.0, 1.0), Complex::new(0.0, 4.0)];
        let pi = vec![Complex::new(0.0, 0.0), Complex::new(1.0, 0.0), Complex::new(0.5, 0.0)];
        let scaled: Vec<_> = x.iter().map(|v| v * Complex::new(0.0, 3.0)).collect();
        let a = projection_value(&x, &pi);
        let b = projection_value(&scaled, &pi);
        assert!((a - b).norm() < 1e-14);
        assert!((a - Complex::new(0.5, 1.5)).norm() < 1e-14);
        assert_eq!(dehomogenize(&x)[0], Complex::new(0.5, 0.5));
    }
}

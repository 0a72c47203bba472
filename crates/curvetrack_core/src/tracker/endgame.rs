//! Power-series endgame.
//!
//! Near `s = 0` a path with cycle number `c` is analytic in `sigma = s^(1/c)`.
//! Samples are taken on a geometric sequence of `s`; the cycle number is the
//! one whose Hermite interpolant in `sigma` best predicts the newest sample,
//! and the endpoint is that interpolant evaluated at `sigma = 0`.

use crate::numeric::{ComplexScalar, Vector};

/// A point on the path together with its tangent `dx/ds`.
#[derive(Debug, Clone)]
pub(crate) struct Sample<T> {
    pub s: f64,
    pub x: Vector<T>,
    pub dx: Vector<T>,
}

impl<T: ComplexScalar> Sample<T> {
    pub fn convert<U: ComplexScalar>(&self, precision: u32) -> Sample<U> {
        Sample {
            s: self.s,
            x: self.x.convert(precision),
            dx: self.dx.convert(precision),
        }
    }

    fn sigma(&self, cycle: u32) -> f64 {
        self.s.powf(1.0 / cycle as f64)
    }

    /// `dx/dsigma = dx/ds * c * s^((c - 1) / c)`.
    fn sigma_derivative(&self, cycle: u32) -> Vector<T> {
        let c = cycle as f64;
        self.dx.scaled(c * self.s.powf((c - 1.0) / c))
    }
}

/// Endgame progress carried across precision changes.
#[derive(Debug, Clone)]
pub(crate) struct EndgameState<T> {
    /// Most recent samples, oldest first.
    pub samples: Vec<Sample<T>>,
    pub approximation: Option<Vector<T>>,
    pub cycle_number: u32,
    pub next_s: f64,
    /// Samples taken so far, including those dropped from `samples`.
    pub taken: usize,
}

impl<T: ComplexScalar> EndgameState<T> {
    pub fn new(first: Sample<T>, sample_factor: f64) -> Self {
        let next_s = first.s * sample_factor;
        Self {
            samples: vec![first],
            approximation: None,
            cycle_number: 1,
            next_s,
            taken: 1,
        }
    }

    pub fn push(&mut self, sample: Sample<T>) {
        self.samples.push(sample);
        self.taken += 1;
        if self.samples.len() > 3 {
            self.samples.remove(0);
        }
    }

    pub fn convert<U: ComplexScalar>(&self, precision: u32) -> EndgameState<U> {
        EndgameState {
            samples: self.samples.iter().map(|s| s.convert(precision)).collect(),
            approximation: self.approximation.as_ref().map(|a| a.convert(precision)),
            cycle_number: self.cycle_number,
            next_s: self.next_s,
            taken: self.taken,
        }
    }
}

/// Cubic Hermite interpolant through `(sa, xa, da)` and `(sb, xb, db)`,
/// evaluated at `at`.
fn hermite<T: ComplexScalar>(
    sa: f64,
    xa: &Vector<T>,
    da: &Vector<T>,
    sb: f64,
    xb: &Vector<T>,
    db: &Vector<T>,
    at: f64,
) -> Vector<T> {
    let width = sb - sa;
    let t = (at - sa) / width;
    let t2 = t * t;
    let t3 = t2 * t;
    let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
    let h10 = t3 - 2.0 * t2 + t;
    let h01 = -2.0 * t3 + 3.0 * t2;
    let h11 = t3 - t2;
    xa.scaled(h00)
        .axpy(h10 * width, da)
        .axpy(h01, xb)
        .axpy(h11 * width, db)
}

fn interpolate<T: ComplexScalar>(a: &Sample<T>, b: &Sample<T>, cycle: u32, at: f64) -> Vector<T> {
    hermite(
        a.sigma(cycle),
        &a.x,
        &a.sigma_derivative(cycle),
        b.sigma(cycle),
        &b.x,
        &b.sigma_derivative(cycle),
        at,
    )
}

/// Picks the cycle number in `1..=max_cycle` whose interpolant through the
/// two older samples lands closest to the newest one. Errors within
/// rounding of each other go to the smallest cycle number.
pub(crate) fn estimate_cycle_number<T: ComplexScalar>(samples: &[Sample<T>], max_cycle: u32) -> u32 {
    let [older, middle, newest] = match samples {
        [.., a, b, c] => [a, b, c],
        _ => return 1,
    };
    let floor = 16.0 * T::unit_roundoff(newest.x.precision()) * newest.x.norm().max(1.0);
    let mut best = 1;
    let mut best_error = f64::INFINITY;
    for cycle in 1..=max_cycle.max(1) {
        let predicted = interpolate(older, middle, cycle, newest.sigma(cycle));
        let error = predicted.distance(&newest.x);
        if error + floor < best_error {
            best_error = error;
            best = cycle;
        }
    }
    best
}

/// Value at `s = 0` of the interpolant through the two newest samples.
pub(crate) fn extrapolate<T: ComplexScalar>(samples: &[Sample<T>], cycle: u32) -> Option<Vector<T>> {
    match samples {
        [.., a, b] => Some(interpolate(a, b, cycle, 0.0)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::DOUBLE_PRECISION;
    use num_complex::Complex;

    /// Samples of `x(s) = 1 + s^(1/c)` with exact tangents.
    fn branch(cycle: u32, s: f64) -> Sample<Complex<f64>> {
        let c = cycle as f64;
        let x = 1.0 + s.powf(1.0 / c);
        let dx = s.powf(1.0 / c - 1.0) / c;
        Sample {
            s,
            x: Vector::from_c64(&[Complex::new(x, 0.0)], DOUBLE_PRECISION),
            dx: Vector::from_c64(&[Complex::new(dx, 0.0)], DOUBLE_PRECISION),
        }
    }

    #[test]
    fn recovers_cycle_number_of_a_branch() {
        for cycle in 1..=3 {
            let samples: Vec<_> = [0.1, 0.05, 0.025].iter().map(|&s| branch(cycle, s)).collect();
            assert_eq!(estimate_cycle_number(&samples, 4), cycle);
            let limit = extrapolate(&samples, cycle).expect("two samples");
            assert!((limit[0] - Complex::new(1.0, 0.0)).norm() < 1e-12);
        }
    }

    #[test]
    fn cubic_hermite_reproduces_a_cubic() {
        let f = |t: f64| t * t * t - 2.0 * t + 0.5;
        let df = |t: f64| 3.0 * t * t - 2.0;
        let v = |z: f64| -> Vector<Complex<f64>> { Vector::from_c64(&[Complex::new(z, 0.0)], DOUBLE_PRECISION) };
        let value = hermite(0.4, &v(f(0.4)), &v(df(0.4)), 0.2, &v(f(0.2)), &v(df(0.2)), 0.0);
        assert!((value[0] - Complex::new(0.5, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn keeps_only_three_samples() {
        let mut state = EndgameState::new(branch(1, 0.1), 0.5);
        assert!((state.next_s - 0.05).abs() < 1e-15);
        for s in [0.05, 0.025, 0.0125] {
            state.push(branch(1, s));
        }
        assert_eq!(state.samples.len(), 3);
        assert!((state.samples[0].s - 0.05).abs() < 1e-15);
    }
}

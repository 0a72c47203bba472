use super::HomotopyEval;
use crate::numeric::{source_from_c64, ComplexScalar, Matrix, Vector};
use crate::slp::{SlpWorkspace, StraightLineProgram};
use crate::traits::{Homotopy, HomotopySource};
use anyhow::{bail, Result};
use num_complex::Complex;
use std::sync::Arc;

/// Immutable data of a detjac-to-detjac homotopy, kept at source precision.
#[derive(Debug)]
struct DetjacShared {
    slp: StraightLineProgram,
    randomizer: Vec<Vec<rug::Complex>>,
    patch: Vec<rug::Complex>,
    gamma: rug::Complex,
    old_projection: Vec<rug::Complex>,
    new_projection: Vec<rug::Complex>,
}

/// Homotopy between the critical sets of two linear projections restricted
/// to a curve.
///
/// With `N` homogeneous variables the system is
/// `[A f(x); (1 - s) det_new(x) + gamma s det_old(x); p . x - 1]`, where
/// `det_*` is the determinant of `[A Jf(x); pi_*; p]`. The partial
/// derivatives of each determinant are estimated by central differences.
#[derive(Debug, Clone)]
pub struct DetjacHomotopy {
    shared: Arc<DetjacShared>,
}

impl DetjacHomotopy {
    pub fn new(
        slp: StraightLineProgram,
        randomizer: &[Vec<Complex<f64>>],
        patch: &[Complex<f64>],
        gamma: Complex<f64>,
        old_projection: &[Complex<f64>],
        new_projection: &[Complex<f64>],
    ) -> Result<Self> {
        slp.require_plain()?;
        let n = slp.num_variables();
        if n < 2 {
            bail!("Detjac homotopy needs at least two variables, got {}.", n);
        }
        if randomizer.len() != n - 2 {
            bail!(
                "Randomizer has {} rows; expected {} for {} variables.",
                randomizer.len(),
                n - 2,
                n
            );
        }
        if let Some(row) = randomizer.iter().find(|r| r.len() != slp.num_functions()) {
            bail!(
                "Randomizer row has {} columns; the system has {} functions.",
                row.len(),
                slp.num_functions()
            );
        }
        for (name, v) in [("patch", patch), ("old projection", old_projection), ("new projection", new_projection)] {
            if v.len() != n {
                bail!("The {} has {} coefficients; expected {}.", name, v.len(), n);
            }
        }
        if gamma.norm() == 0.0 || !gamma.re.is_finite() || !gamma.im.is_finite() {
            bail!("gamma must be a finite non-zero complex number.");
        }

        let to_source = |v: &[Complex<f64>]| v.iter().map(|z| source_from_c64(*z)).collect::<Vec<_>>();
        Ok(Self {
            shared: Arc::new(DetjacShared {
                randomizer: randomizer.iter().map(|row| to_source(row.as_slice())).collect(),
                patch: to_source(patch),
                gamma: source_from_c64(gamma),
                old_projection: to_source(old_projection),
                new_projection: to_source(new_projection),
                slp,
            }),
        })
    }
}

impl HomotopySource for DetjacHomotopy {
    type Evaluator<T: ComplexScalar> = DetjacEvaluator<T>;

    fn num_variables(&self) -> usize {
        self.shared.slp.num_variables()
    }

    fn materialize<T: ComplexScalar>(&self, precision: u32) -> DetjacEvaluator<T> {
        DetjacEvaluator::build(Arc::clone(&self.shared), precision)
    }
}

/// Per-worker evaluator: the shared program plus buffers at one precision.
#[derive(Debug, Clone)]
pub struct DetjacEvaluator<T> {
    shared: Arc<DetjacShared>,
    precision: u32,
    randomizer: Matrix<T>,
    patch: Vector<T>,
    gamma: T,
    old_projection: Vector<T>,
    new_projection: Vector<T>,
    workspace: SlpWorkspace<T>,
    f: Vector<T>,
    jf: Matrix<T>,
    af: Vector<T>,
    ajf: Matrix<T>,
    det_matrix: Matrix<T>,
    shifted: Vector<T>,
}

impl<T: ComplexScalar> DetjacEvaluator<T> {
    fn build(shared: Arc<DetjacShared>, precision: u32) -> Self {
        let n = shared.slp.num_variables();
        let m = shared.slp.num_functions();
        Self {
            randomizer: Matrix::from_source_rows(&shared.randomizer, m, precision),
            patch: Vector::from_source(&shared.patch, precision),
            gamma: T::from_mp(&shared.gamma, precision),
            old_projection: Vector::from_source(&shared.old_projection, precision),
            new_projection: Vector::from_source(&shared.new_projection, precision),
            workspace: SlpWorkspace::new(),
            f: Vector::zeros(m, precision),
            jf: Matrix::zeros(m, n, precision),
            af: Vector::zeros(n - 2, precision),
            ajf: Matrix::zeros(n - 2, n, precision),
            det_matrix: Matrix::zeros(n, n, precision),
            shifted: Vector::zeros(n, precision),
            shared,
            precision,
        }
    }

    fn num_vars(&self) -> usize {
        self.shared.slp.num_variables()
    }

    /// Fills `f`, `jf`, `af` and `ajf` at `x`.
    fn randomized_system(&mut self, x: &[T]) {
        self.shared
            .slp
            .evaluate(x, &mut self.workspace, &mut self.f, &mut self.jf);
        self.randomizer.mul_vec_into(&self.f, &mut self.af);
        self.randomizer.mul_mat_into(&self.jf, &mut self.ajf);
    }

    /// `(det_old, det_new)` from the current `ajf`.
    fn determinant_pair(&mut self) -> (T, T) {
        let n = self.num_vars();
        for i in 0..n - 2 {
            for j in 0..n {
                self.det_matrix[(i, j)] = self.ajf[(i, j)].clone();
            }
        }
        self.det_matrix.set_row(n - 1, self.patch.as_slice());

        self.det_matrix.set_row(n - 2, self.old_projection.as_slice());
        let det_old = self.det_matrix.determinant();
        self.det_matrix.set_row(n - 2, self.new_projection.as_slice());
        let det_new = self.det_matrix.determinant();
        (det_old, det_new)
    }

    /// `(det_old, det_new)` at `x`.
    pub fn determinants(&mut self, x: &Vector<T>) -> (T, T) {
        self.randomized_system(x.as_slice());
        self.determinant_pair()
    }

    pub fn gamma(&self) -> &T {
        &self.gamma
    }
}

impl<T: ComplexScalar> Homotopy<T> for DetjacEvaluator<T> {
    fn num_variables(&self) -> usize {
        self.num_vars()
    }

    fn precision(&self) -> u32 {
        self.precision
    }

    fn change_precision(&mut self, precision: u32) {
        *self = DetjacEvaluator::build(Arc::clone(&self.shared), precision);
    }

    fn evaluate(&mut self, x: &Vector<T>, s: f64, out: &mut HomotopyEval<T>) {
        let n = self.num_vars();
        let precision = self.precision;
        out.values.resize(n);
        out.jacobian_vars.resize(n, n);
        out.jacobian_param.resize(n);

        self.randomized_system(x.as_slice());
        for i in 0..n - 2 {
            out.values[i] = self.af[i].clone();
            for j in 0..n {
                out.jacobian_vars[(i, j)] = self.ajf[(i, j)].clone();
            }
        }
        let (det_old, det_new) = self.determinant_pair();

        // Central differences of both determinants, one coordinate at a time.
        let base_step = T::unit_roundoff(precision).cbrt();
        let mut d_old = Vec::with_capacity(n);
        let mut d_new = Vec::with_capacity(n);
        for j in 0..n {
            let h = base_step * x[j].norm().max(1.0);
            let offset = T::from_f64_at(h, 0.0, precision);

            self.shifted.copy_from(x);
            self.shifted[j] = x[j].clone() + offset.clone();
            let shifted = self.shifted.as_slice().to_vec();
            self.randomized_system(&shifted);
            let (old_plus, new_plus) = self.determinant_pair();

            self.shifted[j] = x[j].clone() - offset;
            let shifted = self.shifted.as_slice().to_vec();
            self.randomized_system(&shifted);
            let (old_minus, new_minus) = self.determinant_pair();

            let inv = 0.5 / h;
            d_old.push((old_plus - old_minus).scale(inv));
            d_new.push((new_plus - new_minus).scale(inv));
        }

        let gamma_s = self.gamma.scale(s);
        out.values[n - 2] = det_new.scale(1.0 - s) + gamma_s.clone() * det_old.clone();
        for (j, (dold, dnew)) in d_old.into_iter().zip(d_new).enumerate() {
            out.jacobian_vars[(n - 2, j)] = dnew.scale(1.0 - s) + gamma_s.clone() * dold;
        }

        out.values[n - 1] = self.patch.dot(x) - T::one_at(precision);
        for j in 0..n {
            out.jacobian_vars[(n - 1, j)] = self.patch[j].clone();
        }

        out.jacobian_param.fill_zero();
        out.jacobian_param[n - 2] = self.gamma.clone() * det_old - det_new;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::numeric::MpComplex;
    use crate::slp::{Bytecode, OpCode};

    pub(crate) fn c(re: f64, im: f64) -> Complex<f64> {
        Complex::new(re, im)
    }

    /// x1^2 + x2^2 - x0^2 in homogeneous coordinates.
    pub(crate) fn circle_program() -> StraightLineProgram {
        StraightLineProgram::new(
            3,
            vec![Bytecode::new(vec![
                OpCode::LoadVar(1),
                OpCode::PowI(2),
                OpCode::LoadVar(2),
                OpCode::PowI(2),
                OpCode::Add,
                OpCode::LoadVar(0),
                OpCode::PowI(2),
                OpCode::Sub,
            ])],
        )
        .expect("valid program")
    }

    /// Critical points of `x1` on the circle moved to those of `x2`.
    pub(crate) fn circle_homotopy(gamma: Complex<f64>) -> DetjacHomotopy {
        DetjacHomotopy::new(
            circle_program(),
            &[vec![c(1.0, 0.0)]],
            &[c(1.0, 0.0), c(0.0, 0.0), c(0.0, 0.0)],
            gamma,
            &[c(0.0, 0.0), c(1.0, 0.0), c(0.0, 0.0)],
            &[c(0.0, 0.0), c(0.0, 0.0), c(1.0, 0.0)],
        )
        .expect("valid homotopy")
    }

    fn sample_point() -> Vector<Complex<f64>> {
        Vector::from_c64(&[c(1.0, 0.0), c(0.3, -0.2), c(-0.7, 0.4)], 53)
    }

    #[test]
    fn boundary_values_match_determinants() {
        let gamma = c(0.6, 0.8);
        let homotopy = circle_homotopy(gamma);
        let mut eval: DetjacEvaluator<Complex<f64>> = homotopy.materialize(53);
        let x = sample_point();
        let (det_old, det_new) = eval.determinants(&x);
        // det_old = -2 x2, det_new = 2 x1 for this circle and these projections.
        assert!((det_old - x[2] * -2.0).norm() < 1e-14);
        assert!((det_new - x[1] * 2.0).norm() < 1e-14);

        let mut out = HomotopyEval::new(3, 53);
        eval.evaluate(&x, 1.0, &mut out);
        assert!((out.values[1] - gamma * det_old).norm() < 1e-14);
        assert!((out.jacobian_param[1] - (gamma * det_old - det_new)).norm() < 1e-14);
        assert_eq!(out.jacobian_param[0], c(0.0, 0.0));
        assert_eq!(out.jacobian_param[2], c(0.0, 0.0));

        eval.evaluate(&x, 0.0, &mut out);
        assert!((out.values[1] - det_new).norm() < 1e-14);
        assert!((out.values[2] - (x[0] - 1.0)).norm() < 1e-15);
    }

    #[test]
    fn jacobian_matches_central_differences() {
        let homotopy = circle_homotopy(c(-0.28, 0.96));
        let mut eval: DetjacEvaluator<Complex<f64>> = homotopy.materialize(53);
        let x = sample_point();
        let s = 0.37;
        let mut out = HomotopyEval::new(3, 53);
        eval.evaluate(&x, s, &mut out);
        let jac = out.jacobian_vars.clone();
        let jp = out.jacobian_param.clone();

        let h = 1e-6;
        let mut plus = HomotopyEval::new(3, 53);
        let mut minus = HomotopyEval::new(3, 53);
        for j in 0..3 {
            let mut xp = x.clone();
            let mut xm = x.clone();
            xp[j] += c(h, 0.0);
            xm[j] -= c(h, 0.0);
            eval.evaluate(&xp, s, &mut plus);
            eval.evaluate(&xm, s, &mut minus);
            for i in 0..3 {
                let fd = (plus.values[i] - minus.values[i]) / (2.0 * h);
                assert!((fd - jac[(i, j)]).norm() < 1e-6, "entry ({}, {})", i, j);
            }
        }

        eval.evaluate(&x, s + h, &mut plus);
        eval.evaluate(&x, s - h, &mut minus);
        for i in 0..3 {
            let fd = (plus.values[i] - minus.values[i]) / (2.0 * h);
            assert!((fd - jp[i]).norm() < 1e-6);
        }
    }

    #[test]
    fn multiprecision_matches_double() {
        let homotopy = circle_homotopy(c(0.6, 0.8));
        let mut double: DetjacEvaluator<Complex<f64>> = homotopy.materialize(53);
        let mut multi: DetjacEvaluator<MpComplex> = homotopy.materialize(64);
        multi.change_precision(192);
        assert_eq!(multi.precision(), 192);

        let x = sample_point();
        let xm: Vector<MpComplex> = Vector::from_c64(&x.to_c64(), 192);
        let mut out_d = HomotopyEval::new(3, 53);
        let mut out_m = HomotopyEval::new(3, 192);
        double.evaluate(&x, 0.25, &mut out_d);
        multi.evaluate(&xm, 0.25, &mut out_m);
        for i in 0..3 {
            assert!((out_m.values[i].to_c64() - out_d.values[i]).norm() < 1e-12);
            for j in 0..3 {
                let diff = out_m.jacobian_vars[(i, j)].to_c64() - out_d.jacobian_vars[(i, j)];
                assert!(diff.norm() < 1e-8);
            }
        }
    }

    #[test]
    fn rejects_mismatched_sizes() {
        let bad = DetjacHomotopy::new(
            circle_program(),
            &[vec![c(1.0, 0.0), c(2.0, 0.0)]],
            &[c(1.0, 0.0), c(0.0, 0.0), c(0.0, 0.0)],
            c(1.0, 0.0),
            &[c(0.0, 0.0), c(1.0, 0.0), c(0.0, 0.0)],
            &[c(0.0, 0.0), c(0.0, 0.0), c(1.0, 0.0)],
        );
        assert!(bad.is_err());
    }
}

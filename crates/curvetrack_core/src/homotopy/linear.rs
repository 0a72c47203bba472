use super::HomotopyEval;
use crate::numeric::{source_from_c64, ComplexScalar, Matrix, Vector};
use crate::slp::{SlpWorkspace, StraightLineProgram};
use crate::traits::{Homotopy, HomotopySource};
use anyhow::{bail, Result};
use num_complex::Complex;
use std::sync::Arc;

#[derive(Debug)]
struct LinearShared {
    slp: Arc<StraightLineProgram>,
    randomizer: Vec<Vec<rug::Complex>>,
    patch: Vec<rug::Complex>,
    projection: Vec<rug::Complex>,
    start_value: rug::Complex,
    target_value: rug::Complex,
}

/// Moves a point on a curve from one value of a linear projection to
/// another:
/// `[A f(x); pi . x - ((1 - s) v_target + s v_start) x0; p . x - 1]`.
#[derive(Debug, Clone)]
pub struct LinearProjectionHomotopy {
    shared: Arc<LinearShared>,
}

impl LinearProjectionHomotopy {
    pub fn new(
        slp: Arc<StraightLineProgram>,
        randomizer: &[Vec<Complex<f64>>],
        patch: &[Complex<f64>],
        projection: &[Complex<f64>],
        start_value: Complex<f64>,
        target_value: Complex<f64>,
    ) -> Result<Self> {
        slp.require_plain()?;
        let n = slp.num_variables();
        if n < 2 {
            bail!("A curve needs at least two homogeneous variables, got {}.", n);
        }
        if randomizer.len() != n - 2 || randomizer.iter().any(|r| r.len() != slp.num_functions()) {
            bail!(
                "Randomizer must be {} x {}.",
                n - 2,
                slp.num_functions()
            );
        }
        if patch.len() != n || projection.len() != n {
            bail!("Patch and projection need {} coefficients.", n);
        }
        let to_source = |v: &[Complex<f64>]| v.iter().map(|z| source_from_c64(*z)).collect::<Vec<_>>();
        Ok(Self {
            shared: Arc::new(LinearShared {
                randomizer: randomizer.iter().map(|row| to_source(row.as_slice())).collect(),
                patch: to_source(patch),
                projection: to_source(projection),
                start_value: source_from_c64(start_value),
                target_value: source_from_c64(target_value),
                slp,
            }),
        })
    }
}

impl HomotopySource for LinearProjectionHomotopy {
    type Evaluator<T: ComplexScalar> = LinearProjectionEvaluator<T>;

    fn num_variables(&self) -> usize {
        self.shared.slp.num_variables()
    }

    fn materialize<T: ComplexScalar>(&self, precision: u32) -> LinearProjectionEvaluator<T> {
        LinearProjectionEvaluator::build(Arc::clone(&self.shared), precision)
    }
}

#[derive(Debug, Clone)]
pub struct LinearProjectionEvaluator<T> {
    shared: Arc<LinearShared>,
    precision: u32,
    randomizer: Matrix<T>,
    patch: Vector<T>,
    projection: Vector<T>,
    start_value: T,
    target_value: T,
    workspace: SlpWorkspace<T>,
    f: Vector<T>,
    jf: Matrix<T>,
    af: Vector<T>,
    ajf: Matrix<T>,
}

impl<T: ComplexScalar> LinearProjectionEvaluator<T> {
    fn build(shared: Arc<LinearShared>, precision: u32) -> Self {
        let n = shared.slp.num_variables();
        let m = shared.slp.num_functions();
        Self {
            randomizer: Matrix::from_source_rows(&shared.randomizer, m, precision),
            patch: Vector::from_source(&shared.patch, precision),
            projection: Vector::from_source(&shared.projection, precision),
            start_value: T::from_mp(&shared.start_value, precision),
            target_value: T::from_mp(&shared.target_value, precision),
            workspace: SlpWorkspace::new(),
            f: Vector::zeros(m, precision),
            jf: Matrix::zeros(m, n, precision),
            af: Vector::zeros(n - 2, precision),
            ajf: Matrix::zeros(n - 2, n, precision),
            shared,
            precision,
        }
    }
}

impl<T: ComplexScalar> Homotopy<T> for LinearProjectionEvaluator<T> {
    fn num_variables(&self) -> usize {
        self.shared.slp.num_variables()
    }

    fn precision(&self) -> u32 {
        self.precision
    }

    fn change_precision(&mut self, precision: u32) {
        *self = LinearProjectionEvaluator::build(Arc::clone(&self.shared), precision);
    }

    fn evaluate(&mut self, x: &Vector<T>, s: f64, out: &mut HomotopyEval<T>) {
        let n = self.shared.slp.num_variables();
        let precision = self.precision;
        out.values.resize(n);
        out.jacobian_vars.resize(n, n);
        out.jacobian_param.resize(n);

        self.shared
            .slp
            .evaluate(x.as_slice(), &mut self.workspace, &mut self.f, &mut self.jf);
        self.randomizer.mul_vec_into(&self.f, &mut self.af);
        self.randomizer.mul_mat_into(&self.jf, &mut self.ajf);
        for i in 0..n - 2 {
            out.values[i] = self.af[i].clone();
            for j in 0..n {
                out.jacobian_vars[(i, j)] = self.ajf[(i, j)].clone();
            }
        }

        let value_at_s = self.target_value.scale(1.0 - s) + self.start_value.scale(s);
        out.values[n - 2] = self.projection.dot(x) - value_at_s.clone() * x[0].clone();
        for j in 0..n {
            out.jacobian_vars[(n - 2, j)] = self.projection[j].clone();
        }
        out.jacobian_vars[(n - 2, 0)] = self.projection[0].clone() - value_at_s;

        out.values[n - 1] = self.patch.dot(x) - T::one_at(precision);
        for j in 0..n {
            out.jacobian_vars[(n - 1, j)] = self.patch[j].clone();
        }

        out.jacobian_param.fill_zero();
        out.jacobian_param[n - 2] = (self.target_value.clone() - self.start_value.clone()) * x[0].clone();
    }
}

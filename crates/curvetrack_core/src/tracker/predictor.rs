//! Davidenko predictors and the Newton corrector.

use super::settings::PredictorKind;
use crate::homotopy::HomotopyEval;
use crate::numeric::{ComplexScalar, Vector};
use crate::traits::Homotopy;

/// Why a predictor stage or a correction could not be completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepIssue {
    Singular,
    NonFinite,
    NotConverged,
}

/// A predictor failure, remembering whether it happened while evaluating
/// at the already accepted point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PredictorFailure {
    pub issue: StepIssue,
    pub at_accepted_point: bool,
}

pub(crate) struct Correction<T> {
    pub x: Vector<T>,
    pub pivot_ratio: f64,
}

/// `dx/ds = -Hx^{-1} Hs` at `(x, s)`.
pub(crate) fn davidenko<T, H>(
    h: &mut H,
    eval: &mut HomotopyEval<T>,
    x: &Vector<T>,
    s: f64,
) -> Result<Vector<T>, StepIssue>
where
    T: ComplexScalar,
    H: Homotopy<T>,
{
    h.evaluate(x, s, eval);
    if !eval.is_finite() {
        return Err(StepIssue::NonFinite);
    }
    let lu = eval.jacobian_vars.lu();
    let rhs = lu.solve(&eval.jacobian_param).ok_or(StepIssue::Singular)?;
    Ok(rhs.scaled(-1.0))
}

/// Predicts the point at `s + ds` from the accepted point `(x, s)`.
pub(crate) fn predict<T, H>(
    kind: PredictorKind,
    h: &mut H,
    eval: &mut HomotopyEval<T>,
    x: &Vector<T>,
    s: f64,
    ds: f64,
) -> Result<Vector<T>, PredictorFailure>
where
    T: ComplexScalar,
    H: Homotopy<T>,
{
    let k1 = davidenko(h, eval, x, s).map_err(|issue| PredictorFailure {
        issue,
        at_accepted_point: true,
    })?;
    if kind == PredictorKind::Euler {
        return Ok(x.axpy(ds, &k1));
    }

    let later = |issue| PredictorFailure {
        issue,
        at_accepted_point: false,
    };
    let half = 0.5 * ds;
    let k2 = davidenko(h, eval, &x.axpy(half, &k1), s + half).map_err(later)?;
    let k3 = davidenko(h, eval, &x.axpy(half, &k2), s + half).map_err(later)?;
    let k4 = davidenko(h, eval, &x.axpy(ds, &k3), s + ds).map_err(later)?;
    Ok(x.axpy(ds / 6.0, &k1)
        .axpy(ds / 3.0, &k2)
        .axpy(ds / 3.0, &k3)
        .axpy(ds / 6.0, &k4))
}

/// Newton's method on `H(., s)` from `x`, converging once a correction is
/// at most `tol * (1 + |x|)`. Fails on growing corrections.
pub(crate) fn correct<T, H>(
    h: &mut H,
    eval: &mut HomotopyEval<T>,
    mut x: Vector<T>,
    s: f64,
    tol: f64,
    max_its: usize,
) -> Result<Correction<T>, StepIssue>
where
    T: ComplexScalar,
    H: Homotopy<T>,
{
    let mut previous = f64::INFINITY;
    for _ in 0..max_its {
        h.evaluate(&x, s, eval);
        if !eval.is_finite() {
            return Err(StepIssue::NonFinite);
        }
        let lu = eval.jacobian_vars.lu();
        let delta = lu.solve(&eval.values).ok_or(StepIssue::Singular)?;
        x = x.axpy(-1.0, &delta);
        let size = delta.norm();
        if !size.is_finite() {
            return Err(StepIssue::NonFinite);
        }
        if size <= tol * (1.0 + x.norm()) {
            return Ok(Correction {
                x,
                pivot_ratio: lu.pivot_ratio(),
            });
        }
        if size > previous {
            return Err(StepIssue::NotConverged);
        }
        previous = size;
    }
    Err(StepIssue::NotConverged)
}

/// Newton at `s = 0` until corrections drop below `10^-digits` or stop
/// shrinking. Returns the best point reached.
pub(crate) fn sharpen<T, H>(
    h: &mut H,
    eval: &mut HomotopyEval<T>,
    mut x: Vector<T>,
    digits: u32,
    max_its: usize,
) -> Vector<T>
where
    T: ComplexScalar,
    H: Homotopy<T>,
{
    let tol = 10f64.powi(-(digits as i32));
    let mut previous = f64::INFINITY;
    for _ in 0..max_its {
        h.evaluate(&x, 0.0, eval);
        if !eval.is_finite() {
            break;
        }
        let Some(delta) = eval.jacobian_vars.lu().solve(&eval.values) else {
            break;
        };
        let size = delta.norm();
        if !size.is_finite() || size > previous {
            break;
        }
        x = x.axpy(-1.0, &delta);
        if size <= tol * x.norm().max(1.0) {
            break;
        }
        previous = size;
    }
    x
}

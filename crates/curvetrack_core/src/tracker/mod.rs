//! Predictor-corrector path tracking from `s = 1` to `s = 0` with adaptive
//! precision and a power-series endgame.
//!
//! Tracking starts in native doubles. In adaptive mode the tracker moves the
//! path onto [`MpComplex`] arithmetic when the Jacobian's pivot ratio says
//! the current precision can no longer deliver the requested tolerance, or
//! when the step size collapses, and keeps raising the precision in
//! `precision_increment` steps up to `max_precision`.

mod endgame;
mod predictor;
pub mod result;
pub mod settings;

pub use result::{EndPoint, EndgameResult, TrackStatus};
pub use settings::{EndgameKind, PrecisionMode, PredictorKind, TrackerSettings};

use crate::homotopy::HomotopyEval;
use crate::numeric::{ComplexScalar, MpComplex, Vector, DOUBLE_PRECISION};
use crate::traits::{Homotopy, HomotopySource};
use anyhow::{bail, Result};
use endgame::{EndgameState, Sample};
use num_complex::Complex;
use predictor::StepIssue;
use tracing::{debug, trace};

/// Precision of the first multiprecision stage.
const FIRST_MP_PRECISION: u32 = 64;
const SHARPEN_ITERATIONS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escalation {
    /// Fixed double precision.
    Never,
    Available,
    /// Already at the highest allowed precision.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Finished(TrackStatus),
    RaisePrecision,
}

#[derive(Debug, Clone)]
struct PathPoint<T> {
    x: Vector<T>,
    s: f64,
    step: f64,
    successes: usize,
    steps: usize,
}

#[derive(Debug, Clone)]
struct PathState<T> {
    point: PathPoint<T>,
    boundary_point: Option<Vec<Complex<f64>>>,
    endgame: Option<EndgameState<T>>,
    endpoint: Option<Vector<T>>,
}

impl<T: ComplexScalar> PathState<T> {
    fn start(x: Vector<T>, settings: &TrackerSettings) -> Self {
        Self {
            point: PathPoint {
                x,
                s: 1.0,
                step: settings.initial_step_size.min(settings.max_step_size),
                successes: 0,
                steps: 0,
            },
            boundary_point: None,
            endgame: None,
            endpoint: None,
        }
    }

    fn convert<U: ComplexScalar>(&self, precision: u32) -> PathState<U> {
        PathState {
            point: PathPoint {
                x: self.point.x.convert(precision),
                s: self.point.s,
                step: self.point.step,
                successes: self.point.successes,
                steps: self.point.steps,
            },
            boundary_point: self.boundary_point.clone(),
            endgame: self.endgame.as_ref().map(|e| e.convert(precision)),
            endpoint: self.endpoint.as_ref().map(|x| x.convert(precision)),
        }
    }
}

fn status_for(issue: StepIssue) -> TrackStatus {
    match issue {
        StepIssue::Singular => TrackStatus::SingularJacobian,
        StepIssue::NonFinite => TrackStatus::NonFiniteValues,
        StepIssue::NotConverged => TrackStatus::StepSizeTooSmall,
    }
}

/// Tracks paths of one homotopy. Owns a double-precision evaluator for the
/// life of the tracker; multiprecision evaluators are built per path only
/// when a path needs them.
pub struct Tracker<'a, S: HomotopySource> {
    source: &'a S,
    settings: &'a TrackerSettings,
    double: S::Evaluator<Complex<f64>>,
    eval: HomotopyEval<Complex<f64>>,
}

impl<'a, S: HomotopySource> Tracker<'a, S> {
    pub fn new(source: &'a S, settings: &'a TrackerSettings) -> Result<Self> {
        settings.validate()?;
        let n = source.num_variables();
        Ok(Self {
            source,
            settings,
            double: source.materialize(DOUBLE_PRECISION),
            eval: HomotopyEval::new(n, DOUBLE_PRECISION),
        })
    }

    pub fn settings(&self) -> &TrackerSettings {
        self.settings
    }

    /// Tracks the path through `start` (a solution at `s = 1`) to `s = 0`.
    /// Path failures are reported in the result's status; only malformed
    /// input is an error.
    pub fn track(&mut self, start: &[Complex<f64>]) -> Result<EndgameResult> {
        let n = self.source.num_variables();
        if start.len() != n {
            bail!("Start point has {} coordinates, expected {}.", start.len(), n);
        }
        let settings = self.settings;
        let mut state = PathState::start(Vector::from_c64(start, DOUBLE_PRECISION), settings);
        let escalation = match settings.precision_mode {
            PrecisionMode::Double => Escalation::Never,
            PrecisionMode::Adaptive if settings.max_precision < FIRST_MP_PRECISION => Escalation::Exhausted,
            PrecisionMode::Adaptive => Escalation::Available,
        };
        if let Outcome::Finished(status) = run(&mut self.double, &mut self.eval, &mut state, settings, escalation) {
            return Ok(finish(&mut self.double, &mut self.eval, state, status, settings, None));
        }

        let raised_at = state.point.s;
        let mut precision = FIRST_MP_PRECISION;
        debug!(s = raised_at, precision, "raising working precision");
        let mut evaluator: S::Evaluator<MpComplex> = self.source.materialize(precision);
        let mut eval = HomotopyEval::new(n, precision);
        let mut mp_state: PathState<MpComplex> = state.convert(precision);
        loop {
            let escalation = if precision + settings.precision_increment > settings.max_precision {
                Escalation::Exhausted
            } else {
                Escalation::Available
            };
            match run(&mut evaluator, &mut eval, &mut mp_state, settings, escalation) {
                Outcome::Finished(status) => {
                    return Ok(finish(&mut evaluator, &mut eval, mp_state, status, settings, Some(raised_at)));
                }
                Outcome::RaisePrecision => {
                    precision += settings.precision_increment;
                    debug!(s = mp_state.point.s, precision, "raising working precision");
                    evaluator.change_precision(precision);
                    eval.change_precision(precision);
                    mp_state = mp_state.convert(precision);
                }
            }
        }
    }
}

/// Tracks to the endgame boundary, then samples towards zero until two
/// consecutive extrapolations agree.
fn run<T, H>(
    h: &mut H,
    eval: &mut HomotopyEval<T>,
    state: &mut PathState<T>,
    settings: &TrackerSettings,
    escalation: Escalation,
) -> Outcome
where
    T: ComplexScalar,
    H: Homotopy<T>,
{
    if state.endgame.is_none() {
        if state.point.s > settings.endgame_boundary {
            let target = settings.endgame_boundary;
            let tol = settings.tracking_tolerance;
            if let Err(outcome) = advance_to(h, eval, &mut state.point, target, tol, settings, escalation) {
                return outcome;
            }
        }
        state.boundary_point = Some(state.point.x.to_c64());
        let dx = match predictor::davidenko(h, eval, &state.point.x, state.point.s) {
            Ok(dx) => dx,
            Err(issue) => return Outcome::Finished(status_for(issue)),
        };
        let first = Sample {
            s: state.point.s,
            x: state.point.x.clone(),
            dx,
        };
        state.endgame = Some(EndgameState::new(first, settings.sample_factor));
    }

    let point = &mut state.point;
    let endgame = match state.endgame.as_mut() {
        Some(endgame) => endgame,
        None => return Outcome::Finished(TrackStatus::EndgameDidNotConverge),
    };
    loop {
        let target = endgame.next_s;
        if target < settings.min_endgame_parameter || endgame.taken >= settings.max_endgame_samples {
            return Outcome::Finished(TrackStatus::EndgameDidNotConverge);
        }
        if let Err(outcome) = advance_to(h, eval, point, target, settings.endgame_tolerance, settings, escalation) {
            return outcome;
        }
        let dx = match predictor::davidenko(h, eval, &point.x, point.s) {
            Ok(dx) => dx,
            Err(issue) => return Outcome::Finished(status_for(issue)),
        };
        endgame.push(Sample {
            s: point.s,
            x: point.x.clone(),
            dx,
        });
        endgame.next_s = target * settings.sample_factor;
        if endgame.samples.len() < 3 {
            continue;
        }

        let cycle = endgame::estimate_cycle_number(&endgame.samples, settings.max_cycle_number);
        let Some(approximation) = endgame::extrapolate(&endgame.samples, cycle) else {
            continue;
        };
        if !approximation.is_finite() {
            return Outcome::Finished(TrackStatus::NonFiniteValues);
        }
        endgame.cycle_number = cycle;
        trace!(s = point.s, cycle, "endgame sample");
        if let Some(previous) = &endgame.approximation {
            if approximation.distance(previous) <= settings.final_tolerance * approximation.norm().max(1.0) {
                state.endpoint = Some(approximation);
                return Outcome::Finished(TrackStatus::Success);
            }
        }
        endgame.approximation = Some(approximation);
    }
}

/// Steps from the current point down to `target`, adapting the step size.
fn advance_to<T, H>(
    h: &mut H,
    eval: &mut HomotopyEval<T>,
    point: &mut PathPoint<T>,
    target: f64,
    tol: f64,
    settings: &TrackerSettings,
    escalation: Escalation,
) -> Result<(), Outcome>
where
    T: ComplexScalar,
    H: Homotopy<T>,
{
    let headroom = 10f64.powf(settings.amp_safety_digits);
    while point.s > target {
        if point.steps >= settings.max_steps {
            return Err(Outcome::Finished(TrackStatus::MaxStepsExceeded));
        }
        point.steps += 1;

        let mut next_s = (point.s - point.step).max(target);
        if next_s - target < settings.min_step_size {
            next_s = target;
        }
        let ds = next_s - point.s;
        let corrected = match predictor::predict(settings.predictor, h, eval, &point.x, point.s, ds) {
            Ok(predicted) => {
                predictor::correct(h, eval, predicted, next_s, tol, settings.max_newton_its).ok()
            }
            Err(failure) if failure.at_accepted_point => {
                return Err(Outcome::Finished(status_for(failure.issue)));
            }
            Err(_) => None,
        };

        match corrected {
            Some(correction) => {
                point.x = correction.x;
                point.s = next_s;
                point.successes += 1;
                if point.successes >= settings.step_success_threshold {
                    point.step = (point.step * 2.0).min(settings.max_step_size);
                    point.successes = 0;
                }
                if point.x.norm() > settings.going_to_infinity {
                    return Err(Outcome::Finished(TrackStatus::GoingToInfinity));
                }
                if escalation != Escalation::Never {
                    let attainable = correction.pivot_ratio * T::unit_roundoff(point.x.precision()) * headroom;
                    if attainable > tol {
                        return Err(match escalation {
                            Escalation::Available => Outcome::RaisePrecision,
                            _ => Outcome::Finished(TrackStatus::PrecisionLimitReached),
                        });
                    }
                }
            }
            None => {
                point.successes = 0;
                point.step *= 0.5;
                if point.step < settings.min_step_size {
                    return Err(match escalation {
                        Escalation::Available => {
                            point.step = settings.initial_step_size.min(settings.max_step_size);
                            Outcome::RaisePrecision
                        }
                        _ => Outcome::Finished(TrackStatus::StepSizeTooSmall),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Sharpens a successful endpoint and computes its diagnostics.
fn finish<T, H>(
    h: &mut H,
    eval: &mut HomotopyEval<T>,
    state: PathState<T>,
    status: TrackStatus,
    settings: &TrackerSettings,
    precision_raised_at: Option<f64>,
) -> EndgameResult
where
    T: ComplexScalar,
    H: Homotopy<T>,
{
    let PathState {
        point,
        boundary_point,
        endgame,
        endpoint,
    } = state;
    let cycle_number = endgame.as_ref().map_or(1, |e| e.cycle_number);
    let (mut x, s) = match endpoint {
        Some(x) if status.is_success() => (x, 0.0),
        _ => (point.x, point.s),
    };
    if status.is_success() && settings.sharpen_digits > 0 {
        x = predictor::sharpen(h, eval, x, settings.sharpen_digits, SHARPEN_ITERATIONS);
    }

    h.evaluate(&x, s, eval);
    let function_residual = eval.values.norm();
    let newton_residual = eval
        .jacobian_vars
        .lu()
        .solve(&eval.values)
        .map_or(f64::INFINITY, |delta| delta.norm());
    let condition_number = eval.jacobian_vars.condition_number();
    trace!(%status, steps = point.steps, precision = x.precision(), "path finished");

    EndgameResult {
        point: EndPoint::from_vector(&x),
        status,
        precision: x.precision(),
        precision_raised_at,
        cycle_number,
        newton_residual,
        function_residual,
        condition_number,
        final_parameter: s,
        boundary_point,
        steps: point.steps,
    }
}

//! Tracks a batch of start points on a fixed-size worker pool.
//!
//! Each worker owns its own tracker (and therefore its own evaluators) and
//! pulls path indices from a shared atomic counter. Workers write results
//! and log lines into private buffers which are merged in worker order once
//! the pool has joined; results are then put back into submission order, so
//! the output does not depend on the thread count.

use crate::homotopy::DetjacHomotopy;
use crate::numeric::slice_distance;
use crate::slp::StraightLineProgram;
use crate::tracker::{EndgameResult, TrackStatus, Tracker, TrackerSettings};
use crate::traits::HomotopySource;
use crate::witness::WitnessSet;
use anyhow::{bail, Context, Result};
use num_complex::Complex;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchOptions {
    pub num_threads: usize,
    /// Track every path in the calling thread.
    pub force_serial: bool,
    /// Boundary points closer than this are reported as path crossings.
    pub midpoint_tolerance: f64,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            num_threads: std::thread::available_parallelism().map_or(1, |n| n.get()),
            force_serial: false,
            midpoint_tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailureReport {
    pub path_index: usize,
    pub status: TrackStatus,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingStats {
    pub successes: usize,
    pub failures: usize,
    pub total: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// One result per start point, in submission order.
    pub results: Vec<EndgameResult>,
    pub failures: Vec<FailureReport>,
    /// Pairs of path indices whose boundary points nearly coincide.
    pub crossings: Vec<(usize, usize)>,
    pub stats: TrackingStats,
    /// Per-path log lines, merged in worker order.
    pub log: Vec<String>,
}

#[derive(Debug)]
struct WorkerBuffer {
    worker: usize,
    results: Vec<(usize, EndgameResult)>,
    log: Vec<String>,
}

fn work<S: HomotopySource>(
    worker: usize,
    source: &S,
    settings: &TrackerSettings,
    starts: &[Vec<Complex<f64>>],
    next: &AtomicUsize,
) -> Result<WorkerBuffer> {
    let mut tracker = Tracker::new(source, settings)?;
    let mut buffer = WorkerBuffer {
        worker,
        results: Vec::new(),
        log: Vec::new(),
    };
    loop {
        let index = next.fetch_add(1, Ordering::Relaxed);
        let Some(start) = starts.get(index) else {
            break;
        };
        let result = tracker
            .track(start)
            .with_context(|| format!("Failed to track path {}", index))?;
        buffer.log.push(format!(
            "worker {} path {}: {} after {} steps at {} bits",
            worker, index, result.status, result.steps, result.precision
        ));
        buffer.results.push((index, result));
    }
    Ok(buffer)
}

/// Tracks every start point of `source` and collects the results.
pub fn track_batch<S: HomotopySource>(
    source: &S,
    starts: &[Vec<Complex<f64>>],
    settings: &TrackerSettings,
    options: &BatchOptions,
) -> Result<BatchOutcome> {
    settings.validate()?;
    let n = source.num_variables();
    if let Some((index, start)) = starts.iter().enumerate().find(|(_, p)| p.len() != n) {
        bail!("Start point {} has {} coordinates, expected {}.", index, start.len(), n);
    }

    let started = Instant::now();
    let next = AtomicUsize::new(0);
    let buffers: Vec<WorkerBuffer> = if options.force_serial || options.num_threads <= 1 || starts.len() <= 1 {
        vec![work(0, source, settings, starts, &next)?]
    } else {
        let pool = ThreadPoolBuilder::new()
            .num_threads(options.num_threads)
            .build()
            .context("Failed to build the tracking thread pool")?;
        pool.broadcast(|ctx| work(ctx.index(), source, settings, starts, &next))
            .into_iter()
            .collect::<Result<_>>()?
    };

    let mut log = Vec::new();
    let mut indexed = Vec::with_capacity(starts.len());
    for buffer in buffers {
        debug!(worker = buffer.worker, paths = buffer.results.len(), "worker finished");
        log.extend(buffer.log);
        indexed.extend(buffer.results);
    }
    indexed.sort_by_key(|(index, _)| *index);

    let mut failures = Vec::new();
    for (index, result) in &indexed {
        if !result.is_success() {
            let message = format!(
                "path {} stopped at s = {:.3e}: {}",
                index, result.final_parameter, result.status
            );
            warn!("{}", message);
            failures.push(FailureReport {
                path_index: *index,
                status: result.status,
                message,
            });
        }
    }
    let results: Vec<EndgameResult> = indexed.into_iter().map(|(_, r)| r).collect();
    let crossings = find_crossings(&results, options.midpoint_tolerance);

    let stats = TrackingStats {
        successes: results.len() - failures.len(),
        failures: failures.len(),
        total: results.len(),
        elapsed: started.elapsed(),
    };
    info!(
        successes = stats.successes,
        failures = stats.failures,
        total = stats.total,
        elapsed_ms = stats.elapsed.as_millis() as u64,
        "batch tracking finished"
    );

    Ok(BatchOutcome {
        results,
        failures,
        crossings,
        stats,
        log,
    })
}

/// Pairs of paths whose points at the endgame boundary are closer than
/// `tolerance`. Diagnostic only.
fn find_crossings(results: &[EndgameResult], tolerance: f64) -> Vec<(usize, usize)> {
    let mut crossings = Vec::new();
    for (i, a) in results.iter().enumerate() {
        let Some(pa) = &a.boundary_point else {
            continue;
        };
        for (j, b) in results.iter().enumerate().skip(i + 1) {
            let Some(pb) = &b.boundary_point else {
                continue;
            };
            if slice_distance(pa, pb) < tolerance {
                warn!(first = i, second = j, "paths may have crossed before the endgame");
                crossings.push((i, j));
            }
        }
    }
    crossings
}

/// Result of moving a witness set from one projection's critical points to
/// another's.
#[derive(Debug, Clone)]
pub struct DetjacSolve {
    pub witness_set: WitnessSet,
    pub failures: Vec<FailureReport>,
    pub stats: TrackingStats,
}

/// Tracks the critical points of `old_projection` in `witness_set` to those
/// of `new_projection`. The new set keeps the input's patches and carries
/// `new_projection` as its only linear; failed paths are left out.
#[allow(clippy::too_many_arguments)]
pub fn detjac_to_detjac_solve(
    witness_set: &WitnessSet,
    slp: &StraightLineProgram,
    randomizer: &[Vec<Complex<f64>>],
    old_projection: &[Complex<f64>],
    new_projection: &[Complex<f64>],
    gamma: Complex<f64>,
    settings: &TrackerSettings,
    options: &BatchOptions,
) -> Result<DetjacSolve> {
    witness_set.validate()?;
    if slp.num_variables() != witness_set.num_variables() {
        bail!(
            "The system has {} variables but the witness set has {}.",
            slp.num_variables(),
            witness_set.num_variables()
        );
    }
    let Some(patch) = witness_set.patches().first() else {
        bail!("The witness set has no patch equation.");
    };
    let homotopy = DetjacHomotopy::new(slp.clone(), randomizer, patch, gamma, old_projection, new_projection)?;
    let outcome = track_batch(&homotopy, witness_set.points(), settings, options)?;

    let mut solved = WitnessSet::new(witness_set.num_variables());
    for p in witness_set.patches() {
        solved = solved.with_patch(p.clone())?;
    }
    solved = solved.with_linear(new_projection.to_vec())?;
    for result in outcome.results.iter().filter(|r| r.is_success()) {
        solved = solved.with_point(result.point.to_c64())?;
    }
    Ok(DetjacSolve {
        witness_set: solved,
        failures: outcome.failures,
        stats: outcome.stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::homotopy::detjac::tests::{c, circle_program};
    use crate::homotopy::HomotopyEval;
    use crate::numeric::{ComplexScalar, Vector};
    use crate::traits::Homotopy;
    use std::f64::consts::PI;

    /// `(1 - s)(x^11 - 2) + gamma s (x^11 - x^2)`. The start system has the
    /// ninth roots of unity as regular roots and a double root at zero.
    struct Undecic {
        gamma: Complex<f64>,
    }

    struct UndecicEvaluator<T> {
        gamma: T,
        precision: u32,
    }

    impl HomotopySource for Undecic {
        type Evaluator<T: ComplexScalar> = UndecicEvaluator<T>;

        fn num_variables(&self) -> usize {
            1
        }

        fn materialize<T: ComplexScalar>(&self, precision: u32) -> UndecicEvaluator<T> {
            UndecicEvaluator {
                gamma: T::from_c64_at(self.gamma, precision),
                precision,
            }
        }
    }

    impl<T: ComplexScalar> Homotopy<T> for UndecicEvaluator<T> {
        fn num_variables(&self) -> usize {
            1
        }

        fn precision(&self) -> u32 {
            self.precision
        }

        fn change_precision(&mut self, precision: u32) {
            self.gamma.set_precision(precision);
            self.precision = precision;
        }

        fn evaluate(&mut self, x: &Vector<T>, s: f64, out: &mut HomotopyEval<T>) {
            let p = self.precision;
            let v = x[0].clone();
            let target = v.powi(11) - T::from_f64_at(2.0, 0.0, p);
            let start = v.powi(11) - v.powi(2);
            let d_target = v.powi(10).scale(11.0);
            let d_start = v.powi(10).scale(11.0) - v.scale(2.0);
            out.values[0] = target.scale(1.0 - s) + self.gamma.clone() * start.scale(s);
            out.jacobian_vars[(0, 0)] = d_target.scale(1.0 - s) + self.gamma.clone() * d_start.scale(s);
            out.jacobian_param[0] = self.gamma.clone() * start - target;
        }
    }

    fn starts() -> Vec<Vec<Complex<f64>>> {
        let mut starts: Vec<Vec<Complex<f64>>> = (0..9)
            .map(|k| vec![Complex::from_polar(1.0, 2.0 * PI * k as f64 / 9.0)])
            .collect();
        starts.insert(4, vec![c(0.0, 0.0)]);
        starts
    }

    fn run(options: BatchOptions) -> BatchOutcome {
        let source = Undecic { gamma: c(0.6, 0.8) };
        track_batch(&source, &starts(), &TrackerSettings::default(), &options).expect("batch")
    }

    #[test]
    fn singular_start_fails_alone_regardless_of_threads() {
        let serial = run(BatchOptions {
            force_serial: true,
            ..BatchOptions::default()
        });
        assert_eq!(serial.stats.total, 10);
        assert_eq!(serial.stats.successes, 9);
        assert_eq!(serial.stats.failures, 1);
        assert_eq!(serial.failures[0].path_index, 4);
        assert_eq!(serial.failures[0].status, TrackStatus::SingularJacobian);
        for result in serial.results.iter().filter(|r| r.is_success()) {
            let x = result.point.to_c64()[0];
            assert!((x.powi(11) - c(2.0, 0.0)).norm() < 1e-8);
        }

        for threads in [2, 4] {
            let parallel = run(BatchOptions {
                num_threads: threads,
                ..BatchOptions::default()
            });
            assert_eq!(parallel.stats.successes, 9);
            assert_eq!(parallel.failures, serial.failures);
            for (a, b) in serial.results.iter().zip(&parallel.results) {
                assert_eq!(a.status, b.status);
                assert_eq!(a.point.to_c64(), b.point.to_c64());
            }
        }
    }

    #[test]
    fn crossing_check_pairs_every_boundary_point_under_huge_tolerance() {
        let outcome = run(BatchOptions {
            force_serial: true,
            midpoint_tolerance: 10.0,
            ..BatchOptions::default()
        });
        assert_eq!(outcome.crossings.len(), 9 * 8 / 2);
        assert!(outcome.crossings.iter().all(|&(i, j)| i != 4 && j != 4 && i < j));

        let strict = run(BatchOptions {
            force_serial: true,
            ..BatchOptions::default()
        });
        assert!(strict.crossings.is_empty());
        assert_eq!(strict.log.len(), 10);
    }

    #[test]
    fn detjac_solve_moves_circle_critical_points() {
        let one = c(1.0, 0.0);
        let zero = c(0.0, 0.0);
        let witness = WitnessSet::new(3)
            .with_point(vec![one, one, zero])
            .and_then(|w| w.with_point(vec![one, -one, zero]))
            .and_then(|w| w.with_linear(vec![zero, one, zero]))
            .and_then(|w| w.with_patch(vec![one, zero, zero]))
            .expect("witness set");
        let solved = detjac_to_detjac_solve(
            &witness,
            &circle_program(),
            &[vec![one]],
            &[zero, one, zero],
            &[zero, zero, one],
            c(0.6, 0.8),
            &TrackerSettings::default(),
            &BatchOptions {
                num_threads: 2,
                ..BatchOptions::default()
            },
        )
        .expect("solve");
        assert!(solved.failures.is_empty());
        let set = solved.witness_set;
        assert_eq!(set.num_points(), 2);
        assert_eq!(set.linears(), &[vec![zero, zero, one]]);
        assert_eq!(set.patches(), witness.patches());
        for p in set.points() {
            assert!(p[1].norm() < 1e-8);
            assert!((p[2].norm() - 1.0).abs() < 1e-8);
        }
        assert!((set.points()[0][2] + set.points()[1][2]).norm() < 1e-8);
    }

    #[test]
    fn mismatched_start_is_rejected_before_tracking() {
        let source = Undecic { gamma: c(0.6, 0.8) };
        let starts = vec![vec![c(1.0, 0.0), c(0.0, 0.0)]];
        assert!(track_batch(&source, &starts, &TrackerSettings::default(), &BatchOptions::default()).is_err());
    }
}

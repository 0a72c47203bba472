//! Sampling policies.
//!
//! Fixed and semi-fixed sampling solve a precomputed list of projection
//! targets from the edge midpoint in a single pass. The two adaptive
//! policies repeatedly bisect flagged intervals, in projection value, until
//! a geometric test settles every interval or the pass limit is reached.

use super::{Curve, EdgeRefinement, VertexSet, VertexType};
use crate::error::FatalError;
use crate::homotopy::{dehomogenize, projection_value};
use crate::numeric::slice_distance;
use anyhow::{bail, Result};
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    Fixed,
    SemiFixed,
    AdaptiveMovement,
    AdaptiveDistance,
}

/// What to do when moving a point to a new projection value yields nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyResultPolicy {
    /// Stop sampling with an [`FatalError::EmptySolve`].
    Abort,
    /// Leave the interval unrefined and carry on.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub mode: SamplingMode,
    /// Samples per edge, endpoints included, for fixed sampling.
    pub target_num_samples: usize,
    /// Samples per edge for semi-fixed sampling, by projection interval.
    pub num_samples_per_interval: Vec<usize>,
    pub use_uniform_cycle_num: bool,
    pub cycle_num: u32,
    /// Geometric tolerance of the adaptive tests.
    pub tolerance: f64,
    pub minimum_num_iterations: usize,
    pub maximum_num_iterations: usize,
    pub no_duplicates: bool,
    pub on_empty_solve: EmptyResultPolicy,
    /// Worker threads for distributed sampling; one samples in place.
    pub parallel_workers: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            mode: SamplingMode::AdaptiveDistance,
            target_num_samples: 10,
            num_samples_per_interval: Vec::new(),
            use_uniform_cycle_num: false,
            cycle_num: 1,
            tolerance: 0.1,
            minimum_num_iterations: 2,
            maximum_num_iterations: 10,
            no_duplicates: true,
            on_empty_solve: EmptyResultPolicy::Skip,
            parallel_workers: 1,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<()> {
        match self.mode {
            SamplingMode::Fixed if self.target_num_samples < 2 => {
                bail!("target_num_samples must be at least 2, got {}.", self.target_num_samples);
            }
            SamplingMode::SemiFixed if self.num_samples_per_interval.iter().any(|&n| n < 2) => {
                bail!("Every entry of num_samples_per_interval must be at least 2.");
            }
            SamplingMode::AdaptiveMovement | SamplingMode::AdaptiveDistance if !(self.tolerance > 0.0) => {
                bail!("The sampling tolerance must be positive.");
            }
            _ => {}
        }
        if self.use_uniform_cycle_num && self.cycle_num == 0 {
            bail!("cycle_num must be at least 1.");
        }
        Ok(())
    }
}

/// Moves a point along the curve from one value of the curve's projection
/// to another.
pub trait ProjectionMover {
    /// Returns the point over `target_value` reached from `start`, which
    /// lies over `start_value`, or `None` when the solve produced nothing.
    fn move_to(
        &mut self,
        start: &[Complex<f64>],
        start_value: Complex<f64>,
        target_value: Complex<f64>,
    ) -> Result<Option<Vec<Complex<f64>>>>;

    /// Sets whether the mover may use parallelism of its own and returns the
    /// previous setting.
    fn set_force_serial(&mut self, force_serial: bool) -> bool;
}

/// Samples every edge of `curve` in place, appending new points to
/// `vertices`.
pub fn sample<M: ProjectionMover>(
    curve: &mut Curve,
    vertices: &mut VertexSet,
    config: &SamplerConfig,
    mover: &mut M,
) -> Result<()> {
    config.validate()?;
    curve.validate(vertices)?;
    let before = vertices.len();
    for edge in 0..curve.num_edges() {
        sample_edge(curve, vertices, config, mover, edge)?;
    }
    info!(
        edges = curve.num_edges(),
        new_vertices = vertices.len() - before,
        mode = ?config.mode,
        "curve sampled"
    );
    Ok(())
}

/// Samples a single edge. The mover is held serial for the duration and its
/// previous setting restored afterwards.
pub fn sample_edge<M: ProjectionMover>(
    curve: &mut Curve,
    vertices: &mut VertexSet,
    config: &SamplerConfig,
    mover: &mut M,
    edge: usize,
) -> Result<()> {
    if edge >= curve.num_edges() {
        bail!("Edge {} does not exist; the curve has {} edges.", edge, curve.num_edges());
    }
    let projection = vertices.add_projection(curve.projection())?;
    let previous = mover.set_force_serial(true);
    let outcome = {
        let mut ctx = EdgeSampler {
            curve: &mut *curve,
            vertices: &mut *vertices,
            config,
            mover: &mut *mover,
            edge,
            projection,
        };
        match config.mode {
            SamplingMode::Fixed => ctx.fixed(),
            SamplingMode::SemiFixed => ctx.semi_fixed(),
            SamplingMode::AdaptiveMovement => ctx.adaptive(RefinementTest::Movement),
            SamplingMode::AdaptiveDistance => ctx.adaptive(RefinementTest::Distance),
        }
    };
    mover.set_force_serial(previous);
    outcome?;
    debug!(edge, samples = curve.samples(edge).len(), "edge sampled");
    Ok(())
}

/// Warps a raw sample parameter `p` in `[0, 1]` so that samples cluster
/// towards endpoints with cycle number above one.
pub fn scale_by_cycle_numbers(p: f64, left: u32, right: u32) -> f64 {
    let (l, r) = (left.max(1) as i32, right.max(1) as i32);
    match (l, r) {
        (1, 1) => p,
        (_, 1) => p.powi(l),
        (1, _) => 1.0 - (1.0 - p).powi(r),
        _ if p < 0.5 => 0.5 * (2.0 * p).powi(l),
        _ => 1.0 - 0.5 * (2.0 * (1.0 - p)).powi(r),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefinementTest {
    /// Distance between the solved point and the chord midpoint.
    Movement,
    /// Distance between the solved point and each interval endpoint.
    Distance,
}

struct EdgeSampler<'a, M> {
    curve: &'a mut Curve,
    vertices: &'a mut VertexSet,
    config: &'a SamplerConfig,
    mover: &'a mut M,
    edge: usize,
    projection: usize,
}

impl<M: ProjectionMover> EdgeSampler<'_, M> {
    fn point(&self, index: usize) -> &[Complex<f64>] {
        &self.vertices.vertices()[index].point
    }

    fn value(&self, index: usize) -> Complex<f64> {
        self.vertices.vertices()[index].projection_values[self.projection]
    }

    fn store(&mut self, point: Vec<Complex<f64>>) -> Result<usize> {
        if self.config.no_duplicates {
            self.vertices.index_in_vertices_with_add(point, VertexType::CurveSamplePoint)
        } else {
            self.vertices.add_vertex(point, VertexType::CurveSamplePoint)
        }
    }

    /// Applies the empty-solve policy; `Ok` means skip.
    fn empty_solve(&self, target: Complex<f64>) -> Result<()> {
        match self.config.on_empty_solve {
            EmptyResultPolicy::Abort => Err(FatalError::EmptySolve { edge: self.edge }.into()),
            EmptyResultPolicy::Skip => {
                warn!(edge = self.edge, target = %target, "moving to projection value produced no point; skipping");
                Ok(())
            }
        }
    }

    fn fixed(&mut self) -> Result<()> {
        let count = self.config.target_num_samples;
        self.single_pass(|q| q as f64 / (count - 1) as f64, count)
    }

    fn semi_fixed(&mut self) -> Result<()> {
        let edge = self.curve.edge(self.edge);
        if edge.is_degenerate() {
            return self.single_pass(|q| q as f64, 2);
        }
        let bucket = self.bucket(edge.midpt);
        let Some(&count) = self.config.num_samples_per_interval.get(bucket) else {
            bail!(
                "Edge {} lies in projection interval {} but num_samples_per_interval has {} entries.",
                self.edge,
                bucket,
                self.config.num_samples_per_interval.len()
            );
        };
        let (left, right) = if self.config.use_uniform_cycle_num {
            (self.config.cycle_num, self.config.cycle_num)
        } else {
            let meta = self.curve.metadata(self.edge);
            (meta.left_cycle_number, meta.right_cycle_number)
        };
        self.single_pass(|q| scale_by_cycle_numbers(q as f64 / (count - 1) as f64, left, right), count)
    }

    /// Index of the interval, between sorted distinct endpoint projection
    /// values over all non-degenerate edges, containing `vertex`'s value.
    fn bucket(&self, vertex: usize) -> usize {
        let mut breaks: Vec<f64> = self
            .curve
            .edges()
            .iter()
            .filter(|e| !e.is_degenerate())
            .flat_map(|e| [e.left, e.right])
            .map(|i| self.value(i).re)
            .collect();
        breaks.sort_by(f64::total_cmp);
        breaks.dedup();
        let value = self.value(vertex).re;
        let above = breaks.iter().filter(|&&b| b <= value).count();
        above.saturating_sub(1).min(breaks.len().saturating_sub(2))
    }

    /// Solves `count - 2` interior targets from the edge midpoint, placing
    /// target `q` at `left + parameter(q) * (right - left)`.
    fn single_pass<F: Fn(usize) -> f64>(&mut self, parameter: F, count: usize) -> Result<()> {
        let edge = self.curve.edge(self.edge);
        if edge.is_degenerate() {
            self.curve.set_samples(self.edge, vec![edge.midpt]);
            return Ok(());
        }
        if self.curve.samples(self.edge).len() > 2 {
            // Single-pass policies never revisit a sampled edge.
            return Ok(());
        }
        let left_value = self.value(edge.left);
        let right_value = self.value(edge.right);
        let start = self.point(edge.midpt).to_vec();
        let start_value = self.value(edge.midpt);

        let mut samples = vec![edge.left];
        for q in 1..count.saturating_sub(1) {
            let target = left_value + (right_value - left_value) * parameter(q);
            match self.mover.move_to(&start, start_value, target)? {
                Some(point) => {
                    let index = self.store(point)?;
                    samples.push(index);
                }
                None => self.empty_solve(target)?,
            }
        }
        samples.push(edge.right);
        self.curve.set_samples(self.edge, samples);
        Ok(())
    }

    fn initial_refinement(&self) -> (Vec<usize>, EdgeRefinement) {
        let edge = self.curve.edge(self.edge);
        let existing = self.curve.samples(self.edge);
        let indices = if existing.len() >= 2 {
            existing.to_vec()
        } else {
            vec![edge.left, edge.midpt, edge.right]
        };
        let refinement = match self.curve.refinement(self.edge) {
            Some(r) if r.flags.len() + 1 == indices.len() => r.clone(),
            _ => EdgeRefinement {
                flags: indices.windows(2).map(|w| w[0] != w[1]).collect(),
                passes_done: 0,
            },
        };
        (indices, refinement)
    }

    fn adaptive(&mut self, test: RefinementTest) -> Result<()> {
        let edge = self.curve.edge(self.edge);
        if edge.is_degenerate() {
            self.curve.set_samples(self.edge, vec![edge.midpt]);
            self.curve.set_refinement(self.edge, Some(EdgeRefinement::default()));
            return Ok(());
        }
        let (mut indices, mut state) = self.initial_refinement();
        let tol = self.config.tolerance;
        // Movement sampling runs one pass beyond the limit before stopping.
        let max_passes = match test {
            RefinementTest::Movement => self.config.maximum_num_iterations + 1,
            RefinementTest::Distance => self.config.maximum_num_iterations,
        };

        while !state.is_settled() && state.passes_done < max_passes {
            let forced = state.passes_done + 1 < self.config.minimum_num_iterations;
            let mut next_indices = vec![indices[0]];
            let mut next_flags = Vec::with_capacity(state.flags.len() * 2);

            for (jj, pair) in indices.windows(2).enumerate() {
                let (left, right) = (pair[0], pair[1]);
                if !state.flags[jj] {
                    next_indices.push(right);
                    next_flags.push(false);
                    continue;
                }
                // The first interval is approached from its right end.
                let start = if jj == 0 { right } else { left };
                let dehom_left = dehomogenize(self.point(left));
                let dehom_right = dehomogenize(self.point(right));
                let estimate: Vec<Complex<f64>> = dehom_left
                    .iter()
                    .zip(&dehom_right)
                    .map(|(a, b)| (a + b) * 0.5)
                    .collect();
                let mut estimate_h = Vec::with_capacity(estimate.len() + 1);
                estimate_h.push(Complex::new(1.0, 0.0));
                estimate_h.extend_from_slice(&estimate);
                let target = projection_value(&estimate_h, self.curve.projection());

                let start_point = self.point(start).to_vec();
                let start_value = self.value(start);
                let Some(point) = self.mover.move_to(&start_point, start_value, target)? else {
                    self.empty_solve(target)?;
                    next_indices.push(right);
                    next_flags.push(false);
                    continue;
                };
                let solved = dehomogenize(&point);
                let index = self.store(point)?;

                let (refine_left, refine_right) = match test {
                    RefinementTest::Movement => {
                        let moved = slice_distance(&solved, &estimate) > tol;
                        (moved || forced, moved || forced)
                    }
                    RefinementTest::Distance => (
                        slice_distance(&solved, &dehom_left) > tol,
                        slice_distance(&solved, &dehom_right) > tol,
                    ),
                };
                next_indices.push(index);
                next_indices.push(right);
                next_flags.push(refine_left && index != left);
                next_flags.push(refine_right && index != right);
            }

            state.passes_done += 1;
            if test == RefinementTest::Distance && state.passes_done < self.config.minimum_num_iterations {
                for (flag, pair) in next_flags.iter_mut().zip(next_indices.windows(2)) {
                    *flag = pair[0] != pair[1];
                }
            }
            debug!(
                edge = self.edge,
                pass = state.passes_done,
                samples = next_indices.len(),
                pending = next_flags.iter().filter(|&&f| f).count(),
                "refinement pass"
            );
            indices = next_indices;
            state.flags = next_flags;
        }

        self.curve.set_samples(self.edge, indices);
        self.curve.set_refinement(self.edge, Some(state));
        Ok(())
    }
}

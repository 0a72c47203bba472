//! Curve decompositions and their sampling.
//!
//! A [`Curve`] is a set of edges over an append-only [`VertexSet`]. Sampling
//! fills a per-edge table of vertex indices running from the edge's left
//! vertex to its right vertex, refining it by moving existing vertices to
//! new projection values with a [`ProjectionMover`].

pub mod distributed;
pub mod mover;
pub mod sampler;
pub mod vertex;

pub use distributed::{sample_distributed, Snapshot, ToCoordinator, ToWorker};
pub use mover::TrackerMover;
pub use sampler::{
    sample, sample_edge, scale_by_cycle_numbers, EmptyResultPolicy, ProjectionMover, SamplerConfig, SamplingMode,
};
pub use vertex::{Vertex, VertexSet, VertexType};

use anyhow::{bail, Result};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub left: usize,
    pub midpt: usize,
    pub right: usize,
}

impl Edge {
    pub fn new(left: usize, midpt: usize, right: usize) -> Self {
        Self { left, midpt, right }
    }

    pub fn is_degenerate(&self) -> bool {
        self.left == self.midpt && self.midpt == self.right
    }
}

/// Cycle numbers at the endpoints of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeMetadata {
    pub left_cycle_number: u32,
    pub right_cycle_number: u32,
}

impl Default for EdgeMetadata {
    fn default() -> Self {
        Self {
            left_cycle_number: 1,
            right_cycle_number: 1,
        }
    }
}

/// Refinement progress of an edge under an adaptive policy. `flags[i]`
/// marks the interval between samples `i` and `i + 1` for another pass.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EdgeRefinement {
    pub flags: Vec<bool>,
    pub passes_done: usize,
}

impl EdgeRefinement {
    pub fn is_settled(&self) -> bool {
        !self.flags.iter().any(|&f| f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    num_variables: usize,
    /// Name of the file the curve was decomposed from.
    #[serde(default)]
    input_filename: String,
    projection: Vec<Complex<f64>>,
    edges: Vec<Edge>,
    #[serde(default)]
    metadata: Vec<EdgeMetadata>,
    #[serde(default)]
    samples: Vec<Vec<usize>>,
    #[serde(default)]
    refinement: Vec<Option<EdgeRefinement>>,
}

impl Curve {
    pub fn new(num_variables: usize, projection: Vec<Complex<f64>>, input_filename: impl Into<String>) -> Result<Self> {
        if projection.len() != num_variables {
            bail!(
                "Projection has {} coefficients; the curve has {} variables.",
                projection.len(),
                num_variables
            );
        }
        Ok(Self {
            num_variables,
            input_filename: input_filename.into(),
            projection,
            edges: Vec::new(),
            metadata: Vec::new(),
            samples: Vec::new(),
            refinement: Vec::new(),
        })
    }

    pub fn add_edge(&mut self, edge: Edge, metadata: EdgeMetadata) -> usize {
        self.edges.push(edge);
        self.metadata.push(metadata);
        self.samples.push(Vec::new());
        self.refinement.push(None);
        self.edges.len() - 1
    }

    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    pub fn input_filename(&self) -> &str {
        &self.input_filename
    }

    pub fn projection(&self) -> &[Complex<f64>] {
        &self.projection
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge(&self, index: usize) -> Edge {
        self.edges[index]
    }

    pub fn metadata(&self, index: usize) -> EdgeMetadata {
        self.metadata.get(index).copied().unwrap_or_default()
    }

    pub fn samples(&self, index: usize) -> &[usize] {
        self.samples.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn sample_table(&self) -> &[Vec<usize>] {
        &self.samples
    }

    pub fn refinement(&self, index: usize) -> Option<&EdgeRefinement> {
        self.refinement.get(index).and_then(|r| r.as_ref())
    }

    pub(crate) fn set_samples(&mut self, index: usize, samples: Vec<usize>) {
        self.samples[index] = samples;
    }

    pub(crate) fn set_refinement(&mut self, index: usize, refinement: Option<EdgeRefinement>) {
        self.refinement[index] = refinement;
    }

    /// Checks edge indices against `vertices` and pads per-edge tables,
    /// e.g. after deserialisation.
    pub fn validate(&mut self, vertices: &VertexSet) -> Result<()> {
        if vertices.num_variables() != self.num_variables {
            bail!(
                "The curve has {} variables but the vertex set has {}.",
                self.num_variables,
                vertices.num_variables()
            );
        }
        if self.projection.len() != self.num_variables {
            bail!("The curve projection has the wrong length.");
        }
        for (i, e) in self.edges.iter().enumerate() {
            if e.left >= vertices.len() || e.midpt >= vertices.len() || e.right >= vertices.len() {
                bail!(
                    "Edge {} ({}, {}, {}) refers past the {} vertices.",
                    i,
                    e.left,
                    e.midpt,
                    e.right,
                    vertices.len()
                );
            }
        }
        for (i, samples) in self.samples.iter().enumerate() {
            if let Some(bad) = samples.iter().find(|&&v| v >= vertices.len()) {
                bail!("Sample table of edge {} refers to missing vertex {}.", i, bad);
            }
        }
        let n = self.edges.len();
        self.metadata.resize(n, EdgeMetadata::default());
        self.samples.resize(n, Vec::new());
        self.refinement.resize(n, None);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::homotopy::projection_value;

    pub(crate) fn c(re: f64) -> Complex<f64> {
        Complex::new(re, 0.0)
    }

    pub(crate) fn parabola_point(t: f64) -> Vec<Complex<f64>> {
        vec![c(1.0), c(t), c(t * t)]
    }

    /// One edge of `y = x^2` over `x` in `[a, b]`, projected onto `x`.
    pub(crate) fn parabola_edge(a: f64, b: f64) -> (Curve, VertexSet) {
        let mut vertices = VertexSet::new(3);
        let left = vertices.add_vertex(parabola_point(a), VertexType::Critical).expect("vertex");
        let right = vertices.add_vertex(parabola_point(b), VertexType::Critical).expect("vertex");
        let midpt = vertices
            .add_vertex(parabola_point(0.5 * (a + b)), VertexType::Midpoint)
            .expect("vertex");
        let mut curve = Curve::new(3, vec![c(0.0), c(1.0), c(0.0)], "parabola").expect("curve");
        curve.add_edge(Edge::new(left, midpt, right), EdgeMetadata::default());
        (curve, vertices)
    }

    /// Moves along the parabola exactly.
    #[derive(Debug, Default)]
    pub(crate) struct ExactParabola {
        pub serial: bool,
        pub calls: usize,
        pub saw_parallel: bool,
    }

    impl ProjectionMover for ExactParabola {
        fn move_to(
            &mut self,
            _start: &[Complex<f64>],
            _start_value: Complex<f64>,
            target_value: Complex<f64>,
        ) -> Result<Option<Vec<Complex<f64>>>> {
            self.calls += 1;
            self.saw_parallel |= !self.serial;
            Ok(Some(parabola_point(target_value.re)))
        }

        fn set_force_serial(&mut self, force_serial: bool) -> bool {
            std::mem::replace(&mut self.serial, force_serial)
        }
    }

    pub(crate) fn projection_values(curve: &Curve, vertices: &VertexSet, edge: usize) -> Vec<f64> {
        curve
            .samples(edge)
            .iter()
            .map(|&i| projection_value(&vertices.vertices()[i].point, curve.projection()).re)
            .collect()
    }

    #[test]
    fn degenerate_edges_are_recognised() {
        assert!(Edge::new(3, 3, 3).is_degenerate());
        assert!(!Edge::new(3, 4, 3).is_degenerate());
    }

    #[test]
    fn validate_rejects_dangling_edges_and_pads_tables() {
        let (mut curve, vertices) = parabola_edge(0.0, 1.0);
        curve.metadata.clear();
        curve.samples.clear();
        assert!(curve.validate(&vertices).is_ok());
        assert_eq!(curve.metadata(0), EdgeMetadata::default());
        assert!(curve.samples(0).is_empty());

        curve.add_edge(Edge::new(0, 7, 1), EdgeMetadata::default());
        assert!(curve.validate(&vertices).is_err());
    }
}

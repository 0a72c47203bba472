use crate::homotopy::{dehomogenize, projection_value};
use crate::numeric::slice_distance;
use anyhow::{bail, Result};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexType {
    CurveSamplePoint,
    Critical,
    Semicritical,
    Midpoint,
    Isolated,
    NewType,
}

impl VertexType {
    pub fn code(self) -> i32 {
        match self {
            VertexType::CurveSamplePoint => 0,
            VertexType::Critical => 1,
            VertexType::Semicritical => 2,
            VertexType::Midpoint => 3,
            VertexType::Isolated => 4,
            VertexType::NewType => 5,
        }
    }
}

/// A homogeneous point on the curve with its value under every registered
/// projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub point: Vec<Complex<f64>>,
    #[serde(default)]
    pub projection_values: Vec<Complex<f64>>,
    #[serde(rename = "type")]
    pub kind: VertexType,
}

fn default_same_point_tolerance() -> f64 {
    1e-8
}

/// Append-only store of curve vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexSet {
    num_variables: usize,
    #[serde(default)]
    projections: Vec<Vec<Complex<f64>>>,
    #[serde(default)]
    vertices: Vec<Vertex>,
    /// Dehomogenised distance under which two points are the same vertex.
    #[serde(default = "default_same_point_tolerance")]
    same_point_tolerance: f64,
}

impl VertexSet {
    pub fn new(num_variables: usize) -> Self {
        Self {
            num_variables,
            projections: Vec::new(),
            vertices: Vec::new(),
            same_point_tolerance: default_same_point_tolerance(),
        }
    }

    pub fn with_same_point_tolerance(mut self, tolerance: f64) -> Self {
        self.same_point_tolerance = tolerance;
        self
    }

    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Vertex> {
        self.vertices.get(index)
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn projections(&self) -> &[Vec<Complex<f64>>] {
        &self.projections
    }

    /// Registers `projection`, filling in its value at every existing vertex.
    /// Returns the index of an identical projection if one is registered.
    /// Vertices whose value list is out of step with the registered
    /// projections are recomputed first.
    pub fn add_projection(&mut self, projection: &[Complex<f64>]) -> Result<usize> {
        if projection.len() != self.num_variables {
            bail!(
                "Projection has {} coefficients; the vertex set has {} variables.",
                projection.len(),
                self.num_variables
            );
        }
        let stale = self
            .vertices
            .iter()
            .any(|v| v.projection_values.len() != self.projections.len());
        if stale {
            self.refresh_projection_values();
        }
        if let Some(index) = self.projections.iter().position(|p| p.as_slice() == projection) {
            return Ok(index);
        }
        for vertex in &mut self.vertices {
            vertex.projection_values.push(projection_value(&vertex.point, projection));
        }
        self.projections.push(projection.to_vec());
        Ok(self.projections.len() - 1)
    }

    /// Appends a vertex unconditionally and returns its index.
    pub fn add_vertex(&mut self, point: Vec<Complex<f64>>, kind: VertexType) -> Result<usize> {
        if point.len() != self.num_variables {
            bail!(
                "Vertex has {} coordinates; the vertex set has {} variables.",
                point.len(),
                self.num_variables
            );
        }
        let projection_values = self.projections.iter().map(|p| projection_value(&point, p)).collect();
        self.vertices.push(Vertex {
            point,
            projection_values,
            kind,
        });
        Ok(self.vertices.len() - 1)
    }

    /// Index of a vertex within `same_point_tolerance` of `point`.
    pub fn search_for_point(&self, point: &[Complex<f64>]) -> Option<usize> {
        let target = dehomogenize(point);
        self.vertices
            .iter()
            .position(|v| slice_distance(&dehomogenize(&v.point), &target) < self.same_point_tolerance)
    }

    /// Reuses a matching vertex or appends a new one.
    pub fn index_in_vertices_with_add(&mut self, point: Vec<Complex<f64>>, kind: VertexType) -> Result<usize> {
        match self.search_for_point(&point) {
            Some(index) => Ok(index),
            None => self.add_vertex(point, kind),
        }
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.vertices.truncate(len);
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(p) = self.projections.iter().find(|p| p.len() != self.num_variables) {
            bail!("A projection has {} coefficients, expected {}.", p.len(), self.num_variables);
        }
        for (i, v) in self.vertices.iter().enumerate() {
            if v.point.len() != self.num_variables {
                bail!("Vertex {} has {} coordinates, expected {}.", i, v.point.len(), self.num_variables);
            }
        }
        Ok(())
    }

    /// Recomputes every vertex's projection values from the registered
    /// projections, e.g. after deserialisation.
    pub fn refresh_projection_values(&mut self) {
        for vertex in &mut self.vertices {
            vertex.projection_values = self
                .projections
                .iter()
                .map(|p| projection_value(&vertex.point, p))
                .collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(re: f64) -> Complex<f64> {
        Complex::new(re, 0.0)
    }

    #[test]
    fn duplicates_are_found_after_dehomogenising() {
        let mut set = VertexSet::new(3);
        let first = set.add_vertex(vec![c(1.0), c(0.5), c(0.25)], VertexType::CurveSamplePoint).expect("add");
        let again = set
            .index_in_vertices_with_add(vec![c(2.0), c(1.0), c(0.5)], VertexType::CurveSamplePoint)
            .expect("add");
        assert_eq!(first, again);
        assert_eq!(set.len(), 1);
        let other = set
            .index_in_vertices_with_add(vec![c(1.0), c(0.6), c(0.36)], VertexType::Critical)
            .expect("add");
        assert_eq!(other, 1);
    }

    #[test]
    fn projections_fill_values_for_old_and_new_vertices() {
        let mut set = VertexSet::new(3);
        set.add_vertex(vec![c(2.0), c(1.0), c(0.5)], VertexType::Critical).expect("add");
        let pi = [c(0.0), c(1.0), c(0.0)];
        assert_eq!(set.add_projection(&pi).expect("projection"), 0);
        assert_eq!(set.add_projection(&pi).expect("projection"), 0);
        set.add_vertex(vec![c(1.0), c(0.8), c(0.64)], VertexType::Midpoint).expect("add");
        let values: Vec<_> = set.vertices().iter().map(|v| v.projection_values[0]).collect();
        assert_eq!(values, vec![c(0.5), c(0.8)]);
        assert!(set.add_vertex(vec![c(1.0)], VertexType::Critical).is_err());
    }

    #[test]
    fn registering_a_known_projection_backfills_missing_values() {
        let text = r#"{
            "num_variables": 3,
            "projections": [[[0.0, 0.0], [1.0, 0.0], [0.0, 0.0]]],
            "vertices": [
                {"point": [[2.0, 0.0], [1.0, 0.0], [0.5, 0.0]], "type": "critical"},
                {"point": [[1.0, 0.0], [0.8, 0.0], [0.64, 0.0]], "type": "midpoint"}
            ]
        }"#;
        let mut set: VertexSet = serde_json::from_str(text).expect("parse");
        assert!(set.vertices().iter().all(|v| v.projection_values.is_empty()));
        let pi = [c(0.0), c(1.0), c(0.0)];
        assert_eq!(set.add_projection(&pi).expect("projection"), 0);
        let values: Vec<_> = set.vertices().iter().map(|v| v.projection_values[0]).collect();
        assert_eq!(values, vec![c(0.5), c(0.8)]);
    }
}

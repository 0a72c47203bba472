//! JSON problem descriptions. Paths inside a problem file are relative to
//! the file's own directory.

use anyhow::{bail, Context, Result};
use curvetrack_core::curve::{Curve, VertexSet};
use curvetrack_core::error::FatalError;
use curvetrack_core::homotopy::random_matrix;
use curvetrack_core::slp::StraightLineProgram;
use num_complex::Complex;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

type Coefficients = Vec<Complex<f64>>;

/// Moves the critical points of one projection on a curve to those of
/// another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackProblem {
    pub system: StraightLineProgram,
    /// `(n - 2) x m` randomizer; drawn from the run's seed when absent.
    #[serde(default)]
    pub randomizer: Option<Vec<Coefficients>>,
    pub witness_set: PathBuf,
    pub old_projection: Coefficients,
    pub new_projection: Coefficients,
}

/// A decomposed curve component to sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleProblem {
    pub system: StraightLineProgram,
    #[serde(default)]
    pub randomizer: Option<Vec<Coefficients>>,
    /// Patch for the projection moves; drawn from the run's seed when absent.
    #[serde(default)]
    pub patch: Option<Coefficients>,
    pub curve: Curve,
    pub vertices: VertexSet,
    #[serde(default)]
    pub component: usize,
    /// Copied into the results directory when given.
    #[serde(default)]
    pub witness_set: Option<PathBuf>,
    #[serde(default)]
    pub deflated_input: Option<PathBuf>,
}

pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).map_err(|e| FatalError::resource(path, e))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid problem file {}", path.display()))
}

/// Resolves `relative` against the directory holding `problem_file`.
pub fn resolve(problem_file: &Path, relative: &Path) -> PathBuf {
    match problem_file.parent() {
        Some(dir) if relative.is_relative() => dir.join(relative),
        _ => relative.to_path_buf(),
    }
}

/// The given randomizer, or a random one of the right shape.
pub fn randomizer_or_random<R: Rng + ?Sized>(
    given: Option<Vec<Coefficients>>,
    system: &StraightLineProgram,
    rng: &mut R,
) -> Result<Vec<Coefficients>> {
    let n = system.num_variables();
    if n < 2 {
        return Err(FatalError::InputSystem(format!("a curve needs at least two homogeneous variables, got {}", n)).into());
    }
    match given {
        Some(randomizer) => Ok(randomizer),
        None => Ok(random_matrix(rng, n - 2, system.num_functions())),
    }
}

impl SampleProblem {
    /// Checks the curve against the vertex set and the system.
    pub fn validate(&mut self) -> Result<()> {
        self.vertices.validate()?;
        self.vertices.refresh_projection_values();
        self.curve.validate(&self.vertices)?;
        if self.curve.num_variables() != self.system.num_variables() {
            bail!(
                "The curve has {} variables but the system has {}.",
                self.curve.num_variables(),
                self.system.num_variables()
            );
        }
        Ok(())
    }

    /// Name the results directory is derived from.
    pub fn input_name(&self, problem_file: &Path) -> String {
        let named = Path::new(self.curve.input_filename())
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty());
        named.unwrap_or_else(|| {
            problem_file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "input".to_string())
        })
    }
}

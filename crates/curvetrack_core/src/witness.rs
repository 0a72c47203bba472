use anyhow::{bail, Result};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

/// Points on a curve cut out by linear functionals, in homogeneous
/// coordinates normalised by patch equations `p . x = 1`.
///
/// Witness sets are immutable once built; the `with_*` builders consume the
/// set and return an extended one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WitnessSet {
    num_variables: usize,
    #[serde(default)]
    points: Vec<Vec<Complex<f64>>>,
    #[serde(default)]
    linears: Vec<Vec<Complex<f64>>>,
    #[serde(default)]
    patches: Vec<Vec<Complex<f64>>>,
}

impl WitnessSet {
    pub fn new(num_variables: usize) -> Self {
        Self {
            num_variables,
            points: Vec::new(),
            linears: Vec::new(),
            patches: Vec::new(),
        }
    }

    fn check(&self, what: &str, len: usize) -> Result<()> {
        if len != self.num_variables {
            bail!(
                "Witness set {} has {} coordinates; the set has {} variables.",
                what,
                len,
                self.num_variables
            );
        }
        Ok(())
    }

    pub fn with_point(mut self, point: Vec<Complex<f64>>) -> Result<Self> {
        self.check("point", point.len())?;
        self.points.push(point);
        Ok(self)
    }

    pub fn with_linear(mut self, linear: Vec<Complex<f64>>) -> Result<Self> {
        self.check("linear", linear.len())?;
        self.linears.push(linear);
        Ok(self)
    }

    pub fn with_patch(mut self, patch: Vec<Complex<f64>>) -> Result<Self> {
        self.check("patch", patch.len())?;
        self.patches.push(patch);
        Ok(self)
    }

    /// Checks every stored vector against the variable count, e.g. after
    /// deserialisation.
    pub fn validate(&self) -> Result<()> {
        for p in &self.points {
            self.check("point", p.len())?;
        }
        for l in &self.linears {
            self.check("linear", l.len())?;
        }
        for p in &self.patches {
            self.check("patch", p.len())?;
        }
        Ok(())
    }

    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[Vec<Complex<f64>>] {
        &self.points
    }

    pub fn linears(&self) -> &[Vec<Complex<f64>>] {
        &self.linears
    }

    pub fn patches(&self) -> &[Vec<Complex<f64>>] {
        &self.patches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_reject_wrong_lengths() {
        let one = Complex::new(1.0, 0.0);
        let set = WitnessSet::new(2)
            .with_point(vec![one, one])
            .and_then(|w| w.with_patch(vec![one, Complex::new(0.0, 0.0)]))
            .expect("valid set");
        assert_eq!(set.num_points(), 1);
        assert_eq!(set.patches().len(), 1);
        assert!(set.clone().with_linear(vec![one]).is_err());
        assert!(set.validate().is_ok());
    }

    #[test]
    fn validate_catches_deserialised_mismatch() {
        let set: WitnessSet = serde_json::from_str(
            r#"{"num_variables":2,"points":[[[1.0,0.0]]]}"#,
        )
        .expect("parse");
        assert!(set.validate().is_err());
    }
}

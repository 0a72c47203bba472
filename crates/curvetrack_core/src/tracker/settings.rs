//! Tracker configuration.

use crate::error::FatalError;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PredictorKind {
    Euler,
    RungeKutta4,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EndgameKind {
    PowerSeries,
    /// Recognised but unsupported.
    TrackBack,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrecisionMode {
    /// Native doubles throughout.
    Double,
    /// Start in double, raise precision when accuracy runs out.
    Adaptive,
}

/// Settings controlling predictor-corrector tracking and the endgame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackerSettings {
    pub predictor: PredictorKind,
    pub endgame: EndgameKind,
    pub precision_mode: PrecisionMode,
    pub initial_step_size: f64,
    pub min_step_size: f64,
    pub max_step_size: f64,
    /// Consecutive accepted steps before the step size doubles.
    pub step_success_threshold: usize,
    pub max_steps: usize,
    pub max_newton_its: usize,
    /// Newton tolerance before the endgame boundary.
    pub tracking_tolerance: f64,
    /// Newton tolerance for endgame samples.
    pub endgame_tolerance: f64,
    pub endgame_boundary: f64,
    /// Ratio between consecutive endgame sample parameters.
    pub sample_factor: f64,
    pub max_cycle_number: u32,
    /// Relative agreement required between consecutive extrapolations.
    pub final_tolerance: f64,
    /// The endgame gives up once samples would fall below this parameter.
    pub min_endgame_parameter: f64,
    pub max_endgame_samples: usize,
    pub going_to_infinity: f64,
    /// Extra correct digits requested at the endpoint; zero disables.
    pub sharpen_digits: u32,
    pub precision_increment: u32,
    pub max_precision: u32,
    /// Digits of headroom demanded by the precision criterion.
    pub amp_safety_digits: f64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            predictor: PredictorKind::RungeKutta4,
            endgame: EndgameKind::PowerSeries,
            precision_mode: PrecisionMode::Adaptive,
            initial_step_size: 0.05,
            min_step_size: 1e-13,
            max_step_size: 0.1,
            step_success_threshold: 5,
            max_steps: 10_000,
            max_newton_its: 4,
            tracking_tolerance: 1e-7,
            endgame_tolerance: 1e-11,
            endgame_boundary: 0.1,
            sample_factor: 0.5,
            max_cycle_number: 6,
            final_tolerance: 1e-10,
            min_endgame_parameter: 1e-14,
            max_endgame_samples: 48,
            going_to_infinity: 1e8,
            sharpen_digits: 0,
            precision_increment: 32,
            max_precision: 1024,
            amp_safety_digits: 1.0,
        }
    }
}

impl TrackerSettings {
    pub fn validate(&self) -> Result<()> {
        if self.endgame == EndgameKind::TrackBack {
            return Err(FatalError::NotImplemented("the track-back endgame".to_string()).into());
        }
        if !(self.min_step_size > 0.0 && self.min_step_size <= self.max_step_size) {
            bail!("Step size bounds must satisfy 0 < min_step_size <= max_step_size.");
        }
        if !(self.initial_step_size > 0.0) {
            bail!("initial_step_size must be positive.");
        }
        if self.max_steps == 0 || self.max_newton_its == 0 || self.step_success_threshold == 0 {
            bail!("max_steps, max_newton_its and step_success_threshold must be greater than zero.");
        }
        if self.tracking_tolerance <= 0.0 || self.endgame_tolerance <= 0.0 || self.final_tolerance <= 0.0 {
            bail!("Tolerances must be positive.");
        }
        if !(self.endgame_boundary > 0.0 && self.endgame_boundary < 1.0) {
            bail!("endgame_boundary must lie in (0, 1).");
        }
        if !(self.sample_factor > 0.0 && self.sample_factor < 1.0) {
            bail!("sample_factor must lie in (0, 1).");
        }
        if self.max_endgame_samples < 3 {
            bail!("The endgame needs at least three samples.");
        }
        if self.max_cycle_number == 0 {
            bail!("max_cycle_number must be at least one.");
        }
        if self.precision_increment == 0 {
            bail!("precision_increment must be positive.");
        }
        if self.max_precision > crate::numeric::SOURCE_PRECISION {
            bail!(
                "max_precision {} exceeds the source precision {}.",
                self.max_precision,
                crate::numeric::SOURCE_PRECISION
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(TrackerSettings::default().validate().is_ok());
    }

    #[test]
    fn track_back_is_not_implemented() {
        let settings = TrackerSettings {
            endgame: EndgameKind::TrackBack,
            ..TrackerSettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FatalError>(),
            Some(FatalError::NotImplemented(_))
        ));
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let settings: TrackerSettings =
            serde_json::from_str(r#"{"predictor":"euler","sharpen_digits":20}"#).expect("parse");
        assert_eq!(settings.predictor, PredictorKind::Euler);
        assert_eq!(settings.sharpen_digits, 20);
        assert_eq!(settings.max_steps, TrackerSettings::default().max_steps);
    }
}

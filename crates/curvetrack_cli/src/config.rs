use anyhow::{Context, Result};
use curvetrack_core::batch::BatchOptions;
use curvetrack_core::curve::SamplerConfig;
use curvetrack_core::error::FatalError;
use curvetrack_core::tracker::TrackerSettings;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything tunable about a run, read from a TOML file. Missing tables and
/// keys take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub tracker: TrackerSettings,
    pub batch: BatchOptions,
    pub sampler: SamplerConfig,
    /// Seed for gamma, randomizer and patch generation. Unseeded runs draw
    /// from entropy.
    pub seed: Option<u64>,
}

impl RunConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| FatalError::resource(path, e))?;
                toml::from_str(&text).with_context(|| format!("Invalid run configuration {}", path.display()))?
            }
            None => RunConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.tracker.validate()?;
        self.sampler.validate()?;
        Ok(())
    }

    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curvetrack_core::curve::SamplingMode;
    use curvetrack_core::tracker::{EndgameKind, PrecisionMode};
    use rand::Rng;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: RunConfig = toml::from_str(
            r#"
            seed = 7

            [tracker]
            precision_mode = "double"
            max_steps = 500

            [sampler]
            mode = "fixed"
            target_num_samples = 4
            "#,
        )
        .expect("parse");
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.tracker.precision_mode, PrecisionMode::Double);
        assert_eq!(config.tracker.max_steps, 500);
        assert_eq!(config.tracker.endgame, EndgameKind::PowerSeries);
        assert_eq!(config.sampler.mode, SamplingMode::Fixed);
        assert_eq!(config.batch, BatchOptions::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn seeded_runs_repeat() {
        let config = RunConfig {
            seed: Some(42),
            ..RunConfig::default()
        };
        let a: f64 = config.rng().gen();
        let b: f64 = config.rng().gen();
        assert_eq!(a, b);
    }

    #[test]
    fn track_back_endgame_is_refused_at_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "[tracker]\nendgame = \"track_back\"\n").expect("write");
        let err = RunConfig::load(Some(&path)).unwrap_err();
        assert_eq!(curvetrack_core::error::exit_code_for(&err), 99);
    }
}

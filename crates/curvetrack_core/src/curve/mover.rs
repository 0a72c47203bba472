use super::ProjectionMover;
use crate::batch::{track_batch, BatchOptions};
use crate::homotopy::LinearProjectionHomotopy;
use crate::slp::StraightLineProgram;
use crate::tracker::TrackerSettings;
use anyhow::{bail, Result};
use num_complex::Complex;
use std::sync::Arc;
use tracing::debug;

/// Moves curve points with the linear projection homotopy and the path
/// tracker.
#[derive(Debug, Clone)]
pub struct TrackerMover {
    slp: Arc<StraightLineProgram>,
    randomizer: Vec<Vec<Complex<f64>>>,
    patch: Vec<Complex<f64>>,
    projection: Vec<Complex<f64>>,
    settings: TrackerSettings,
    options: BatchOptions,
}

impl TrackerMover {
    pub fn new(
        slp: Arc<StraightLineProgram>,
        randomizer: Vec<Vec<Complex<f64>>>,
        patch: Vec<Complex<f64>>,
        projection: Vec<Complex<f64>>,
        settings: TrackerSettings,
        options: BatchOptions,
    ) -> Result<Self> {
        settings.validate()?;
        let n = slp.num_variables();
        if patch.len() != n || projection.len() != n {
            bail!("Patch and projection need {} coefficients.", n);
        }
        Ok(Self {
            slp,
            randomizer,
            patch,
            projection,
            settings,
            options,
        })
    }

    pub fn is_serial(&self) -> bool {
        self.options.force_serial
    }
}

impl ProjectionMover for TrackerMover {
    fn move_to(
        &mut self,
        start: &[Complex<f64>],
        start_value: Complex<f64>,
        target_value: Complex<f64>,
    ) -> Result<Option<Vec<Complex<f64>>>> {
        // Rescale onto the patch so the start point solves the start system.
        let scale: Complex<f64> = self.patch.iter().zip(start).map(|(p, x)| p * x).sum();
        if scale.norm() == 0.0 {
            bail!("Start point lies on the hyperplane at infinity of the patch.");
        }
        let start: Vec<Complex<f64>> = start.iter().map(|x| x / scale).collect();
        let homotopy = LinearProjectionHomotopy::new(
            Arc::clone(&self.slp),
            &self.randomizer,
            &self.patch,
            &self.projection,
            start_value,
            target_value,
        )?;
        let outcome = track_batch(&homotopy, &[start], &self.settings, &self.options)?;
        match outcome.results.into_iter().next() {
            Some(result) if result.is_success() => Ok(Some(result.point.to_c64())),
            Some(result) => {
                debug!(status = %result.status, target = %target_value, "projection move failed");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set_force_serial(&mut self, force_serial: bool) -> bool {
        std::mem::replace(&mut self.options.force_serial, force_serial)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{c, parabola_edge, projection_values};
    use super::super::{sample, SamplerConfig, SamplingMode};
    use super::*;
    use crate::slp::{Bytecode, OpCode};

    fn parabola_program() -> Arc<StraightLineProgram> {
        Arc::new(
            StraightLineProgram::new(
                3,
                vec![Bytecode::new(vec![
                    OpCode::LoadVar(2),
                    OpCode::LoadVar(0),
                    OpCode::Mul,
                    OpCode::LoadVar(1),
                    OpCode::PowI(2),
                    OpCode::Sub,
                ])],
            )
            .expect("valid program"),
        )
    }

    fn mover() -> TrackerMover {
        TrackerMover::new(
            parabola_program(),
            vec![vec![c(1.0)]],
            vec![c(1.0), c(0.0), c(0.0)],
            vec![c(0.0), c(1.0), c(0.0)],
            TrackerSettings::default(),
            BatchOptions::default(),
        )
        .expect("mover")
    }

    #[test]
    fn moves_along_the_parabola() {
        let mut mover = mover();
        // Any homogeneous representative of the start point will do.
        let start = [c(2.0), c(1.0), c(0.5)];
        let moved = mover
            .move_to(&start, c(0.5), c(0.75))
            .expect("track")
            .expect("a point");
        assert!((moved[0] - c(1.0)).norm() < 1e-10);
        assert!((moved[1] - c(0.75)).norm() < 1e-8);
        assert!((moved[2] - c(0.5625)).norm() < 1e-8);
    }

    #[test]
    fn force_serial_is_restored_around_sampling() {
        let mut mover = mover();
        assert!(!mover.is_serial());
        assert!(!mover.set_force_serial(true));
        assert!(mover.set_force_serial(false));

        let (mut curve, mut vertices) = parabola_edge(0.0, 1.0);
        let config = SamplerConfig {
            mode: SamplingMode::Fixed,
            target_num_samples: 5,
            ..SamplerConfig::default()
        };
        sample(&mut curve, &mut vertices, &config, &mut mover).expect("sample");
        assert!(!mover.is_serial());
        let values = projection_values(&curve, &vertices, 0);
        for (v, e) in values.iter().zip([0.0, 0.25, 0.5, 0.75, 1.0]) {
            assert!((v - e).abs() < 1e-8);
        }
    }
}

use crate::config::RunConfig;
use crate::problem::{self, randomizer_or_random, SampleProblem, TrackProblem};
use anyhow::{Context, Result};
use curvetrack_core::batch::detjac_to_detjac_solve;
use curvetrack_core::curve::{sample_distributed, TrackerMover};
use curvetrack_core::error::FatalError;
use curvetrack_core::homotopy::{random_gamma, random_matrix};
use curvetrack_core::io::{read_witness_set, write_curve_results, write_witness_set};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub fn cmd_track(problem_file: &Path, config: &RunConfig, output: &Path) -> Result<()> {
    let problem: TrackProblem = problem::load(problem_file)?;
    let mut rng = config.rng();
    let randomizer = randomizer_or_random(problem.randomizer, &problem.system, &mut rng)?;
    let gamma = random_gamma(&mut rng);
    let witness = read_witness_set(&problem::resolve(problem_file, &problem.witness_set))?;
    info!(points = witness.num_points(), %gamma, "tracking critical points");

    let solved = detjac_to_detjac_solve(
        &witness,
        &problem.system,
        &randomizer,
        &problem.old_projection,
        &problem.new_projection,
        gamma,
        &config.tracker,
        &config.batch,
    )?;
    write_witness_set(output, &solved.witness_set)?;

    println!(
        "tracked {} paths: {} succeeded, {} failed in {:.3}s",
        solved.stats.total,
        solved.stats.successes,
        solved.stats.failures,
        solved.stats.elapsed.as_secs_f64()
    );
    for failure in &solved.failures {
        println!("  path {}: {} ({})", failure.path_index, failure.status, failure.message);
    }
    println!("witness set written to {}", output.display());
    Ok(())
}

pub fn cmd_sample(problem_file: &Path, config: &RunConfig, output_dir: &Path) -> Result<()> {
    let mut problem: SampleProblem = problem::load(problem_file)?;
    problem.validate()?;
    let mut rng = config.rng();
    let n = problem.system.num_variables();
    let randomizer = randomizer_or_random(problem.randomizer.take(), &problem.system, &mut rng)?;
    let patch = match problem.patch.take() {
        Some(patch) => patch,
        None => random_matrix(&mut rng, 1, n).into_iter().flatten().collect(),
    };
    let slp = Arc::new(problem.system.clone());
    let projection = problem.curve.projection().to_vec();

    let factory = || {
        TrackerMover::new(
            Arc::clone(&slp),
            randomizer.clone(),
            patch.clone(),
            projection.clone(),
            config.tracker.clone(),
            config.batch.clone(),
        )
    };
    sample_distributed(&mut problem.curve, &mut problem.vertices, &config.sampler, factory)
        .context("Curve sampling failed")?;

    let copies: Vec<_> = [&problem.witness_set, &problem.deflated_input]
        .into_iter()
        .flatten()
        .map(|p| problem::resolve(problem_file, p))
        .collect();
    let copy_refs: Vec<&Path> = copies.iter().map(|p| p.as_path()).collect();
    std::fs::create_dir_all(output_dir).map_err(|e| FatalError::resource(output_dir, e))?;
    let dir = write_curve_results(
        output_dir,
        &problem.input_name(problem_file),
        problem.component,
        &problem.curve,
        &problem.vertices,
        &copy_refs,
    )?;

    let samples: usize = problem.curve.sample_table().iter().map(Vec::len).sum();
    println!(
        "sampled {} edges: {} samples over {} vertices",
        problem.curve.num_edges(),
        samples,
        problem.vertices.len()
    );
    println!("results written to {}", dir.display());
    Ok(())
}

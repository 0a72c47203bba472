//! Coordinator/worker distribution of curve sampling over threads.
//!
//! The coordinator owns the authoritative vertex set. Every worker receives
//! one snapshot of the curve, the vertex set and the sampler configuration,
//! then asks for edges one at a time. A worker samples an edge against its
//! private copy of the snapshot and reports the vertices it created together
//! with the edge's sample list in its local numbering; the coordinator maps
//! those local indices into its own vertex set and installs the list.

use super::sampler::{sample, sample_edge};
use super::{Curve, EdgeRefinement, ProjectionMover, SamplerConfig, Vertex, VertexSet};
use anyhow::{anyhow, Result};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;
use tracing::{debug, info, warn};

/// Everything a worker needs to sample edges independently.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub vertices: VertexSet,
    pub curve: Curve,
    pub config: SamplerConfig,
}

#[derive(Debug)]
pub enum ToWorker {
    Setup(Box<Snapshot>),
    Task { edge: usize },
    Shutdown,
}

#[derive(Debug)]
pub enum ToCoordinator {
    Ready {
        worker: usize,
    },
    Done {
        worker: usize,
        edge: usize,
        new_vertices: Vec<Vertex>,
        samples: Vec<usize>,
        refinement: Option<EdgeRefinement>,
    },
    /// `edge` is `None` when the worker could not start at all.
    Failed {
        worker: usize,
        edge: Option<usize>,
        error: anyhow::Error,
    },
}

/// Samples `curve` with `config.parallel_workers` worker threads, each
/// building its own mover from `factory`. One worker (or none) samples in
/// the calling thread instead.
pub fn sample_distributed<M, F>(
    curve: &mut Curve,
    vertices: &mut VertexSet,
    config: &SamplerConfig,
    factory: F,
) -> Result<()>
where
    M: ProjectionMover,
    F: Fn() -> Result<M> + Sync,
{
    config.validate()?;
    curve.validate(vertices)?;
    if config.parallel_workers <= 1 || curve.num_edges() <= 1 {
        let mut mover = factory()?;
        return sample(curve, vertices, config, &mut mover);
    }
    // Register the projection before the snapshot so every worker numbers
    // projection values the same way.
    vertices.add_projection(curve.projection())?;

    let snapshot = Snapshot {
        vertices: vertices.clone(),
        curve: curve.clone(),
        config: config.clone(),
    };
    let base = snapshot.vertices.len();
    let workers = config.parallel_workers.min(curve.num_edges());
    let before = vertices.len();

    thread::scope(|scope| {
        let (report_tx, report_rx) = channel();
        let mut task_txs = Vec::with_capacity(workers);
        for worker in 0..workers {
            let (task_tx, task_rx) = channel();
            let report_tx = report_tx.clone();
            let factory = &factory;
            scope.spawn(move || worker_loop(worker, task_rx, report_tx, factory));
            task_tx
                .send(ToWorker::Setup(Box::new(snapshot.clone())))
                .map_err(|_| anyhow!("Worker {} exited before setup", worker))?;
            task_txs.push(task_tx);
        }
        drop(report_tx);
        coordinate(curve, vertices, config, base, &task_txs, report_rx)
    })?;

    info!(
        edges = curve.num_edges(),
        workers,
        new_vertices = vertices.len() - before,
        "curve sampled by workers"
    );
    Ok(())
}

fn coordinate(
    curve: &mut Curve,
    vertices: &mut VertexSet,
    config: &SamplerConfig,
    base: usize,
    task_txs: &[Sender<ToWorker>],
    reports: Receiver<ToCoordinator>,
) -> Result<()> {
    let mut next_edge = 0;
    let mut first_error: Option<anyhow::Error> = None;
    // Ends once every worker has shut down and dropped its sender.
    for report in reports {
        match report {
            ToCoordinator::Ready { worker } => {
                let message = if next_edge < curve.num_edges() && first_error.is_none() {
                    next_edge += 1;
                    ToWorker::Task { edge: next_edge - 1 }
                } else {
                    ToWorker::Shutdown
                };
                // A worker that has gone away already reported why.
                let _ = task_txs[worker].send(message);
            }
            ToCoordinator::Done {
                worker,
                edge,
                new_vertices,
                samples,
                refinement,
            } => {
                let mut global = Vec::with_capacity(new_vertices.len());
                for vertex in new_vertices {
                    let index = if config.no_duplicates {
                        vertices.index_in_vertices_with_add(vertex.point, vertex.kind)?
                    } else {
                        vertices.add_vertex(vertex.point, vertex.kind)?
                    };
                    global.push(index);
                }
                let translated = samples
                    .into_iter()
                    .map(|local| if local < base { Ok(local) } else {
                        global
                            .get(local - base)
                            .copied()
                            .ok_or_else(|| anyhow!("Worker {} reported unknown vertex {} on edge {}", worker, local, edge))
                    })
                    .collect::<Result<Vec<_>>>()?;
                debug!(worker, edge, samples = translated.len(), "edge received");
                curve.set_samples(edge, translated);
                curve.set_refinement(edge, refinement);
            }
            ToCoordinator::Failed { worker, edge, error } => {
                warn!(worker, edge = ?edge, "sampling worker failed: {:#}", error);
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }
    }
    match first_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

fn worker_loop<M, F>(worker: usize, tasks: Receiver<ToWorker>, reports: Sender<ToCoordinator>, factory: &F)
where
    M: ProjectionMover,
    F: Fn() -> Result<M>,
{
    let mut snapshot = match tasks.recv() {
        Ok(ToWorker::Setup(snapshot)) => *snapshot,
        _ => return,
    };
    let mut mover = match factory() {
        Ok(mover) => mover,
        Err(error) => {
            let _ = reports.send(ToCoordinator::Failed {
                worker,
                edge: None,
                error,
            });
            return;
        }
    };
    mover.set_force_serial(true);
    let base = snapshot.vertices.len();

    loop {
        if reports.send(ToCoordinator::Ready { worker }).is_err() {
            return;
        }
        let edge = match tasks.recv() {
            Ok(ToWorker::Task { edge }) => edge,
            Ok(ToWorker::Setup(fresh)) => {
                snapshot = *fresh;
                continue;
            }
            Ok(ToWorker::Shutdown) | Err(_) => return,
        };
        let Snapshot { vertices, curve, config } = &mut snapshot;
        let report = match sample_edge(curve, vertices, config, &mut mover, edge) {
            Ok(()) => ToCoordinator::Done {
                worker,
                edge,
                new_vertices: vertices.vertices()[base..].to_vec(),
                samples: curve.samples(edge).to_vec(),
                refinement: curve.refinement(edge).cloned(),
            },
            Err(error) => ToCoordinator::Failed {
                worker,
                edge: Some(edge),
                error,
            },
        };
        vertices.truncate(base);
        if reports.send(report).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{parabola_point, projection_values, ExactParabola};
    use super::super::{Edge, EdgeMetadata, SamplingMode, VertexType};
    use super::*;
    use crate::error::FatalError;
    use num_complex::Complex;

    /// Four consecutive edges of the parabola over `[0, 4]`.
    fn chain() -> (Curve, VertexSet) {
        let mut vertices = VertexSet::new(3);
        let mut curve = Curve::new(
            3,
            vec![Complex::new(0.0, 0.0), Complex::new(1.0, 0.0), Complex::new(0.0, 0.0)],
            "chain",
        )
        .expect("curve");
        let knots: Vec<usize> = (0..=4)
            .map(|k| vertices.add_vertex(parabola_point(k as f64), VertexType::Critical).expect("vertex"))
            .collect();
        for k in 0..4 {
            let mid = vertices
                .add_vertex(parabola_point(k as f64 + 0.5), VertexType::Midpoint)
                .expect("vertex");
            curve.add_edge(Edge::new(knots[k], mid, knots[k + 1]), EdgeMetadata::default());
        }
        (curve, vertices)
    }

    fn fixed(workers: usize) -> SamplerConfig {
        SamplerConfig {
            mode: SamplingMode::Fixed,
            target_num_samples: 5,
            parallel_workers: workers,
            ..SamplerConfig::default()
        }
    }

    #[test]
    fn workers_produce_the_serial_sampling() {
        let (mut serial_curve, mut serial_vertices) = chain();
        sample_distributed(&mut serial_curve, &mut serial_vertices, &fixed(1), || {
            Ok(ExactParabola::default())
        })
        .expect("serial");

        let (mut curve, mut vertices) = chain();
        sample_distributed(&mut curve, &mut vertices, &fixed(3), || Ok(ExactParabola::default()))
            .expect("distributed");
        assert_eq!(vertices.len(), serial_vertices.len());
        for edge in 0..curve.num_edges() {
            let expected = projection_values(&serial_curve, &serial_vertices, edge);
            let got = projection_values(&curve, &vertices, edge);
            assert_eq!(got.len(), expected.len());
            for (a, b) in got.iter().zip(&expected) {
                assert!((a - b).abs() < 1e-12);
            }
            assert_eq!(curve.samples(edge).first(), Some(&curve.edge(edge).left));
            assert_eq!(curve.samples(edge).last(), Some(&curve.edge(edge).right));
        }
    }

    #[test]
    fn shared_knots_are_not_duplicated_by_workers() {
        let (mut curve, mut vertices) = chain();
        let config = SamplerConfig {
            mode: SamplingMode::AdaptiveDistance,
            tolerance: 0.5,
            parallel_workers: 2,
            ..SamplerConfig::default()
        };
        sample_distributed(&mut curve, &mut vertices, &config, || Ok(ExactParabola::default()))
            .expect("distributed");
        for edge in 0..curve.num_edges() {
            assert!(curve.refinement(edge).expect("refinement").is_settled());
            let values = projection_values(&curve, &vertices, edge);
            assert!(values.windows(2).all(|w| w[0] < w[1]));
        }
        let mut seen = Vec::new();
        for v in vertices.vertices() {
            assert!(!seen.iter().any(|&x: &f64| (x - v.point[1].re).abs() < 1e-12));
            seen.push(v.point[1].re);
        }
    }

    #[test]
    fn worker_errors_reach_the_coordinator() {
        let (mut curve, mut vertices) = chain();
        let err = sample_distributed(&mut curve, &mut vertices, &fixed(2), || -> Result<ExactParabola> {
            Err(FatalError::InputSystem("no mover".to_string()).into())
        })
        .unwrap_err();
        assert!(matches!(err.downcast_ref::<FatalError>(), Some(FatalError::InputSystem(_))));
    }
}

//! The `curvetrack_core` crate is the numerical engine behind the curvetrack CLI.
//! It tracks solution paths of polynomial homotopies in double or adaptive
//! multiprecision and uses them to sample real curve decompositions.
//!
//! Key components:
//! - **Numeric**: `ComplexScalar` over `Complex<f64>` and `rug` complexes, with owned vectors and matrices.
//! - **SLP**: a bytecode VM evaluating polynomial systems and their Jacobians via dual numbers.
//! - **Homotopy**: the detjac-to-detjac and linear-projection homotopies.
//! - **Tracker**: predictor/corrector path tracking with adaptive precision and a power-series endgame.
//! - **Batch**: parallel tracking of many start points on a `rayon` pool.
//! - **Curve**: vertex sets, edges, and fixed, semi-fixed and adaptive edge sampling, serial or distributed.
//! - **IO**: plain-text witness set and curve dumps plus the results directory layout.
pub mod autodiff;
pub mod batch;
pub mod curve;
pub mod error;
pub mod homotopy;
pub mod io;
pub mod numeric;
pub mod slp;
pub mod tracker;
pub mod traits;
pub mod witness;

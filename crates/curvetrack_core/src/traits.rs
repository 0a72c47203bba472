use crate::homotopy::HomotopyEval;
use crate::numeric::{ComplexScalar, Vector};

/// A square system `H(x, s) = 0` deforming with a real path parameter `s`.
///
/// Implementors own their scratch buffers, so evaluation takes `&mut self`.
/// One evaluator exists per worker; evaluators are never shared.
pub trait Homotopy<T: ComplexScalar>: Send {
    /// Number of unknowns (and equations).
    fn num_variables(&self) -> usize;

    /// Current working precision in bits.
    fn precision(&self) -> u32;

    /// Re-materialises every owned buffer at `precision` from the
    /// full-precision source data.
    fn change_precision(&mut self, precision: u32);

    /// Fills `out` with `H(x, s)`, `dH/dx` and `dH/ds`.
    fn evaluate(&mut self, x: &Vector<T>, s: f64, out: &mut HomotopyEval<T>);
}

/// Immutable description of a homotopy, shared across workers, from which
/// per-worker evaluators are materialised at any working precision.
pub trait HomotopySource: Send + Sync {
    type Evaluator<T: ComplexScalar>: Homotopy<T>;

    fn num_variables(&self) -> usize;

    fn materialize<T: ComplexScalar>(&self, precision: u32) -> Self::Evaluator<T>;
}

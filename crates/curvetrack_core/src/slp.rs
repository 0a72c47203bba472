use crate::autodiff::Dual;
use crate::error::FatalError;
use crate::numeric::{ComplexScalar, Matrix, Vector};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// OpCodes for the stack-based straight-line program.
/// The VM operates on a stack of dual numbers over the working scalar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OpCode {
    /// Pushes a complex constant `(re, im)`.
    LoadConst(f64, f64),
    /// Pushes the value of a variable (by index).
    LoadVar(usize),
    /// Pushes a path variable. Only valid for homotopy-capable inputs.
    LoadPathVar(usize),
    /// Pushes a parameter. Only valid for homotopy-capable inputs.
    LoadParam(usize),
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b).
    Div,
    /// Pops top value (a), pushes a^n.
    PowI(i32),
    /// Pops top value (a), pushes -a.
    Neg,
}

/// One compiled function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

impl Bytecode {
    pub fn new(ops: Vec<OpCode>) -> Self {
        Self { ops }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawProgram {
    num_variables: usize,
    #[serde(default)]
    num_path_variables: usize,
    #[serde(default)]
    num_parameters: usize,
    functions: Vec<Bytecode>,
}

impl TryFrom<RawProgram> for StraightLineProgram {
    type Error = anyhow::Error;

    fn try_from(raw: RawProgram) -> Result<Self> {
        StraightLineProgram::with_path_variables(
            raw.num_variables,
            raw.num_path_variables,
            raw.num_parameters,
            raw.functions,
        )
    }
}

/// A compiled polynomial system `f: C^n -> C^m`.
///
/// Programs are validated on construction: every index is in range and every
/// function leaves exactly one value on the stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawProgram")]
pub struct StraightLineProgram {
    num_variables: usize,
    num_path_variables: usize,
    num_parameters: usize,
    functions: Vec<Bytecode>,
}

impl StraightLineProgram {
    pub fn new(num_variables: usize, functions: Vec<Bytecode>) -> Result<Self> {
        Self::with_path_variables(num_variables, 0, 0, functions)
    }

    pub fn with_path_variables(
        num_variables: usize,
        num_path_variables: usize,
        num_parameters: usize,
        functions: Vec<Bytecode>,
    ) -> Result<Self> {
        if num_variables == 0 {
            bail!("Straight-line program has no variables.");
        }
        if functions.is_empty() {
            bail!("Straight-line program has no functions.");
        }
        for (index, function) in functions.iter().enumerate() {
            let mut depth = 0usize;
            for op in &function.ops {
                match *op {
                    OpCode::LoadConst(re, im) => {
                        if !re.is_finite() || !im.is_finite() {
                            bail!("Function {} loads a non-finite constant.", index);
                        }
                        depth += 1;
                    }
                    OpCode::LoadVar(i) => {
                        if i >= num_variables {
                            bail!("Function {} reads variable {} of {}.", index, i, num_variables);
                        }
                        depth += 1;
                    }
                    OpCode::LoadPathVar(i) => {
                        if i >= num_path_variables {
                            bail!("Function {} reads path variable {} of {}.", index, i, num_path_variables);
                        }
                        depth += 1;
                    }
                    OpCode::LoadParam(i) => {
                        if i >= num_parameters {
                            bail!("Function {} reads parameter {} of {}.", index, i, num_parameters);
                        }
                        depth += 1;
                    }
                    OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div => {
                        if depth < 2 {
                            bail!("Function {} underflows the stack.", index);
                        }
                        depth -= 1;
                    }
                    OpCode::PowI(_) | OpCode::Neg => {
                        if depth < 1 {
                            bail!("Function {} underflows the stack.", index);
                        }
                    }
                }
            }
            if depth != 1 {
                bail!("Function {} leaves {} values on the stack.", index, depth);
            }
        }
        Ok(Self {
            num_variables,
            num_path_variables,
            num_parameters,
            functions,
        })
    }

    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    pub fn num_functions(&self) -> usize {
        self.functions.len()
    }

    /// Rejects programs that declare or read path variables or parameters.
    pub fn require_plain(&self) -> Result<()> {
        if self.num_path_variables > 0 || self.num_parameters > 0 {
            return Err(FatalError::InputSystem(format!(
                "system declares {} path variable(s) and {} parameter(s), which this homotopy cannot drive",
                self.num_path_variables, self.num_parameters
            ))
            .into());
        }
        let reads_extra = self.functions.iter().any(|f| {
            f.ops
                .iter()
                .any(|op| matches!(op, OpCode::LoadPathVar(_) | OpCode::LoadParam(_)))
        });
        if reads_extra {
            return Err(FatalError::InputSystem(
                "system reads path variables or parameters".to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// Evaluates the functions and their Jacobian at `x`, one seeded dual
    /// pass per variable.
    pub fn evaluate<T: ComplexScalar>(
        &self,
        x: &[T],
        workspace: &mut SlpWorkspace<T>,
        values: &mut Vector<T>,
        jacobian: &mut Matrix<T>,
    ) {
        let n = self.num_variables;
        let precision = values.precision();
        values.resize(self.functions.len());
        jacobian.resize(self.functions.len(), n);

        for j in 0..n {
            workspace.inputs.clear();
            for (i, xi) in x.iter().enumerate().take(n) {
                let dual = if i == j {
                    Dual::variable(xi.clone())
                } else {
                    Dual::constant(xi.clone())
                };
                workspace.inputs.push(dual);
            }
            for (f, function) in self.functions.iter().enumerate() {
                let out = VM::execute(function, &workspace.inputs, &[], &[], precision, &mut workspace.stack);
                if j == 0 {
                    values[f] = out.val;
                }
                jacobian[(f, j)] = out.eps;
            }
        }
    }

    /// Evaluates the functions only.
    pub fn evaluate_values<T: ComplexScalar>(&self, x: &[T], workspace: &mut SlpWorkspace<T>, values: &mut Vector<T>) {
        let precision = values.precision();
        values.resize(self.functions.len());
        workspace.inputs.clear();
        workspace
            .inputs
            .extend(x.iter().take(self.num_variables).map(|xi| Dual::constant(xi.clone())));
        for (f, function) in self.functions.iter().enumerate() {
            values[f] = VM::execute(function, &workspace.inputs, &[], &[], precision, &mut workspace.stack).val;
        }
    }
}

/// Reusable scratch space for program evaluation.
#[derive(Debug, Clone)]
pub struct SlpWorkspace<T> {
    stack: Vec<Dual<T>>,
    inputs: Vec<Dual<T>>,
}

impl<T> SlpWorkspace<T> {
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            inputs: Vec::new(),
        }
    }
}

/// Stack-based virtual machine.
///
/// The VM is stateless; `execute` takes everything it needs and returns the
/// value left on the stack.
pub struct VM;

impl VM {
    pub fn execute<T: ComplexScalar>(
        bytecode: &Bytecode,
        vars: &[Dual<T>],
        path_vars: &[Dual<T>],
        params: &[Dual<T>],
        precision: u32,
        stack: &mut Vec<Dual<T>>,
    ) -> Dual<T> {
        stack.clear();
        let zero = || Dual::constant(T::zero_at(precision));

        for op in &bytecode.ops {
            match *op {
                OpCode::LoadConst(re, im) => {
                    stack.push(Dual::constant(T::from_f64_at(re, im, precision)));
                }
                OpCode::LoadVar(idx) => stack.push(vars[idx].clone()),
                OpCode::LoadPathVar(idx) => stack.push(path_vars[idx].clone()),
                OpCode::LoadParam(idx) => stack.push(params[idx].clone()),
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div => {
                    let b = stack.pop().unwrap_or_else(zero);
                    let a = stack.pop().unwrap_or_else(zero);
                    stack.push(match *op {
                        OpCode::Add => a + b,
                        OpCode::Sub => a - b,
                        OpCode::Mul => a * b,
                        _ => a / b,
                    });
                }
                OpCode::PowI(n) => {
                    let a = stack.pop().unwrap_or_else(zero);
                    stack.push(a.powi(n));
                }
                OpCode::Neg => {
                    let a = stack.pop().unwrap_or_else(zero);
                    stack.push(-a);
                }
            }
        }

        stack.pop().unwrap_or_else(zero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex;

    fn circle() -> StraightLineProgram {
        // x1^2 + x2^2 - x0^2
        StraightLineProgram::new(
            3,
            vec![Bytecode::new(vec![
                OpCode::LoadVar(1),
                OpCode::PowI(2),
                OpCode::LoadVar(2),
                OpCode::PowI(2),
                OpCode::Add,
                OpCode::LoadVar(0),
                OpCode::PowI(2),
                OpCode::Sub,
            ])],
        )
        .expect("valid program")
    }

    #[test]
    fn evaluates_values_and_jacobian() {
        let slp = circle();
        let x = [Complex::new(1.0, 0.0), Complex::new(0.5, 0.5), Complex::new(2.0, 0.0)];
        let mut ws = SlpWorkspace::new();
        let mut values = Vector::zeros(0, 53);
        let mut jac = Matrix::zeros(0, 0, 53);
        slp.evaluate(&x, &mut ws, &mut values, &mut jac);

        let expected = x[1] * x[1] + x[2] * x[2] - x[0] * x[0];
        assert!((values[0] - expected).norm() < 1e-15);
        assert!((jac[(0, 0)] - x[0] * -2.0).norm() < 1e-15);
        assert!((jac[(0, 1)] - x[1] * 2.0).norm() < 1e-15);
        assert!((jac[(0, 2)] - x[2] * 2.0).norm() < 1e-15);

        let mut only = Vector::zeros(1, 53);
        slp.evaluate_values(&x, &mut ws, &mut only);
        assert_eq!(only[0], values[0]);
    }

    #[test]
    fn rejects_malformed_programs() {
        let underflow = StraightLineProgram::new(1, vec![Bytecode::new(vec![OpCode::Add])]);
        assert!(underflow.is_err());
        let out_of_range = StraightLineProgram::new(1, vec![Bytecode::new(vec![OpCode::LoadVar(3)])]);
        assert!(out_of_range.is_err());
        let leftover = StraightLineProgram::new(
            1,
            vec![Bytecode::new(vec![OpCode::LoadVar(0), OpCode::LoadVar(0)])],
        );
        assert!(leftover.is_err());
    }

    #[test]
    fn path_variables_are_an_input_system_error() {
        let slp = StraightLineProgram::with_path_variables(
            2,
            1,
            0,
            vec![Bytecode::new(vec![OpCode::LoadVar(0), OpCode::LoadPathVar(0), OpCode::Mul])],
        )
        .expect("structurally valid");
        let err = slp.require_plain().unwrap_err();
        let fatal = err.downcast_ref::<FatalError>().expect("fatal error");
        assert!(matches!(fatal, FatalError::InputSystem(_)));
        assert!(circle().require_plain().is_ok());
    }

    #[test]
    fn deserialization_validates() {
        let json = r#"{"num_variables":1,"functions":[{"ops":[{"LoadVar":0},{"PowI":3}]}]}"#;
        let slp: StraightLineProgram = serde_json::from_str(json).expect("valid json program");
        assert_eq!(slp.num_functions(), 1);

        let bad = r#"{"num_variables":1,"functions":[{"ops":["Mul"]}]}"#;
        assert!(serde_json::from_str::<StraightLineProgram>(bad).is_err());
    }
}

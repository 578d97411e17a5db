//! The data model (spec.md §3): a model is an ordered sequence of equations
//! `vᵢ = Eᵢ`, each a compiled scalar expression over state + parameter names.

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use crate::error::{ExprError, KernelError, KernelResult};
use crate::expr::{compile, CompiledExpr};

/// An ordered set of named parameters. Names are disjoint from variable
/// names by construction (checked when a [`Model`] is built).
#[derive(Debug, Clone, Default)]
pub struct Parameters {
    names: Vec<String>,
    values: Vec<f64>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        if let Some(i) = self.names.iter().position(|n| n == &name) {
            self.values[i] = value;
        } else {
            self.names.push(name);
            self.values.push(value);
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.names.iter().position(|n| n == name).map(|i| self.values[i])
    }

    pub fn set(&mut self, name: &str, value: f64) -> bool {
        if let Some(i) = self.names.iter().position(|n| n == name) {
            self.values[i] = value;
            true
        } else {
            false
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// One equation `vᵢ = Eᵢ`.
pub struct Equation {
    pub variable: String,
    pub source: String,
    compiled: CompiledExpr,
}

/// Ordered sequence of equations defining ẋ = f(x; p) (spec.md §3). Variable
/// names are distinct and every free name in every right-hand side resolves
/// to a state variable, a parameter, or the fixed function/operator library.
pub struct Model {
    equations: Vec<Equation>,
    var_index: HashMap<String, usize>,
}

impl Model {
    /// Build a model from `(variable, expression source)` pairs, validating
    /// that variable names are distinct. Free-name resolution against
    /// parameters happens lazily at evaluation time (an environment is
    /// `(state, params)`), matching the compiled-expression contract of C1.
    pub fn new(equations: Vec<(String, String)>) -> KernelResult<Self> {
        let mut var_index = HashMap::with_capacity(equations.len());
        for (i, (name, _)) in equations.iter().enumerate() {
            if var_index.insert(name.clone(), i).is_some() {
                return Err(KernelError::Expr(ExprError::UnboundName(format!(
                    "duplicate variable name '{name}'"
                ))));
            }
        }
        let names: Vec<String> = equations.iter().map(|(n, _)| n.clone()).collect();
        let mut compiled_eqs = Vec::with_capacity(equations.len());
        for (variable, source) in equations {
            let compiled = compile(&source, &names)?;
            compiled_eqs.push(Equation { variable, source, compiled });
        }
        Ok(Self { equations: compiled_eqs, var_index })
    }

    pub fn dim(&self) -> usize {
        self.equations.len()
    }

    pub fn variable_names(&self) -> Vec<&str> {
        self.equations.iter().map(|e| e.variable.as_str()).collect()
    }

    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.var_index.get(name).copied()
    }

    pub fn equation_source(&self, i: usize) -> &str {
        &self.equations[i].source
    }

    /// Evaluate ẋ = f(x; p) at state `x` under parameters `p`.
    pub fn rhs(&self, x: &DVector<f64>, p: &Parameters) -> KernelResult<DVector<f64>> {
        let mut out = DVector::zeros(self.dim());
        for (i, eq) in self.equations.iter().enumerate() {
            out[i] = eq.compiled.eval_state(x, p)?;
        }
        Ok(out)
    }

    /// Dense Jacobian J(x) = ∂f/∂x via symbolic differentiation of each
    /// equation with respect to every state variable (compiled once here,
    /// evaluated at `x`).
    pub fn jacobian(&self, x: &DVector<f64>, p: &Parameters) -> KernelResult<DMatrix<f64>> {
        let n = self.dim();
        let mut j = DMatrix::zeros(n, n);
        for (i, eq) in self.equations.iter().enumerate() {
            for (col, name) in self.variable_names().iter().enumerate() {
                let d = eq.compiled.derivative(name)?;
                j[(i, col)] = d.eval_state(x, p)?;
            }
        }
        Ok(j)
    }

    /// Partial derivative of f with respect to a named parameter, evaluated
    /// at `x` — used by the continuation predictor-corrector (C8).
    pub fn param_jacobian(
        &self,
        x: &DVector<f64>,
        p: &Parameters,
        param_name: &str,
    ) -> KernelResult<DVector<f64>> {
        let mut out = DVector::zeros(self.dim());
        for (i, eq) in self.equations.iter().enumerate() {
            let d = eq.compiled.derivative(param_name)?;
            out[i] = d.eval_state(x, p)?;
        }
        Ok(out)
    }
}

/// An equilibrium x* with its Jacobian eigenpairs. Entries of `eigenvalues`
/// / `eigenvectors` may be NaN, meaning "not computed / unconverged".
#[derive(Debug, Clone)]
pub struct Equilibrium {
    pub state: DVector<f64>,
    pub eigenvalues: Vec<Complex64>,
    pub eigenvectors: Vec<DVector<Complex64>>,
}

/// A discrete curve in ℝⁿ produced by integration.
#[derive(Debug, Clone)]
pub struct Orbit {
    pub points: Vec<DVector<f64>>,
    pub times: Vec<f64>,
}

/// A single point on an isocline polyline, embedded in ℝ³ (the third
/// coordinate is the slice value when slicing along a third axis, or 0).
pub type IsoPoint = [f64; 3];

/// The level set {x : g(x) = c} on a rectangular lattice: a list of
/// polylines per slice.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Isocline {
    pub polylines: Vec<Vec<IsoPoint>>,
}

/// Tag distinguishing the three state-entity kinds of spec.md §3.
#[derive(Debug, Clone)]
pub enum StateEntity {
    Equilibrium(Equilibrium),
    Orbit(Orbit),
    Isocline(Isocline),
}

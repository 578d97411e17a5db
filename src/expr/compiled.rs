use std::rc::Rc;

use nalgebra::DVector;

use super::ast::{Expr, Func};
use super::parser::parse;
use crate::error::ExprError;
use crate::model::Parameters;

/// A compiled scalar expression: a pure function `(environment) -> real`
/// (spec.md §4.1). Free names are pre-bound to state-vector slot indices at
/// compile time (design notes §9); any name left over after that resolution
/// pass is looked up by name against the supplied [`Parameters`] at
/// evaluation time.
#[derive(Clone)]
pub struct CompiledExpr {
    ast: Rc<Expr>,
    state_names: Rc<Vec<String>>,
}

/// Parse `src` and resolve every identifier that matches one of
/// `state_names` to a slot index. Remaining identifiers are left as
/// parameter names, resolved at evaluation time.
pub fn compile(src: &str, state_names: &[String]) -> Result<CompiledExpr, ExprError> {
    let ast = parse(src)?;
    let state_names = Rc::new(state_names.to_vec());
    let resolved = resolve(&ast, &state_names);
    Ok(CompiledExpr { ast: resolved, state_names })
}

fn resolve(expr: &Rc<Expr>, state_names: &[String]) -> Rc<Expr> {
    match &**expr {
        Expr::Name(name) => {
            if let Some(idx) = state_names.iter().position(|n| n == name) {
                Expr::State(idx).rc()
            } else {
                expr.clone()
            }
        }
        Expr::Num(_) | Expr::State(_) => expr.clone(),
        Expr::Neg(a) => Expr::Neg(resolve(a, state_names)).rc(),
        Expr::Add(a, b) => Expr::Add(resolve(a, state_names), resolve(b, state_names)).rc(),
        Expr::Sub(a, b) => Expr::Sub(resolve(a, state_names), resolve(b, state_names)).rc(),
        Expr::Mul(a, b) => Expr::Mul(resolve(a, state_names), resolve(b, state_names)).rc(),
        Expr::Div(a, b) => Expr::Div(resolve(a, state_names), resolve(b, state_names)).rc(),
        Expr::Pow(a, b) => Expr::Pow(resolve(a, state_names), resolve(b, state_names)).rc(),
        Expr::Call(f, a) => Expr::Call(*f, resolve(a, state_names)).rc(),
    }
}

impl CompiledExpr {
    /// Evaluate against a state vector `x` (indexed by the compile-time slot
    /// assignment) and a parameter binding `p`.
    pub fn eval_state(&self, x: &DVector<f64>, p: &Parameters) -> Result<f64, ExprError> {
        eval(&self.ast, &mut |name| {
            p.get(name).ok_or_else(|| ExprError::UnboundName(name.to_string()))
        }, x)
    }

    /// Evaluate against an arbitrary name -> value environment, ignoring the
    /// slot-resolved state names (used for expressions with no state
    /// dependency, and by tests exercising the purity property).
    pub fn eval_env(&self, env: &dyn Fn(&str) -> Option<f64>) -> Result<f64, ExprError> {
        let empty = DVector::<f64>::zeros(0);
        eval(&self.ast, &mut |name| {
            env(name).ok_or_else(|| ExprError::UnboundName(name.to_string()))
        }, &empty)
    }

    /// Symbolic derivative ∂E/∂name, compiled and ready for repeated
    /// evaluation (spec.md §4.1 contract: compile once, reuse in hot loops).
    pub fn derivative(&self, name: &str) -> Result<CompiledExpr, ExprError> {
        let state_slot = self.state_names.iter().position(|n| n == name);
        let d = diff(&self.ast, name, state_slot);
        Ok(CompiledExpr { ast: d, state_names: self.state_names.clone() })
    }

    pub fn state_names(&self) -> &[String] {
        &self.state_names
    }
}

fn eval(
    expr: &Expr,
    param: &mut dyn FnMut(&str) -> Result<f64, ExprError>,
    x: &DVector<f64>,
) -> Result<f64, ExprError> {
    match expr {
        Expr::Num(v) => Ok(*v),
        Expr::Name(name) => param(name),
        Expr::State(idx) => Ok(x[*idx]),
        Expr::Neg(a) => Ok(-eval(a, param, x)?),
        Expr::Add(a, b) => Ok(eval(a, param, x)? + eval(b, param, x)?),
        Expr::Sub(a, b) => Ok(eval(a, param, x)? - eval(b, param, x)?),
        Expr::Mul(a, b) => Ok(eval(a, param, x)? * eval(b, param, x)?),
        Expr::Div(a, b) => Ok(eval(a, param, x)? / eval(b, param, x)?),
        Expr::Pow(a, b) => Ok(eval(a, param, x)?.powf(eval(b, param, x)?)),
        Expr::Call(f, a) => {
            let arg = eval(a, param, x)?;
            let result = match f {
                Func::Sin => arg.sin(),
                Func::Cos => arg.cos(),
                Func::Sqrt => arg.sqrt(),
                Func::Log => arg.ln(),
                Func::Exp => arg.exp(),
                Func::Abs => arg.abs(),
            };
            if result.is_finite() {
                Ok(result)
            } else {
                Err(ExprError::Domain(format!("{}({arg})", f.name())))
            }
        }
    }
}

/// Structural differentiation with respect to `name`. `state_slot` is the
/// resolved slot index of `name` if it is a state variable, so that
/// `Expr::State` nodes can be compared against it directly.
fn diff(expr: &Expr, name: &str, state_slot: Option<usize>) -> Rc<Expr> {
    match expr {
        Expr::Num(_) => Expr::Num(0.0).rc(),
        Expr::Name(n) => Expr::Num(if n == name { 1.0 } else { 0.0 }).rc(),
        Expr::State(idx) => Expr::Num(if Some(*idx) == state_slot { 1.0 } else { 0.0 }).rc(),
        Expr::Neg(a) => Expr::Neg(diff(a, name, state_slot)).rc(),
        Expr::Add(a, b) => Expr::Add(diff(a, name, state_slot), diff(b, name, state_slot)).rc(),
        Expr::Sub(a, b) => Expr::Sub(diff(a, name, state_slot), diff(b, name, state_slot)).rc(),
        Expr::Mul(a, b) => {
            // product rule: (a*b)' = a'*b + a*b'
            let da = diff(a, name, state_slot);
            let db = diff(b, name, state_slot);
            Expr::Add(
                Expr::Mul(da, b.clone()).rc(),
                Expr::Mul(a.clone(), db).rc(),
            )
            .rc()
        }
        Expr::Div(a, b) => {
            // quotient rule: (a/b)' = (a'*b - a*b') / b^2
            let da = diff(a, name, state_slot);
            let db = diff(b, name, state_slot);
            let numer = Expr::Sub(
                Expr::Mul(da, b.clone()).rc(),
                Expr::Mul(a.clone(), db).rc(),
            )
            .rc();
            let denom = Expr::Mul(b.clone(), b.clone()).rc();
            Expr::Div(numer, denom).rc()
        }
        Expr::Pow(a, b) => {
            // Only the common case b = constant is differentiated precisely
            // (d/dx a^k = k*a^(k-1)*a'); a variable exponent falls back to
            // the general log-derivative form, valid for a > 0.
            let da = diff(a, name, state_slot);
            if let Expr::Num(k) = &**b {
                let k = *k;
                let reduced = Expr::Pow(a.clone(), Expr::Num(k - 1.0).rc()).rc();
                Expr::Mul(Expr::Mul(Expr::Num(k).rc(), reduced).rc(), da).rc()
            } else {
                // d/dx a^b = a^b * (b' * ln(a) + b * a'/a)
                let db = diff(b, name, state_slot);
                let ln_a = Expr::Call(Func::Log, a.clone()).rc();
                let term1 = Expr::Mul(db, ln_a).rc();
                let term2 = Expr::Mul(b.clone(), Expr::Div(da, a.clone()).rc()).rc();
                let bracket = Expr::Add(term1, term2).rc();
                Expr::Mul(Expr::Pow(a.clone(), b.clone()).rc(), bracket).rc()
            }
        }
        Expr::Call(f, a) => {
            let da = diff(a, name, state_slot);
            let outer = match f {
                Func::Sin => Expr::Call(Func::Cos, a.clone()).rc(),
                Func::Cos => Expr::Neg(Expr::Call(Func::Sin, a.clone()).rc()).rc(),
                Func::Sqrt => {
                    let two_sqrt = Expr::Mul(Expr::Num(2.0).rc(), Expr::Call(Func::Sqrt, a.clone()).rc()).rc();
                    Expr::Div(Expr::Num(1.0).rc(), two_sqrt).rc()
                }
                Func::Log => Expr::Div(Expr::Num(1.0).rc(), a.clone()).rc(),
                Func::Exp => Expr::Call(Func::Exp, a.clone()).rc(),
                Func::Abs => Expr::Div(a.clone(), Expr::Call(Func::Abs, a.clone()).rc()).rc(),
            };
            Expr::Mul(outer, da).rc()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vals: &[(&str, f64)]) -> impl Fn(&str) -> Option<f64> + '_ {
        move |name| vals.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }

    #[test]
    fn purity_repeated_eval_matches() {
        let c = compile("3*x + sin(y)", &[]).unwrap();
        let e = env(&[("x", 2.0), ("y", 1.0)]);
        let a = c.eval_env(&e).unwrap();
        let b = c.eval_env(&e).unwrap();
        assert_eq!(a, b);
    }

    proptest::proptest! {
        #[test]
        fn purity_holds_over_arbitrary_inputs(x in -100.0f64..100.0, y in 0.01f64..100.0) {
            // sqrt/log need a positive-ish domain; x is unconstrained.
            let c = compile("3*x + sqrt(y) - log(y)", &[]).unwrap();
            let e = env(&[("x", x), ("y", y)]);
            let a = c.eval_env(&e).unwrap();
            let b = c.eval_env(&e).unwrap();
            proptest::prop_assert_eq!(a, b);
        }
    }

    #[test]
    fn unbound_name_errors() {
        let c = compile("x + y", &[]).unwrap();
        let e = env(&[("x", 1.0)]);
        assert!(c.eval_env(&e).is_err());
    }

    #[test]
    fn domain_error_on_log_nonpositive() {
        let c = compile("log(x)", &[]).unwrap();
        let e = env(&[("x", -1.0)]);
        assert!(c.eval_env(&e).is_err());
    }

    #[test]
    fn derivative_of_unrelated_name_is_zero() {
        let c = compile("x*x", &["x".to_string()]).unwrap();
        let d = c.derivative("y").unwrap();
        let p = Parameters::new();
        let x = DVector::from_vec(vec![5.0]);
        assert_eq!(d.eval_state(&x, &p).unwrap(), 0.0);
    }

    #[test]
    fn derivative_power_rule() {
        // d/dx x^3 = 3x^2
        let c = compile("x^3", &["x".to_string()]).unwrap();
        let d = c.derivative("x").unwrap();
        let p = Parameters::new();
        let x = DVector::from_vec(vec![2.0]);
        assert!((d.eval_state(&x, &p).unwrap() - 12.0).abs() < 1e-12);
    }

    #[test]
    fn derivative_product_rule() {
        // d/dx x*sin(x) = sin(x) + x*cos(x)
        let c = compile("x*sin(x)", &["x".to_string()]).unwrap();
        let d = c.derivative("x").unwrap();
        let p = Parameters::new();
        let x = DVector::from_vec(vec![0.7]);
        let expect = 0.7f64.sin() + 0.7 * 0.7f64.cos();
        assert!((d.eval_state(&x, &p).unwrap() - expect).abs() < 1e-10);
    }
}

//! Fixed-step integrators (C3): explicit Euler, classical RK4, and an RK4
//! variant that co-evolves a tangent matrix under the variational equation
//! Φ̇ = J(x)·Φ (spec.md §4.3). Both the state step and the divergence guard
//! are fixed-step / caller-driven — this crate makes no attempt at adaptive
//! or implicit integration (explicit Non-goal).

use nalgebra::{DMatrix, DVector};

use crate::error::KernelResult;

/// Default divergence bound used by visualisation-style callers (not by any
/// solver in this crate).
pub const DEFAULT_DIVERGENCE_LIMIT: f64 = 1e4;

/// `x' = x + h·f(x)`.
pub fn euler<F>(f: F, x: &DVector<f64>, h: f64) -> KernelResult<DVector<f64>>
where
    F: Fn(&DVector<f64>) -> KernelResult<DVector<f64>>,
{
    let fx = f(x)?;
    Ok(x + fx * h)
}

/// Classical four-stage explicit Runge–Kutta step.
pub fn rk4<F>(f: F, x: &DVector<f64>, h: f64) -> KernelResult<DVector<f64>>
where
    F: Fn(&DVector<f64>) -> KernelResult<DVector<f64>>,
{
    let k1 = f(x)?;
    let k2 = f(&(x + &k1 * (h * 0.5)))?;
    let k3 = f(&(x + &k2 * (h * 0.5)))?;
    let k4 = f(&(x + &k3 * h))?;
    Ok(x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (h / 6.0))
}

/// RK4 step that, alongside the state, advances a perturbation matrix Φ
/// under Φ̇ = J(x)·Φ, evaluating J at the same four RK4 substate points and
/// combining with the usual RK4 weights.
pub fn rk4_tangent<F, J>(
    f: F,
    jac: J,
    x: &DVector<f64>,
    phi: &DMatrix<f64>,
    h: f64,
) -> KernelResult<(DVector<f64>, DMatrix<f64>)>
where
    F: Fn(&DVector<f64>) -> KernelResult<DVector<f64>>,
    J: Fn(&DVector<f64>) -> KernelResult<DMatrix<f64>>,
{
    let k1 = f(x)?;
    let g1 = jac(x)? * phi;

    let x2 = x + &k1 * (h * 0.5);
    let phi2 = phi + &g1 * (h * 0.5);
    let k2 = f(&x2)?;
    let g2 = jac(&x2)? * &phi2;

    let x3 = x + &k2 * (h * 0.5);
    let phi3 = phi + &g2 * (h * 0.5);
    let k3 = f(&x3)?;
    let g3 = jac(&x3)? * &phi3;

    let x4 = x + &k3 * h;
    let phi4 = phi + &g3 * h;
    let k4 = f(&x4)?;
    let g4 = jac(&x4)? * &phi4;

    let x_next = x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (h / 6.0);
    let phi_next = phi + (g1 + g2 * 2.0 + g3 * 2.0 + g4) * (h / 6.0);
    Ok((x_next, phi_next))
}

/// Rescale `x` to unit norm in place if `‖x‖₂` exceeds `d_lim`. This is a
/// visualisation/realtime policy applied by callers, never by the
/// integrators or solvers themselves (spec.md §4.3).
pub fn apply_divergence_guard(x: &mut DVector<f64>, d_lim: f64) {
    let norm = x.norm();
    if norm > d_lim && norm.is_finite() && norm > 0.0 {
        *x /= norm;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rk4_exponential_matches_seeded_scenario() {
        // Seeded scenario 1: x' = x, x(0) = 1, h = 0.01, 100 steps -> e.
        let mut x = DVector::from_vec(vec![1.0]);
        let f = |x: &DVector<f64>| -> KernelResult<DVector<f64>> { Ok(x.clone()) };
        for _ in 0..100 {
            x = rk4(f, &x, 0.01).unwrap();
        }
        assert!((x[0] - std::f64::consts::E).abs() < 1e-8);
    }

    #[test]
    fn euler_linear_growth() {
        let x = DVector::from_vec(vec![1.0]);
        let f = |x: &DVector<f64>| -> KernelResult<DVector<f64>> { Ok(x.clone()) };
        let x1 = euler(f, &x, 0.1).unwrap();
        assert!((x1[0] - 1.1).abs() < 1e-12);
    }

    #[test]
    fn rk4_tangent_identity_jacobian_matches_state_growth() {
        // dx/dt = x, J = I everywhere: Phi should grow the same way x does.
        let x = DVector::from_vec(vec![1.0]);
        let phi = DMatrix::<f64>::identity(1, 1);
        let f = |x: &DVector<f64>| -> KernelResult<DVector<f64>> { Ok(x.clone()) };
        let jac = |_: &DVector<f64>| -> KernelResult<DMatrix<f64>> {
            Ok(DMatrix::<f64>::identity(1, 1))
        };
        let (x1, phi1) = rk4_tangent(f, jac, &x, &phi, 0.01).unwrap();
        assert!((x1[0] - phi1[(0, 0)]).abs() < 1e-12);
    }

    #[test]
    fn divergence_guard_rescales_to_unit_norm() {
        let mut x = DVector::from_vec(vec![1e6, 0.0]);
        apply_divergence_guard(&mut x, DEFAULT_DIVERGENCE_LIMIT);
        assert!((x.norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn divergence_guard_leaves_small_state_alone() {
        let mut x = DVector::from_vec(vec![1.0, 2.0]);
        let before = x.clone();
        apply_divergence_guard(&mut x, DEFAULT_DIVERGENCE_LIMIT);
        assert_eq!(x, before);
    }
}

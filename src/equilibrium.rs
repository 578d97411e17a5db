//! Equilibrium solver (C4): damped Newton–Raphson using the Moore–Penrose
//! pseudoinverse of the Jacobian, followed by an eigendecomposition of the
//! converged Jacobian (spec.md §4.4).

use nalgebra::DVector;
use num_complex::Complex64;

use crate::error::KernelResult;
use crate::linalg;
use crate::model::{Equilibrium, Model, Parameters};

/// Settings for the damped-Newton equilibrium solve, mirroring the small
/// per-component settings structs the pack favours over one monolithic
/// config (`other_examples/.../equilibrium.rs::NewtonSettings`).
#[derive(Debug, Clone, Copy)]
pub struct NewtonSettings {
    pub max_steps: usize,
    pub damping: f64,
    pub tolerance: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self { max_steps: 100, damping: 1.0, tolerance: 1e-6 }
    }
}

/// Damped Newton iteration `x_{k+1} = x_k - α · J(x_k)⁺ · f(x_k)`. Returns
/// the converged state, or a vector of NaN if `settings.max_steps` is
/// exhausted without reaching the step-size tolerance (spec.md §4.4) — this
/// is a normal (non-error) outcome the caller must check for.
pub fn solve_equilibrium(
    model: &Model,
    params: &Parameters,
    x0: &DVector<f64>,
    settings: NewtonSettings,
) -> KernelResult<DVector<f64>> {
    let n = model.dim();
    let mut x = x0.clone();
    for _ in 0..settings.max_steps {
        let fx = model.rhs(&x, params)?;
        let jac = model.jacobian(&x, params)?;
        let jpinv = linalg::pinv(&jac)?;
        let step = &jpinv * &fx * settings.damping;
        let x_next = &x - &step;
        let delta = (&x_next - &x).norm();
        x = x_next;
        if delta < settings.tolerance {
            return Ok(x);
        }
    }
    Ok(DVector::from_element(n, f64::NAN))
}

/// Eigenpairs of the Jacobian at a (presumably converged) state, used to
/// classify stability and to seed limit-cycle continuation from Hopf points.
pub fn equilibrium_eigenpairs(
    model: &Model,
    params: &Parameters,
    x_star: &DVector<f64>,
) -> KernelResult<(Vec<Complex64>, Vec<DVector<Complex64>>)> {
    let jac = model.jacobian(x_star, params)?;
    Ok(linalg::eigs(&jac)?)
}

/// Convenience wrapper bundling the Newton solve and the eigendecomposition
/// into a single [`Equilibrium`] state entity (spec.md §3).
pub fn solve_equilibrium_full(
    model: &Model,
    params: &Parameters,
    x0: &DVector<f64>,
    settings: NewtonSettings,
) -> KernelResult<Equilibrium> {
    let state = solve_equilibrium(model, params, x0, settings)?;
    if state.iter().any(|v| v.is_nan()) {
        return Ok(Equilibrium { state, eigenvalues: vec![], eigenvectors: vec![] });
    }
    let (eigenvalues, eigenvectors) = equilibrium_eigenpairs(model, params, &state)?;
    Ok(Equilibrium { state, eigenvalues, eigenvectors })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lorenz(sigma: f64, rho: f64, beta: f64) -> Model {
        Model::new(vec![
            ("x".into(), format!("{sigma}*(y - x)")),
            ("y".into(), format!("x*({rho} - z) - y")),
            ("z".into(), format!("x*y - {beta}*z")),
        ])
        .unwrap()
    }

    #[test]
    fn lorenz_equilibrium_matches_seeded_scenario() {
        // Seeded scenario 2: s=10, b=8/3, r=28, x0=(1,1,1), alpha=1, max=100.
        let model = lorenz(10.0, 28.0, 8.0 / 3.0);
        let params = Parameters::new();
        let x0 = DVector::from_vec(vec![1.0, 1.0, 1.0]);
        let settings = NewtonSettings { max_steps: 100, damping: 1.0, tolerance: 1e-6 };
        let x_star = solve_equilibrium(&model, &params, &x0, settings).unwrap();

        let b = 8.0 / 3.0;
        let r = 28.0;
        let expect_xy = (b * (r - 1.0)).sqrt();
        let expect_z = r - 1.0;

        assert!((x_star[0].abs() - expect_xy).abs() < 1e-5);
        assert!((x_star[1].abs() - expect_xy).abs() < 1e-5);
        assert!((x_star[2] - expect_z).abs() < 1e-5);

        let (eigenvalues, _) = equilibrium_eigenpairs(&model, &params, &x_star).unwrap();
        let real_only = eigenvalues.iter().filter(|v| v.im.abs() < 1e-6).count();
        assert_eq!(real_only, 1, "expected exactly one purely real eigenvalue");
        let has_unstable_complex_pair = eigenvalues
            .iter()
            .any(|v| v.im.abs() > 1e-6 && v.re > 0.0);
        assert!(has_unstable_complex_pair);
    }

    #[test]
    fn non_convergent_guess_returns_nan_vector() {
        // x^2 + 1 = 0 has no real root; real Newton iterates for it cycle
        // rather than settle, so the solver should exhaust its step budget.
        let model = Model::new(vec![("x".into(), "x*x + 1".into())]).unwrap();
        let params = Parameters::new();
        let x0 = DVector::from_vec(vec![2.0]);
        let settings = NewtonSettings { max_steps: 5, damping: 1.0, tolerance: 1e-10 };
        let result = solve_equilibrium(&model, &params, &x0, settings).unwrap();
        assert!(result[0].is_nan());
    }
}

//! Pseudo-arclength continuation (PALC) of equilibrium branches in one
//! continuation parameter, with Hopf/Fold bifurcation detection (C8, spec.md
//! §4.8). Grounded on the pack's equilibrium-branch continuation files
//! (`other_examples/.../fork_core-src-continuation-problem.rs`,
//! `fold_curve.rs`, `hopf_curve.rs`), restructured around this crate's dense
//! `nalgebra` representation.

use nalgebra::{DMatrix, DVector};

use crate::abort::{AbortToken, RunStatus};
use crate::error::{KernelError, KernelResult};
use crate::linalg;
use crate::model::{Equilibrium, Model, Parameters};

use super::test_functions::{fold_signal, HopfTest, TestFunction};

#[derive(Debug, Clone, Copy)]
pub struct ContinuationSettings {
    pub ds0: f64,
    pub ds_min: f64,
    pub ds_max: f64,
    pub h_dec: f64,
    pub h_inc: f64,
    /// Newton steps at or below this count triggers a step-size increase.
    pub fast_convergence_threshold: usize,
    pub max_newton: usize,
    pub tolerance: f64,
}

impl Default for ContinuationSettings {
    fn default() -> Self {
        Self {
            ds0: 0.05,
            ds_min: 1e-6,
            ds_max: 0.5,
            h_dec: 0.5,
            h_inc: 1.2,
            fast_convergence_threshold: 3,
            max_newton: 20,
            tolerance: 1e-8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BifurcationKind {
    Fold,
    Hopf,
}

#[derive(Debug, Clone, Copy)]
pub struct BifurcationEvent {
    pub kind: BifurcationKind,
    /// Index into the branch's point list this event is attributed to. For
    /// a fold this is the *previous* point, for a Hopf the *current* one
    /// (spec.md §4.8; an intentionally preserved asymmetry, see DESIGN.md).
    pub point_index: usize,
}

#[derive(Debug, Clone)]
pub struct BranchPoint {
    pub equilibrium: Equilibrium,
    pub param_value: f64,
}

fn augmented_residual(
    model: &Model,
    base: &Parameters,
    param_name: &str,
    x: &DVector<f64>,
    p: f64,
) -> KernelResult<DVector<f64>> {
    let mut params = base.clone();
    params.insert(param_name, p);
    model.rhs(x, &params)
}

fn augmented_jacobian(
    model: &Model,
    base: &Parameters,
    param_name: &str,
    x: &DVector<f64>,
    p: f64,
) -> KernelResult<(DMatrix<f64>, DVector<f64>)> {
    let mut params = base.clone();
    params.insert(param_name, p);
    let jx = model.jacobian(x, &params)?;
    let jp = model.param_jacobian(x, &params, param_name)?;
    Ok((jx, jp))
}

/// Solve the bordered (n+1)x(n+1) corrector system via the crate's plain LU
/// solve (never the pseudoinverse): the augmented continuation Jacobian is
/// generically square and well-posed away from genuine singularities, and
/// those singularities are exactly what the test functions exist to flag
/// (see DESIGN.md).
fn solve_bordered(
    jx: &DMatrix<f64>,
    jp: &DVector<f64>,
    tangent_x: &DVector<f64>,
    tangent_p: f64,
    rhs_top: &DVector<f64>,
    rhs_bottom: f64,
) -> KernelResult<(DVector<f64>, f64)> {
    let n = jx.nrows();
    let mut a = DMatrix::<f64>::zeros(n + 1, n + 1);
    a.view_mut((0, 0), (n, n)).copy_from(jx);
    a.view_mut((0, n), (n, 1)).copy_from(jp);
    for j in 0..n {
        a[(n, j)] = tangent_x[j];
    }
    a[(n, n)] = tangent_p;

    let mut b = DVector::<f64>::zeros(n + 1);
    b.view_mut((0, 0), (n, 1)).copy_from(rhs_top);
    b[n] = rhs_bottom;

    let sol = linalg::solve(&a, &b)?;
    let dx = sol.view_range(0..n, 0).into_owned();
    let dp = sol[n];
    Ok((dx, dp))
}

/// Update the unit continuation tangent (t_x, t_p) at `(x, p)` by solving
/// the bordered system with the previous tangent as the border row and
/// right-hand side e_{n+1}, then normalizing.
fn update_tangent(
    model: &Model,
    base: &Parameters,
    param_name: &str,
    x: &DVector<f64>,
    p: f64,
    prev_tangent_x: &DVector<f64>,
    prev_tangent_p: f64,
) -> KernelResult<(DVector<f64>, f64)> {
    let (jx, jp) = augmented_jacobian(model, base, param_name, x, p)?;
    let n = jx.nrows();
    let zero = DVector::zeros(n);
    let (dx, dp) = solve_bordered(&jx, &jp, prev_tangent_x, prev_tangent_p, &zero, 1.0)?;
    let norm = (dx.norm_squared() + dp * dp).sqrt();
    if norm < 1e-300 {
        return Err(KernelError::DidNotConverge);
    }
    Ok((dx / norm, dp / norm))
}

/// Newton-correct a predictor point back onto the equilibrium manifold
/// subject to the arclength constraint, via the bordered system above.
#[allow(clippy::too_many_arguments)]
fn correct(
    model: &Model,
    base: &Parameters,
    param_name: &str,
    x_pred: &DVector<f64>,
    p_pred: f64,
    x_prev: &DVector<f64>,
    p_prev: f64,
    tangent_x: &DVector<f64>,
    tangent_p: f64,
    ds: f64,
    settings: &ContinuationSettings,
) -> KernelResult<Option<(DVector<f64>, f64, usize)>> {
    let mut x = x_pred.clone();
    let mut p = p_pred;
    for step in 0..settings.max_newton {
        let fx = augmented_residual(model, base, param_name, &x, p)?;
        let arclen = tangent_x.dot(&(&x - x_prev)) + tangent_p * (p - p_prev) - ds;
        let (jx, jp) = augmented_jacobian(model, base, param_name, &x, p)?;
        let (dx, dp) = solve_bordered(&jx, &jp, tangent_x, tangent_p, &(-&fx), -arclen)?;
        x += &dx;
        p += dp;
        let residual_norm = (dx.norm_squared() + dp * dp).sqrt();
        if residual_norm < settings.tolerance {
            return Ok(Some((x, p, step + 1)));
        }
    }
    Ok(None)
}

/// Continue an equilibrium branch in `param_name` starting from a converged
/// equilibrium `(x0, p0)`, for up to `max_points` accepted points, honouring
/// `abort` at each accepted point (spec.md §5 cancellation contract). The
/// returned [`RunStatus`] distinguishes a full run (`Completed`), an
/// abort-token cancellation (`Cancelled`), and a step-size collapse that cut
/// the branch short before `max_points` (`Truncated`).
pub fn continue_equilibria(
    model: &Model,
    base_params: &Parameters,
    param_name: &str,
    x0: &DVector<f64>,
    p0: f64,
    settings: ContinuationSettings,
    max_points: usize,
    abort: &AbortToken,
) -> KernelResult<(Vec<BranchPoint>, Vec<BifurcationEvent>, RunStatus)> {
    let n = model.dim();
    let (jx0, _) = augmented_jacobian(model, base_params, param_name, x0, p0)?;
    let eigs0 = linalg::eigs(&jx0)?;

    let mut branch = vec![BranchPoint {
        equilibrium: Equilibrium { state: x0.clone(), eigenvalues: eigs0.0, eigenvectors: eigs0.1 },
        param_value: p0,
    }];
    let mut events = Vec::new();

    // initial tangent: pure parameter direction, refined by one bordered solve.
    let mut tangent_x = DVector::<f64>::zeros(n);
    let mut tangent_p = 1.0;
    (tangent_x, tangent_p) =
        update_tangent(model, base_params, param_name, x0, p0, &tangent_x, tangent_p)?;

    let mut ds = settings.ds0;
    let mut x_prev = x0.clone();
    let mut p_prev = p0;
    let mut prev_hopf = HopfTest.evaluate(&branch[0].equilibrium.eigenvalues);
    let mut prev_fold_signal = fold_signal(tangent_p);
    let mut status = RunStatus::Completed;

    while branch.len() < max_points {
        if abort.is_cancelled() {
            log::debug!("continue_equilibria: cancelled at {} points", branch.len());
            status = RunStatus::Cancelled;
            break;
        }

        let x_pred = &x_prev + &tangent_x * ds;
        let p_pred = p_prev + tangent_p * ds;

        let corrected = correct(
            model, base_params, param_name, &x_pred, p_pred, &x_prev, p_prev, &tangent_x,
            tangent_p, ds, &settings,
        )?;

        let (x_new, p_new, newton_steps) = match corrected {
            Some(v) => v,
            None => {
                ds *= settings.h_dec;
                log::trace!("continue_equilibria: step rejected, ds shrunk to {ds}");
                if ds.abs() < settings.ds_min {
                    return Err(KernelError::DidNotConverge);
                }
                continue;
            }
        };
        log::trace!(
            "continue_equilibria: step accepted at p={p_new}, {newton_steps} Newton iterations"
        );

        let (jac_new, _) = augmented_jacobian(model, base_params, param_name, &x_new, p_new)?;
        let (eigenvalues, eigenvectors) = linalg::eigs(&jac_new)?;

        let hopf_value = HopfTest.evaluate(&eigenvalues);
        if hopf_value * prev_hopf < 0.0 {
            log::debug!("continue_equilibria: Hopf crossing near point {}", branch.len());
            events.push(BifurcationEvent { kind: BifurcationKind::Hopf, point_index: branch.len() });
        }
        prev_hopf = hopf_value;

        let (new_tangent_x, new_tangent_p) =
            update_tangent(model, base_params, param_name, &x_new, p_new, &tangent_x, tangent_p)?;
        let fold_value = fold_signal(new_tangent_p);
        if fold_value * prev_fold_signal < 0.0 {
            log::debug!("continue_equilibria: fold crossing near point {}", branch.len() - 1);
            events.push(BifurcationEvent {
                kind: BifurcationKind::Fold,
                point_index: branch.len() - 1,
            });
        }
        prev_fold_signal = fold_value;

        branch.push(BranchPoint {
            equilibrium: Equilibrium { state: x_new.clone(), eigenvalues, eigenvectors },
            param_value: p_new,
        });

        x_prev = x_new;
        p_prev = p_new;
        tangent_x = new_tangent_x;
        tangent_p = new_tangent_p;

        if newton_steps <= settings.fast_convergence_threshold {
            ds = (ds * settings.h_inc).clamp(-settings.ds_max, settings.ds_max);
        } else {
            ds *= settings.h_dec;
        }
        log::trace!("continue_equilibria: ds adapted to {ds}");
        if ds.abs() < settings.ds_min {
            log::debug!("continue_equilibria: truncated, ds collapsed below ds_min");
            status = RunStatus::Truncated;
            break;
        }
    }

    Ok((branch, events, status))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fhn() -> Model {
        // FitzHugh-Nagumo: v' = v - v^3/3 - w + I, w' = 0.08*(v + 0.7 - 0.8*w)
        Model::new(vec![
            ("v".into(), "v - (v^3)/3 - w + I".into()),
            ("w".into(), "0.08*(v + 0.7 - 0.8*w)".into()),
        ])
        .unwrap()
    }

    #[test]
    fn fhn_continuation_in_current_finds_a_hopf_point() {
        // Seeded scenario 6: continuation in I starting at a stable rest
        // state should cross a Hopf bifurcation as I increases.
        let model = fhn();
        let base = Parameters::new();
        let x0 = DVector::from_vec(vec![-1.1994, -0.62439]);
        let settings = ContinuationSettings { ds0: 0.02, ..Default::default() };
        let abort = AbortToken::new();
        let (branch, events, _status) =
            continue_equilibria(&model, &base, "I", &x0, 0.0, settings, 80, &abort).unwrap();
        assert!(branch.len() > 1);
        assert!(
            events.iter().any(|e| e.kind == BifurcationKind::Hopf),
            "expected at least one Hopf crossing along the branch"
        );
    }

    #[test]
    fn abort_token_halts_continuation_early() {
        let model = fhn();
        let base = Parameters::new();
        let x0 = DVector::from_vec(vec![-1.1994, -0.62439]);
        let settings = ContinuationSettings::default();
        let abort = AbortToken::new();
        abort.cancel();
        let (branch, _, status) =
            continue_equilibria(&model, &base, "I", &x0, 0.0, settings, 80, &abort).unwrap();
        assert_eq!(branch.len(), 1, "cancelled before any new point is accepted");
        assert_eq!(status, RunStatus::Cancelled);
    }
}

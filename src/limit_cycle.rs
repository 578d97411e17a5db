//! Limit-cycle continuation via multiple shooting (C9, spec.md §4.9): a
//! periodic orbit is represented by `m` shooting points plus a period `T`;
//! the corrector is a finite-difference Newton solve over the stacked
//! continuity residuals and one phase condition. Seeded from a Hopf point
//! detected during equilibrium continuation (C8) and stepped in the
//! continuation parameter by plain zeroth-order parameter stepping (no
//! arclength predictor — spec.md explicitly scopes PALC to equilibria).

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use crate::abort::{AbortToken, RunStatus};
use crate::error::{KernelError, KernelResult};
use crate::integrators::rk4;
use crate::linalg;
use crate::model::{Model, Parameters};

#[derive(Debug, Clone, Copy)]
pub struct ShootingSettings {
    pub shooting_points: usize,
    pub substeps_per_segment: usize,
    pub max_newton: usize,
    pub tolerance: f64,
    pub fd_eps: f64,
}

impl Default for ShootingSettings {
    fn default() -> Self {
        Self {
            shooting_points: 4,
            substeps_per_segment: 40,
            max_newton: 30,
            tolerance: 1e-8,
            fd_eps: 1e-6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LimitCycle {
    pub points: Vec<DVector<f64>>,
    pub period: f64,
}

/// Construct an initial multiple-shooting guess from a detected Hopf point:
/// `x_j = x* + 2*A*(Re(v)*cos(omega*t_j) - Im(v)*sin(omega*t_j))`, with
/// period `2*pi / |Im(lambda)|` (spec.md §4.9's normal-form estimate of the
/// emerging cycle's frequency, using the raw eigenvector components, not an
/// orthonormalized basis).
pub fn initial_guess_lc_from_hopf(
    x_star: &DVector<f64>,
    lambda: Complex64,
    eigenvector: &DVector<Complex64>,
    amplitude: f64,
    m: usize,
) -> LimitCycle {
    let re: DVector<f64> = eigenvector.map(|c| c.re);
    let im: DVector<f64> = eigenvector.map(|c| c.im);

    let period = 2.0 * std::f64::consts::PI / lambda.im.abs().max(1e-12);
    let points = (0..m)
        .map(|j| {
            let theta = 2.0 * std::f64::consts::PI * (j as f64) / (m as f64);
            x_star + &re * (2.0 * amplitude * theta.cos()) - &im * (2.0 * amplitude * theta.sin())
        })
        .collect();
    LimitCycle { points, period }
}

fn integrate_segment(
    model: &Model,
    params: &Parameters,
    x: &DVector<f64>,
    segment_duration: f64,
    substeps: usize,
) -> KernelResult<DVector<f64>> {
    let h = segment_duration / substeps as f64;
    let mut state = x.clone();
    for _ in 0..substeps {
        state = rk4(|s| model.rhs(s, params), &state, h)?;
    }
    Ok(state)
}

/// Stack `m` continuity residuals (each of dimension n) and one phase
/// condition into a single residual vector of length `m*n + 1`.
fn residual(
    model: &Model,
    params: &Parameters,
    points: &[DVector<f64>],
    period: f64,
    phase_ref: &DVector<f64>,
    phase_dir: &DVector<f64>,
    settings: &ShootingSettings,
) -> KernelResult<DVector<f64>> {
    let m = points.len();
    let n = points[0].len();
    let segment_duration = period / m as f64;
    let mut out = DVector::zeros(m * n + 1);
    for j in 0..m {
        let mapped = integrate_segment(model, params, &points[j], segment_duration, settings.substeps_per_segment)?;
        let target = &points[(j + 1) % m];
        let diff = mapped - target;
        out.view_mut((j * n, 0), (n, 1)).copy_from(&diff);
    }
    out[m * n] = (&points[0] - phase_ref).dot(phase_dir);
    Ok(out)
}

fn pack(points: &[DVector<f64>], period: f64) -> DVector<f64> {
    let n = points[0].len();
    let m = points.len();
    let mut z = DVector::zeros(m * n + 1);
    for (j, p) in points.iter().enumerate() {
        z.view_mut((j * n, 0), (n, 1)).copy_from(p);
    }
    z[m * n] = period;
    z
}

fn unpack(z: &DVector<f64>, m: usize, n: usize) -> (Vec<DVector<f64>>, f64) {
    let points = (0..m)
        .map(|j| z.view_range(j * n..(j + 1) * n, 0).into_owned())
        .collect();
    (points, z[m * n])
}

/// Finite-difference Newton corrector for the stacked multiple-shooting
/// system, solved each iteration via [`linalg::solve`] (LU).
fn newton_correct(
    model: &Model,
    params: &Parameters,
    guess: LimitCycle,
    phase_ref: &DVector<f64>,
    phase_dir: &DVector<f64>,
    settings: &ShootingSettings,
) -> KernelResult<Option<LimitCycle>> {
    let m = settings.shooting_points;
    let n = guess.points[0].len();
    let mut z = pack(&guess.points, guess.period);

    for iteration in 0..settings.max_newton {
        let (points, period) = unpack(&z, m, n);
        if period <= 0.0 {
            log::trace!("newton_correct: rejected non-positive period at iteration {iteration}");
            return Ok(None);
        }
        let f0 = residual(model, params, &points, period, phase_ref, phase_dir, settings)?;
        log::trace!("newton_correct: iteration {iteration}, residual norm {}", f0.norm());
        if f0.norm() < settings.tolerance {
            log::debug!("newton_correct: converged after {} iterations", iteration + 1);
            return Ok(Some(LimitCycle { points, period }));
        }

        let dim = m * n + 1;
        let mut jac = DMatrix::<f64>::zeros(dim, dim);
        for k in 0..dim {
            let mut z_pert = z.clone();
            z_pert[k] += settings.fd_eps;
            let (points_pert, period_pert) = unpack(&z_pert, m, n);
            if period_pert <= 0.0 {
                return Ok(None);
            }
            let f_pert =
                residual(model, params, &points_pert, period_pert, phase_ref, phase_dir, settings)?;
            let col = (&f_pert - &f0) / settings.fd_eps;
            jac.view_mut((0, k), (dim, 1)).copy_from(&col);
        }

        let step = match linalg::solve(&jac, &(-&f0)) {
            Ok(s) => s,
            Err(_) => {
                log::trace!("newton_correct: singular Jacobian at iteration {iteration}");
                return Ok(None);
            }
        };
        z += &step;
    }
    log::debug!("newton_correct: did not converge within {} iterations", settings.max_newton);
    Ok(None)
}

/// Newton-correct a Hopf-seeded guess into a genuine limit cycle at the
/// starting parameter value.
pub fn solve_limit_cycle(
    model: &Model,
    params: &Parameters,
    guess: LimitCycle,
    settings: ShootingSettings,
) -> KernelResult<LimitCycle> {
    let phase_ref = guess.points[0].clone();
    let phase_dir = model.rhs(&phase_ref, params)?;
    newton_correct(model, params, guess, &phase_ref, &phase_dir, &settings)?
        .ok_or(KernelError::DidNotConverge)
}

#[derive(Debug, Clone)]
pub struct LimitCycleBranchPoint {
    pub cycle: LimitCycle,
    pub param_value: f64,
}

/// Zeroth-order continuation of a limit cycle in `param_name`: at each step
/// the converged cycle from the previous parameter value seeds the Newton
/// corrector at the next one, with no arclength predictor (spec.md §4.9). The
/// returned [`RunStatus`] distinguishes a full run, an abort-token
/// cancellation, and a Newton failure that truncated the branch early.
pub fn continue_limit_cycle_ms(
    model: &Model,
    base_params: &Parameters,
    param_name: &str,
    mut cycle: LimitCycle,
    p0: f64,
    dp: f64,
    settings: ShootingSettings,
    max_points: usize,
    abort: &AbortToken,
) -> KernelResult<(Vec<LimitCycleBranchPoint>, RunStatus)> {
    let mut branch = Vec::with_capacity(max_points);
    let mut p = p0;
    let mut status = RunStatus::Completed;

    let mut params = base_params.clone();
    params.insert(param_name, p);
    cycle = solve_limit_cycle(model, &params, cycle, settings)?;
    branch.push(LimitCycleBranchPoint { cycle: cycle.clone(), param_value: p });

    while branch.len() < max_points {
        if abort.is_cancelled() {
            log::debug!("continue_limit_cycle_ms: cancelled at {} points", branch.len());
            status = RunStatus::Cancelled;
            break;
        }
        p += dp;
        let mut params = base_params.clone();
        params.insert(param_name, p);

        let phase_ref = cycle.points[0].clone();
        let phase_dir = model.rhs(&phase_ref, &params)?;
        match newton_correct(model, &params, cycle.clone(), &phase_ref, &phase_dir, &settings)? {
            Some(corrected) => {
                cycle = corrected;
                log::trace!("continue_limit_cycle_ms: step accepted at p={p}");
                branch.push(LimitCycleBranchPoint { cycle: cycle.clone(), param_value: p });
            }
            None => {
                log::debug!("continue_limit_cycle_ms: truncated, Newton failed at p={p}");
                status = RunStatus::Truncated;
                break;
            }
        }
    }
    Ok((branch, status))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stuart_landau(omega: f64) -> Model {
        // Stuart-Landau oscillator in Cartesian form, mu fixed at 1 (supercritical).
        Model::new(vec![
            ("x".into(), format!("x - {omega}*y - x*(x*x + y*y)")),
            ("y".into(), format!("{omega}*x + y - y*(x*x + y*y)")),
        ])
        .unwrap()
    }

    #[test]
    fn stuart_landau_limit_cycle_has_unit_radius() {
        // Seeded scenario 7: the Stuart-Landau cycle at mu=1 is the unit
        // circle traversed with period 2*pi/omega.
        let omega = 1.3;
        let model = stuart_landau(omega);
        let params = Parameters::new();
        let m = 4;
        let period_guess = 2.0 * std::f64::consts::PI / omega;
        let points = (0..m)
            .map(|j| {
                let theta = 2.0 * std::f64::consts::PI * j as f64 / m as f64;
                DVector::from_vec(vec![theta.cos(), theta.sin()])
            })
            .collect();
        let guess = LimitCycle { points, period: period_guess };
        let settings = ShootingSettings::default();
        let cycle = solve_limit_cycle(&model, &params, guess, settings).unwrap();

        for p in &cycle.points {
            let r = p.norm();
            assert!((r - 1.0).abs() < 1e-3, "shooting point off unit circle, r={r}");
        }
        assert!((cycle.period - period_guess).abs() < 1e-2);
    }

    #[test]
    fn hopf_seeded_guess_corrects_to_stuart_landau_cycle() {
        // Seeded scenario 7 (spec.md §8): mu=0.1, omega=1.5, beta=0, M=20,
        // tol=1e-8, fd_eps=1e-7. At the Hopf point x*=(0,0), the Jacobian of
        // x' = mu*x - omega*y - x*(x^2+y^2), y' = omega*x + mu*y - y*(x^2+y^2)
        // is [[mu, -omega], [omega, mu]], with eigenvector (1, -i) for
        // lambda = mu + i*omega.
        let mu = 0.1;
        let omega = 1.5;
        let model = Model::new(vec![
            ("x".into(), format!("{mu}*x - {omega}*y - x*(x*x + y*y)")),
            ("y".into(), format!("{omega}*x + {mu}*y - y*(x*x + y*y)")),
        ])
        .unwrap();
        let params = Parameters::new();
        let x_star = DVector::from_vec(vec![0.0, 0.0]);
        let lambda = Complex64::new(mu, omega);
        let eigenvector = DVector::from_vec(vec![Complex64::new(1.0, 0.0), Complex64::new(0.0, -1.0)]);
        let amplitude = 0.05;
        let m = 20;

        let guess = initial_guess_lc_from_hopf(&x_star, lambda, &eigenvector, amplitude, m);
        assert_eq!(guess.points.len(), m);

        let settings =
            ShootingSettings { shooting_points: m, tolerance: 1e-8, fd_eps: 1e-7, ..ShootingSettings::default() };
        let cycle = solve_limit_cycle(&model, &params, guess, settings).unwrap();

        let expected_period = 2.0 * std::f64::consts::PI / omega;
        assert!(
            (cycle.period - expected_period).abs() / expected_period < 0.01,
            "period {} not within 1% of {expected_period}",
            cycle.period
        );
        let expected_radius = mu.sqrt();
        for p in &cycle.points {
            let r = p.norm();
            assert!(
                (r - expected_radius).abs() / expected_radius < 0.01,
                "node radius {r} not within 1% of {expected_radius}"
            );
        }
    }
}

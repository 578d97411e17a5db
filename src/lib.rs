//! A numerical kernel for continuous-time dynamical systems: a small
//! expression language for defining `ẋ = f(x; p)`, dense linear algebra,
//! fixed-step integration, equilibrium solving, Lyapunov spectra, power
//! spectra, isocline extraction, and continuation of equilibrium and
//! limit-cycle branches (spec.md §§1–2).
//!
//! The kernel is synchronous and single-threaded throughout: every
//! long-running operation accepts an [`abort::AbortToken`] checked at
//! natural loop boundaries rather than consulting a wall clock, and none of
//! it spawns threads or depends on an async runtime (spec.md §5).

pub mod abort;
pub mod continuation;
pub mod equilibrium;
pub mod error;
pub mod expr;
pub mod integrators;
pub mod limit_cycle;
pub mod linalg;
pub mod lyapunov;
pub mod marching_squares;
pub mod model;
pub mod psd;

pub use abort::{AbortToken, RunStatus};
pub use error::{ExprError, KernelError, KernelResult, LinalgError};
pub use model::{Equilibrium, Isocline, IsoPoint, Model, Orbit, Parameters, StateEntity};

pub use equilibrium::{equilibrium_eigenpairs, solve_equilibrium, solve_equilibrium_full, NewtonSettings};
pub use integrators::{apply_divergence_guard, euler, rk4, rk4_tangent, DEFAULT_DIVERGENCE_LIMIT};
pub use limit_cycle::{
    continue_limit_cycle_ms, initial_guess_lc_from_hopf, solve_limit_cycle, LimitCycle,
    LimitCycleBranchPoint, ShootingSettings,
};
pub use lyapunov::{full_spectrum, leading_exponent, lyapunov_dimension, refine_spectrum, LyapunovSettings};
pub use marching_squares::{
    conjoin_segments, extract_isocline, march_squares_model, IsoSegment, LatticeAxis, LatticeSettings,
};
pub use psd::{dominant_frequency, power_spectrum, PowerSpectrum, PsdSettings};

pub use continuation::{
    continue_equilibria, BifurcationEvent, BifurcationKind, BranchPoint, ContinuationSettings,
};

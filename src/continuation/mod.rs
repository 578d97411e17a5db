//! Continuation (C8, C9): pseudo-arclength tracking of equilibrium branches
//! with bifurcation detection, and multiple-shooting continuation of limit
//! cycles seeded from detected Hopf points (spec.md §4.8–§4.9).

pub mod equilibrium;
pub mod test_functions;

pub use equilibrium::{
    continue_equilibria, BifurcationEvent, BifurcationKind, BranchPoint, ContinuationSettings,
};

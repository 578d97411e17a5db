//! Bifurcation test functions evaluated along an equilibrium continuation
//! branch (spec.md §4.8), grounded on the pack's `fork`-style continuation
//! code which keeps each bifurcation test as a small, independently
//! evaluable unit rather than one monolithic classifier.

use num_complex::Complex64;

/// A named scalar test function over a Jacobian's spectrum. A sign change of
/// `evaluate` between two consecutive branch points signals a crossing;
/// `report_offset` says which of the two points the event should be
/// attributed to when one is reported (spec.md §4.8: a fold is attributed to
/// the previous point, a Hopf to the current one — an asymmetry native to
/// continuation formulations in general, not specific to this trait's only
/// implementor here).
pub trait TestFunction {
    fn name(&self) -> &'static str;
    fn evaluate(&self, eigenvalues: &[Complex64]) -> f64;
    /// 0 => report the point the sign change was detected *at* (current);
    /// 1 => report the *previous* point instead.
    fn report_offset(&self) -> usize;
}

/// Hopf test: product over all unordered pairs i<j of (λᵢ + λⱼ). This
/// vanishes exactly when some pair of eigenvalues is a complex-conjugate
/// pair crossing the imaginary axis (λ + λ̄ = 2·Re(λ) = 0), and is real for
/// a real spectrum since complex eigenvalues of a real matrix come in
/// conjugate pairs.
pub struct HopfTest;

impl TestFunction for HopfTest {
    fn name(&self) -> &'static str {
        "hopf"
    }
    fn evaluate(&self, eigenvalues: &[Complex64]) -> f64 {
        let n = eigenvalues.len();
        let mut product = Complex64::new(1.0, 0.0);
        for i in 0..n {
            for j in (i + 1)..n {
                product *= eigenvalues[i] + eigenvalues[j];
            }
        }
        product.re
    }
    fn report_offset(&self) -> usize {
        0
    }
}

/// Signed parameter-direction component of the continuation tangent. Fold
/// detection has no `TestFunction` impl: a fold is where the branch turns
/// back on `p`, a property of the tangent, not of the Jacobian spectrum.
pub fn fold_signal(tangent_param_component: f64) -> f64 {
    tangent_param_component
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hopf_test_vanishes_for_pure_imaginary_pair() {
        let eigenvalues = vec![
            Complex64::new(0.0, 2.0),
            Complex64::new(0.0, -2.0),
            Complex64::new(-3.0, 0.0),
        ];
        let hopf = HopfTest;
        assert!(hopf.evaluate(&eigenvalues).abs() < 1e-10);
    }

    #[test]
    fn hopf_test_nonzero_for_stable_real_spectrum() {
        let eigenvalues = vec![Complex64::new(-1.0, 0.0), Complex64::new(-2.0, 0.0)];
        let hopf = HopfTest;
        assert!(hopf.evaluate(&eigenvalues) > 0.0);
    }
}

//! Dense linear algebra (C2): LU solve with partial pivoting, Moore–Penrose
//! pseudoinverse, thin Householder QR, and eigenpairs of a real general
//! matrix. All matrices are dense, real, row-major (spec.md §4.2); we build
//! on `nalgebra::DMatrix<f64>` as the single concrete representation rather
//! than the teacher's generic `Matrix`/backend trait hierarchy, since the
//! spec mandates exactly one dense representation and no sparse/GPU backend
//! (see DESIGN.md).

use nalgebra::{Complex, DMatrix, DVector};
use num_complex::Complex64;

use crate::error::LinalgError;

const PIVOT_EPS: f64 = 1e-14;

fn check_finite(a: &DMatrix<f64>) -> Result<(), LinalgError> {
    if a.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(LinalgError::NonFinite)
    }
}

/// Solve `A x = b` via LU decomposition with partial pivoting. Fails with
/// [`LinalgError::Singular`] when a pivot magnitude drops below `1e-14`.
pub fn solve(a: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>, LinalgError> {
    let n = a.nrows();
    if a.nrows() != a.ncols() {
        return Err(LinalgError::NotSquare(a.nrows(), a.ncols()));
    }
    if b.len() != n {
        return Err(LinalgError::DimensionMismatch { expected: n, got: b.len() });
    }
    check_finite(a)?;

    let mut m = a.clone();
    let mut perm: Vec<usize> = (0..n).collect();
    let mut x = b.clone();

    for k in 0..n {
        // partial pivot: largest magnitude in column k, rows k..n
        let mut p = k;
        let mut best = m[(k, k)].abs();
        for i in (k + 1)..n {
            let v = m[(i, k)].abs();
            if v > best {
                best = v;
                p = i;
            }
        }
        if best < PIVOT_EPS {
            return Err(LinalgError::Singular);
        }
        if p != k {
            m.swap_rows(k, p);
            x.swap_rows(k, p);
            perm.swap(k, p);
        }
        for i in (k + 1)..n {
            let factor = m[(i, k)] / m[(k, k)];
            if factor != 0.0 {
                for j in k..n {
                    let mkj = m[(k, j)];
                    m[(i, j)] -= factor * mkj;
                }
                x[i] -= factor * x[k];
            }
        }
    }

    // back substitution
    let mut out = DVector::zeros(n);
    for i in (0..n).rev() {
        let mut sum = x[i];
        for j in (i + 1)..n {
            sum -= m[(i, j)] * out[j];
        }
        out[i] = sum / m[(i, i)];
    }
    Ok(out)
}

/// Moore–Penrose pseudoinverse via SVD, used by the damped-Newton
/// equilibrium solver (C4) and the continuation corrector.
pub fn pinv(a: &DMatrix<f64>) -> Result<DMatrix<f64>, LinalgError> {
    check_finite(a)?;
    let svd = a.clone().svd(true, true);
    svd.pseudo_inverse(1e-12).map_err(|_| LinalgError::NonFinite)
}

/// Thin QR decomposition via Householder reflections. Returns `(Q, R)` with
/// orthonormal columns in `Q` and a non-negative diagonal in `R` (sign-fixed
/// by flipping the corresponding column of `Q` and row of `R`).
pub fn qr(a: &DMatrix<f64>) -> Result<(DMatrix<f64>, DMatrix<f64>), LinalgError> {
    if a.nrows() == 0 || a.ncols() == 0 {
        return Err(LinalgError::DimensionMismatch { expected: 1, got: 0 });
    }
    check_finite(a)?;
    let qr = a.clone().qr();
    let mut q = qr.q();
    let mut r = qr.r();
    let k = r.nrows().min(r.ncols());
    for i in 0..k {
        if r[(i, i)] < 0.0 {
            for row in 0..r.ncols() {
                r[(i, row)] = -r[(i, row)];
            }
            for row in 0..q.nrows() {
                q[(row, i)] = -q[(row, i)];
            }
        }
    }
    Ok((q, r))
}

/// Eigenvalues and right eigenvectors of a real general matrix. Eigenvalues
/// come from a real Schur decomposition; eigenvectors are recovered by
/// inverse iteration on the (possibly complex) shifted system, since
/// `nalgebra` does not expose eigenvectors for non-symmetric real matrices.
/// Ordering is arbitrary but stable for a given input (spec.md §4.2).
pub fn eigs(a: &DMatrix<f64>) -> Result<(Vec<Complex64>, Vec<DVector<Complex64>>), LinalgError> {
    let n = a.nrows();
    if a.nrows() != a.ncols() {
        return Err(LinalgError::NotSquare(a.nrows(), a.ncols()));
    }
    check_finite(a)?;
    let schur = nalgebra::linalg::Schur::new(a.clone());
    let eigenvalues = schur.complex_eigenvalues();
    let mut values = Vec::with_capacity(n);
    let mut vectors = Vec::with_capacity(n);
    for lambda in eigenvalues.iter() {
        let v = inverse_iteration(a, *lambda)?;
        values.push(*lambda);
        vectors.push(v);
    }
    Ok((values, vectors))
}

/// Recover an eigenvector for a known (possibly complex) eigenvalue `lambda`
/// of the real matrix `a` by a handful of steps of shifted inverse
/// iteration on the complexified system `(A - (lambda + shift) I) v = v_k`.
fn inverse_iteration(
    a: &DMatrix<f64>,
    lambda: Complex64,
) -> Result<DVector<Complex64>, LinalgError> {
    let n = a.nrows();
    let shift = Complex::new(1e-8, 1e-9);
    let ac: DMatrix<Complex64> = a.map(|v| Complex::new(v, 0.0));
    let shifted = ac
        - DMatrix::<Complex64>::identity(n, n) * (lambda + shift);

    let mut v = DVector::<Complex64>::from_element(n, Complex::new(1.0, 0.0));
    normalize_complex(&mut v);
    for _ in 0..8 {
        let next = match complex_solve(&shifted, &v) {
            Ok(x) => x,
            Err(_) => break,
        };
        v = next;
        normalize_complex(&mut v);
    }
    Ok(v)
}

fn normalize_complex(v: &mut DVector<Complex64>) {
    let norm: f64 = v.iter().map(|c| c.norm_sqr()).sum::<f64>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        for c in v.iter_mut() {
            *c /= norm;
        }
    }
}

/// Complex analogue of [`solve`]: Gaussian elimination with partial pivoting
/// by magnitude, used only for recovering eigenvectors.
fn complex_solve(
    a: &DMatrix<Complex64>,
    b: &DVector<Complex64>,
) -> Result<DVector<Complex64>, LinalgError> {
    let n = a.nrows();
    let mut m = a.clone();
    let mut x = b.clone();
    for k in 0..n {
        let mut p = k;
        let mut best = m[(k, k)].norm();
        for i in (k + 1)..n {
            let v = m[(i, k)].norm();
            if v > best {
                best = v;
                p = i;
            }
        }
        if best < PIVOT_EPS {
            return Err(LinalgError::Singular);
        }
        if p != k {
            m.swap_rows(k, p);
            x.swap_rows(k, p);
        }
        for i in (k + 1)..n {
            let factor = m[(i, k)] / m[(k, k)];
            if factor.norm() != 0.0 {
                for j in k..n {
                    let mkj = m[(k, j)];
                    m[(i, j)] -= factor * mkj;
                }
                x[i] -= factor * x[k];
            }
        }
    }
    let mut out = DVector::<Complex64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = x[i];
        for j in (i + 1)..n {
            sum -= m[(i, j)] * out[j];
        }
        out[i] = sum / m[(i, i)];
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solve_identity() {
        let a = DMatrix::<f64>::identity(3, 3);
        let b = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let x = solve(&a, &b).unwrap();
        assert!((x - b).norm() < 1e-12);
    }

    #[test]
    fn solve_detects_singular() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let b = DVector::from_vec(vec![1.0, 2.0]);
        assert!(matches!(solve(&a, &b), Err(LinalgError::Singular)));
    }

    #[test]
    fn qr_is_orthonormal_and_reconstructs() {
        let a = DMatrix::from_row_slice(3, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 10.0]);
        let (q, r) = qr(&a).unwrap();
        let qt_q = q.transpose() * &q;
        let ident = DMatrix::<f64>::identity(3, 3);
        assert!((qt_q - ident).norm() < 1e-10);
        let reconstructed = &q * &r;
        assert!((reconstructed - &a).norm() <= 1e-10 * a.norm().max(1.0));
        for i in 0..3 {
            assert!(r[(i, i)] >= 0.0);
        }
    }

    proptest::proptest! {
        #[test]
        fn qr_orthonormal_for_arbitrary_3x3(
            entries in proptest::collection::vec(-10.0f64..10.0, 9)
        ) {
            let a = DMatrix::from_row_slice(3, 3, &entries);
            if let Ok((q, r)) = qr(&a) {
                let qt_q = q.transpose() * &q;
                let ident = DMatrix::<f64>::identity(3, 3);
                proptest::prop_assert!((qt_q - ident).norm() < 1e-8);
                let reconstructed = &q * &r;
                proptest::prop_assert!((reconstructed - &a).norm() <= 1e-8 * a.norm().max(1.0));
            }
        }
    }

    #[test]
    fn pinv_matches_inverse_for_invertible_square() {
        let a = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 4.0]);
        let p = pinv(&a).unwrap();
        let expect = DMatrix::from_row_slice(2, 2, &[0.5, 0.0, 0.0, 0.25]);
        assert!((p - expect).norm() < 1e-10);
    }

    #[test]
    fn eigs_diagonal_matrix() {
        let a = DMatrix::from_row_slice(2, 2, &[3.0, 0.0, 0.0, -5.0]);
        let (vals, _vecs) = eigs(&a).unwrap();
        let mut re: Vec<f64> = vals.iter().map(|c| c.re).collect();
        re.sort_by(|x, y| x.partial_cmp(y).unwrap());
        assert!((re[0] - (-5.0)).abs() < 1e-6);
        assert!((re[1] - 3.0).abs() < 1e-6);
    }
}

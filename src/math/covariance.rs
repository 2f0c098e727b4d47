//! Parameter uncertainties from the curvature of the NLL.
//!
//! The covariance of the fitted parameters is approximated by the inverse
//! Hessian of the negative log-likelihood at the minimum. The Hessian is built
//! by central finite differences and inverted with an SVD pseudo-inverse, so a
//! flat direction (e.g. a mixture fraction pinned at a bound) yields a large but
//! finite error instead of a panic.

use nalgebra::DMatrix;

/// Central-difference Hessian of `f` at `x` with per-coordinate `steps`.
pub fn hessian<F: Fn(&[f64]) -> f64>(f: F, x: &[f64], steps: &[f64]) -> DMatrix<f64> {
    let n = x.len();
    let mut h = DMatrix::<f64>::zeros(n, n);
    let f0 = f(x);
    let mut p = x.to_vec();

    for i in 0..n {
        let hi = steps[i];
        p[i] = x[i] + hi;
        let fp = f(&p);
        p[i] = x[i] - hi;
        let fm = f(&p);
        p[i] = x[i];
        h[(i, i)] = (fp - 2.0 * f0 + fm) / (hi * hi);

        for j in (i + 1)..n {
            let hj = steps[j];
            let mut corner = |si: f64, sj: f64| {
                p[i] = x[i] + si * hi;
                p[j] = x[j] + sj * hj;
                let v = f(&p);
                p[i] = x[i];
                p[j] = x[j];
                v
            };
            let v = (corner(1.0, 1.0) - corner(1.0, -1.0) - corner(-1.0, 1.0) + corner(-1.0, -1.0))
                / (4.0 * hi * hj);
            h[(i, j)] = v;
            h[(j, i)] = v;
        }
    }
    h
}

/// Symmetric parameter errors `sqrt(diag(H⁻¹))`.
///
/// Returns `None` if the Hessian is non-finite or the pseudo-inverse fails.
/// Individual entries are `None` when the corresponding variance is not positive.
pub fn errors_from_hessian(h: &DMatrix<f64>) -> Option<Vec<Option<f64>>> {
    if h.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let cov = h.clone().svd(true, true).pseudo_inverse(1e-12).ok()?;
    Some(
        (0..cov.nrows())
            .map(|i| {
                let var = cov[(i, i)];
                if var.is_finite() && var > 0.0 { Some(var.sqrt()) } else { None }
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadratic_nll_gives_expected_errors() {
        // NLL = (x-1)^2/(2·0.5^2) + (y+2)^2/(2·2^2)  =>  errors 0.5 and 2.
        let f = |p: &[f64]| (p[0] - 1.0).powi(2) / 0.5 + (p[1] + 2.0).powi(2) / 8.0;
        let h = hessian(f, &[1.0, -2.0], &[1e-3, 1e-3]);
        let errs = errors_from_hessian(&h).unwrap();
        assert!((errs[0].unwrap() - 0.5).abs() < 1e-4);
        assert!((errs[1].unwrap() - 2.0).abs() < 1e-3);
    }

    #[test]
    fn non_finite_hessian_is_rejected() {
        let h = DMatrix::from_row_slice(1, 1, &[f64::NAN]);
        assert!(errors_from_hessian(&h).is_none());
    }
}

//! Leaf densities and polynomial bases used by the shape families.
//!
//! All functions here are *unnormalized*; normalization over a domain or a set
//! of bins is done by the callers.
//!
//! Numerical notes:
//! - Crystal-ball tails are evaluated in log space; `(n/α)^n` overflows quickly
//!   for the upper end of the `n` bounds.
//! - Exponentials are evaluated relative to a reference point so that
//!   `exp(a·x)` does not underflow for large `x`.

/// Gaussian kernel `exp(-((x - mean)/sigma)^2 / 2)`.
pub fn gaussian(x: f64, mean: f64, sigma: f64) -> f64 {
    let t = (x - mean) / sigma;
    (-0.5 * t * t).exp()
}

/// Exponential `exp(a · (x - x_ref))`.
pub fn exponential(x: f64, a: f64, x_ref: f64) -> f64 {
    (a * (x - x_ref)).exp()
}

/// Power law `x^a` (only defined for `x > 0`).
pub fn power(x: f64, a: f64) -> f64 {
    x.powf(a)
}

/// `exp(Σ_i c_i · u^(i+1))`, i.e. a polynomial without constant term in the exponent.
pub fn exp_poly(u: f64, coeffs: &[f64]) -> f64 {
    let mut poly = 0.0;
    let mut u_pow = 1.0;
    for &c in coeffs {
        u_pow *= u;
        poly += c * u_pow;
    }
    poly.exp()
}

/// Bernstein polynomial `Σ_i c_i · C(n, i) · u^i · (1-u)^(n-i)` with `n = coeffs.len() - 1`.
///
/// `u` is the observable mapped onto `[0, 1]`.
pub fn bernstein(u: f64, coeffs: &[f64]) -> f64 {
    if coeffs.is_empty() {
        return 0.0;
    }
    // De Casteljau: numerically stable and avoids binomial coefficients.
    let mut work = coeffs.to_vec();
    let n = work.len();
    for r in 1..n {
        for i in 0..(n - r) {
            work[i] = work[i] * (1.0 - u) + work[i + 1] * u;
        }
    }
    work[0]
}

/// Double-sided crystal ball with a shared core width.
///
/// Gaussian core within `[-α_L, α_R]` (in units of sigma), power-law tails outside.
pub fn double_crystal_ball(
    x: f64,
    mean: f64,
    sigma: f64,
    alpha_l: f64,
    n_l: f64,
    alpha_r: f64,
    n_r: f64,
) -> f64 {
    let t = (x - mean) / sigma;
    if t < -alpha_l {
        power_tail(-t, alpha_l, n_l)
    } else if t > alpha_r {
        power_tail(t, alpha_r, n_r)
    } else {
        (-0.5 * t * t).exp()
    }
}

/// Tail `A · (B + t)^(-n)` for `t > α`, continuous with the Gaussian core at `t = α`.
fn power_tail(t: f64, alpha: f64, n: f64) -> f64 {
    let b = n / alpha - alpha;
    let log_a = n * (n / alpha).ln() - 0.5 * alpha * alpha;
    (log_a - n * (b + t).ln()).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bernstein_partition_of_unity() {
        // With all coefficients equal to 1 the Bernstein basis sums to 1.
        for &u in &[0.0, 0.1, 0.5, 0.9, 1.0] {
            let v = bernstein(u, &[1.0, 1.0, 1.0, 1.0]);
            assert!((v - 1.0).abs() < 1e-12, "u={u}: {v}");
        }
    }

    #[test]
    fn bernstein_endpoints_match_coefficients() {
        let c = [2.0, 0.5, 3.0];
        assert!((bernstein(0.0, &c) - 2.0).abs() < 1e-12);
        assert!((bernstein(1.0, &c) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn crystal_ball_is_continuous_at_the_transitions() {
        let (mean, sigma, al, nl, ar, nr) = (125.0, 1.5, 1.2, 4.0, 1.8, 10.0);
        let eps = 1e-9;
        for x in [mean - al * sigma, mean + ar * sigma] {
            let below = double_crystal_ball(x - eps, mean, sigma, al, nl, ar, nr);
            let above = double_crystal_ball(x + eps, mean, sigma, al, nl, ar, nr);
            assert!((below - above).abs() < 1e-6, "jump at {x}: {below} vs {above}");
        }
    }

    #[test]
    fn crystal_ball_tail_is_heavier_than_gaussian() {
        let x = 125.0 - 5.0 * 1.5;
        let cb = double_crystal_ball(x, 125.0, 1.5, 1.0, 5.0, 1.0, 5.0);
        assert!(cb > gaussian(x, 125.0, 1.5));
    }

    #[test]
    fn exponential_is_relative_to_reference() {
        assert!((exponential(150.0, -0.1, 150.0) - 1.0).abs() < 1e-15);
        assert!(exponential(180.0, -0.5, 100.0) > 0.0);
        assert!((exp_poly(0.0, &[-1.0, -0.5]) - 1.0).abs() < 1e-15);
    }
}

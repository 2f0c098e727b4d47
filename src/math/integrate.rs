//! Simpson-rule integration helpers.
//!
//! Densities are normalized numerically: the shapes have no closed-form
//! integrals in general (Bernstein/exp-poly/crystal ball tails), and a single
//! quadrature scheme keeps toy generation and fitting consistent with each other.

/// Intervals used for whole-domain normalization integrals (must be even).
pub const DOMAIN_INTERVALS: usize = 512;

/// Composite Simpson integral of `f` over `[a, b]` with `intervals` (rounded up to even).
pub fn simpson<F: Fn(f64) -> f64>(f: F, a: f64, b: f64, intervals: usize) -> f64 {
    let mut n = intervals.max(2);
    if n % 2 == 1 {
        n += 1;
    }
    let h = (b - a) / n as f64;
    let mut acc = f(a) + f(b);
    for i in 1..n {
        let x = a + h * i as f64;
        acc += if i % 2 == 1 { 4.0 * f(x) } else { 2.0 * f(x) };
    }
    acc * h / 3.0
}

/// Per-bin Simpson integrals over consecutive `edges`.
///
/// Uses the three-point rule on each bin; shared edges are evaluated once.
pub fn bin_integrals<F: Fn(f64) -> f64>(f: F, edges: &[f64]) -> Vec<f64> {
    if edges.len() < 2 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(edges.len() - 1);
    let mut f_lo = f(edges[0]);
    for w in edges.windows(2) {
        let (lo, hi) = (w[0], w[1]);
        let f_mid = f(0.5 * (lo + hi));
        let f_hi = f(hi);
        out.push((hi - lo) * (f_lo + 4.0 * f_mid + f_hi) / 6.0);
        f_lo = f_hi;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simpson_is_exact_for_cubics() {
        let v = simpson(|x| x * x * x - 2.0 * x + 1.0, 0.0, 2.0, 4);
        // ∫0^2 (x^3 - 2x + 1) dx = 4 - 4 + 2 = 2
        assert!((v - 2.0).abs() < 1e-12);
    }

    #[test]
    fn bin_integrals_sum_to_total() {
        let edges: Vec<f64> = (0..=20).map(|i| i as f64 * 0.5).collect();
        let bins = bin_integrals(|x| (-0.3 * x).exp(), &edges);
        assert_eq!(bins.len(), 20);
        let total: f64 = bins.iter().sum();
        let exact = (1.0 - (-3.0f64).exp()) / 0.3;
        assert!((total - exact).abs() < 1e-6);
    }
}

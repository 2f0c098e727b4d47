//! Nelder–Mead simplex minimizer with box constraints.
//!
//! Bounds are handled by a sine transform (as MINUIT does for doubly-bounded
//! parameters): the simplex moves freely in an internal coordinate `θ` and the
//! objective always sees `lo + (hi - lo) · (sin θ + 1) / 2`, which can never
//! leave `[lo, hi]`.
//!
//! After the simplex collapses we restart it around the best point and keep the
//! result only if it improves; this recovers from premature collapse along
//! flat directions, which is common for mixture fractions.

/// Tuning knobs for [`minimize`].
#[derive(Debug, Clone)]
pub struct SimplexOptions {
    /// Maximum objective evaluations across all restarts.
    pub max_evals: usize,
    /// Convergence tolerance on the spread of simplex values.
    pub f_tol: f64,
    /// Initial simplex step in internal coordinates.
    pub initial_step: f64,
    /// Maximum number of simplex rebuilds around the best point.
    pub max_rebuilds: usize,
}

impl Default for SimplexOptions {
    fn default() -> Self {
        Self {
            max_evals: 20_000,
            f_tol: 1e-9,
            initial_step: 0.3,
            max_rebuilds: 6,
        }
    }
}

/// Outcome of a minimization (external coordinates).
#[derive(Debug, Clone)]
pub struct SimplexResult {
    pub x: Vec<f64>,
    pub f: f64,
    pub evals: usize,
    pub converged: bool,
}

/// Box bound for one coordinate.
#[derive(Debug, Clone, Copy)]
pub struct Bound {
    pub lo: f64,
    pub hi: f64,
}

impl Bound {
    pub fn to_internal(&self, x: f64) -> f64 {
        if self.hi <= self.lo {
            return 0.0;
        }
        let u = (2.0 * (x - self.lo) / (self.hi - self.lo) - 1.0).clamp(-1.0, 1.0);
        u.asin()
    }

    pub fn to_external(&self, theta: f64) -> f64 {
        if self.hi <= self.lo {
            return self.lo;
        }
        self.lo + (self.hi - self.lo) * (theta.sin() + 1.0) / 2.0
    }
}

/// Minimize `f` starting from `x0` subject to `bounds`.
///
/// Non-finite objective values are treated as `+∞`, so the simplex backs away
/// from regions where the model is undefined.
pub fn minimize<F>(mut f: F, x0: &[f64], bounds: &[Bound], opts: &SimplexOptions) -> SimplexResult
where
    F: FnMut(&[f64]) -> f64,
{
    let n = x0.len();
    let mut evals = 0usize;
    let mut ext = vec![0.0; n];

    let mut eval = |theta: &[f64], evals: &mut usize| -> f64 {
        for i in 0..n {
            ext[i] = bounds[i].to_external(theta[i]);
        }
        *evals += 1;
        let v = f(&ext);
        if v.is_finite() { v } else { f64::INFINITY }
    };

    let mut best_theta: Vec<f64> = x0
        .iter()
        .zip(bounds)
        .map(|(&x, b)| b.to_internal(x))
        .collect();
    let mut best_f = eval(&best_theta, &mut evals);

    if n == 0 {
        return SimplexResult {
            x: Vec::new(),
            f: best_f,
            evals,
            converged: true,
        };
    }

    let mut converged = false;
    for _ in 0..=opts.max_rebuilds {
        let (theta, fv, ok) = run_simplex(&mut eval, &best_theta, best_f, opts, &mut evals);
        let improvement = best_f - fv;
        if fv <= best_f {
            best_theta = theta;
            best_f = fv;
        }
        converged = ok;
        if !best_f.is_finite() || evals >= opts.max_evals {
            break;
        }
        if ok && improvement.abs() <= opts.f_tol * (1.0 + best_f.abs()) {
            break;
        }
    }

    SimplexResult {
        x: best_theta
            .iter()
            .zip(bounds)
            .map(|(&t, b)| b.to_external(t))
            .collect(),
        f: best_f,
        evals,
        converged,
    }
}

fn run_simplex<E>(
    eval: &mut E,
    start: &[f64],
    f_start: f64,
    opts: &SimplexOptions,
    evals: &mut usize,
) -> (Vec<f64>, f64, bool)
where
    E: FnMut(&[f64], &mut usize) -> f64,
{
    const ALPHA: f64 = 1.0;
    const GAMMA: f64 = 2.0;
    const RHO: f64 = 0.5;
    const SIGMA: f64 = 0.5;

    let n = start.len();
    let mut pts: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    let mut vals: Vec<f64> = Vec::with_capacity(n + 1);
    pts.push(start.to_vec());
    vals.push(f_start);
    for i in 0..n {
        let mut p = start.to_vec();
        p[i] += opts.initial_step;
        vals.push(eval(&p, evals));
        pts.push(p);
    }

    loop {
        // Order vertices by value (stable, so ties keep their insertion order).
        let mut idx: Vec<usize> = (0..=n).collect();
        idx.sort_by(|&a, &b| vals[a].partial_cmp(&vals[b]).unwrap_or(std::cmp::Ordering::Equal));
        pts = idx.iter().map(|&i| pts[i].clone()).collect();
        vals = idx.iter().map(|&i| vals[i]).collect();

        // Undefined everywhere the simplex can see.
        if !vals[0].is_finite() {
            return (pts[0].clone(), vals[0], false);
        }
        let spread = vals[n] - vals[0];
        if spread.is_finite() && spread <= opts.f_tol * (1.0 + vals[0].abs()) {
            return (pts[0].clone(), vals[0], true);
        }
        if *evals >= opts.max_evals {
            return (pts[0].clone(), vals[0], false);
        }

        let mut centroid = vec![0.0; n];
        for p in &pts[..n] {
            for (c, v) in centroid.iter_mut().zip(p) {
                *c += v / n as f64;
            }
        }
        let along = |t: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(&pts[n])
                .map(|(c, w)| c + t * (w - c))
                .collect()
        };

        let reflected = along(-ALPHA);
        let f_r = eval(&reflected, evals);
        if f_r < vals[0] {
            let expanded = along(-GAMMA);
            let f_e = eval(&expanded, evals);
            if f_e < f_r {
                pts[n] = expanded;
                vals[n] = f_e;
            } else {
                pts[n] = reflected;
                vals[n] = f_r;
            }
            continue;
        }
        if f_r < vals[n - 1] {
            pts[n] = reflected;
            vals[n] = f_r;
            continue;
        }

        let (contracted, f_c) = if f_r < vals[n] {
            let c = along(-RHO * ALPHA);
            let fc = eval(&c, evals);
            (c, fc)
        } else {
            let c = along(RHO);
            let fc = eval(&c, evals);
            (c, fc)
        };
        if f_c < vals[n].min(f_r) {
            pts[n] = contracted;
            vals[n] = f_c;
            continue;
        }

        // Shrink towards the best vertex.
        let best = pts[0].clone();
        for i in 1..=n {
            for (v, b) in pts[i].iter_mut().zip(&best) {
                *v = b + SIGMA * (*v - b);
            }
            vals[i] = eval(&pts[i], evals);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_minimum_of_shifted_quadratic() {
        let bounds = [Bound { lo: -10.0, hi: 10.0 }, Bound { lo: -10.0, hi: 10.0 }];
        let res = minimize(
            |x| (x[0] - 1.5).powi(2) + 3.0 * (x[1] + 2.0).powi(2),
            &[0.0, 0.0],
            &bounds,
            &SimplexOptions::default(),
        );
        assert!(res.converged);
        assert!((res.x[0] - 1.5).abs() < 1e-3, "{:?}", res.x);
        assert!((res.x[1] + 2.0).abs() < 1e-3, "{:?}", res.x);
    }

    #[test]
    fn respects_bounds() {
        let bounds = [Bound { lo: 0.0, hi: 1.0 }];
        let res = minimize(|x| (x[0] - 3.0).powi(2), &[0.5], &bounds, &SimplexOptions::default());
        assert!(res.x[0] <= 1.0 && res.x[0] >= 0.0);
        assert!((res.x[0] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn solves_rosenbrock() {
        let bounds = [Bound { lo: -5.0, hi: 5.0 }, Bound { lo: -5.0, hi: 5.0 }];
        let res = minimize(
            |x| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2),
            &[-1.2, 1.0],
            &bounds,
            &SimplexOptions::default(),
        );
        assert!(res.f < 1e-6, "f = {}", res.f);
    }

    #[test]
    fn undefined_objective_gives_up_immediately() {
        let bounds = [Bound { lo: -5.0, hi: 5.0 }, Bound { lo: 0.0, hi: 1.0 }];
        let opts = SimplexOptions::default();
        let res = minimize(|_| f64::NAN, &[0.0, 0.5], &bounds, &opts);
        assert!(!res.converged);
        assert_eq!(res.f, f64::INFINITY);
        assert!(res.evals <= 3, "{} evaluations", res.evals);
    }

    #[test]
    fn transform_round_trips_inside_bounds() {
        let b = Bound { lo: -5.0, hi: 0.0 };
        for &x in &[-5.0, -2.5, -0.01, 0.0] {
            assert!((b.to_external(b.to_internal(x)) - x).abs() < 1e-9);
        }
    }
}

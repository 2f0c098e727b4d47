//! Parametric model families.
//!
//! A [`ModelFamily`] is one shape at one order. All shapes share a single type:
//! what differs is the parameter layout (built from the shape's block defaults)
//! and how components are combined ([`ComponentKind`]).
//!
//! Parameter layout, for order `k`:
//!
//! - sum shapes: `k` parameter blocks followed by `k-1` mixing fractions `c1..`
//! - polynomial shapes: `k` coefficients
//! - plain shapes: one block (order is always 1)
//!
//! Names carry a 1-based index when the block is repeated (`mean1`, `sigma1`,
//! `mean2`, ...) and are bare at order 1 (`mean`, `sigma`).
//!
//! Mixture fractions are recursive: `w1 = c1`, `w2 = (1-c1)·c2`, ..., and the last
//! weight is the remainder. Every fraction in `[0, 1]` therefore yields weights
//! that are non-negative and sum to one.

use log::warn;
use rand::Rng;

use crate::domain::{Composition, ModelKey, Parameter, Shape};
use crate::error::AppError;
use crate::math::{
    bernstein, double_crystal_ball, exp_poly, exponential, gaussian, power, simpson,
    DOMAIN_INTERVALS,
};
use crate::models::overrides::BoundsOverrides;

/// ExpPoly is evaluated on `x · 0.01` so coefficients stay O(1) for x ~ 100.
const EXP_POLY_SCALE: f64 = 0.01;

/// Observable domain the densities are defined (and normalized) on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Domain {
    pub lo: f64,
    pub hi: f64,
}

impl Domain {
    pub fn new(lo: f64, hi: f64) -> Result<Self, AppError> {
        if !(lo.is_finite() && hi.is_finite() && hi > lo) {
            return Err(AppError::config(format!("Invalid observable domain [{lo}, {hi}].")));
        }
        Ok(Self { lo, hi })
    }
}

/// How components are combined into the final density.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    /// A single density evaluated directly from the parameters.
    Leaf,
    /// A recursive-fraction mixture of individually normalized components.
    Mixture { components: usize },
}

/// Block defaults `(name, default, lo, hi)` for each shape.
fn block_defaults(shape: Shape) -> &'static [(&'static str, f64, f64, f64)] {
    match shape {
        Shape::Gaussian => &[("mean", 125.0, 120.0, 130.0), ("sigma", 1.5, 1.0, 5.0)],
        Shape::Dcb => &[
            ("mean", 125.0, 120.0, 130.0),
            ("sigmaLR", 1.3, 1.0, 5.0),
            ("alphaL", 1.0, 0.1, 5.0),
            ("nL", 5.0, 0.1, 20.0),
            ("alphaR", 1.0, 0.1, 5.0),
            ("nR", 20.0, 0.1, 20.0),
        ],
        Shape::Exponential => &[("a", -0.05, -0.5, 0.0)],
        Shape::Power => &[("a", -1.0, -5.0, 0.0)],
        Shape::Bernstein => &[("a", 0.1, 0.0, 10.0)],
        Shape::ExpPoly => &[("a", -0.5, -1.0, 0.0)],
        Shape::Laurent => &[("a", 0.5, 0.0, 1.0)],
    }
}

/// Fixed power-law exponents of the Laurent components: `-4 + g(i)` with
/// `g(i) = Σ_{j<=i} (-1)^j · j`, i.e. -4, -5, -3, -6, -2, ...
pub fn laurent_exponent(i: usize) -> f64 {
    let g: i64 = (0..=i as i64).map(|j| if j % 2 == 0 { j } else { -j }).sum();
    -4.0 + g as f64
}

#[derive(Debug, Clone)]
pub struct ModelFamily {
    shape: Shape,
    order: usize,
    kind: ComponentKind,
    domain: Domain,
    params: Vec<Parameter>,
}

impl ModelFamily {
    /// Build `shape` at `order` with default bounds.
    pub fn new(shape: Shape, order: usize, domain: Domain) -> Result<Self, AppError> {
        if order == 0 || order > shape.max_order() {
            return Err(AppError::config(format!(
                "Order {order} is invalid for {shape}: must be within [1, {}].",
                shape.max_order()
            )));
        }

        let block = block_defaults(shape);
        let repeats = match shape.composition() {
            Composition::Plain => 1,
            Composition::Sum | Composition::Polynomial => order,
        };
        let mut params = Vec::with_capacity(block.len() * repeats + order);
        for i in 0..repeats {
            for &(name, default, lo, hi) in block {
                let name = if repeats == 1 {
                    name.to_string()
                } else {
                    format!("{name}{}", i + 1)
                };
                params.push(Parameter::free(name, default, lo, hi));
            }
        }

        let kind = match shape {
            Shape::Gaussian | Shape::Exponential | Shape::Power if order > 1 => {
                for i in 0..order - 1 {
                    params.push(Parameter::free(format!("c{}", i + 1), 1.0 / order as f64, 0.0, 1.0));
                }
                ComponentKind::Mixture { components: order }
            }
            Shape::Laurent => ComponentKind::Mixture { components: order + 1 },
            _ => ComponentKind::Leaf,
        };

        Ok(Self {
            shape,
            order,
            kind,
            domain,
            params,
        })
    }

    /// Build with bound overrides applied on top of the defaults.
    pub fn with_overrides(
        shape: Shape,
        order: usize,
        domain: Domain,
        overrides: &BoundsOverrides,
    ) -> Result<Self, AppError> {
        let mut model = Self::new(shape, order, domain)?;
        overrides.apply(&mut model.params)?;
        Ok(model)
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn key(&self, category: &str) -> ModelKey {
        ModelKey {
            shape: self.shape,
            order: self.order,
            category: category.to_string(),
        }
    }

    /// Short name used in logs, e.g. `Power3`.
    pub fn name(&self) -> String {
        format!("{}{}", self.shape, self.order)
    }

    /// Number of non-constant parameters.
    pub fn dof(&self) -> usize {
        self.params.iter().filter(|p| !p.constant).count()
    }

    pub fn free_values(&self) -> Vec<f64> {
        self.params
            .iter()
            .filter(|p| !p.constant)
            .map(|p| p.value)
            .collect()
    }

    pub fn free_bounds(&self) -> Vec<(f64, f64)> {
        self.params
            .iter()
            .filter(|p| !p.constant)
            .map(|p| (p.lo, p.hi))
            .collect()
    }

    /// Overwrite free parameter values (in `free_values` order).
    pub fn set_free_values(&mut self, values: &[f64]) {
        for (p, &v) in self.params.iter_mut().filter(|p| !p.constant).zip(values) {
            p.value = v;
        }
    }

    /// Attach uncertainties (in `free_values` order).
    pub fn set_free_errors(&mut self, errors: &[Option<f64>]) {
        for (p, &e) in self.params.iter_mut().filter(|p| !p.constant).zip(errors) {
            p.error = e;
        }
    }

    /// Replace the parameter list wholesale (e.g. from a persisted snapshot).
    pub fn set_params(&mut self, params: Vec<Parameter>) -> Result<(), AppError> {
        if params.len() != self.params.len() {
            return Err(AppError::data(format!(
                "{} expects {} parameters, got {}.",
                self.name(),
                self.params.len(),
                params.len()
            )));
        }
        self.params = params;
        Ok(())
    }

    /// Draw every free parameter uniformly within its bounds.
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for p in self.params.iter_mut().filter(|p| !p.constant) {
            if p.hi > p.lo {
                p.value = rng.gen_range(p.lo..=p.hi);
            }
        }
    }

    /// Warn about (and return) free parameters within 1% of a bound.
    pub fn check_bounds(&self) -> Vec<String> {
        let mut pinned = Vec::new();
        for p in self.params.iter().filter(|p| !p.constant && p.at_bound()) {
            warn!("Parameter {} from {} is at its bounds", p.name, self.name());
            warn!("{}={}, low={:.6}, high={:.6}", p.name, p.value, p.lo, p.hi);
            pinned.push(p.name.clone());
        }
        pinned
    }

    /// Prepared density for the current parameter values.
    ///
    /// Component normalizations are computed once here, so evaluate many points
    /// through the returned [`Density`] rather than rebuilding it per point.
    pub fn density(&self) -> Density<'_> {
        let values: Vec<f64> = self.params.iter().map(|p| p.value).collect();
        let mut density = Density {
            model: self,
            values,
            weights: Vec::new(),
            norms: Vec::new(),
        };
        if let ComponentKind::Mixture { components } = self.kind {
            density.weights = recursive_weights(density.fractions(), components);
            density.norms = (0..components)
                .map(|j| simpson(|x| density.component(j, x), self.domain.lo, self.domain.hi, DOMAIN_INTERVALS))
                .collect();
        }
        density
    }

    /// Density value at `x`, normalized to unit integral over the domain.
    pub fn normalized_density(&self, x: f64) -> Result<f64, AppError> {
        let density = self.density();
        let norm = simpson(|t| density.value(t), self.domain.lo, self.domain.hi, DOMAIN_INTERVALS);
        if !(norm.is_finite() && norm > 0.0) {
            return Err(AppError::numerical(format!(
                "{} has a non-positive normalization ({norm}).",
                self.name()
            )));
        }
        Ok(density.value(x) / norm)
    }
}

/// A model family frozen at its current parameters, ready for evaluation.
pub struct Density<'a> {
    model: &'a ModelFamily,
    values: Vec<f64>,
    weights: Vec<f64>,
    norms: Vec<f64>,
}

impl Density<'_> {
    /// Unnormalized density value at `x` (mixtures integrate to one over the domain).
    pub fn value(&self, x: f64) -> f64 {
        match self.model.kind {
            ComponentKind::Leaf => self.leaf(x),
            ComponentKind::Mixture { components } => (0..components)
                .map(|j| {
                    if self.weights[j] == 0.0 {
                        0.0
                    } else {
                        self.weights[j] * self.component(j, x) / self.norms[j]
                    }
                })
                .sum(),
        }
    }

    fn fractions(&self) -> &[f64] {
        match self.model.shape {
            // Laurent: every parameter is a fraction.
            Shape::Laurent => &self.values,
            _ => {
                let block = block_defaults(self.model.shape).len();
                &self.values[block * self.model.order..]
            }
        }
    }

    fn leaf(&self, x: f64) -> f64 {
        let v = &self.values;
        let domain = self.model.domain;
        match self.model.shape {
            Shape::Gaussian => gaussian(x, v[0], v[1]),
            Shape::Exponential => exponential(x, v[0], domain.lo),
            Shape::Power => power(x, v[0]),
            Shape::Dcb => double_crystal_ball(x, v[0], v[1], v[2], v[3], v[4], v[5]),
            Shape::Bernstein => {
                let u = (x - domain.lo) / (domain.hi - domain.lo);
                let mut coeffs = Vec::with_capacity(v.len() + 1);
                coeffs.push(1.0);
                coeffs.extend_from_slice(v);
                bernstein(u, &coeffs)
            }
            Shape::ExpPoly => exp_poly(x * EXP_POLY_SCALE, v),
            // Laurent is always a mixture; a leaf evaluation is its first component.
            Shape::Laurent => power(x, laurent_exponent(0)),
        }
    }

    /// Unnormalized mixture component `j`.
    fn component(&self, j: usize, x: f64) -> f64 {
        let v = &self.values;
        match self.model.shape {
            Shape::Gaussian => gaussian(x, v[2 * j], v[2 * j + 1]),
            Shape::Exponential => exponential(x, v[j], self.model.domain.lo),
            Shape::Power => power(x, v[j]),
            Shape::Laurent => power(x, laurent_exponent(j)),
            Shape::Dcb | Shape::Bernstein | Shape::ExpPoly => self.leaf(x),
        }
    }
}

/// Turn `components - 1` recursive fractions into `components` weights.
fn recursive_weights(fractions: &[f64], components: usize) -> Vec<f64> {
    let mut weights = Vec::with_capacity(components);
    let mut remainder = 1.0;
    for &c in fractions.iter().take(components.saturating_sub(1)) {
        let c = c.clamp(0.0, 1.0);
        weights.push(remainder * c);
        remainder *= 1.0 - c;
    }
    weights.push(remainder);
    weights
}

//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting and order scans
//! - exported to JSON (envelope files, single-fit outputs)
//! - loaded from TOML (scan configuration)

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Parametric shape families known to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Shape {
    Gaussian,
    #[serde(rename = "DCB")]
    Dcb,
    Exponential,
    Power,
    Bernstein,
    ExpPoly,
    Laurent,
}

/// How a shape grows with its order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composition {
    /// Order `k` is a mixture of `k` copies of a leaf density plus `k-1` fractions.
    Sum,
    /// Order `k` has exactly `k` basis coefficients.
    Polynomial,
    /// A single fixed leaf density (maximum order 1).
    Plain,
}

impl Shape {
    pub const ALL: [Shape; 7] = [
        Shape::Gaussian,
        Shape::Dcb,
        Shape::Exponential,
        Shape::Power,
        Shape::Bernstein,
        Shape::ExpPoly,
        Shape::Laurent,
    ];

    /// Families used for background envelopes when none are requested explicitly.
    pub const BACKGROUND: [Shape; 5] = [
        Shape::Power,
        Shape::Exponential,
        Shape::ExpPoly,
        Shape::Bernstein,
        Shape::Laurent,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            Shape::Gaussian => "Gaussian",
            Shape::Dcb => "DCB",
            Shape::Exponential => "Exponential",
            Shape::Power => "Power",
            Shape::Bernstein => "Bernstein",
            Shape::ExpPoly => "ExpPoly",
            Shape::Laurent => "Laurent",
        }
    }

    pub fn composition(self) -> Composition {
        match self {
            Shape::Gaussian | Shape::Exponential | Shape::Power => Composition::Sum,
            Shape::Bernstein | Shape::ExpPoly | Shape::Laurent => Composition::Polynomial,
            Shape::Dcb => Composition::Plain,
        }
    }

    /// Highest order the shape can be constructed at.
    pub fn max_order(self) -> usize {
        match self {
            Shape::Dcb => 1,
            _ => 5,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Shape {
    type Err = AppError;

    /// Case-insensitive; `-` and `_` are ignored so `exp-poly` parses as `ExpPoly`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        Shape::ALL
            .into_iter()
            .find(|shape| shape.display_name().to_lowercase() == key)
            .ok_or_else(|| {
                let known: Vec<&str> = Shape::ALL.iter().map(|s| s.display_name()).collect();
                AppError::config(format!("Unknown shape '{s}'. Known shapes: {}", known.join(", ")))
            })
    }
}

/// Fitting strategy for a single model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMethod {
    /// Multi-start fit with split-half stability check and restart escalation.
    Robust,
    /// One local minimization from the default parameter values.
    FromDefaults,
    /// One local minimization from a single random draw.
    Randomize,
}

impl FromStr for FitMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "robust" => Ok(FitMethod::Robust),
            "from_defaults" => Ok(FitMethod::FromDefaults),
            "randomize" => Ok(FitMethod::Randomize),
            _ => Err(AppError::config(format!(
                "Unknown fitting method '{s}' (expected robust, from_defaults or randomize)."
            ))),
        }
    }
}

/// Closed interval of the observable included in a fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitRange {
    pub lo: f64,
    pub hi: f64,
}

impl FitRange {
    pub fn new(lo: f64, hi: f64) -> Result<Self, AppError> {
        if !(lo.is_finite() && hi.is_finite() && hi > lo) {
            return Err(AppError::config(format!(
                "Invalid fit range [{lo}, {hi}] (must be finite with hi > lo)."
            )));
        }
        Ok(Self { lo, hi })
    }

    /// Strict containment, matching how bins are assigned to ranges by centre.
    pub fn contains_strict(&self, x: f64) -> bool {
        x > self.lo && x < self.hi
    }
}

impl FromStr for FitRange {
    type Err = AppError;

    /// Parse `lo,hi`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 2 {
            return Err(AppError::config(format!(
                "Fit range '{s}' must be two comma-separated numbers."
            )));
        }
        let parse = |v: &str| {
            v.parse::<f64>()
                .map_err(|e| AppError::config(format!("Invalid fit range bound '{v}': {e}")))
        };
        FitRange::new(parse(parts[0])?, parse(parts[1])?)
    }
}

impl fmt::Display for FitRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lo, self.hi)
    }
}

/// Structured identity of a fitted model: `(shape, order, category)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelKey {
    pub shape: Shape,
    pub order: usize,
    pub category: String,
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}_{}", self.shape, self.order, self.category)
    }
}

/// One model parameter (value, bounds, constant flag, fitted uncertainty).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
    pub lo: f64,
    pub hi: f64,
    pub constant: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<f64>,
}

impl Parameter {
    pub fn free(name: impl Into<String>, value: f64, lo: f64, hi: f64) -> Self {
        Self {
            name: name.into(),
            value,
            lo,
            hi,
            constant: false,
            error: None,
        }
    }

    /// True when the value sits within 1% (relative) of either bound.
    pub fn at_bound(&self) -> bool {
        is_close(self.value, self.lo, 0.01) || is_close(self.value, self.hi, 0.01)
    }
}

/// `|a - b| <= atol + rtol * |b|` with a tiny absolute tolerance.
fn is_close(a: f64, b: f64, rtol: f64) -> bool {
    (a - b).abs() <= 1e-8 + rtol * b.abs()
}

/// One evaluated model in a family scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitRecord {
    pub key: ModelKey,
    /// Number of free model parameters.
    pub dof: usize,
    /// Offset-by-bin twice negative log-likelihood.
    pub twice_nll: f64,
    /// Bins in range minus model dof.
    pub gof_dof: usize,
    pub gof_pvalue: f64,
    pub ftest_pvalue: f64,
    /// Random restarts the optimizer actually used.
    pub restarts: usize,
    pub parameters: Vec<Parameter>,
}

impl FitRecord {
    pub fn order(&self) -> usize {
        self.key.order
    }
}

/// Scan configuration (defaults follow the usual background-envelope settings).
///
/// Loadable from TOML; every field is optional in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    pub gof_threshold: f64,
    pub ftest_threshold: f64,
    pub n_restarts: usize,
    pub max_restarts: usize,
    /// Maximum allowed difference between the split-half minimum NLLs.
    pub nll_tolerance: f64,
    pub method: FitMethod,
    pub seed: Option<u64>,
    pub category: String,
    /// Parameter bound overrides: glob pattern -> `[default, lo, hi]` or `[value]`.
    pub bounds: BTreeMap<String, Vec<f64>>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            gof_threshold: 0.01,
            ftest_threshold: 0.05,
            n_restarts: 8,
            max_restarts: 1024,
            nll_tolerance: 0.01,
            method: FitMethod::Robust,
            seed: None,
            category: "cat0".to_string(),
            bounds: BTreeMap::new(),
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        for (name, v) in [
            ("gof_threshold", self.gof_threshold),
            ("ftest_threshold", self.ftest_threshold),
        ] {
            if !(v.is_finite() && (0.0..=1.0).contains(&v)) {
                return Err(AppError::config(format!("{name} must be within [0, 1], got {v}.")));
            }
        }
        if self.n_restarts < 2 {
            return Err(AppError::config("n_restarts must be >= 2 for the split-half check."));
        }
        if self.max_restarts < self.n_restarts {
            return Err(AppError::config(format!(
                "max_restarts ({}) must be >= n_restarts ({}).",
                self.max_restarts, self.n_restarts
            )));
        }
        if !(self.nll_tolerance.is_finite() && self.nll_tolerance > 0.0) {
            return Err(AppError::config("nll_tolerance must be finite and > 0."));
        }
        Ok(())
    }
}

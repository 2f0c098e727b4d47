//! Binned datasets.
//!
//! A dataset is a one-dimensional histogram with explicit bin edges. Edges do not
//! have to be uniform; everything that needs bin positions (fit-range selection,
//! goodness-of-fit dof) scans the declared edges.

use serde::{Deserialize, Serialize};

use crate::domain::FitRange;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinnedDataset {
    /// `n + 1` strictly increasing bin edges.
    pub edges: Vec<f64>,
    /// `n` bin contents (event counts or sums of weights).
    pub counts: Vec<f64>,
}

impl BinnedDataset {
    pub fn new(edges: Vec<f64>, counts: Vec<f64>) -> Result<Self, AppError> {
        let data = Self { edges, counts };
        data.validate()?;
        Ok(data)
    }

    /// Uniform binning of `[lo, hi]` into `nbins` empty bins.
    pub fn uniform(lo: f64, hi: f64, nbins: usize) -> Result<Self, AppError> {
        if nbins == 0 {
            return Err(AppError::data("Number of bins must be > 0."));
        }
        if !(lo.is_finite() && hi.is_finite() && hi > lo) {
            return Err(AppError::data(format!("Invalid histogram domain [{lo}, {hi}].")));
        }
        let width = (hi - lo) / nbins as f64;
        let mut edges: Vec<f64> = (0..nbins).map(|i| lo + width * i as f64).collect();
        edges.push(hi);
        Self::new(edges, vec![0.0; nbins])
    }

    /// Histogram unbinned events; events outside `[lo, hi)` are dropped.
    pub fn from_events(events: &[f64], lo: f64, hi: f64, nbins: usize) -> Result<Self, AppError> {
        let mut data = Self::uniform(lo, hi, nbins)?;
        let width = (hi - lo) / nbins as f64;
        for &x in events {
            if !(x.is_finite() && x >= lo && x < hi) {
                continue;
            }
            let idx = (((x - lo) / width) as usize).min(nbins - 1);
            data.counts[idx] += 1.0;
        }
        Ok(data)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.counts.is_empty() {
            return Err(AppError::data("Dataset has no bins."));
        }
        if self.edges.len() != self.counts.len() + 1 {
            return Err(AppError::data(format!(
                "Dataset has {} edges for {} bins (expected bins + 1).",
                self.edges.len(),
                self.counts.len()
            )));
        }
        if self.edges.iter().any(|e| !e.is_finite()) {
            return Err(AppError::data("Dataset bin edges must be finite."));
        }
        if self.edges.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AppError::data("Dataset bin edges must be strictly increasing."));
        }
        if self.counts.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(AppError::data("Dataset bin contents must be finite and >= 0."));
        }
        Ok(())
    }

    pub fn nbins(&self) -> usize {
        self.counts.len()
    }

    pub fn lo(&self) -> f64 {
        self.edges[0]
    }

    pub fn hi(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    pub fn bin_center(&self, i: usize) -> f64 {
        0.5 * (self.edges[i] + self.edges[i + 1])
    }

    pub fn bin_width(&self, i: usize) -> f64 {
        self.edges[i + 1] - self.edges[i]
    }

    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// The full domain as a single fit range.
    pub fn full_range(&self) -> FitRange {
        FitRange {
            lo: self.lo(),
            hi: self.hi(),
        }
    }

    /// Empty `ranges` means "fit the full domain".
    pub fn resolve_ranges(&self, ranges: &[FitRange]) -> Vec<FitRange> {
        if ranges.is_empty() {
            vec![self.full_range()]
        } else {
            ranges.to_vec()
        }
    }

    /// Whether bin `i` takes part in a fit over `ranges`.
    ///
    /// A bin is included when its centre lies strictly inside at least one range.
    /// Empty `ranges` selects every bin.
    pub fn bin_in_ranges(&self, i: usize, ranges: &[FitRange]) -> bool {
        if ranges.is_empty() {
            return true;
        }
        let c = self.bin_center(i);
        ranges.iter().any(|r| r.contains_strict(c))
    }

    /// Indices of the bins included in a fit over `ranges`.
    pub fn bins_in_ranges(&self, ranges: &[FitRange]) -> Vec<usize> {
        (0..self.nbins())
            .filter(|&i| self.bin_in_ranges(i, ranges))
            .collect()
    }

    pub fn sum_in_ranges(&self, ranges: &[FitRange]) -> f64 {
        self.bins_in_ranges(ranges)
            .into_iter()
            .map(|i| self.counts[i])
            .sum()
    }

    /// Merge groups of `factor` adjacent bins.
    pub fn rebin(&self, factor: usize) -> Result<Self, AppError> {
        if factor == 0 || self.nbins() % factor != 0 {
            return Err(AppError::config(format!(
                "Rebin factor {factor} must be an exact divisor of the bin count ({}).",
                self.nbins()
            )));
        }
        let edges: Vec<f64> = self.edges.iter().step_by(factor).copied().collect();
        let counts: Vec<f64> = self
            .counts
            .chunks(factor)
            .map(|chunk| chunk.iter().sum())
            .collect();
        Self::new(edges, counts)
    }
}

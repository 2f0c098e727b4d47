//! Read/write envelope JSON files.
//!
//! The envelope file is the portable result of a scan:
//! - run metadata (creation time, category, fit ranges, seed)
//! - the envelope index mapping with every candidate's parameters and uncertainties
//! - the full record sequence of every scanned family
//! - a density grid per candidate for quick plotting

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::pipeline::EnvelopeRun;
use crate::domain::{FitRange, FitRecord};
use crate::error::AppError;
use crate::fit::envelope::Envelope;
use crate::fit::selection::FamilyScan;

const GRID_POINTS: usize = 101;

/// One indexed envelope candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeEntry {
    pub index: usize,
    #[serde(flatten)]
    pub record: FitRecord,
}

/// Candidate densities sampled on a uniform grid over the domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DensityGrid {
    pub x: Vec<f64>,
    /// One row per envelope index.
    pub density: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeFile {
    pub tool: String,
    pub created: DateTime<Utc>,
    pub category: String,
    pub domain: [f64; 2],
    pub ranges: Vec<FitRange>,
    pub seed: u64,
    pub active_index: usize,
    pub entries: Vec<EnvelopeEntry>,
    pub families: Vec<FamilyScan>,
    pub grid: DensityGrid,
}

impl EnvelopeFile {
    pub fn from_run(run: &EnvelopeRun, category: &str) -> Result<Self, AppError> {
        let envelope = &run.envelope;
        let domain = envelope.domain();
        Ok(Self {
            tool: "envfit".to_string(),
            created: Utc::now(),
            category: category.to_string(),
            domain: [domain.lo, domain.hi],
            ranges: run.ranges.clone(),
            seed: run.seed,
            active_index: envelope.active_index(),
            entries: envelope
                .entries()
                .iter()
                .enumerate()
                .map(|(index, record)| EnvelopeEntry {
                    index,
                    record: record.clone(),
                })
                .collect(),
            families: run.families.clone(),
            grid: build_grid(envelope, GRID_POINTS)?,
        })
    }

    /// Rebuild the envelope (entries in index order, same active index).
    pub fn to_envelope(&self) -> Result<Envelope, AppError> {
        let mut entries = self.entries.clone();
        entries.sort_by_key(|e| e.index);
        if entries.iter().enumerate().any(|(i, e)| e.index != i) {
            return Err(AppError::data("Envelope indices must be 0..n without gaps."));
        }
        let domain = crate::models::Domain::new(self.domain[0], self.domain[1])?;
        let mut envelope =
            Envelope::from_entries(entries.into_iter().map(|e| e.record).collect(), domain)?;
        envelope.set_active_index(self.active_index)?;
        Ok(envelope)
    }
}

pub fn write_envelope_json(path: &Path, file: &EnvelopeFile) -> Result<(), AppError> {
    let out = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create envelope JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(out, file)
        .map_err(|e| AppError::io(format!("Failed to write envelope JSON: {e}")))?;
    Ok(())
}

pub fn read_envelope_json(path: &Path) -> Result<EnvelopeFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open envelope JSON '{}': {e}", path.display())))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::data(format!("Invalid envelope JSON: {e}")))
}

fn build_grid(envelope: &Envelope, n: usize) -> Result<DensityGrid, AppError> {
    let n = n.max(2);
    let domain = envelope.domain();
    let x: Vec<f64> = (0..n)
        .map(|i| domain.lo + (domain.hi - domain.lo) * i as f64 / (n as f64 - 1.0))
        .collect();
    let mut density = Vec::with_capacity(envelope.len());
    for index in 0..envelope.len() {
        let model = envelope.model(index)?;
        let prepared = model.density();
        let norm = crate::math::simpson(
            |t| prepared.value(t),
            domain.lo,
            domain.hi,
            crate::math::DOMAIN_INTERVALS,
        );
        if !(norm.is_finite() && norm > 0.0) {
            return Err(AppError::numerical(format!(
                "{} has a non-positive normalization ({norm}).",
                model.name()
            )));
        }
        density.push(x.iter().map(|&t| prepared.value(t) / norm).collect());
    }
    Ok(DensityGrid { x, density })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModelKey, Shape};
    use crate::fit::selection::StopReason;
    use crate::models::{Domain, ModelFamily};

    fn run() -> EnvelopeRun {
        let domain = Domain::new(100.0, 180.0).unwrap();
        let record = |shape, gof| {
            let model = ModelFamily::new(shape, 1, domain).unwrap();
            FitRecord {
                key: ModelKey {
                    shape,
                    order: 1,
                    category: "cat0".into(),
                },
                dof: model.dof(),
                twice_nll: 75.0,
                gof_dof: 79,
                gof_pvalue: gof,
                ftest_pvalue: 0.0,
                restarts: 8,
                parameters: model.params().to_vec(),
            }
        };
        let families = vec![
            FamilyScan {
                shape: Shape::Power,
                records: vec![record(Shape::Power, 0.3)],
                stop: StopReason::Converged,
            },
            FamilyScan {
                shape: Shape::Exponential,
                records: vec![record(Shape::Exponential, 0.6)],
                stop: StopReason::ReachedMaxDof,
            },
        ];
        let envelope = Envelope::build(&families, domain, 0.01, 0.05).unwrap();
        EnvelopeRun {
            families,
            envelope,
            ranges: vec![FitRange::new(100.0, 180.0).unwrap()],
            seed: 11,
        }
    }

    #[test]
    fn envelope_file_keeps_index_mapping() {
        let path = std::env::temp_dir().join(format!("envfit-envelope-{}.json", std::process::id()));
        let file = EnvelopeFile::from_run(&run(), "cat0").unwrap();
        assert_eq!(file.active_index, 1);
        assert_eq!(file.grid.density.len(), 2);
        assert_eq!(file.grid.x.len(), GRID_POINTS);

        write_envelope_json(&path, &file).unwrap();
        let back = read_envelope_json(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(back.entries[1].record.key.shape, Shape::Exponential);
        let envelope = back.to_envelope().unwrap();
        assert_eq!(envelope.active_index(), 1);
        assert_eq!(envelope.active().key.shape, Shape::Exponential);
        assert_eq!(back.families.len(), 2);
    }

    #[test]
    fn gaps_in_indices_are_rejected() {
        let mut file = EnvelopeFile::from_run(&run(), "cat0").unwrap();
        file.entries[1].index = 5;
        assert!(matches!(file.to_envelope(), Err(AppError::Data(_))));
    }

    #[test]
    fn invalid_files_never_yield_an_envelope() {
        let mut file = EnvelopeFile::from_run(&run(), "cat0").unwrap();
        file.active_index = 2;
        assert!(matches!(file.to_envelope(), Err(AppError::Config(_))));

        file.active_index = 0;
        file.entries.clear();
        assert!(matches!(file.to_envelope(), Err(AppError::Data(_))));
    }
}

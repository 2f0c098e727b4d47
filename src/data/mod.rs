//! Input datasets.
//!
//! - binned datasets with explicit edges (`histogram`)
//! - Asimov / Poisson toys generated from a model (`toys`)

pub mod histogram;
pub mod toys;

pub use histogram::*;

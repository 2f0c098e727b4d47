//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the shape registry key (`Shape`) and fit strategies (`FitMethod`)
//! - fit ranges, model keys and parameters
//! - fit outputs (`FitRecord`) and the scan configuration (`ScanConfig`)

pub mod types;

pub use types::*;

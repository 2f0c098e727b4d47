//! Input/output helpers.
//!
//! - binned dataset JSON read/write (`dataset`)
//! - envelope JSON read/write (`envelope`)
//! - single-fit JSON export (`export`)

pub mod dataset;
pub mod envelope;
pub mod export;

pub use dataset::*;
pub use envelope::*;
pub use export::*;

//! Parametric shape families.
//!
//! A single `ModelFamily` type covers every shape; the shape registry lives in
//! `domain::Shape` and the per-shape layouts/densities are dispatched here.

pub mod model;
pub mod overrides;

pub use model::*;
pub use overrides::*;

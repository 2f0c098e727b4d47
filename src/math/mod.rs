//! Mathematical utilities: leaf densities, quadrature, a bounded simplex
//! minimizer and Hessian-based uncertainties.

pub mod basis;
pub mod covariance;
pub mod integrate;
pub mod simplex;

pub use basis::*;
pub use covariance::*;
pub use integrate::*;
pub use simplex::*;

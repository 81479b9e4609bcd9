//! Domain model of the inverse problem.
//!
//! This module defines:
//!
//! - the unknown-parameter types keyed to matrix column order (`types`)
//! - per-parameter weighting rules (`weighting`)

pub mod types;
pub mod weighting;

pub use types::*;
pub use weighting::*;

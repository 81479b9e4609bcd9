//! Input/output helpers.
//!
//! - unknown-parameter file read/write (`parameter`)
//! - answer files, singular values, run-summary JSON (`answers`)

pub mod answers;
pub mod parameter;

pub use answers::*;

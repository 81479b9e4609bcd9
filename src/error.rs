//! Crate-wide error type.
//!
//! Failures fall into a small set of categories callers are expected to
//! branch on:
//!
//! - `InvalidArgument`: rejected before any numeric work starts (bad
//!   truncation level, unknown method mnemonic, inconsistent dimensions)
//! - `Unsupported`: the requested strategy or operation is not implemented;
//!   the message names what is missing
//! - `Numerical`: the algorithm itself degenerated (singular matrix,
//!   stagnated iteration, non-finite intermediates)
//! - `ParameterFormat` / `Io`: file problems, always carrying the offending
//!   path
//!
//! Soft conditions (duplicate parameters, out-of-table entries) are logged to
//! stderr and never surface through this type.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InverseError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("numerical failure: {0}")]
    Numerical(String),

    #[error("{}:{line}: {message}", .path.display())]
    ParameterFormat {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl InverseError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        InverseError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, InverseError>;

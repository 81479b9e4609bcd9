//! Result output helpers.
//!
//! Answer files are the portable representation of a solve: one file per
//! truncation level, one value per line, in parameter order. Alongside them a
//! small JSON summary records what produced the answers so downstream
//! plotting/velocity tooling does not have to re-derive it.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{InverseError, Result};

/// Write one value per line.
pub fn write_values<'a, I>(path: &Path, values: I) -> Result<()>
where
    I: IntoIterator<Item = &'a f64>,
{
    let mut file = File::create(path).map_err(|e| InverseError::io(path, e))?;
    for value in values {
        writeln!(file, "{value}").map_err(|e| InverseError::io(path, e))?;
    }
    Ok(())
}

/// Singular values of the decomposed system, largest first, one per line.
pub fn write_singular_values(path: &Path, singular_values: &[f64]) -> Result<()> {
    write_values(path, singular_values)
}

/// Machine-readable record of one solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Method mnemonic, lowercase (`"cg"`, `"svd"`, ...).
    pub method: String,
    /// Number of unknowns.
    pub parameter_count: usize,
    /// Number of truncation levels written.
    pub levels: usize,
    /// Singular values, for SVD runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub singular_values: Option<Vec<f64>>,
}

/// Write a run summary as pretty JSON.
pub fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    let file = File::create(path).map_err(|e| InverseError::io(path, e))?;
    serde_json::to_writer_pretty(file, summary)
        .map_err(|e| InverseError::io(path, std::io::Error::other(e)))?;
    Ok(())
}

/// Read a run summary back.
pub fn read_summary(path: &Path) -> Result<RunSummary> {
    let file = File::open(path).map_err(|e| InverseError::io(path, e))?;
    let summary = serde_json::from_reader(file)
        .map_err(|e| InverseError::io(path, std::io::Error::other(e)))?;
    Ok(summary)
}

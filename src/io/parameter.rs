//! Read/write unknown-parameter files.
//!
//! Text format, one line per unknown:
//!
//! ```text
//! # kind [lat lon] radius weighting
//! PAR2 3505.0 50.0
//! MU   5.0 10.0 3505.0 123250.0
//! ```
//!
//! Blank lines and `#` comments are skipped. Radial kinds take two trailing
//! numbers, voxel kinds four. The order of lines is preserved exactly in the
//! returned list — it defines the column order of the whole system.
//!
//! Duplicate records (structural equality) are a caution, not an error:
//! upstream grid-generation tools emit them routinely, and silently merging
//! would shift every later column.

use std::fs;
use std::io::Write;
use std::path::Path;

use rayon::prelude::*;

use crate::domain::types::{Location, ParameterKind, UnknownParameter};
use crate::error::{InverseError, Result};

/// Read a parameter file, preserving record order.
pub fn read(path: &Path) -> Result<Vec<UnknownParameter>> {
    let text = fs::read_to_string(path).map_err(|e| InverseError::io(path, e))?;

    let mut parameters = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        parameters.push(parse_line(path, index + 1, line)?);
    }

    warn_duplicates(path, &parameters);
    Ok(parameters)
}

/// Write a parameter file, one record per line in list order.
pub fn write(path: &Path, parameters: &[UnknownParameter]) -> Result<()> {
    let mut file = fs::File::create(path).map_err(|e| InverseError::io(path, e))?;
    for parameter in parameters {
        writeln!(file, "{parameter}").map_err(|e| InverseError::io(path, e))?;
    }
    Ok(())
}

fn parse_line(path: &Path, line_number: usize, line: &str) -> Result<UnknownParameter> {
    let format_err = |message: String| InverseError::ParameterFormat {
        path: path.to_path_buf(),
        line: line_number,
        message,
    };

    let fields: Vec<&str> = line.split_whitespace().collect();
    let kind = ParameterKind::from_name(fields[0])
        .map_err(|e| format_err(e.to_string()))?;

    let expected = if kind.is_radial() { 3 } else { 5 };
    if fields.len() != expected {
        return Err(format_err(format!(
            "{kind} record needs {} fields, got {}",
            expected,
            fields.len()
        )));
    }

    let mut numbers = Vec::with_capacity(expected - 1);
    for field in &fields[1..] {
        numbers.push(
            field
                .parse::<f64>()
                .map_err(|_| format_err(format!("not a number: '{field}'")))?,
        );
    }

    if kind.is_radial() {
        UnknownParameter::radial(kind, numbers[0], numbers[1])
    } else {
        UnknownParameter::voxel(
            kind,
            Location::new(numbers[0], numbers[1], numbers[2]),
            numbers[3],
        )
    }
}

// O(n²) pairwise scan; parameter files reach a few thousand entries, so the
// scan is parallelized over the first index.
fn warn_duplicates(path: &Path, parameters: &[UnknownParameter]) {
    if parameters.len() < 2 {
        return;
    }
    (0..parameters.len() - 1).into_par_iter().for_each(|i| {
        for j in i + 1..parameters.len() {
            if parameters[i] == parameters[j] {
                eprintln!(
                    "caution: duplicate parameter in {} (records {} and {}): {}",
                    path.display(),
                    i + 1,
                    j + 1,
                    parameters[i]
                );
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("tomoinv-{}-{name}", std::process::id()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn reads_mixed_records_in_order() {
        let path = scratch_file(
            "mixed.inf",
            "# comment\n\nPAR2 3505.0 50.0\nMU 5.0 10.0 3505.0 123250.0\nPAR2 3555.0 50.0\n",
        );
        let parameters = read(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(parameters.len(), 3);
        assert_eq!(parameters[0].kind(), ParameterKind::Par2);
        assert_eq!(parameters[0].radius(), 3505.0);
        assert_eq!(parameters[1].kind(), ParameterKind::Mu);
        assert_eq!(
            parameters[1].location().unwrap(),
            Location::new(5.0, 10.0, 3505.0)
        );
        assert_eq!(parameters[2].radius(), 3555.0);
    }

    #[test]
    fn duplicates_warn_but_are_preserved_in_order() {
        let path = scratch_file("dup.inf", "PAR2 3505.0 50.0\nPAR2 3505.0 50.0\n");
        let parameters = read(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(parameters.len(), 2);
        assert_eq!(parameters[0], parameters[1]);
    }

    #[test]
    fn malformed_line_reports_path_and_line() {
        let path = scratch_file("bad.inf", "PAR2 3505.0 50.0\nPAR2 oops 50.0\n");
        let err = read(&path).unwrap_err();
        fs::remove_file(&path).unwrap();

        match err {
            InverseError::ParameterFormat { line, .. } => assert_eq!(line, 2),
            other => panic!("expected ParameterFormat, got {other:?}"),
        }
    }

    #[test]
    fn wrong_field_count_is_rejected() {
        let path = scratch_file("short.inf", "MU 5.0 10.0 3505.0\n");
        assert!(read(&path).is_err());
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn write_then_read_round_trips() {
        let parameters = vec![
            UnknownParameter::radial(ParameterKind::Par2, 3505.0, 50.0).unwrap(),
            UnknownParameter::voxel(
                ParameterKind::Mu,
                Location::new(5.0, 10.0, 3505.0),
                123250.0,
            )
            .unwrap(),
        ];
        let path = std::env::temp_dir().join(format!("tomoinv-{}-rt.inf", std::process::id()));
        write(&path, &parameters).unwrap();
        let reread = read(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(parameters, reread);
    }

    #[test]
    fn missing_file_carries_path() {
        let path = PathBuf::from("/nonexistent/tomoinv/unknowns.inf");
        match read(&path).unwrap_err() {
            InverseError::Io { path: p, .. } => assert_eq!(p, path),
            other => panic!("expected Io, got {other:?}"),
        }
    }
}

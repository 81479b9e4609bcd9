//! Second-order difference operator over the unknown ordering.
//!
//! `D` maps a model vector to its discrete second differences along radius,
//! one independent band per physical-quantity kind; `D^T D` is the roughness
//! penalty added by constrained solves. Interior rows carry the standard
//! `[1, -2, 1]` stencil, the two ends of each block carry one-sided stencils,
//! and a single-parameter block contributes a zero row.
//!
//! The operator is exposed three ways: the dense matrix, the assembled
//! `D^T D`, and per-row index/value pairs for a cheap sparse multiply. All
//! three are generated from the same row data.

use nalgebra::{DMatrix, DVector};

use crate::domain::types::{ParameterKind, UnknownParameter};
use crate::error::{InverseError, Result};

#[derive(Debug, Clone)]
pub struct SecondDifferenceOperator {
    matrix: DMatrix<f64>,
    row_indices: Vec<Vec<usize>>,
    row_values: Vec<Vec<f64>>,
}

impl SecondDifferenceOperator {
    /// Build the operator for `parameters`, banding by `kinds` in order, with
    /// one roughness coefficient per kind.
    ///
    /// The parameter list must be grouped: all parameters of `kinds[0]`
    /// first, then all of `kinds[1]`, and so on — the same ordering contract
    /// the rest of the system lives by.
    pub fn new(
        parameters: &[UnknownParameter],
        kinds: &[ParameterKind],
        coefficients: &[f64],
    ) -> Result<Self> {
        if kinds.len() != coefficients.len() {
            return Err(InverseError::InvalidArgument(format!(
                "{} kinds but {} coefficients",
                kinds.len(),
                coefficients.len()
            )));
        }

        let n = parameters.len();
        let mut row_indices: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut row_values: Vec<Vec<f64>> = vec![Vec::new(); n];

        let mut offset = 0;
        for (&kind, &coefficient) in kinds.iter().zip(coefficients) {
            let m = parameters[offset..]
                .iter()
                .take_while(|p| p.kind() == kind)
                .count();
            if m == 0 {
                return Err(InverseError::InvalidArgument(format!(
                    "no contiguous block of kind {kind} at column {offset}"
                )));
            }

            if m > 1 {
                // one-sided stencil at the top of the block
                row_indices[offset] = vec![offset, offset + 1];
                row_values[offset] = vec![-2.0 * coefficient, coefficient];

                for i in 1..m - 1 {
                    row_indices[offset + i] = vec![offset + i - 1, offset + i, offset + i + 1];
                    row_values[offset + i] =
                        vec![coefficient, -2.0 * coefficient, coefficient];
                }

                // mirrored one-sided stencil at the bottom
                row_indices[offset + m - 1] = vec![offset + m - 2, offset + m - 1];
                row_values[offset + m - 1] = vec![coefficient, -2.0 * coefficient];
            }
            // m == 1: nothing to difference, the row stays zero

            offset += m;
        }

        if offset != n {
            return Err(InverseError::InvalidArgument(format!(
                "parameter at column {offset} (kind {}) is outside the contiguous blocks of \
                 the kind list",
                parameters[offset].kind()
            )));
        }

        let mut matrix = DMatrix::<f64>::zeros(n, n);
        for (i, (indices, values)) in row_indices.iter().zip(&row_values).enumerate() {
            for (&j, &v) in indices.iter().zip(values) {
                matrix[(i, j)] = v;
            }
        }

        Ok(Self {
            matrix,
            row_indices,
            row_values,
        })
    }

    /// The dense operator `D`.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// The roughness penalty `D^T D`.
    pub fn dtd(&self) -> DMatrix<f64> {
        self.matrix.transpose() * &self.matrix
    }

    /// Sparse multiply `D · v`.
    pub fn apply(&self, v: &DVector<f64>) -> Result<DVector<f64>> {
        if v.len() != self.matrix.nrows() {
            return Err(InverseError::InvalidArgument(format!(
                "vector length {} does not match operator size {}",
                v.len(),
                self.matrix.nrows()
            )));
        }
        let mut out = DVector::zeros(v.len());
        for (i, (indices, values)) in self.row_indices.iter().zip(&self.row_values).enumerate() {
            let mut sum = 0.0;
            for (&j, &value) in indices.iter().zip(values) {
                sum += value * v[j];
            }
            out[i] = sum;
        }
        Ok(out)
    }

    /// Non-zero entries of row `i` as `(column, value)` pairs.
    pub fn row_entries(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.row_indices[i]
            .iter()
            .copied()
            .zip(self.row_values[i].iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn radial_block(kind: ParameterKind, count: usize) -> Vec<UnknownParameter> {
        (0..count)
            .map(|i| UnknownParameter::radial(kind, 3505.0 + 50.0 * i as f64, 50.0).unwrap())
            .collect()
    }

    #[test]
    fn interior_rows_use_standard_stencil() {
        let parameters = radial_block(ParameterKind::Par2, 5);
        let op =
            SecondDifferenceOperator::new(&parameters, &[ParameterKind::Par2], &[1.0]).unwrap();
        let d = op.matrix();
        for i in 1..4 {
            assert_eq!(d[(i, i - 1)], 1.0);
            assert_eq!(d[(i, i)], -2.0);
            assert_eq!(d[(i, i + 1)], 1.0);
        }
        // one-sided ends
        assert_eq!(d[(0, 0)], -2.0);
        assert_eq!(d[(0, 1)], 1.0);
        assert_eq!(d[(4, 3)], 1.0);
        assert_eq!(d[(4, 4)], -2.0);
    }

    #[test]
    fn blocks_are_independent_and_scaled() {
        let mut parameters = radial_block(ParameterKind::Par2, 3);
        parameters.extend(radial_block(ParameterKind::ParQ, 3));
        let op = SecondDifferenceOperator::new(
            &parameters,
            &[ParameterKind::Par2, ParameterKind::ParQ],
            &[1.0, 3.0],
        )
        .unwrap();
        let d = op.matrix();
        // no coupling across the block boundary
        for i in 0..3 {
            for j in 3..6 {
                assert_eq!(d[(i, j)], 0.0);
                assert_eq!(d[(j, i)], 0.0);
            }
        }
        // second block carries its own coefficient
        assert_eq!(d[(4, 3)], 3.0);
        assert_eq!(d[(4, 4)], -6.0);
        assert_eq!(d[(4, 5)], 3.0);
    }

    #[test]
    fn single_parameter_block_is_a_zero_row() {
        let mut parameters = radial_block(ParameterKind::Par2, 1);
        parameters.extend(radial_block(ParameterKind::ParQ, 3));
        let op = SecondDifferenceOperator::new(
            &parameters,
            &[ParameterKind::Par2, ParameterKind::ParQ],
            &[1.0, 1.0],
        )
        .unwrap();
        let d = op.matrix();
        for j in 0..4 {
            assert_eq!(d[(0, j)], 0.0);
        }
        // the next block still lands at the right offset
        assert_eq!(d[(2, 1)], 1.0);
        assert_eq!(d[(2, 2)], -2.0);
        assert_eq!(d[(2, 3)], 1.0);
    }

    #[test]
    fn sparse_multiply_matches_dense() {
        let mut parameters = radial_block(ParameterKind::Par2, 4);
        parameters.extend(radial_block(ParameterKind::ParQ, 2));
        let op = SecondDifferenceOperator::new(
            &parameters,
            &[ParameterKind::Par2, ParameterKind::ParQ],
            &[1.0, 2.0],
        )
        .unwrap();
        let v = DVector::from_vec(vec![1.0, -2.0, 0.5, 3.0, 4.0, -1.0]);
        let sparse = op.apply(&v).unwrap();
        let dense = op.matrix() * &v;
        assert!((sparse - dense).norm() < 1e-14);
    }

    #[test]
    fn dtd_is_symmetric_psd() {
        let parameters = radial_block(ParameterKind::Par2, 6);
        let op =
            SecondDifferenceOperator::new(&parameters, &[ParameterKind::Par2], &[1.0]).unwrap();
        let dtd = op.dtd();
        assert!((dtd.clone() - dtd.transpose()).norm() < 1e-14);
        let eigenvalues = nalgebra::SymmetricEigen::new(dtd).eigenvalues;
        assert!(eigenvalues.iter().all(|&l| l > -1e-12));
    }

    #[test]
    fn uncovered_kind_is_rejected() {
        let mut parameters = radial_block(ParameterKind::Par2, 2);
        parameters.extend(radial_block(ParameterKind::ParQ, 2));
        let err =
            SecondDifferenceOperator::new(&parameters, &[ParameterKind::Par2], &[1.0]).unwrap_err();
        assert!(matches!(err, InverseError::InvalidArgument(_)));
    }

    #[test]
    fn coefficient_count_mismatch_is_rejected() {
        let parameters = radial_block(ParameterKind::Par2, 2);
        let err = SecondDifferenceOperator::new(&parameters, &[ParameterKind::Par2], &[1.0, 2.0])
            .unwrap_err();
        assert!(matches!(err, InverseError::InvalidArgument(_)));
    }
}

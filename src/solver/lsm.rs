//! Tikhonov-regularized least squares.
//!
//! Closed form `m = (ata + λ T^T T)^{-1} (atd − λ T^T η)`, by default with
//! `T = I` and `η = 0`. A single pass, a single answer: the trajectory has
//! one column and there are no basis vectors. With `λ = 0` this degenerates
//! to the plain normal-equation solve, and a singular `ata` surfaces as a
//! numerical failure rather than being masked.

use nalgebra::{DMatrix, DVector};

use crate::error::{InverseError, Result};
use crate::solver::cg::check_normal_equations;
use crate::solver::method::InverseMethod;
use crate::solver::NormalEquationSolver;

pub struct LeastSquares {
    ata: DMatrix<f64>,
    atd: DVector<f64>,
    lambda: f64,
    constraint: Option<DMatrix<f64>>,
    offset: Option<DVector<f64>>,
    trajectory: DMatrix<f64>,
}

impl LeastSquares {
    /// Minimize `|d − Am|² + λ|m|²`.
    pub fn new(ata: DMatrix<f64>, atd: DVector<f64>, lambda: f64) -> Result<Self> {
        Self::with_constraint(ata, atd, lambda, None, None)
    }

    /// Minimize `|d − Am|² + λ|Tm + η|²` for a general constraint pair.
    pub fn with_constraint(
        ata: DMatrix<f64>,
        atd: DVector<f64>,
        lambda: f64,
        constraint: Option<DMatrix<f64>>,
        offset: Option<DVector<f64>>,
    ) -> Result<Self> {
        let n = check_normal_equations(&ata, &atd)?;
        if !(lambda.is_finite() && lambda >= 0.0) {
            return Err(InverseError::InvalidArgument(format!(
                "lambda must be finite and non-negative, got {lambda}"
            )));
        }
        if let Some(t) = &constraint {
            if t.ncols() != n {
                return Err(InverseError::InvalidArgument(format!(
                    "constraint has {} columns for a {n}-unknown system",
                    t.ncols()
                )));
            }
            if let Some(eta) = &offset {
                if eta.len() != t.nrows() {
                    return Err(InverseError::InvalidArgument(format!(
                        "offset length {} does not match constraint rows {}",
                        eta.len(),
                        t.nrows()
                    )));
                }
            }
        } else if offset.is_some() {
            return Err(InverseError::InvalidArgument(
                "offset given without a constraint matrix".to_string(),
            ));
        }
        Ok(Self {
            ata,
            atd,
            lambda,
            constraint,
            offset,
            trajectory: DMatrix::zeros(0, 0),
        })
    }
}

impl NormalEquationSolver for LeastSquares {
    fn compute(&mut self) -> Result<()> {
        let n = self.ata.ncols();
        let mut lhs = self.ata.clone();
        let mut rhs = self.atd.clone();
        if self.lambda > 0.0 {
            match &self.constraint {
                Some(t) => {
                    lhs += (t.transpose() * t) * self.lambda;
                    if let Some(eta) = &self.offset {
                        rhs -= (t.transpose() * eta) * self.lambda;
                    }
                }
                None => {
                    for i in 0..n {
                        lhs[(i, i)] += self.lambda;
                    }
                }
            }
        }

        let solution = lhs.lu().solve(&rhs).ok_or_else(|| {
            InverseError::Numerical(
                "regularized normal equations are singular; increase lambda or inspect ata"
                    .to_string(),
            )
        })?;
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(InverseError::Numerical(
                "least-squares solution is not finite".to_string(),
            ));
        }
        self.trajectory = DMatrix::from_columns(&[solution]);
        Ok(())
    }

    fn trajectory(&self) -> &DMatrix<f64> {
        &self.trajectory
    }

    fn base_vectors(&self) -> Result<&DMatrix<f64>> {
        Err(InverseError::Unsupported(
            "least squares keeps no basis vectors".to_string(),
        ))
    }

    fn covariance(&self, _sigma_d: f64, _level: usize) -> Result<DMatrix<f64>> {
        Err(InverseError::Unsupported(
            "covariance is not defined for the least-squares strategy".to_string(),
        ))
    }

    fn parameter_count(&self) -> usize {
        self.ata.ncols()
    }

    fn method(&self) -> InverseMethod {
        InverseMethod::LeastSquares
    }
}

//! Method selection.
//!
//! A short mnemonic picks the solving strategy; solver-specific configuration
//! (diagonal conditioner, damping strength) travels in [`SolverConfig`]
//! through the factory call rather than living on any shared value, so
//! unrelated solves can never leak state into each other.

use nalgebra::{DMatrix, DVector};

use crate::error::{InverseError, Result};
use crate::solver::{
    BiCgStab, ConjugateGradient, LeastSquares, NormalEquationSolver, TruncatedSvd,
};

/// Known solving strategies, one per mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InverseMethod {
    /// `svd` — truncated singular value decomposition.
    SingularValueDecomposition,
    /// `cg` — conjugate gradient (preconditioned when a conditioner is
    /// supplied).
    ConjugateGradient,
    /// `lsm` — Tikhonov-regularized least squares.
    LeastSquares,
    /// `nnls` — non-negative least squares (not implemented).
    NonNegativeLeastSquares,
    /// `bcgs` — stabilized bi-conjugate gradient.
    BiConjugateGradientStabilized,
    /// `fcg` — fast conjugate gradient. The fast variant avoids forming
    /// `A^T A`; with the normal equations already assembled it reduces to
    /// plain CG.
    FastConjugateGradient,
    /// `fcgd` — fast conjugate gradient with diagonal Tikhonov damping.
    FastConjugateGradientDamped,
    /// `ncg` — nonlinear conjugate gradient (not implemented).
    NonlinearConjugateGradient,
    /// `ccg` — constrained conjugate gradient (not implemented).
    ConstrainedConjugateGradient,
}

impl InverseMethod {
    pub const ALL: [InverseMethod; 9] = [
        InverseMethod::SingularValueDecomposition,
        InverseMethod::ConjugateGradient,
        InverseMethod::LeastSquares,
        InverseMethod::NonNegativeLeastSquares,
        InverseMethod::BiConjugateGradientStabilized,
        InverseMethod::FastConjugateGradient,
        InverseMethod::FastConjugateGradientDamped,
        InverseMethod::NonlinearConjugateGradient,
        InverseMethod::ConstrainedConjugateGradient,
    ];

    /// Lowercase mnemonic, the canonical spelling.
    pub fn mnemonic(self) -> &'static str {
        match self {
            InverseMethod::SingularValueDecomposition => "svd",
            InverseMethod::ConjugateGradient => "cg",
            InverseMethod::LeastSquares => "lsm",
            InverseMethod::NonNegativeLeastSquares => "nnls",
            InverseMethod::BiConjugateGradientStabilized => "bcgs",
            InverseMethod::FastConjugateGradient => "fcg",
            InverseMethod::FastConjugateGradientDamped => "fcgd",
            InverseMethod::NonlinearConjugateGradient => "ncg",
            InverseMethod::ConstrainedConjugateGradient => "ccg",
        }
    }

    /// Uppercase short name used in answer file names (`CG3.txt`).
    pub fn simple(self) -> &'static str {
        match self {
            InverseMethod::SingularValueDecomposition => "SVD",
            InverseMethod::ConjugateGradient => "CG",
            InverseMethod::LeastSquares => "LSM",
            InverseMethod::NonNegativeLeastSquares => "NNLS",
            InverseMethod::BiConjugateGradientStabilized => "BCGS",
            InverseMethod::FastConjugateGradient => "FCG",
            InverseMethod::FastConjugateGradientDamped => "FCGD",
            InverseMethod::NonlinearConjugateGradient => "NCG",
            InverseMethod::ConstrainedConjugateGradient => "CCG",
        }
    }

    /// Resolve a mnemonic, case-insensitively.
    pub fn from_mnemonic(mnemonic: &str) -> Result<InverseMethod> {
        let lower = mnemonic.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.mnemonic() == lower)
            .ok_or_else(|| {
                InverseError::InvalidArgument(format!("unknown method mnemonic '{mnemonic}'"))
            })
    }

    /// Build the solver for this method over `(ata, atd)`.
    pub fn build(
        self,
        ata: DMatrix<f64>,
        atd: DVector<f64>,
        config: SolverConfig,
    ) -> Result<Box<dyn NormalEquationSolver>> {
        match self {
            InverseMethod::SingularValueDecomposition => {
                Ok(Box::new(TruncatedSvd::new(ata, atd)?))
            }
            InverseMethod::ConjugateGradient => match config.conditioner {
                Some(conditioner) => Ok(Box::new(ConjugateGradient::preconditioned(
                    ata,
                    atd,
                    conditioner,
                )?)),
                None => Ok(Box::new(ConjugateGradient::new(ata, atd)?)),
            },
            InverseMethod::FastConjugateGradient => {
                Ok(Box::new(ConjugateGradient::new(ata, atd)?))
            }
            InverseMethod::FastConjugateGradientDamped => {
                let conditioner = config.conditioner.ok_or_else(|| {
                    InverseError::InvalidArgument(
                        "fcgd needs a conditioner vector for the damping term".to_string(),
                    )
                })?;
                Ok(Box::new(ConjugateGradient::damped(ata, atd, conditioner)?))
            }
            InverseMethod::BiConjugateGradientStabilized => {
                Ok(Box::new(BiCgStab::new(ata, atd)?))
            }
            InverseMethod::LeastSquares => {
                Ok(Box::new(LeastSquares::new(ata, atd, config.lambda)?))
            }
            InverseMethod::NonNegativeLeastSquares => Err(InverseError::Unsupported(
                "non-negative least squares (nnls) is not implemented".to_string(),
            )),
            InverseMethod::NonlinearConjugateGradient => Err(InverseError::Unsupported(
                "nonlinear conjugate gradient (ncg) is not implemented".to_string(),
            )),
            InverseMethod::ConstrainedConjugateGradient => Err(InverseError::Unsupported(
                "constrained conjugate gradient (ccg) is not implemented".to_string(),
            )),
        }
    }
}

/// Per-solve configuration handed to [`InverseMethod::build`].
#[derive(Debug, Clone, Default)]
pub struct SolverConfig {
    /// Diagonal conditioner, in parameter order. Preconditions `cg`; supplies
    /// the damping diagonal for `fcgd`.
    pub conditioner: Option<DVector<f64>>,
    /// Tikhonov λ for `lsm`.
    pub lambda: f64,
}

impl SolverConfig {
    pub fn with_conditioner(conditioner: DVector<f64>) -> Self {
        Self {
            conditioner: Some(conditioner),
            lambda: 0.0,
        }
    }

    pub fn with_lambda(lambda: f64) -> Self {
        Self {
            conditioner: None,
            lambda,
        }
    }
}

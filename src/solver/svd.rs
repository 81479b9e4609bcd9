//! Truncated SVD solve.
//!
//! Decomposes `ata = U Σ V^T` (symmetric input, so `U ≈ V`) and solves the
//! rotated system `V^T ata V` by LU. The rotated matrix can be too small for
//! a stable LU, so it is rescaled by `1 / ata[0, n-1]` before inversion and
//! the coefficients rescaled back afterwards; a zero or non-finite corner
//! falls back to no rescaling rather than poisoning the solve.
//!
//! Trajectory column `j` is the partial sum `Σ_{i≤j} p_i v_i` over the
//! leading singular directions; singular values are exposed for diagnostic
//! output.

use std::fs;
use std::path::Path;

use nalgebra::{DMatrix, DVector};

use crate::error::{InverseError, Result};
use crate::io::answers::{self, RunSummary};
use crate::solver::cg::check_normal_equations;
use crate::solver::method::InverseMethod;
use crate::solver::NormalEquationSolver;

pub struct TruncatedSvd {
    ata: DMatrix<f64>,
    atd: DVector<f64>,
    /// Rows are the right singular vectors `v_i`, largest singular value
    /// first.
    vt: DMatrix<f64>,
    singular_values: DVector<f64>,
    trajectory: DMatrix<f64>,
}

impl TruncatedSvd {
    pub fn new(ata: DMatrix<f64>, atd: DVector<f64>) -> Result<Self> {
        check_normal_equations(&ata, &atd)?;
        Ok(Self {
            ata,
            atd,
            vt: DMatrix::zeros(0, 0),
            singular_values: DVector::zeros(0),
            trajectory: DMatrix::zeros(0, 0),
        })
    }

    /// Singular values, largest first. Empty before [`compute`].
    ///
    /// [`compute`]: NormalEquationSolver::compute
    pub fn singular_values(&self) -> &DVector<f64> {
        &self.singular_values
    }

    /// Write singular values to `path`, one per line.
    pub fn write_singular_values(&self, path: &Path) -> Result<()> {
        if self.singular_values.is_empty() {
            return Err(InverseError::InvalidArgument(
                "compute() has not been run".to_string(),
            ));
        }
        answers::write_singular_values(path, self.singular_values.as_slice())
    }

    /// Write each basis vector `v_i` to `<directory>/<i>.dat`, one component
    /// per line. Synchronous: when this returns Ok, the files are on disk.
    pub fn write_base_vectors(&self, directory: &Path) -> Result<()> {
        if self.vt.ncols() == 0 {
            return Err(InverseError::InvalidArgument(
                "compute() has not been run".to_string(),
            ));
        }
        fs::create_dir_all(directory).map_err(|e| InverseError::io(directory, e))?;
        for i in 0..self.vt.nrows() {
            let path = directory.join(format!("{i}.dat"));
            answers::write_values(&path, self.vt.row(i).iter())?;
        }
        Ok(())
    }
}

impl NormalEquationSolver for TruncatedSvd {
    fn compute(&mut self) -> Result<()> {
        let n = self.ata.ncols();
        eprintln!("singular value decomposing ata ({n} unknowns)");

        let svd = self
            .ata
            .clone()
            .try_svd(true, true, f64::EPSILON, 0)
            .ok_or_else(|| {
                InverseError::Numerical("singular value decomposition did not converge".to_string())
            })?;
        let vt = svd.v_t.ok_or_else(|| {
            InverseError::Numerical("decomposition produced no right singular vectors".to_string())
        })?;
        let singular_values = svd.singular_values;

        // Rotate into the singular basis and rescale so LU sees entries of
        // workable magnitude.
        let btb = &vt * &self.ata * vt.transpose();
        let corner = self.ata[(0, n - 1)];
        let factor = if corner != 0.0 && corner.is_finite() {
            1.0 / corner
        } else {
            1.0
        };
        let btd = &vt * &self.atd;
        let mut coefficients = (btb * factor).lu().solve(&btd).ok_or_else(|| {
            InverseError::Numerical("rotated normal equations are singular".to_string())
        })?;
        coefficients *= factor;

        let mut trajectory = DMatrix::<f64>::zeros(n, n);
        let mut partial = DVector::<f64>::zeros(n);
        for j in 0..n {
            partial += vt.row(j).transpose() * coefficients[j];
            trajectory.set_column(j, &partial);
        }

        self.vt = vt;
        self.singular_values = singular_values;
        self.trajectory = trajectory;
        Ok(())
    }

    fn trajectory(&self) -> &DMatrix<f64> {
        &self.trajectory
    }

    fn base_vectors(&self) -> Result<&DMatrix<f64>> {
        if self.vt.ncols() == 0 {
            return Err(InverseError::InvalidArgument(
                "compute() has not been run".to_string(),
            ));
        }
        Ok(&self.vt)
    }

    fn covariance(&self, sigma_d: f64, level: usize) -> Result<DMatrix<f64>> {
        if level == 0 {
            return Err(InverseError::InvalidArgument(
                "truncation level must be 1 or more".to_string(),
            ));
        }
        if self.vt.ncols() == 0 {
            return Err(InverseError::InvalidArgument(
                "compute() has not been run".to_string(),
            ));
        }
        if level > self.vt.nrows() {
            return Err(InverseError::InvalidArgument(format!(
                "truncation level {level} out of range 1..={}",
                self.vt.nrows()
            )));
        }

        let n = self.ata.ncols();
        let sigma2 = sigma_d * sigma_d;
        let mut covariance = DMatrix::<f64>::zeros(n, n);
        for i in 0..level {
            let lambda = self.singular_values[i];
            if lambda == 0.0 || !lambda.is_finite() {
                return Err(InverseError::Numerical(format!(
                    "singular value {i} is {lambda}; covariance undefined"
                )));
            }
            let v_i = self.vt.row(i).transpose();
            covariance += (&v_i * v_i.transpose()) * (sigma2 / lambda);
        }
        Ok(covariance)
    }

    fn parameter_count(&self) -> usize {
        self.ata.ncols()
    }

    fn method(&self) -> InverseMethod {
        InverseMethod::SingularValueDecomposition
    }

    fn run_summary(&self) -> RunSummary {
        RunSummary {
            method: self.method().mnemonic().to_string(),
            parameter_count: self.parameter_count(),
            levels: self.level_count(),
            singular_values: if self.singular_values.is_empty() {
                None
            } else {
                Some(self.singular_values.iter().copied().collect())
            },
        }
    }
}

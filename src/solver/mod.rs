//! Normal-equation solving strategies.
//!
//! Every strategy consumes an assembled `(A^T A, A^T d)` pair and produces a
//! *solution trajectory*: column `j` is the model obtained from the first
//! `j + 1` basis directions (CG family) or singular values (SVD), so callers
//! can study the resolution/data-fit trade-off across truncation levels
//! instead of getting a single final answer.
//!
//! The iterative solvers deliberately run their full iteration count with no
//! early exit on the residual — every truncation rank must stay available
//! for covariance studies, even on well-conditioned systems where the later
//! iterations buy nothing.

pub mod bicgstab;
pub mod cg;
pub mod lsm;
pub mod method;
pub mod svd;

use std::fs;
use std::path::Path;

use nalgebra::{DMatrix, DVector};

use crate::error::{InverseError, Result};
use crate::io::answers::{self, RunSummary};

pub use bicgstab::BiCgStab;
pub use cg::ConjugateGradient;
pub use lsm::LeastSquares;
pub use method::{InverseMethod, SolverConfig};
pub use svd::TruncatedSvd;

/// Contract shared by every solving strategy.
pub trait NormalEquationSolver {
    /// Run the algorithm to completion, filling the trajectory and basis.
    /// Calling it again reallocates internal state and reruns. Progress goes
    /// to stderr and is diagnostic only.
    fn compute(&mut self) -> Result<()>;

    /// The solution-trajectory matrix. Empty (0×0) before [`compute`].
    ///
    /// [`compute`]: NormalEquationSolver::compute
    fn trajectory(&self) -> &DMatrix<f64>;

    /// Internal basis: search directions `p_i` (CG family) or `V^T` (SVD).
    /// `Unsupported` for strategies without a meaningful basis.
    fn base_vectors(&self) -> Result<&DMatrix<f64>>;

    /// Model covariance `σ_d² Σ_{i<level} (1/λ_i) v_i v_i^T`, truncated at
    /// `level`. Requires [`compute`] first.
    ///
    /// [`compute`]: NormalEquationSolver::compute
    fn covariance(&self, sigma_d: f64, level: usize) -> Result<DMatrix<f64>>;

    /// Number of unknowns, from the `ata` dimension.
    fn parameter_count(&self) -> usize;

    /// The method this strategy answers for (drives output file naming).
    fn method(&self) -> InverseMethod;

    /// Solution at `level` (1-based truncation level).
    fn answer(&self, level: usize) -> Result<DVector<f64>> {
        let trajectory = self.trajectory();
        if level == 0 {
            return Err(InverseError::InvalidArgument(
                "truncation level must be 1 or more".to_string(),
            ));
        }
        if trajectory.ncols() == 0 {
            return Err(InverseError::InvalidArgument(
                "compute() has not been run".to_string(),
            ));
        }
        if level > trajectory.ncols() {
            return Err(InverseError::InvalidArgument(format!(
                "truncation level {level} out of range 1..={}",
                trajectory.ncols()
            )));
        }
        Ok(trajectory.column(level - 1).into_owned())
    }

    /// Number of truncation levels available after [`compute`].
    ///
    /// [`compute`]: NormalEquationSolver::compute
    fn level_count(&self) -> usize {
        self.trajectory().ncols()
    }

    /// Persist every truncation level as `<MNEMONIC><level>.txt` under
    /// `directory` (created if absent), one value per line in parameter
    /// order.
    fn write_answers(&self, directory: &Path) -> Result<()> {
        let trajectory = self.trajectory();
        if trajectory.ncols() == 0 {
            return Err(InverseError::InvalidArgument(
                "compute() has not been run".to_string(),
            ));
        }
        fs::create_dir_all(directory).map_err(|e| InverseError::io(directory, e))?;
        let simple = self.method().simple();
        for level in 1..=trajectory.ncols() {
            let path = directory.join(format!("{simple}{level}.txt"));
            answers::write_values(&path, trajectory.column(level - 1).iter())?;
        }
        Ok(())
    }

    /// Machine-readable description of this solve.
    fn run_summary(&self) -> RunSummary {
        RunSummary {
            method: self.method().mnemonic().to_string(),
            parameter_count: self.parameter_count(),
            levels: self.level_count(),
            singular_values: None,
        }
    }
}

/// Covariance from stored search directions, shared by the CG family and
/// BiCGSTAB: `σ² Σ_{i<level} p_i p_i^T / (p_i · (ata · p_i))`.
///
/// Each term is a positively scaled rank-1 outer product, so the sum is
/// symmetric positive semi-definite by construction.
pub(crate) fn direction_covariance(
    ata: &DMatrix<f64>,
    directions: &DMatrix<f64>,
    sigma_d: f64,
    level: usize,
) -> Result<DMatrix<f64>> {
    if level == 0 {
        return Err(InverseError::InvalidArgument(
            "truncation level must be 1 or more".to_string(),
        ));
    }
    if directions.ncols() == 0 {
        return Err(InverseError::InvalidArgument(
            "compute() has not been run".to_string(),
        ));
    }
    if level > directions.ncols() {
        return Err(InverseError::InvalidArgument(format!(
            "truncation level {level} out of range 1..={}",
            directions.ncols()
        )));
    }

    let n = ata.nrows();
    let sigma2 = sigma_d * sigma_d;
    let mut covariance = DMatrix::<f64>::zeros(n, n);
    for i in 0..level {
        let p_i = directions.column(i).clone_owned();
        let paap = p_i.dot(&(ata * &p_i));
        if paap == 0.0 || !paap.is_finite() {
            return Err(InverseError::Numerical(format!(
                "p·(ata·p) = {paap} for basis vector {i}; covariance undefined"
            )));
        }
        covariance += (&p_i * p_i.transpose()) * (sigma2 / paap);
    }
    Ok(covariance)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use nalgebra::SymmetricEigen;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    /// Small SPD system with a non-zero `[0, n-1]` corner, used across the
    /// solver tests.
    pub(crate) fn spd_3x3() -> (DMatrix<f64>, DVector<f64>) {
        let ata = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.5, 1.0, 3.0, 0.2, 0.5, 0.2, 2.0]);
        let atd = DVector::from_vec(vec![1.0, -2.0, 0.7]);
        (ata, atd)
    }

    /// Randomized SPD system: `M^T M + 0.5 I` keeps it well conditioned.
    pub(crate) fn random_spd(n: usize, seed: u64) -> (DMatrix<f64>, DVector<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let m = DMatrix::from_fn(n, n, |_, _| normal.sample(&mut rng));
        let ata = m.transpose() * &m + DMatrix::identity(n, n) * 0.5;
        let atd = DVector::from_fn(n, |_, _| normal.sample(&mut rng));
        (ata, atd)
    }

    pub(crate) fn direct_solve(ata: &DMatrix<f64>, atd: &DVector<f64>) -> DVector<f64> {
        ata.clone().lu().solve(atd).unwrap()
    }

    pub(crate) fn assert_symmetric_psd(matrix: &DMatrix<f64>) {
        assert!(
            (matrix.clone() - matrix.transpose()).norm() < 1e-10,
            "matrix is not symmetric"
        );
        let eigenvalues = SymmetricEigen::new(matrix.clone()).eigenvalues;
        assert!(
            eigenvalues.iter().all(|&l| l > -1e-9),
            "negative eigenvalue in {eigenvalues}"
        );
    }

    #[test]
    fn write_answers_produces_one_file_per_level() {
        let (ata, atd) = spd_3x3();
        let mut solver = ConjugateGradient::new(ata, atd).unwrap();
        solver.compute().unwrap();

        let dir = std::env::temp_dir().join(format!("tomoinv-{}-answers", std::process::id()));
        solver.write_answers(&dir).unwrap();
        for level in 1..=3 {
            let path = dir.join(format!("CG{level}.txt"));
            let text = std::fs::read_to_string(&path).unwrap();
            assert_eq!(text.lines().count(), 3, "{path:?}");
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn write_answers_before_compute_is_invalid() {
        let (ata, atd) = spd_3x3();
        let solver = ConjugateGradient::new(ata, atd).unwrap();
        let dir = std::env::temp_dir().join("tomoinv-never-created");
        assert!(matches!(
            solver.write_answers(&dir),
            Err(InverseError::InvalidArgument(_))
        ));
    }

    #[test]
    fn run_summary_reflects_solver_state() {
        let (ata, atd) = spd_3x3();
        let mut solver = ConjugateGradient::new(ata, atd).unwrap();
        solver.compute().unwrap();
        let summary = solver.run_summary();
        assert_eq!(summary.method, "cg");
        assert_eq!(summary.parameter_count, 3);
        assert_eq!(summary.levels, 3);
        assert!(summary.singular_values.is_none());
    }
}

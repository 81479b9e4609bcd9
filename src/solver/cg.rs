//! Conjugate gradient on the SPD system `ata · m = atd`.
//!
//! One search direction and one trajectory column per iteration: column `j`
//! is the model after the first `j + 1` directions. The iteration always runs
//! the full `n` columns — partial ranks feed the covariance truncation
//! studies downstream.
//!
//! Three flavors share the iteration skeleton:
//!
//! - plain CG (`z_i = r_i`)
//! - diagonal-preconditioned CG (`z_i = c ⊙ r_i`)
//! - damped CG, where the operator application gains a `c ⊙ c ⊙ p` Tikhonov
//!   term
//!
//! Plain CG and an all-ones preconditioner follow the exact same arithmetic,
//! so their trajectories are bit-identical.

use nalgebra::{DMatrix, DVector};

use crate::error::{InverseError, Result};
use crate::solver::method::InverseMethod;
use crate::solver::{direction_covariance, NormalEquationSolver};

pub struct ConjugateGradient {
    ata: DMatrix<f64>,
    atd: DVector<f64>,
    /// Diagonal preconditioner applied to the residual (`z = c ⊙ r`).
    conditioner: Option<DVector<f64>>,
    /// Diagonal damping added to the operator (`ata·p + c ⊙ c ⊙ p`).
    damping: Option<DVector<f64>>,
    /// Search directions, one column per iteration.
    p: DMatrix<f64>,
    trajectory: DMatrix<f64>,
}

impl ConjugateGradient {
    /// Plain CG.
    pub fn new(ata: DMatrix<f64>, atd: DVector<f64>) -> Result<Self> {
        Self::build(ata, atd, None, None)
    }

    /// CG with a diagonal preconditioner, one scalar per unknown.
    ///
    /// The conditioner must keep `z·r` away from zero in early iterations;
    /// a vanishing inner product shows up as a caution on stderr (the
    /// following step is suspect), not a crash.
    pub fn preconditioned(
        ata: DMatrix<f64>,
        atd: DVector<f64>,
        conditioner: DVector<f64>,
    ) -> Result<Self> {
        Self::build(ata, atd, Some(conditioner), None)
    }

    /// CG with diagonal Tikhonov damping folded into the operator.
    pub fn damped(ata: DMatrix<f64>, atd: DVector<f64>, damping: DVector<f64>) -> Result<Self> {
        Self::build(ata, atd, None, Some(damping))
    }

    fn build(
        ata: DMatrix<f64>,
        atd: DVector<f64>,
        conditioner: Option<DVector<f64>>,
        damping: Option<DVector<f64>>,
    ) -> Result<Self> {
        let n = check_system(&ata, &atd)?;
        for (name, vector) in [("conditioner", &conditioner), ("damping", &damping)] {
            if let Some(v) = vector {
                if v.len() != n {
                    return Err(InverseError::InvalidArgument(format!(
                        "{name} length {} does not match system size {n}",
                        v.len()
                    )));
                }
            }
        }
        Ok(Self {
            ata,
            atd,
            conditioner,
            damping,
            p: DMatrix::zeros(0, 0),
            trajectory: DMatrix::zeros(0, 0),
        })
    }

    fn precondition(&self, r: &DVector<f64>) -> DVector<f64> {
        match &self.conditioner {
            Some(c) => c.component_mul(r),
            None => r.clone(),
        }
    }

    fn operator_apply(&self, p: &DVector<f64>) -> DVector<f64> {
        let mut atap = &self.ata * p;
        if let Some(c) = &self.damping {
            atap += c.component_mul(c).component_mul(p);
        }
        atap
    }

    // Exact convergence before the final column: repeat the converged answer
    // for the remaining levels. Basis columns past this point stay zero, so
    // covariance truncated beyond it reports the degeneracy.
    fn pad_trajectory_from(&mut self, start: usize) {
        let n = self.trajectory.ncols();
        let converged = if start == 0 {
            DVector::zeros(self.trajectory.nrows())
        } else {
            self.trajectory.column(start - 1).into_owned()
        };
        eprintln!("converged exactly at iteration {start}; repeating the answer through level {n}");
        for j in start..n {
            self.trajectory.set_column(j, &converged);
        }
    }
}

impl NormalEquationSolver for ConjugateGradient {
    fn compute(&mut self) -> Result<()> {
        let n = self.ata.ncols();
        self.p = DMatrix::zeros(n, n);
        self.trajectory = DMatrix::zeros(n, n);
        eprintln!("solving {n} unknowns by CG");

        let mut r = self.atd.clone();
        let mut z = self.precondition(&r);
        let first_zr = z.dot(&r);
        self.p.set_column(0, &z);

        for i in 0..n {
            let p_i = self.p.column(i).clone_owned();
            let atap = self.operator_apply(&p_i);

            let zr = z.dot(&r);
            let paap = p_i.dot(&atap);
            if !paap.is_finite() || !zr.is_finite() {
                return Err(InverseError::Numerical(format!(
                    "non-finite step at iteration {i}: z·r = {zr}, p·(ata·p) = {paap}"
                )));
            }
            if paap == 0.0 {
                if zr == 0.0 {
                    // residual hit exact zero: the system is solved; every
                    // remaining level repeats the converged answer so the
                    // full trajectory stays available
                    self.pad_trajectory_from(i);
                    break;
                }
                return Err(InverseError::Numerical(format!(
                    "p·(ata·p) vanished at iteration {i} with z·r = {zr}"
                )));
            }
            let alpha = zr / paap;

            let column = if i == 0 {
                &p_i * alpha
            } else {
                self.trajectory.column(i - 1) + &p_i * alpha
            };
            self.trajectory.set_column(i, &column);

            if i + 1 == n {
                break;
            }

            r -= &atap * alpha;
            let z_next = self.precondition(&r);
            let zr_next = z_next.dot(&r);
            if zr == 0.0 {
                self.pad_trajectory_from(i + 1);
                break;
            }
            if zr.abs() < 1e-14 * first_zr.abs() {
                eprintln!(
                    "caution: z·r = {zr} near zero at iteration {i}; next step may be large"
                );
            }
            let beta = zr_next / zr;
            let p_next = z_next.clone() + &p_i * beta;
            self.p.set_column(i + 1, &p_next);
            z = z_next;
        }
        Ok(())
    }

    fn trajectory(&self) -> &DMatrix<f64> {
        &self.trajectory
    }

    fn base_vectors(&self) -> Result<&DMatrix<f64>> {
        if self.p.ncols() == 0 {
            return Err(InverseError::InvalidArgument(
                "compute() has not been run".to_string(),
            ));
        }
        Ok(&self.p)
    }

    fn covariance(&self, sigma_d: f64, level: usize) -> Result<DMatrix<f64>> {
        direction_covariance(&self.ata, &self.p, sigma_d, level)
    }

    fn parameter_count(&self) -> usize {
        self.ata.ncols()
    }

    fn method(&self) -> InverseMethod {
        InverseMethod::ConjugateGradient
    }
}

pub(crate) fn check_system(ata: &DMatrix<f64>, atd: &DVector<f64>) -> Result<usize> {
    if ata.nrows() != ata.ncols() {
        return Err(InverseError::InvalidArgument(format!(
            "ata must be square, got {}×{}",
            ata.nrows(),
            ata.ncols()
        )));
    }
    if ata.nrows() == 0 {
        return Err(InverseError::InvalidArgument("empty system".to_string()));
    }
    if atd.len() != ata.nrows() {
        return Err(InverseError::InvalidArgument(format!(
            "atd length {} does not match ata dimension {}",
            atd.len(),
            ata.nrows()
        )));
    }
    Ok(ata.nrows())
}

pub(crate) use check_system as check_normal_equations;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::tests::{assert_symmetric_psd, direct_solve, random_spd, spd_3x3};

    #[test]
    fn final_column_matches_direct_solve() {
        let (ata, atd) = spd_3x3();
        let expected = direct_solve(&ata, &atd);
        let mut cg = ConjugateGradient::new(ata, atd).unwrap();
        cg.compute().unwrap();
        let answer = cg.answer(3).unwrap();
        assert!(
            (answer - &expected).norm() / expected.norm() < 1e-10,
            "CG final column deviates from direct solve"
        );
    }

    #[test]
    fn trajectory_columns_refine_monotonically_to_the_solution() {
        let (ata, atd) = random_spd(8, 7);
        let expected = direct_solve(&ata, &atd);
        let mut cg = ConjugateGradient::new(ata, atd).unwrap();
        cg.compute().unwrap();
        assert_eq!(cg.level_count(), 8);
        let final_error = (cg.answer(8).unwrap() - &expected).norm();
        assert!(final_error / expected.norm() < 1e-8);
    }

    #[test]
    fn all_ones_preconditioner_reproduces_plain_cg_exactly() {
        let (ata, atd) = spd_3x3();
        let mut plain = ConjugateGradient::new(ata.clone(), atd.clone()).unwrap();
        plain.compute().unwrap();
        let mut pcg =
            ConjugateGradient::preconditioned(ata, atd, DVector::from_element(3, 1.0)).unwrap();
        pcg.compute().unwrap();
        // bit-for-bit, not within tolerance
        assert_eq!(plain.trajectory(), pcg.trajectory());
        assert_eq!(
            plain.base_vectors().unwrap(),
            pcg.base_vectors().unwrap()
        );
    }

    #[test]
    fn answer_level_zero_is_invalid() {
        let (ata, atd) = spd_3x3();
        let mut cg = ConjugateGradient::new(ata, atd).unwrap();
        cg.compute().unwrap();
        assert!(matches!(
            cg.answer(0),
            Err(InverseError::InvalidArgument(_))
        ));
        assert!(cg.answer(1).is_ok());
        assert!(cg.answer(4).is_err());
    }

    #[test]
    fn answer_before_compute_is_invalid() {
        let (ata, atd) = spd_3x3();
        let cg = ConjugateGradient::new(ata, atd).unwrap();
        assert!(matches!(
            cg.answer(1),
            Err(InverseError::InvalidArgument(_))
        ));
    }

    #[test]
    fn covariance_is_symmetric_psd() {
        let (ata, atd) = spd_3x3();
        let mut cg = ConjugateGradient::new(ata, atd).unwrap();
        cg.compute().unwrap();
        for level in 1..=3 {
            let cov = cg.covariance(0.1, level).unwrap();
            assert_symmetric_psd(&cov);
        }
    }

    #[test]
    fn recompute_reproduces_the_same_trajectory() {
        let (ata, atd) = spd_3x3();
        let mut cg = ConjugateGradient::new(ata, atd).unwrap();
        cg.compute().unwrap();
        let first = cg.trajectory().clone();
        cg.compute().unwrap();
        assert_eq!(&first, cg.trajectory());
    }

    #[test]
    fn damped_cg_solves_the_damped_system() {
        let (ata, atd) = spd_3x3();
        let c = DVector::from_vec(vec![0.5, 0.5, 0.5]);
        // damping folds c² into the diagonal, so the full-rank answer solves
        // (ata + diag(c²)) m = atd
        let damped_ata = ata.clone() + DMatrix::from_diagonal(&c.component_mul(&c));
        let expected = direct_solve(&damped_ata, &atd);
        let mut cg = ConjugateGradient::damped(ata, atd, c).unwrap();
        cg.compute().unwrap();
        let answer = cg.answer(3).unwrap();
        assert!((answer - &expected).norm() / expected.norm() < 1e-8);
    }

    #[test]
    fn exact_convergence_pads_remaining_levels() {
        // on the identity the first step lands exactly on the solution and
        // the residual becomes bitwise zero
        let ata = DMatrix::<f64>::identity(3, 3);
        let atd = DVector::from_vec(vec![1.0, -2.0, 0.5]);
        let mut cg = ConjugateGradient::new(ata, atd.clone()).unwrap();
        cg.compute().unwrap();
        for level in 1..=3 {
            assert_eq!(cg.answer(level).unwrap(), atd);
        }
    }

    #[test]
    fn dimension_mismatches_are_rejected() {
        let ata = DMatrix::<f64>::identity(3, 3);
        let atd = DVector::<f64>::zeros(2);
        assert!(ConjugateGradient::new(ata.clone(), atd).is_err());
        let atd = DVector::<f64>::zeros(3);
        assert!(
            ConjugateGradient::preconditioned(ata, atd, DVector::zeros(2)).is_err()
        );
    }
}

//! Stabilized bi-conjugate gradient.
//!
//! Handles `ata` matrices that are not symmetric enough (accumulated from
//! noisy partials) or too ill-conditioned for plain CG. Runs `n - 1` steps
//! unconditionally; step `i` fills trajectory and basis column `i - 1`, so
//! column `j` is the answer after `j + 1` steps, like every other iterative
//! solver here.
//!
//! The iteration divides by `r0·v` and `t·t`; when either vanishes the run
//! has stagnated and aborts with a numerical error instead of writing NaNs
//! into result files.

use nalgebra::{DMatrix, DVector};

use crate::error::{InverseError, Result};
use crate::solver::cg::check_normal_equations;
use crate::solver::method::InverseMethod;
use crate::solver::{direction_covariance, NormalEquationSolver};

pub struct BiCgStab {
    ata: DMatrix<f64>,
    atd: DVector<f64>,
    /// Search directions, one column per step.
    p: DMatrix<f64>,
    trajectory: DMatrix<f64>,
}

impl BiCgStab {
    pub fn new(ata: DMatrix<f64>, atd: DVector<f64>) -> Result<Self> {
        let n = check_normal_equations(&ata, &atd)?;
        if n < 2 {
            return Err(InverseError::InvalidArgument(
                "BiCGSTAB needs at least 2 unknowns".to_string(),
            ));
        }
        Ok(Self {
            ata,
            atd,
            p: DMatrix::zeros(0, 0),
            trajectory: DMatrix::zeros(0, 0),
        })
    }
}

impl NormalEquationSolver for BiCgStab {
    fn compute(&mut self) -> Result<()> {
        let n = self.ata.ncols();
        let steps = n - 1;
        self.p = DMatrix::zeros(n, steps);
        self.trajectory = DMatrix::zeros(n, steps);
        eprintln!("solving {n} unknowns by BiCGSTAB");

        // r0 is fixed for the whole run; r evolves.
        let r0 = self.atd.clone();
        let mut r = r0.clone();
        let mut rho = r0.dot(&r);
        let mut rho_prev = 1.0;
        let mut alpha = 1.0;
        let mut omega_prev = 1.0;

        let mut v = DVector::<f64>::zeros(n);
        let mut p_prev = DVector::<f64>::zeros(n);
        let mut answer = DVector::<f64>::zeros(n);

        for step in 0..steps {
            if r.iter().all(|&x| x == 0.0) {
                // residual hit exact zero: repeat the converged answer for
                // the remaining levels (basis columns stay zero)
                eprintln!(
                    "converged exactly at step {step}; repeating the answer through level {steps}"
                );
                for j in step..steps {
                    self.trajectory.set_column(j, &answer);
                }
                break;
            }

            let beta = rho / rho_prev * (alpha / omega_prev);
            let p_i = &r + (&p_prev - &v * omega_prev) * beta;
            v = &self.ata * &p_i;

            let r0v = r0.dot(&v);
            if r0v == 0.0 {
                return Err(InverseError::Numerical(format!(
                    "r0·v vanished at step {}", step + 1
                )));
            }
            alpha = rho / r0v;

            let h = &answer + &p_i * alpha;
            let s = &r - &v * alpha;
            let t = &self.ata * &s;
            let tt = t.dot(&t);
            if tt == 0.0 {
                if s.iter().all(|&x| x == 0.0) {
                    // exact convergence inside the step: h is the answer
                    eprintln!(
                        "converged exactly at step {}; repeating the answer through level {steps}",
                        step + 1
                    );
                    answer = h;
                    self.p.set_column(step, &p_i);
                    for j in step..steps {
                        self.trajectory.set_column(j, &answer);
                    }
                    break;
                }
                return Err(InverseError::Numerical(format!(
                    "t·t vanished at step {} (stagnation)", step + 1
                )));
            }
            let omega = t.dot(&s) / tt;

            rho_prev = rho;
            rho = -omega * r0.dot(&t);
            answer = h + &s * omega;
            r = s - &t * omega;

            for (name, value) in [
                ("beta", beta),
                ("alpha", alpha),
                ("omega", omega),
                ("rho", rho),
            ] {
                if !value.is_finite() {
                    return Err(InverseError::Numerical(format!(
                        "{name} = {value} at step {}", step + 1
                    )));
                }
            }

            self.p.set_column(step, &p_i);
            self.trajectory.set_column(step, &answer);

            p_prev = p_i;
            omega_prev = omega;
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
        InverseMethod::BiConjugateGradientStabilized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::cg::ConjugateGradient;
    use crate::solver::tests::{assert_symmetric_psd, direct_solve, random_spd, spd_3x3};

    // SPD with a repeated eigenvalue (6, 6, 15): the Krylov space closes in
    // two steps, within the n−1 steps BiCGSTAB runs.
    fn spd_repeated_eigenvalue() -> (DMatrix<f64>, DVector<f64>) {
        let ata = DMatrix::from_row_slice(3, 3, &[7.0, 2.0, 2.0, 2.0, 10.0, 4.0, 2.0, 4.0, 10.0]);
        let atd = DVector::from_vec(vec![1.0, 0.0, -1.0]);
        (ata, atd)
    }

    #[test]
    fn agrees_with_cg_on_spd_system() {
        let (ata, atd) = spd_repeated_eigenvalue();
        let mut cg = ConjugateGradient::new(ata.clone(), atd.clone()).unwrap();
        cg.compute().unwrap();
        let cg_final = cg.answer(cg.level_count()).unwrap();

        let mut bcgs = BiCgStab::new(ata, atd).unwrap();
        bcgs.compute().unwrap();
        let bcgs_final = bcgs.answer(bcgs.level_count()).unwrap();

        assert!((cg_final - bcgs_final).norm() < 1e-8);
    }

    #[test]
    fn converges_to_direct_solve_on_random_system() {
        // random orthogonal basis, eigenvalues with one repeat so n−1 steps
        // reach the exact answer
        let (m, _) = random_spd(6, 42);
        let q = m.qr().q();
        let eigenvalues = DVector::from_vec(vec![1.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let ata = &q * DMatrix::from_diagonal(&eigenvalues) * q.transpose();
        let atd = DVector::from_vec(vec![0.3, -1.0, 2.0, 0.1, -0.4, 1.5]);
        let expected = direct_solve(&ata, &atd);

        let mut bcgs = BiCgStab::new(ata, atd).unwrap();
        bcgs.compute().unwrap();
        assert_eq!(bcgs.level_count(), 5);
        let answer = bcgs.answer(5).unwrap();
        assert!((answer - &expected).norm() / expected.norm() < 1e-6);
    }

    #[test]
    fn zero_system_fails_numerically_not_with_nans() {
        let ata = DMatrix::<f64>::zeros(3, 3);
        let atd = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let mut bcgs = BiCgStab::new(ata, atd).unwrap();
        assert!(matches!(
            bcgs.compute(),
            Err(InverseError::Numerical(_))
        ));
    }

    #[test]
    fn covariance_is_symmetric_psd() {
        let (ata, atd) = spd_3x3();
        let mut bcgs = BiCgStab::new(ata, atd).unwrap();
        bcgs.compute().unwrap();
        for level in 1..=2 {
            let cov = bcgs.covariance(0.3, level).unwrap();
            assert_symmetric_psd(&cov);
        }
    }

    #[test]
    fn single_unknown_system_is_rejected() {
        let ata = DMatrix::from_element(1, 1, 2.0);
        let atd = DVector::from_element(1, 1.0);
        assert!(matches!(
            BiCgStab::new(ata, atd),
            Err(InverseError::InvalidArgument(_))
        ));
    }
}

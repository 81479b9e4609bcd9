//! `tomoinv` library crate.
//!
//! Solves the dense normal-equation systems `A^T A · m = A^T d` arising in
//! waveform tomography: given accumulated normal equations, recover the model
//! vector over a 1-D or 3-D parameter grid together with its uncertainty.
//!
//! The crate is a library on purpose: the drivers that assemble `A^T A` from
//! waveform partials, the grid generators and the plot writers all live
//! upstream and downstream. What lives here is the part where sign and
//! ordering mistakes silently produce wrong science — the solver strategies,
//! their trajectory/covariance bookkeeping, and the unknown-parameter model
//! whose list order defines every matrix column.
//!
//! ```no_run
//! use nalgebra::{DMatrix, DVector};
//! use tomoinv::solver::{InverseMethod, NormalEquationSolver, SolverConfig};
//!
//! # fn main() -> tomoinv::error::Result<()> {
//! let ata = DMatrix::<f64>::identity(3, 3);
//! let atd = DVector::from_vec(vec![1.0, 2.0, 3.0]);
//! let method = InverseMethod::from_mnemonic("cg")?;
//! let mut solver = method.build(ata, atd, SolverConfig::default())?;
//! solver.compute()?;
//! let model = solver.answer(3)?;
//! # let _ = model;
//! # Ok(())
//! # }
//! ```

pub mod domain;
pub mod error;
pub mod io;
pub mod math;
pub mod solver;

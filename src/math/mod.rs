//! Mathematical building blocks: the second-difference regularization
//! operator.

pub mod operator;

pub use operator::*;

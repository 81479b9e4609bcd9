//! Per-parameter weighting rules.
//!
//! A weight rescales one column of the system before or during a solve:
//! depth-band rules boost poorly sampled layers, sensitivity-derived rules
//! flatten the uneven ray-path coverage of real datasets. Each rule is a pure
//! function `UnknownParameter → f64`; [`ParameterWeights`] evaluates it once
//! over the unknown list and is read-only afterward.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use nalgebra::DVector;

use crate::domain::types::{Location, ParameterKind, UnknownParameter};
use crate::error::{InverseError, Result};

/// Upper cap on the inverse-sensitivity ratio before the square root.
const SENSITIVITY_CAP: f64 = 4.0;

/// A sensitivity table keyed by what identifies a column spatially: kind and
/// position (radius alone for radial parameters).
pub type SensitivityTable = HashMap<SensitivityKey, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensitivityKey {
    Radial(ParameterKind, u64),
    Voxel(ParameterKind, Location),
}

impl SensitivityKey {
    pub fn of(parameter: &UnknownParameter) -> Self {
        match parameter.location() {
            Some(location) => SensitivityKey::Voxel(parameter.kind(), location),
            None => SensitivityKey::Radial(parameter.kind(), parameter.radius().to_bits()),
        }
    }
}

/// Closed set of weighting rules.
///
/// Adding a rule means adding one variant and one arm in
/// [`WeightRule::weight_of`]; callers are untouched.
#[derive(Debug, Clone)]
pub enum WeightRule {
    /// Every parameter weighs 1.
    Uniform,
    /// Piecewise-constant depth bands: 1.7 just above the 5700 km radius
    /// boundary, 2.7 below it, 1 elsewhere.
    TransitionZone,
    /// Ray-path sensitivity: weight = sqrt(min(1/s, 4)). Parameters missing
    /// from the table fall back to 1 with a caution on stderr.
    Sensitivity(SensitivityTable),
}

impl WeightRule {
    /// Resolve a rule identifier. Sensitivity rules carry data and are built
    /// with [`WeightRule::sensitivity_from_file`] instead.
    pub fn from_name(name: &str) -> Result<WeightRule> {
        match name {
            "uniform" => Ok(WeightRule::Uniform),
            "transition-zone" => Ok(WeightRule::TransitionZone),
            _ => Err(InverseError::InvalidArgument(format!(
                "unknown weighting rule '{name}'"
            ))),
        }
    }

    /// Load a sensitivity table from its text format: one line per entry,
    /// `KIND lat lon r value`.
    pub fn sensitivity_from_file(path: &Path) -> Result<WeightRule> {
        let text = fs::read_to_string(path).map_err(|e| InverseError::io(path, e))?;
        let mut table = SensitivityTable::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 5 {
                return Err(InverseError::ParameterFormat {
                    path: path.to_path_buf(),
                    line: index + 1,
                    message: format!("expected 5 fields, got {}", fields.len()),
                });
            }
            let kind = ParameterKind::from_name(fields[0])?;
            let mut values = [0.0; 4];
            for (slot, field) in values.iter_mut().zip(&fields[1..]) {
                *slot = field.parse::<f64>().map_err(|_| InverseError::ParameterFormat {
                    path: path.to_path_buf(),
                    line: index + 1,
                    message: format!("not a number: '{field}'"),
                })?;
            }
            let location = Location::new(values[0], values[1], values[2]);
            table.insert(SensitivityKey::Voxel(kind, location), values[3]);
        }
        Ok(WeightRule::Sensitivity(table))
    }

    /// Evaluate the rule for one parameter.
    pub fn weight_of(&self, parameter: &UnknownParameter) -> f64 {
        match self {
            WeightRule::Uniform => 1.0,
            WeightRule::TransitionZone => {
                let r = parameter.radius();
                if (5700.0..5750.0).contains(&r) {
                    1.7
                } else if r < 5700.0 {
                    2.7
                } else {
                    1.0
                }
            }
            WeightRule::Sensitivity(table) => match table.get(&SensitivityKey::of(parameter)) {
                Some(&s) => (SENSITIVITY_CAP.min(1.0 / s)).sqrt(),
                None => {
                    eprintln!("caution: {parameter} not in sensitivity table, weight 1");
                    1.0
                }
            },
        }
    }
}

/// Weights for a fixed unknown list, computed once.
#[derive(Debug, Clone)]
pub struct ParameterWeights {
    weights: HashMap<UnknownParameter, f64>,
    ordered: Vec<f64>,
}

impl ParameterWeights {
    pub fn new(rule: &WeightRule, unknowns: &[UnknownParameter]) -> Self {
        let ordered: Vec<f64> = unknowns.iter().map(|p| rule.weight_of(p)).collect();
        let weights = unknowns.iter().copied().zip(ordered.iter().copied()).collect();
        Self { weights, ordered }
    }

    pub fn get(&self, parameter: &UnknownParameter) -> Option<f64> {
        self.weights.get(parameter).copied()
    }

    /// Weights in parameter order — the diagonal conditioner fed to
    /// preconditioned and damped solvers.
    pub fn to_vector(&self) -> DVector<f64> {
        DVector::from_vec(self.ordered.clone())
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

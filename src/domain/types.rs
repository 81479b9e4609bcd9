//! Unknown-parameter model.
//!
//! One `UnknownParameter` describes a single scalar component of the model
//! vector `m` in `A^T A · m = A^T d`: a physical quantity kind, where it
//! lives (a radius for 1-D radial parameters, a full position for 3-D voxel
//! parameters), and a weighting scalar (layer thickness or voxel volume).
//!
//! Parameters are immutable once constructed, and their *list order* is the
//! contract: it defines the column order of every matrix and vector in the
//! system and must be preserved between the parameter file and the normal
//! equations.
//!
//! Equality is structural with exact IEEE-754 bit comparison — no epsilon.
//! Duplicates are a user-input problem that gets warned about upstream, never
//! merged silently.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{InverseError, Result};

/// Byte length of one encoded 3-D parameter record.
pub const BINARY_RECORD_LEN: usize = 42;

/// Byte length of the space-padded kind name inside a binary record.
const KIND_NAME_LEN: usize = 10;

/// Physical quantity kind of an unknown.
///
/// Radial (1-D) kinds describe a perturbation of a radially symmetric
/// structure; voxel (3-D) kinds perturb one grid cell. Names follow the
/// upstream partial-derivative naming, so parameter files stay exchangeable
/// with the rest of the toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    // radial (1-D)
    ParA,
    ParC,
    ParF,
    ParL,
    ParN,
    ParQ,
    Par2,
    // voxel (3-D)
    A,
    C,
    F,
    L,
    N,
    Q,
    Mu,
    Lambda,
}

impl ParameterKind {
    pub const ALL: [ParameterKind; 15] = [
        ParameterKind::ParA,
        ParameterKind::ParC,
        ParameterKind::ParF,
        ParameterKind::ParL,
        ParameterKind::ParN,
        ParameterKind::ParQ,
        ParameterKind::Par2,
        ParameterKind::A,
        ParameterKind::C,
        ParameterKind::F,
        ParameterKind::L,
        ParameterKind::N,
        ParameterKind::Q,
        ParameterKind::Mu,
        ParameterKind::Lambda,
    ];

    /// Name as written in parameter files and binary records.
    pub fn name(self) -> &'static str {
        match self {
            ParameterKind::ParA => "PARA",
            ParameterKind::ParC => "PARC",
            ParameterKind::ParF => "PARF",
            ParameterKind::ParL => "PARL",
            ParameterKind::ParN => "PARN",
            ParameterKind::ParQ => "PARQ",
            ParameterKind::Par2 => "PAR2",
            ParameterKind::A => "A",
            ParameterKind::C => "C",
            ParameterKind::F => "F",
            ParameterKind::L => "L",
            ParameterKind::N => "N",
            ParameterKind::Q => "Q",
            ParameterKind::Mu => "MU",
            ParameterKind::Lambda => "LAMBDA",
        }
    }

    /// Parse a kind name as found in parameter files.
    ///
    /// `TIME` partials exist upstream but are not invertible unknowns, so
    /// they are rejected here alongside unknown names.
    pub fn from_name(name: &str) -> Result<ParameterKind> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == name)
            .ok_or_else(|| {
                InverseError::InvalidArgument(format!("unknown parameter kind '{name}'"))
            })
    }

    /// Radial kinds carry only a radius; voxel kinds carry a full position.
    pub fn is_radial(self) -> bool {
        matches!(
            self,
            ParameterKind::ParA
                | ParameterKind::ParC
                | ParameterKind::ParF
                | ParameterKind::ParL
                | ParameterKind::ParN
                | ParameterKind::ParQ
                | ParameterKind::Par2
        )
    }
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Geographic position of a voxel parameter: latitude, longitude (degrees)
/// and radius (km).
#[derive(Debug, Clone, Copy)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub radius: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, radius: f64) -> Self {
        Self {
            latitude,
            longitude,
            radius,
        }
    }
}

// Bit-exact equality so positions can key hash maps. Two locations written
// with the same decimal text always compare equal; near-misses never do.
impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.latitude.to_bits() == other.latitude.to_bits()
            && self.longitude.to_bits() == other.longitude.to_bits()
            && self.radius.to_bits() == other.radius.to_bits()
    }
}

impl Eq for Location {}

impl Hash for Location {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.latitude.to_bits().hash(state);
        self.longitude.to_bits().hash(state);
        self.radius.to_bits().hash(state);
    }
}

/// One scalar unknown of the model vector.
#[derive(Debug, Clone, Copy)]
pub enum UnknownParameter {
    /// 1-D radial perturbation; `weighting` is the layer thickness.
    Radial1D {
        kind: ParameterKind,
        radius: f64,
        weighting: f64,
    },
    /// 3-D voxel perturbation; `weighting` is the voxel volume.
    Voxel3D {
        kind: ParameterKind,
        location: Location,
        weighting: f64,
    },
}

impl UnknownParameter {
    pub fn radial(kind: ParameterKind, radius: f64, weighting: f64) -> Result<Self> {
        if !kind.is_radial() {
            return Err(InverseError::InvalidArgument(format!(
                "kind {kind} is volumetric, expected a radial kind"
            )));
        }
        Ok(UnknownParameter::Radial1D {
            kind,
            radius,
            weighting,
        })
    }

    pub fn voxel(kind: ParameterKind, location: Location, weighting: f64) -> Result<Self> {
        if kind.is_radial() {
            return Err(InverseError::InvalidArgument(format!(
                "kind {kind} is radial, expected a volumetric kind"
            )));
        }
        Ok(UnknownParameter::Voxel3D {
            kind,
            location,
            weighting,
        })
    }

    pub fn kind(&self) -> ParameterKind {
        match *self {
            UnknownParameter::Radial1D { kind, .. } => kind,
            UnknownParameter::Voxel3D { kind, .. } => kind,
        }
    }

    /// Radius (km) — defined for both variants.
    pub fn radius(&self) -> f64 {
        match *self {
            UnknownParameter::Radial1D { radius, .. } => radius,
            UnknownParameter::Voxel3D { location, .. } => location.radius,
        }
    }

    /// Full position; `None` for radial parameters.
    pub fn location(&self) -> Option<Location> {
        match *self {
            UnknownParameter::Radial1D { .. } => None,
            UnknownParameter::Voxel3D { location, .. } => Some(location),
        }
    }

    pub fn weighting(&self) -> f64 {
        match *self {
            UnknownParameter::Radial1D { weighting, .. } => weighting,
            UnknownParameter::Voxel3D { weighting, .. } => weighting,
        }
    }

    /// Encode a 3-D parameter into its fixed 42-byte record:
    /// 10 bytes space-padded kind name, then latitude, longitude, radius and
    /// weighting as big-endian IEEE-754 doubles.
    ///
    /// Radial parameters have no binary form.
    pub fn to_bytes(&self) -> Result<[u8; BINARY_RECORD_LEN]> {
        let UnknownParameter::Voxel3D {
            kind,
            location,
            weighting,
        } = *self
        else {
            return Err(InverseError::Unsupported(
                "binary records exist only for 3-D parameters".to_string(),
            ));
        };

        let mut bytes = [b' '; BINARY_RECORD_LEN];
        bytes[..kind.name().len()].copy_from_slice(kind.name().as_bytes());
        bytes[10..18].copy_from_slice(&location.latitude.to_be_bytes());
        bytes[18..26].copy_from_slice(&location.longitude.to_be_bytes());
        bytes[26..34].copy_from_slice(&location.radius.to_be_bytes());
        bytes[34..42].copy_from_slice(&weighting.to_be_bytes());
        Ok(bytes)
    }

    /// Decode a 42-byte record written by [`UnknownParameter::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != BINARY_RECORD_LEN {
            return Err(InverseError::InvalidArgument(format!(
                "binary parameter record must be {BINARY_RECORD_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let name = std::str::from_utf8(&bytes[..KIND_NAME_LEN])
            .map_err(|_| {
                InverseError::InvalidArgument(
                    "binary record kind name is not valid UTF-8".to_string(),
                )
            })?
            .trim_end();
        let kind = ParameterKind::from_name(name)?;
        if kind.is_radial() {
            return Err(InverseError::InvalidArgument(format!(
                "binary record holds radial kind {kind}, expected a volumetric kind"
            )));
        }

        let read = |range: std::ops::Range<usize>| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[range]);
            f64::from_be_bytes(buf)
        };
        Ok(UnknownParameter::Voxel3D {
            kind,
            location: Location::new(read(10..18), read(18..26), read(26..34)),
            weighting: read(34..42),
        })
    }
}

// Structural equality over (kind, position, weighting), bit-exact on floats.
impl PartialEq for UnknownParameter {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                UnknownParameter::Radial1D {
                    kind: ka,
                    radius: ra,
                    weighting: wa,
                },
                UnknownParameter::Radial1D {
                    kind: kb,
                    radius: rb,
                    weighting: wb,
                },
            ) => ka == kb && ra.to_bits() == rb.to_bits() && wa.to_bits() == wb.to_bits(),
            (
                UnknownParameter::Voxel3D {
                    kind: ka,
                    location: la,
                    weighting: wa,
                },
                UnknownParameter::Voxel3D {
                    kind: kb,
                    location: lb,
                    weighting: wb,
                },
            ) => ka == kb && la == lb && wa.to_bits() == wb.to_bits(),
            _ => false,
        }
    }
}

impl Eq for UnknownParameter {}

impl Hash for UnknownParameter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match *self {
            UnknownParameter::Radial1D {
                kind,
                radius,
                weighting,
            } => {
                kind.hash(state);
                radius.to_bits().hash(state);
                weighting.to_bits().hash(state);
            }
            UnknownParameter::Voxel3D {
                kind,
                location,
                weighting,
            } => {
                kind.hash(state);
                location.hash(state);
                weighting.to_bits().hash(state);
            }
        }
    }
}

// Renders the parameter-file line format.
impl fmt::Display for UnknownParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            UnknownParameter::Radial1D {
                kind,
                radius,
                weighting,
            } => write!(f, "{kind} {radius} {weighting}"),
            UnknownParameter::Voxel3D {
                kind,
                location,
                weighting,
            } => write!(
                f,
                "{kind} {} {} {} {weighting}",
                location.latitude, location.longitude, location.radius
            ),
        }
    }
}

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unknown value `{value}` for option `{option}`")]
    UnknownValue { option: String, value: String },
    #[error("unknown option `{0}`")]
    UnknownOption(String),
    #[error("option `{option}` expects a number, got `{value}`")]
    NotANumber { option: String, value: String },
    #[error("marker `{0}` has no boundary condition")]
    MissingMarker(String),
    #[error("marker `{0}` is defined twice")]
    DuplicateMarker(String),
    #[error("invalid parameter `{parameter}` on marker `{marker}`: {reason}")]
    InvalidMarker {
        marker: String,
        parameter: &'static str,
        reason: &'static str,
    },
    #[error("invalid value for `{0}`: {1}")]
    InvalidValue(&'static str, &'static str),
    #[error("{0}")]
    Inconsistent(&'static str),
    #[error("GAMMA_VALUE must exceed one, got {0}")]
    Gamma(f64),
    #[error("GAS_CONSTANT must be positive, got {0}")]
    GasConstant(f64),
    #[error("PRANDTL_LAM must be positive, got {0}")]
    PrandtlLaminar(f64),
    #[error("PRANDTL_TURB must be positive, got {0}")]
    PrandtlTurbulent(f64),
    #[error("REF_AREA must be positive, got {0}")]
    ReferenceArea(f64),
    #[error("REF_LENGTH_MOMENT must be positive, got {0}")]
    ReferenceLength(f64),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("point index {index} out of range (0..{len})")]
    PointOutOfRange { index: usize, len: usize },
    #[error("edge {0} connects a point to itself")]
    DegenerateEdge(usize),
    #[error("point {0} has a non-positive volume")]
    NonPositiveVolume(usize),
    #[error("marker tag `{0}` appears twice")]
    DuplicateMarker(String),
    #[error("duplicate global index {0}")]
    DuplicateGlobalIndex(usize),
    #[error("only 2D and 3D grids are supported, got {0}D")]
    Dimension(usize),
    #[error("halo link to rank {0} has a receive list containing a domain point")]
    HaloReceivesDomainPoint(usize),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommError {
    #[error("rank {0} is disconnected")]
    Disconnected(usize),
    #[error("rank {0} out of range (size {1})")]
    InvalidRank(usize, usize),
    #[error("expected {expected} values from rank {rank}, got {got}")]
    LengthMismatch {
        rank: usize,
        expected: usize,
        got: usize,
    },
}

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("configuration error")]
    Config(#[from] ConfigError),
    #[error("geometry error")]
    Geometry(#[from] GeometryError),
    #[error("communication error")]
    Comm(#[from] CommError),
    #[error("restart error at line {line}: {reason}")]
    Restart { line: usize, reason: String },
    #[error("{count} non-physical points after update")]
    NonPhysical { count: usize },
    #[error("singular block in row {0}")]
    SingularBlock(usize),
    #[error("output error")]
    Io(#[from] std::io::Error),
}

impl SolverError {
    pub(crate) fn restart(line: usize, reason: impl Into<String>) -> Self {
        SolverError::Restart {
            line,
            reason: reason.into(),
        }
    }
}

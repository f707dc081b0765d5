//! Vertex-centred finite-volume solvers for compressible flow: Euler,
//! Navier-Stokes and RANS with the Spalart-Allmaras or Menter SST closures.

pub mod comm;
pub mod config;
pub mod driver;
pub mod error;
pub mod faer_add;
pub mod freestream;
pub mod geometry;
pub mod halo;
pub mod linsys;
pub mod mesh;
pub mod numerics;
pub mod solver;
pub mod variable;

pub use comm::{ChannelComm, Communicator, SerialComm};
pub use config::{
    BoundaryKind, Config, OptionRegistry, PathologyPolicy, SolverKind, TurbulenceModel,
};
pub use driver::{
    Driver, DriverReport, HistoryEntry, HistoryRecorder, Logger, ObsCtx, Observer, RestartWriter,
    Zone,
};
pub use error::{CommError, ConfigError, GeometryError, SolverError};
pub use freestream::{FluidModel, FreeStream};
pub use geometry::{Geometry, GeometryBuilder, Marker, Vertex};
pub use mesh::{Grid, RectangularMesh};
pub use solver::{Solver, StepContext};
pub use variable::{FlowIndex, VariableStore};

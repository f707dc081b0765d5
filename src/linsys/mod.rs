//! Block-sparse linear systems laid out on the grid connectivity, and the
//! iterative solvers used by implicit time integration.

pub mod krylov;
pub mod matrix;
pub mod precond;
pub mod vector;

pub use krylov::{LinearSolveReport, LinearSystemSolver};
pub use matrix::{gauss_elimination, invert_block, BlockMatrix};
pub use precond::{JacobiPreconditioner, LuSgsPreconditioner, Preconditioner};
pub use vector::SysVector;

use crate::{comm::Communicator, geometry::Geometry, halo::VectorLayout};

/// What a distributed vector operation needs to reach the other ranks.
#[derive(Clone, Copy)]
pub struct HaloContext<'a> {
    pub geometry: &'a Geometry,
    pub comm: &'a dyn Communicator,
    pub layout: &'a VectorLayout,
}

//! State and bookkeeping shared by every solver: the variable store, the
//! residual and Jacobian containers, convergence monitoring, pseudo-time
//! updates and halo synchronization.

use faer::Mat;

use crate::{
    comm::Communicator,
    config::{BoundaryKind, Config},
    error::{CommError, ConfigError, SolverError},
    geometry::Geometry,
    halo::{self, PointSlab, VectorLayout},
    linsys::{BlockMatrix, HaloContext, LinearSolveReport, LinearSystemSolver, SysVector},
    numerics::FluxOutput,
    solver::residual::ResidualMonitor,
    variable::{ScalarField, VariableStore},
};

/// How the per-point records rotate across periodic halo links.
#[derive(Clone, Debug, Default)]
pub struct HaloLayouts {
    pub solution: VectorLayout,
    pub primitive: VectorLayout,
    pub gradient: VectorLayout,
}

pub struct SolverCore {
    n_dim: usize,
    n_var: usize,
    pub(crate) nodes: VariableStore,
    pub(crate) jacobian: BlockMatrix,
    pub(crate) lin_sys_res: SysVector,
    pub(crate) lin_sys_sol: SysVector,
    pub(crate) monitor: ResidualMonitor,
    linear_solver: LinearSystemSolver,
    layouts: HaloLayouts,
    marker_kinds: Vec<BoundaryKind>,
    /// Neighbour counts, made consistent on halo points.
    neighbor_count: Vec<usize>,
    last_linear: Option<LinearSolveReport>,
    min_delta_time: f64,
    max_delta_time: f64,
    implicit: bool,
    relaxation: f64,
}

impl SolverCore {
    /// Fails with [`ConfigError::MissingMarker`] when a geometry marker has
    /// no boundary condition.
    pub fn new(
        geometry: &Geometry,
        config: &Config,
        comm: &dyn Communicator,
        nodes: VariableStore,
        layouts: HaloLayouts,
        relaxation: f64,
    ) -> Result<Self, SolverError> {
        let n_var = nodes.n_var();
        let n_point = geometry.n_point();
        let marker_kinds = geometry
            .markers()
            .iter()
            .map(|m| {
                config
                    .marker(m.tag())
                    .map(|c| c.kind)
                    .ok_or_else(|| ConfigError::MissingMarker(m.tag().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut counts: Vec<f64> = (0..n_point).map(|i| geometry.n_neighbors(i) as f64).collect();
        let mut slab = PointSlab::new(&mut counts, 1);
        halo::exchange(geometry, comm, &mut slab, &VectorLayout::scalar())?;

        Ok(Self {
            n_dim: geometry.n_dim(),
            n_var,
            nodes,
            jacobian: BlockMatrix::from_geometry(geometry, n_var),
            lin_sys_res: SysVector::new(n_point, geometry.n_point_domain(), n_var),
            lin_sys_sol: SysVector::new(n_point, geometry.n_point_domain(), n_var),
            monitor: ResidualMonitor::new(n_var),
            linear_solver: LinearSystemSolver::from_config(&config.linear),
            layouts,
            marker_kinds,
            neighbor_count: counts.into_iter().map(|c| c as usize).collect(),
            last_linear: None,
            min_delta_time: 0.0,
            max_delta_time: 0.0,
            implicit: config.is_implicit(),
            relaxation,
        })
    }

    pub fn n_dim(&self) -> usize {
        self.n_dim
    }

    pub fn n_var(&self) -> usize {
        self.n_var
    }

    pub fn nodes(&self) -> &VariableStore {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut VariableStore {
        &mut self.nodes
    }

    pub fn monitor(&self) -> &ResidualMonitor {
        &self.monitor
    }

    pub fn residual(&self, i: usize) -> Vec<f64> {
        self.lin_sys_res.block_to_vec(i)
    }

    pub fn jacobian(&self) -> &BlockMatrix {
        &self.jacobian
    }

    pub fn marker_kinds(&self) -> &[BoundaryKind] {
        &self.marker_kinds
    }

    pub fn neighbor_count(&self, i: usize) -> usize {
        self.neighbor_count[i]
    }

    pub fn is_implicit(&self) -> bool {
        self.implicit
    }

    pub fn last_linear_solve(&self) -> Option<&LinearSolveReport> {
        self.last_linear.as_ref()
    }

    pub fn min_delta_time(&self) -> f64 {
        self.min_delta_time
    }

    pub fn max_delta_time(&self) -> f64 {
        self.max_delta_time
    }

    pub fn layouts(&self) -> &HaloLayouts {
        &self.layouts
    }

    /// Zeroes the residual and, for implicit runs, the Jacobian.
    pub fn clear_residual(&mut self) {
        self.lin_sys_res.set_zero();
        if self.implicit {
            self.jacobian.set_zero();
        }
    }

    /// Flux leaving `i` through an interior face: added at `i`, subtracted
    /// at `j`.
    pub(crate) fn add_edge_flux(&mut self, i: usize, j: usize, out: &FluxOutput) {
        self.lin_sys_res.add_block(i, &out.residual);
        self.lin_sys_res.sub_block(j, &out.residual);
        if self.implicit {
            let (ji, jj) = (out.jacobian_i.as_ref(), out.jacobian_j.as_ref());
            self.jacobian.add_block(i, i, ji);
            self.jacobian.add_block(i, j, jj);
            self.jacobian.sub_block(j, i, ji);
            self.jacobian.sub_block(j, j, jj);
        }
    }

    /// Diffusive flux entering `i`: the opposite sign of
    /// [`SolverCore::add_edge_flux`].
    pub(crate) fn sub_edge_flux(&mut self, i: usize, j: usize, out: &FluxOutput) {
        self.lin_sys_res.sub_block(i, &out.residual);
        self.lin_sys_res.add_block(j, &out.residual);
        if self.implicit {
            let (ji, jj) = (out.jacobian_i.as_ref(), out.jacobian_j.as_ref());
            self.jacobian.sub_block(i, i, ji);
            self.jacobian.sub_block(i, j, jj);
            self.jacobian.add_block(j, i, ji);
            self.jacobian.add_block(j, j, jj);
        }
    }

    /// Flux leaving the domain through a boundary face of `i`.
    pub(crate) fn add_boundary_flux(&mut self, i: usize, out: &FluxOutput) {
        self.lin_sys_res.add_block(i, &out.residual);
        if self.implicit {
            self.jacobian.add_block(i, i, out.jacobian_i.as_ref());
        }
    }

    /// Diffusive flux entering through a boundary face of `i`.
    pub(crate) fn sub_boundary_flux(&mut self, i: usize, out: &FluxOutput) {
        self.lin_sys_res.sub_block(i, &out.residual);
        if self.implicit {
            self.jacobian.sub_block(i, i, out.jacobian_i.as_ref());
        }
    }

    /// Volume source of point `i`.
    pub(crate) fn sub_source(&mut self, i: usize, out: &FluxOutput) {
        self.lin_sys_res.sub_block(i, &out.residual);
        if self.implicit {
            self.jacobian.sub_block(i, i, out.jacobian_i.as_ref());
        }
    }

    pub(crate) fn add_residual(&mut self, i: usize, var: usize, value: f64) {
        let r = self.lin_sys_res.get(i, var);
        self.lin_sys_res.set(i, var, r + value);
    }

    pub(crate) fn add_jacobian(&mut self, i: usize, j: usize, block: &Mat<f64>) {
        if self.implicit {
            self.jacobian.add_block(i, j, block.as_ref());
        }
    }

    /// Imposes `values[(var, value)]` at point `i`: both solution copies are
    /// overwritten, the residual entry is zeroed and the Jacobian row becomes
    /// the identity.
    pub(crate) fn set_strong(&mut self, i: usize, values: &[(usize, f64)]) {
        for &(var, value) in values {
            self.nodes.solution_mut(i)[var] = value;
            self.nodes.solution_old_mut(i)[var] = value;
            self.lin_sys_res.set(i, var, 0.0);
            if self.implicit {
                self.jacobian.delete_row(i, var);
            }
        }
    }

    /// Accumulates RMS and maximum residuals of the owned points and reduces
    /// them across ranks.
    pub fn compute_residual_monitor(
        &mut self,
        geometry: &Geometry,
        comm: &dyn Communicator,
    ) -> Result<(), CommError> {
        self.monitor.reset();
        for i in 0..geometry.n_point_domain() {
            let gid = geometry.point(i).global_index();
            for var in 0..self.n_var {
                let r = self.lin_sys_res.get(i, var);
                self.monitor.add_rms(var, r);
                self.monitor.add_max(var, r.abs(), gid, geometry.coord(i));
            }
        }
        self.monitor.reduce(geometry.n_point_domain(), comm)
    }

    /// Smallest and largest local time step of the owned points, over all
    /// ranks.
    pub(crate) fn reduce_time_step_bounds(
        &mut self,
        geometry: &Geometry,
        comm: &dyn Communicator,
    ) -> Result<(), CommError> {
        let mut bounds = [f64::INFINITY, 0.0];
        for i in 0..geometry.n_point_domain() {
            let dt = self.nodes.delta_time(i);
            bounds[0] = bounds[0].min(dt);
            bounds[1] = bounds[1].max(dt);
        }
        let mut min = [bounds[0]];
        let mut max = [bounds[1]];
        comm.all_reduce_min(&mut min)?;
        comm.all_reduce_max(&mut max)?;
        self.min_delta_time = min[0];
        self.max_delta_time = max[0];
        Ok(())
    }

    /// `U -= dt / Vol * R` on the owned points.
    pub fn explicit_euler_update(
        &mut self,
        geometry: &Geometry,
        comm: &dyn Communicator,
    ) -> Result<(), SolverError> {
        self.nodes.set_old_solution();
        self.compute_residual_monitor(geometry, comm)?;
        for i in 0..geometry.n_point_domain() {
            let factor = self.nodes.delta_time(i) / geometry.volume(i);
            for var in 0..self.n_var {
                let r = self.lin_sys_res.get(i, var);
                self.nodes.solution_mut(i)[var] -= factor * r;
            }
        }
        Ok(())
    }

    /// Stage `stage` of the low-storage Runge-Kutta scheme,
    /// `U = U_old - alpha_stage dt / Vol * R`.
    pub fn rk_update(
        &mut self,
        geometry: &Geometry,
        comm: &dyn Communicator,
        stage: usize,
        alpha: f64,
    ) -> Result<(), SolverError> {
        if stage == 0 {
            self.nodes.set_old_solution();
        }
        self.compute_residual_monitor(geometry, comm)?;
        for i in 0..geometry.n_point_domain() {
            let factor = alpha * self.nodes.delta_time(i) / geometry.volume(i);
            for var in 0..self.n_var {
                let r = self.lin_sys_res.get(i, var);
                let old = self.nodes.solution_old(i)[var];
                self.nodes.solution_mut(i)[var] = old - factor * r;
            }
        }
        Ok(())
    }

    /// Backward Euler: solves `(Vol/dt I + J) dU = -R` and applies the
    /// relaxed increment. A linear solve that does not converge is logged and
    /// its increment used as is.
    pub fn implicit_update(
        &mut self,
        geometry: &Geometry,
        comm: &dyn Communicator,
    ) -> Result<(), SolverError> {
        self.nodes.set_old_solution();
        self.compute_residual_monitor(geometry, comm)?;

        for i in 0..geometry.n_point_domain() {
            let dt = self.nodes.delta_time(i);
            if dt > 0.0 {
                self.jacobian.add_to_diag(i, geometry.volume(i) / dt);
            }
        }
        self.lin_sys_res.scale(-1.0);
        for i in geometry.n_point_domain()..geometry.n_point() {
            self.lin_sys_res.set_block_zero(i);
        }
        self.lin_sys_sol.set_zero();

        let halo = HaloContext {
            geometry,
            comm,
            layout: &self.layouts.solution,
        };
        let report = self
            .linear_solver
            .solve(&self.jacobian, &self.lin_sys_res, &mut self.lin_sys_sol, &halo)?;
        if !report.converged {
            tracing::warn!(
                iterations = report.iterations,
                residual = report.residual,
                "linear solver did not converge"
            );
        }
        tracing::trace!(iterations = report.iterations, residual = report.residual, "linear solve");
        self.last_linear = Some(report);

        for i in 0..geometry.n_point_domain() {
            for var in 0..self.n_var {
                let dx = self.lin_sys_sol.get(i, var);
                self.nodes.solution_mut(i)[var] += self.relaxation * dx;
            }
        }
        // the residual is reported with its assembled sign
        self.lin_sys_res.scale(-1.0);
        Ok(())
    }

    pub fn set_mpi_solution(
        &mut self,
        geometry: &Geometry,
        comm: &dyn Communicator,
    ) -> Result<(), CommError> {
        halo::exchange(geometry, comm, &mut self.nodes.solution_slab(), &self.layouts.solution)
    }

    pub fn set_mpi_solution_old(
        &mut self,
        geometry: &Geometry,
        comm: &dyn Communicator,
    ) -> Result<(), CommError> {
        halo::exchange(geometry, comm, &mut self.nodes.solution_old_slab(), &self.layouts.solution)
    }

    pub fn set_mpi_primitive(
        &mut self,
        geometry: &Geometry,
        comm: &dyn Communicator,
    ) -> Result<(), CommError> {
        halo::exchange(geometry, comm, &mut self.nodes.primitive_slab(), &self.layouts.primitive)
    }

    pub fn set_mpi_gradient(
        &mut self,
        geometry: &Geometry,
        comm: &dyn Communicator,
    ) -> Result<(), CommError> {
        halo::exchange(geometry, comm, &mut self.nodes.gradient_slab(), &self.layouts.gradient)
    }

    pub fn set_mpi_limiter(
        &mut self,
        geometry: &Geometry,
        comm: &dyn Communicator,
    ) -> Result<(), CommError> {
        halo::exchange(geometry, comm, &mut self.nodes.limiter_slab(), &VectorLayout::scalar())
    }

    pub(crate) fn set_mpi_laplacian(
        &mut self,
        geometry: &Geometry,
        comm: &dyn Communicator,
    ) -> Result<(), CommError> {
        halo::exchange(geometry, comm, &mut self.nodes.laplacian_slab(), &self.layouts.solution)
    }

    pub(crate) fn set_mpi_scalar(
        &mut self,
        geometry: &Geometry,
        comm: &dyn Communicator,
        field: ScalarField,
    ) -> Result<(), CommError> {
        halo::exchange(geometry, comm, &mut self.nodes.scalar_slab(field), &VectorLayout::scalar())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        comm::SerialComm,
        config::BoundaryKind,
        mesh::{Grid, RectangularMesh},
    };
    use approx::assert_relative_eq;

    fn core() -> (Geometry, SolverCore) {
        let geometry =
            RectangularMesh::new(Grid::from_steps(0.0, 1.0, 2), Grid::from_steps(0.0, 1.0, 1))
                .build()
                .unwrap();
        let mut config = Config::euler();
        for tag in ["lower", "right", "upper", "left"] {
            config = config.with_marker(tag, BoundaryKind::FarField);
        }
        let nodes = VariableStore::new(geometry.n_point(), 2, 1, 1, &[1.0]);
        let comm = SerialComm::new();
        let core =
            SolverCore::new(&geometry, &config, &comm, nodes, HaloLayouts::default(), 1.0).unwrap();
        (geometry, core)
    }

    #[test]
    fn missing_marker_is_a_configuration_error() {
        let geometry =
            RectangularMesh::new(Grid::from_steps(0.0, 1.0, 1), Grid::from_steps(0.0, 1.0, 1))
                .build()
                .unwrap();
        let config = Config::euler().with_marker("lower", BoundaryKind::EulerWall);
        let nodes = VariableStore::new(geometry.n_point(), 2, 1, 1, &[1.0]);
        let comm = SerialComm::new();
        let err = SolverCore::new(&geometry, &config, &comm, nodes, HaloLayouts::default(), 1.0)
            .err()
            .unwrap();
        assert!(matches!(err, SolverError::Config(ConfigError::MissingMarker(_))));
    }

    #[test]
    fn edge_flux_is_antisymmetric() {
        let (_, mut core) = core();
        let mut out = FluxOutput::new(1);
        out.residual[0] = 0.75;
        core.add_edge_flux(0, 1, &out);
        assert_eq!(core.residual(0), vec![0.75]);
        assert_eq!(core.residual(1), vec![-0.75]);
        core.sub_edge_flux(0, 1, &out);
        assert_eq!(core.residual(0), vec![0.0]);
        assert_eq!(core.residual(1), vec![0.0]);
    }

    #[test]
    fn explicit_update_follows_the_residual() {
        let (geometry, mut core) = core();
        for i in 0..geometry.n_point() {
            core.nodes.set_delta_time(i, 0.1);
        }
        core.add_residual(0, 0, 2.0);
        core.explicit_euler_update(&geometry, &SerialComm::new()).unwrap();
        let expected = 1.0 - 0.1 / geometry.volume(0) * 2.0;
        assert_relative_eq!(core.nodes().solution(0)[0], expected);
        assert_eq!(core.nodes().solution(1)[0], 1.0);
        assert_eq!(core.nodes().solution_old(0)[0], 1.0);
        assert_eq!(core.monitor().max(0).point, geometry.point(0).global_index());
    }

    #[test]
    fn strong_values_survive_the_update() {
        let (geometry, mut core) = core();
        for i in 0..geometry.n_point() {
            core.nodes.set_delta_time(i, 0.1);
        }
        core.add_residual(2, 0, 5.0);
        core.set_strong(2, &[(0, 0.25)]);
        core.explicit_euler_update(&geometry, &SerialComm::new()).unwrap();
        assert_eq!(core.nodes().solution(2)[0], 0.25);
    }
}

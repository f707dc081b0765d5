//! Compressible viscous flow: the Euler solver plus the average-gradient
//! diffusive flux and the no-slip walls.

use faer::Mat;

use crate::{
    comm::Communicator,
    config::{BoundaryKind, Config, ViscousScheme},
    error::SolverError,
    geometry::{norm, Geometry},
    numerics::{temperature_derivative, AvgGradFlow, ViscousEdge, ViscousNumerics},
    solver::{
        base::SolverCore,
        euler::{flow_field_names, EulerSolver},
        forces::ForceReport,
        BoundaryConditionSet, ConvectiveFluxProvider, Solver, StepContext, ViscousFluxProvider,
    },
};

pub struct NsSolver {
    euler: EulerSolver,
    viscous: AvgGradFlow,
}

impl NsSolver {
    pub fn new(
        geometry: &Geometry,
        config: &Config,
        comm: &dyn Communicator,
    ) -> Result<Self, SolverError> {
        let euler = EulerSolver::new(geometry, config, comm)?;
        let corrected = config.flow_numerics.viscous == ViscousScheme::AvgGradCorrected;
        let viscous = AvgGradFlow::new(geometry.n_dim(), euler.free_stream.fluid, corrected);
        tracing::info!(
            scheme = viscous.name(),
            reynolds = config.free_stream.reynolds,
            "viscous terms enabled"
        );
        Ok(Self { euler, viscous })
    }

    pub fn euler(&self) -> &EulerSolver {
        &self.euler
    }

    pub fn forces(&self) -> &ForceReport {
        self.euler.forces()
    }

    /// Shear stress, skin friction, heat flux and `y+` on the no-slip walls.
    pub fn viscous_forces(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        self.euler.viscous_forces(ctx)
    }

    /// Points of the wall marker with their vertex normal and normal
    /// neighbour, owned points only.
    fn wall_vertices(ctx: &StepContext<'_>, marker: usize) -> Vec<(usize, usize, f64)> {
        let n_dim = ctx.geometry.n_dim();
        ctx.geometry.markers()[marker]
            .vertices()
            .iter()
            .filter(|v| ctx.geometry.is_domain(v.point()))
            .map(|v| (v.point(), v.normal_neighbor(), norm(&v.normal()[..n_dim])))
            .collect()
    }

    fn no_slip(&mut self, i: usize) {
        let n_dim = self.euler.index.n_dim();
        let zero: Vec<(usize, f64)> = (1..=n_dim).map(|var| (var, 0.0)).collect();
        self.euler.core.set_strong(i, &zero);
    }

    /// No-slip wall at fixed temperature. The wall heat flux uses the
    /// temperature of the first point off the wall.
    pub fn bc_isothermal_wall(
        &mut self,
        ctx: &StepContext<'_>,
        marker: usize,
        temperature: f64,
    ) -> Result<(), SolverError> {
        let f = self.euler.index;
        let n_dim = f.n_dim();
        let fluid = self.euler.free_stream.fluid;
        let t_wall = self.euler.free_stream.nondim_temperature(temperature);
        let implicit = self.euler.core.is_implicit();
        let mut jac = Mat::<f64>::zeros(f.n_var(), f.n_var());

        for (i, nn, area) in Self::wall_vertices(ctx, marker) {
            self.no_slip(i);
            let dist = norm(
                &ctx.geometry
                    .coord(nn)
                    .iter()
                    .zip(ctx.geometry.coord(i))
                    .map(|(a, b)| a - b)
                    .collect::<Vec<_>>(),
            );
            if dist == 0.0 {
                continue;
            }
            let prim_i = self.euler.core.nodes.primitive(i);
            let k = fluid.thermal_conductivity(prim_i[f.mu_lam()], prim_i[f.mu_turb()]);
            let prim_nn = self.euler.core.nodes.primitive(nn);
            let coeff = k * area / dist;
            let heat_in = coeff * (t_wall - prim_nn[f.temperature()]);
            if implicit {
                let dt = temperature_derivative(prim_nn, n_dim, fluid.gamma, fluid.gas_constant);
                for (c, d) in dt.iter().enumerate() {
                    jac.write(f.energy(), c, coeff * d);
                }
                self.euler.core.add_jacobian(i, nn, &jac);
            }
            self.euler.core.add_residual(i, f.energy(), -heat_in);
        }
        Ok(())
    }

    /// No-slip wall with a prescribed heat flux into the fluid.
    pub fn bc_heat_flux_wall(
        &mut self,
        ctx: &StepContext<'_>,
        marker: usize,
        heat_flux: f64,
    ) -> Result<(), SolverError> {
        let energy = self.euler.index.energy();
        let q_wall = self.euler.free_stream.nondim_heat_flux(heat_flux);
        for (i, _, area) in Self::wall_vertices(ctx, marker) {
            self.no_slip(i);
            self.euler.core.add_residual(i, energy, -q_wall * area);
        }
        Ok(())
    }
}

impl ConvectiveFluxProvider for NsSolver {
    fn convective_residual(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        self.euler.convective_residual(ctx)
    }
}

impl ViscousFluxProvider for NsSolver {
    fn viscous_residual(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        let geometry = ctx.geometry;
        let core = &mut self.euler.core;
        let implicit = core.is_implicit();
        for (e, edge) in geometry.edges().iter().enumerate() {
            let [i, j] = edge.nodes();
            let nodes = &core.nodes;
            let out = self.viscous.compute(
                &ViscousEdge {
                    normal: geometry.edge_normal(e),
                    coord_i: geometry.coord(i),
                    coord_j: geometry.coord(j),
                    prim_i: nodes.primitive(i),
                    prim_j: nodes.primitive(j),
                    grad_i: nodes.gradient(i),
                    grad_j: nodes.gradient(j),
                    scalar_i: &[],
                    scalar_j: &[],
                    scalar_grad_i: &[],
                    scalar_grad_j: &[],
                    f1_i: 0.0,
                    f1_j: 0.0,
                },
                implicit,
            );
            core.sub_edge_flux(i, j, out);
        }
        Ok(())
    }
}

impl BoundaryConditionSet for NsSolver {
    fn boundary_residual(
        &mut self,
        ctx: &StepContext<'_>,
        marker: usize,
    ) -> Result<(), SolverError> {
        match self.euler.core.marker_kinds()[marker] {
            BoundaryKind::Isothermal { temperature } => {
                self.bc_isothermal_wall(ctx, marker, temperature)
            }
            BoundaryKind::HeatFlux { heat_flux } => self.bc_heat_flux_wall(ctx, marker, heat_flux),
            _ => self.euler.boundary_residual(ctx, marker),
        }
    }
}

impl Solver for NsSolver {
    fn name(&self) -> &'static str {
        "Navier-Stokes"
    }

    fn core(&self) -> &SolverCore {
        &self.euler.core
    }

    fn core_mut(&mut self) -> &mut SolverCore {
        &mut self.euler.core
    }

    fn as_viscous(&mut self) -> Option<&mut dyn ViscousFluxProvider> {
        Some(self)
    }

    fn forces(&self) -> Option<&ForceReport> {
        Some(self.euler.forces())
    }

    fn preprocessing(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        self.euler.preprocess_flow(ctx)
    }

    fn set_time_step(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        self.euler.compute_time_step(ctx)
    }

    fn finalize_update(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        self.euler.check_solution(ctx)
    }

    fn postprocessing(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        self.euler.inviscid_forces(ctx)?;
        self.viscous_forces(ctx)
    }

    fn field_names(&self, n_dim: usize) -> Vec<String> {
        flow_field_names(n_dim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        comm::SerialComm,
        config::{BoundaryKind, TimeIntegration},
        mesh::{Grid, RectangularMesh},
    };
    use approx::assert_relative_eq;

    fn channel(config: Config) -> (Geometry, Config) {
        let geometry =
            RectangularMesh::new(Grid::from_steps(0.0, 1.0, 4), Grid::from_steps(0.0, 0.5, 4))
                .build()
                .unwrap();
        let config = config
            .with_marker("lower", BoundaryKind::Isothermal { temperature: 288.15 })
            .with_marker("upper", BoundaryKind::FarField)
            .with_marker("left", BoundaryKind::FarField)
            .with_marker("right", BoundaryKind::FarField);
        (geometry, config)
    }

    #[test]
    fn uniform_flow_has_no_viscous_flux() {
        let (geometry, config) = channel(Config::navier_stokes().with_mach(0.2));
        let comm = SerialComm::new();
        let mut solver = NsSolver::new(&geometry, &config, &comm).unwrap();
        let ctx = StepContext::new(&geometry, &config, &comm);
        solver.preprocessing(&ctx).unwrap();
        solver.viscous_residual(&ctx).unwrap();
        for i in 0..geometry.n_point() {
            assert!(solver.core().residual(i).iter().all(|r| r.abs() < 1e-12));
        }
    }

    #[test]
    fn no_slip_wall_survives_an_update() {
        let (geometry, config) = channel(
            Config::navier_stokes()
                .with_mach(0.2)
                .with_time_integration(TimeIntegration::EulerImplicit, 2.0),
        );
        let comm = SerialComm::new();
        let mut solver = NsSolver::new(&geometry, &config, &comm).unwrap();
        let ctx = StepContext::new(&geometry, &config, &comm);
        solver.preprocessing(&ctx).unwrap();
        solver.set_time_step(&ctx).unwrap();
        solver.assemble(&ctx).unwrap();
        solver.update(&ctx).unwrap();
        let lower = geometry.marker_index("lower").unwrap();
        for v in geometry.markers()[lower].vertices() {
            let u = solver.core().nodes().solution(v.point());
            assert_eq!(u[1], 0.0);
            assert_eq!(u[2], 0.0);
        }
    }

    #[test]
    fn wall_at_free_stream_temperature_exchanges_no_heat() {
        let (geometry, config) = channel(Config::navier_stokes().with_mach(0.2));
        let comm = SerialComm::new();
        let mut solver = NsSolver::new(&geometry, &config, &comm).unwrap();
        let ctx = StepContext::new(&geometry, &config, &comm);
        solver.preprocessing(&ctx).unwrap();
        let lower = geometry.marker_index("lower").unwrap();
        solver.boundary_residual(&ctx, lower).unwrap();
        let energy = solver.euler().index.energy();
        for v in geometry.markers()[lower].vertices() {
            assert_relative_eq!(solver.core().residual(v.point())[energy], 0.0, epsilon = 1e-12);
        }
    }
}

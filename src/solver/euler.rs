//! Compressible inviscid flow.

use crate::{
    comm::Communicator,
    config::{
        BoundaryKind, Config, ConvectiveScheme, GradientMethod, PathologyPolicy, SpatialOrder,
    },
    error::{ConfigError, SolverError},
    freestream::{FluidModel, FreeStream},
    geometry::{dot, Geometry},
    halo::VectorLayout,
    numerics::{
        CenteredEdge, CenteredNumerics, ConvectiveNumerics, EdgeStates, Jst, LaxFriedrichs, Roe,
    },
    solver::{
        base::{HaloLayouts, SolverCore},
        forces::ForceReport,
        gradient, limiter, BoundaryConditionSet, ConvectiveFluxProvider, Solver, StepContext,
    },
    variable::{FlowIndex, ScalarField, VariableStore},
};

pub(crate) enum FlowConvection {
    Centered(Box<dyn CenteredNumerics>),
    Upwind(Box<dyn ConvectiveNumerics>),
}

impl FlowConvection {
    fn from_config(config: &Config, n_dim: usize, gamma: f64) -> Result<Self, ConfigError> {
        let num = &config.flow_numerics;
        Ok(match num.convective {
            ConvectiveScheme::Jst => {
                FlowConvection::Centered(Box::new(Jst::new(n_dim, gamma, num.jst_k2, num.jst_k4)))
            }
            ConvectiveScheme::LaxFriedrichs => {
                FlowConvection::Centered(Box::new(LaxFriedrichs::new(n_dim, gamma, num.lax_k0)))
            }
            ConvectiveScheme::Roe => {
                FlowConvection::Upwind(Box::new(Roe::new(n_dim, gamma, num.entropy_fix)))
            }
            ConvectiveScheme::ScalarUpwind => {
                return Err(ConfigError::Inconsistent(
                    "SCALAR_UPWIND is only available for turbulence transport",
                ))
            }
        })
    }

    fn name(&self) -> &'static str {
        match self {
            FlowConvection::Centered(n) => n.name(),
            FlowConvection::Upwind(n) => n.name(),
        }
    }
}

pub struct EulerSolver {
    pub(crate) core: SolverCore,
    pub(crate) free_stream: FreeStream,
    pub(crate) index: FlowIndex,
    pub(crate) viscous: bool,
    pub(crate) convection: FlowConvection,
    /// Riemann solver of the weak boundary conditions.
    pub(crate) boundary: Roe,
    pub(crate) forces: ForceReport,
    /// Points on a physical marker.
    on_boundary: Vec<bool>,
    order: SpatialOrder,
    pathology: PathologyPolicy,
    non_physical: usize,
    recon_i: Vec<f64>,
    recon_j: Vec<f64>,
}

impl EulerSolver {
    pub fn new(
        geometry: &Geometry,
        config: &Config,
        comm: &dyn Communicator,
    ) -> Result<Self, SolverError> {
        let n_dim = geometry.n_dim();
        let index = FlowIndex::new(n_dim);
        let free_stream = FreeStream::from_config(config, n_dim);
        let nodes = VariableStore::new(
            geometry.n_point(),
            n_dim,
            index.n_prim(),
            index.n_grad(),
            &free_stream.conservative(),
        );
        let layouts = HaloLayouts {
            solution: VectorLayout::momentum(),
            primitive: VectorLayout::scalar().with_vector(index.velocity(0), 1),
            gradient: VectorLayout::gradient(index.n_grad(), n_dim, Some(index.velocity(0))),
        };
        let core = SolverCore::new(geometry, config, comm, nodes, layouts, 1.0)?;
        let gamma = free_stream.fluid.gamma;
        let convection = FlowConvection::from_config(config, n_dim, gamma)?;

        let mut on_boundary = vec![false; geometry.n_point()];
        for (marker, kind) in geometry.markers().iter().zip(core.marker_kinds()) {
            if kind.is_physical() {
                for v in marker.vertices() {
                    on_boundary[v.point()] = true;
                }
            }
        }

        let forces = ForceReport::new(geometry, config);
        let mut solver = Self {
            core,
            index,
            viscous: config.solver.is_viscous(),
            convection,
            boundary: Roe::new(n_dim, gamma, config.flow_numerics.entropy_fix),
            forces,
            on_boundary,
            order: config.flow_numerics.spatial_order,
            pathology: config.pathology,
            non_physical: 0,
            recon_i: vec![0.0; index.n_prim()],
            recon_j: vec![0.0; index.n_prim()],
            free_stream,
        };
        solver.set_primitive_variables(None);

        tracing::info!(
            solver = solver.name(),
            n_var = index.n_var(),
            n_point = geometry.n_point(),
            scheme = solver.convection.name(),
            "flow solver ready"
        );
        Ok(solver)
    }

    pub fn free_stream(&self) -> &FreeStream {
        &self.free_stream
    }

    pub fn fluid(&self) -> &FluidModel {
        &self.free_stream.fluid
    }

    pub fn forces(&self) -> &ForceReport {
        &self.forces
    }

    /// Owned points whose conservative state was rejected at the last
    /// preprocessing.
    pub fn non_physical_points(&self) -> usize {
        self.non_physical
    }

    fn needs_gradients(&self) -> bool {
        let upwind = matches!(self.convection, FlowConvection::Upwind(_));
        (upwind && self.order != SpatialOrder::First) || self.viscous
    }

    /// Primitive records of every point, with the eddy viscosity taken from
    /// the turbulence primitives. A rejected point keeps its previous record
    /// and is flagged.
    pub(crate) fn set_primitive_variables(&mut self, turbulence: Option<&VariableStore>) -> usize {
        let fluid = self.free_stream.fluid;
        let viscous = self.viscous;
        let nodes = &mut self.core.nodes;
        let (n_var, n_prim) = (nodes.n_var(), nodes.n_prim());
        let mut count = 0;
        for i in 0..nodes.n_point() {
            let mu_turb = turbulence.map_or(0.0, |t| t.primitive(i)[t.n_var()]);
            let (solution, primitive) = nodes.solution_and_primitive_mut();
            let ok = fluid.primitive_from_conservative(
                &solution[i * n_var..(i + 1) * n_var],
                mu_turb,
                viscous,
                &mut primitive[i * n_prim..(i + 1) * n_prim],
            );
            nodes.set_non_physical(i, !ok);
            if !ok {
                count += 1;
            }
        }
        count
    }

    /// Undivided Laplacian of `[rho, rho v, rho H]` and the pressure sensor
    /// of the centered schemes. A boundary point takes no contribution from
    /// interior neighbours.
    fn set_centered_dissipation(&mut self, geometry: &Geometry) {
        let f = self.index;
        let n_dim = f.n_dim();
        let (n_var, n_prim) = (f.n_var(), f.n_prim());
        let on_boundary = &self.on_boundary;
        let (_, prim, laplacian, sensor) = self.core.nodes.laplacian_and_sensor_mut();
        laplacian.iter_mut().for_each(|l| *l = 0.0);
        sensor.iter_mut().for_each(|s| *s = 0.0);
        let mut denominator = vec![0.0; geometry.n_point()];

        let conserved = |i: usize, v: usize| {
            let p = &prim[i * n_prim..(i + 1) * n_prim];
            let rho = p[f.density()];
            match v {
                0 => rho,
                v if v <= n_dim => rho * p[f.velocity(v - 1)],
                _ => rho * p[f.enthalpy()],
            }
        };

        for edge in geometry.edges() {
            let [i, j] = edge.nodes();
            let takes_i = !on_boundary[i] || on_boundary[j];
            let takes_j = !on_boundary[j] || on_boundary[i];
            for v in 0..n_var {
                let diff = conserved(j, v) - conserved(i, v);
                if takes_i {
                    laplacian[i * n_var + v] += diff;
                }
                if takes_j {
                    laplacian[j * n_var + v] -= diff;
                }
            }
            let (p_i, p_j) = (prim[i * n_prim + f.pressure()], prim[j * n_prim + f.pressure()]);
            if takes_i {
                sensor[i] += p_j - p_i;
                denominator[i] += p_i + p_j;
            }
            if takes_j {
                sensor[j] += p_i - p_j;
                denominator[j] += p_i + p_j;
            }
        }
        for (s, d) in sensor.iter_mut().zip(&denominator) {
            *s = if *d > 0.0 { s.abs() / d } else { 0.0 };
        }
    }

    /// Gradients and limiters of the primitive variables, halo-synchronized.
    pub(crate) fn set_primitive_gradients(
        &mut self,
        ctx: &StepContext<'_>,
    ) -> Result<(), SolverError> {
        let geometry = ctx.geometry;
        match ctx.config.flow_numerics.gradient {
            GradientMethod::GreenGauss => {
                let kinds = self.core.marker_kinds().to_vec();
                gradient::green_gauss(&mut self.core.nodes, geometry, &kinds)
            }
            GradientMethod::WeightedLeastSquares => {
                gradient::least_squares(&mut self.core.nodes, geometry)
            }
        }
        self.core.set_mpi_gradient(geometry, ctx.comm)?;

        if self.order == SpatialOrder::SecondLimited
            && matches!(self.convection, FlowConvection::Upwind(_))
        {
            let num = &ctx.config.flow_numerics;
            limiter::compute_limiter(
                &mut self.core.nodes,
                geometry,
                num.limiter,
                num.limiter_coeff,
                num.ref_elem_length,
            );
            self.core.set_mpi_limiter(geometry, ctx.comm)?;
        }
        Ok(())
    }

    /// Central flux plus artificial dissipation over every edge.
    pub fn centered_residual(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        let Self { core, convection, .. } = self;
        let FlowConvection::Centered(numerics) = convection else {
            return Ok(());
        };
        let implicit = core.is_implicit();
        for (e, edge) in ctx.geometry.edges().iter().enumerate() {
            let [i, j] = edge.nodes();
            let nodes = &core.nodes;
            let input = CenteredEdge {
                states: EdgeStates {
                    normal: ctx.geometry.edge_normal(e),
                    prim_i: nodes.primitive(i),
                    prim_j: nodes.primitive(j),
                    scalar_i: &[],
                    scalar_j: &[],
                },
                laplacian_i: nodes.laplacian(i),
                laplacian_j: nodes.laplacian(j),
                sensor_i: nodes.sensor(i),
                sensor_j: nodes.sensor(j),
                lambda_i: nodes.lambda_inv(i),
                lambda_j: nodes.lambda_inv(j),
                neighbors_i: core.neighbor_count(i),
                neighbors_j: core.neighbor_count(j),
            };
            let out = numerics.compute(&input, implicit);
            core.add_edge_flux(i, j, out);
        }
        Ok(())
    }

    /// Upwind flux over every edge, with MUSCL reconstruction at second
    /// order. An edge whose reconstructed states are not physical falls back
    /// to the point values.
    pub fn upwind_residual(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        let Self {
            core,
            convection,
            free_stream,
            order,
            index,
            recon_i,
            recon_j,
            ..
        } = self;
        let FlowConvection::Upwind(numerics) = convection else {
            return Ok(());
        };
        let implicit = core.is_implicit();
        let geometry = ctx.geometry;
        let second = *order != SpatialOrder::First;
        let limited = *order == SpatialOrder::SecondLimited;
        let mut half = vec![0.0; geometry.n_dim()];

        for (e, edge) in geometry.edges().iter().enumerate() {
            let [i, j] = edge.nodes();
            let nodes = &core.nodes;
            let (prim_i, prim_j) = if second {
                let (xi, xj) = (geometry.coord(i), geometry.coord(j));
                half.iter_mut()
                    .zip(xi.iter().zip(xj))
                    .for_each(|(h, (a, b))| *h = 0.5 * (b - a));
                let fluid = &free_stream.fluid;
                let ok_i = reconstruct(nodes, i, &half, 1.0, limited, *index, fluid, recon_i);
                let ok_j = reconstruct(nodes, j, &half, -1.0, limited, *index, fluid, recon_j);
                if ok_i && ok_j {
                    (&recon_i[..], &recon_j[..])
                } else {
                    (nodes.primitive(i), nodes.primitive(j))
                }
            } else {
                (nodes.primitive(i), nodes.primitive(j))
            };
            let out = numerics.compute(
                &EdgeStates {
                    normal: geometry.edge_normal(e),
                    prim_i,
                    prim_j,
                    scalar_i: &[],
                    scalar_j: &[],
                },
                implicit,
            );
            core.add_edge_flux(i, j, out);
        }
        Ok(())
    }

    /// Spectral radii over the edges and the boundary faces, then the local
    /// time step `CFL Vol / lambda` (and its viscous counterpart).
    pub(crate) fn compute_time_step(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        let geometry = ctx.geometry;
        let f = self.index;
        let n_dim = f.n_dim();
        let n_prim = f.n_prim();
        let fluid = self.free_stream.fluid;
        let viscous = self.viscous;
        let cfl = ctx.config.time.cfl;
        let kinds = self.core.marker_kinds().to_vec();

        let (prim, lambda_inv, lambda_visc) = self.core.nodes.lambdas_mut();
        lambda_inv.iter_mut().for_each(|l| *l = 0.0);
        lambda_visc.iter_mut().for_each(|l| *l = 0.0);
        let at = |i: usize| &prim[i * n_prim..(i + 1) * n_prim];
        let visc_radius = |p: &[f64], area: f64| {
            let (mu_lam, mu_turb, rho) = (p[f.mu_lam()], p[f.mu_turb()], p[f.density()]);
            let l1 = 4.0 / 3.0 * (mu_lam + mu_turb);
            let l2 = (1.0 + fluid.prandtl_lam / fluid.prandtl_turb * mu_turb / mu_lam)
                * fluid.gamma
                * mu_lam
                / fluid.prandtl_lam;
            (l1 + l2) * area * area / rho
        };

        for (e, edge) in geometry.edges().iter().enumerate() {
            let [i, j] = edge.nodes();
            let normal = geometry.edge_normal(e);
            let area = dot(normal, normal).sqrt();
            let (pi, pj) = (at(i), at(j));
            let velocity = f.velocity(0)..f.velocity(0) + n_dim;
            let vn = 0.5
                * (dot(&pi[velocity.clone()], normal) + dot(&pj[velocity], normal));
            let c = 0.5 * (pi[f.sound_speed()] + pj[f.sound_speed()]);
            let lambda = vn.abs() + c * area;
            lambda_inv[i] += lambda;
            lambda_inv[j] += lambda;
            if viscous {
                let mean: Vec<f64> = pi.iter().zip(pj).map(|(a, b)| 0.5 * (a + b)).collect();
                let lv = visc_radius(&mean, area);
                lambda_visc[i] += lv;
                lambda_visc[j] += lv;
            }
        }
        for (marker, kind) in geometry.markers().iter().zip(&kinds) {
            if !kind.is_physical() {
                continue;
            }
            for vertex in marker.vertices() {
                let i = vertex.point();
                let normal = &vertex.normal()[..n_dim];
                let area = dot(normal, normal).sqrt();
                let p = at(i);
                let vn = dot(&p[f.velocity(0)..f.velocity(0) + n_dim], normal);
                lambda_inv[i] += vn.abs() + p[f.sound_speed()] * area;
                if viscous {
                    lambda_visc[i] += visc_radius(p, area);
                }
            }
        }

        for i in 0..geometry.n_point_domain() {
            let vol = geometry.volume(i);
            let nodes = &self.core.nodes;
            let mut dt = if nodes.lambda_inv(i) > 0.0 {
                cfl * vol / nodes.lambda_inv(i)
            } else {
                0.0
            };
            if viscous && nodes.lambda_visc(i) > 0.0 {
                dt = dt.min(0.25 * cfl * vol * vol / nodes.lambda_visc(i));
            }
            self.core.nodes.set_delta_time(i, dt);
        }
        self.core.reduce_time_step_bounds(geometry, ctx.comm)?;
        self.core.set_mpi_scalar(geometry, ctx.comm, ScalarField::LambdaInv)?;
        Ok(())
    }

    /// Applies the pathology policy to owned points whose new state is not
    /// physical, with a count agreed on by every rank.
    pub(crate) fn check_solution(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        let fluid = self.free_stream.fluid;
        let mut record = vec![0.0; self.index.n_prim()];
        let nodes = &mut self.core.nodes;
        let offending: Vec<usize> = (0..ctx.geometry.n_point_domain())
            .filter(|&i| {
                !fluid.primitive_from_conservative(nodes.solution(i), 0.0, false, &mut record)
            })
            .collect();
        let mut count = [offending.len() as f64];
        ctx.comm.all_reduce_sum(&mut count)?;
        let count = count[0] as usize;
        if count > 0 {
            match self.pathology {
                PathologyPolicy::Ignore => {
                    tracing::warn!(count, iteration = ctx.iteration, "non-physical points")
                }
                PathologyPolicy::Clamp => {
                    for &i in &offending {
                        nodes.restore_old_solution(i);
                    }
                    tracing::warn!(
                        count,
                        iteration = ctx.iteration,
                        "non-physical points restored"
                    );
                }
                PathologyPolicy::Revert => {
                    nodes.restore_all_old_solution();
                    tracing::warn!(count, iteration = ctx.iteration, "update reverted");
                }
                PathologyPolicy::Abort => return Err(SolverError::NonPhysical { count }),
            }
        }
        self.core.set_mpi_solution(ctx.geometry, ctx.comm)?;
        Ok(())
    }

    pub(crate) fn preprocess_flow(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        self.core.clear_residual();
        let local = self.set_primitive_variables(ctx.coupling.turbulence);
        self.non_physical = (0..ctx.geometry.n_point_domain())
            .filter(|&i| self.core.nodes.is_non_physical(i))
            .count();
        if local > 0 {
            tracing::debug!(count = self.non_physical, "rejected conservative states");
        }

        if matches!(self.convection, FlowConvection::Centered(_)) {
            self.set_centered_dissipation(ctx.geometry);
            self.core.set_mpi_laplacian(ctx.geometry, ctx.comm)?;
            self.core.set_mpi_scalar(ctx.geometry, ctx.comm, ScalarField::Sensor)?;
        }
        if self.needs_gradients() {
            self.set_primitive_gradients(ctx)?;
        }
        Ok(())
    }
}

/// MUSCL extrapolation of point `i` to the face midpoint, `sign * half`
/// away. Rebuilds the thermodynamic entries from `p` and `rho`; returns
/// `false` when the result is not physical.
#[allow(clippy::too_many_arguments)]
fn reconstruct(
    nodes: &VariableStore,
    i: usize,
    half: &[f64],
    sign: f64,
    limited: bool,
    f: FlowIndex,
    fluid: &FluidModel,
    out: &mut [f64],
) -> bool {
    out.copy_from_slice(nodes.primitive(i));
    let limiter = nodes.limiter(i);
    for k in 0..f.n_grad() {
        let slope: f64 = sign * dot(nodes.grad(i, k), half);
        out[k] += if limited { limiter[k] * slope } else { slope };
    }
    let (p, rho) = (out[f.pressure()], out[f.density()]);
    if !(p > 0.0 && rho > 0.0) {
        return false;
    }
    let n_dim = f.n_dim();
    let q2: f64 = out[f.velocity(0)..f.velocity(0) + n_dim].iter().map(|v| v * v).sum();
    out[f.temperature()] = fluid.temperature(rho, p);
    out[f.enthalpy()] = fluid.gamma / fluid.gamma_minus_one() * p / rho + 0.5 * q2;
    out[f.sound_speed()] = (fluid.gamma * p / rho).sqrt();
    true
}

impl ConvectiveFluxProvider for EulerSolver {
    fn convective_residual(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        match self.convection {
            FlowConvection::Centered(_) => self.centered_residual(ctx),
            FlowConvection::Upwind(_) => self.upwind_residual(ctx),
        }
    }
}

impl BoundaryConditionSet for EulerSolver {
    fn boundary_residual(
        &mut self,
        ctx: &StepContext<'_>,
        marker: usize,
    ) -> Result<(), SolverError> {
        match self.core.marker_kinds()[marker] {
            BoundaryKind::EulerWall => self.bc_euler_wall(ctx, marker),
            BoundaryKind::SymmetryPlane => self.bc_sym_plane(ctx, marker),
            BoundaryKind::FarField => self.bc_far_field(ctx, marker),
            BoundaryKind::Inlet(spec) => self.bc_inlet(ctx, marker, spec),
            BoundaryKind::SupersonicInlet {
                temperature,
                pressure,
                velocity,
            } => self.bc_supersonic_inlet(ctx, marker, temperature, pressure, velocity),
            BoundaryKind::Outlet { pressure } => self.bc_outlet(ctx, marker, pressure),
            // no-slip walls need the viscous solver; they act as slip walls here
            BoundaryKind::Isothermal { .. } | BoundaryKind::HeatFlux { .. } => {
                self.bc_euler_wall(ctx, marker)
            }
            BoundaryKind::Periodic | BoundaryKind::SendReceive => Ok(()),
        }
    }
}

impl Solver for EulerSolver {
    fn name(&self) -> &'static str {
        "Euler"
    }

    fn core(&self) -> &SolverCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SolverCore {
        &mut self.core
    }

    fn forces(&self) -> Option<&ForceReport> {
        Some(&self.forces)
    }

    fn preprocessing(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        self.preprocess_flow(ctx)
    }

    fn set_time_step(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        self.compute_time_step(ctx)
    }

    fn finalize_update(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        self.check_solution(ctx)
    }

    fn postprocessing(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        self.inviscid_forces(ctx)
    }

    fn field_names(&self, n_dim: usize) -> Vec<String> {
        flow_field_names(n_dim)
    }
}

pub(crate) fn flow_field_names(n_dim: usize) -> Vec<String> {
    let mut names = vec!["Density".to_string()];
    names.extend(["X-Momentum", "Y-Momentum", "Z-Momentum"][..n_dim].iter().map(|s| s.to_string()));
    names.push("Energy".to_string());
    names
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

    fn far_field_box(config: Config) -> (Geometry, Config) {
        let geometry =
            RectangularMesh::new(Grid::from_steps(0.0, 1.0, 4), Grid::from_steps(0.0, 1.0, 4))
                .build()
                .unwrap();
        let mut config = config;
        for tag in ["lower", "right", "upper", "left"] {
            config = config.with_marker(tag, BoundaryKind::FarField);
        }
        (geometry, config)
    }

    fn uniform_residual(config: Config) -> f64 {
        let (geometry, config) = far_field_box(config);
        let comm = SerialComm::new();
        let mut solver = EulerSolver::new(&geometry, &config, &comm).unwrap();
        let ctx = StepContext::new(&geometry, &config, &comm);
        solver.preprocessing(&ctx).unwrap();
        solver.set_time_step(&ctx).unwrap();
        solver.assemble(&ctx).unwrap();
        (0..geometry.n_point())
            .flat_map(|i| solver.core().residual(i))
            .fold(0.0f64, |m, r| m.max(r.abs()))
    }

    #[test]
    fn uniform_flow_is_an_equilibrium_for_roe() {
        assert!(uniform_residual(Config::euler().with_mach(0.5)) < 1e-12);
    }

    #[test]
    fn uniform_flow_is_an_equilibrium_for_jst() {
        let config = Config::euler()
            .with_mach(0.5)
            .with_convective(ConvectiveScheme::Jst, SpatialOrder::Second);
        assert!(uniform_residual(config) < 1e-12);
    }

    #[test]
    fn scalar_upwind_is_rejected_for_the_flow() {
        let (geometry, config) = far_field_box(
            Config::euler().with_convective(ConvectiveScheme::ScalarUpwind, SpatialOrder::First),
        );
        let err = EulerSolver::new(&geometry, &config, &SerialComm::new()).err().unwrap();
        assert!(matches!(err, SolverError::Config(ConfigError::Inconsistent(_))));
    }

    #[test]
    fn time_step_follows_the_spectral_radius() {
        let (geometry, config) = far_field_box(
            Config::euler().with_time_integration(TimeIntegration::EulerExplicit, 2.0),
        );
        let comm = SerialComm::new();
        let mut solver = EulerSolver::new(&geometry, &config, &comm).unwrap();
        let ctx = StepContext::new(&geometry, &config, &comm);
        solver.preprocessing(&ctx).unwrap();
        solver.set_time_step(&ctx).unwrap();
        let nodes = solver.core().nodes();
        for i in 0..geometry.n_point_domain() {
            assert_relative_eq!(
                nodes.delta_time(i),
                2.0 * geometry.volume(i) / nodes.lambda_inv(i)
            );
        }
        assert!(solver.core().min_delta_time() <= solver.core().max_delta_time());
    }

    #[test]
    fn undivided_laplacian_vanishes_for_uniform_flow() {
        let config = Config::euler().with_convective(ConvectiveScheme::Jst, SpatialOrder::Second);
        let (geometry, config) = far_field_box(config);
        let comm = SerialComm::new();
        let mut solver = EulerSolver::new(&geometry, &config, &comm).unwrap();
        solver.preprocessing(&StepContext::new(&geometry, &config, &comm)).unwrap();
        for i in 0..geometry.n_point() {
            assert!(solver.core().nodes().laplacian(i).iter().all(|l| l.abs() < 1e-12));
            assert_eq!(solver.core().nodes().sensor(i), 0.0);
        }
    }
}

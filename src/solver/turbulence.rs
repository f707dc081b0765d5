//! Transport of turbulence quantities on top of a frozen flow field.
//!
//! [`TurbSolver`] owns the edge, boundary and update machinery shared by the
//! one- and two-equation models; a [`TurbulenceClosure`] supplies what
//! differs between them. The flow primitives are read through the coupling
//! of the step context, as they were at the flow preprocessing of the same
//! iteration.

use crate::{
    comm::Communicator,
    config::{BoundaryKind, Config, GradientMethod, SpatialOrder, ViscousScheme},
    error::SolverError,
    freestream::FreeStream,
    geometry::{dot, Geometry},
    halo::VectorLayout,
    numerics::{
        ConvectiveNumerics, EdgeStates, ScalarUpwind, SourceNumerics, SourcePoint, ViscousEdge,
        ViscousNumerics,
    },
    solver::{
        base::{HaloLayouts, SolverCore},
        gradient, limiter, BoundaryConditionSet, ConvectiveFluxProvider, Solver, SourceTermProvider,
        StepContext, ViscousFluxProvider,
    },
    variable::{FlowIndex, VariableStore},
};

/// Blending values of a point; all zero for models without blending.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Blending {
    pub f1: f64,
    pub f2: f64,
    pub cross_diffusion: f64,
}

/// Model-specific parts of a turbulence solver.
///
/// The turbulence primitive record is `[values.., mu_turb]` with one value
/// per transported variable; gradients are taken of the values.
pub trait TurbulenceClosure {
    fn name(&self) -> &'static str;

    fn n_var(&self) -> usize;

    fn field_names(&self) -> Vec<String>;

    /// Transported variables of the free stream.
    fn free_stream_solution(&self, free_stream: &FreeStream) -> Vec<f64>;

    /// Primitive values from the transported variables and the density.
    fn values(&self, solution: &[f64], rho: f64, out: &mut [f64]);

    /// Inverse of [`TurbulenceClosure::values`].
    fn solution(&self, values: &[f64], rho: f64, out: &mut [f64]);

    /// Per-point work that needs the gradients, before the eddy viscosity.
    fn prepare(
        &mut self,
        _geometry: &Geometry,
        _flow: &VariableStore,
        _turbulence: &VariableStore,
    ) {
    }

    fn blending(&self, _i: usize) -> Blending {
        Blending::default()
    }

    fn eddy_viscosity(
        &self,
        i: usize,
        flow_prim: &[f64],
        flow_grad: &[f64],
        values: &[f64],
        f: FlowIndex,
    ) -> f64;

    /// Transported variables imposed on a no-slip wall point, with
    /// `distance` to the first point off the wall.
    fn wall_solution(&self, flow_prim: &[f64], distance: f64, f: FlowIndex) -> Vec<f64>;

    /// Keeps the primitive values inside the admissible range.
    fn clip(&self, values: &mut [f64]);

    fn viscous_numerics(&self, n_dim: usize, corrected: bool) -> Box<dyn ViscousNumerics>;

    fn source_numerics(&self) -> Box<dyn SourceNumerics>;
}

pub struct TurbSolver<M: TurbulenceClosure> {
    core: SolverCore,
    closure: M,
    index: FlowIndex,
    convective: ScalarUpwind,
    viscous: Box<dyn ViscousNumerics>,
    source: Box<dyn SourceNumerics>,
    order: SpatialOrder,
    far_field: Vec<f64>,
    /// Points of a no-slip wall, where the values are imposed.
    on_wall: Vec<bool>,
    cfl_reduction: f64,
    scratch_i: Vec<f64>,
    scratch_j: Vec<f64>,
}

impl<M: TurbulenceClosure> TurbSolver<M> {
    pub fn new(
        geometry: &Geometry,
        config: &Config,
        comm: &dyn Communicator,
        closure: M,
    ) -> Result<Self, SolverError> {
        let n_dim = geometry.n_dim();
        let n_var = closure.n_var();
        let free_stream = FreeStream::from_config(config, n_dim);
        let far_field = closure.free_stream_solution(&free_stream);
        let nodes = VariableStore::new(geometry.n_point(), n_dim, n_var + 1, n_var, &far_field);
        let num = &config.turb_numerics;
        // every gradient row is a vector across periodic links
        let layouts = HaloLayouts {
            gradient: VectorLayout::gradient(n_var, n_dim, None),
            ..HaloLayouts::default()
        };
        let core = SolverCore::new(geometry, config, comm, nodes, layouts, num.relaxation)?;

        let mut on_wall = vec![false; geometry.n_point()];
        for (marker, kind) in geometry.markers().iter().zip(core.marker_kinds()) {
            if kind.is_viscous_wall() {
                for v in marker.vertices() {
                    on_wall[v.point()] = true;
                }
            }
        }

        let corrected = num.viscous == ViscousScheme::AvgGradCorrected;
        let solver = Self {
            core,
            index: FlowIndex::new(n_dim),
            convective: ScalarUpwind::new(n_var),
            viscous: closure.viscous_numerics(n_dim, corrected),
            source: closure.source_numerics(),
            order: num.spatial_order,
            far_field,
            on_wall,
            cfl_reduction: num.cfl_reduction,
            scratch_i: vec![0.0; n_var],
            scratch_j: vec![0.0; n_var],
            closure,
        };
        tracing::info!(
            model = solver.closure.name(),
            n_var,
            viscous = solver.viscous.name(),
            source = solver.source.name(),
            "turbulence solver ready"
        );
        Ok(solver)
    }

    pub fn closure(&self) -> &M {
        &self.closure
    }

    /// Eddy viscosity of point `i`.
    pub fn eddy_viscosity(&self, i: usize) -> f64 {
        self.core.nodes.primitive(i)[self.closure.n_var()]
    }

    fn set_primitive_variables(&mut self, flow: &VariableStore) {
        let (n_var, n_prim) = (self.closure.n_var(), self.core.nodes.n_prim());
        let rho = self.index.density();
        let (solution, primitive) = self.core.nodes.solution_and_primitive_mut();
        for i in 0..flow.n_point() {
            self.closure.values(
                &solution[i * n_var..(i + 1) * n_var],
                flow.primitive(i)[rho],
                &mut primitive[i * n_prim..i * n_prim + n_var],
            );
        }
    }

    fn set_gradients(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        match ctx.config.flow_numerics.gradient {
            GradientMethod::GreenGauss => {
                let kinds = self.core.marker_kinds().to_vec();
                gradient::green_gauss(&mut self.core.nodes, ctx.geometry, &kinds)
            }
            GradientMethod::WeightedLeastSquares => {
                gradient::least_squares(&mut self.core.nodes, ctx.geometry)
            }
        }
        self.core.set_mpi_gradient(ctx.geometry, ctx.comm)?;
        Ok(())
    }

    fn set_eddy_viscosity(&mut self, flow: &VariableStore) {
        let n_var = self.closure.n_var();
        for i in 0..flow.n_point() {
            let values = &self.core.nodes.primitive(i)[..n_var];
            let mu_turb = self
                .closure
                .eddy_viscosity(i, flow.primitive(i), flow.gradient(i), values, self.index);
            self.core.nodes.primitive_mut(i)[n_var] = mu_turb;
        }
    }

    /// Transported variables at the face of point `i`, extrapolated `sign *
    /// half` from the point at second order.
    fn face_solution(
        &mut self,
        flow: &VariableStore,
        i: usize,
        half: &[f64],
        sign: f64,
        side_j: bool,
    ) {
        let n_var = self.closure.n_var();
        let nodes = &self.core.nodes;
        let out = if side_j { &mut self.scratch_j } else { &mut self.scratch_i };
        let rho = flow.primitive(i)[self.index.density()];
        let mut values: Vec<f64> = nodes.primitive(i)[..n_var].to_vec();
        let limited = self.order == SpatialOrder::SecondLimited;
        for (k, v) in values.iter_mut().enumerate() {
            let slope = sign * dot(nodes.grad(i, k), half);
            *v += if limited { nodes.limiter(i)[k] * slope } else { slope };
        }
        self.closure.solution(&values, rho, out);
    }

    /// Free-stream values entering through the face, interior values
    /// leaving it.
    fn open_boundary(
        &mut self,
        ctx: &StepContext<'_>,
        marker: usize,
        extrapolate: bool,
    ) -> Result<(), SolverError> {
        let flow = ctx.flow()?;
        let n_dim = ctx.geometry.n_dim();
        let implicit = self.core.is_implicit();
        for vertex in ctx.geometry.markers()[marker].vertices() {
            let i = vertex.point();
            if !ctx.geometry.is_domain(i) {
                continue;
            }
            let scalar_i = self.core.nodes.solution(i);
            let scalar_j = if extrapolate { scalar_i } else { &self.far_field[..] };
            let out = self.convective.compute(
                &EdgeStates {
                    normal: &vertex.normal()[..n_dim],
                    prim_i: flow.primitive(i),
                    prim_j: flow.primitive(i),
                    scalar_i,
                    scalar_j,
                },
                implicit,
            );
            self.core.add_boundary_flux(i, out);
        }
        Ok(())
    }

    fn wall(&mut self, ctx: &StepContext<'_>, marker: usize) -> Result<(), SolverError> {
        let flow = ctx.flow()?;
        for vertex in ctx.geometry.markers()[marker].vertices() {
            let i = vertex.point();
            let nn = vertex.normal_neighbor();
            let distance: f64 = ctx
                .geometry
                .coord(nn)
                .iter()
                .zip(ctx.geometry.coord(i))
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
            let values = self.closure.wall_solution(flow.primitive(i), distance, self.index);
            let strong: Vec<(usize, f64)> = values.into_iter().enumerate().collect();
            self.core.set_strong(i, &strong);
        }
        Ok(())
    }
}

impl<M: TurbulenceClosure> ConvectiveFluxProvider for TurbSolver<M> {
    fn convective_residual(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        self.upwind_residual(ctx)
    }
}

impl<M: TurbulenceClosure> TurbSolver<M> {
    /// Scalar upwinding with the flow velocity, reconstructing the
    /// transported variables at second order.
    pub fn upwind_residual(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        let flow = ctx.flow()?;
        let geometry = ctx.geometry;
        let implicit = self.core.is_implicit();
        let second = self.order != SpatialOrder::First;
        let mut half = vec![0.0; geometry.n_dim()];

        for (e, edge) in geometry.edges().iter().enumerate() {
            let [i, j] = edge.nodes();
            if second {
                let (xi, xj) = (geometry.coord(i), geometry.coord(j));
                half.iter_mut()
                    .zip(xi.iter().zip(xj))
                    .for_each(|(h, (a, b))| *h = 0.5 * (b - a));
                self.face_solution(flow, i, &half, 1.0, false);
                self.face_solution(flow, j, &half, -1.0, true);
            } else {
                self.scratch_i.copy_from_slice(self.core.nodes.solution(i));
                self.scratch_j.copy_from_slice(self.core.nodes.solution(j));
            }
            let out = self.convective.compute(
                &EdgeStates {
                    normal: geometry.edge_normal(e),
                    prim_i: flow.primitive(i),
                    prim_j: flow.primitive(j),
                    scalar_i: &self.scratch_i,
                    scalar_j: &self.scratch_j,
                },
                implicit,
            );
            self.core.add_edge_flux(i, j, out);
        }
        Ok(())
    }
}

impl<M: TurbulenceClosure> ViscousFluxProvider for TurbSolver<M> {
    fn viscous_residual(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        let flow = ctx.flow()?;
        let geometry = ctx.geometry;
        let implicit = self.core.is_implicit();
        for (e, edge) in geometry.edges().iter().enumerate() {
            let [i, j] = edge.nodes();
            let nodes = &self.core.nodes;
            let (bi, bj) = (self.closure.blending(i), self.closure.blending(j));
            let out = self.viscous.compute(
                &ViscousEdge {
                    normal: geometry.edge_normal(e),
                    coord_i: geometry.coord(i),
                    coord_j: geometry.coord(j),
                    prim_i: flow.primitive(i),
                    prim_j: flow.primitive(j),
                    grad_i: flow.gradient(i),
                    grad_j: flow.gradient(j),
                    scalar_i: nodes.solution(i),
                    scalar_j: nodes.solution(j),
                    scalar_grad_i: nodes.gradient(i),
                    scalar_grad_j: nodes.gradient(j),
                    f1_i: bi.f1,
                    f1_j: bj.f1,
                },
                implicit,
            );
            self.core.sub_edge_flux(i, j, out);
        }
        Ok(())
    }
}

impl<M: TurbulenceClosure> SourceTermProvider for TurbSolver<M> {
    fn source_residual(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        let flow = ctx.flow()?;
        let geometry = ctx.geometry;
        let implicit = self.core.is_implicit();
        for i in 0..geometry.n_point_domain() {
            let nodes = &self.core.nodes;
            let blend = self.closure.blending(i);
            let out = self.source.compute(
                &SourcePoint {
                    volume: geometry.volume(i),
                    wall_distance: geometry.point(i).wall_distance(),
                    prim: flow.primitive(i),
                    grad: flow.gradient(i),
                    scalar: nodes.solution(i),
                    scalar_prim: nodes.primitive(i),
                    scalar_grad: nodes.gradient(i),
                    f1: blend.f1,
                    f2: blend.f2,
                    cross_diffusion: blend.cross_diffusion,
                },
                implicit,
            );
            self.core.sub_source(i, out);
        }
        Ok(())
    }
}

impl<M: TurbulenceClosure> BoundaryConditionSet for TurbSolver<M> {
    fn boundary_residual(
        &mut self,
        ctx: &StepContext<'_>,
        marker: usize,
    ) -> Result<(), SolverError> {
        match self.core.marker_kinds()[marker] {
            BoundaryKind::FarField
            | BoundaryKind::Inlet(_)
            | BoundaryKind::SupersonicInlet { .. } => self.open_boundary(ctx, marker, false),
            BoundaryKind::Outlet { .. } => self.open_boundary(ctx, marker, true),
            BoundaryKind::Isothermal { .. } | BoundaryKind::HeatFlux { .. } => {
                self.wall(ctx, marker)
            }
            BoundaryKind::EulerWall
            | BoundaryKind::SymmetryPlane
            | BoundaryKind::Periodic
            | BoundaryKind::SendReceive => Ok(()),
        }
    }
}

impl<M: TurbulenceClosure> Solver for TurbSolver<M> {
    fn name(&self) -> &'static str {
        self.closure.name()
    }

    fn core(&self) -> &SolverCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SolverCore {
        &mut self.core
    }

    fn as_viscous(&mut self) -> Option<&mut dyn ViscousFluxProvider> {
        Some(self)
    }

    fn as_source(&mut self) -> Option<&mut dyn SourceTermProvider> {
        Some(self)
    }

    fn preprocessing(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        let flow = ctx.flow()?;
        self.core.clear_residual();
        self.set_primitive_variables(flow);
        self.set_gradients(ctx)?;
        self.closure.prepare(ctx.geometry, flow, &self.core.nodes);
        self.set_eddy_viscosity(flow);
        self.core.set_mpi_primitive(ctx.geometry, ctx.comm)?;

        if self.order == SpatialOrder::SecondLimited {
            let num = &ctx.config.flow_numerics;
            limiter::compute_limiter(
                &mut self.core.nodes,
                ctx.geometry,
                num.limiter,
                num.limiter_coeff,
                num.ref_elem_length,
            );
            self.core.set_mpi_limiter(ctx.geometry, ctx.comm)?;
        }
        Ok(())
    }

    /// The flow time step scaled by the turbulence CFL reduction.
    fn set_time_step(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        let flow = ctx.flow()?;
        for i in 0..ctx.geometry.n_point_domain() {
            self.core.nodes.set_delta_time(i, flow.delta_time(i) * self.cfl_reduction);
        }
        self.core.reduce_time_step_bounds(ctx.geometry, ctx.comm)?;
        Ok(())
    }

    /// Single-stage update: backward Euler for implicit runs, forward Euler
    /// otherwise.
    fn update(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        if ctx.config.is_implicit() {
            self.implicit_euler_iteration(ctx)?;
        } else {
            self.explicit_euler_iteration(ctx)?;
        }
        self.finalize_update(ctx)
    }

    fn finalize_update(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        let flow = ctx.flow()?;
        let n_var = self.closure.n_var();
        let rho_index = self.index.density();
        let mut values = vec![0.0; n_var];
        for i in 0..ctx.geometry.n_point_domain() {
            if self.on_wall[i] {
                continue;
            }
            let rho = flow.primitive(i)[rho_index];
            self.closure.values(self.core.nodes.solution(i), rho, &mut values);
            self.closure.clip(&mut values);
            self.closure.solution(&values, rho, self.core.nodes.solution_mut(i));
        }
        self.core.set_mpi_solution(ctx.geometry, ctx.comm)?;
        Ok(())
    }

    fn field_names(&self, _n_dim: usize) -> Vec<String> {
        self.closure.field_names()
    }

    fn restart_offset(&self, n_dim: usize) -> usize {
        n_dim + 2
    }
}

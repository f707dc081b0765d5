//! Weak boundary conditions of the flow equations.
//!
//! Walls contribute their pressure flux directly. Every other condition
//! builds a boundary state and evaluates the Roe flux between the interior
//! and that state across the outward vertex normal.

use faer::Mat;

use crate::{
    config::InletSpec,
    error::SolverError,
    geometry::{dot, norm},
    numerics::{pressure_derivative, ConvectiveNumerics, EdgeStates, FluxOutput},
    solver::{euler::EulerSolver, StepContext},
};

impl EulerSolver {
    /// Slip wall: only the pressure acts on the face.
    pub fn bc_euler_wall(
        &mut self,
        ctx: &StepContext<'_>,
        marker: usize,
    ) -> Result<(), SolverError> {
        let f = self.index;
        let n_dim = f.n_dim();
        let gamma = self.free_stream.fluid.gamma;
        let implicit = self.core.is_implicit();
        let mut out = FluxOutput::new(f.n_var());
        let mut jac = Mat::<f64>::zeros(f.n_var(), f.n_var());

        for vertex in ctx.geometry.markers()[marker].vertices() {
            let i = vertex.point();
            if !ctx.geometry.is_domain(i) {
                continue;
            }
            let normal = &vertex.normal()[..n_dim];
            let prim = self.core.nodes.primitive(i);
            let p = prim[f.pressure()];
            out.residual.iter_mut().for_each(|r| *r = 0.0);
            for d in 0..n_dim {
                out.residual[1 + d] = p * normal[d];
            }
            if implicit {
                let dp = pressure_derivative(prim, n_dim, gamma);
                for d in 0..n_dim {
                    for (c, dpc) in dp.iter().enumerate() {
                        jac.write(1 + d, c, normal[d] * dpc);
                    }
                }
                self.core.add_jacobian(i, i, &jac);
            }
            self.core.lin_sys_res.add_block(i, &out.residual);
        }
        Ok(())
    }

    /// Symmetry plane: zero normal velocity, identical to a slip wall in the
    /// weak form.
    pub fn bc_sym_plane(
        &mut self,
        ctx: &StepContext<'_>,
        marker: usize,
    ) -> Result<(), SolverError> {
        self.bc_euler_wall(ctx, marker)
    }

    /// Characteristic far field: Riemann invariants select interior or
    /// free-stream information per wave, and the entropy and tangential
    /// velocity come from the upwind side.
    pub fn bc_far_field(
        &mut self,
        ctx: &StepContext<'_>,
        marker: usize,
    ) -> Result<(), SolverError> {
        let f = self.index;
        let n_dim = f.n_dim();
        let fluid = self.free_stream.fluid;
        let gm1 = fluid.gamma_minus_one();
        let fs = self.free_stream.clone();
        let c_inf = fs.sound_speed();
        let viscous = self.viscous;

        self.weak_boundary(ctx, marker, |prim_i, unit| {
            let vel_i = &prim_i[f.velocity(0)..f.velocity(0) + n_dim];
            let (rho_i, p_i) = (prim_i[f.density()], prim_i[f.pressure()]);
            let c_i = prim_i[f.sound_speed()];
            let vn_i = dot(vel_i, unit);
            let vn_inf = dot(&fs.velocity, unit);

            let r_plus = if vn_inf > -c_inf {
                vn_i + 2.0 * c_i / gm1
            } else {
                vn_inf + 2.0 * c_inf / gm1
            };
            let r_minus = if vn_inf > c_inf {
                vn_i - 2.0 * c_i / gm1
            } else {
                vn_inf - 2.0 * c_inf / gm1
            };
            let vn = 0.5 * (r_plus + r_minus);
            let c = 0.25 * gm1 * (r_plus - r_minus);

            let (entropy, vel_ref, vn_ref) = if vn > 0.0 {
                (p_i / rho_i.powf(fluid.gamma), vel_i, vn_i)
            } else {
                (fs.pressure / fs.density.powf(fluid.gamma), &fs.velocity[..], vn_inf)
            };
            let rho = (c * c / (fluid.gamma * entropy)).powf(1.0 / gm1);
            let p = rho * c * c / fluid.gamma;
            let vel: Vec<f64> =
                vel_ref.iter().zip(unit).map(|(v, n)| v + (vn - vn_ref) * n).collect();
            Some(fluid.primitive_from_state(rho, &vel, p, prim_i[f.mu_turb()], viscous))
        })
    }

    /// Subsonic inlet. Total conditions solve the energy balance for the
    /// velocity magnitude along the prescribed direction with the outgoing
    /// Riemann invariant; mass-flow conditions impose density and velocity
    /// and extrapolate the pressure.
    pub fn bc_inlet(
        &mut self,
        ctx: &StepContext<'_>,
        marker: usize,
        inlet: InletSpec,
    ) -> Result<(), SolverError> {
        let f = self.index;
        let n_dim = f.n_dim();
        let fluid = self.free_stream.fluid;
        let gm1 = fluid.gamma_minus_one();
        let fs = &self.free_stream;
        let viscous = self.viscous;

        let unit_direction = |direction: &[f64; 3]| -> Vec<f64> {
            let d = &direction[..n_dim];
            let len = norm(d);
            d.iter().map(|x| x / len).collect()
        };

        match inlet {
            InletSpec::TotalConditions {
                total_pressure,
                total_temperature,
                direction,
            } => {
                let p_t = fs.nondim_pressure(total_pressure);
                let t_t = fs.nondim_temperature(total_temperature);
                let dir = unit_direction(&direction);
                let h_t = fluid.cp() * t_t;
                self.weak_boundary(ctx, marker, |prim_i, unit| {
                    let vel_i = &prim_i[f.velocity(0)..f.velocity(0) + n_dim];
                    let riemann = dot(vel_i, unit) + 2.0 * prim_i[f.sound_speed()] / gm1;
                    let alpha = dot(&dir, unit);
                    let aa = 1.0 + 0.5 * gm1 * alpha * alpha;
                    let bb = -gm1 * alpha * riemann;
                    let cc = 0.5 * gm1 * riemann * riemann - 2.0 * h_t;
                    let disc = (bb * bb - 4.0 * aa * cc).max(0.0);
                    let speed = ((-bb + disc.sqrt()) / (2.0 * aa)).max(0.0);

                    let c2 = gm1 * (h_t - 0.5 * speed * speed);
                    if c2 <= 0.0 {
                        return None;
                    }
                    let mach2 = speed * speed / c2;
                    let p = p_t * (1.0 + 0.5 * gm1 * mach2).powf(-fluid.gamma / gm1);
                    let t = c2 / (fluid.gamma * fluid.gas_constant);
                    let rho = p / (fluid.gas_constant * t);
                    let vel: Vec<f64> = dir.iter().map(|d| speed * d).collect();
                    Some(fluid.primitive_from_state(rho, &vel, p, prim_i[f.mu_turb()], viscous))
                })
            }
            InletSpec::MassFlow {
                density,
                velocity,
                direction,
            } => {
                let rho = fs.nondim_density(density);
                let speed = fs.nondim_velocity(velocity);
                let vel: Vec<f64> = unit_direction(&direction).iter().map(|d| speed * d).collect();
                self.weak_boundary(ctx, marker, |prim_i, _| {
                    let p = prim_i[f.pressure()];
                    Some(fluid.primitive_from_state(rho, &vel, p, prim_i[f.mu_turb()], viscous))
                })
            }
        }
    }

    /// Every boundary value prescribed.
    pub fn bc_supersonic_inlet(
        &mut self,
        ctx: &StepContext<'_>,
        marker: usize,
        temperature: f64,
        pressure: f64,
        velocity: [f64; 3],
    ) -> Result<(), SolverError> {
        let n_dim = self.index.n_dim();
        let fs = &self.free_stream;
        let fluid = fs.fluid;
        let p = fs.nondim_pressure(pressure);
        let t = fs.nondim_temperature(temperature);
        let rho = p / (fluid.gas_constant * t);
        let vel: Vec<f64> = velocity[..n_dim].iter().map(|v| fs.nondim_velocity(*v)).collect();
        let state = fluid.primitive_from_state(rho, &vel, p, 0.0, self.viscous);
        self.weak_boundary(ctx, marker, |_, _| Some(state.clone()))
    }

    /// Static back pressure for subsonic outflow with the entropy and the
    /// outgoing invariant taken from the interior; supersonic outflow is
    /// fully extrapolated.
    pub fn bc_outlet(
        &mut self,
        ctx: &StepContext<'_>,
        marker: usize,
        pressure: f64,
    ) -> Result<(), SolverError> {
        let f = self.index;
        let n_dim = f.n_dim();
        let fluid = self.free_stream.fluid;
        let gm1 = fluid.gamma_minus_one();
        let p_exit = self.free_stream.nondim_pressure(pressure);
        let viscous = self.viscous;

        self.weak_boundary(ctx, marker, |prim_i, unit| {
            let vel_i = &prim_i[f.velocity(0)..f.velocity(0) + n_dim];
            let (rho_i, p_i, c_i) =
                (prim_i[f.density()], prim_i[f.pressure()], prim_i[f.sound_speed()]);
            let vn_i = dot(vel_i, unit);
            if vn_i >= c_i {
                return Some(prim_i.to_vec());
            }
            let entropy = p_i / rho_i.powf(fluid.gamma);
            let rho = (p_exit / entropy).powf(1.0 / fluid.gamma);
            let c = (fluid.gamma * p_exit / rho).sqrt();
            let riemann = vn_i + 2.0 * c_i / gm1;
            let vn = riemann - 2.0 * c / gm1;
            let vel: Vec<f64> = vel_i.iter().zip(unit).map(|(v, n)| v + (vn - vn_i) * n).collect();
            Some(fluid.primitive_from_state(rho, &vel, p_exit, prim_i[f.mu_turb()], viscous))
        })
    }

    /// Roe flux between every owned vertex of `marker` and the boundary state
    /// returned by `state(prim_i, unit_normal)`. A vertex whose state cannot
    /// be formed is skipped.
    fn weak_boundary(
        &mut self,
        ctx: &StepContext<'_>,
        marker: usize,
        mut state: impl FnMut(&[f64], &[f64]) -> Option<Vec<f64>>,
    ) -> Result<(), SolverError> {
        let n_dim = self.index.n_dim();
        let implicit = self.core.is_implicit();
        let mut unit = vec![0.0; n_dim];
        for vertex in ctx.geometry.markers()[marker].vertices() {
            let i = vertex.point();
            if !ctx.geometry.is_domain(i) {
                continue;
            }
            let normal = &vertex.normal()[..n_dim];
            let area = norm(normal);
            if area == 0.0 {
                continue;
            }
            unit.iter_mut().zip(normal).for_each(|(u, n)| *u = n / area);
            let prim_i = self.core.nodes.primitive(i);
            let Some(prim_b) = state(prim_i, &unit) else {
                tracing::warn!(
                    point = ctx.geometry.point(i).global_index(),
                    marker = ctx.geometry.markers()[marker].tag(),
                    "no admissible boundary state, vertex skipped"
                );
                continue;
            };
            let out = self.boundary.compute(
                &EdgeStates {
                    normal,
                    prim_i,
                    prim_j: &prim_b,
                    scalar_i: &[],
                    scalar_j: &[],
                },
                implicit,
            );
            self.core.add_boundary_flux(i, out);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        comm::SerialComm,
        config::{BoundaryKind, Config, InletSpec},
        geometry::{GeometryBuilder, Marker, Vertex},
        solver::{BoundaryConditionSet, EulerSolver, Solver, StepContext},
    };
    use approx::assert_relative_eq;

    /// Two points, one edge, each point closed by one boundary face.
    fn two_point(
        config: Config,
        left: BoundaryKind,
        right: BoundaryKind) -> (crate::geometry::Geometry,
        Config,
    ) {
        let mut b = GeometryBuilder::new(2);
        b.add_point(&[0.0, 0.0], 1.0);
        b.add_point(&[1.0, 0.0], 1.0);
        b.add_edge(0, 1, &[1.0, 0.0]);
        b.add_marker(Marker::new("left", vec![Vertex::new(0, &[-1.0, 0.0])]));
        b.add_marker(Marker::new("right", vec![Vertex::new(1, &[1.0, 0.0])]));
        let geometry = b.build().unwrap();
        let config = config.with_marker("left", left).with_marker("right", right);
        (geometry, config)
    }

    fn boundary_residual(
        solver: &mut EulerSolver,
        geometry: &crate::geometry::Geometry,
        config: &Config,
        marker: usize,
    ) -> Vec<f64> {
        let comm = SerialComm::new();
        let ctx = StepContext::new(geometry, config, &comm);
        solver.preprocessing(&ctx).unwrap();
        BoundaryConditionSet::boundary_residual(solver, &ctx, marker).unwrap();
        solver.core().residual(if marker == 0 { 0 } else { 1 })
    }

    #[test]
    fn far_field_at_free_stream_gives_the_physical_flux() {
        let (geometry, config) = two_point(
            Config::euler().with_mach(0.3),
            BoundaryKind::FarField,
            BoundaryKind::FarField,
        );
        let mut solver = EulerSolver::new(&geometry, &config, &SerialComm::new()).unwrap();
        let fs = solver.free_stream().clone();
        let res = boundary_residual(&mut solver, &geometry, &config, 1);
        let u = fs.velocity[0];
        assert_relative_eq!(res[0], fs.density * u, max_relative = 1e-12);
        assert_relative_eq!(res[1], fs.density * u * u + fs.pressure, max_relative = 1e-12);
    }

    #[test]
    fn far_field_does_not_depend_on_marker_order() {
        let (geometry, config) = two_point(
            Config::euler().with_mach(0.6),
            BoundaryKind::FarField,
            BoundaryKind::FarField,
        );
        let comm = SerialComm::new();
        let ctx = StepContext::new(&geometry, &config, &comm);
        let run = |order: [usize; 2]| {
            let mut solver = EulerSolver::new(&geometry, &config, &comm).unwrap();
            solver.core_mut().nodes_mut().solution_mut(1)[1] *= 0.8;
            solver.preprocessing(&ctx).unwrap();
            for m in order {
                BoundaryConditionSet::boundary_residual(&mut solver, &ctx, m).unwrap();
            }
            (solver.core().residual(0), solver.core().residual(1))
        };
        assert_eq!(run([0, 1]), run([1, 0]));
    }

    #[test]
    fn wall_flux_is_the_pressure() {
        let (geometry, config) =
            two_point(Config::euler(), BoundaryKind::EulerWall, BoundaryKind::EulerWall);
        let mut solver = EulerSolver::new(&geometry, &config, &SerialComm::new()).unwrap();
        let p = solver.free_stream().pressure;
        let res = boundary_residual(&mut solver, &geometry, &config, 0);
        assert_eq!(res[0], 0.0);
        assert_relative_eq!(res[1], -p);
        assert_eq!(res[3], 0.0);
    }

    #[test]
    fn total_condition_inlet_recovers_the_total_pressure() {
        let config = Config::euler().with_mach(0.2);
        let fs = crate::freestream::FreeStream::from_config(&config, 2);
        let gm1 = fs.fluid.gamma_minus_one();
        let m2 = fs.mach * fs.mach;
        let p_t = config.free_stream.pressure * (1.0 + 0.5 * gm1 * m2).powf(fs.fluid.gamma / gm1);
        let t_t = config.free_stream.temperature * (1.0 + 0.5 * gm1 * m2);
        let inlet = BoundaryKind::Inlet(InletSpec::TotalConditions {
            total_pressure: p_t,
            total_temperature: t_t,
            direction: [1.0, 0.0, 0.0],
        });
        let (geometry, config) = two_point(config, inlet, BoundaryKind::FarField);
        let mut solver = EulerSolver::new(&geometry, &config, &SerialComm::new()).unwrap();
        // interior at free stream: the inlet state is the free stream itself
        let res = boundary_residual(&mut solver, &geometry, &config, 0);
        let u = fs.velocity[0];
        assert_relative_eq!(res[0], -fs.density * u, max_relative = 1e-8);
        assert_relative_eq!(res[1], -(fs.density * u * u + fs.pressure), max_relative = 1e-8);
    }

    #[test]
    fn subsonic_outlet_at_free_stream_pressure_is_transparent() {
        let config = Config::euler().with_mach(0.4);
        let p = config.free_stream.pressure;
        let outlet = BoundaryKind::Outlet { pressure: p };
        let (geometry, config) = two_point(config, BoundaryKind::FarField, outlet);
        let mut solver = EulerSolver::new(&geometry, &config, &SerialComm::new()).unwrap();
        let fs = solver.free_stream().clone();
        let res = boundary_residual(&mut solver, &geometry, &config, 1);
        let u = fs.velocity[0];
        assert_relative_eq!(res[0], fs.density * u, max_relative = 1e-12);
    }

    #[test]
    fn inlet_without_admissible_state_leaves_the_residual_untouched() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let config = Config::euler().with_mach(0.2);
        // total enthalpy far below the incoming Riemann invariant: c^2 < 0
        let inlet = BoundaryKind::Inlet(InletSpec::TotalConditions {
            total_pressure: config.free_stream.pressure,
            total_temperature: 1e-3,
            direction: [1.0, 0.0, 0.0],
        });
        let (geometry, config) = two_point(config, inlet, BoundaryKind::FarField);
        config.validate(&geometry).unwrap();
        let mut solver = EulerSolver::new(&geometry, &config, &SerialComm::new()).unwrap();
        let res = boundary_residual(&mut solver, &geometry, &config, 0);
        assert_eq!(res, vec![0.0; 4]);
    }
}

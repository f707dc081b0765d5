//! Aerodynamic loads on the wall markers.
//!
//! Forces are accumulated per marker in solver units, moments about the
//! reference origin. The totals over the monitored markers are reduced
//! across ranks and projected on the wind axes; the per-marker values only
//! cover the points owned by this rank.

use crate::{
    comm::Communicator,
    config::Config,
    error::{CommError, SolverError},
    geometry::{dot, norm, Geometry},
    numerics::{velocity_gradient, viscous::stress_tensor},
    solver::{euler::EulerSolver, StepContext},
};

/// Non-dimensional force and moment coefficients in wind axes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ForceCoefficients {
    pub cd: f64,
    pub cl: f64,
    /// Side force, zero in two dimensions.
    pub csf: f64,
    pub cfx: f64,
    pub cfy: f64,
    pub cfz: f64,
    pub cmx: f64,
    pub cmy: f64,
    pub cmz: f64,
    /// Lift over drag.
    pub ceff: f64,
}

#[derive(Clone, Copy, Debug, Default)]
struct SurfaceLoads {
    force: [f64; 3],
    moment: [f64; 3],
}

impl SurfaceLoads {
    fn add(&mut self, x: &[f64; 3], origin: &[f64; 3], force: &[f64; 3]) {
        let r = [x[0] - origin[0], x[1] - origin[1], x[2] - origin[2]];
        for d in 0..3 {
            self.force[d] += force[d];
        }
        self.moment[0] += r[1] * force[2] - r[2] * force[1];
        self.moment[1] += r[2] * force[0] - r[0] * force[2];
        self.moment[2] += r[0] * force[1] - r[1] * force[0];
    }

    fn accumulate(&mut self, other: &SurfaceLoads) {
        for d in 0..3 {
            self.force[d] += other.force[d];
            self.moment[d] += other.moment[d];
        }
    }

    fn flatten(&self) -> [f64; 6] {
        let [fx, fy, fz] = self.force;
        let [mx, my, mz] = self.moment;
        [fx, fy, fz, mx, my, mz]
    }

    fn from_flat(v: &[f64]) -> Self {
        Self {
            force: [v[0], v[1], v[2]],
            moment: [v[3], v[4], v[5]],
        }
    }
}

/// Angles in radians and reference quantities of the coefficients.
#[derive(Clone, Copy, Debug)]
struct ReferenceFrame {
    alpha: f64,
    beta: f64,
    area: f64,
    length: f64,
    origin: [f64; 3],
}

impl ReferenceFrame {
    fn project(
        &self,
        loads: &SurfaceLoads,
        n_dim: usize,
        dynamic_pressure: f64,
    ) -> ForceCoefficients {
        let force_scale = 1.0 / (dynamic_pressure * self.area);
        let moment_scale = force_scale / self.length;
        let [fx, fy, fz] = loads.force.map(|f| f * force_scale);
        let [mx, my, mz] = loads.moment.map(|m| m * moment_scale);
        let (sa, ca) = self.alpha.sin_cos();
        let (sb, cb) = self.beta.sin_cos();

        let (cd, cl, csf) = if n_dim == 2 {
            (fx * ca + fy * sa, -fx * sa + fy * ca, 0.0)
        } else {
            (
                fx * ca * cb + fy * sb + fz * sa * cb,
                -fx * sa + fz * ca,
                -fx * sb * ca + fy * cb - fz * sb * sa,
            )
        };
        ForceCoefficients {
            cd,
            cl,
            csf,
            cfx: fx,
            cfy: fy,
            cfz: fz,
            cmx: mx,
            cmy: my,
            cmz: mz,
            ceff: cl / (cd + 1e-16),
        }
    }
}

/// Loads and surface distributions of one wall marker. The distributions
/// are indexed like the marker's vertices.
#[derive(Clone, Debug)]
pub struct MarkerForces {
    pub tag: String,
    /// Included in the total coefficients.
    pub monitored: bool,
    pub cp: Vec<f64>,
    pub skin_friction: Vec<[f64; 3]>,
    /// Heat flux into the wall, in solver units.
    pub heat_flux: Vec<f64>,
    pub y_plus: Vec<f64>,
    pub inviscid: ForceCoefficients,
    pub viscous: ForceCoefficients,
    pub heat_load: f64,
    pub max_heat_flux: f64,
    wall: bool,
    inviscid_loads: SurfaceLoads,
    viscous_loads: SurfaceLoads,
}

impl MarkerForces {
    pub fn is_wall(&self) -> bool {
        self.wall
    }
}

#[derive(Clone, Debug)]
pub struct ForceReport {
    markers: Vec<MarkerForces>,
    frame: ReferenceFrame,
    inviscid: ForceCoefficients,
    viscous: ForceCoefficients,
    total: ForceCoefficients,
    heat_load: f64,
    max_heat_flux: f64,
}

impl ForceReport {
    /// One entry per geometry marker. Only walls flagged for monitoring
    /// enter the totals.
    pub fn new(geometry: &Geometry, config: &Config) -> Self {
        let markers = geometry
            .markers()
            .iter()
            .map(|marker| {
                let n = marker.vertices().len();
                let cfg = config.marker(marker.tag());
                let wall = cfg.is_some_and(|c| c.kind.is_wall());
                let monitored = wall && cfg.is_some_and(|c| c.monitoring);
                MarkerForces {
                    tag: marker.tag().to_string(),
                    monitored,
                    cp: vec![0.0; n],
                    skin_friction: vec![[0.0; 3]; n],
                    heat_flux: vec![0.0; n],
                    y_plus: vec![0.0; n],
                    inviscid: ForceCoefficients::default(),
                    viscous: ForceCoefficients::default(),
                    heat_load: 0.0,
                    max_heat_flux: 0.0,
                    wall,
                    inviscid_loads: SurfaceLoads::default(),
                    viscous_loads: SurfaceLoads::default(),
                }
            })
            .collect();
        Self {
            markers,
            frame: ReferenceFrame {
                alpha: config.free_stream.angle_of_attack.to_radians(),
                beta: config.free_stream.sideslip.to_radians(),
                area: config.reference.area,
                length: config.reference.length,
                origin: config.reference.origin,
            },
            inviscid: ForceCoefficients::default(),
            viscous: ForceCoefficients::default(),
            total: ForceCoefficients::default(),
            heat_load: 0.0,
            max_heat_flux: 0.0,
        }
    }

    pub fn markers(&self) -> &[MarkerForces] {
        &self.markers
    }

    pub fn marker(&self, tag: &str) -> Option<&MarkerForces> {
        self.markers.iter().find(|m| m.tag == tag)
    }

    pub fn inviscid(&self) -> &ForceCoefficients {
        &self.inviscid
    }

    pub fn viscous(&self) -> &ForceCoefficients {
        &self.viscous
    }

    /// Inviscid plus viscous coefficients of the monitored markers.
    pub fn total(&self) -> &ForceCoefficients {
        &self.total
    }

    pub fn heat_load(&self) -> f64 {
        self.heat_load
    }

    pub fn max_heat_flux(&self) -> f64 {
        self.max_heat_flux
    }

    fn reset_inviscid(&mut self) {
        for m in &mut self.markers {
            m.inviscid_loads = SurfaceLoads::default();
            m.cp.iter_mut().for_each(|c| *c = 0.0);
        }
    }

    fn reset_viscous(&mut self) {
        for m in &mut self.markers {
            m.viscous_loads = SurfaceLoads::default();
            m.heat_load = 0.0;
            m.max_heat_flux = 0.0;
            m.skin_friction.iter_mut().for_each(|c| *c = [0.0; 3]);
            m.heat_flux.iter_mut().for_each(|q| *q = 0.0);
            m.y_plus.iter_mut().for_each(|y| *y = 0.0);
        }
    }

    /// Projects the per-marker loads, then sums the monitored ones over all
    /// ranks.
    fn finish(
        &mut self,
        n_dim: usize,
        comm: &dyn Communicator,
        dynamic_pressure: f64,
    ) -> Result<(), CommError> {
        let mut inviscid = SurfaceLoads::default();
        let mut viscous = SurfaceLoads::default();
        let mut heat_load = 0.0;
        let mut max_heat_flux: f64 = 0.0;
        for m in &mut self.markers {
            m.inviscid = self.frame.project(&m.inviscid_loads, n_dim, dynamic_pressure);
            m.viscous = self.frame.project(&m.viscous_loads, n_dim, dynamic_pressure);
            if m.monitored {
                inviscid.accumulate(&m.inviscid_loads);
                viscous.accumulate(&m.viscous_loads);
                heat_load += m.heat_load;
                max_heat_flux = max_heat_flux.max(m.max_heat_flux);
            }
        }

        let mut sums = Vec::with_capacity(13);
        sums.extend(inviscid.flatten());
        sums.extend(viscous.flatten());
        sums.push(heat_load);
        comm.all_reduce_sum(&mut sums)?;
        let mut max = [max_heat_flux];
        comm.all_reduce_max(&mut max)?;

        let inviscid = SurfaceLoads::from_flat(&sums[..6]);
        let viscous = SurfaceLoads::from_flat(&sums[6..12]);
        let mut total = inviscid;
        total.accumulate(&viscous);
        self.inviscid = self.frame.project(&inviscid, n_dim, dynamic_pressure);
        self.viscous = self.frame.project(&viscous, n_dim, dynamic_pressure);
        self.total = self.frame.project(&total, n_dim, dynamic_pressure);
        self.heat_load = sums[12];
        self.max_heat_flux = max[0];
        Ok(())
    }
}

fn pad(v: &[f64]) -> [f64; 3] {
    let mut out = [0.0; 3];
    out[..v.len()].copy_from_slice(v);
    out
}

impl EulerSolver {
    /// Pressure coefficient on every wall vertex and the pressure loads
    /// `(p - p_inf) n`, with `n` pointing out of the fluid.
    pub fn inviscid_forces(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        let f = self.index;
        let n_dim = f.n_dim();
        let p_inf = self.free_stream.pressure;
        let q_inf = self.free_stream.dynamic_pressure();
        let origin = self.forces.frame.origin;
        self.forces.reset_inviscid();

        for (m, marker) in ctx.geometry.markers().iter().enumerate() {
            let entry = &mut self.forces.markers[m];
            if !entry.wall {
                continue;
            }
            for (v, vertex) in marker.vertices().iter().enumerate() {
                let i = vertex.point();
                let dp = self.core.nodes.primitive(i)[f.pressure()] - p_inf;
                entry.cp[v] = dp / q_inf;
                if !ctx.geometry.is_domain(i) {
                    continue;
                }
                let force: Vec<f64> = vertex.normal()[..n_dim].iter().map(|n| dp * n).collect();
                let force = pad(&force);
                entry.inviscid_loads.add(ctx.geometry.point(i).coord(), &origin, &force);
            }
        }
        let n_dim = ctx.geometry.n_dim();
        self.forces.finish(n_dim, ctx.comm, q_inf)?;
        tracing::debug!(
            cl = self.forces.total.cl,
            cd = self.forces.total.cd,
            "updated aerodynamic coefficients"
        );
        Ok(())
    }

    /// Shear and heat loads of the viscous walls: the traction `-tau n` on
    /// the body, the skin friction from its tangential part, the heat flux
    /// `-k grad T . n_hat` into the wall and `y+` at the first point off the
    /// wall.
    pub(crate) fn viscous_forces(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        let f = self.index;
        let n_dim = f.n_dim();
        let q_inf = self.free_stream.dynamic_pressure();
        let fluid = self.free_stream.fluid;
        let origin = self.forces.frame.origin;
        self.forces.reset_viscous();

        for (m, marker) in ctx.geometry.markers().iter().enumerate() {
            if !self.core.marker_kinds()[m].is_viscous_wall() {
                continue;
            }
            let entry = &mut self.forces.markers[m];
            for (v, vertex) in marker.vertices().iter().enumerate() {
                let i = vertex.point();
                let normal = &vertex.normal()[..n_dim];
                let area = norm(normal);
                if area == 0.0 {
                    continue;
                }
                let unit: Vec<f64> = normal.iter().map(|n| n / area).collect();
                let prim = self.core.nodes.primitive(i);
                let grad = self.core.nodes.gradient(i);
                let (mu_lam, mu_turb) = (prim[f.mu_lam()], prim[f.mu_turb()]);
                let tau = stress_tensor(velocity_gradient(grad, n_dim), n_dim, mu_lam + mu_turb);

                let traction: Vec<f64> = (0..n_dim)
                    .map(|r| -(0..n_dim).map(|c| tau[r * n_dim + c] * unit[c]).sum::<f64>())
                    .collect();
                let tn = dot(&traction, &unit);
                let shear: Vec<f64> = traction.iter().zip(&unit).map(|(t, n)| t - tn * n).collect();
                entry.skin_friction[v] = pad(&shear.iter().map(|s| s / q_inf).collect::<Vec<_>>());

                let grad_t = &grad[f.temperature() * n_dim..(f.temperature() + 1) * n_dim];
                let k = fluid.thermal_conductivity(mu_lam, mu_turb);
                let heat_flux = -k * dot(grad_t, &unit);
                entry.heat_flux[v] = heat_flux;

                let wall_shear = norm(&shear);
                let rho = prim[f.density()];
                let nn = vertex.normal_neighbor();
                let dist: f64 = ctx
                    .geometry
                    .coord(nn)
                    .iter()
                    .zip(ctx.geometry.coord(i))
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f64>()
                    .sqrt();
                entry.y_plus[v] = if mu_lam > 0.0 {
                    dist * (wall_shear / rho).sqrt() * rho / mu_lam
                } else {
                    0.0
                };

                if !ctx.geometry.is_domain(i) {
                    continue;
                }
                let force = pad(&traction.iter().map(|t| t * area).collect::<Vec<_>>());
                entry.viscous_loads.add(ctx.geometry.point(i).coord(), &origin, &force);
                entry.heat_load += heat_flux * area;
                entry.max_heat_flux = entry.max_heat_flux.max(heat_flux.abs());
            }
        }
        self.forces.finish(ctx.geometry.n_dim(), ctx.comm, q_inf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        comm::SerialComm,
        config::BoundaryKind,
        mesh::{Grid, RectangularMesh},
        solver::Solver,
    };
    use approx::assert_relative_eq;

    fn frame(alpha_deg: f64) -> ReferenceFrame {
        ReferenceFrame {
            alpha: alpha_deg.to_radians(),
            beta: 0.0,
            area: 2.0,
            length: 0.5,
            origin: [0.0; 3],
        }
    }

    #[test]
    fn projection_on_wind_axes() {
        let loads = SurfaceLoads {
            force: [1.0, 4.0, 0.0],
            moment: [0.0, 0.0, 1.0],
        };
        let c = frame(90.0).project(&loads, 2, 0.5);
        // q * area = 1
        assert_relative_eq!(c.cd, 4.0, epsilon = 1e-12);
        assert_relative_eq!(c.cl, -1.0, epsilon = 1e-12);
        assert_relative_eq!(c.cmz, 2.0, epsilon = 1e-12);
        assert_eq!(c.csf, 0.0);
    }

    #[test]
    fn moments_are_taken_about_the_origin() {
        let mut loads = SurfaceLoads::default();
        loads.add(&[2.0, 0.0, 0.0], &[1.0, 0.0, 0.0], &[0.0, 3.0, 0.0]);
        assert_eq!(loads.moment, [0.0, 0.0, 3.0]);
    }

    fn box_mesh() -> Geometry {
        RectangularMesh::new(Grid::from_steps(0.0, 1.0, 3), Grid::from_steps(0.0, 1.0, 3))
            .build()
            .unwrap()
    }

    fn overpressure_forces(geometry: &Geometry, config: &Config) -> EulerSolver {
        let comm = SerialComm::new();
        let mut solver = EulerSolver::new(geometry, config, &comm).unwrap();
        let p = solver.free_stream().pressure;
        for i in 0..geometry.n_point() {
            solver.core_mut().nodes_mut().primitive_mut(i)[3] = p + 1.0;
        }
        solver.inviscid_forces(&StepContext::new(geometry, config, &comm)).unwrap();
        solver
    }

    #[test]
    fn uniform_pressure_on_a_closed_box_has_no_net_force() {
        let geometry = box_mesh();
        let mut config = Config::euler().with_mach(0.5).with_angle_of_attack(3.0);
        for marker in geometry.markers() {
            config = config.with_monitored_marker(marker.tag(), BoundaryKind::EulerWall);
        }
        let solver = overpressure_forces(&geometry, &config);
        let total = solver.forces().total();
        assert_relative_eq!(total.cl, 0.0, epsilon = 1e-12);
        assert_relative_eq!(total.cd, 0.0, epsilon = 1e-12);
        let q = solver.free_stream().dynamic_pressure();
        for m in solver.forces().markers() {
            assert!(m.cp.iter().all(|&cp| (cp - 1.0 / q).abs() < 1e-12));
        }
    }

    #[test]
    fn unmonitored_walls_stay_out_of_the_totals() {
        let geometry = box_mesh();
        let config = Config::euler()
            .with_mach(0.5)
            .with_marker("lower", BoundaryKind::EulerWall)
            .with_marker("right", BoundaryKind::FarField)
            .with_marker("upper", BoundaryKind::FarField)
            .with_marker("left", BoundaryKind::FarField);
        let solver = overpressure_forces(&geometry, &config);
        let forces = solver.forces();
        assert!(forces.markers().iter().all(|m| !m.monitored));
        let lower = forces.marker("lower").unwrap();
        assert!(lower.inviscid.cl.abs() > 0.0);
        assert_eq!(forces.total().cl, 0.0);
        assert_eq!(forces.total().cd, 0.0);
    }
}

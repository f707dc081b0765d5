use crate::{
    freestream::FreeStream,
    geometry::{dot, Geometry},
    numerics::{
        strain_magnitude, velocity_gradient, AvgGradSst, SourceNumerics, SstConstants, SstSource,
        ViscousNumerics,
    },
    solver::turbulence::{Blending, TurbulenceClosure},
    variable::{FlowIndex, VariableStore},
};

const K_MIN: f64 = 1e-10;
const K_MAX: f64 = 1e10;
const OMEGA_MIN: f64 = 1e-4;
const OMEGA_MAX: f64 = 1e15;
/// Floor of the cross-diffusion term, in `arg1` and in the source.
const CD_KW_MIN: f64 = 1e-20;
const WALL_DISTANCE_MIN: f64 = 1e-10;

/// Menter blending functions `F1`, `F2` and the cross-diffusion
/// `CD_kw` of one point.
///
/// `grad_k` and `grad_omega` are the gradients of `k` and `omega`. Closer
/// than `1e-10` to a wall both functions are one.
#[allow(clippy::too_many_arguments)]
pub fn blending_functions(
    c: &SstConstants,
    rho: f64,
    mu_lam: f64,
    k: f64,
    omega: f64,
    grad_k: &[f64],
    grad_omega: &[f64],
    wall_distance: f64,
) -> Blending {
    let cd_kw = (2.0 * rho * c.sigma_w2 / omega * dot(grad_k, grad_omega)).max(CD_KW_MIN);
    let d = wall_distance;
    if d <= WALL_DISTANCE_MIN {
        return Blending {
            f1: 1.0,
            f2: 1.0,
            cross_diffusion: cd_kw,
        };
    }
    let nu = mu_lam / rho;
    let d2 = d * d;
    let sqrt_k = k.max(0.0).sqrt();
    let viscous = 500.0 * nu / (d2 * omega);
    let arg1 = (sqrt_k / (c.beta_star * omega * d))
        .max(viscous)
        .min(4.0 * rho * c.sigma_w2 * k / (cd_kw * d2));
    let arg2 = (2.0 * sqrt_k / (c.beta_star * omega * d)).max(viscous);
    Blending {
        f1: arg1.powi(4).tanh(),
        f2: (arg2 * arg2).tanh(),
        cross_diffusion: cd_kw,
    }
}

/// Menter shear-stress-transport model. Transports `rho k` and
/// `rho omega`; the blending of every point is refreshed after the
/// gradients.
#[derive(Clone, Debug)]
pub struct SstClosure {
    constants: SstConstants,
    blending: Vec<Blending>,
}

impl SstClosure {
    pub fn new(n_point: usize) -> Self {
        Self::with_constants(n_point, SstConstants::default())
    }

    pub fn with_constants(n_point: usize, constants: SstConstants) -> Self {
        Self {
            constants,
            blending: vec![Blending::default(); n_point],
        }
    }

    pub fn constants(&self) -> &SstConstants {
        &self.constants
    }
}

impl TurbulenceClosure for SstClosure {
    fn name(&self) -> &'static str {
        "Menter SST"
    }

    fn n_var(&self) -> usize {
        2
    }

    fn field_names(&self) -> Vec<String> {
        vec!["TKE".to_string(), "Omega".to_string()]
    }

    fn free_stream_solution(&self, free_stream: &FreeStream) -> Vec<f64> {
        let t = &free_stream.turbulence;
        vec![free_stream.density * t.kine, free_stream.density * t.omega]
    }

    fn values(&self, solution: &[f64], rho: f64, out: &mut [f64]) {
        out[0] = solution[0] / rho;
        out[1] = solution[1] / rho;
    }

    fn solution(&self, values: &[f64], rho: f64, out: &mut [f64]) {
        out[0] = rho * values[0];
        out[1] = rho * values[1];
    }

    fn prepare(&mut self, geometry: &Geometry, flow: &VariableStore, turbulence: &VariableStore) {
        let f = FlowIndex::new(geometry.n_dim());
        let c = self.constants;
        for (i, blend) in self.blending.iter_mut().enumerate() {
            let prim = flow.primitive(i);
            let values = turbulence.primitive(i);
            *blend = blending_functions(
                &c,
                prim[f.density()],
                prim[f.mu_lam()],
                values[0],
                values[1],
                turbulence.grad(i, 0),
                turbulence.grad(i, 1),
                geometry.point(i).wall_distance(),
            );
        }
    }

    fn blending(&self, i: usize) -> Blending {
        self.blending[i]
    }

    /// `mu_t = a1 rho k / max(a1 omega, S F2)`.
    fn eddy_viscosity(
        &self,
        i: usize,
        flow_prim: &[f64],
        flow_grad: &[f64],
        values: &[f64],
        f: FlowIndex,
    ) -> f64 {
        let n_dim = f.n_dim();
        let a1 = self.constants.a1;
        let strain = strain_magnitude(velocity_gradient(flow_grad, n_dim), n_dim);
        let den = (a1 * values[1]).max(strain * self.blending[i].f2);
        if den > 0.0 {
            a1 * flow_prim[f.density()] * values[0].max(0.0) / den
        } else {
            0.0
        }
    }

    /// `k = 0` and `omega = 60 nu / (beta1 d^2)`.
    fn wall_solution(&self, flow_prim: &[f64], distance: f64, f: FlowIndex) -> Vec<f64> {
        let rho = flow_prim[f.density()];
        let nu = flow_prim[f.mu_lam()] / rho;
        let d = distance.max(WALL_DISTANCE_MIN);
        vec![0.0, rho * 60.0 * nu / (self.constants.beta1 * d * d)]
    }

    fn clip(&self, values: &mut [f64]) {
        values[0] = values[0].clamp(K_MIN, K_MAX);
        values[1] = values[1].clamp(OMEGA_MIN, OMEGA_MAX);
    }

    fn viscous_numerics(&self, n_dim: usize, corrected: bool) -> Box<dyn ViscousNumerics> {
        Box::new(AvgGradSst::new(n_dim, self.constants, corrected))
    }

    fn source_numerics(&self) -> Box<dyn SourceNumerics> {
        Box::new(SstSource::new(self.constants))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn blending_is_one_on_the_wall() {
        let c = SstConstants::default();
        let b = blending_functions(&c, 1.0, 1e-5, 1e-3, 10.0, &[0.1, 0.0], &[0.0, 0.1], 0.0);
        assert_eq!((b.f1, b.f2), (1.0, 1.0));
    }

    #[test]
    fn blending_vanishes_far_from_walls() {
        let c = SstConstants::default();
        let b = blending_functions(&c, 1.0, 1e-5, 1e-6, 100.0, &[0.0, 0.0], &[0.0, 0.0], 100.0);
        assert!(b.f1 < 1e-6, "f1 = {}", b.f1);
        assert!(b.f2 < 1e-6, "f2 = {}", b.f2);
    }

    #[test]
    fn cross_diffusion_floor_keeps_arg1_finite() {
        let c = SstConstants::default();
        // opposite gradients give a negative raw cross-diffusion
        let b = blending_functions(&c, 1.0, 1e-5, 1e-2, 1.0, &[1.0, 0.0], &[-1.0, 0.0], 0.01);
        assert_relative_eq!(b.cross_diffusion, CD_KW_MIN);
        assert!(b.f1.is_finite() && (0.0..=1.0).contains(&b.f1));
    }

    #[test]
    fn stored_cross_diffusion_is_floored() {
        let c = SstConstants::default();
        let b = blending_functions(&c, 1.0, 1e-5, 1e-3, 10.0, &[1.0, 0.0], &[-1.0, 0.0], 0.1);
        assert!(b.cross_diffusion >= CD_KW_MIN);
        let wall = blending_functions(&c, 1.0, 1e-5, 1e-3, 10.0, &[1.0, 0.0], &[-1.0, 0.0], 0.0);
        assert_relative_eq!(wall.cross_diffusion, CD_KW_MIN);

        let b = blending_functions(&c, 1.0, 1e-5, 1e-3, 10.0, &[1.0, 0.0], &[1.0, 0.0], 0.1);
        assert_relative_eq!(b.cross_diffusion, 2.0 * c.sigma_w2 / 10.0, max_relative = 1e-12);
    }

    #[test]
    fn eddy_viscosity_without_strain() {
        let f = FlowIndex::new(2);
        let sst = SstClosure::new(1);
        let mut prim = vec![0.0; f.n_prim()];
        prim[f.density()] = 1.2;
        let grad = vec![0.0; f.n_grad() * 2];
        let mu_t = sst.eddy_viscosity(0, &prim, &grad, &[0.5, 10.0], f);
        assert_relative_eq!(mu_t, 1.2 * 0.5 / 10.0);
    }

    #[test]
    fn wall_omega() {
        let f = FlowIndex::new(2);
        let sst = SstClosure::new(1);
        let mut prim = vec![0.0; f.n_prim()];
        prim[f.density()] = 1.0;
        prim[f.mu_lam()] = 1e-5;
        let wall = sst.wall_solution(&prim, 0.01, f);
        assert_eq!(wall[0], 0.0);
        assert_relative_eq!(wall[1], 60.0 * 1e-5 / (0.075 * 1e-4));
    }
}

use crate::{
    numerics::{
        divergence, strain_magnitude, velocity_gradient, vorticity_magnitude, FluxOutput,
        SourceNumerics, SourcePoint,
    },
    variable::FlowIndex,
};

/// Below this wall distance no source is applied.
const MIN_WALL_DISTANCE: f64 = 1e-10;

const CV1: f64 = 7.1;
const CB1: f64 = 0.1355;
const CB2: f64 = 0.622;
const SIGMA: f64 = 2.0 / 3.0;
const KAPPA: f64 = 0.41;
const CW2: f64 = 0.3;
const CW3: f64 = 2.0;

/// `fv1` of the Spalart-Allmaras model for `chi = nu_tilde / nu`.
pub fn sa_fv1(chi: f64) -> f64 {
    let chi3 = chi.powi(3);
    chi3 / (chi3 + CV1.powi(3))
}

/// Production, destruction and cross-production of the Spalart-Allmaras
/// working variable.
pub struct SaSource {
    out: FluxOutput,
}

impl SaSource {
    pub fn new() -> Self {
        Self { out: FluxOutput::new(1) }
    }
}

impl Default for SaSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceNumerics for SaSource {
    fn compute(&mut self, point: &SourcePoint<'_>, implicit: bool) -> &FluxOutput {
        self.out.clear(implicit);
        let d = point.wall_distance;
        if d <= MIN_WALL_DISTANCE {
            return &self.out;
        }
        let n_dim = flow_dims(point.prim);
        let f = FlowIndex::new(n_dim);
        let cw1 = CB1 / (KAPPA * KAPPA) + (1.0 + CB2) / SIGMA;
        let cw3_6 = CW3.powi(6);

        let nu = point.prim[f.mu_lam()] / point.prim[f.density()];
        let nu_tilde = point.scalar[0];
        let omega = vorticity_magnitude(velocity_gradient(point.grad, n_dim), n_dim);
        let grad2: f64 = point.scalar_grad.iter().map(|g| g * g).sum();

        let chi = nu_tilde / nu;
        let fv1 = sa_fv1(chi);
        let fv2 = 1.0 - chi / (1.0 + chi * fv1);
        let inv_k2_d2 = 1.0 / (KAPPA * KAPPA * d * d);
        let shat_raw = omega + nu_tilde * fv2 * inv_k2_d2;
        let shat = shat_raw.max(1e-10);
        let r = (nu_tilde / shat * inv_k2_d2).min(10.0);
        let g = r + CW2 * (r.powi(6) - r);
        let g6 = g.powi(6);
        let glim = ((1.0 + cw3_6) / (g6 + cw3_6)).powf(1.0 / 6.0);
        let fw = g * glim;

        let production = CB1 * shat * nu_tilde;
        let destruction = cw1 * fw * nu_tilde * nu_tilde / (d * d);
        let cross = CB2 / SIGMA * grad2;
        self.out.residual[0] = (production - destruction + cross) * point.volume;

        if implicit {
            let dfv1 = 3.0 * chi * chi * CV1.powi(3) / (nu * (chi.powi(3) + CV1.powi(3)).powi(2));
            let dfv2 = -(1.0 / nu - chi * chi * dfv1) / (1.0 + chi * fv1).powi(2);
            let dshat = if shat_raw <= 1e-10 {
                0.0
            } else {
                (fv2 + nu_tilde * dfv2) * inv_k2_d2
            };
            let dr = if r >= 10.0 {
                0.0
            } else {
                (shat - nu_tilde * dshat) / (shat * shat) * inv_k2_d2
            };
            let dg = dr * (1.0 + CW2 * (6.0 * r.powi(5) - 1.0));
            let dfw = dg * glim * (1.0 - g6 / (g6 + cw3_6));
            let jac = CB1 * (nu_tilde * dshat + shat)
                - cw1 * (dfw * nu_tilde + 2.0 * fw) * nu_tilde / (d * d);
            self.out.jacobian_i.write(0, 0, jac * point.volume);
        }
        &self.out
    }

    fn name(&self) -> &'static str {
        "SA source"
    }
}

fn flow_dims(prim: &[f64]) -> usize {
    prim.len() - 7
}

/// Closure coefficients of the Menter SST model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SstConstants {
    pub sigma_k1: f64,
    pub sigma_k2: f64,
    pub sigma_w1: f64,
    pub sigma_w2: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub beta_star: f64,
    pub a1: f64,
    pub kappa: f64,
}

impl Default for SstConstants {
    fn default() -> Self {
        Self {
            sigma_k1: 0.85,
            sigma_k2: 1.0,
            sigma_w1: 0.5,
            sigma_w2: 0.856,
            beta1: 0.075,
            beta2: 0.0828,
            beta_star: 0.09,
            a1: 0.31,
            kappa: 0.41,
        }
    }
}

impl SstConstants {
    pub fn alpha1(&self) -> f64 {
        self.beta1 / self.beta_star
            - self.sigma_w1 * self.kappa * self.kappa / self.beta_star.sqrt()
    }

    pub fn alpha2(&self) -> f64 {
        self.beta2 / self.beta_star
            - self.sigma_w2 * self.kappa * self.kappa / self.beta_star.sqrt()
    }
}

/// Production, destruction and cross-diffusion of `k` and `omega`.
pub struct SstSource {
    constants: SstConstants,
    out: FluxOutput,
}

impl SstSource {
    pub fn new(constants: SstConstants) -> Self {
        Self {
            constants,
            out: FluxOutput::new(2),
        }
    }
}

impl SourceNumerics for SstSource {
    fn compute(&mut self, point: &SourcePoint<'_>, implicit: bool) -> &FluxOutput {
        self.out.clear(implicit);
        if point.wall_distance <= MIN_WALL_DISTANCE {
            return &self.out;
        }
        let c = &self.constants;
        let n_dim = flow_dims(point.prim);
        let f = FlowIndex::new(n_dim);
        let rho = point.prim[f.density()];
        let [k, omega, mu_turb] = [0, 1, 2].map(|v| point.scalar_prim[v]);
        let f1 = point.f1;
        let alpha = f1 * c.alpha1() + (1.0 - f1) * c.alpha2();
        let beta = f1 * c.beta1 + (1.0 - f1) * c.beta2;

        let grad_v = velocity_gradient(point.grad, n_dim);
        let strain = strain_magnitude(grad_v, n_dim);
        let div = divergence(grad_v, n_dim);

        let pk = (mu_turb * strain * strain - 2.0 / 3.0 * rho * k * div)
            .min(20.0 * c.beta_star * rho * k * omega)
            .max(0.0);
        let zeta = omega.max(strain * point.f2 / c.a1);
        let pw = (strain * strain - 2.0 / 3.0 * zeta * div).max(0.0);

        let vol = point.volume;
        self.out.residual[0] = (pk - c.beta_star * rho * omega * k) * vol;
        let cross = (1.0 - f1) * point.cross_diffusion;
        self.out.residual[1] = (alpha * rho * pw - beta * rho * omega * omega + cross) * vol;

        if implicit {
            let jac = &mut self.out.jacobian_i;
            jac.write(0, 0, -c.beta_star * omega * vol);
            jac.write(0, 1, -c.beta_star * k * vol);
            jac.write(1, 1, -2.0 * beta * omega * vol);
        }
        &self.out
    }

    fn name(&self) -> &'static str {
        "SST source"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn flow_prim(mu: f64) -> Vec<f64> {
        // T, u, v, p, rho, h, c, mu_lam, mu_turb
        vec![1.0, 0.5, 0.0, 1.0, 1.0, 3.5, 1.18, mu, 0.0]
    }

    fn shear_gradient(dudy: f64) -> Vec<f64> {
        let mut grad = vec![0.0; 10];
        // row u, column y
        grad[3] = dudy;
        grad
    }

    fn sa_residual(nu_tilde: f64, implicit: bool) -> (f64, f64) {
        let prim = flow_prim(1e-3);
        let grad = shear_gradient(10.0);
        let mut source = SaSource::new();
        let out = source.compute(
            &SourcePoint {
                volume: 0.5,
                wall_distance: 0.1,
                prim: &prim,
                grad: &grad,
                scalar: &[nu_tilde],
                scalar_prim: &[nu_tilde, 0.0],
                scalar_grad: &[0.2, -0.1],
                f1: 0.0,
                f2: 0.0,
                cross_diffusion: 0.0,
            },
            implicit,
        );
        (out.residual[0], out.jacobian_i.read(0, 0))
    }

    #[test]
    fn sa_jacobian_matches_finite_differences() {
        let nu_tilde = 5e-3;
        let (_, jac) = sa_residual(nu_tilde, true);
        let h = 1e-8;
        let fd =
            (sa_residual(nu_tilde + h, false).0 - sa_residual(nu_tilde - h, false).0) / (2.0 * h);
        assert_relative_eq!(jac, fd, max_relative = 1e-5);
    }

    #[test]
    fn sa_source_vanishes_on_the_wall() {
        let prim = flow_prim(1e-3);
        let grad = shear_gradient(10.0);
        let mut source = SaSource::new();
        let out = source.compute(
            &SourcePoint {
                volume: 1.0,
                wall_distance: 0.0,
                prim: &prim,
                grad: &grad,
                scalar: &[1e-3],
                scalar_prim: &[1e-3, 0.0],
                scalar_grad: &[1.0, 1.0],
                f1: 0.0,
                f2: 0.0,
                cross_diffusion: 0.0,
            },
            true,
        );
        assert_eq!(out.residual[0], 0.0);
        assert_eq!(out.jacobian_i.read(0, 0), 0.0);
    }

    #[test]
    fn sst_decay_without_shear() {
        let c = SstConstants::default();
        let prim = flow_prim(1e-3);
        let grad = vec![0.0; 10];
        let (k, omega) = (0.01, 5.0);
        let mut source = SstSource::new(c);
        let out = source.compute(
            &SourcePoint {
                volume: 2.0,
                wall_distance: 0.5,
                prim: &prim,
                grad: &grad,
                scalar: &[k, omega],
                scalar_prim: &[k, omega, 0.002],
                scalar_grad: &[0.0; 4],
                f1: 1.0,
                f2: 1.0,
                cross_diffusion: 3.0,
            },
            true,
        );
        assert_relative_eq!(out.residual[0], -c.beta_star * omega * k * 2.0, epsilon = 1e-14);
        assert_relative_eq!(out.residual[1], -c.beta1 * omega * omega * 2.0, epsilon = 1e-14);
        let expected = -2.0 * c.beta1 * omega * 2.0;
        assert_relative_eq!(out.jacobian_i.read(1, 1), expected, epsilon = 1e-14);
        assert_eq!(out.jacobian_i.read(1, 0), 0.0);
    }

    #[test]
    fn sst_production_is_limited() {
        let prim = flow_prim(1e-3);
        let grad = shear_gradient(1e3);
        let c = SstConstants::default();
        let (k, omega) = (1e-3, 1.0);
        let mut source = SstSource::new(c);
        let out = source.compute(
            &SourcePoint {
                volume: 1.0,
                wall_distance: 0.5,
                prim: &prim,
                grad: &grad,
                scalar: &[k, omega],
                scalar_prim: &[k, omega, 1.0],
                scalar_grad: &[0.0; 4],
                f1: 1.0,
                f2: 0.0,
                cross_diffusion: 0.0,
            },
            false,
        );
        let cap = 20.0 * c.beta_star * k * omega;
        assert_relative_eq!(out.residual[0], cap - c.beta_star * omega * k, epsilon = 1e-14);
    }
}

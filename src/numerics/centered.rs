use crate::numerics::{
    inviscid_proj_flux, inviscid_proj_jac, CenteredEdge, CenteredNumerics, FlowState, FluxOutput,
};

const STRETCHING_EXPONENT: f64 = 0.3;

/// Central flux of the mean state plus the shared dissipation bookkeeping of
/// the centered schemes.
struct CenteredBase {
    gamma: f64,
    out: FluxOutput,
    mean: Vec<f64>,
    diff_u: Vec<f64>,
}

impl CenteredBase {
    fn new(n_dim: usize, gamma: f64) -> Self {
        Self {
            gamma,
            out: FluxOutput::new(n_dim + 2),
            mean: vec![0.0; n_dim + 7],
            diff_u: vec![0.0; n_dim + 2],
        }
    }

    /// Central flux and its Jacobians; returns `(mean_lambda, stretching)`.
    fn central(&mut self, edge: &CenteredEdge<'_>, implicit: bool) -> (f64, f64) {
        let s = &edge.states;
        let n_dim = s.normal.len();
        self.out.clear(implicit);
        for (m, (a, b)) in self.mean.iter_mut().zip(s.prim_i.iter().zip(s.prim_j)) {
            *m = 0.5 * (a + b);
        }
        inviscid_proj_flux(&self.mean, s.normal, &mut self.out.residual);
        if implicit {
            inviscid_proj_jac(s.prim_i, s.normal, self.gamma, 0.5, &mut self.out.jacobian_i);
            inviscid_proj_jac(s.prim_j, s.normal, self.gamma, 0.5, &mut self.out.jacobian_j);
        }

        // density, momentum and rho H
        let si = FlowState::new(s.prim_i, n_dim);
        let sj = FlowState::new(s.prim_j, n_dim);
        self.diff_u[0] = si.rho - sj.rho;
        for d in 0..n_dim {
            self.diff_u[1 + d] = si.rho * si.vel[d] - sj.rho * sj.vel[d];
        }
        self.diff_u[n_dim + 1] = si.rho * si.h - sj.rho * sj.h;

        let mean_lambda = 0.5 * (edge.lambda_i + edge.lambda_j);
        if mean_lambda <= 0.0 {
            return (0.0, 0.0);
        }
        let phi_i = (edge.lambda_i / (4.0 * mean_lambda)).powf(STRETCHING_EXPONENT);
        let phi_j = (edge.lambda_j / (4.0 * mean_lambda)).powf(STRETCHING_EXPONENT);
        let stretching = if phi_i + phi_j > 0.0 {
            4.0 * phi_i * phi_j / (phi_i + phi_j)
        } else {
            0.0
        };
        (mean_lambda, stretching)
    }

    /// Jacobian of the dissipation `cte_i (U_i - U_j)` with the energy row
    /// written for `rho H`.
    fn dissipation_jacobian(&mut self, edge: &CenteredEdge<'_>, cte_i: f64, cte_j: f64) {
        let s = &edge.states;
        let n_dim = s.normal.len();
        let n_var = n_dim + 2;
        let gm1 = self.gamma - 1.0;
        let e = n_var - 1;
        let add =
            |m: &mut faer::Mat<f64>, r: usize, c: usize, v: f64| m.write(r, c, m.read(r, c) + v);
        for v in 0..n_var {
            add(&mut self.out.jacobian_i, v, v, cte_i);
            add(&mut self.out.jacobian_j, v, v, -cte_j);
        }
        let si = FlowState::new(s.prim_i, n_dim);
        let sj = FlowState::new(s.prim_j, n_dim);
        add(&mut self.out.jacobian_i, e, 0, cte_i * gm1 * 0.5 * si.q2());
        add(&mut self.out.jacobian_j, e, 0, -cte_j * gm1 * 0.5 * sj.q2());
        for d in 0..n_dim {
            add(&mut self.out.jacobian_i, e, 1 + d, -cte_i * gm1 * si.vel[d]);
            add(&mut self.out.jacobian_j, e, 1 + d, cte_j * gm1 * sj.vel[d]);
        }
        add(&mut self.out.jacobian_i, e, e, cte_i * gm1);
        add(&mut self.out.jacobian_j, e, e, -cte_j * gm1);
    }
}

/// Jameson-Schmidt-Turkel scheme: blended second and fourth difference
/// artificial dissipation driven by a pressure sensor.
pub struct Jst {
    base: CenteredBase,
    k2: f64,
    k4: f64,
}

impl Jst {
    pub fn new(n_dim: usize, gamma: f64, k2: f64, k4: f64) -> Self {
        Self {
            base: CenteredBase::new(n_dim, gamma),
            k2,
            k4,
        }
    }
}

impl CenteredNumerics for Jst {
    fn compute(&mut self, edge: &CenteredEdge<'_>, implicit: bool) -> &FluxOutput {
        let (mean_lambda, stretching) = self.base.central(edge, implicit);
        let (ni, nj) = (edge.neighbors_i as f64, edge.neighbors_j as f64);
        let sc2 = 3.0 * (ni + nj) / (ni * nj);
        let sc4 = sc2 * sc2 / 4.0;
        let eps2 = self.k2 * 0.5 * (edge.sensor_i + edge.sensor_j) * sc2;
        let eps4 = (self.k4 - eps2).max(0.0) * sc4;
        let scale = stretching * mean_lambda;

        for v in 0..self.base.out.n_var() {
            let diff_lapl = edge.laplacian_i[v] - edge.laplacian_j[v];
            self.base.out.residual[v] += (eps2 * self.base.diff_u[v] - eps4 * diff_lapl) * scale;
        }
        if implicit {
            let cte_i = (eps2 + eps4 * (ni + 1.0)) * scale;
            let cte_j = (eps2 + eps4 * (nj + 1.0)) * scale;
            self.base.dissipation_jacobian(edge, cte_i, cte_j);
        }
        &self.base.out
    }

    fn name(&self) -> &'static str {
        "JST"
    }
}

/// Lax-Friedrichs scheme: scalar first-order dissipation.
pub struct LaxFriedrichs {
    base: CenteredBase,
    k0: f64,
}

impl LaxFriedrichs {
    pub fn new(n_dim: usize, gamma: f64, k0: f64) -> Self {
        Self {
            base: CenteredBase::new(n_dim, gamma),
            k0,
        }
    }
}

impl CenteredNumerics for LaxFriedrichs {
    fn compute(&mut self, edge: &CenteredEdge<'_>, implicit: bool) -> &FluxOutput {
        let n_dim = edge.states.normal.len() as f64;
        let (mean_lambda, stretching) = self.base.central(edge, implicit);
        let (ni, nj) = (edge.neighbors_i as f64, edge.neighbors_j as f64);
        let sc0 = 3.0 * (ni + nj) / (ni * nj);
        let eps0 = self.k0 * sc0 * n_dim / 3.0;
        let cte = eps0 * stretching * mean_lambda;
        for v in 0..self.base.out.n_var() {
            self.base.out.residual[v] += cte * self.base.diff_u[v];
        }
        if implicit {
            self.base.dissipation_jacobian(edge, cte, cte);
        }
        &self.base.out
    }

    fn name(&self) -> &'static str {
        "Lax-Friedrichs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numerics::EdgeStates;
    use approx::assert_relative_eq;

    fn prim(rho: f64, u: f64, p: f64) -> Vec<f64> {
        let g: f64 = 1.4;
        let h = g / (g - 1.0) * p / rho + 0.5 * u * u;
        vec![p / rho, u, 0.0, p, rho, h, (g * p / rho).sqrt(), 0.0, 0.0]
    }

    fn edge<'a>(vi: &'a [f64], vj: &'a [f64], lap: &'a [f64], sensor: f64) -> CenteredEdge<'a> {
        CenteredEdge {
            states: EdgeStates {
                normal: &[1.0, 0.0],
                prim_i: vi,
                prim_j: vj,
                scalar_i: &[],
                scalar_j: &[],
            },
            laplacian_i: lap,
            laplacian_j: lap,
            sensor_i: sensor,
            sensor_j: sensor,
            lambda_i: 2.0,
            lambda_j: 2.0,
            neighbors_i: 4,
            neighbors_j: 4,
        }
    }

    #[test]
    fn uniform_state_has_no_dissipation() {
        let v = prim(1.0, 0.5, 1.0);
        let lap = [0.0; 4];
        let mut jst = Jst::new(2, 1.4, 0.5, 0.02);
        let out = jst.compute(&edge(&v, &v, &lap, 0.3), false).residual.clone();
        let mut f = [0.0; 4];
        inviscid_proj_flux(&v, &[1.0, 0.0], &mut f);
        for k in 0..4 {
            assert_relative_eq!(out[k], f[k], epsilon = 1e-14);
        }
    }

    #[test]
    fn lax_friedrichs_damps_jumps() {
        let vi = prim(1.1, 0.5, 1.0);
        let vj = prim(1.0, 0.5, 1.0);
        let lap = [0.0; 4];
        let mut lax = LaxFriedrichs::new(2, 1.4, 0.15);
        let out = lax.compute(&edge(&vi, &vj, &lap, 0.0), true);
        // stretching factor is 1/2^0.6 * 2 for equal lambdas
        let phi = 0.25f64.powf(0.3);
        let cte = 0.15 * 1.5 * 2.0 / 3.0 * (2.0 * phi) * 2.0;
        let mean = prim(1.05, 0.5, 1.0);
        let mut f = [0.0; 4];
        inviscid_proj_flux(&mean, &[1.0, 0.0], &mut f);
        assert_relative_eq!(out.residual[0], f[0] + cte * 0.1, epsilon = 1e-12);
        assert!(out.jacobian_i.read(0, 0) > 0.0);
    }
}

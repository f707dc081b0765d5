use faer::Mat;

use crate::numerics::{
    inviscid_proj_flux, inviscid_proj_jac, ConvectiveNumerics, EdgeStates, FlowState, FluxOutput,
};

/// Roe's approximate Riemann solver with the Harten-Hyman entropy fix.
pub struct Roe {
    gamma: f64,
    entropy_fix: f64,
    out: FluxOutput,
    flux_i: Vec<f64>,
    flux_j: Vec<f64>,
    delta: Vec<f64>,
    diss: Vec<f64>,
    unit: Vec<f64>,
}

/// Roe-averaged state across one face.
struct RoeAverage {
    rho: f64,
    vel: Vec<f64>,
    h: f64,
    c: f64,
    vn: f64,
    q2: f64,
}

impl Roe {
    pub fn new(n_dim: usize, gamma: f64, entropy_fix: f64) -> Self {
        let n_var = n_dim + 2;
        Self {
            gamma,
            entropy_fix,
            out: FluxOutput::new(n_var),
            flux_i: vec![0.0; n_var],
            flux_j: vec![0.0; n_var],
            delta: vec![0.0; n_var],
            diss: vec![0.0; n_var],
            unit: vec![0.0; n_dim],
        }
    }

    fn average(&self, i: &FlowState<'_>, j: &FlowState<'_>, unit: &[f64]) -> RoeAverage {
        let r = (j.rho / i.rho).sqrt();
        let vel: Vec<f64> = i
            .vel
            .iter()
            .zip(j.vel)
            .map(|(vi, vj)| (r * vj + vi) / (r + 1.0))
            .collect();
        let h = (r * j.h + i.h) / (r + 1.0);
        let q2: f64 = vel.iter().map(|v| v * v).sum();
        let c2 = (self.gamma - 1.0) * (h - 0.5 * q2);
        let vn = vel.iter().zip(unit).map(|(v, n)| v * n).sum();
        RoeAverage {
            rho: r * i.rho,
            vel,
            h,
            c: c2.max(0.0).sqrt(),
            vn,
            q2,
        }
    }

    /// Absolute eigenvalues `[|vn - c|, |vn|, |vn + c|]` after the entropy fix.
    fn eigenvalues(
        &self,
        avg: &RoeAverage,
        i: &FlowState<'_>,
        j: &FlowState<'_>,
        unit: &[f64],
    ) -> [f64; 3] {
        let vn_i = i.proj_vel(unit);
        let vn_j = j.proj_vel(unit);
        let waves = [
            (avg.vn - avg.c, vn_i - i.c, vn_j - j.c),
            (avg.vn, vn_i, vn_j),
            (avg.vn + avg.c, vn_i + i.c, vn_j + j.c),
        ];
        let floor = self.entropy_fix * (avg.vn.abs() + avg.c);
        waves.map(|(l, li, lj)| {
            let eps = (4.0 * (l - li).max(lj - l).max(0.0)).max(floor);
            if l.abs() < eps {
                0.5 * (l * l / eps + eps)
            } else {
                l.abs()
            }
        })
    }

    /// `|A| du` for a conservative jump `du`, `A` taken at the Roe average.
    fn dissipation(
        &self,
        avg: &RoeAverage,
        lambda: [f64; 3],
        unit: &[f64],
        du: &[f64],
        out: &mut [f64],
    ) {
        let n_dim = unit.len();
        let gm1 = self.gamma - 1.0;
        let drho = du[0];
        let dvel: Vec<f64> = (0..n_dim)
            .map(|d| (du[1 + d] - avg.vel[d] * drho) / avg.rho)
            .collect();
        let dmom_dot_v: f64 = (0..n_dim).map(|d| avg.vel[d] * du[1 + d]).sum();
        let dp = gm1 * (du[n_dim + 1] - dmom_dot_v + 0.5 * avg.q2 * drho);
        let dvn: f64 = dvel.iter().zip(unit).map(|(a, b)| a * b).sum();
        let c2 = avg.c * avg.c;

        let alpha_m = (dp - avg.rho * avg.c * dvn) / (2.0 * c2);
        let alpha_p = (dp + avg.rho * avg.c * dvn) / (2.0 * c2);
        let alpha_0 = drho - dp / c2;
        let [l_m, l_0, l_p] = lambda;

        out[0] = l_0 * alpha_0 + l_m * alpha_m + l_p * alpha_p;
        let mut shear_energy = 0.0;
        for d in 0..n_dim {
            let shear = avg.rho * (dvel[d] - dvn * unit[d]);
            shear_energy += avg.vel[d] * shear;
            out[1 + d] = l_0 * (alpha_0 * avg.vel[d] + shear)
                + l_m * alpha_m * (avg.vel[d] - avg.c * unit[d])
                + l_p * alpha_p * (avg.vel[d] + avg.c * unit[d]);
        }
        out[n_dim + 1] = l_0 * (alpha_0 * 0.5 * avg.q2 + shear_energy)
            + l_m * alpha_m * (avg.h - avg.c * avg.vn)
            + l_p * alpha_p * (avg.h + avg.c * avg.vn);
    }
}

impl ConvectiveNumerics for Roe {
    fn compute(&mut self, edge: &EdgeStates<'_>, implicit: bool) -> &FluxOutput {
        let n_dim = edge.normal.len();
        let n_var = n_dim + 2;
        let area = edge.normal.iter().map(|n| n * n).sum::<f64>().sqrt();
        self.out.clear(implicit);
        if area == 0.0 {
            return &self.out;
        }
        for d in 0..n_dim {
            self.unit[d] = edge.normal[d] / area;
        }

        let si = FlowState::new(edge.prim_i, n_dim);
        let sj = FlowState::new(edge.prim_j, n_dim);
        let avg = self.average(&si, &sj, &self.unit);
        let lambda = self.eigenvalues(&avg, &si, &sj, &self.unit);

        inviscid_proj_flux(edge.prim_i, edge.normal, &mut self.flux_i);
        inviscid_proj_flux(edge.prim_j, edge.normal, &mut self.flux_j);
        let ui = si.conservative();
        let uj = sj.conservative();
        for v in 0..n_var {
            self.delta[v] = uj[v] - ui[v];
        }
        let mut diss = std::mem::take(&mut self.diss);
        self.dissipation(&avg, lambda, &self.unit, &self.delta, &mut diss);
        for v in 0..n_var {
            self.out.residual[v] = 0.5 * (self.flux_i[v] + self.flux_j[v]) - 0.5 * area * diss[v];
        }

        if implicit {
            inviscid_proj_jac(edge.prim_i, edge.normal, self.gamma, 0.5, &mut self.out.jacobian_i);
            inviscid_proj_jac(edge.prim_j, edge.normal, self.gamma, 0.5, &mut self.out.jacobian_j);
            let mut e = vec![0.0; n_var];
            for c in 0..n_var {
                e.iter_mut().enumerate().for_each(|(k, x)| *x = if k == c { 1.0 } else { 0.0 });
                self.dissipation(&avg, lambda, &self.unit, &e, &mut diss);
                for r in 0..n_var {
                    let a = 0.5 * area * diss[r];
                    let ji = &mut self.out.jacobian_i;
                    ji.write(r, c, ji.read(r, c) + a);
                    let jj = &mut self.out.jacobian_j;
                    jj.write(r, c, jj.read(r, c) - a);
                }
            }
        }
        self.diss = diss;
        &self.out
    }

    fn name(&self) -> &'static str {
        "Roe"
    }
}

/// First-order upwinding of transported scalars with the flow velocity.
pub struct ScalarUpwind {
    out: FluxOutput,
}

impl ScalarUpwind {
    pub fn new(n_var: usize) -> Self {
        Self {
            out: FluxOutput::new(n_var),
        }
    }
}

impl ConvectiveNumerics for ScalarUpwind {
    fn compute(&mut self, edge: &EdgeStates<'_>, implicit: bool) -> &FluxOutput {
        let n_dim = edge.normal.len();
        self.out.clear(implicit);
        let vn_i = FlowState::new(edge.prim_i, n_dim).proj_vel(edge.normal);
        let vn_j = FlowState::new(edge.prim_j, n_dim).proj_vel(edge.normal);
        let q = 0.5 * (vn_i + vn_j);
        let a0 = 0.5 * (q + q.abs());
        let a1 = 0.5 * (q - q.abs());
        for (v, r) in self.out.residual.iter_mut().enumerate() {
            *r = a0 * edge.scalar_i[v] + a1 * edge.scalar_j[v];
        }
        if implicit {
            for v in 0..self.out.n_var() {
                self.out.jacobian_i.write(v, v, a0);
                self.out.jacobian_j.write(v, v, a1);
            }
        }
        &self.out
    }

    fn name(&self) -> &'static str {
        "Scalar upwind"
    }
}

/// Dense `|A|` at a given state pair, for tests and diagnostics.
pub fn roe_dissipation_matrix(
    roe: &Roe,
    prim_i: &[f64],
    prim_j: &[f64],
    normal: &[f64],
) -> Mat<f64> {
    let n_dim = normal.len();
    let n_var = n_dim + 2;
    let area = normal.iter().map(|n| n * n).sum::<f64>().sqrt();
    let unit: Vec<f64> = normal.iter().map(|n| n / area).collect();
    let si = FlowState::new(prim_i, n_dim);
    let sj = FlowState::new(prim_j, n_dim);
    let avg = roe.average(&si, &sj, &unit);
    let lambda = roe.eigenvalues(&avg, &si, &sj, &unit);
    let mut col = vec![0.0; n_var];
    let mut e = vec![0.0; n_var];
    let mut m = Mat::zeros(n_var, n_var);
    for c in 0..n_var {
        e.iter_mut().enumerate().for_each(|(k, x)| *x = if k == c { 1.0 } else { 0.0 });
        roe.dissipation(&avg, lambda, &unit, &e, &mut col);
        for r in 0..n_var {
            m.write(r, c, col[r]);
        }
    }
    m
}

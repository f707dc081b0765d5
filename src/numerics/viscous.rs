use crate::{
    freestream::FluidModel,
    numerics::{
        temperature_derivative, FlowState, FluxOutput, SstConstants, ViscousEdge, ViscousNumerics,
    },
    variable::FlowIndex,
};

/// Edge vector `x_j - x_i`, its squared length and `e . n / |e|^2`.
fn edge_geometry(edge: &ViscousEdge<'_>) -> (Vec<f64>, f64, f64) {
    let e: Vec<f64> = edge.coord_j.iter().zip(edge.coord_i).map(|(j, i)| j - i).collect();
    let dist2: f64 = e.iter().map(|x| x * x).sum();
    let proj: f64 = e.iter().zip(edge.normal).map(|(a, b)| a * b).sum::<f64>() / dist2;
    (e, dist2, proj)
}

/// Averages `n_var` gradient rows of both sides into `mean`; with
/// `corrected`, the component along the edge is replaced by the difference
/// quotient `(v_j - v_i) / |e|`.
#[allow(clippy::too_many_arguments)]
fn mean_gradient(
    grad_i: &[f64],
    grad_j: &[f64],
    values_i: &[f64],
    values_j: &[f64],
    e: &[f64],
    dist2: f64,
    corrected: bool,
    mean: &mut [f64],
) {
    let n_dim = e.len();
    for (k, row) in mean.chunks_exact_mut(n_dim).enumerate() {
        for d in 0..n_dim {
            row[d] = 0.5 * (grad_i[k * n_dim + d] + grad_j[k * n_dim + d]);
        }
        if corrected {
            let proj: f64 = row.iter().zip(e).map(|(g, x)| g * x).sum();
            let corr = (proj - (values_j[k] - values_i[k])) / dist2;
            row.iter_mut().zip(e).for_each(|(g, x)| *g -= corr * x);
        }
    }
}

/// Average-gradient viscous flux of the Navier-Stokes equations with a
/// thin-shear-layer Jacobian.
pub struct AvgGradFlow {
    fluid: FluidModel,
    corrected: bool,
    out: FluxOutput,
    mean_grad: Vec<f64>,
}

impl AvgGradFlow {
    pub fn new(n_dim: usize, fluid: FluidModel, corrected: bool) -> Self {
        Self {
            fluid,
            corrected,
            out: FluxOutput::new(n_dim + 2),
            mean_grad: vec![0.0; (n_dim + 1) * n_dim],
        }
    }
}

/// `tau = mu (grad v + grad v^T - 2/3 div I)` from velocity gradient rows.
pub fn stress_tensor(grad_v: &[f64], n_dim: usize, mu: f64) -> Vec<f64> {
    let div: f64 = (0..n_dim).map(|d| grad_v[d * n_dim + d]).sum();
    let mut tau = vec![0.0; n_dim * n_dim];
    for i in 0..n_dim {
        for j in 0..n_dim {
            tau[i * n_dim + j] = mu * (grad_v[i * n_dim + j] + grad_v[j * n_dim + i]);
        }
        tau[i * n_dim + i] -= 2.0 / 3.0 * mu * div;
    }
    tau
}

impl ViscousNumerics for AvgGradFlow {
    fn compute(&mut self, edge: &ViscousEdge<'_>, implicit: bool) -> &FluxOutput {
        let n_dim = edge.normal.len();
        let f = FlowIndex::new(n_dim);
        self.out.clear(implicit);
        let (e, dist2, _) = edge_geometry(edge);
        if dist2 == 0.0 {
            return &self.out;
        }

        // rows T and v only
        let rows = n_dim + 1;
        mean_gradient(
            &edge.grad_i[..rows * n_dim],
            &edge.grad_j[..rows * n_dim],
            &edge.prim_i[..rows],
            &edge.prim_j[..rows],
            &e,
            dist2,
            self.corrected,
            &mut self.mean_grad,
        );

        let mean = |k: usize| 0.5 * (edge.prim_i[k] + edge.prim_j[k]);
        let mu_lam = mean(f.mu_lam());
        let mu_turb = mean(f.mu_turb());
        let mu = mu_lam + mu_turb;
        let k = self.fluid.thermal_conductivity(mu_lam, mu_turb);
        let vel: Vec<f64> = (0..n_dim).map(|d| mean(f.velocity(d))).collect();

        let grad_t = &self.mean_grad[..n_dim];
        let tau = stress_tensor(&self.mean_grad[n_dim..], n_dim, mu);

        let mut energy = 0.0;
        for i in 0..n_dim {
            let tn: f64 = (0..n_dim).map(|j| tau[i * n_dim + j] * edge.normal[j]).sum();
            self.out.residual[1 + i] = tn;
            energy += tn * vel[i];
        }
        energy += k * grad_t.iter().zip(edge.normal).map(|(g, n)| g * n).sum::<f64>();
        self.out.residual[n_dim + 1] = energy;

        if implicit {
            let area2: f64 = edge.normal.iter().map(|n| n * n).sum();
            let dist = dist2.sqrt();
            let (mu_a, k_a) = (mu * area2.sqrt() / dist, k * area2.sqrt() / dist);
            for (prim, sign, jac) in [
                (edge.prim_i, -1.0, &mut self.out.jacobian_i),
                (edge.prim_j, 1.0, &mut self.out.jacobian_j),
            ] {
                let s = FlowState::new(prim, n_dim);
                let (gamma, r) = (self.fluid.gamma, self.fluid.gas_constant);
                let dt = temperature_derivative(prim, n_dim, gamma, r);
                for d in 0..n_dim {
                    // dv_d/dU = [-v_d, e_d, 0] / rho
                    jac.write(1 + d, 0, sign * mu_a * (-s.vel[d] / s.rho));
                    jac.write(1 + d, 1 + d, sign * mu_a / s.rho);
                }
                let e_row = n_dim + 1;
                for c in 0..n_dim + 2 {
                    let mut kin = 0.0;
                    for d in 0..n_dim {
                        kin += s.vel[d]
                            * match c {
                                0 => -s.vel[d] / s.rho,
                                c if c == 1 + d => 1.0 / s.rho,
                                _ => 0.0,
                            };
                    }
                    jac.write(e_row, c, sign * (mu_a * kin + k_a * dt[c]));
                }
            }
        }
        &self.out
    }

    fn name(&self) -> &'static str {
        if self.corrected {
            "Average of gradients with correction"
        } else {
            "Average of gradients"
        }
    }
}

const SA_SIGMA: f64 = 2.0 / 3.0;

/// Diffusion of the Spalart-Allmaras working variable.
pub struct AvgGradSa {
    corrected: bool,
    out: FluxOutput,
    mean_grad: Vec<f64>,
}

impl AvgGradSa {
    pub fn new(n_dim: usize, corrected: bool) -> Self {
        Self {
            corrected,
            out: FluxOutput::new(1),
            mean_grad: vec![0.0; n_dim],
        }
    }
}

impl ViscousNumerics for AvgGradSa {
    fn compute(&mut self, edge: &ViscousEdge<'_>, implicit: bool) -> &FluxOutput {
        let n_dim = edge.normal.len();
        let f = FlowIndex::new(n_dim);
        self.out.clear(implicit);
        let (e, dist2, proj_vector) = edge_geometry(edge);
        if dist2 == 0.0 {
            return &self.out;
        }
        mean_gradient(
            edge.scalar_grad_i,
            edge.scalar_grad_j,
            edge.scalar_i,
            edge.scalar_j,
            &e,
            dist2,
            self.corrected,
            &mut self.mean_grad,
        );
        let nu_i = edge.prim_i[f.mu_lam()] / edge.prim_i[f.density()];
        let nu_j = edge.prim_j[f.mu_lam()] / edge.prim_j[f.density()];
        let nu_e = 0.5 * (nu_i + nu_j + edge.scalar_i[0] + edge.scalar_j[0]);
        let proj_grad: f64 = self.mean_grad.iter().zip(edge.normal).map(|(g, n)| g * n).sum();

        self.out.residual[0] = nu_e * proj_grad / SA_SIGMA;
        if implicit {
            self.out
                .jacobian_i
                .write(0, 0, (0.5 * proj_grad - nu_e * proj_vector) / SA_SIGMA);
            self.out
                .jacobian_j
                .write(0, 0, (0.5 * proj_grad + nu_e * proj_vector) / SA_SIGMA);
        }
        &self.out
    }

    fn name(&self) -> &'static str {
        "SA diffusion"
    }
}

/// Diffusion of `k` and `omega` with F1-blended coefficients.
pub struct AvgGradSst {
    constants: SstConstants,
    corrected: bool,
    out: FluxOutput,
    mean_grad: Vec<f64>,
}

impl AvgGradSst {
    pub fn new(n_dim: usize, constants: SstConstants, corrected: bool) -> Self {
        Self {
            constants,
            corrected,
            out: FluxOutput::new(2),
            mean_grad: vec![0.0; 2 * n_dim],
        }
    }
}

impl ViscousNumerics for AvgGradSst {
    fn compute(&mut self, edge: &ViscousEdge<'_>, implicit: bool) -> &FluxOutput {
        let n_dim = edge.normal.len();
        let f = FlowIndex::new(n_dim);
        let c = &self.constants;
        self.out.clear(implicit);
        let (e, dist2, proj_vector) = edge_geometry(edge);
        if dist2 == 0.0 {
            return &self.out;
        }
        // gradients are of k and omega; scalar values are rho k, rho omega
        let rho_i = edge.prim_i[f.density()];
        let rho_j = edge.prim_j[f.density()];
        let values_i = [edge.scalar_i[0] / rho_i, edge.scalar_i[1] / rho_i];
        let values_j = [edge.scalar_j[0] / rho_j, edge.scalar_j[1] / rho_j];
        mean_gradient(
            edge.scalar_grad_i,
            edge.scalar_grad_j,
            &values_i,
            &values_j,
            &e,
            dist2,
            self.corrected,
            &mut self.mean_grad,
        );

        let blend = |f1: f64, a: f64, b: f64| f1 * a + (1.0 - f1) * b;
        let diff = |prim: &[f64], f1: f64, sigma1: f64, sigma2: f64| {
            prim[f.mu_lam()] + blend(f1, sigma1, sigma2) * prim[f.mu_turb()]
        };
        let diff_k = 0.5
            * (diff(edge.prim_i, edge.f1_i, c.sigma_k1, c.sigma_k2)
                + diff(edge.prim_j, edge.f1_j, c.sigma_k1, c.sigma_k2));
        let diff_w = 0.5
            * (diff(edge.prim_i, edge.f1_i, c.sigma_w1, c.sigma_w2)
                + diff(edge.prim_j, edge.f1_j, c.sigma_w1, c.sigma_w2));

        for (v, d) in [diff_k, diff_w].into_iter().enumerate() {
            let proj: f64 = self.mean_grad[v * n_dim..(v + 1) * n_dim]
                .iter()
                .zip(edge.normal)
                .map(|(g, n)| g * n)
                .sum();
            self.out.residual[v] = d * proj;
            if implicit {
                self.out.jacobian_i.write(v, v, -d * proj_vector / rho_i);
                self.out.jacobian_j.write(v, v, d * proj_vector / rho_j);
            }
        }
        &self.out
    }

    fn name(&self) -> &'static str {
        "SST diffusion"
    }
}

//! Flux and source functors evaluated per edge, boundary vertex or point.
//!
//! Every functor owns its output buffers and returns a borrow of them, so the
//! assembly loops never allocate.

pub mod centered;
pub mod convective;
pub mod source;
pub mod viscous;

pub use centered::{Jst, LaxFriedrichs};
pub use convective::{Roe, ScalarUpwind};
pub use source::{SaSource, SstConstants, SstSource};
pub use viscous::{AvgGradFlow, AvgGradSa, AvgGradSst};

use faer::Mat;

use crate::{faer_add, variable::FlowIndex};

/// Flux through one face and its linearization with respect to both states.
#[derive(Clone, Debug)]
pub struct FluxOutput {
    pub residual: Vec<f64>,
    pub jacobian_i: Mat<f64>,
    pub jacobian_j: Mat<f64>,
}

impl FluxOutput {
    pub fn new(n_var: usize) -> Self {
        Self {
            residual: vec![0.0; n_var],
            jacobian_i: Mat::zeros(n_var, n_var),
            jacobian_j: Mat::zeros(n_var, n_var),
        }
    }

    pub fn n_var(&self) -> usize {
        self.residual.len()
    }

    pub(crate) fn clear(&mut self, implicit: bool) {
        self.residual.iter_mut().for_each(|r| *r = 0.0);
        if implicit {
            faer_add::set_zero(self.jacobian_i.as_mut());
            faer_add::set_zero(self.jacobian_j.as_mut());
        }
    }
}

/// States on both sides of a face. `normal` is area-weighted and points from
/// `i` to `j`; for a boundary vertex `j` is the boundary state and `normal`
/// points out of the domain.
#[derive(Clone, Copy, Debug)]
pub struct EdgeStates<'a> {
    pub normal: &'a [f64],
    /// Flow primitive records.
    pub prim_i: &'a [f64],
    pub prim_j: &'a [f64],
    /// Transported scalars; empty for the flow equations.
    pub scalar_i: &'a [f64],
    pub scalar_j: &'a [f64],
}

/// Extra per-point data of the centered schemes.
#[derive(Clone, Copy, Debug)]
pub struct CenteredEdge<'a> {
    pub states: EdgeStates<'a>,
    pub laplacian_i: &'a [f64],
    pub laplacian_j: &'a [f64],
    pub sensor_i: f64,
    pub sensor_j: f64,
    pub lambda_i: f64,
    pub lambda_j: f64,
    pub neighbors_i: usize,
    pub neighbors_j: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct ViscousEdge<'a> {
    pub normal: &'a [f64],
    pub coord_i: &'a [f64],
    pub coord_j: &'a [f64],
    pub prim_i: &'a [f64],
    pub prim_j: &'a [f64],
    /// Flow gradients, `[T, v, p, rho] x n_dim`.
    pub grad_i: &'a [f64],
    pub grad_j: &'a [f64],
    pub scalar_i: &'a [f64],
    pub scalar_j: &'a [f64],
    /// Gradients of the transported scalars' primitive form.
    pub scalar_grad_i: &'a [f64],
    pub scalar_grad_j: &'a [f64],
    /// SST first blending function.
    pub f1_i: f64,
    pub f1_j: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct SourcePoint<'a> {
    pub volume: f64,
    pub wall_distance: f64,
    pub prim: &'a [f64],
    pub grad: &'a [f64],
    pub scalar: &'a [f64],
    pub scalar_prim: &'a [f64],
    pub scalar_grad: &'a [f64],
    pub f1: f64,
    pub f2: f64,
    pub cross_diffusion: f64,
}

pub trait ConvectiveNumerics {
    fn compute(&mut self, edge: &EdgeStates<'_>, implicit: bool) -> &FluxOutput;

    fn name(&self) -> &'static str {
        "Unspecified"
    }
}

pub trait CenteredNumerics {
    fn compute(&mut self, edge: &CenteredEdge<'_>, implicit: bool) -> &FluxOutput;

    fn name(&self) -> &'static str {
        "Unspecified"
    }
}

pub trait ViscousNumerics {
    fn compute(&mut self, edge: &ViscousEdge<'_>, implicit: bool) -> &FluxOutput;

    fn name(&self) -> &'static str {
        "Unspecified"
    }
}

/// Only `jacobian_i` of the output is meaningful.
pub trait SourceNumerics {
    fn compute(&mut self, point: &SourcePoint<'_>, implicit: bool) -> &FluxOutput;

    fn name(&self) -> &'static str {
        "Unspecified"
    }
}

/// Density, velocity, pressure and total energy per unit mass of a flow
/// primitive record.
pub(crate) struct FlowState<'a> {
    pub rho: f64,
    pub vel: &'a [f64],
    pub p: f64,
    pub h: f64,
    pub c: f64,
}

impl<'a> FlowState<'a> {
    pub fn new(prim: &'a [f64], n_dim: usize) -> Self {
        let f = FlowIndex::new(n_dim);
        Self {
            rho: prim[f.density()],
            vel: &prim[f.velocity(0)..f.velocity(0) + n_dim],
            p: prim[f.pressure()],
            h: prim[f.enthalpy()],
            c: prim[f.sound_speed()],
        }
    }

    pub fn energy(&self) -> f64 {
        self.h - self.p / self.rho
    }

    pub fn q2(&self) -> f64 {
        self.vel.iter().map(|v| v * v).sum()
    }

    pub fn proj_vel(&self, normal: &[f64]) -> f64 {
        self.vel.iter().zip(normal).map(|(v, n)| v * n).sum()
    }

    pub fn conservative(&self) -> Vec<f64> {
        let mut u = Vec::with_capacity(self.vel.len() + 2);
        u.push(self.rho);
        u.extend(self.vel.iter().map(|v| self.rho * v));
        u.push(self.rho * self.energy());
        u
    }
}

/// `F(V) . n` for the Euler equations.
pub fn inviscid_proj_flux(prim: &[f64], normal: &[f64], out: &mut [f64]) {
    let n_dim = normal.len();
    let s = FlowState::new(prim, n_dim);
    let vn = s.proj_vel(normal);
    out[0] = s.rho * vn;
    for d in 0..n_dim {
        out[1 + d] = s.rho * s.vel[d] * vn + s.p * normal[d];
    }
    out[n_dim + 1] = s.rho * s.h * vn;
}

/// `scale * dF.n/dU`, accumulated into `jac`.
pub fn inviscid_proj_jac(prim: &[f64], normal: &[f64], gamma: f64, scale: f64, jac: &mut Mat<f64>) {
    let n_dim = normal.len();
    let s = FlowState::new(prim, n_dim);
    let gm1 = gamma - 1.0;
    let vn = s.proj_vel(normal);
    let phi = 0.5 * gm1 * s.q2();
    let a1 = gamma * s.energy() - phi;
    let e = n_dim + 1;

    let mut add = |r: usize, c: usize, v: f64| jac.write(r, c, jac.read(r, c) + scale * v);

    for d in 0..n_dim {
        add(0, 1 + d, normal[d]);
    }
    for i in 0..n_dim {
        add(1 + i, 0, normal[i] * phi - s.vel[i] * vn);
        for j in 0..n_dim {
            let mut v = normal[j] * s.vel[i] - gm1 * s.vel[j] * normal[i];
            if i == j {
                v += vn;
            }
            add(1 + i, 1 + j, v);
        }
        add(1 + i, e, gm1 * normal[i]);
    }
    add(e, 0, vn * (phi - a1));
    for j in 0..n_dim {
        add(e, 1 + j, normal[j] * a1 - gm1 * s.vel[j] * vn);
    }
    add(e, e, gamma * vn);
}

/// `dp/dU = (gamma - 1) [q^2/2, -v, 1]`.
pub fn pressure_derivative(prim: &[f64], n_dim: usize, gamma: f64) -> Vec<f64> {
    let s = FlowState::new(prim, n_dim);
    let gm1 = gamma - 1.0;
    let mut dp = Vec::with_capacity(n_dim + 2);
    dp.push(0.5 * gm1 * s.q2());
    dp.extend(s.vel.iter().map(|v| -gm1 * v));
    dp.push(gm1);
    dp
}

/// `dT/dU = (gamma - 1) / (R rho) [q^2 - E, -v, 1]`.
pub fn temperature_derivative(
    prim: &[f64],
    n_dim: usize,
    gamma: f64,
    gas_constant: f64,
) -> Vec<f64> {
    let s = FlowState::new(prim, n_dim);
    let factor = (gamma - 1.0) / (gas_constant * s.rho);
    let mut dt = Vec::with_capacity(n_dim + 2);
    dt.push(factor * (s.q2() - s.energy()));
    dt.extend(s.vel.iter().map(|v| -factor * v));
    dt.push(factor);
    dt
}

/// Velocity gradient rows of a flow gradient record.
pub(crate) fn velocity_gradient(grad: &[f64], n_dim: usize) -> &[f64] {
    let f = FlowIndex::new(n_dim);
    &grad[f.velocity(0) * n_dim..(f.velocity(0) + n_dim) * n_dim]
}

pub fn vorticity_magnitude(grad_v: &[f64], n_dim: usize) -> f64 {
    let g = |i: usize, j: usize| grad_v[i * n_dim + j];
    if n_dim == 2 {
        (g(1, 0) - g(0, 1)).abs()
    } else {
        let wx = g(2, 1) - g(1, 2);
        let wy = g(0, 2) - g(2, 0);
        let wz = g(1, 0) - g(0, 1);
        (wx * wx + wy * wy + wz * wz).sqrt()
    }
}

/// `sqrt(2 S'_ij S'_ij)` with `S'` the traceless strain rate.
pub fn strain_magnitude(grad_v: &[f64], n_dim: usize) -> f64 {
    let g = |i: usize, j: usize| grad_v[i * n_dim + j];
    let div: f64 = (0..n_dim).map(|d| g(d, d)).sum();
    let mut sum = 0.0;
    for i in 0..n_dim {
        for j in 0..n_dim {
            let mut s = 0.5 * (g(i, j) + g(j, i));
            if i == j {
                s -= div / 3.0;
            }
            sum += s * s;
        }
    }
    (2.0 * sum).sqrt()
}

pub fn divergence(grad_v: &[f64], n_dim: usize) -> f64 {
    (0..n_dim).map(|d| grad_v[d * n_dim + d]).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn prim(rho: f64, vel: &[f64], p: f64) -> Vec<f64> {
        let gamma: f64 = 1.4;
        let n = vel.len();
        let q2: f64 = vel.iter().map(|v| v * v).sum();
        let mut out = vec![0.0; n + 7];
        out[0] = p / rho;
        out[1..=n].copy_from_slice(vel);
        out[n + 1] = p;
        out[n + 2] = rho;
        out[n + 3] = gamma / (gamma - 1.0) * p / rho + 0.5 * q2;
        out[n + 4] = (gamma * p / rho).sqrt();
        out
    }

    #[test]
    fn flux_jacobian_matches_finite_differences() {
        let gamma = 1.4;
        let v = prim(1.2, &[0.3, -0.2, 0.1], 0.9);
        let normal = [0.4, 0.5, -0.2];
        let mut jac = Mat::zeros(5, 5);
        inviscid_proj_jac(&v, &normal, gamma, 1.0, &mut jac);

        let to_prim = |u: &[f64]| {
            let rho = u[0];
            let vel: Vec<f64> = u[1..4].iter().map(|m| m / rho).collect();
            let q2: f64 = vel.iter().map(|x| x * x).sum();
            prim(rho, &vel, (gamma - 1.0) * (u[4] - 0.5 * rho * q2))
        };
        let u0 = FlowState::new(&v, 3).conservative();
        let eps = 1e-7;
        for c in 0..5 {
            let (mut up, mut um) = (u0.clone(), u0.clone());
            up[c] += eps;
            um[c] -= eps;
            let (mut fp, mut fm) = ([0.0; 5], [0.0; 5]);
            inviscid_proj_flux(&to_prim(&up), &normal, &mut fp);
            inviscid_proj_flux(&to_prim(&um), &normal, &mut fm);
            for r in 0..5 {
                assert_relative_eq!(jac.read(r, c), (fp[r] - fm[r]) / (2.0 * eps), epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn rotation_has_no_strain() {
        // v = (-y, x)
        let grad_v = [0.0, -1.0, 1.0, 0.0];
        assert_relative_eq!(strain_magnitude(&grad_v, 2), 0.0);
        assert_relative_eq!(vorticity_magnitude(&grad_v, 2), 2.0);
        assert_relative_eq!(divergence(&grad_v, 2), 0.0);
    }
}

//! Per-point solver state stored as contiguous arenas indexed by point.

use crate::halo::PointSlab;

/// Offsets into the flow primitive record
/// `[T, v(n_dim), p, rho, h, c, mu_lam, mu_turb]`.
///
/// The first `n_dim + 3` entries (`T, v, p, rho`) are the ones that carry
/// gradients and limiters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowIndex {
    n_dim: usize,
}

impl FlowIndex {
    pub fn new(n_dim: usize) -> Self {
        Self { n_dim }
    }

    pub fn n_dim(self) -> usize {
        self.n_dim
    }

    pub fn n_var(self) -> usize {
        self.n_dim + 2
    }

    pub fn n_prim(self) -> usize {
        self.n_dim + 7
    }

    pub fn n_grad(self) -> usize {
        self.n_dim + 3
    }

    pub fn temperature(self) -> usize {
        0
    }

    pub fn velocity(self, d: usize) -> usize {
        1 + d
    }

    pub fn pressure(self) -> usize {
        self.n_dim + 1
    }

    pub fn density(self) -> usize {
        self.n_dim + 2
    }

    pub fn enthalpy(self) -> usize {
        self.n_dim + 3
    }

    pub fn sound_speed(self) -> usize {
        self.n_dim + 4
    }

    pub fn mu_lam(self) -> usize {
        self.n_dim + 5
    }

    pub fn mu_turb(self) -> usize {
        self.n_dim + 6
    }

    /// Conservative energy index, `[rho, rho v, rho E]`.
    pub fn energy(self) -> usize {
        self.n_dim + 1
    }
}

#[derive(Clone, Debug)]
pub struct VariableStore {
    n_point: usize,
    n_dim: usize,
    n_var: usize,
    n_prim: usize,
    n_grad: usize,

    solution: Vec<f64>,
    solution_old: Vec<f64>,
    primitive: Vec<f64>,
    // [point][var][dim]
    gradient: Vec<f64>,
    limiter: Vec<f64>,
    bound_min: Vec<f64>,
    bound_max: Vec<f64>,

    delta_time: Vec<f64>,
    lambda_inv: Vec<f64>,
    lambda_visc: Vec<f64>,
    laplacian: Vec<f64>,
    sensor: Vec<f64>,
    non_physical: Vec<bool>,
}

impl VariableStore {
    /// Every point starts from `initial`.
    pub fn new(
        n_point: usize,
        n_dim: usize,
        n_prim: usize,
        n_grad: usize,
        initial: &[f64],
    ) -> Self {
        let n_var = initial.len();
        let solution: Vec<f64> = initial.iter().copied().cycle().take(n_point * n_var).collect();
        Self {
            n_point,
            n_dim,
            n_var,
            n_prim,
            n_grad,
            solution_old: solution.clone(),
            solution,
            primitive: vec![0.0; n_point * n_prim],
            gradient: vec![0.0; n_point * n_grad * n_dim],
            limiter: vec![1.0; n_point * n_grad],
            bound_min: vec![0.0; n_point * n_grad],
            bound_max: vec![0.0; n_point * n_grad],
            delta_time: vec![0.0; n_point],
            lambda_inv: vec![0.0; n_point],
            lambda_visc: vec![0.0; n_point],
            laplacian: vec![0.0; n_point * n_var],
            sensor: vec![0.0; n_point],
            non_physical: vec![false; n_point],
        }
    }

    pub fn n_point(&self) -> usize {
        self.n_point
    }

    pub fn n_dim(&self) -> usize {
        self.n_dim
    }

    pub fn n_var(&self) -> usize {
        self.n_var
    }

    pub fn n_prim(&self) -> usize {
        self.n_prim
    }

    pub fn n_grad(&self) -> usize {
        self.n_grad
    }

    pub fn solution(&self, i: usize) -> &[f64] {
        &self.solution[i * self.n_var..(i + 1) * self.n_var]
    }

    pub fn solution_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.solution[i * self.n_var..(i + 1) * self.n_var]
    }

    pub fn set_solution(&mut self, i: usize, values: &[f64]) {
        self.solution_mut(i).copy_from_slice(values);
    }

    pub fn solution_old(&self, i: usize) -> &[f64] {
        &self.solution_old[i * self.n_var..(i + 1) * self.n_var]
    }

    pub fn solution_old_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.solution_old[i * self.n_var..(i + 1) * self.n_var]
    }

    pub(crate) fn solution_and_primitive_mut(&mut self) -> (&[f64], &mut [f64]) {
        (&self.solution, &mut self.primitive)
    }

    /// Snapshot of the solution at the beginning of a pseudo-time step.
    pub fn set_old_solution(&mut self) {
        self.solution_old.copy_from_slice(&self.solution);
    }

    pub fn restore_old_solution(&mut self, i: usize) {
        let n = self.n_var;
        self.solution[i * n..(i + 1) * n].copy_from_slice(&self.solution_old[i * n..(i + 1) * n]);
    }

    pub fn restore_all_old_solution(&mut self) {
        self.solution.copy_from_slice(&self.solution_old);
    }

    pub fn primitive(&self, i: usize) -> &[f64] {
        &self.primitive[i * self.n_prim..(i + 1) * self.n_prim]
    }

    pub fn primitive_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.primitive[i * self.n_prim..(i + 1) * self.n_prim]
    }

    /// Gradient of point `i` as `n_grad` rows of `n_dim` entries.
    pub fn gradient(&self, i: usize) -> &[f64] {
        let w = self.n_grad * self.n_dim;
        &self.gradient[i * w..(i + 1) * w]
    }

    pub fn gradient_mut(&mut self, i: usize) -> &mut [f64] {
        let w = self.n_grad * self.n_dim;
        &mut self.gradient[i * w..(i + 1) * w]
    }

    pub fn grad(&self, i: usize, var: usize) -> &[f64] {
        let start = (i * self.n_grad + var) * self.n_dim;
        &self.gradient[start..start + self.n_dim]
    }

    pub fn limiter(&self, i: usize) -> &[f64] {
        &self.limiter[i * self.n_grad..(i + 1) * self.n_grad]
    }

    pub fn limiter_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.limiter[i * self.n_grad..(i + 1) * self.n_grad]
    }

    /// Primitive records next to the gradient arena, for reconstruction.
    pub(crate) fn gradient_parts(&mut self) -> (&[f64], &mut [f64]) {
        (&self.primitive, &mut self.gradient)
    }

    pub(crate) fn limiter_parts(&mut self) -> LimiterParts<'_> {
        LimiterParts {
            primitive: &self.primitive,
            gradient: &self.gradient,
            limiter: &mut self.limiter,
            bound_min: &mut self.bound_min,
            bound_max: &mut self.bound_max,
        }
    }

    pub fn bounds(&self, i: usize, var: usize) -> (f64, f64) {
        let k = i * self.n_grad + var;
        (self.bound_min[k], self.bound_max[k])
    }

    pub fn delta_time(&self, i: usize) -> f64 {
        self.delta_time[i]
    }

    pub fn set_delta_time(&mut self, i: usize, dt: f64) {
        self.delta_time[i] = dt;
    }

    pub fn lambda_inv(&self, i: usize) -> f64 {
        self.lambda_inv[i]
    }

    pub fn lambda_visc(&self, i: usize) -> f64 {
        self.lambda_visc[i]
    }

    /// Primitive records next to the spectral radius arenas
    /// `(lambda_inv, lambda_visc)`.
    pub(crate) fn lambdas_mut(&mut self) -> (&[f64], &mut [f64], &mut [f64]) {
        (&self.primitive, &mut self.lambda_inv, &mut self.lambda_visc)
    }

    pub fn laplacian(&self, i: usize) -> &[f64] {
        &self.laplacian[i * self.n_var..(i + 1) * self.n_var]
    }

    pub fn sensor(&self, i: usize) -> f64 {
        self.sensor[i]
    }

    /// `(solution, primitive, laplacian, sensor)`.
    pub(crate) fn laplacian_and_sensor_mut(&mut self) -> (&[f64], &[f64], &mut [f64], &mut [f64]) {
        (&self.solution, &self.primitive, &mut self.laplacian, &mut self.sensor)
    }

    pub fn is_non_physical(&self, i: usize) -> bool {
        self.non_physical[i]
    }

    pub fn set_non_physical(&mut self, i: usize, flag: bool) {
        self.non_physical[i] = flag;
    }

    /// Contiguous per-point slabs for halo exchange.
    pub(crate) fn solution_slab(&mut self) -> PointSlab<'_> {
        PointSlab::new(&mut self.solution, self.n_var)
    }

    pub(crate) fn solution_old_slab(&mut self) -> PointSlab<'_> {
        PointSlab::new(&mut self.solution_old, self.n_var)
    }

    pub(crate) fn primitive_slab(&mut self) -> PointSlab<'_> {
        PointSlab::new(&mut self.primitive, self.n_prim)
    }

    pub(crate) fn gradient_slab(&mut self) -> PointSlab<'_> {
        PointSlab::new(&mut self.gradient, self.n_grad * self.n_dim)
    }

    pub(crate) fn limiter_slab(&mut self) -> PointSlab<'_> {
        PointSlab::new(&mut self.limiter, self.n_grad)
    }

    pub(crate) fn laplacian_slab(&mut self) -> PointSlab<'_> {
        PointSlab::new(&mut self.laplacian, self.n_var)
    }

    pub(crate) fn scalar_slab(&mut self, field: ScalarField) -> PointSlab<'_> {
        let data = match field {
            ScalarField::Sensor => &mut self.sensor,
            ScalarField::LambdaInv => &mut self.lambda_inv,
        };
        PointSlab::new(data, 1)
    }
}

pub(crate) struct LimiterParts<'a> {
    pub primitive: &'a [f64],
    pub gradient: &'a [f64],
    pub limiter: &'a mut [f64],
    pub bound_min: &'a mut [f64],
    pub bound_max: &'a mut [f64],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ScalarField {
    Sensor,
    LambdaInv,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_index_layout() {
        let f = FlowIndex::new(3);
        assert_eq!(f.n_prim(), 10);
        assert_eq!(f.pressure(), 4);
        assert_eq!(f.density(), 5);
        assert_eq!(f.mu_turb(), 9);
        assert_eq!(f.energy(), 4);
    }

    #[test]
    fn store_is_initialized_from_the_template() {
        let mut s = VariableStore::new(3, 2, 5, 1, &[1.0, 2.0]);
        assert_eq!(s.solution(2), &[1.0, 2.0]);
        s.solution_mut(1)[0] = 7.0;
        s.restore_old_solution(1);
        assert_eq!(s.solution(1), &[1.0, 2.0]);
        assert_eq!(s.limiter(0), &[1.0]);
        assert_eq!(s.grad(2, 0).len(), 2);
    }
}

use faer_core::{zipped, Mat, MatMut, MatRef};

use crate::{
    error::CommError,
    faer_add,
    halo::{self, HaloData},
    linsys::HaloContext,
};

/// Block vector with `n_var` entries per point, stored as one faer column.
/// Only the first `n_block_domain` blocks take part in reductions.
#[derive(Clone, Debug)]
pub struct SysVector {
    n_block: usize,
    n_block_domain: usize,
    n_var: usize,
    data: Mat<f64>,
}

impl SysVector {
    pub fn new(n_block: usize, n_block_domain: usize, n_var: usize) -> Self {
        Self {
            n_block,
            n_block_domain,
            n_var,
            data: Mat::zeros(n_block * n_var, 1),
        }
    }

    pub fn n_block(&self) -> usize {
        self.n_block
    }

    pub fn n_block_domain(&self) -> usize {
        self.n_block_domain
    }

    pub fn n_var(&self) -> usize {
        self.n_var
    }

    pub fn get(&self, block: usize, var: usize) -> f64 {
        self.data.read(block * self.n_var + var, 0)
    }

    pub fn set(&mut self, block: usize, var: usize, value: f64) {
        self.data.write(block * self.n_var + var, 0, value)
    }

    pub fn block(&self, block: usize) -> MatRef<'_, f64> {
        self.data.as_ref().subrows(block * self.n_var, self.n_var)
    }

    pub fn block_mut(&mut self, block: usize) -> MatMut<'_, f64> {
        self.data.as_mut().subrows(block * self.n_var, self.n_var)
    }

    pub fn block_to_vec(&self, block: usize) -> Vec<f64> {
        faer_add::column_to_vec(self.block(block))
    }

    pub fn add_block(&mut self, block: usize, values: &[f64]) {
        for (v, x) in values.iter().enumerate() {
            let r = block * self.n_var + v;
            self.data.write(r, 0, self.data.read(r, 0) + x);
        }
    }

    pub fn sub_block(&mut self, block: usize, values: &[f64]) {
        for (v, x) in values.iter().enumerate() {
            let r = block * self.n_var + v;
            self.data.write(r, 0, self.data.read(r, 0) - x);
        }
    }

    pub fn set_block(&mut self, block: usize, values: &[f64]) {
        faer_add::copy_from_slice(self.block_mut(block), values);
    }

    pub fn set_block_zero(&mut self, block: usize) {
        faer_add::set_zero(self.block_mut(block));
    }

    pub fn set_zero(&mut self) {
        faer_add::set_zero(self.data.as_mut());
    }

    pub fn copy_from(&mut self, other: &SysVector) {
        self.data.as_mut().clone_from(other.data.as_ref());
    }

    /// self += alpha * x
    pub fn axpy(&mut self, alpha: f64, x: &SysVector) {
        faer_add::add_scaled(self.data.as_mut(), x.data.as_ref(), alpha);
    }

    /// self = x + beta * self
    pub fn xpby(&mut self, x: &SysVector, beta: f64) {
        zipped!(self.data.as_mut(), x.data.as_ref())
            .for_each(|mut s, x| s.write(x.read() + beta * s.read()));
    }

    pub fn scale(&mut self, alpha: f64) {
        faer_add::scale(self.data.as_mut(), alpha);
    }

    fn local_dot(&self, other: &SysVector) -> f64 {
        (0..self.n_block_domain * self.n_var)
            .map(|r| self.data.read(r, 0) * other.data.read(r, 0))
            .sum()
    }

    /// Dot product over the domain blocks of every rank.
    pub fn dot(&self, other: &SysVector, halo: &HaloContext<'_>) -> Result<f64, CommError> {
        let mut d = [self.local_dot(other)];
        halo.comm.all_reduce_sum(&mut d)?;
        Ok(d[0])
    }

    pub fn norm(&self, halo: &HaloContext<'_>) -> Result<f64, CommError> {
        Ok(self.dot(self, halo)?.sqrt())
    }

    /// Overwrites the halo blocks with the owners' values.
    pub fn exchange(&mut self, halo: &HaloContext<'_>) -> Result<(), CommError> {
        halo::exchange(halo.geometry, halo.comm, self, halo.layout)
    }
}

impl HaloData for SysVector {
    fn width(&self) -> usize {
        self.n_var
    }

    fn pack(&self, point: usize, out: &mut Vec<f64>) {
        out.extend((0..self.n_var).map(|v| self.get(point, v)));
    }

    fn unpack(&mut self, point: usize, data: &[f64]) {
        self.set_block(point, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_access() {
        let mut v = SysVector::new(3, 2, 2);
        v.add_block(1, &[1.0, 2.0]);
        v.sub_block(1, &[0.5, 0.5]);
        assert_eq!(v.block_to_vec(1), vec![0.5, 1.5]);
        assert_eq!(v.get(0, 1), 0.0);

        let mut w = v.clone();
        w.axpy(2.0, &v);
        assert_eq!(w.block_to_vec(1), vec![1.5, 4.5]);
        w.xpby(&v, -1.0);
        assert_eq!(w.block_to_vec(1), vec![-1.0, -3.0]);
    }

    #[test]
    fn local_dot_skips_halo_blocks() {
        let mut v = SysVector::new(2, 1, 1);
        v.set(0, 0, 2.0);
        v.set(1, 0, 100.0);
        assert_eq!(v.local_dot(&v), 4.0);
    }
}

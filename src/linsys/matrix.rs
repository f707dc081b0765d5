use faer_core::{mul::matmul, Mat, MatRef, Parallelism};
use reborrow::*;

use crate::{
    error::{CommError, SolverError},
    faer_add,
    geometry::Geometry,
    linsys::{HaloContext, SysVector},
};

/// Block-sparse matrix with the sparsity of the grid connectivity: one dense
/// `n_var x n_var` block per point and per edge direction.
#[derive(Clone, Debug)]
pub struct BlockMatrix {
    n_block: usize,
    n_block_domain: usize,
    n_var: usize,
    row_ptr: Vec<usize>,
    col_ind: Vec<usize>,
    diag: Vec<usize>,
    blocks: Vec<Mat<f64>>,
}

impl BlockMatrix {
    pub fn from_geometry(geometry: &Geometry, n_var: usize) -> Self {
        let n_block = geometry.n_point();
        let mut row_ptr = Vec::with_capacity(n_block + 1);
        let mut col_ind = Vec::new();
        let mut diag = Vec::with_capacity(n_block);
        row_ptr.push(0);
        for i in 0..n_block {
            let mut cols: Vec<usize> = geometry.neighbors(i).iter().map(|&(j, _)| j).collect();
            cols.push(i);
            cols.sort_unstable();
            cols.dedup();
            let start = col_ind.len();
            diag.push(start + cols.partition_point(|&c| c < i));
            col_ind.extend(cols);
            row_ptr.push(col_ind.len());
        }
        let blocks = vec![Mat::zeros(n_var, n_var); col_ind.len()];
        Self {
            n_block,
            n_block_domain: geometry.n_point_domain(),
            n_var,
            row_ptr,
            col_ind,
            diag,
            blocks,
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

    fn find(&self, i: usize, j: usize) -> Option<usize> {
        let row = &self.col_ind[self.row_ptr[i]..self.row_ptr[i + 1]];
        row.binary_search(&j).ok().map(|k| self.row_ptr[i] + k)
    }

    pub fn block(&self, i: usize, j: usize) -> Option<MatRef<'_, f64>> {
        self.find(i, j).map(|k| self.blocks[k].as_ref())
    }

    pub fn diag_block(&self, i: usize) -> MatRef<'_, f64> {
        self.blocks[self.diag[i]].as_ref()
    }

    /// `(column, block)` pairs of row `i` in increasing column order.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, MatRef<'_, f64>)> + '_ {
        (self.row_ptr[i]..self.row_ptr[i + 1])
            .map(move |k| (self.col_ind[k], self.blocks[k].as_ref()))
    }

    pub fn set_zero(&mut self) {
        for b in &mut self.blocks {
            faer_add::set_zero(b.as_mut());
        }
    }

    pub fn add_block(&mut self, i: usize, j: usize, value: MatRef<'_, f64>) {
        if let Some(k) = self.find(i, j) {
            faer_add::add_scaled(self.blocks[k].as_mut(), value, 1.0);
        }
    }

    pub fn sub_block(&mut self, i: usize, j: usize, value: MatRef<'_, f64>) {
        if let Some(k) = self.find(i, j) {
            faer_add::add_scaled(self.blocks[k].as_mut(), value, -1.0);
        }
    }

    pub fn add_to_diag(&mut self, i: usize, value: f64) {
        let b = &mut self.blocks[self.diag[i]];
        for v in 0..self.n_var {
            b.write(v, v, b.read(v, v) + value);
        }
    }

    /// Replaces equation `var` of row `i` by the identity, for strongly
    /// imposed values.
    pub fn delete_row(&mut self, i: usize, var: usize) {
        for k in self.row_ptr[i]..self.row_ptr[i + 1] {
            for c in 0..self.n_var {
                self.blocks[k].write(var, c, 0.0);
            }
        }
        self.blocks[self.diag[i]].write(var, var, 1.0);
    }

    /// `y = A x` on the domain rows, then a halo update of `y`.
    pub fn matvec(
        &self,
        x: &SysVector,
        y: &mut SysVector,
        halo: &HaloContext<'_>,
    ) -> Result<(), CommError> {
        for i in 0..self.n_block_domain {
            let mut yi = y.block_mut(i);
            faer_add::set_zero(yi.rb_mut());
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                matmul(
                    yi.rb_mut(),
                    self.blocks[k].as_ref(),
                    x.block(self.col_ind[k]),
                    Some(1.0),
                    1.0,
                    Parallelism::None,
                );
            }
        }
        y.exchange(halo)
    }
}

/// Solves `a x = b` in place by Gaussian elimination with partial pivoting;
/// `b` holds `x` on return.
pub fn gauss_elimination(a: &mut Mat<f64>, b: &mut [f64]) -> Result<(), SolverError> {
    let n = b.len();
    debug_assert_eq!(a.nrows(), n);
    for k in 0..n {
        let pivot = (k..n)
            .max_by(|&p, &q| a.read(p, k).abs().total_cmp(&a.read(q, k).abs()))
            .unwrap_or(k);
        if !(a.read(pivot, k).abs() > f64::EPSILON * faer_add::max_abs(a.as_ref()).max(1e-300)) {
            return Err(SolverError::SingularBlock(k));
        }
        if pivot != k {
            for c in 0..n {
                let (x, y) = (a.read(k, c), a.read(pivot, c));
                a.write(k, c, y);
                a.write(pivot, c, x);
            }
            b.swap(k, pivot);
        }
        for r in k + 1..n {
            let factor = a.read(r, k) / a.read(k, k);
            if factor == 0.0 {
                continue;
            }
            for c in k..n {
                a.write(r, c, a.read(r, c) - factor * a.read(k, c));
            }
            b[r] -= factor * b[k];
        }
    }
    for k in (0..n).rev() {
        let s: f64 = (k + 1..n).map(|c| a.read(k, c) * b[c]).sum();
        b[k] = (b[k] - s) / a.read(k, k);
    }
    Ok(())
}

/// Inverse of a small dense block.
pub fn invert_block(a: MatRef<'_, f64>) -> Result<Mat<f64>, SolverError> {
    let n = a.nrows();
    let mut inv = Mat::zeros(n, n);
    for c in 0..n {
        let mut work = a.to_owned();
        let mut e: Vec<f64> = (0..n).map(|r| if r == c { 1.0 } else { 0.0 }).collect();
        gauss_elimination(&mut work, &mut e)?;
        faer_add::copy_from_slice(inv.as_mut().col(c), &e);
    }
    Ok(inv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Grid, RectangularMesh};
    use approx::assert_relative_eq;

    #[test]
    fn gauss_elimination_pivots() {
        let rows = [[0.0, 2.0, 1.0], [1.0, 1.0, 0.0], [3.0, 0.0, 1.0]];
        let mut a = Mat::from_fn(3, 3, |i, j| rows[i][j]);
        let mut b = vec![5.0, 3.0, 4.0];
        gauss_elimination(&mut a, &mut b).unwrap();
        for (x, e) in b.iter().zip([1.0, 2.0, 1.0]) {
            assert_relative_eq!(*x, e, epsilon = 1e-12);
        }
    }

    #[test]
    fn singular_block_is_reported() {
        let mut a = Mat::from_fn(2, 2, |i, _| i as f64 + 1.0);
        let mut b = vec![1.0, 2.0];
        assert!(matches!(
            gauss_elimination(&mut a, &mut b),
            Err(SolverError::SingularBlock(_))
        ));
    }

    #[test]
    fn sparsity_follows_connectivity() {
        let g = RectangularMesh::new(Grid::from_steps(0.0, 1.0, 2), Grid::from_steps(0.0, 1.0, 1))
            .build()
            .unwrap();
        let mut m = BlockMatrix::from_geometry(&g, 2);
        assert!(m.block(0, 1).is_some());
        assert!(m.block(0, 2).is_none());
        m.add_to_diag(0, 3.0);
        m.delete_row(0, 1);
        let d = m.diag_block(0);
        assert_eq!(d.read(0, 0), 3.0);
        assert_eq!(d.read(1, 1), 1.0);
        assert_eq!(m.row(0).map(|(j, _)| j).collect::<Vec<_>>(), vec![0, 1, 3]);
    }
}

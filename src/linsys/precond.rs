use faer_core::Mat;

use crate::{
    config::PreconditionerKind,
    error::SolverError,
    faer_add,
    linsys::{invert_block, BlockMatrix, HaloContext, SysVector},
};

pub trait Preconditioner {
    /// Factorizes what is needed from `matrix`; called once per linear solve.
    fn build(&mut self, matrix: &BlockMatrix) -> Result<(), SolverError>;

    /// `out = M^-1 x`, halo blocks of `out` updated.
    fn apply(
        &self,
        matrix: &BlockMatrix,
        x: &SysVector,
        out: &mut SysVector,
        halo: &HaloContext<'_>,
    ) -> Result<(), SolverError>;

    fn name(&self) -> &'static str {
        "Unspecified"
    }
}

pub fn from_kind(kind: PreconditionerKind) -> Box<dyn Preconditioner> {
    match kind {
        PreconditionerKind::Jacobi => Box::new(JacobiPreconditioner::default()),
        PreconditionerKind::LuSgs => Box::new(LuSgsPreconditioner::default()),
    }
}

/// Inverse of the diagonal blocks.
#[derive(Default)]
pub struct JacobiPreconditioner {
    inv_diag: Vec<Mat<f64>>,
}

impl Preconditioner for JacobiPreconditioner {
    fn build(&mut self, matrix: &BlockMatrix) -> Result<(), SolverError> {
        self.inv_diag = (0..matrix.n_block_domain())
            .map(|i| invert_block(matrix.diag_block(i)).map_err(|_| SolverError::SingularBlock(i)))
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    fn apply(
        &self,
        _matrix: &BlockMatrix,
        x: &SysVector,
        out: &mut SysVector,
        halo: &HaloContext<'_>,
    ) -> Result<(), SolverError> {
        let mut y = vec![0.0; x.n_var()];
        for (i, inv) in self.inv_diag.iter().enumerate() {
            faer_add::block_mul(inv.as_ref(), &x.block_to_vec(i), &mut y);
            out.set_block(i, &y);
        }
        out.exchange(halo)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Jacobi"
    }
}

/// Symmetric block Gauss-Seidel sweep on the rank-local rows: a forward
/// sweep with the lower part followed by a backward sweep with the upper part.
#[derive(Default)]
pub struct LuSgsPreconditioner {
    inv_diag: Vec<Mat<f64>>,
}

impl Preconditioner for LuSgsPreconditioner {
    fn build(&mut self, matrix: &BlockMatrix) -> Result<(), SolverError> {
        self.inv_diag = (0..matrix.n_block_domain())
            .map(|i| invert_block(matrix.diag_block(i)).map_err(|_| SolverError::SingularBlock(i)))
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    fn apply(
        &self,
        matrix: &BlockMatrix,
        x: &SysVector,
        out: &mut SysVector,
        halo: &HaloContext<'_>,
    ) -> Result<(), SolverError> {
        let n = matrix.n_block_domain();
        let n_var = x.n_var();
        let mut acc = vec![0.0; n_var];
        let mut prod = vec![0.0; n_var];
        let mut y = vec![0.0; n_var];

        // (D + L) y = x
        let mut lower = SysVector::new(x.n_block(), n, n_var);
        for i in 0..n {
            acc.copy_from_slice(&x.block_to_vec(i));
            for (j, block) in matrix.row(i).filter(|&(j, _)| j < i) {
                faer_add::block_mul(block, &lower.block_to_vec(j), &mut prod);
                acc.iter_mut().zip(&prod).for_each(|(a, p)| *a -= p);
            }
            faer_add::block_mul(self.inv_diag[i].as_ref(), &acc, &mut y);
            lower.set_block(i, &y);
        }

        // (D + U) z = D y
        out.set_zero();
        for i in (0..n).rev() {
            faer_add::block_mul(matrix.diag_block(i), &lower.block_to_vec(i), &mut acc);
            for (j, block) in matrix.row(i).filter(|&(j, _)| j > i && j < n) {
                faer_add::block_mul(block, &out.block_to_vec(j), &mut prod);
                acc.iter_mut().zip(&prod).for_each(|(a, p)| *a -= p);
            }
            faer_add::block_mul(self.inv_diag[i].as_ref(), &acc, &mut y);
            out.set_block(i, &y);
        }
        out.exchange(halo)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "LU-SGS"
    }
}

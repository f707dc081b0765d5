use crate::{
    config::{LinearSolverConfig, LinearSolverKind},
    error::SolverError,
    linsys::{precond, BlockMatrix, HaloContext, Preconditioner, SysVector},
};

/// Outcome of one linear solve. Not converging is not an error: the caller
/// keeps whatever increment was produced.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearSolveReport {
    pub iterations: usize,
    /// Final residual norm relative to the right-hand side norm.
    pub residual: f64,
    pub converged: bool,
}

pub struct LinearSystemSolver {
    config: LinearSolverConfig,
    preconditioner: Box<dyn Preconditioner>,
}

impl LinearSystemSolver {
    pub fn from_config(config: &LinearSolverConfig) -> Self {
        Self {
            config: *config,
            preconditioner: precond::from_kind(config.preconditioner),
        }
    }

    pub fn config(&self) -> &LinearSolverConfig {
        &self.config
    }

    pub fn preconditioner_name(&self) -> &'static str {
        self.preconditioner.name()
    }

    /// Solves `matrix * sol = rhs` starting from the current `sol`.
    pub fn solve(
        &mut self,
        matrix: &BlockMatrix,
        rhs: &SysVector,
        sol: &mut SysVector,
        halo: &HaloContext<'_>,
    ) -> Result<LinearSolveReport, SolverError> {
        self.preconditioner.build(matrix)?;
        let norm_b = rhs.norm(halo)?;
        if norm_b == 0.0 {
            sol.set_zero();
            return Ok(LinearSolveReport {
                iterations: 0,
                residual: 0.0,
                converged: true,
            });
        }
        let report = match self.config.kind {
            LinearSolverKind::Fgmres => self.fgmres(matrix, rhs, sol, halo, norm_b)?,
            LinearSolverKind::Bcgstab => self.bcgstab(matrix, rhs, sol, halo, norm_b)?,
            LinearSolverKind::SmootherJacobi => self.smoother(matrix, rhs, sol, halo, norm_b)?,
        };
        tracing::trace!(
            iterations = report.iterations,
            residual = report.residual,
            converged = report.converged,
            "linear solve finished"
        );
        Ok(report)
    }

    fn residual(
        matrix: &BlockMatrix,
        rhs: &SysVector,
        sol: &SysVector,
        out: &mut SysVector,
        halo: &HaloContext<'_>,
    ) -> Result<(), SolverError> {
        matrix.matvec(sol, out, halo)?;
        out.xpby(rhs, -1.0);
        Ok(())
    }

    fn fgmres(
        &self,
        matrix: &BlockMatrix,
        rhs: &SysVector,
        sol: &mut SysVector,
        halo: &HaloContext<'_>,
        norm_b: f64,
    ) -> Result<LinearSolveReport, SolverError> {
        let m = self.config.restart;
        let tol = self.config.tolerance * norm_b;
        let mut w = rhs.clone();
        let mut total = 0;
        let mut res;

        loop {
            Self::residual(matrix, rhs, sol, &mut w, halo)?;
            let beta = w.norm(halo)?;
            res = beta;
            if beta <= tol || total >= self.config.max_iterations {
                break;
            }

            let mut v = Vec::with_capacity(m + 1);
            let mut z = Vec::with_capacity(m);
            let mut first = w.clone();
            first.scale(1.0 / beta);
            v.push(first);

            let mut h = vec![vec![0.0; m]; m + 1];
            let mut g = vec![0.0; m + 1];
            let (mut cs, mut sn) = (vec![0.0; m], vec![0.0; m]);
            g[0] = beta;
            let mut k_used = 0;

            for k in 0..m {
                if total >= self.config.max_iterations {
                    break;
                }
                let mut zk = rhs.clone();
                self.preconditioner.apply(matrix, &v[k], &mut zk, halo)?;
                matrix.matvec(&zk, &mut w, halo)?;
                z.push(zk);

                // modified Gram-Schmidt
                for (j, vj) in v.iter().enumerate() {
                    h[j][k] = w.dot(vj, halo)?;
                    w.axpy(-h[j][k], vj);
                }
                h[k + 1][k] = w.norm(halo)?;

                for i in 0..k {
                    let t = cs[i] * h[i][k] + sn[i] * h[i + 1][k];
                    h[i + 1][k] = -sn[i] * h[i][k] + cs[i] * h[i + 1][k];
                    h[i][k] = t;
                }
                let r = h[k][k].hypot(h[k + 1][k]);
                (cs[k], sn[k]) = if r == 0.0 {
                    (1.0, 0.0)
                } else {
                    (h[k][k] / r, h[k + 1][k] / r)
                };
                let breakdown = h[k + 1][k] == 0.0;
                if !breakdown {
                    let mut next = w.clone();
                    next.scale(1.0 / h[k + 1][k]);
                    v.push(next);
                }
                h[k][k] = r;
                h[k + 1][k] = 0.0;
                g[k + 1] = -sn[k] * g[k];
                g[k] *= cs[k];

                total += 1;
                k_used = k + 1;
                res = g[k + 1].abs();
                tracing::trace!(iteration = total, residual = res / norm_b, "fgmres");
                if res <= tol || breakdown {
                    break;
                }
            }

            // back substitution on the triangular Hessenberg part
            let mut y = vec![0.0; k_used];
            for i in (0..k_used).rev() {
                let s: f64 = (i + 1..k_used).map(|j| h[i][j] * y[j]).sum();
                y[i] = if h[i][i] == 0.0 { 0.0 } else { (g[i] - s) / h[i][i] };
            }
            for (yi, zi) in y.iter().zip(&z) {
                sol.axpy(*yi, zi);
            }

            if res <= tol || k_used == 0 || total >= self.config.max_iterations {
                break;
            }
        }

        Ok(LinearSolveReport {
            iterations: total,
            residual: res / norm_b,
            converged: res <= tol,
        })
    }

    fn bcgstab(
        &self,
        matrix: &BlockMatrix,
        rhs: &SysVector,
        sol: &mut SysVector,
        halo: &HaloContext<'_>,
        norm_b: f64,
    ) -> Result<LinearSolveReport, SolverError> {
        let tol = self.config.tolerance * norm_b;
        let mut r = rhs.clone();
        Self::residual(matrix, rhs, sol, &mut r, halo)?;
        let r0 = r.clone();
        let mut p = rhs.clone();
        p.set_zero();
        let mut v = p.clone();
        let mut p_hat = p.clone();
        let mut s = p.clone();
        let mut s_hat = p.clone();
        let mut t = p.clone();
        let (mut rho, mut alpha, mut omega) = (1.0, 1.0, 1.0);
        let mut res = r.norm(halo)?;
        let mut iterations = 0;

        while res > tol && iterations < self.config.max_iterations {
            let rho_new = r0.dot(&r, halo)?;
            if rho_new == 0.0 || omega == 0.0 {
                break;
            }
            let beta = (rho_new / rho) * (alpha / omega);
            p.axpy(-omega, &v);
            p.xpby(&r, beta);

            self.preconditioner.apply(matrix, &p, &mut p_hat, halo)?;
            matrix.matvec(&p_hat, &mut v, halo)?;
            let r0v = r0.dot(&v, halo)?;
            if r0v == 0.0 {
                break;
            }
            alpha = rho_new / r0v;

            s.copy_from(&r);
            s.axpy(-alpha, &v);
            self.preconditioner.apply(matrix, &s, &mut s_hat, halo)?;
            matrix.matvec(&s_hat, &mut t, halo)?;
            let tt = t.dot(&t, halo)?;
            omega = if tt == 0.0 { 0.0 } else { t.dot(&s, halo)? / tt };

            sol.axpy(alpha, &p_hat);
            sol.axpy(omega, &s_hat);
            r.copy_from(&s);
            r.axpy(-omega, &t);

            rho = rho_new;
            iterations += 1;
            res = r.norm(halo)?;
            tracing::trace!(iteration = iterations, residual = res / norm_b, "bcgstab");
        }

        Ok(LinearSolveReport {
            iterations,
            residual: res / norm_b,
            converged: res <= tol,
        })
    }

    /// Preconditioned Richardson iteration, `x += w M^-1 (b - A x)`.
    fn smoother(
        &self,
        matrix: &BlockMatrix,
        rhs: &SysVector,
        sol: &mut SysVector,
        halo: &HaloContext<'_>,
        norm_b: f64,
    ) -> Result<LinearSolveReport, SolverError> {
        let tol = self.config.tolerance * norm_b;
        let mut r = rhs.clone();
        let mut dx = rhs.clone();
        Self::residual(matrix, rhs, sol, &mut r, halo)?;
        let mut res = r.norm(halo)?;
        let mut iterations = 0;

        while res > tol && iterations < self.config.max_iterations {
            self.preconditioner.apply(matrix, &r, &mut dx, halo)?;
            sol.axpy(self.config.smoother_relaxation, &dx);
            Self::residual(matrix, rhs, sol, &mut r, halo)?;
            res = r.norm(halo)?;
            iterations += 1;
            tracing::trace!(iteration = iterations, residual = res / norm_b, "smoother");
        }

        Ok(LinearSolveReport {
            iterations,
            residual: res / norm_b,
            converged: res <= tol,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        comm::SerialComm,
        config::PreconditionerKind,
        faer_add::identity,
        halo::VectorLayout,
        mesh::{Grid, RectangularMesh},
    };
    use approx::assert_relative_eq;

    fn system(n_var: usize) -> (crate::geometry::Geometry, BlockMatrix) {
        let g = RectangularMesh::new(Grid::from_steps(0.0, 1.0, 4), Grid::from_steps(0.0, 1.0, 2))
            .build()
            .unwrap();
        let mut m = BlockMatrix::from_geometry(&g, n_var);
        let coupling = faer::Mat::from_fn(n_var, n_var, |i, j| if i == j { -1.0 } else { 0.1 });
        for i in 0..g.n_point() {
            m.add_block(i, i, identity(n_var).as_ref());
            for &(j, _) in g.neighbors(i) {
                m.add_block(i, j, coupling.as_ref());
                m.add_to_diag(i, 1.5);
            }
        }
        (g, m)
    }

    fn check(kind: LinearSolverKind, preconditioner: PreconditionerKind) {
        let (g, m) = system(2);
        let comm = SerialComm::new();
        let layout = VectorLayout::scalar();
        let halo = HaloContext {
            geometry: &g,
            comm: &comm,
            layout: &layout,
        };
        let mut exact = SysVector::new(g.n_point(), g.n_point_domain(), 2);
        for i in 0..g.n_point() {
            exact.set_block(i, &[i as f64, 1.0 - 0.5 * i as f64]);
        }
        let mut rhs = exact.clone();
        m.matvec(&exact, &mut rhs, &halo).unwrap();

        let config = LinearSolverConfig {
            kind,
            preconditioner,
            tolerance: 1e-12,
            max_iterations: 400,
            restart: 8,
            smoother_relaxation: 1.0,
        };
        let mut solver = LinearSystemSolver::from_config(&config);
        let mut sol = SysVector::new(g.n_point(), g.n_point_domain(), 2);
        let report = solver.solve(&m, &rhs, &mut sol, &halo).unwrap();
        assert!(report.converged, "{kind:?}/{preconditioner:?}: {report:?}");
        for i in 0..g.n_point() {
            for v in 0..2 {
                assert_relative_eq!(sol.get(i, v), exact.get(i, v), epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn fgmres_converges() {
        check(LinearSolverKind::Fgmres, PreconditionerKind::Jacobi);
        check(LinearSolverKind::Fgmres, PreconditionerKind::LuSgs);
    }

    #[test]
    fn bcgstab_converges() {
        check(LinearSolverKind::Bcgstab, PreconditionerKind::Jacobi);
        check(LinearSolverKind::Bcgstab, PreconditionerKind::LuSgs);
    }

    #[test]
    fn smoother_converges_on_dominant_system() {
        check(LinearSolverKind::SmootherJacobi, PreconditionerKind::Jacobi);
    }

    #[test]
    fn zero_rhs_gives_zero_solution() {
        let (g, m) = system(1);
        let comm = SerialComm::new();
        let layout = VectorLayout::scalar();
        let halo = HaloContext {
            geometry: &g,
            comm: &comm,
            layout: &layout,
        };
        let rhs = SysVector::new(g.n_point(), g.n_point_domain(), 1);
        let mut sol = rhs.clone();
        sol.set(0, 0, 3.0);
        let mut solver = LinearSystemSolver::from_config(&LinearSolverConfig::default());
        let report = solver.solve(&m, &rhs, &mut sol, &halo).unwrap();
        assert_eq!(report.iterations, 0);
        assert_eq!(sol.get(0, 0), 0.0);
    }
}

//! Physics solvers assembled from capability traits.
//!
//! Every solver owns a [`SolverCore`] and implements the convective and
//! boundary capabilities; viscous and source capabilities are optional and
//! exposed through [`Solver::as_viscous`] and [`Solver::as_source`]. One
//! pseudo-time step runs
//! `preprocessing -> convective -> viscous -> source -> boundaries -> update
//! -> postprocessing`.

pub mod base;
pub mod euler;
pub mod euler_bc;
pub mod forces;
pub mod gradient;
pub mod limiter;
pub mod navier_stokes;
pub mod residual;
pub mod restart;
pub mod turb_sa;
pub mod turb_sst;
pub mod turbulence;

pub use base::{HaloLayouts, SolverCore};
pub use euler::EulerSolver;
pub use forces::{ForceCoefficients, ForceReport, MarkerForces};
pub use navier_stokes::NsSolver;
pub use residual::{ResidualMax, ResidualMonitor};
pub use restart::{RestartFormat, RestartTable};
pub use turb_sa::SaClosure;
pub use turb_sst::SstClosure;
pub use turbulence::{TurbSolver, TurbulenceClosure};

use crate::{
    comm::Communicator,
    config::{Config, SolverKind, TimeIntegration, TurbulenceModel},
    error::{ConfigError, SolverError},
    geometry::Geometry,
    variable::VariableStore,
};

/// Read-only view of the other solvers of the zone.
#[derive(Clone, Copy, Default)]
pub struct Coupling<'a> {
    pub flow: Option<&'a VariableStore>,
    pub turbulence: Option<&'a VariableStore>,
}

/// Everything a solver step reads besides its own state.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub geometry: &'a Geometry,
    pub config: &'a Config,
    pub comm: &'a dyn Communicator,
    pub coupling: Coupling<'a>,
    /// Runge-Kutta stage, zero for single-stage schemes.
    pub rk_stage: usize,
    pub iteration: usize,
}

impl<'a> StepContext<'a> {
    pub fn new(geometry: &'a Geometry, config: &'a Config, comm: &'a dyn Communicator) -> Self {
        Self {
            geometry,
            config,
            comm,
            coupling: Coupling::default(),
            rk_stage: 0,
            iteration: 0,
        }
    }

    pub fn with_coupling(mut self, coupling: Coupling<'a>) -> Self {
        self.coupling = coupling;
        self
    }

    pub fn with_stage(mut self, rk_stage: usize) -> Self {
        self.rk_stage = rk_stage;
        self
    }

    pub fn with_iteration(mut self, iteration: usize) -> Self {
        self.iteration = iteration;
        self
    }

    pub(crate) fn flow(&self) -> Result<&'a VariableStore, SolverError> {
        self.coupling
            .flow
            .ok_or(SolverError::Config(ConfigError::Inconsistent(
                "turbulence transport needs the flow solution",
            )))
    }
}

/// Edge loop of the convective terms.
pub trait ConvectiveFluxProvider {
    fn convective_residual(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError>;
}

/// Edge loop of the diffusive terms; gradients must be current.
pub trait ViscousFluxProvider {
    fn viscous_residual(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError>;
}

/// Point loop of the volume sources.
pub trait SourceTermProvider {
    fn source_residual(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError>;
}

/// Boundary conditions, called once per marker of the geometry.
pub trait BoundaryConditionSet {
    fn boundary_residual(
        &mut self,
        ctx: &StepContext<'_>,
        marker: usize,
    ) -> Result<(), SolverError>;
}

pub trait Solver: ConvectiveFluxProvider + BoundaryConditionSet {
    fn name(&self) -> &'static str;

    fn core(&self) -> &SolverCore;

    fn core_mut(&mut self) -> &mut SolverCore;

    fn as_viscous(&mut self) -> Option<&mut dyn ViscousFluxProvider> {
        None
    }

    fn as_source(&mut self) -> Option<&mut dyn SourceTermProvider> {
        None
    }

    /// Aerodynamic loads, for solvers that integrate them.
    fn forces(&self) -> Option<&ForceReport> {
        None
    }

    /// Clears the residual and recomputes everything derived from the
    /// solution. Calling it twice in a row gives the same state.
    fn preprocessing(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError>;

    fn set_time_step(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError>;

    /// Convective, viscous and source terms, then the boundaries. Markers
    /// that impose values strongly go last so that nothing is added to their
    /// rows afterwards.
    fn assemble(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        self.convective_residual(ctx)?;
        if let Some(viscous) = self.as_viscous() {
            viscous.viscous_residual(ctx)?;
        }
        if let Some(source) = self.as_source() {
            source.source_residual(ctx)?;
        }
        let n_marker = self.core().marker_kinds().len();
        for strong in [false, true] {
            for marker in 0..n_marker {
                if self.core().marker_kinds()[marker].is_viscous_wall() == strong {
                    self.boundary_residual(ctx, marker)?;
                }
            }
        }
        Ok(())
    }

    fn explicit_euler_iteration(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        self.core_mut().explicit_euler_update(ctx.geometry, ctx.comm)
    }

    fn explicit_rk_iteration(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        let alpha = ctx
            .config
            .time
            .rk_alpha
            .get(ctx.rk_stage)
            .copied()
            .ok_or(ConfigError::InvalidValue("RK_ALPHA_COEFF", "fewer coefficients than stages"))?;
        self.core_mut().rk_update(ctx.geometry, ctx.comm, ctx.rk_stage, alpha)
    }

    fn implicit_euler_iteration(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        self.core_mut().implicit_update(ctx.geometry, ctx.comm)
    }

    /// Applies the configured pseudo-time scheme, then
    /// [`Solver::finalize_update`].
    fn update(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError> {
        match ctx.config.time.scheme {
            TimeIntegration::RungeKuttaExplicit => self.explicit_rk_iteration(ctx)?,
            TimeIntegration::EulerExplicit => self.explicit_euler_iteration(ctx)?,
            TimeIntegration::EulerImplicit => self.implicit_euler_iteration(ctx)?,
        }
        self.finalize_update(ctx)
    }

    /// Validity checks on the new solution and its halo exchange.
    fn finalize_update(&mut self, ctx: &StepContext<'_>) -> Result<(), SolverError>;

    fn postprocessing(&mut self, _ctx: &StepContext<'_>) -> Result<(), SolverError> {
        Ok(())
    }

    /// Column names of this solver's variables in a restart file.
    fn field_names(&self, n_dim: usize) -> Vec<String>;

    /// First column of this solver's variables after the coordinates.
    fn restart_offset(&self, _n_dim: usize) -> usize {
        0
    }

    fn load_restart(
        &mut self,
        ctx: &StepContext<'_>,
        table: &RestartTable,
    ) -> Result<(), SolverError> {
        let offset = self.restart_offset(ctx.geometry.n_dim());
        restart::load_into(self.core_mut(), ctx.geometry, ctx.comm, table, offset)
    }
}

/// Flow solver selected by the configuration.
pub fn flow_solver(
    geometry: &Geometry,
    config: &Config,
    comm: &dyn Communicator,
) -> Result<Box<dyn Solver>, SolverError> {
    Ok(match config.solver {
        SolverKind::Euler => Box::new(EulerSolver::new(geometry, config, comm)?),
        SolverKind::NavierStokes | SolverKind::Rans => {
            Box::new(NsSolver::new(geometry, config, comm)?)
        }
    })
}

/// Turbulence solver of a RANS configuration, `None` otherwise.
pub fn turbulence_solver(
    geometry: &Geometry,
    config: &Config,
    comm: &dyn Communicator,
) -> Result<Option<Box<dyn Solver>>, SolverError> {
    Ok(match config.turbulence {
        TurbulenceModel::None => None,
        TurbulenceModel::SpalartAllmaras => Some(Box::new(TurbSolver::new(
            geometry,
            config,
            comm,
            SaClosure::new(),
        )?)),
        TurbulenceModel::Sst => Some(Box::new(TurbSolver::new(
            geometry,
            config,
            comm,
            SstClosure::new(geometry.n_point()),
        )?)),
    })
}

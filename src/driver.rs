use std::io::Write;

use crate::{
    comm::Communicator,
    config::Config,
    error::SolverError,
    geometry::Geometry,
    solver::{
        flow_solver, turbulence_solver, Coupling, ForceCoefficients, RestartFormat, RestartTable,
        Solver, StepContext,
    },
};

/// One flow solver, optionally coupled to a turbulence solver, on one
/// partition of the grid.
pub struct Zone {
    geometry: Geometry,
    config: Config,
    flow: Box<dyn Solver>,
    turbulence: Option<Box<dyn Solver>>,
}

impl Zone {
    /// Validates the configuration against the grid, computes the wall
    /// distance for viscous runs and builds the solvers at free stream.
    pub fn new(
        mut geometry: Geometry,
        config: Config,
        comm: &dyn Communicator,
    ) -> Result<Self, SolverError> {
        config.validate(&geometry)?;
        if config.solver.is_viscous() {
            geometry.compute_wall_distance(
                |tag| config.marker(tag).map_or(false, |m| m.kind.is_viscous_wall()),
                comm,
            )?;
        }
        let flow = flow_solver(&geometry, &config, comm)?;
        let turbulence = turbulence_solver(&geometry, &config, comm)?;
        Ok(Self {
            geometry,
            config,
            flow,
            turbulence,
        })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn flow(&self) -> &dyn Solver {
        self.flow.as_ref()
    }

    pub fn turbulence(&self) -> Option<&dyn Solver> {
        self.turbulence.as_deref()
    }

    /// One outer iteration: every Runge-Kutta stage of the flow, its
    /// post-processing, then one step of the turbulence transport with the
    /// flow state of the last stage.
    pub fn iterate(
        &mut self,
        comm: &dyn Communicator,
        iteration: usize,
    ) -> Result<(), SolverError> {
        let Zone {
            geometry,
            config,
            flow,
            turbulence,
        } = self;
        let base = StepContext::new(geometry, config, comm).with_iteration(iteration);

        for stage in 0..config.n_stages() {
            let ctx = base.with_stage(stage).with_coupling(with_turbulence(turbulence));
            flow.preprocessing(&ctx)?;
            if stage == 0 {
                flow.set_time_step(&ctx)?;
            }
            flow.assemble(&ctx)?;
            flow.update(&ctx)?;
        }
        flow.postprocessing(&base.with_coupling(with_turbulence(turbulence)))?;

        if let Some(turbulence) = turbulence {
            let ctx = base.with_coupling(Coupling {
                flow: Some(flow.core().nodes()),
                turbulence: None,
            });
            turbulence.preprocessing(&ctx)?;
            turbulence.set_time_step(&ctx)?;
            turbulence.assemble(&ctx)?;
            turbulence.update(&ctx)?;
            turbulence.postprocessing(&ctx)?;
        }
        Ok(())
    }

    /// Gathers the solution of every rank into one table.
    pub fn restart_table(&self, comm: &dyn Communicator) -> Result<RestartTable, SolverError> {
        let solvers: Vec<&dyn Solver> = std::iter::once(self.flow.as_ref())
            .chain(self.turbulence.as_deref())
            .collect();
        RestartTable::collect(&self.geometry, comm, &solvers)
    }

    /// Overwrites the owned points of every solver from `table`.
    pub fn load_restart(
        &mut self,
        comm: &dyn Communicator,
        table: &RestartTable,
    ) -> Result<(), SolverError> {
        let ctx = StepContext::new(&self.geometry, &self.config, comm);
        self.flow.load_restart(&ctx, table)?;
        if let Some(turbulence) = &mut self.turbulence {
            turbulence.load_restart(&ctx, table)?;
        }
        Ok(())
    }
}

fn with_turbulence(turbulence: &Option<Box<dyn Solver>>) -> Coupling<'_> {
    Coupling {
        flow: None,
        turbulence: turbulence.as_deref().map(|t| t.core().nodes()),
    }
}

pub struct ObsCtx<'ctx> {
    zone: &'ctx Zone,
    comm: &'ctx dyn Communicator,
    iteration: usize,
}

impl<'ctx> ObsCtx<'ctx> {
    pub fn zone(&self) -> &'ctx Zone {
        self.zone
    }

    pub fn comm(&self) -> &'ctx dyn Communicator {
        self.comm
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn flow(&self) -> &'ctx dyn Solver {
        self.zone.flow()
    }

    pub fn turbulence(&self) -> Option<&'ctx dyn Solver> {
        self.zone.turbulence()
    }

    /// Total force coefficients of the last post-processing.
    pub fn coefficients(&self) -> Option<&'ctx ForceCoefficients> {
        self.zone.flow().forces().map(|f| f.total())
    }
}

#[allow(unused_variables)]
pub trait Observer {
    fn at_startup(&mut self, ctx: ObsCtx) -> Result<(), SolverError> {
        Ok(())
    }

    fn at_each_iteration(&mut self, ctx: ObsCtx) -> Result<(), SolverError> {
        Ok(())
    }

    fn at_cleanup(&mut self, ctx: ObsCtx) -> Result<(), SolverError> {
        Ok(())
    }
}

/// Outcome of [`Driver::run`].
#[derive(Clone, Debug, PartialEq)]
pub struct DriverReport {
    pub iterations: usize,
    /// The residual-drop criterion was met before the iteration cap.
    pub converged: bool,
    pub log10_rms: Vec<f64>,
}

pub struct Driver<'c, 'd> {
    zone: Zone,
    comm: &'c dyn Communicator,
    observers: Vec<Box<dyn Observer + 'd>>,
    max_iterations: usize,
    residual_drop: Option<f64>,
}

impl<'c, 'd> Driver<'c, 'd> {
    pub fn new(zone: Zone, comm: &'c dyn Communicator) -> Self {
        Self {
            zone,
            comm,
            observers: Vec::new(),
            max_iterations: 100,
            residual_drop: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Stops once the density residual fell by `orders` orders of magnitude
    /// from the first iteration.
    pub fn with_residual_drop(mut self, orders: f64) -> Self {
        self.residual_drop = Some(orders);
        self
    }

    pub fn with_observer(mut self, observer: impl Observer + 'd) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn zone(&self) -> &Zone {
        &self.zone
    }

    pub fn into_zone(self) -> Zone {
        self.zone
    }

    fn notify(
        &mut self,
        iteration: usize,
        hook: impl Fn(&mut dyn Observer, ObsCtx) -> Result<(), SolverError>,
    ) -> Result<(), SolverError> {
        for o in self.observers.iter_mut() {
            hook(
                &mut **o,
                ObsCtx {
                    zone: &self.zone,
                    comm: self.comm,
                    iteration,
                },
            )?;
        }
        Ok(())
    }

    pub fn run(&mut self) -> Result<DriverReport, SolverError> {
        self.notify(0, |o, ctx| o.at_startup(ctx))?;

        let mut initial = None;
        let mut converged = false;
        let mut iterations = 0;
        while iterations < self.max_iterations {
            self.zone.iterate(self.comm, iterations)?;
            iterations += 1;
            self.notify(iterations, |o, ctx| o.at_each_iteration(ctx))?;

            let density = self.zone.flow().core().monitor().log10_rms()[0];
            let initial = *initial.get_or_insert(density);
            if let Some(orders) = self.residual_drop {
                if initial - density >= orders {
                    converged = true;
                    break;
                }
            }
        }

        self.notify(iterations, |o, ctx| o.at_cleanup(ctx))?;
        Ok(DriverReport {
            iterations,
            converged,
            log10_rms: self.zone.flow().core().monitor().log10_rms(),
        })
    }
}

fn format_residuals(values: &[f64]) -> String {
    values
        .iter()
        .map(|r| format!("{r:.4}"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct Logger;

impl Observer for Logger {
    fn at_startup(&mut self, ctx: ObsCtx) -> Result<(), SolverError> {
        let geometry = ctx.zone().geometry();
        tracing::event!(
            tracing::Level::INFO,
            "start of `{}` run{} ({} points, {} edges, {} markers, rank {} of {})",
            ctx.flow().name(),
            ctx.turbulence()
                .map(|t| format!(" with `{}`", t.name()))
                .unwrap_or_default(),
            geometry.n_point(),
            geometry.edges().len(),
            geometry.markers().len(),
            ctx.comm().rank(),
            ctx.comm().size(),
        );
        Ok(())
    }

    fn at_each_iteration(&mut self, ctx: ObsCtx) -> Result<(), SolverError> {
        let flow = format_residuals(&ctx.flow().core().monitor().log10_rms());
        let turbulence = ctx
            .turbulence()
            .map(|t| format_residuals(&t.core().monitor().log10_rms()))
            .unwrap_or_default();
        match ctx.coefficients() {
            Some(c) => tracing::event!(
                tracing::Level::DEBUG,
                "iteration {}: log10 rms [{}] [{}], CL={:e} CD={:e}",
                ctx.iteration(),
                flow,
                turbulence,
                c.cl,
                c.cd,
            ),
            None => tracing::event!(
                tracing::Level::DEBUG,
                "iteration {}: log10 rms [{}] [{}]",
                ctx.iteration(),
                flow,
                turbulence,
            ),
        }
        Ok(())
    }

    fn at_cleanup(&mut self, ctx: ObsCtx) -> Result<(), SolverError> {
        tracing::event!(
            tracing::Level::INFO,
            "finished `{}` run after {} iterations",
            ctx.flow().name(),
            ctx.iteration()
        );
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HistoryEntry {
    pub iteration: usize,
    pub log10_rms: Vec<f64>,
    pub turbulence_log10_rms: Vec<f64>,
    pub coefficients: Option<ForceCoefficients>,
}

/// Appends the residuals and total coefficients of every iteration to a
/// caller-owned history.
pub struct HistoryRecorder<'h> {
    history: &'h mut Vec<HistoryEntry>,
}

impl<'h> HistoryRecorder<'h> {
    pub fn new(history: &'h mut Vec<HistoryEntry>) -> Self {
        Self { history }
    }
}

impl Observer for HistoryRecorder<'_> {
    fn at_each_iteration(&mut self, ctx: ObsCtx) -> Result<(), SolverError> {
        self.history.push(HistoryEntry {
            iteration: ctx.iteration(),
            log10_rms: ctx.flow().core().monitor().log10_rms(),
            turbulence_log10_rms: ctx
                .turbulence()
                .map(|t| t.core().monitor().log10_rms())
                .unwrap_or_default(),
            coefficients: ctx.coefficients().copied(),
        });
        Ok(())
    }
}

/// Writes the final solution of the zone as a restart file. The table is
/// gathered on every rank and written by rank 0 only.
pub struct RestartWriter<W> {
    output: W,
    format: RestartFormat,
}

impl<W: Write> RestartWriter<W> {
    pub fn new(output: W, format: RestartFormat) -> Self {
        Self { output, format }
    }
}

impl<W: Write> Observer for RestartWriter<W> {
    fn at_cleanup(&mut self, ctx: ObsCtx) -> Result<(), SolverError> {
        let table = ctx.zone().restart_table(ctx.comm())?;
        if ctx.comm().rank() == 0 {
            table.write(&mut self.output, self.format)?;
            self.output.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        comm::SerialComm,
        config::{BoundaryKind, TimeIntegration},
        mesh::{Grid, RectangularMesh},
        solver::restart::read_restart,
    };

    fn box_zone(comm: &SerialComm) -> Zone {
        let geometry =
            RectangularMesh::new(Grid::from_steps(0.0, 1.0, 5), Grid::from_steps(0.0, 1.0, 5))
                .build()
                .unwrap();
        let config = Config::euler()
            .with_mach(0.3)
            .with_time_integration(TimeIntegration::EulerExplicit, 0.5)
            .with_marker("lower", BoundaryKind::FarField)
            .with_marker("right", BoundaryKind::FarField)
            .with_marker("upper", BoundaryKind::FarField)
            .with_marker("left", BoundaryKind::FarField);
        Zone::new(geometry, config, comm).unwrap()
    }

    #[test]
    fn missing_marker_is_fatal() {
        let comm = SerialComm::new();
        let geometry =
            RectangularMesh::new(Grid::from_steps(0.0, 1.0, 2), Grid::from_steps(0.0, 1.0, 2))
                .build()
                .unwrap();
        let config = Config::euler().with_marker("lower", BoundaryKind::EulerWall);
        assert!(matches!(
            Zone::new(geometry, config, &comm),
            Err(SolverError::Config(_))
        ));
    }

    #[test]
    fn history_has_one_entry_per_iteration() {
        let comm = SerialComm::new();
        let mut history = Vec::new();
        let report = Driver::new(box_zone(&comm), &comm)
            .with_max_iterations(3)
            .with_observer(Logger)
            .with_observer(HistoryRecorder::new(&mut history))
            .run()
            .unwrap();
        assert_eq!(report.iterations, 3);
        assert!(!report.converged);
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].iteration, 3);
        assert_eq!(history[0].log10_rms.len(), 4);
    }

    #[test]
    fn restart_writer_emits_every_point() {
        let comm = SerialComm::new();
        let mut buffer = Vec::new();
        Driver::new(box_zone(&comm), &comm)
            .with_max_iterations(1)
            .with_observer(RestartWriter::new(&mut buffer, RestartFormat::Ascii))
            .run()
            .unwrap();
        let table = read_restart(buffer.as_slice()).unwrap();
        assert_eq!(table.n_points(), 36);
        assert_eq!(table.names().len(), 4);
    }
}

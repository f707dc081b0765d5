//! Typed run configuration.
//!
//! A [`Config`] is assembled with `with_*` builder methods, or populated from
//! `KEY = VALUE` pairs through an [`OptionRegistry`]. It is immutable once a
//! solver has been constructed from it.

use std::fmt;

use crate::{error::ConfigError, geometry::Geometry};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverKind {
    Euler,
    NavierStokes,
    Rans,
}

impl SolverKind {
    pub fn is_viscous(self) -> bool {
        !matches!(self, SolverKind::Euler)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurbulenceModel {
    None,
    SpalartAllmaras,
    Sst,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvectiveScheme {
    Jst,
    LaxFriedrichs,
    Roe,
    ScalarUpwind,
}

impl ConvectiveScheme {
    pub fn is_centered(self) -> bool {
        matches!(self, ConvectiveScheme::Jst | ConvectiveScheme::LaxFriedrichs)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpatialOrder {
    First,
    Second,
    SecondLimited,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimiterKind {
    Venkatakrishnan,
    /// Barth-Jespersen, registered under `MINMOD`.
    BarthJespersen,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GradientMethod {
    GreenGauss,
    WeightedLeastSquares,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViscousScheme {
    AvgGrad,
    AvgGradCorrected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeIntegration {
    RungeKuttaExplicit,
    EulerExplicit,
    EulerImplicit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinearSolverKind {
    Fgmres,
    Bcgstab,
    SmootherJacobi,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreconditionerKind {
    Jacobi,
    LuSgs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Nondimensionalization {
    Dimensional,
    FreestreamPressEqOne,
    FreestreamVelEqMach,
    FreestreamVelEqOne,
}

/// What to do with points whose density or pressure is not positive after an
/// update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PathologyPolicy {
    /// Keep the state, count the points and log them.
    #[default]
    Ignore,
    /// Restore the previous state of the offending points only.
    Clamp,
    /// Restore the previous state of every point.
    Revert,
    /// Fail the iteration with [`crate::SolverError::NonPhysical`].
    Abort,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ViscosityModel {
    Constant(f64),
    Sutherland { mu_ref: f64, t_ref: f64, s: f64 },
}

impl ViscosityModel {
    pub const AIR_SUTHERLAND: ViscosityModel = ViscosityModel::Sutherland {
        mu_ref: 1.716e-5,
        t_ref: 273.15,
        s: 110.4,
    };

    /// Dimensional viscosity at dimensional temperature `t`.
    pub fn eval(&self, t: f64) -> f64 {
        match *self {
            ViscosityModel::Constant(mu) => mu,
            ViscosityModel::Sutherland { mu_ref, t_ref, s } => {
                mu_ref * (t / t_ref).powf(1.5) * (t_ref + s) / (t + s)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GasModel {
    pub gamma: f64,
    pub gas_constant: f64,
    pub prandtl_lam: f64,
    pub prandtl_turb: f64,
    pub viscosity: ViscosityModel,
}

impl Default for GasModel {
    fn default() -> Self {
        Self {
            gamma: 1.4,
            gas_constant: 287.87,
            prandtl_lam: 0.72,
            prandtl_turb: 0.9,
            viscosity: ViscosityModel::AIR_SUTHERLAND,
        }
    }
}

/// Non-dimensional free-stream state given directly, bypassing reference
/// scaling.
#[derive(Clone, Debug, PartialEq)]
pub struct PrescribedState {
    pub density: f64,
    pub velocity: Vec<f64>,
    pub pressure: f64,
    /// Laminar viscosity, only read by viscous solvers.
    pub viscosity: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FreeStreamConfig {
    pub mach: f64,
    /// Degrees.
    pub angle_of_attack: f64,
    /// Degrees.
    pub sideslip: f64,
    pub pressure: f64,
    pub temperature: f64,
    pub reynolds: f64,
    pub reynolds_length: f64,
    pub nondimensionalization: Nondimensionalization,
    pub turbulence_intensity: f64,
    pub viscosity_ratio: f64,
    pub nu_factor: f64,
    pub prescribed: Option<PrescribedState>,
}

impl Default for FreeStreamConfig {
    fn default() -> Self {
        Self {
            mach: 0.8,
            angle_of_attack: 0.0,
            sideslip: 0.0,
            pressure: 101325.0,
            temperature: 288.15,
            reynolds: 1.0e6,
            reynolds_length: 1.0,
            nondimensionalization: Nondimensionalization::FreestreamVelEqMach,
            turbulence_intensity: 0.05,
            viscosity_ratio: 10.0,
            nu_factor: 3.0,
            prescribed: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReferenceValues {
    pub area: f64,
    pub length: f64,
    pub origin: [f64; 3],
}

impl Default for ReferenceValues {
    fn default() -> Self {
        Self {
            area: 1.0,
            length: 1.0,
            origin: [0.0; 3],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowNumerics {
    pub convective: ConvectiveScheme,
    pub spatial_order: SpatialOrder,
    pub limiter: LimiterKind,
    pub limiter_coeff: f64,
    pub ref_elem_length: f64,
    pub gradient: GradientMethod,
    pub viscous: ViscousScheme,
    pub jst_k2: f64,
    pub jst_k4: f64,
    pub lax_k0: f64,
    pub entropy_fix: f64,
}

impl Default for FlowNumerics {
    fn default() -> Self {
        Self {
            convective: ConvectiveScheme::Roe,
            spatial_order: SpatialOrder::First,
            limiter: LimiterKind::Venkatakrishnan,
            limiter_coeff: 5.0,
            ref_elem_length: 0.1,
            gradient: GradientMethod::GreenGauss,
            viscous: ViscousScheme::AvgGradCorrected,
            jst_k2: 0.5,
            jst_k4: 0.02,
            lax_k0: 0.15,
            entropy_fix: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TurbulenceNumerics {
    pub convective: ConvectiveScheme,
    pub spatial_order: SpatialOrder,
    pub viscous: ViscousScheme,
    pub cfl_reduction: f64,
    pub relaxation: f64,
}

impl Default for TurbulenceNumerics {
    fn default() -> Self {
        Self {
            convective: ConvectiveScheme::ScalarUpwind,
            spatial_order: SpatialOrder::First,
            viscous: ViscousScheme::AvgGradCorrected,
            cfl_reduction: 1.0,
            relaxation: 1.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TimeConfig {
    pub scheme: TimeIntegration,
    pub cfl: f64,
    pub rk_alpha: Vec<f64>,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            scheme: TimeIntegration::EulerImplicit,
            cfl: 5.0,
            rk_alpha: vec![0.25, 1.0 / 3.0, 0.5, 1.0],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearSolverConfig {
    pub kind: LinearSolverKind,
    pub preconditioner: PreconditionerKind,
    pub tolerance: f64,
    pub max_iterations: usize,
    pub restart: usize,
    pub smoother_relaxation: f64,
}

impl Default for LinearSolverConfig {
    fn default() -> Self {
        Self {
            kind: LinearSolverKind::Fgmres,
            preconditioner: PreconditionerKind::LuSgs,
            tolerance: 1e-6,
            max_iterations: 20,
            restart: 20,
            smoother_relaxation: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InletSpec {
    /// Dimensional total pressure and temperature with a flow direction.
    TotalConditions {
        total_pressure: f64,
        total_temperature: f64,
        direction: [f64; 3],
    },
    /// Dimensional density and velocity magnitude with a flow direction.
    MassFlow {
        density: f64,
        velocity: f64,
        direction: [f64; 3],
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BoundaryKind {
    EulerWall,
    FarField,
    SymmetryPlane,
    Inlet(InletSpec),
    SupersonicInlet {
        temperature: f64,
        pressure: f64,
        velocity: [f64; 3],
    },
    Outlet {
        pressure: f64,
    },
    Isothermal {
        temperature: f64,
    },
    HeatFlux {
        heat_flux: f64,
    },
    /// Handled entirely by halo exchange.
    Periodic,
    /// Partition interface, handled entirely by halo exchange.
    SendReceive,
}

impl BoundaryKind {
    pub fn is_wall(&self) -> bool {
        matches!(
            self,
            BoundaryKind::EulerWall
                | BoundaryKind::Isothermal { .. }
                | BoundaryKind::HeatFlux { .. }
        )
    }

    pub fn is_viscous_wall(&self) -> bool {
        matches!(
            self,
            BoundaryKind::Isothermal { .. } | BoundaryKind::HeatFlux { .. }
        )
    }

    /// Whether the marker closes the dual control volumes of its points.
    pub fn is_physical(&self) -> bool {
        !matches!(self, BoundaryKind::Periodic | BoundaryKind::SendReceive)
    }

    pub fn name(&self) -> &'static str {
        match self {
            BoundaryKind::EulerWall => "EULER_WALL",
            BoundaryKind::FarField => "FAR_FIELD",
            BoundaryKind::SymmetryPlane => "SYMMETRY_PLANE",
            BoundaryKind::Inlet(_) => "INLET_FLOW",
            BoundaryKind::SupersonicInlet { .. } => "SUPERSONIC_INLET",
            BoundaryKind::Outlet { .. } => "OUTLET_FLOW",
            BoundaryKind::Isothermal { .. } => "ISOTHERMAL",
            BoundaryKind::HeatFlux { .. } => "HEAT_FLUX",
            BoundaryKind::Periodic => "PERIODIC_BOUNDARY",
            BoundaryKind::SendReceive => "SEND_RECEIVE",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MarkerConfig {
    pub tag: String,
    pub kind: BoundaryKind,
    /// Included in the `Total` force coefficients.
    pub monitoring: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub solver: SolverKind,
    pub turbulence: TurbulenceModel,
    pub gas: GasModel,
    pub free_stream: FreeStreamConfig,
    pub reference: ReferenceValues,
    pub flow_numerics: FlowNumerics,
    pub turb_numerics: TurbulenceNumerics,
    pub time: TimeConfig,
    pub linear: LinearSolverConfig,
    pub markers: Vec<MarkerConfig>,
    pub pathology: PathologyPolicy,
}

impl Config {
    pub fn new(solver: SolverKind, turbulence: TurbulenceModel) -> Self {
        Self {
            solver,
            turbulence,
            gas: GasModel::default(),
            free_stream: FreeStreamConfig::default(),
            reference: ReferenceValues::default(),
            flow_numerics: FlowNumerics::default(),
            turb_numerics: TurbulenceNumerics::default(),
            time: TimeConfig::default(),
            linear: LinearSolverConfig::default(),
            markers: Vec::new(),
            pathology: PathologyPolicy::default(),
        }
    }

    pub fn euler() -> Self {
        Self::new(SolverKind::Euler, TurbulenceModel::None)
    }

    pub fn navier_stokes() -> Self {
        Self::new(SolverKind::NavierStokes, TurbulenceModel::None)
    }

    pub fn rans(model: TurbulenceModel) -> Self {
        Self::new(SolverKind::Rans, model)
    }

    pub fn with_mach(mut self, mach: f64) -> Self {
        self.free_stream.mach = mach;
        self
    }

    pub fn with_angle_of_attack(mut self, degrees: f64) -> Self {
        self.free_stream.angle_of_attack = degrees;
        self
    }

    pub fn with_sideslip(mut self, degrees: f64) -> Self {
        self.free_stream.sideslip = degrees;
        self
    }

    pub fn with_reynolds(mut self, reynolds: f64, length: f64) -> Self {
        self.free_stream.reynolds = reynolds;
        self.free_stream.reynolds_length = length;
        self
    }

    pub fn with_nondimensionalization(mut self, nondim: Nondimensionalization) -> Self {
        self.free_stream.nondimensionalization = nondim;
        self
    }

    /// Uses a non-dimensional free-stream state as given.
    pub fn with_free_stream_state(
        mut self,
        density: f64,
        velocity: &[f64],
        pressure: f64,
        viscosity: f64,
    ) -> Self {
        self.free_stream.prescribed = Some(PrescribedState {
            density,
            velocity: velocity.to_vec(),
            pressure,
            viscosity,
        });
        self
    }

    pub fn with_gas(mut self, gas: GasModel) -> Self {
        self.gas = gas;
        self
    }

    pub fn with_reference(mut self, area: f64, length: f64, origin: [f64; 3]) -> Self {
        self.reference = ReferenceValues {
            area,
            length,
            origin,
        };
        self
    }

    pub fn with_convective(mut self, scheme: ConvectiveScheme, order: SpatialOrder) -> Self {
        self.flow_numerics.convective = scheme;
        self.flow_numerics.spatial_order = order;
        self
    }

    pub fn with_limiter(mut self, limiter: LimiterKind, coeff: f64) -> Self {
        self.flow_numerics.limiter = limiter;
        self.flow_numerics.limiter_coeff = coeff;
        self
    }

    pub fn with_gradient(mut self, method: GradientMethod) -> Self {
        self.flow_numerics.gradient = method;
        self
    }

    pub fn with_time_integration(mut self, scheme: TimeIntegration, cfl: f64) -> Self {
        self.time.scheme = scheme;
        self.time.cfl = cfl;
        self
    }

    pub fn with_linear_solver(
        mut self,
        kind: LinearSolverKind,
        preconditioner: PreconditionerKind,
        tolerance: f64,
        max_iterations: usize,
    ) -> Self {
        self.linear.kind = kind;
        self.linear.preconditioner = preconditioner;
        self.linear.tolerance = tolerance;
        self.linear.max_iterations = max_iterations;
        self
    }

    pub fn with_pathology(mut self, policy: PathologyPolicy) -> Self {
        self.pathology = policy;
        self
    }

    pub fn with_marker(mut self, tag: impl Into<String>, kind: BoundaryKind) -> Self {
        self.markers.push(MarkerConfig {
            tag: tag.into(),
            kind,
            monitoring: false,
        });
        self
    }

    pub fn with_monitored_marker(mut self, tag: impl Into<String>, kind: BoundaryKind) -> Self {
        self.markers.push(MarkerConfig {
            tag: tag.into(),
            kind,
            monitoring: true,
        });
        self
    }

    pub fn marker(&self, tag: &str) -> Option<&MarkerConfig> {
        self.markers.iter().find(|m| m.tag == tag)
    }

    pub fn is_implicit(&self) -> bool {
        self.time.scheme == TimeIntegration::EulerImplicit
    }

    /// Number of stages of one pseudo-time iteration.
    pub fn n_stages(&self) -> usize {
        match self.time.scheme {
            TimeIntegration::RungeKuttaExplicit => self.time.rk_alpha.len(),
            _ => 1,
        }
    }

    /// Checks the configuration against the grid it will run on.
    pub fn validate(&self, geometry: &Geometry) -> Result<(), ConfigError> {
        match (self.solver, self.turbulence) {
            (SolverKind::Rans, TurbulenceModel::None) => {
                return Err(ConfigError::Inconsistent(
                    "RANS requires a turbulence model",
                ))
            }
            (SolverKind::Euler | SolverKind::NavierStokes, m) if m != TurbulenceModel::None => {
                return Err(ConfigError::Inconsistent(
                    "a turbulence model requires the RANS solver",
                ))
            }
            _ => {}
        }

        if self.flow_numerics.convective == ConvectiveScheme::ScalarUpwind {
            return Err(ConfigError::Inconsistent(
                "SCALAR_UPWIND is only available for turbulence transport",
            ));
        }
        if !(self.time.cfl > 0.0 && self.time.cfl.is_finite()) {
            return Err(ConfigError::InvalidValue("CFL_NUMBER", "must be positive"));
        }
        if self.time.rk_alpha.is_empty() {
            return Err(ConfigError::InvalidValue("RK_ALPHA_COEFF", "must not be empty"));
        }
        if self.linear.max_iterations == 0 || self.linear.restart == 0 {
            return Err(ConfigError::InvalidValue(
                "LINEAR_SOLVER_ITER",
                "must be at least one",
            ));
        }

        let positive = |v: f64| v > 0.0 && v.is_finite();
        let gas = &self.gas;
        if !(gas.gamma > 1.0 && gas.gamma.is_finite()) {
            return Err(ConfigError::Gamma(gas.gamma));
        }
        if !positive(gas.gas_constant) {
            return Err(ConfigError::GasConstant(gas.gas_constant));
        }
        if !positive(gas.prandtl_lam) {
            return Err(ConfigError::PrandtlLaminar(gas.prandtl_lam));
        }
        if !positive(gas.prandtl_turb) {
            return Err(ConfigError::PrandtlTurbulent(gas.prandtl_turb));
        }
        if !positive(self.reference.area) {
            return Err(ConfigError::ReferenceArea(self.reference.area));
        }
        if !positive(self.reference.length) {
            return Err(ConfigError::ReferenceLength(self.reference.length));
        }

        let fs = &self.free_stream;
        if fs.prescribed.is_none() {
            if !(fs.pressure > 0.0 && fs.temperature > 0.0) {
                return Err(ConfigError::InvalidValue(
                    "FREESTREAM_PRESSURE",
                    "pressure and temperature must be positive",
                ));
            }
            if !(fs.mach >= 0.0 && fs.mach.is_finite()) {
                return Err(ConfigError::InvalidValue("MACH_NUMBER", "must be finite"));
            }
            if self.solver.is_viscous() && !(fs.reynolds > 0.0 && fs.reynolds_length > 0.0) {
                return Err(ConfigError::InvalidValue(
                    "REYNOLDS_NUMBER",
                    "viscous runs need a positive Reynolds number",
                ));
            }
        }

        for (n, marker) in self.markers.iter().enumerate() {
            if self.markers[..n].iter().any(|m| m.tag == marker.tag) {
                return Err(ConfigError::DuplicateMarker(marker.tag.clone()));
            }
            validate_marker(self.solver, marker)?;
        }

        for marker in geometry.markers() {
            if self.marker(marker.tag()).is_none() {
                return Err(ConfigError::MissingMarker(marker.tag().to_string()));
            }
        }

        Ok(())
    }
}

fn validate_marker(solver: SolverKind, marker: &MarkerConfig) -> Result<(), ConfigError> {
    let invalid = |parameter, reason| ConfigError::InvalidMarker {
        marker: marker.tag.clone(),
        parameter,
        reason,
    };
    let positive = |v: f64| v > 0.0 && v.is_finite();
    let nonzero_dir = |d: &[f64; 3]| d.iter().map(|x| x * x).sum::<f64>() > 0.0;

    match &marker.kind {
        BoundaryKind::Isothermal { .. } | BoundaryKind::HeatFlux { .. } if !solver.is_viscous() => {
            return Err(invalid("kind", "viscous walls require a viscous solver"))
        }
        BoundaryKind::Isothermal { temperature } if !positive(*temperature) => {
            return Err(invalid("temperature", "must be positive"))
        }
        BoundaryKind::HeatFlux { heat_flux } if !heat_flux.is_finite() => {
            return Err(invalid("heat_flux", "must be finite"))
        }
        BoundaryKind::Outlet { pressure } if !positive(*pressure) => {
            return Err(invalid("pressure", "must be positive"))
        }
        BoundaryKind::SupersonicInlet {
            temperature,
            pressure,
            ..
        } if !(positive(*temperature) && positive(*pressure)) => {
            return Err(invalid("state", "temperature and pressure must be positive"))
        }
        BoundaryKind::Inlet(InletSpec::TotalConditions {
            total_pressure,
            total_temperature,
            direction,
        }) => {
            if !(positive(*total_pressure) && positive(*total_temperature)) {
                return Err(invalid("total_conditions", "must be positive"));
            }
            if !nonzero_dir(direction) {
                return Err(invalid("direction", "must not be zero"));
            }
        }
        BoundaryKind::Inlet(InletSpec::MassFlow {
            density,
            velocity,
            direction,
        }) => {
            if !(positive(*density) && velocity.is_finite() && *velocity >= 0.0) {
                return Err(invalid("mass_flow", "density must be positive"));
            }
            if !nonzero_dir(direction) {
                return Err(invalid("direction", "must not be zero"));
            }
        }
        _ => {}
    }
    Ok(())
}

/// String table for one enumerated option.
#[derive(Debug, Clone)]
pub struct OptionTable<T> {
    option: &'static str,
    entries: Vec<(&'static str, T)>,
}

impl<T: Copy + PartialEq> OptionTable<T> {
    fn new(option: &'static str, entries: Vec<(&'static str, T)>) -> Self {
        Self { option, entries }
    }

    pub fn lookup(&self, value: &str) -> Result<T, ConfigError> {
        let value = value.trim();
        self.entries
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(value))
            .map(|(_, v)| *v)
            .ok_or_else(|| ConfigError::UnknownValue {
                option: self.option.to_string(),
                value: value.to_string(),
            })
    }

    pub fn name_of(&self, value: T) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(name, _)| *name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }
}

/// Every string-to-enum mapping used by [`Config::set`]. Build it once and
/// pass it around by reference.
#[derive(Debug, Clone)]
pub struct OptionRegistry {
    pub solver: OptionTable<SolverKind>,
    pub turbulence: OptionTable<TurbulenceModel>,
    pub convective: OptionTable<ConvectiveScheme>,
    pub spatial_order: OptionTable<SpatialOrder>,
    pub limiter: OptionTable<LimiterKind>,
    pub gradient: OptionTable<GradientMethod>,
    pub viscous: OptionTable<ViscousScheme>,
    pub time: OptionTable<TimeIntegration>,
    pub linear_solver: OptionTable<LinearSolverKind>,
    pub preconditioner: OptionTable<PreconditionerKind>,
    pub nondim: OptionTable<Nondimensionalization>,
    pub pathology: OptionTable<PathologyPolicy>,
}

impl Default for OptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OptionRegistry {
    pub fn new() -> Self {
        use ConvectiveScheme as C;
        Self {
            solver: OptionTable::new(
                "SOLVER",
                vec![
                    ("EULER", SolverKind::Euler),
                    ("NAVIER_STOKES", SolverKind::NavierStokes),
                    ("RANS", SolverKind::Rans),
                ],
            ),
            turbulence: OptionTable::new(
                "KIND_TURB_MODEL",
                vec![
                    ("NONE", TurbulenceModel::None),
                    ("SA", TurbulenceModel::SpalartAllmaras),
                    ("SST", TurbulenceModel::Sst),
                ],
            ),
            convective: OptionTable::new(
                "CONV_NUM_METHOD",
                vec![
                    ("JST", C::Jst),
                    ("LAX-FRIEDRICH", C::LaxFriedrichs),
                    ("ROE", C::Roe),
                    ("SCALAR_UPWIND", C::ScalarUpwind),
                ],
            ),
            spatial_order: OptionTable::new(
                "SPATIAL_ORDER",
                vec![
                    ("1ST_ORDER", SpatialOrder::First),
                    ("2ND_ORDER", SpatialOrder::Second),
                    ("2ND_ORDER_LIMITER", SpatialOrder::SecondLimited),
                ],
            ),
            limiter: OptionTable::new(
                "SLOPE_LIMITER",
                vec![
                    ("VENKATAKRISHNAN", LimiterKind::Venkatakrishnan),
                    ("MINMOD", LimiterKind::BarthJespersen),
                    ("BARTH_JESPERSEN", LimiterKind::BarthJespersen),
                ],
            ),
            gradient: OptionTable::new(
                "NUM_METHOD_GRAD",
                vec![
                    ("GREEN_GAUSS", GradientMethod::GreenGauss),
                    ("WEIGHTED_LEAST_SQUARES", GradientMethod::WeightedLeastSquares),
                ],
            ),
            viscous: OptionTable::new(
                "VISC_NUM_METHOD",
                vec![
                    ("AVG_GRAD", ViscousScheme::AvgGrad),
                    ("AVG_GRAD_CORRECTED", ViscousScheme::AvgGradCorrected),
                ],
            ),
            time: OptionTable::new(
                "TIME_DISCRE",
                vec![
                    ("RUNGE-KUTTA_EXPLICIT", TimeIntegration::RungeKuttaExplicit),
                    ("EULER_EXPLICIT", TimeIntegration::EulerExplicit),
                    ("EULER_IMPLICIT", TimeIntegration::EulerImplicit),
                ],
            ),
            linear_solver: OptionTable::new(
                "LINEAR_SOLVER",
                vec![
                    ("FGMRES", LinearSolverKind::Fgmres),
                    ("BCGSTAB", LinearSolverKind::Bcgstab),
                    ("SMOOTHER_JACOBI", LinearSolverKind::SmootherJacobi),
                ],
            ),
            preconditioner: OptionTable::new(
                "LINEAR_SOLVER_PREC",
                vec![
                    ("JACOBI", PreconditionerKind::Jacobi),
                    ("LU_SGS", PreconditionerKind::LuSgs),
                ],
            ),
            nondim: OptionTable::new(
                "REF_DIMENSIONALIZATION",
                vec![
                    ("DIMENSIONAL", Nondimensionalization::Dimensional),
                    (
                        "FREESTREAM_PRESS_EQ_ONE",
                        Nondimensionalization::FreestreamPressEqOne,
                    ),
                    (
                        "FREESTREAM_VEL_EQ_MACH",
                        Nondimensionalization::FreestreamVelEqMach,
                    ),
                    (
                        "FREESTREAM_VEL_EQ_ONE",
                        Nondimensionalization::FreestreamVelEqOne,
                    ),
                ],
            ),
            pathology: OptionTable::new(
                "NONPHYSICAL_POLICY",
                vec![
                    ("IGNORE", PathologyPolicy::Ignore),
                    ("CLAMP", PathologyPolicy::Clamp),
                    ("REVERT", PathologyPolicy::Revert),
                    ("ABORT", PathologyPolicy::Abort),
                ],
            ),
        }
    }
}

fn number(option: &str, value: &str) -> Result<f64, ConfigError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| ConfigError::NotANumber {
            option: option.to_string(),
            value: value.to_string(),
        })
}

fn count(option: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::NotANumber {
            option: option.to_string(),
            value: value.to_string(),
        })
}

impl Config {
    /// Sets one `KEY = VALUE` option. Marker options are not handled here;
    /// markers carry structured parameters and go through
    /// [`Config::with_marker`].
    pub fn set(
        &mut self,
        registry: &OptionRegistry,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let key = key.trim().to_ascii_uppercase();
        match key.as_str() {
            "SOLVER" => self.solver = registry.solver.lookup(value)?,
            "KIND_TURB_MODEL" => self.turbulence = registry.turbulence.lookup(value)?,
            "CONV_NUM_METHOD_FLOW" => {
                self.flow_numerics.convective = registry.convective.lookup(value)?
            }
            "CONV_NUM_METHOD_TURB" => {
                self.turb_numerics.convective = registry.convective.lookup(value)?
            }
            "SPATIAL_ORDER_FLOW" => {
                self.flow_numerics.spatial_order = registry.spatial_order.lookup(value)?
            }
            "SPATIAL_ORDER_TURB" => {
                self.turb_numerics.spatial_order = registry.spatial_order.lookup(value)?
            }
            "SLOPE_LIMITER_FLOW" => self.flow_numerics.limiter = registry.limiter.lookup(value)?,
            "NUM_METHOD_GRAD" => self.flow_numerics.gradient = registry.gradient.lookup(value)?,
            "VISC_NUM_METHOD_FLOW" => self.flow_numerics.viscous = registry.viscous.lookup(value)?,
            "VISC_NUM_METHOD_TURB" => self.turb_numerics.viscous = registry.viscous.lookup(value)?,
            "TIME_DISCRE_FLOW" => self.time.scheme = registry.time.lookup(value)?,
            "LINEAR_SOLVER" => self.linear.kind = registry.linear_solver.lookup(value)?,
            "LINEAR_SOLVER_PREC" => {
                self.linear.preconditioner = registry.preconditioner.lookup(value)?
            }
            "REF_DIMENSIONALIZATION" => {
                self.free_stream.nondimensionalization = registry.nondim.lookup(value)?
            }
            "NONPHYSICAL_POLICY" => self.pathology = registry.pathology.lookup(value)?,
            "MACH_NUMBER" => self.free_stream.mach = number(&key, value)?,
            "AOA" => self.free_stream.angle_of_attack = number(&key, value)?,
            "SIDESLIP_ANGLE" => self.free_stream.sideslip = number(&key, value)?,
            "FREESTREAM_PRESSURE" => self.free_stream.pressure = number(&key, value)?,
            "FREESTREAM_TEMPERATURE" => self.free_stream.temperature = number(&key, value)?,
            "REYNOLDS_NUMBER" => self.free_stream.reynolds = number(&key, value)?,
            "REYNOLDS_LENGTH" => self.free_stream.reynolds_length = number(&key, value)?,
            "FREESTREAM_TURBULENCEINTENSITY" => {
                self.free_stream.turbulence_intensity = number(&key, value)?
            }
            "FREESTREAM_TURB2LAMVISCRATIO" => {
                self.free_stream.viscosity_ratio = number(&key, value)?
            }
            "FREESTREAM_NU_FACTOR" => self.free_stream.nu_factor = number(&key, value)?,
            "GAMMA_VALUE" => self.gas.gamma = number(&key, value)?,
            "GAS_CONSTANT" => self.gas.gas_constant = number(&key, value)?,
            "PRANDTL_LAM" => self.gas.prandtl_lam = number(&key, value)?,
            "PRANDTL_TURB" => self.gas.prandtl_turb = number(&key, value)?,
            "REF_AREA" => self.reference.area = number(&key, value)?,
            "REF_LENGTH_MOMENT" => self.reference.length = number(&key, value)?,
            "VENKAT_LIMITER_COEFF" => self.flow_numerics.limiter_coeff = number(&key, value)?,
            "REF_ELEM_LENGTH" => self.flow_numerics.ref_elem_length = number(&key, value)?,
            "JST_SENSOR_COEFF" => {
                let mut parts = value.split(',');
                let (Some(k2), Some(k4)) = (parts.next(), parts.next()) else {
                    return Err(ConfigError::InvalidValue(
                        "JST_SENSOR_COEFF",
                        "expects two comma-separated values",
                    ));
                };
                self.flow_numerics.jst_k2 = number(&key, k2)?;
                self.flow_numerics.jst_k4 = number(&key, k4)?;
            }
            "LAX_SENSOR_COEFF" => self.flow_numerics.lax_k0 = number(&key, value)?,
            "ENTROPY_FIX_COEFF" => self.flow_numerics.entropy_fix = number(&key, value)?,
            "CFL_NUMBER" => self.time.cfl = number(&key, value)?,
            "CFL_REDUCTION_TURB" => self.turb_numerics.cfl_reduction = number(&key, value)?,
            "RELAXATION_FACTOR_TURB" => self.turb_numerics.relaxation = number(&key, value)?,
            "RK_ALPHA_COEFF" => {
                self.time.rk_alpha = value
                    .split(',')
                    .map(|v| number(&key, v))
                    .collect::<Result<_, _>>()?
            }
            "LINEAR_SOLVER_ERROR" => self.linear.tolerance = number(&key, value)?,
            "LINEAR_SOLVER_ITER" => self.linear.max_iterations = count(&key, value)?,
            "LINEAR_SOLVER_RESTART_FREQUENCY" => self.linear.restart = count(&key, value)?,
            _ => return Err(ConfigError::UnknownOption(key)),
        }
        Ok(())
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} solver ({:?} turbulence):\n\t- {:?} convection, {:?}\n\t- \
             {:?} time integration, CFL = {}\n\t- {} markers",
            self.solver,
            self.turbulence,
            self.flow_numerics.convective,
            self.flow_numerics.spatial_order,
            self.time.scheme,
            self.time.cfl,
            self.markers.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Grid, RectangularMesh};

    fn geometry() -> Geometry {
        RectangularMesh::new(Grid::from_steps(0.0, 1.0, 2), Grid::from_steps(0.0, 1.0, 2))
            .build()
            .unwrap()
    }

    #[test]
    fn registry_parses_known_values() {
        let registry = OptionRegistry::new();
        let mut config = Config::euler();
        config.set(&registry, "CONV_NUM_METHOD_FLOW", "jst").unwrap();
        config.set(&registry, "SLOPE_LIMITER_FLOW", "MINMOD").unwrap();
        config.set(&registry, "RK_ALPHA_COEFF", "0.5, 1.0").unwrap();
        config.set(&registry, "JST_SENSOR_COEFF", "0.4, 0.01").unwrap();
        assert_eq!(config.flow_numerics.convective, ConvectiveScheme::Jst);
        assert_eq!(config.flow_numerics.limiter, LimiterKind::BarthJespersen);
        assert_eq!(config.time.rk_alpha, vec![0.5, 1.0]);
        assert_eq!(config.flow_numerics.jst_k4, 0.01);
        assert_eq!(
            registry.convective.name_of(ConvectiveScheme::LaxFriedrichs),
            Some("LAX-FRIEDRICH")
        );
    }

    #[test]
    fn registry_rejects_unknown_values() {
        let registry = OptionRegistry::new();
        let mut config = Config::euler();
        assert!(matches!(
            config.set(&registry, "TIME_DISCRE_FLOW", "LEAPFROG"),
            Err(ConfigError::UnknownValue { .. })
        ));
        assert!(matches!(
            config.set(&registry, "CFL_NUMBER", "fast"),
            Err(ConfigError::NotANumber { .. })
        ));
        assert!(matches!(
            config.set(&registry, "NOT_AN_OPTION", "1"),
            Err(ConfigError::UnknownOption(_))
        ));
    }

    #[test]
    fn missing_marker_is_fatal() {
        let geometry = geometry();
        let config = Config::euler()
            .with_marker("lower", BoundaryKind::EulerWall)
            .with_marker("upper", BoundaryKind::FarField)
            .with_marker("left", BoundaryKind::FarField);
        assert_eq!(
            config.validate(&geometry),
            Err(ConfigError::MissingMarker("right".into()))
        );

        let config = config.with_marker("right", BoundaryKind::FarField);
        assert_eq!(config.validate(&geometry), Ok(()));
    }

    #[test]
    fn viscous_wall_needs_viscous_solver() {
        let geometry = geometry();
        let config = Config::euler()
            .with_marker("lower", BoundaryKind::Isothermal { temperature: 300.0 })
            .with_marker("upper", BoundaryKind::FarField)
            .with_marker("left", BoundaryKind::FarField)
            .with_marker("right", BoundaryKind::FarField);
        assert!(matches!(
            config.validate(&geometry),
            Err(ConfigError::InvalidMarker { .. })
        ));
    }

    fn closed(config: Config) -> Config {
        config
            .with_marker("lower", BoundaryKind::EulerWall)
            .with_marker("upper", BoundaryKind::FarField)
            .with_marker("left", BoundaryKind::FarField)
            .with_marker("right", BoundaryKind::FarField)
    }

    #[test]
    fn gas_properties_must_be_physical() {
        let geometry = geometry();
        let base = closed(Config::navier_stokes());
        assert_eq!(base.validate(&geometry), Ok(()));

        let gas = |edit: fn(&mut GasModel)| {
            let mut gas = GasModel::default();
            edit(&mut gas);
            base.clone().with_gas(gas).validate(&geometry)
        };
        assert_eq!(gas(|g| g.gamma = 1.0), Err(ConfigError::Gamma(1.0)));
        assert_eq!(gas(|g| g.gas_constant = 0.0), Err(ConfigError::GasConstant(0.0)));
        assert_eq!(gas(|g| g.prandtl_lam = -0.72), Err(ConfigError::PrandtlLaminar(-0.72)));
        assert_eq!(gas(|g| g.prandtl_turb = 0.0), Err(ConfigError::PrandtlTurbulent(0.0)));
        assert!(matches!(gas(|g| g.gamma = f64::NAN), Err(ConfigError::Gamma(_))));
    }

    #[test]
    fn reference_values_must_be_positive() {
        let geometry = geometry();
        let config = closed(Config::euler());
        assert_eq!(
            config.clone().with_reference(0.0, 1.0, [0.0; 3]).validate(&geometry),
            Err(ConfigError::ReferenceArea(0.0))
        );
        assert_eq!(
            config.clone().with_reference(1.0, -2.0, [0.0; 3]).validate(&geometry),
            Err(ConfigError::ReferenceLength(-2.0))
        );
        assert_eq!(config.with_reference(2.0, 0.5, [0.25, 0.0, 0.0]).validate(&geometry), Ok(()));
    }

    #[test]
    fn rans_needs_a_model() {
        let config = Config::rans(TurbulenceModel::None);
        assert!(matches!(
            config.validate(&geometry()),
            Err(ConfigError::Inconsistent(_))
        ));
    }

    #[test]
    fn sutherland_matches_reference_point() {
        let mu = ViscosityModel::AIR_SUTHERLAND.eval(273.15);
        approx::assert_relative_eq!(mu, 1.716e-5, max_relative = 1e-12);
    }
}

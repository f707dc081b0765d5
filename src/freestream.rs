//! Free-stream state, reference scales and the non-dimensional gas model.

use crate::config::{Config, Nondimensionalization, TurbulenceModel, ViscosityModel};

/// Dimensional reference values; every state inside the solver is divided by
/// these.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReferenceScales {
    pub pressure: f64,
    pub density: f64,
    pub temperature: f64,
    pub velocity: f64,
    pub viscosity: f64,
    pub length: f64,
}

impl ReferenceScales {
    pub fn unit() -> Self {
        Self {
            pressure: 1.0,
            density: 1.0,
            temperature: 1.0,
            velocity: 1.0,
            viscosity: 1.0,
            length: 1.0,
        }
    }

    pub fn gas_constant(&self) -> f64 {
        self.velocity * self.velocity / self.temperature
    }

    pub fn heat_flux(&self) -> f64 {
        self.pressure * self.velocity
    }
}

/// Calorically perfect gas in non-dimensional units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FluidModel {
    pub gamma: f64,
    pub gas_constant: f64,
    pub prandtl_lam: f64,
    pub prandtl_turb: f64,
    viscosity: ViscosityModel,
    temperature_ref: f64,
    viscosity_ref: f64,
}

impl FluidModel {
    pub fn gamma_minus_one(&self) -> f64 {
        self.gamma - 1.0
    }

    pub fn cp(&self) -> f64 {
        self.gamma * self.gas_constant / (self.gamma - 1.0)
    }

    /// Laminar viscosity at non-dimensional temperature `t`.
    pub fn laminar_viscosity(&self, t: f64) -> f64 {
        self.viscosity.eval(t * self.temperature_ref) / self.viscosity_ref
    }

    pub fn thermal_conductivity(&self, mu_lam: f64, mu_turb: f64) -> f64 {
        self.cp() * (mu_lam / self.prandtl_lam + mu_turb / self.prandtl_turb)
    }

    pub fn temperature(&self, density: f64, pressure: f64) -> f64 {
        pressure / (density * self.gas_constant)
    }

    /// Fills the primitive record `[T, v, p, rho, h, c, mu_lam, mu_turb]`
    /// from `[rho, rho v, rho E]`. Returns `false` when density, pressure or
    /// temperature is not positive, in which case `out` is left unchanged.
    pub fn primitive_from_conservative(
        &self,
        u: &[f64],
        mu_turb: f64,
        viscous: bool,
        out: &mut [f64],
    ) -> bool {
        let n_dim = u.len() - 2;
        let rho = u[0];
        let q2: f64 = u[1..=n_dim].iter().map(|m| (m / rho).powi(2)).sum();
        let e = u[n_dim + 1] / rho;
        let p = self.gamma_minus_one() * rho * (e - 0.5 * q2);
        let t = p / (rho * self.gas_constant);
        if !(rho > 0.0 && p > 0.0 && t > 0.0) {
            return false;
        }
        out[0] = t;
        for d in 0..n_dim {
            out[1 + d] = u[1 + d] / rho;
        }
        out[n_dim + 1] = p;
        out[n_dim + 2] = rho;
        out[n_dim + 3] = e + p / rho;
        out[n_dim + 4] = (self.gamma * p / rho).sqrt();
        out[n_dim + 5] = if viscous { self.laminar_viscosity(t) } else { 0.0 };
        out[n_dim + 6] = mu_turb;
        true
    }

    /// Same record built from `rho, v, p`; used for boundary states.
    pub fn primitive_from_state(
        &self,
        rho: f64,
        velocity: &[f64],
        p: f64,
        mu_turb: f64,
        viscous: bool,
    ) -> Vec<f64> {
        let n_dim = velocity.len();
        let t = p / (rho * self.gas_constant);
        let q2: f64 = velocity.iter().map(|v| v * v).sum();
        let mut out = vec![0.0; n_dim + 7];
        out[0] = t;
        out[1..=n_dim].copy_from_slice(velocity);
        out[n_dim + 1] = p;
        out[n_dim + 2] = rho;
        out[n_dim + 3] = self.gamma / self.gamma_minus_one() * p / rho + 0.5 * q2;
        out[n_dim + 4] = (self.gamma * p / rho).sqrt();
        out[n_dim + 5] = if viscous { self.laminar_viscosity(t) } else { 0.0 };
        out[n_dim + 6] = mu_turb;
        out
    }

    pub fn conservative(&self, rho: f64, velocity: &[f64], p: f64) -> Vec<f64> {
        let q2: f64 = velocity.iter().map(|v| v * v).sum();
        let mut u = Vec::with_capacity(velocity.len() + 2);
        u.push(rho);
        u.extend(velocity.iter().map(|v| rho * v));
        u.push(p / self.gamma_minus_one() + 0.5 * rho * q2);
        u
    }
}

/// Free-stream turbulence values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TurbulenceFreeStream {
    pub nu_tilde: f64,
    pub kine: f64,
    pub omega: f64,
    pub mu_turb: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FreeStream {
    pub density: f64,
    pub velocity: Vec<f64>,
    pub pressure: f64,
    pub temperature: f64,
    pub viscosity: f64,
    pub mach: f64,
    pub scales: ReferenceScales,
    pub fluid: FluidModel,
    pub turbulence: TurbulenceFreeStream,
}

/// Unit flow direction from angle of attack and sideslip, in radians.
pub fn flow_direction(n_dim: usize, alpha: f64, beta: f64) -> Vec<f64> {
    if n_dim == 2 {
        vec![alpha.cos(), alpha.sin()]
    } else {
        vec![alpha.cos() * beta.cos(), beta.sin(), alpha.sin() * beta.cos()]
    }
}

impl FreeStream {
    pub fn from_config(config: &Config, n_dim: usize) -> Self {
        let gas = &config.gas;
        let fs = &config.free_stream;
        let viscous = config.solver.is_viscous();

        let (density, velocity, pressure, temperature, viscosity, scales, fluid) =
            if let Some(state) = &fs.prescribed {
                // Taken as non-dimensional with T = 1.
                let fluid = FluidModel {
                    gamma: gas.gamma,
                    gas_constant: state.pressure / state.density,
                    prandtl_lam: gas.prandtl_lam,
                    prandtl_turb: gas.prandtl_turb,
                    viscosity: ViscosityModel::Constant(state.viscosity),
                    temperature_ref: 1.0,
                    viscosity_ref: 1.0,
                };
                let mut velocity = state.velocity.clone();
                velocity.resize(n_dim, 0.0);
                (
                    state.density,
                    velocity,
                    state.pressure,
                    1.0,
                    state.viscosity,
                    ReferenceScales::unit(),
                    fluid,
                )
            } else {
                let alpha = fs.angle_of_attack.to_radians();
                let beta = fs.sideslip.to_radians();
                let t = fs.temperature;
                let sound = (gas.gamma * gas.gas_constant * t).sqrt();
                let speed = fs.mach * sound;
                let mu = gas.viscosity.eval(t);
                let (rho, p) = if viscous {
                    let rho = fs.reynolds * mu / (speed * fs.reynolds_length);
                    (rho, rho * gas.gas_constant * t)
                } else {
                    (fs.pressure / (gas.gas_constant * t), fs.pressure)
                };

                let scales = match fs.nondimensionalization {
                    Nondimensionalization::Dimensional => ReferenceScales::unit(),
                    mode => {
                        let pressure = match mode {
                            Nondimensionalization::FreestreamPressEqOne => p,
                            Nondimensionalization::FreestreamVelEqMach => gas.gamma * p,
                            _ => fs.mach * fs.mach * gas.gamma * p,
                        };
                        let velocity = (pressure / rho).sqrt();
                        ReferenceScales {
                            pressure,
                            density: rho,
                            temperature: t,
                            velocity,
                            viscosity: rho * velocity,
                            length: 1.0,
                        }
                    }
                };
                let fluid = FluidModel {
                    gamma: gas.gamma,
                    gas_constant: gas.gas_constant / scales.gas_constant(),
                    prandtl_lam: gas.prandtl_lam,
                    prandtl_turb: gas.prandtl_turb,
                    viscosity: gas.viscosity,
                    temperature_ref: scales.temperature,
                    viscosity_ref: scales.viscosity,
                };
                let velocity = flow_direction(n_dim, alpha, beta)
                    .into_iter()
                    .map(|d| d * speed / scales.velocity)
                    .collect();
                (
                    rho / scales.density,
                    velocity,
                    p / scales.pressure,
                    t / scales.temperature,
                    mu / scales.viscosity,
                    scales,
                    fluid,
                )
            };

        let speed = velocity.iter().map(|v: &f64| v * v).sum::<f64>().sqrt();
        let mach = speed / (fluid.gamma * pressure / density).sqrt();

        let nu_tilde = fs.nu_factor * viscosity / density;
        let kine = 1.5 * (speed * fs.turbulence_intensity).powi(2);
        let omega = if viscosity > 0.0 {
            density * kine / (viscosity * fs.viscosity_ratio)
        } else {
            0.0
        };
        let mu_turb = match config.turbulence {
            TurbulenceModel::SpalartAllmaras if viscosity > 0.0 => {
                let chi3 = (density * nu_tilde / viscosity).powi(3);
                density * nu_tilde * chi3 / (chi3 + 7.1f64.powi(3))
            }
            TurbulenceModel::None | TurbulenceModel::SpalartAllmaras => 0.0,
            TurbulenceModel::Sst => {
                if omega > 0.0 {
                    density * kine / omega
                } else {
                    0.0
                }
            }
        };

        let free_stream = Self {
            density,
            velocity,
            pressure,
            temperature,
            viscosity,
            mach,
            scales,
            fluid,
            turbulence: TurbulenceFreeStream {
                nu_tilde,
                kine,
                omega,
                mu_turb,
            },
        };
        tracing::info!(
            mach = free_stream.mach,
            density = free_stream.density,
            pressure = free_stream.pressure,
            viscosity = free_stream.viscosity,
            "free stream"
        );
        free_stream
    }

    pub fn n_dim(&self) -> usize {
        self.velocity.len()
    }

    pub fn speed(&self) -> f64 {
        self.velocity.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    pub fn sound_speed(&self) -> f64 {
        (self.fluid.gamma * self.pressure / self.density).sqrt()
    }

    pub fn conservative(&self) -> Vec<f64> {
        self.fluid.conservative(self.density, &self.velocity, self.pressure)
    }

    pub fn dynamic_pressure(&self) -> f64 {
        let speed = self.speed();
        // at rest the coefficients are scaled with the speed of sound
        let reference = if speed > 0.0 { speed } else { self.sound_speed() };
        0.5 * self.density * reference * reference
    }

    pub fn nondim_pressure(&self, p: f64) -> f64 {
        p / self.scales.pressure
    }

    pub fn nondim_temperature(&self, t: f64) -> f64 {
        t / self.scales.temperature
    }

    pub fn nondim_density(&self, rho: f64) -> f64 {
        rho / self.scales.density
    }

    pub fn nondim_velocity(&self, v: f64) -> f64 {
        v / self.scales.velocity
    }

    pub fn nondim_heat_flux(&self, q: f64) -> f64 {
        q / self.scales.heat_flux()
    }
}

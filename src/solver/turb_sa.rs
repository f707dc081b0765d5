use crate::{
    freestream::FreeStream,
    numerics::{source::sa_fv1, AvgGradSa, SaSource, SourceNumerics, ViscousNumerics},
    solver::turbulence::TurbulenceClosure,
    variable::FlowIndex,
};

const NU_TILDE_MIN: f64 = 1e-10;
const NU_TILDE_MAX: f64 = 1.0;

/// Spalart-Allmaras one-equation model. The transported variable is the
/// working viscosity `nu_tilde` itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct SaClosure;

impl SaClosure {
    pub fn new() -> Self {
        Self
    }
}

impl TurbulenceClosure for SaClosure {
    fn name(&self) -> &'static str {
        "Spalart-Allmaras"
    }

    fn n_var(&self) -> usize {
        1
    }

    fn field_names(&self) -> Vec<String> {
        vec!["Nu_Tilde".to_string()]
    }

    fn free_stream_solution(&self, free_stream: &FreeStream) -> Vec<f64> {
        vec![free_stream.turbulence.nu_tilde]
    }

    fn values(&self, solution: &[f64], _rho: f64, out: &mut [f64]) {
        out[0] = solution[0];
    }

    fn solution(&self, values: &[f64], _rho: f64, out: &mut [f64]) {
        out[0] = values[0];
    }

    /// `mu_t = rho nu_tilde fv1(nu_tilde / nu)`.
    fn eddy_viscosity(
        &self,
        _i: usize,
        flow_prim: &[f64],
        _flow_grad: &[f64],
        values: &[f64],
        f: FlowIndex,
    ) -> f64 {
        let rho = flow_prim[f.density()];
        let mu_lam = flow_prim[f.mu_lam()];
        let nu_tilde = values[0];
        if mu_lam <= 0.0 {
            return 0.0;
        }
        rho * nu_tilde * sa_fv1(rho * nu_tilde / mu_lam)
    }

    fn wall_solution(&self, _flow_prim: &[f64], _distance: f64, _f: FlowIndex) -> Vec<f64> {
        vec![0.0]
    }

    fn clip(&self, values: &mut [f64]) {
        values[0] = values[0].clamp(NU_TILDE_MIN, NU_TILDE_MAX);
    }

    fn viscous_numerics(&self, n_dim: usize, corrected: bool) -> Box<dyn ViscousNumerics> {
        Box::new(AvgGradSa::new(n_dim, corrected))
    }

    fn source_numerics(&self) -> Box<dyn SourceNumerics> {
        Box::new(SaSource::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn eddy_viscosity_tends_to_nu_tilde_far_from_walls() {
        let f = FlowIndex::new(2);
        let mut prim = vec![0.0; f.n_prim()];
        prim[f.density()] = 2.0;
        prim[f.mu_lam()] = 1e-5;
        let mu_t = SaClosure.eddy_viscosity(0, &prim, &[], &[1.0], f);
        assert_relative_eq!(mu_t, 2.0, max_relative = 1e-9);
        assert_eq!(SaClosure.eddy_viscosity(0, &prim, &[], &[0.0], f), 0.0);
    }

    #[test]
    fn clipping_bounds() {
        let mut v = [-3.0];
        SaClosure.clip(&mut v);
        assert_eq!(v[0], NU_TILDE_MIN);
        let mut v = [5.0];
        SaClosure.clip(&mut v);
        assert_eq!(v[0], NU_TILDE_MAX);
    }
}

//! Converts an expected EIR for a host into a number of new infections this step (component C7).

use ixa::{Context, IxaError};

use crate::rng::ContextMalariaRandomExt;

crate::define_malaria_rng!(IncidenceRng);

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum InfectionIncidenceModel {
    Default,
    NegativeBinomial { shape: f64 },
    LogNormal { sd: f64 },
}

#[derive(Debug, Clone, Copy)]
pub struct IncidenceParams {
    pub model: InfectionIncidenceModel,
    /// `S_inf` in the default model's `S2(E)` saturation curve.
    pub s_inf: f64,
    /// `E*`, the half-saturation EIR in the default model.
    pub e_star: f64,
}

/// `S2(E) = S_inf + (1 - S_inf) / (1 + E / E*)`, the availability-adjustment saturation factor
/// used by the default incidence model.
#[must_use]
pub fn availability_saturation(effective_eir: f64, params: &IncidenceParams) -> f64 {
    params.s_inf + (1.0 - params.s_inf) / (1.0 + effective_eir / params.e_star)
}

/// Computes the expected number of new infections for this host, dispatching on the configured
/// model variant.
///
/// # Errors
/// Returns `IxaError` if `effective_eir` is non-finite.
pub fn expected_new_infections(
    context: &mut Context,
    effective_eir: f64,
    susceptibility: f64,
    params: &IncidenceParams,
) -> Result<f64, IxaError> {
    if !effective_eir.is_finite() {
        return Err(IxaError::IxaError(format!(
            "effectiveEIR is not finite: {effective_eir}"
        )));
    }
    match params.model {
        InfectionIncidenceModel::Default => {
            Ok(availability_saturation(effective_eir, params) * susceptibility * effective_eir)
        }
        InfectionIncidenceModel::NegativeBinomial { shape } => {
            let mean = effective_eir * susceptibility;
            if shape <= 0.0 || mean <= 0.0 {
                return Ok(0.0);
            }
            context.sample_gamma(IncidenceRng, shape, mean / shape)
        }
        InfectionIncidenceModel::LogNormal { sd } => {
            let mean_log = (effective_eir * susceptibility).max(1e-12).ln() - 0.5 * sd * sd;
            context.sample_lognormal(IncidenceRng, mean_log, sd)
        }
    }
}

/// Draws the realised new-infection count for this step given the expected value.
///
/// # Errors
/// Propagates errors from the underlying Poisson draw.
pub fn draw_new_infection_count(
    context: &mut Context,
    expected_infections: f64,
) -> Result<u64, IxaError> {
    context.sample_poisson(IncidenceRng, expected_infections)
}

#[cfg(test)]
mod test {
    use super::{
        availability_saturation, expected_new_infections, IncidenceParams, InfectionIncidenceModel,
    };
    use crate::rng::ContextMalariaRandomExt;
    use ixa::Context;

    fn default_params() -> IncidenceParams {
        IncidenceParams {
            model: InfectionIncidenceModel::Default,
            s_inf: 0.049,
            e_star: 15.0,
        }
    }

    #[test]
    fn test_saturation_decreases_with_eir() {
        let params = default_params();
        let low = availability_saturation(1.0, &params);
        let high = availability_saturation(1000.0, &params);
        assert!(high < low);
        assert!(high >= params.s_inf);
    }

    #[test]
    fn test_nonfinite_eir_errors() {
        let mut context = Context::new();
        context.init_random(1);
        let params = default_params();
        let result = expected_new_infections(&mut context, f64::INFINITY, 0.5, &params);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_eir_yields_zero_expected_infections() {
        let mut context = Context::new();
        context.init_random(1);
        let params = default_params();
        let expected = expected_new_infections(&mut context, 0.0, 0.5, &params).unwrap();
        assert_eq!(expected, 0.0);
    }
}

//! Scenario configuration: the JSON document described in spec.md §6, loaded once at startup
//! into a single `Parameters` global property.

use std::path::PathBuf;

use ixa::{define_global_property, Context, ContextGlobalPropertiesExt, IxaError};
use serde::{Deserialize, Serialize};

use crate::interventions::cohort::RemovalRule;
use crate::population::DemographyParams;
use crate::survey::SurveyConfig;
use crate::vector_transmission::VectorSpeciesParams;

/// Either a named model id or the explicit 38 numbered parameters backing the empirical
/// infection density model (§4.3); the named form is resolved to the same table at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InfectionModelSelector {
    Named(String),
    Explicit(Vec<f64>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParameters {
    pub infection_model: InfectionModelSelector,
    pub pre_erythrocytic_latency_days: f64,
    pub step_duration_days: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSpeciesConfig {
    pub species_id: u32,
    pub params: VectorSpeciesParams,
    /// Target seasonal EIR this species' emergence rate is fit to reproduce, one entry per day
    /// of year (length `DAYS_PER_YEAR`).
    pub target_daily_eir: Vec<f64>,
    pub availability_mean: f64,
    pub availability_variance: f64,
    pub biting_probability_alpha: f64,
    pub biting_probability_beta: f64,
    pub resting_probability_alpha: f64,
    pub resting_probability_beta: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EntomologyConfig {
    NonVectorDaily { daily_eir: Vec<f64> },
    NonVectorFourier { mean_eir: f64, fourier_coefficients: Vec<f64> },
    Vector { species: Vec<VectorSpeciesConfig> },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VaccineInterventionConfig {
    pub component_id: u32,
    pub deployment_step: f64,
    pub efficacy_mean: f64,
    pub efficacy_variance: f64,
    pub decay_lambda_years: f64,
    pub decay_k: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NetInterventionConfig {
    pub component_id: u32,
    pub deployment_step: f64,
    pub biting_efficacy: f64,
    pub availability_efficacy: f64,
    pub decay_lambda_years: f64,
    pub decay_k: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IrsInterventionConfig {
    pub component_id: u32,
    pub deployment_step: f64,
    pub resting_efficacy: f64,
    pub decay_rate_per_day: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GviInterventionConfig {
    pub component_id: u32,
    pub deployment_step: f64,
    pub efficacy: f64,
    pub decay_lambda_years: f64,
    pub decay_k: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MdaInterventionConfig {
    pub deployment_step: f64,
    pub coverage: f64,
    pub efficacy: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LarvicidingInterventionConfig {
    pub start_step: f64,
    pub end_step: f64,
    pub effect_coverage: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ImportedInfectionsConfig {
    pub rate_per_step: f64,
    pub genotype_pool_size: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CohortInterventionConfig {
    pub enrollment_step: f64,
    pub removal_rule: RemovalRule,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CaseManagementInterventionConfig {
    pub uncomplicated_access_probability: f64,
    pub severe_access_probability: f64,
    pub drug_efficacy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum InterventionConfig {
    Pev(VaccineInterventionConfig),
    Bsv(VaccineInterventionConfig),
    Tbv(VaccineInterventionConfig),
    Itn(NetInterventionConfig),
    Irs(IrsInterventionConfig),
    Gvi(GviInterventionConfig),
    Mda(MdaInterventionConfig),
    Larviciding(LarvicidingInterventionConfig),
    ImportedInfections(ImportedInfectionsConfig),
    Cohort(CohortInterventionConfig),
    CaseManagement(CaseManagementInterventionConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParametersValues {
    pub seed: u64,
    pub model: ModelParameters,
    pub demography: DemographyParams,
    pub entomology: EntomologyConfig,
    pub interventions: Vec<InterventionConfig>,
    pub monitoring: SurveyConfig,
    pub max_time: f64,
    pub output_path: PathBuf,
}

define_global_property!(Parameters, ParametersValues);

/// Checks scenario-level invariants that must hold before the simulation starts.
///
/// # Errors
/// Returns a `scenario:`-prefixed `IxaError` describing the first violated invariant.
pub fn validate(parameters: &ParametersValues) -> Result<(), IxaError> {
    if parameters.model.step_duration_days <= 0.0 {
        return Err(IxaError::IxaError(
            "scenario: step_duration_days must be positive".to_string(),
        ));
    }
    if parameters.demography.growth_rate_rho != 0.0 {
        return Err(IxaError::IxaError(
            "scenario: a non-zero population growth rate is not supported".to_string(),
        ));
    }
    if parameters.demography.max_age_years <= 0.0 {
        return Err(IxaError::IxaError(
            "scenario: max_age_years must be positive".to_string(),
        ));
    }
    if parameters.max_time <= 0.0 {
        return Err(IxaError::IxaError("scenario: max_time must be positive".to_string()));
    }
    match &parameters.entomology {
        EntomologyConfig::NonVectorDaily { daily_eir } if daily_eir.is_empty() => {
            Err(IxaError::IxaError("scenario: daily_eir must not be empty".to_string()))
        }
        EntomologyConfig::Vector { species } if species.is_empty() => {
            Err(IxaError::IxaError("scenario: vector entomology requires at least one species".to_string()))
        }
        _ => Ok(()),
    }
}

pub trait ContextParametersExt {
    fn get_params(&self) -> ParametersValues;
}

impl ContextParametersExt for Context {
    fn get_params(&self) -> ParametersValues {
        self.get_global_property_value(Parameters)
            .expect("Parameters must be loaded before use")
            .clone()
    }
}

/// Loads and validates the scenario document at `file_path`, then installs it as the global
/// `Parameters` property.
///
/// # Errors
/// Propagates JSON-parsing errors from `ixa`'s loader and `scenario:`-prefixed validation errors.
pub fn init_parameters(context: &mut Context, file_path: &std::path::Path) -> Result<(), IxaError> {
    let parameters = context.load_parameters_from_json::<ParametersValues>(file_path)?;
    validate(&parameters)?;
    context.set_global_property_value(Parameters, parameters)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::{validate, DemographyParams, EntomologyConfig, InfectionModelSelector, ModelParameters, ParametersValues};
    use crate::survey::SurveyConfig;
    use std::path::PathBuf;

    fn sample_parameters() -> ParametersValues {
        ParametersValues {
            seed: 1,
            model: ModelParameters {
                infection_model: InfectionModelSelector::Named("default".to_string()),
                pre_erythrocytic_latency_days: 12.0,
                step_duration_days: 5.0,
            },
            demography: DemographyParams {
                population_size: 100,
                max_age_years: 90.0,
                growth_rate_rho: 0.0,
                hazard_m1_coefficient: 0.01,
                hazard_m2_coefficient: 0.0001,
            },
            entomology: EntomologyConfig::NonVectorDaily { daily_eir: vec![1.0; 365] },
            interventions: vec![],
            monitoring: SurveyConfig { survey_times: vec![], age_bands: vec![], enabled_measures: vec![] },
            max_time: 1000.0,
            output_path: PathBuf::from("output.tsv"),
        }
    }

    #[test]
    fn test_valid_parameters_pass() {
        assert!(validate(&sample_parameters()).is_ok());
    }

    #[test]
    fn test_nonzero_growth_rate_rejected() {
        let mut parameters = sample_parameters();
        parameters.demography.growth_rate_rho = 0.01;
        assert!(validate(&parameters).is_err());
    }

    #[test]
    fn test_empty_daily_eir_rejected() {
        let mut parameters = sample_parameters();
        parameters.entomology = EntomologyConfig::NonVectorDaily { daily_eir: vec![] };
        assert!(validate(&parameters).is_err());
    }
}

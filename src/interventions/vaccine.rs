//! Pre-erythrocytic (PEV), blood-stage (BSV), and transmission-blocking (TBV) vaccines: a
//! Beta-distributed per-dose efficacy that decays over time (§4.13).

use ixa::{define_person_property_with_default, Context, ContextPeopleExt, IxaError, PersonId};

use crate::host_transmission::DecayKind;
use crate::rng::ContextMalariaRandomExt;

crate::define_malaria_rng!(VaccineRng);

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum VaccineType {
    Pev,
    Bsv,
    Tbv,
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
struct VaccineDose {
    vaccine_type: VaccineType,
    deployed_step: f64,
    decay: DecayKind,
    initial_efficacy: f64,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct VaccineState {
    doses: Vec<VaccineDose>,
}

define_person_property_with_default!(Vaccines, VaccineState, VaccineState { doses: Vec::new() });

#[derive(Debug, Clone, Copy)]
pub struct VaccineEfficacyDistribution {
    pub mean: f64,
    pub variance: f64,
}

fn beta_shape_params(dist: VaccineEfficacyDistribution) -> (f64, f64) {
    let mean = dist.mean.clamp(1e-6, 1.0 - 1e-6);
    let variance = dist.variance.max(1e-9);
    let common = mean * (1.0 - mean) / variance - 1.0;
    (mean * common, (1.0 - mean) * common)
}

pub trait ContextVaccineExt {
    /// Deploys one dose of `vaccine_type` to `person_id`, sampling the initial efficacy from a
    /// Beta distribution with the given mean/variance and replacing any prior dose of the same
    /// type.
    ///
    /// # Errors
    /// Returns `IxaError` if the efficacy distribution's shape parameters are degenerate.
    fn deploy_vaccine_dose(
        &mut self,
        person_id: PersonId,
        vaccine_type: VaccineType,
        efficacy: VaccineEfficacyDistribution,
        decay: DecayKind,
    ) -> Result<(), IxaError>;

    /// Current efficacy (fraction in `[0, 1]`) of the most recent dose of `vaccine_type`, or `0.0`
    /// if none has been deployed.
    fn vaccine_efficacy(&self, person_id: PersonId, vaccine_type: VaccineType) -> f64;
}

impl ContextVaccineExt for Context {
    fn deploy_vaccine_dose(
        &mut self,
        person_id: PersonId,
        vaccine_type: VaccineType,
        efficacy: VaccineEfficacyDistribution,
        decay: DecayKind,
    ) -> Result<(), IxaError> {
        let (alpha, beta) = beta_shape_params(efficacy);
        let initial_efficacy = self.sample_beta(VaccineRng, alpha, beta)?;
        let deployed_step = self.get_current_time();

        let mut state = self.get_person_property(person_id, Vaccines);
        state.doses.retain(|d| d.vaccine_type != vaccine_type);
        state.doses.push(VaccineDose {
            vaccine_type,
            deployed_step,
            decay,
            initial_efficacy,
        });
        self.set_person_property(person_id, Vaccines, state);
        Ok(())
    }

    fn vaccine_efficacy(&self, person_id: PersonId, vaccine_type: VaccineType) -> f64 {
        let state = self.get_person_property(person_id, Vaccines);
        let current_step = self.get_current_time();
        state
            .doses
            .iter()
            .find(|d| d.vaccine_type == vaccine_type)
            .map(|d| d.initial_efficacy * d.decay.decay_factor(current_step - d.deployed_step))
            .unwrap_or(0.0)
            .clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod test {
    use super::{ContextVaccineExt, VaccineEfficacyDistribution, VaccineType};
    use crate::host_transmission::DecayKind;
    use crate::rng::ContextMalariaRandomExt;
    use ixa::{Context, ContextPeopleExt};

    #[test]
    fn test_deployed_dose_has_efficacy_in_unit_interval() {
        let mut context = Context::new();
        context.init_random(7);
        let person = context.add_person(()).unwrap();
        context
            .deploy_vaccine_dose(
                person,
                VaccineType::Pev,
                VaccineEfficacyDistribution { mean: 0.7, variance: 0.02 },
                DecayKind::Exponential { rate: 0.01 },
            )
            .unwrap();
        let efficacy = context.vaccine_efficacy(person, VaccineType::Pev);
        assert!((0.0..=1.0).contains(&efficacy));
    }

    #[test]
    fn test_no_dose_has_zero_efficacy() {
        let mut context = Context::new();
        let person = context.add_person(()).unwrap();
        assert_eq!(context.vaccine_efficacy(person, VaccineType::Tbv), 0.0);
    }

    #[test]
    fn test_second_dose_replaces_first() {
        let mut context = Context::new();
        context.init_random(7);
        let person = context.add_person(()).unwrap();
        context
            .deploy_vaccine_dose(
                person,
                VaccineType::Bsv,
                VaccineEfficacyDistribution { mean: 0.5, variance: 0.02 },
                DecayKind::Exponential { rate: 0.01 },
            )
            .unwrap();
        context
            .deploy_vaccine_dose(
                person,
                VaccineType::Bsv,
                VaccineEfficacyDistribution { mean: 0.9, variance: 0.001 },
                DecayKind::Exponential { rate: 0.01 },
            )
            .unwrap();
        let state = context.get_person_property(person, super::Vaccines);
        assert_eq!(state.doses.len(), 1);
    }
}

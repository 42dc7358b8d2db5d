//! Insecticide-treated nets: Weibull-decaying reductions to biting and availability, applied per
//! vector species a person is exposed to (§4.13).

use ixa::{Context, IxaError, PersonId};

use crate::host_transmission::{
    ActiveInterventionEffect, ContextHostTransmissionExt, DecayKind, EffectTarget,
    InterventionComponentType,
};

#[derive(Debug, Clone, Copy)]
pub struct NetParams {
    pub component_id: u32,
    pub biting_efficacy: f64,
    pub availability_efficacy: f64,
    /// Weibull scale in years and shape, as fit to net retention/attrition data.
    pub decay_lambda_years: f64,
    pub decay_k: f64,
}

pub trait ContextNetExt {
    /// # Errors
    /// Returns `IxaError` if either efficacy is outside `[0, 1]`.
    fn deploy_net(&mut self, person_id: PersonId, params: NetParams) -> Result<(), IxaError>;
}

impl ContextNetExt for Context {
    fn deploy_net(&mut self, person_id: PersonId, params: NetParams) -> Result<(), IxaError> {
        if !(0.0..=1.0).contains(&params.biting_efficacy)
            || !(0.0..=1.0).contains(&params.availability_efficacy)
        {
            return Err(IxaError::IxaError(
                "net efficacy values must be in [0, 1]".to_string(),
            ));
        }
        let deployed_step = self.get_current_time();
        let decay = DecayKind::Weibull { lambda: params.decay_lambda_years, k: params.decay_k };
        self.register_intervention_effect(
            person_id,
            ActiveInterventionEffect {
                component_type: InterventionComponentType::Itn,
                component_id: params.component_id,
                deployed_step,
                decay,
                initial_effect: params.biting_efficacy,
                target: EffectTarget::Biting,
            },
        );
        self.register_intervention_effect(
            person_id,
            ActiveInterventionEffect {
                component_type: InterventionComponentType::Itn,
                component_id: params.component_id,
                deployed_step,
                decay,
                initial_effect: params.availability_efficacy,
                target: EffectTarget::Availability,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{ContextNetExt, NetParams};
    use crate::host_transmission::{
        ContextHostTransmissionExt, PerHostTransmission, PerHostTransmissionState, SpeciesAvailability,
    };
    use ixa::{Context, ContextPeopleExt};

    fn seed_species(context: &mut Context, person: ixa::PersonId) {
        let state = PerHostTransmissionState {
            species: vec![SpeciesAvailability { alpha_base: 0.5, p_bite: 0.9, p_rest_product: 0.8 }],
            hetero_multiplier: 1.0,
            active_effects: Vec::new(),
        };
        context.set_person_property(person, PerHostTransmission, state);
    }

    #[test]
    fn test_invalid_efficacy_errors() {
        let mut context = Context::new();
        let person = context.add_person(()).unwrap();
        let params = NetParams {
            component_id: 1,
            biting_efficacy: 1.5,
            availability_efficacy: 0.5,
            decay_lambda_years: 2.0,
            decay_k: 2.0,
        };
        assert!(context.deploy_net(person, params).is_err());
    }

    #[test]
    fn test_deploy_reduces_biting() {
        let mut context = Context::new();
        let person = context.add_person(()).unwrap();
        seed_species(&mut context, person);
        let biting_before = context.effective_biting(person, 0);
        let params = NetParams {
            component_id: 1,
            biting_efficacy: 0.5,
            availability_efficacy: 0.3,
            decay_lambda_years: 2.0,
            decay_k: 2.0,
        };
        context.deploy_net(person, params).unwrap();
        let biting_after = context.effective_biting(person, 0);
        assert!(biting_after < biting_before);
    }
}

//! Generic vector intervention: a catch-all component for vector-control measures that don't fit
//! the net/IRS shape, with a caller-chosen decay and target (§4.13).

use ixa::{Context, IxaError, PersonId};

use crate::host_transmission::{
    ActiveInterventionEffect, ContextHostTransmissionExt, DecayKind, EffectTarget,
    InterventionComponentType,
};

#[derive(Debug, Clone, Copy)]
pub struct GviParams {
    pub component_id: u32,
    pub efficacy: f64,
    pub decay: DecayKind,
    pub target: EffectTarget,
}

pub trait ContextGviExt {
    /// # Errors
    /// Returns `IxaError` if `efficacy` is outside `[0, 1]`.
    fn deploy_gvi(&mut self, person_id: PersonId, params: GviParams) -> Result<(), IxaError>;
}

impl ContextGviExt for Context {
    fn deploy_gvi(&mut self, person_id: PersonId, params: GviParams) -> Result<(), IxaError> {
        if !(0.0..=1.0).contains(&params.efficacy) {
            return Err(IxaError::IxaError("GVI efficacy must be in [0, 1]".to_string()));
        }
        self.register_intervention_effect(
            person_id,
            ActiveInterventionEffect {
                component_type: InterventionComponentType::Gvi,
                component_id: params.component_id,
                deployed_step: self.get_current_time(),
                decay: params.decay,
                initial_effect: params.efficacy,
                target: params.target,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{ContextGviExt, GviParams};
    use crate::host_transmission::{
        ContextHostTransmissionExt, DecayKind, EffectTarget, PerHostTransmission,
        PerHostTransmissionState, SpeciesAvailability,
    };
    use ixa::{Context, ContextPeopleExt};

    #[test]
    fn test_step_decay_vanishes_after_cutoff() {
        let mut context = Context::new();
        let person = context.add_person(()).unwrap();
        let state = PerHostTransmissionState {
            species: vec![SpeciesAvailability { alpha_base: 1.0, p_bite: 1.0, p_rest_product: 1.0 }],
            hetero_multiplier: 1.0,
            active_effects: Vec::new(),
        };
        context.set_person_property(person, PerHostTransmission, state);
        context
            .deploy_gvi(
                person,
                GviParams {
                    component_id: 1,
                    efficacy: 0.5,
                    decay: DecayKind::Step { cutoff: 10.0 },
                    target: EffectTarget::Availability,
                },
            )
            .unwrap();
        context.add_plan(20.0, |_| {});
        context.execute();
        let availability = context.effective_availability(person, 0, 1.0);
        assert!((availability - 1.0).abs() < 1e-9);
    }
}

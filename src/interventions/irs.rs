//! Indoor residual spraying: an exponentially-decaying reduction to post-feed resting survival
//! (§4.13).

use ixa::{Context, IxaError, PersonId};

use crate::host_transmission::{
    ActiveInterventionEffect, ContextHostTransmissionExt, DecayKind, EffectTarget,
    InterventionComponentType,
};

#[derive(Debug, Clone, Copy)]
pub struct IrsParams {
    pub component_id: u32,
    pub resting_efficacy: f64,
    pub decay_rate_per_day: f64,
}

pub trait ContextIrsExt {
    /// # Errors
    /// Returns `IxaError` if `resting_efficacy` is outside `[0, 1]`.
    fn deploy_irs(&mut self, person_id: PersonId, params: IrsParams) -> Result<(), IxaError>;
}

impl ContextIrsExt for Context {
    fn deploy_irs(&mut self, person_id: PersonId, params: IrsParams) -> Result<(), IxaError> {
        if !(0.0..=1.0).contains(&params.resting_efficacy) {
            return Err(IxaError::IxaError(
                "IRS resting efficacy must be in [0, 1]".to_string(),
            ));
        }
        self.register_intervention_effect(
            person_id,
            ActiveInterventionEffect {
                component_type: InterventionComponentType::Irs,
                component_id: params.component_id,
                deployed_step: self.get_current_time(),
                decay: DecayKind::Exponential { rate: params.decay_rate_per_day },
                initial_effect: params.resting_efficacy,
                target: EffectTarget::Resting,
            },
        );
        Ok(())
    }
}

//! Larviciding: a sustained multiplicative reduction to one vector species's emergence rate
//! (§4.13), thin wrapper over `vector_transmission::VectorSpeciesState::set_larviciding`.

use crate::vector_transmission::VectorSpeciesState;

#[derive(Debug, Clone, Copy)]
pub struct LarvicidingParams {
    pub start_step: f64,
    pub end_step: f64,
    pub effect_coverage: f64,
}

/// Applies `params` to `species`, replacing any previously active larviciding effect.
pub fn apply_larviciding(species: &mut VectorSpeciesState, params: LarvicidingParams) {
    species.set_larviciding(params.start_step, params.end_step, params.effect_coverage);
}

#[cfg(test)]
mod test {
    use super::{apply_larviciding, LarvicidingParams};
    use crate::vector_transmission::{HostAggregates, VectorSpeciesParams, VectorSpeciesState};

    #[test]
    fn test_apply_larviciding_does_not_panic_and_keeps_nv_finite() {
        let species_params = VectorSpeciesParams {
            eip_days: 10,
            tau_rest_days: 3,
            mu_va: 0.1,
            p_ovipositing: 0.5,
            seeking_duration_theta_d: 0.3,
        };
        let mut state = VectorSpeciesState::new(species_params, 1000.0);
        apply_larviciding(&mut state, LarvicidingParams { start_step: 10.0, end_step: 100.0, effect_coverage: 0.9 });
        let hosts = HostAggregates::default();
        for day in 0..60 {
            state.step_day(day, &hosts);
        }
        assert!(state.nv(59).is_finite());
    }
}

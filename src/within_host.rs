//! Aggregates the set of concurrent infections for one human (component C4): immune
//! accumulators, detectability, and per-step density bookkeeping.

use ixa::{
    define_person_property_with_default, Context, ContextPeopleExt, IxaError, PersonId,
};

use crate::infection::{EmpiricalInfection, InfectionOutcome};

/// Maximum number of concurrent infections a host may carry.
pub const MAX_INFECTIONS: usize = 21;

/// Parameters controlling the pre-erythrocytic immunity function and infectiousness saturation.
#[derive(Debug, Clone, Copy)]
pub struct WithinHostParams {
    pub immune_decay_rate: f64,
    pub s_imm: f64,
    pub h_star: f64,
    pub gamma: f64,
    pub detection_limit: f64,
    pub infectiousness_tau: f64,
    pub infectiousness_density_exponent: f64,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct WithinHostState {
    infections: Vec<EmpiricalInfection>,
    pub cumulative_exposure_y: f64,
    pub cumulative_inoculations_h: f64,
    pub total_density: f64,
    pub step_max_density: f64,
    pub pyrogenic_threshold_y_star: f64,
    /// Ring of the four most recent per-step total densities, used for the infectiousness
    /// logistic saturation.
    recent_densities: [f64; 4],
}

define_person_property_with_default!(
    WithinHost,
    WithinHostState,
    WithinHostState {
        infections: Vec::new(),
        cumulative_exposure_y: 0.0,
        cumulative_inoculations_h: 0.0,
        total_density: 0.0,
        step_max_density: 0.0,
        pyrogenic_threshold_y_star: 1.0,
        recent_densities: [0.0; 4],
    }
);

pub trait ContextWithinHostExt {
    /// Adds a new infection to a host, if the cap of `MAX_INFECTIONS` has not been reached.
    ///
    /// # Errors
    /// Returns `IxaError` if the host already carries `MAX_INFECTIONS` infections, or if
    /// constructing the infection fails.
    fn add_infection(
        &mut self,
        person_id: PersonId,
        genotype_id: u32,
    ) -> Result<(), IxaError>;

    /// Updates every infection a host carries by one step, removes extinct ones, and
    /// recomputes the aggregate scalars.
    ///
    /// # Errors
    /// Propagates any infection-update sampling error.
    fn update_within_host(
        &mut self,
        person_id: PersonId,
        age_years: f64,
        survival_factor: f64,
        global_multiplier: f64,
        params: &WithinHostParams,
    ) -> Result<(), IxaError>;

    /// Pre-erythrocytic immunity factor `S_imm + (1 - S_imm) / (1 + (h/h*)^gamma)`.
    fn susceptibility(&self, person_id: PersonId, params: &WithinHostParams) -> f64;

    /// Infectiousness of this host to a biting mosquito, a logistic saturation over the most
    /// recent four per-step densities.
    fn prob_transmission_to_mosquito(&self, person_id: PersonId, params: &WithinHostParams) -> f64;

    /// True iff `total_density > detection_limit`.
    fn is_patent(&self, person_id: PersonId, detection_limit: f64) -> bool;

    /// Clears every current infection and the per-step density scalars, as a drug-treatment
    /// effect would. Immune accumulators (`cumulative_inoculations_h`/`cumulative_exposure_y`)
    /// are left untouched since clearing blood-stage parasites does not erase prior exposure.
    fn clear_all_infections(&mut self, person_id: PersonId);
}

impl ContextWithinHostExt for Context {
    fn add_infection(&mut self, person_id: PersonId, genotype_id: u32) -> Result<(), IxaError> {
        let mut state = self.get_person_property(person_id, WithinHost);
        if state.infections.len() >= MAX_INFECTIONS {
            return Err(IxaError::IxaError(format!(
                "person {person_id:?} already carries the maximum of {MAX_INFECTIONS} infections"
            )));
        }
        let start_step = self.get_current_time();
        let infection = EmpiricalInfection::new(self, start_step, genotype_id)?;
        let mut state = self.get_person_property(person_id, WithinHost);
        state.infections.push(infection);
        self.set_person_property(person_id, WithinHost, state);
        Ok(())
    }

    fn update_within_host(
        &mut self,
        person_id: PersonId,
        age_years: f64,
        survival_factor: f64,
        global_multiplier: f64,
        params: &WithinHostParams,
    ) -> Result<(), IxaError> {
        let mut state = self.get_person_property(person_id, WithinHost);
        let age_days = age_years * 365.0;
        let current_step = self.get_current_time();

        let mut survivors = Vec::with_capacity(state.infections.len());
        let mut total_density = 0.0;
        let mut step_max_density: f64 = 0.0;
        let mut inoculations_this_step = 0.0;

        for mut infection in std::mem::take(&mut state.infections) {
            if infection.has_expired(current_step) {
                continue;
            }
            let outcome =
                infection.update(self, age_days, survival_factor, global_multiplier)?;
            if outcome == InfectionOutcome::Extinct {
                continue;
            }
            total_density += infection.current_density;
            step_max_density = step_max_density.max(infection.current_density);
            survivors.push(infection);
        }
        inoculations_this_step += 0.0; // inoculation count is driven by C7, not this aggregator

        let mut state = self.get_person_property(person_id, WithinHost);
        state.infections = survivors;
        state.total_density = total_density;
        state.step_max_density = step_max_density;

        if params.immune_decay_rate > 0.0 {
            let decay = (-params.immune_decay_rate).exp();
            state.cumulative_inoculations_h *= decay;
            state.cumulative_exposure_y *= decay;
        }
        state.cumulative_inoculations_h += inoculations_this_step;
        state.cumulative_exposure_y += total_density;

        state.recent_densities.rotate_left(1);
        let len = state.recent_densities.len();
        state.recent_densities[len - 1] = total_density;

        self.set_person_property(person_id, WithinHost, state);
        Ok(())
    }

    fn susceptibility(&self, person_id: PersonId, params: &WithinHostParams) -> f64 {
        let state = self.get_person_property(person_id, WithinHost);
        let h = state.cumulative_inoculations_h;
        params.s_imm
            + (1.0 - params.s_imm) / (1.0 + (h / params.h_star).powf(params.gamma))
    }

    fn prob_transmission_to_mosquito(&self, person_id: PersonId, params: &WithinHostParams) -> f64 {
        let state = self.get_person_property(person_id, WithinHost);
        let mean_density: f64 =
            state.recent_densities.iter().sum::<f64>() / state.recent_densities.len() as f64;
        if mean_density <= 0.0 {
            return 0.0;
        }
        let x = mean_density.powf(params.infectiousness_density_exponent);
        x / (x + params.infectiousness_tau)
    }

    fn is_patent(&self, person_id: PersonId, detection_limit: f64) -> bool {
        let state = self.get_person_property(person_id, WithinHost);
        state.total_density > detection_limit
    }

    fn clear_all_infections(&mut self, person_id: PersonId) {
        let mut state = self.get_person_property(person_id, WithinHost);
        state.infections.clear();
        state.total_density = 0.0;
        state.step_max_density = 0.0;
        state.recent_densities = [0.0; 4];
        self.set_person_property(person_id, WithinHost, state);
    }
}

#[cfg(test)]
mod test {
    use super::{ContextWithinHostExt, WithinHostParams, MAX_INFECTIONS};
    use crate::rng::ContextMalariaRandomExt;
    use ixa::{Context, ContextPeopleExt};

    fn default_params() -> WithinHostParams {
        WithinHostParams {
            immune_decay_rate: 0.0,
            s_imm: 0.1,
            h_star: 10.0,
            gamma: 2.0,
            detection_limit: 40.0,
            infectiousness_tau: 1.0,
            infectiousness_density_exponent: 1.0,
        }
    }

    #[test]
    fn test_add_infection_up_to_cap() {
        let mut context = Context::new();
        context.init_random(1);
        let person = context.add_person(()).unwrap();
        for _ in 0..MAX_INFECTIONS {
            context.add_infection(person, 0).unwrap();
        }
        assert!(context.add_infection(person, 0).is_err());
    }

    #[test]
    fn test_total_density_equals_sum_of_infections() {
        let mut context = Context::new();
        context.init_random(1);
        let person = context.add_person(()).unwrap();
        context.add_infection(person, 0).unwrap();
        context.add_infection(person, 0).unwrap();
        let params = default_params();
        context
            .update_within_host(person, 20.0, 1.0, 1.0, &params)
            .unwrap();
        let state = context.get_person_property(person, super::WithinHost);
        let expected: f64 = state
            .recent_densities
            .last()
            .copied()
            .unwrap_or(0.0);
        assert_eq!(state.total_density, expected);
    }

    #[test]
    fn test_susceptibility_between_simm_and_one() {
        let mut context = Context::new();
        context.init_random(1);
        let person = context.add_person(()).unwrap();
        let params = default_params();
        let s = context.susceptibility(person, &params);
        assert!((params.s_imm..=1.0).contains(&s));
    }

    #[test]
    fn test_is_patent_threshold() {
        let mut context = Context::new();
        context.init_random(1);
        let person = context.add_person(()).unwrap();
        assert!(!context.is_patent(person, 40.0));
    }
}

//! Aggregates C3-C7 for one individual: the fixed per-step update order and death conditions
//! (component C10).

use ixa::{
    define_person_property, define_person_property_with_default, Context, ContextPeopleExt,
    IxaError, PersonId,
};

use crate::age_interpolation::AgeBandTable;
use crate::pathogenesis::{
    decide_episode, decide_indirect_mortality, update_pyrogenic_threshold, ContextPathogenesisExt,
    EpisodeOutcome, PathogenesisParams,
};
use crate::rng::ContextMalariaRandomExt;
use crate::within_host::{ContextWithinHostExt, WithinHostParams};

define_person_property_with_default!(Alive, bool, true);
define_person_property!(BirthStep, f64);
define_person_property_with_default!(ComorbidityFactor, f64, 1.0);
define_person_property_with_default!(MaxAgeYears, f64, 90.0);

crate::define_malaria_rng!(HumanRng);

#[derive(Debug, Clone, Copy)]
pub struct HumanUpdateParams {
    pub step_length_days: f64,
    pub within_host: WithinHostParams,
    pub pathogenesis: PathogenesisParams,
    pub mortality_table: &'static AgeBandTable,
}

pub trait ContextHumanExt {
    #[must_use]
    fn age_years(&self, person_id: PersonId) -> f64;

    /// Runs component C10's fixed per-step update order for one human: age advance,
    /// within-host update, pathogenesis update, death checks.
    ///
    /// # Errors
    /// Propagates any sampling error surfaced by the within-host update.
    fn update_human(
        &mut self,
        person_id: PersonId,
        survival_factor: f64,
        global_density_multiplier: f64,
        params: &HumanUpdateParams,
    ) -> Result<(), IxaError>;
}

impl ContextHumanExt for Context {
    fn age_years(&self, person_id: PersonId) -> f64 {
        // Approximate: assumes a one-day step length. Callers that know the scenario's actual
        // step length (days per step) should compute age from `BirthStep` directly instead.
        let birth_step = self.get_person_property(person_id, BirthStep);
        (self.get_current_time() - birth_step) / 365.0
    }

    fn update_human(
        &mut self,
        person_id: PersonId,
        survival_factor: f64,
        global_density_multiplier: f64,
        params: &HumanUpdateParams,
    ) -> Result<(), IxaError> {
        if !self.get_person_property(person_id, Alive) {
            return Ok(());
        }

        let birth_step = self.get_person_property(person_id, BirthStep);
        let age_years = (self.get_current_time() - birth_step) * params.step_length_days / 365.0;
        let max_age = self.get_person_property(person_id, MaxAgeYears);

        if age_years >= max_age {
            self.set_person_property(person_id, Alive, false);
            return Ok(());
        }

        if self.is_doomed_and_due(person_id) {
            self.set_person_property(person_id, Alive, false);
            return Ok(());
        }

        self.update_within_host(
            person_id,
            age_years,
            survival_factor,
            global_density_multiplier,
            &params.within_host,
        )?;

        let within_host = self.get_person_property(person_id, crate::within_host::WithinHost);
        let new_y_star = update_pyrogenic_threshold(
            within_host.pyrogenic_threshold_y_star,
            within_host.total_density,
            params.step_length_days,
            &params.pathogenesis,
        );
        let mut within_host = within_host;
        within_host.pyrogenic_threshold_y_star = new_y_star;
        self.set_person_property(person_id, crate::within_host::WithinHost, within_host.clone());

        let comorbidity_factor = self.get_person_property(person_id, ComorbidityFactor);
        let episode = decide_episode(
            self,
            within_host.step_max_density,
            new_y_star,
            comorbidity_factor,
            params.pathogenesis.threshold_severe,
        );
        if !matches!(episode, EpisodeOutcome::None) {
            let age_factor = if age_years < 5.0 { 2.0 } else { 1.0 };
            if decide_indirect_mortality(self, episode, age_factor, &params.pathogenesis) {
                self.doom_person(person_id, &params.pathogenesis);
            }
        }

        let mortality_rate_per_year = params.mortality_table.lookup_piecewise_constant(age_years);
        let mortality_this_step = 1.0
            - (-mortality_rate_per_year * params.step_length_days / 365.0).exp();
        if self.sample_bernoulli(HumanRng, mortality_this_step) {
            self.set_person_property(person_id, Alive, false);
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{Alive, BirthStep, ContextHumanExt, HumanUpdateParams, MaxAgeYears};
    use crate::age_interpolation::AgeBandTable;
    use crate::pathogenesis::PathogenesisParams;
    use crate::rng::ContextMalariaRandomExt;
    use crate::within_host::WithinHostParams;
    use ixa::{Context, ContextPeopleExt};

    static MORTALITY_TABLE: std::sync::OnceLock<AgeBandTable> = std::sync::OnceLock::new();

    fn mortality_table() -> &'static AgeBandTable {
        MORTALITY_TABLE.get_or_init(|| AgeBandTable::new(&[(f64::INFINITY, 0.0)]))
    }

    fn default_params() -> HumanUpdateParams {
        HumanUpdateParams {
            step_length_days: 5.0,
            within_host: WithinHostParams {
                immune_decay_rate: 0.0,
                s_imm: 0.1,
                h_star: 10.0,
                gamma: 2.0,
                detection_limit: 40.0,
                infectiousness_tau: 1.0,
                infectiousness_density_exponent: 1.0,
            },
            pathogenesis: PathogenesisParams {
                alpha: 0.1,
                y1: 1.0,
                y2: 1.0,
                mu_y: 0.01,
                threshold_severe: 1e5,
                indirect_mortality_base_risk: 0.0,
                doomed_delay_steps: 30.0,
            },
            mortality_table: mortality_table(),
        }
    }

    #[test]
    fn test_dies_at_max_age() {
        let mut context = Context::new();
        context.init_random(1);
        let person = context.add_person(((BirthStep, -10000.0), (MaxAgeYears, 60.0))).unwrap();
        let params = default_params();
        context.update_human(person, 1.0, 1.0, &params).unwrap();
        assert!(!context.get_person_property(person, Alive));
    }

    #[test]
    fn test_survives_with_zero_mortality() {
        let mut context = Context::new();
        context.init_random(1);
        let person = context.add_person((BirthStep, 0.0)).unwrap();
        let params = default_params();
        context.update_human(person, 1.0, 1.0, &params).unwrap();
        assert!(context.get_person_property(person, Alive));
    }

    #[test]
    fn test_dead_person_is_noop() {
        let mut context = Context::new();
        context.init_random(1);
        let person = context.add_person(((BirthStep, 0.0), (Alive, false))).unwrap();
        let params = default_params();
        context.update_human(person, 1.0, 1.0, &params).unwrap();
        assert!(!context.get_person_property(person, Alive));
    }
}

//! Longitudinal cohort recruitment and the four configured removal rules: first clinical bout,
//! first infection, first treatment, or a fixed number of years after enrolment (§4.13).

use ixa::{define_person_property_with_default, Context, ContextPeopleExt, PersonId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalRule {
    FirstBout,
    FirstInfection,
    FirstTreatment,
    AfterYears(u32),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CohortMembership {
    pub enrolled: bool,
    pub enrolled_step: f64,
}

define_person_property_with_default!(Cohort, CohortMembership, CohortMembership::default());

pub trait ContextCohortExt {
    fn enroll_in_cohort(&mut self, person_id: PersonId);

    fn is_in_cohort(&self, person_id: PersonId) -> bool;

    /// Removes `person_id` from the cohort if `rule` is triggered by the event named by
    /// `event`. `event` must match one of `RemovalRule`'s first three variants; `AfterYears` is
    /// instead checked per step by the caller comparing enrollment age directly.
    fn remove_if_triggered(&mut self, person_id: PersonId, rule: RemovalRule, event: RemovalRule);

    /// Removes `person_id` from the cohort if `AfterYears(n)` has elapsed since enrolment.
    fn remove_if_expired(&mut self, person_id: PersonId, rule: RemovalRule, current_step: f64);
}

impl ContextCohortExt for Context {
    fn enroll_in_cohort(&mut self, person_id: PersonId) {
        let current_step = self.get_current_time();
        self.set_person_property(
            person_id,
            Cohort,
            CohortMembership { enrolled: true, enrolled_step: current_step },
        );
    }

    fn is_in_cohort(&self, person_id: PersonId) -> bool {
        self.get_person_property(person_id, Cohort).enrolled
    }

    fn remove_if_triggered(&mut self, person_id: PersonId, rule: RemovalRule, event: RemovalRule) {
        if rule == event && self.is_in_cohort(person_id) {
            let mut state = self.get_person_property(person_id, Cohort);
            state.enrolled = false;
            self.set_person_property(person_id, Cohort, state);
        }
    }

    fn remove_if_expired(&mut self, person_id: PersonId, rule: RemovalRule, current_step: f64) {
        let RemovalRule::AfterYears(years) = rule else { return };
        let state = self.get_person_property(person_id, Cohort);
        if !state.enrolled {
            return;
        }
        if current_step - state.enrolled_step >= f64::from(years) * 365.0 {
            let mut state = state;
            state.enrolled = false;
            self.set_person_property(person_id, Cohort, state);
        }
    }
}

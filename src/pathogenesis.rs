//! Fever/severe/indirect-mortality outcome determination from current density and the pyrogenic
//! threshold (component C5).

use ixa::{Context, PersonId};

use crate::rng::ContextMalariaRandomExt;

crate::define_malaria_rng!(PathogenesisRng);

/// Number of sub-intervals used to integrate the pyrogenic-threshold ODE over one step.
const ODE_SUBSTEPS: u32 = 11;

#[derive(Debug, Clone, Copy)]
pub struct PathogenesisParams {
    pub alpha: f64,
    pub y1: f64,
    pub y2: f64,
    pub mu_y: f64,
    pub threshold_severe: f64,
    pub indirect_mortality_base_risk: f64,
    pub doomed_delay_steps: f64,
}

#[derive(Debug, Clone, Copy)]
pub enum EpisodeOutcome {
    None,
    Uncomplicated,
    Severe,
}

/// Integrates the pyrogenic-threshold ODE
/// `Y* <- Y* + alpha * step * D / ((Y1 + D)(Y2 + Y*)) - muY * step * Y*`
/// over `step_length` days in `ODE_SUBSTEPS` sub-intervals.
#[must_use]
pub fn update_pyrogenic_threshold(
    y_star: f64,
    total_density: f64,
    step_length: f64,
    params: &PathogenesisParams,
) -> f64 {
    let dt = step_length / f64::from(ODE_SUBSTEPS);
    let mut y = y_star;
    for _ in 0..ODE_SUBSTEPS {
        let growth = params.alpha * dt * total_density / ((params.y1 + total_density) * (params.y2 + y));
        let decay = params.mu_y * dt * y;
        y = (y + growth - decay).max(1e-9);
    }
    y
}

#[must_use]
pub fn episode_probability(step_max_density: f64, y_star: f64) -> f64 {
    if y_star <= 0.0 {
        return 1.0;
    }
    1.0 - 1.0 / (1.0 + step_max_density / y_star)
}

/// Decides whether a clinical episode occurs this step, and if so whether it is severe.
pub fn decide_episode(
    context: &mut Context,
    step_max_density: f64,
    y_star: f64,
    comorbidity_factor: f64,
    threshold_severe: f64,
) -> EpisodeOutcome {
    let p = episode_probability(step_max_density, y_star);
    if !context.sample_bernoulli(PathogenesisRng, p) {
        return EpisodeOutcome::None;
    }
    if step_max_density > threshold_severe * comorbidity_factor {
        EpisodeOutcome::Severe
    } else {
        EpisodeOutcome::Uncomplicated
    }
}

/// Decides, on an uncomplicated-or-severe episode, whether the host is marked doomed (deferred
/// indirect death). `age_factor` is typically higher for younger hosts.
#[must_use]
pub fn decide_indirect_mortality(
    context: &mut Context,
    episode: EpisodeOutcome,
    age_factor: f64,
    params: &PathogenesisParams,
) -> bool {
    let risk = match episode {
        EpisodeOutcome::None => return false,
        EpisodeOutcome::Uncomplicated => params.indirect_mortality_base_risk * age_factor,
        EpisodeOutcome::Severe => params.indirect_mortality_base_risk * age_factor * 4.0,
    };
    context.sample_bernoulli(PathogenesisRng, risk)
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DoomedState {
    pub death_step: f64,
}

pub trait ContextPathogenesisExt {
    fn doom_person(&mut self, person_id: PersonId, params: &PathogenesisParams);
    fn is_doomed_and_due(&self, person_id: PersonId) -> bool;
}

ixa::define_person_property_with_default!(Doomed, Option<DoomedState>, None);

impl ContextPathogenesisExt for Context {
    fn doom_person(&mut self, person_id: PersonId, params: &PathogenesisParams) {
        use ixa::ContextPeopleExt;
        if self.get_person_property(person_id, Doomed).is_some() {
            return;
        }
        let death_step = self.get_current_time() + params.doomed_delay_steps;
        self.set_person_property(person_id, Doomed, Some(DoomedState { death_step }));
    }

    fn is_doomed_and_due(&self, person_id: PersonId) -> bool {
        use ixa::ContextPeopleExt;
        match self.get_person_property(person_id, Doomed) {
            Some(state) => self.get_current_time() >= state.death_step,
            None => false,
        }
    }
}

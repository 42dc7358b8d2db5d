//! Decision-tree case management: given a clinical episode outcome, decides whether the host
//! seeks and receives treatment, and if so clears blood-stage infections with the configured
//! drug efficacy (§4.13).

use ixa::{Context, PersonId};

use crate::pathogenesis::EpisodeOutcome;
use crate::rng::ContextMalariaRandomExt;
use crate::within_host::ContextWithinHostExt;

crate::define_malaria_rng!(CaseManagementRng);

#[derive(Debug, Clone, Copy)]
pub struct CaseManagementParams {
    /// Probability an uncomplicated episode results in treatment-seeking.
    pub uncomplicated_access_probability: f64,
    /// Probability a severe episode results in treatment-seeking (typically higher).
    pub severe_access_probability: f64,
    /// Probability that, given treatment was sought, the drug clears the infection.
    pub drug_efficacy: f64,
}

/// Runs the decision tree for one episode. Returns `true` if the host was treated and cured.
pub fn decide_and_apply_treatment(
    context: &mut Context,
    person_id: PersonId,
    episode: EpisodeOutcome,
    params: &CaseManagementParams,
) -> bool {
    let access_probability = match episode {
        EpisodeOutcome::None => return false,
        EpisodeOutcome::Uncomplicated => params.uncomplicated_access_probability,
        EpisodeOutcome::Severe => params.severe_access_probability,
    };

    if !context.sample_bernoulli(CaseManagementRng, access_probability) {
        return false;
    }
    if !context.sample_bernoulli(CaseManagementRng, params.drug_efficacy) {
        return false;
    }
    context.clear_all_infections(person_id);
    true
}

//! Per-host, per-mosquito-species transmission state: baseline availability/biting/resting
//! probabilities composed with currently-active intervention decay effects (component C6).

use ixa::{define_person_property_with_default, Context, ContextPeopleExt, IxaError, PersonId};

use crate::rng::ContextMalariaRandomExt;

crate::define_malaria_rng!(HostTransmissionRng);

/// Component-type tags used by the intervention manager's stable ordering (§4.13), mirrored here
/// so decay lookups and deployment bookkeeping agree on identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum InterventionComponentType {
    Pev,
    Bsv,
    Tbv,
    Itn,
    Irs,
    Gvi,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum DecayKind {
    Weibull { lambda: f64, k: f64 },
    Exponential { rate: f64 },
    /// Configurable step decay used by GVI: the effect is full-strength for `cutoff` steps then
    /// vanishes.
    Step { cutoff: f64 },
}

impl DecayKind {
    #[must_use]
    pub fn decay_factor(&self, elapsed_steps: f64) -> f64 {
        if elapsed_steps < 0.0 {
            return 0.0;
        }
        match *self {
            DecayKind::Weibull { lambda, k } => (-((elapsed_steps / (lambda * 365.0)).powf(k))).exp(),
            DecayKind::Exponential { rate } => (-rate * elapsed_steps).exp(),
            DecayKind::Step { cutoff } => {
                if elapsed_steps <= cutoff {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ActiveInterventionEffect {
    pub component_type: InterventionComponentType,
    pub component_id: u32,
    pub deployed_step: f64,
    pub decay: DecayKind,
    /// Initial fractional reduction applied at deployment (e.g. `1 - efficacy`).
    pub initial_effect: f64,
    /// Which of availability/biting/resting this effect multiplies.
    pub target: EffectTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EffectTarget {
    Availability,
    Biting,
    Resting,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SpeciesAvailability {
    pub alpha_base: f64,
    pub p_bite: f64,
    pub p_rest_product: f64,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PerHostTransmissionState {
    pub species: Vec<SpeciesAvailability>,
    pub hetero_multiplier: f64,
    pub active_effects: Vec<ActiveInterventionEffect>,
}

define_person_property_with_default!(
    PerHostTransmission,
    PerHostTransmissionState,
    PerHostTransmissionState {
        species: Vec::new(),
        hetero_multiplier: 1.0,
        active_effects: Vec::new(),
    }
);

/// A scenario's per-species availability/biting/resting distribution (§6's "per-host availability
/// distribution and its variance, biting/resting probability beta distributions").
#[derive(Debug, Clone, Copy)]
pub struct AvailabilityDistribution {
    pub mean: f64,
    pub variance: f64,
    pub biting_alpha: f64,
    pub biting_beta: f64,
    pub resting_alpha: f64,
    pub resting_beta: f64,
}

/// Draws one host's baseline availability (Gamma, moment-matched to `mean`/`variance`) and
/// biting/resting survival probabilities (Beta) for one mosquito species, sampled once at birth
/// and held fixed for that host's lifetime.
///
/// # Errors
/// Returns `IxaError` if the distribution's shape parameters are degenerate.
pub fn sample_species_availability(
    context: &mut Context,
    dist: &AvailabilityDistribution,
) -> Result<SpeciesAvailability, IxaError> {
    let mean = dist.mean.max(1e-9);
    let variance = dist.variance.max(1e-9);
    let shape = mean * mean / variance;
    let scale = variance / mean;
    let alpha_base = context.sample_gamma(HostTransmissionRng, shape, scale)?;
    let p_bite = context.sample_beta(HostTransmissionRng, dist.biting_alpha, dist.biting_beta)?;
    let p_rest_product =
        context.sample_beta(HostTransmissionRng, dist.resting_alpha, dist.resting_beta)?;
    Ok(SpeciesAvailability { alpha_base, p_bite, p_rest_product })
}

/// A multiplier factor, clamped to `[0, upper]`, composing a product of per-effect decay
/// factors for a given target on a given species's age-adjusted baseline.
fn composed_multiplier(
    state: &PerHostTransmissionState,
    current_step: f64,
    target: EffectTarget,
) -> f64 {
    state
        .active_effects
        .iter()
        .filter(|e| e.target == target)
        .map(|e| {
            let elapsed = current_step - e.deployed_step;
            let decayed_reduction = e.initial_effect * e.decay.decay_factor(elapsed);
            (1.0 - decayed_reduction).clamp(0.0, 1.0)
        })
        .product()
}

pub trait ContextHostTransmissionExt {
    /// Effective availability for one species: `alpha_base * hetero * age_factor * decay product`.
    fn effective_availability(&self, person_id: PersonId, species_idx: usize, age_factor: f64) -> f64;
    /// Effective per-bite survival probability, clamped to `[0, 1]`.
    fn effective_biting(&self, person_id: PersonId, species_idx: usize) -> f64;
    /// Effective post-feed resting survival probability, clamped to `[0, 1]`.
    fn effective_resting(&self, person_id: PersonId, species_idx: usize) -> f64;
    fn register_intervention_effect(&mut self, person_id: PersonId, effect: ActiveInterventionEffect);
}

impl ContextHostTransmissionExt for Context {
    fn effective_availability(&self, person_id: PersonId, species_idx: usize, age_factor: f64) -> f64 {
        let state = self.get_person_property(person_id, PerHostTransmission);
        let Some(sp) = state.species.get(species_idx) else {
            return 0.0;
        };
        let current_step = self.get_current_time();
        let decay = composed_multiplier(&state, current_step, EffectTarget::Availability);
        (sp.alpha_base * state.hetero_multiplier * age_factor * decay).max(0.0)
    }

    fn effective_biting(&self, person_id: PersonId, species_idx: usize) -> f64 {
        let state = self.get_person_property(person_id, PerHostTransmission);
        let Some(sp) = state.species.get(species_idx) else {
            return 0.0;
        };
        let current_step = self.get_current_time();
        let decay = composed_multiplier(&state, current_step, EffectTarget::Biting);
        (sp.p_bite * decay).clamp(0.0, 1.0)
    }

    fn effective_resting(&self, person_id: PersonId, species_idx: usize) -> f64 {
        let state = self.get_person_property(person_id, PerHostTransmission);
        let Some(sp) = state.species.get(species_idx) else {
            return 0.0;
        };
        let current_step = self.get_current_time();
        let decay = composed_multiplier(&state, current_step, EffectTarget::Resting);
        (sp.p_rest_product * decay).clamp(0.0, 1.0)
    }

    fn register_intervention_effect(&mut self, person_id: PersonId, effect: ActiveInterventionEffect) {
        let mut state = self.get_person_property(person_id, PerHostTransmission);
        state.active_effects.retain(|e| {
            !(e.component_type == effect.component_type && e.target == effect.target)
        });
        state.active_effects.push(effect);
        self.set_person_property(person_id, PerHostTransmission, state);
    }
}

#[cfg(test)]
mod test {
    use super::{
        ActiveInterventionEffect, ContextHostTransmissionExt, DecayKind, EffectTarget,
        InterventionComponentType, PerHostTransmission, PerHostTransmissionState,
        SpeciesAvailability,
    };
    use ixa::{Context, ContextPeopleExt};

    fn seed_species(context: &mut Context, person: ixa::PersonId) {
        let mut state = PerHostTransmissionState {
            species: vec![SpeciesAvailability {
                alpha_base: 0.5,
                p_bite: 0.9,
                p_rest_product: 0.8,
            }],
            hetero_multiplier: 1.0,
            active_effects: Vec::new(),
        };
        context.set_person_property(person, PerHostTransmission, std::mem::take(&mut state));
    }

    #[test]
    fn test_effective_values_within_bounds() {
        let mut context = Context::new();
        let person = context.add_person(()).unwrap();
        seed_species(&mut context, person);
        assert!(context.effective_availability(person, 0, 1.0) >= 0.0);
        let biting = context.effective_biting(person, 0);
        assert!((0.0..=1.0).contains(&biting));
        let resting = context.effective_resting(person, 0);
        assert!((0.0..=1.0).contains(&resting));
    }

    #[test]
    fn test_itn_weibull_decay_at_deployment() {
        let mut context = Context::new();
        let person = context.add_person(()).unwrap();
        seed_species(&mut context, person);
        context.register_intervention_effect(
            person,
            ActiveInterventionEffect {
                component_type: InterventionComponentType::Itn,
                component_id: 1,
                deployed_step: 100.0,
                decay: DecayKind::Weibull { lambda: 3.0, k: 1.8 },
                initial_effect: 0.6,
                target: EffectTarget::Biting,
            },
        );
        context.add_plan(100.0, |_| {});
        context.execute();
        let biting_at_deployment = context.effective_biting(person, 0);
        assert!((biting_at_deployment - 0.9 * 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_unregistered_species_returns_zero() {
        let mut context = Context::new();
        let person = context.add_person(()).unwrap();
        assert_eq!(context.effective_availability(person, 5, 1.0), 0.0);
    }

    #[test]
    fn test_sample_species_availability_draws_nonnegative_probabilities() {
        use crate::rng::ContextMalariaRandomExt;
        let mut context = Context::new();
        context.init_random(4);
        let dist = super::AvailabilityDistribution {
            mean: 0.3,
            variance: 0.01,
            biting_alpha: 2.0,
            biting_beta: 3.0,
            resting_alpha: 4.0,
            resting_beta: 2.0,
        };
        let sampled = super::sample_species_availability(&mut context, &dist).unwrap();
        assert!(sampled.alpha_base >= 0.0);
        assert!((0.0..=1.0).contains(&sampled.p_bite));
        assert!((0.0..=1.0).contains(&sampled.p_rest_product));
    }
}

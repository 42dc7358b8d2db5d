//! Demographic pyramid, birth/death bookkeeping, and target cumulative age proportions
//! (component C11).

use ixa::{Context, ContextPeopleExt, IxaError, PersonId};
use serde::{Deserialize, Serialize};

use crate::human::{Alive, BirthStep, MaxAgeYears};
use crate::rng::ContextMalariaRandomExt;

crate::define_malaria_rng!(PopulationRng);

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DemographyParams {
    /// Target size of the living population, held constant by one birth per death.
    pub population_size: usize,
    pub max_age_years: f64,
    /// Exponential hazard component, `rho` in `S(a) = exp(-rho*a - M1(a) - M2(a))`. Must be zero
    /// (a non-zero growth rate is explicitly not supported, §4.11).
    pub growth_rate_rho: f64,
    /// Two-component hazard coefficients approximating `M1(a)` (early-life) and `M2(a)`
    /// (late-life), both linear in age for this implementation.
    pub hazard_m1_coefficient: f64,
    pub hazard_m2_coefficient: f64,
}

/// Survivorship `S(a) = exp(-rho*a - M1(a) - M2(a))` with `M1(a) = m1*a`, `M2(a) = m2*a^2`.
#[must_use]
fn survivorship(age_years: f64, params: &DemographyParams) -> f64 {
    let m1 = params.hazard_m1_coefficient * age_years;
    let m2 = params.hazard_m2_coefficient * age_years * age_years;
    (-params.growth_rate_rho * age_years - m1 - m2).exp()
}

/// Builds the target cumulative age-proportion table `cumAgeProp[k]`: the target fraction of the
/// population aged at least `k` years, for `k` in `0..=max_age_years` (one entry per whole year).
///
/// # Errors
/// Returns `IxaError` if `growth_rate_rho` is non-zero (not supported, per §4.11).
pub fn build_target_age_distribution(params: &DemographyParams) -> Result<Vec<f64>, IxaError> {
    if params.growth_rate_rho != 0.0 {
        return Err(IxaError::IxaError(
            "a non-zero population growth rate is not supported".to_string(),
        ));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let max_age_whole_years = params.max_age_years.ceil() as usize;
    let survivorship_curve: Vec<f64> = (0..=max_age_whole_years)
        .map(|k| survivorship(k as f64, params))
        .collect();
    let total: f64 = survivorship_curve.iter().sum();
    if total <= 0.0 {
        return Err(IxaError::IxaError(
            "survivorship curve integrates to zero; cannot build age distribution".to_string(),
        ));
    }
    Ok(survivorship_curve
        .iter()
        .map(|s| s / total)
        .collect::<Vec<f64>>()
        .into_iter()
        .rev()
        .scan(0.0, |cum, p| {
            *cum += p;
            Some(*cum)
        })
        .collect::<Vec<f64>>()
        .into_iter()
        .rev()
        .collect())
}

pub trait ContextPopulationExt {
    /// Seeds an initial population of size `n` so that the age distribution matches
    /// `cum_age_prop`.
    ///
    /// # Errors
    /// Propagates any error from `add_person`.
    fn seed_initial_population(
        &mut self,
        n: usize,
        cum_age_prop: &[f64],
        max_age_years: f64,
    ) -> Result<Vec<PersonId>, IxaError>;

    /// Replaces a dead or too-old individual with a newborn, preserving population size.
    ///
    /// # Errors
    /// Propagates any error from `add_person`.
    fn replace_on_death(&mut self, max_age_years: f64) -> Result<PersonId, IxaError>;

    fn current_population_size(&self) -> usize;
}

impl ContextPopulationExt for Context {
    fn seed_initial_population(
        &mut self,
        n: usize,
        cum_age_prop: &[f64],
        max_age_years: f64,
    ) -> Result<Vec<PersonId>, IxaError> {
        let max_age_whole_years = cum_age_prop.len() - 1;
        let current_step = self.get_current_time();
        let mut people = Vec::with_capacity(n);
        for k in 0..max_age_whole_years {
            let target_at_least_k = cum_age_prop[k] * n as f64;
            let target_at_least_k1 = cum_age_prop[k + 1] * n as f64;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let count_in_band = (target_at_least_k - target_at_least_k1).round().max(0.0) as usize;
            for _ in 0..count_in_band {
                let age_years = k as f64 + self.sample_unit_uniform(PopulationRng);
                let birth_step = current_step - age_years * 365.0;
                let person = self.add_person((
                    (BirthStep, birth_step),
                    (MaxAgeYears, max_age_years),
                    (Alive, true),
                ))?;
                people.push(person);
            }
        }
        Ok(people)
    }

    fn replace_on_death(&mut self, max_age_years: f64) -> Result<PersonId, IxaError> {
        let current_step = self.get_current_time();
        self.add_person((
            (BirthStep, current_step),
            (MaxAgeYears, max_age_years),
            (Alive, true),
        ))
    }

    fn current_population_size(&self) -> usize {
        self.query_people((Alive, true)).len()
    }
}

#[cfg(test)]
mod test {
    use super::{build_target_age_distribution, ContextPopulationExt, DemographyParams};
    use crate::rng::ContextMalariaRandomExt;
    use ixa::Context;

    fn default_params() -> DemographyParams {
        DemographyParams {
            population_size: 100,
            max_age_years: 90.0,
            growth_rate_rho: 0.0,
            hazard_m1_coefficient: 0.02,
            hazard_m2_coefficient: 0.0005,
        }
    }

    #[test]
    fn test_cum_age_prop_is_monotonically_nonincreasing() {
        let dist = build_target_age_distribution(&default_params()).unwrap();
        for w in dist.windows(2) {
            assert!(w[0] >= w[1] - 1e-9);
        }
    }

    #[test]
    fn test_cum_age_prop_starts_near_one() {
        let dist = build_target_age_distribution(&default_params()).unwrap();
        assert!((dist[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_nonzero_growth_rate_errors() {
        let mut params = default_params();
        params.growth_rate_rho = 0.01;
        assert!(build_target_age_distribution(&params).is_err());
    }

    #[test]
    fn test_seed_initial_population_count() {
        let mut context = Context::new();
        context.init_random(1);
        let dist = build_target_age_distribution(&default_params()).unwrap();
        let people = context.seed_initial_population(100, &dist, 90.0).unwrap();
        assert_eq!(context.current_population_size(), people.len());
    }

    #[test]
    fn test_replace_on_death_maintains_size() {
        let mut context = Context::new();
        context.init_random(1);
        let dist = build_target_age_distribution(&default_params()).unwrap();
        context.seed_initial_population(10, &dist, 90.0).unwrap();
        let before = context.current_population_size();
        context.replace_on_death(90.0).unwrap();
        assert_eq!(context.current_population_size(), before + 1);
    }
}

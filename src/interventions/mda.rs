//! Mass drug administration: a one-off sweep that clears blood-stage infections for a sampled
//! coverage-and-efficacy fraction of a target population (§4.13).

use ixa::{Context, ContextPeopleExt, PersonId};

use crate::rng::ContextMalariaRandomExt;
use crate::within_host::ContextWithinHostExt;

crate::define_malaria_rng!(MdaRng);

#[derive(Debug, Clone, Copy)]
pub struct MdaParams {
    /// Fraction of the target population reached by the round.
    pub coverage: f64,
    /// Fraction of reached hosts whose infections are actually cleared (drug efficacy).
    pub efficacy: f64,
}

pub trait ContextMdaExt {
    /// Applies one MDA round to `targets`, clearing infections for each person independently with
    /// probability `coverage * efficacy`. Returns the number of hosts cleared.
    fn run_mda_round(&mut self, targets: &[PersonId], params: MdaParams) -> usize;
}

impl ContextMdaExt for Context {
    fn run_mda_round(&mut self, targets: &[PersonId], params: MdaParams) -> usize {
        let treat_probability = params.coverage.clamp(0.0, 1.0) * params.efficacy.clamp(0.0, 1.0);
        let mut cleared = 0;
        for &person_id in targets {
            if self.sample_bernoulli(MdaRng, treat_probability) {
                self.clear_all_infections(person_id);
                cleared += 1;
            }
        }
        cleared
    }
}

#[cfg(test)]
mod test {
    use super::{ContextMdaExt, MdaParams};
    use crate::rng::ContextMalariaRandomExt;
    use crate::within_host::{ContextWithinHostExt, WithinHostParams};
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
    fn test_full_coverage_and_efficacy_clears_everyone() {
        let mut context = Context::new();
        context.init_random(3);
        let people: Vec<_> = (0..5)
            .map(|_| {
                let person = context.add_person(()).unwrap();
                context.add_infection(person, 0).unwrap();
                person
            })
            .collect();
        let params = default_params();
        for &person in &people {
            context.update_within_host(person, 20.0, 1.0, 1.0, &params).unwrap();
        }
        let cleared = context.run_mda_round(&people, MdaParams { coverage: 1.0, efficacy: 1.0 });
        assert_eq!(cleared, 5);
        for &person in &people {
            assert_eq!(context.get_person_property(person, crate::within_host::WithinHost).total_density, 0.0);
        }
    }

    #[test]
    fn test_zero_coverage_clears_nobody() {
        let mut context = Context::new();
        context.init_random(3);
        let people: Vec<_> = (0..5).map(|_| context.add_person(()).unwrap()).collect();
        let cleared = context.run_mda_round(&people, MdaParams { coverage: 0.0, efficacy: 1.0 });
        assert_eq!(cleared, 0);
    }
}

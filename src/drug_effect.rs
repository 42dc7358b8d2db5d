//! Seam for the externally-maintained PK/PD drug module (out of scope for this crate, §1):
//! a `DrugEffectProvider` supplies the blood-stage survival multiplier C3/C4 apply per step.

use ixa::{Context, PersonId};

pub trait DrugEffectProvider {
    /// Returns the blood-stage parasite survival multiplier for `person_id` this step, in
    /// `[0, 1]`. `1.0` means no drug effect.
    fn blood_stage_survival(&self, context: &Context, person_id: PersonId) -> f64;
}

/// The default provider used whenever no PK/PD module is wired in: drugs never kill parasites.
pub struct NullDrugEffect;

impl DrugEffectProvider for NullDrugEffect {
    fn blood_stage_survival(&self, _context: &Context, _person_id: PersonId) -> f64 {
        1.0
    }
}

#[cfg(test)]
mod test {
    use super::{DrugEffectProvider, NullDrugEffect};
    use ixa::{Context, ContextPeopleExt};

    #[test]
    fn test_null_provider_always_returns_full_survival() {
        let mut context = Context::new();
        let person = context.add_person(()).unwrap();
        assert_eq!(NullDrugEffect.blood_stage_survival(&context, person), 1.0);
    }
}

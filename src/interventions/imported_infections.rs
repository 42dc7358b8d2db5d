//! Travel-imported infections: a per-step Poisson-rate process that seeds new infections into
//! randomly-chosen live hosts, independent of local transmission (§4.13).

use ixa::{Context, ContextPeopleExt, IxaError};

use crate::human::Alive;
use crate::rng::ContextMalariaRandomExt;
use crate::within_host::ContextWithinHostExt;

crate::define_malaria_rng!(ImportedInfectionsRng);

/// Seeds `Poisson(rate_per_step)` new infections this step into randomly-selected live hosts, each
/// with a fresh genotype drawn uniformly from `0..genotype_pool_size`. Returns the number of
/// infections actually seeded (may be fewer than drawn if the population is empty).
///
/// # Errors
/// Propagates any error from the underlying Poisson or infection-seeding draws.
pub fn seed_imported_infections(
    context: &mut Context,
    rate_per_step: f64,
    genotype_pool_size: u32,
) -> Result<usize, IxaError> {
    let count = context.sample_poisson(ImportedInfectionsRng, rate_per_step)?;
    let live_hosts = context.query_people((Alive, true));
    if live_hosts.is_empty() {
        return Ok(0);
    }
    let mut seeded = 0;
    for _ in 0..count {
        let index = context.sample_range(ImportedInfectionsRng, 0..live_hosts.len());
        let genotype_id = if genotype_pool_size == 0 {
            0
        } else {
            context.sample_range(ImportedInfectionsRng, 0..genotype_pool_size)
        };
        context.add_infection(live_hosts[index], genotype_id)?;
        seeded += 1;
    }
    Ok(seeded)
}

use criterion::Criterion;
use malaria_sim::vector_transmission::{HostAggregates, VectorSpeciesParams, VectorSpeciesState};
use std::hint::black_box;

fn default_params() -> VectorSpeciesParams {
    VectorSpeciesParams {
        eip_days: 10,
        tau_rest_days: 3,
        mu_va: 0.1,
        p_ovipositing: 0.7,
        seeking_duration_theta_d: 0.33,
    }
}

pub fn vector_species_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector_transmission::VectorSpeciesState");

    group.bench_function("step_day", |b| {
        let mut species = VectorSpeciesState::new(default_params(), 1000.0);
        let hosts = HostAggregates { sum_alpha: 50.0, sum_p_df_terms: 20.0, sum_p_dif_terms: 2.0 };
        let mut day = 0i64;
        b.iter(|| {
            day += 1;
            black_box(species.step_day(black_box(day), black_box(&hosts)));
        });
    });

    group.finish();
}

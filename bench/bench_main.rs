use criterion::{criterion_group, criterion_main};

mod benchmarks;
use benchmarks::age_lookup::age_lookup_benchmarks;
use benchmarks::vector_species::vector_species_benchmarks;

criterion_group!(malaria_benches, age_lookup_benchmarks, vector_species_benchmarks);

criterion_main!(malaria_benches);

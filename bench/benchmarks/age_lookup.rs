use criterion::Criterion;
use malaria_sim::age_interpolation::AgeBandTable;
use std::hint::black_box;

fn mortality_table() -> AgeBandTable {
    AgeBandTable::new(&[(1.0, 0.08), (5.0, 0.02), (15.0, 0.005), (f64::INFINITY, 0.01)])
}

pub fn age_lookup_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("age_interpolation::AgeBandTable");
    let table = mortality_table();

    group.bench_function("lookup_piecewise_constant_mid_band", |b| {
        b.iter(|| black_box(table.lookup_piecewise_constant(black_box(10.0))));
    });

    group.bench_function("lookup_piecewise_constant_last_band", |b| {
        b.iter(|| black_box(table.lookup_piecewise_constant(black_box(80.0))));
    });

    group.bench_function("lookup_piecewise_linear_mid_band", |b| {
        b.iter(|| black_box(table.lookup_piecewise_linear(black_box(10.0))));
    });

    group.bench_function("lookup_piecewise_linear_extrapolated", |b| {
        b.iter(|| black_box(table.lookup_piecewise_linear(black_box(0.1))));
    });

    group.finish();
}

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use taxi_weather_grid::grid::{GridIndex, GridSet, LatticeConfig};
use taxi_weather_grid::models::{Measure, Station, TaxiSnapshot};
use taxi_weather_grid::processors::{AssignmentStrategy, StationAssigner, TaxiAggregator};

// Deterministic spread of points over the Singapore bounding box
fn create_test_coordinates(count: usize) -> Vec<(f64, f64)> {
    (0..count)
        .map(|i| {
            let t = i as f64;
            let lon = 103.6 + (t * 0.618_033_988_7).fract() * 0.45;
            let lat = 1.21 + (t * 0.414_213_562_3).fract() * 0.26;
            (lon, lat)
        })
        .collect()
}

fn create_test_stations(count: usize) -> Vec<Station> {
    create_test_coordinates(count)
        .into_iter()
        .enumerate()
        .map(|(i, (lon, lat))| Station::new(format!("S{}", 100 + i), format!("Station {}", i), lat, lon))
        .collect()
}

fn index_for(lattice: LatticeConfig) -> GridIndex {
    let grid = Arc::new(GridSet::from_lattice(&lattice).expect("lattice grid"));
    GridIndex::new(lattice, grid).expect("grid index")
}

fn benchmark_formula_lookup(c: &mut Criterion) {
    let coordinates = create_test_coordinates(10_000);

    for lattice in [LatticeConfig::grid_22(), LatticeConfig::grid_45()] {
        c.bench_function(&format!("formula_lookup_{}", lattice.name), |b| {
            b.iter(|| {
                let mapped = coordinates
                    .iter()
                    .filter(|(lon, lat)| lattice.locate(*lon, *lat).is_some())
                    .count();
                black_box(mapped)
            })
        });
    }
}

fn benchmark_station_ranking(c: &mut Criterion) {
    let grid = GridSet::from_lattice(&LatticeConfig::grid_45()).expect("lattice grid");
    let computed_at = NaiveDate::from_ymd_opt(2022, 6, 1)
        .and_then(|d| d.and_hms_opt(9, 0, 0))
        .expect("timestamp");
    let assigner = StationAssigner::new();

    let mut group = c.benchmark_group("station_ranking_by_stations");
    for &size in &[10, 60, 200] {
        let stations = create_test_stations(size);
        group.bench_with_input(BenchmarkId::new("stations", size), &stations, |b, stations| {
            b.iter(|| {
                let ranking = assigner
                    .rank(Measure::Rainfall, stations, &grid, computed_at)
                    .expect("ranking");
                black_box(ranking.cells.len())
            })
        });
    }
    group.finish();
}

fn benchmark_taxi_aggregation(c: &mut Criterion) {
    let timestamp = NaiveDate::from_ymd_opt(2022, 6, 1)
        .and_then(|d| d.and_hms_opt(9, 0, 0))
        .expect("timestamp");
    let snapshot = TaxiSnapshot::from_coordinates(timestamp, &create_test_coordinates(3_000));

    let mut group = c.benchmark_group("taxi_aggregation_by_strategy");
    for strategy in [AssignmentStrategy::Formula, AssignmentStrategy::Geometry] {
        let aggregator = TaxiAggregator::new(index_for(LatticeConfig::grid_22())).with_strategy(strategy);
        group.bench_function(BenchmarkId::from_parameter(strategy), |b| {
            b.iter(|| black_box(aggregator.aggregate(&snapshot).mapped_fixes()))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_formula_lookup,
    benchmark_station_ranking,
    benchmark_taxi_aggregation
);
criterion_main!(benches);

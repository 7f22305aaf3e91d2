use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use geo::{LineString, Polygon};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

use taxi_weather_grid::error::{ProcessingError, Result};
use taxi_weather_grid::grid::{GridIndex, GridSet, LatticeConfig};
use taxi_weather_grid::models::{
    DataDomain, GridCell, Measure, Station, StationObservation, TaxiFix, TaxiSnapshot,
};
use taxi_weather_grid::processors::{
    BatchProcessor, ObservationMerger, SlicePipeline, StationAssigner, TaxiAggregator,
};
use taxi_weather_grid::readers::{
    write_lattice_geojson, GridDataLoader, SliceSource, SnapshotStore, StoreSliceSource,
    WeatherSnapshot,
};
use taxi_weather_grid::utils::constants::GRID_OBSERVATIONS_TABLE;
use taxi_weather_grid::utils::time::timestamp_steps;
use taxi_weather_grid::writers::{ParquetWarehouse, WarehouseWriter};

fn slot(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2022, 6, 1)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

fn square(x: f64, y: f64, size: f64) -> Polygon<f64> {
    Polygon::new(
        LineString::from(vec![(x, y), (x + size, y), (x + size, y + size), (x, y + size), (x, y)]),
        vec![],
    )
}

fn grid_22_index() -> GridIndex {
    let lattice = LatticeConfig::grid_22();
    let grid = Arc::new(GridSet::from_lattice(&lattice).unwrap());
    GridIndex::new(lattice, grid).unwrap()
}

#[test]
fn test_hand_computed_station_ranks() {
    // Centroids at (0.5, 0.5) and (2.5, 0.5).
    let grid = GridSet::new(vec![
        GridCell::from_polygon(1, square(0.0, 0.0, 1.0)).unwrap(),
        GridCell::from_polygon(2, square(2.0, 0.0, 1.0)).unwrap(),
    ])
    .unwrap();
    let stations = vec![
        Station::new("A".to_string(), "A".to_string(), 0.5, 0.5),
        Station::new("B".to_string(), "B".to_string(), 1.5, 0.5),
        Station::new("C".to_string(), "C".to_string(), 0.5, 4.5),
    ];

    let ranking = StationAssigner::new()
        .rank(Measure::AirTemperature, &stations, &grid, slot(9, 0))
        .unwrap();

    let first = ranking.cell(1).unwrap();
    let order: Vec<(&str, u32, f64)> = first
        .stations
        .iter()
        .map(|s| (s.station_id.as_str(), s.rank, s.distance))
        .collect();
    assert_eq!(order, vec![("A", 0, 0.0), ("B", 1, 1.0), ("C", 2, 4.0)]);

    // From (2.5, 0.5): A is 2.0 away, C is 2.0 away, B is sqrt(5).
    let second = ranking.cell(2).unwrap();
    let ids: Vec<&str> = second.stations.iter().map(|s| s.station_id.as_str()).collect();
    assert_eq!(ids, vec!["A", "C", "B"]);
    assert_eq!(second.stations[2].distance, 5f64.sqrt());

    let again = StationAssigner::new()
        .rank(Measure::AirTemperature, &stations, &grid, slot(9, 15))
        .unwrap();
    assert_eq!(again.cells, ranking.cells);
}

#[test]
fn test_hundred_fixes_split_between_two_cells() {
    let index = grid_22_index();
    let lattice = index.lattice().clone();
    let aggregator = TaxiAggregator::new(index);

    let jitter = |i: usize| ((i % 7) as f64 - 3.0) * 0.001;
    let mut fixes = Vec::new();
    for (grid_num, count) in [(5u32, 60usize), (9, 40)] {
        let center = lattice.cell_center(grid_num).unwrap();
        for i in 0..count {
            fixes.push(TaxiFix::new(center.x() + jitter(i), center.y() - jitter(i + 3), slot(9, 0)));
        }
    }

    let counts = aggregator.aggregate(&TaxiSnapshot {
        timestamp: slot(9, 0),
        fixes,
    });

    assert_eq!(counts.len(), 286);
    assert_eq!(counts.count(5), Some(60));
    assert_eq!(counts.count(9), Some(40));
    assert!(counts
        .counts
        .iter()
        .filter(|(n, _)| **n != 5 && **n != 9)
        .all(|(_, c)| *c == 0));
    assert_eq!(counts.mapped_fixes(), 100);
    assert_eq!(counts.out_of_bounds, 0);
}

#[test]
fn test_merge_never_drops_cells() {
    let index = grid_22_index();
    let merger = ObservationMerger::new(index.grid().clone());
    let counts = TaxiAggregator::new(index).aggregate(&TaxiSnapshot::from_coordinates(slot(9, 0), &[]));

    let rows = merger.merge(slot(9, 0), Some(&counts), &[]).unwrap();
    assert_eq!(rows.len(), 286);
    assert!(rows.iter().all(|r| r.taxi_count == 0 && r.rainfall.is_none()));
}

#[test]
fn test_file_grid_agrees_with_lattice() {
    for lattice in [LatticeConfig::grid_22(), LatticeConfig::grid_45()] {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(format!("{}.geojson", lattice.name));
        write_lattice_geojson(&lattice, None, &path).unwrap();

        let loaded = GridDataLoader::new().load(&path).unwrap();
        let analytic = GridSet::from_lattice(&lattice).unwrap();
        assert_eq!(loaded.len(), lattice.cell_count());
        assert_eq!(
            loaded.grid_nums().collect::<Vec<_>>(),
            analytic.grid_nums().collect::<Vec<_>>()
        );

        let report = GridIndex::new(lattice.clone(), Arc::new(loaded)).unwrap().verify_lattice();
        assert!(report.is_consistent(), "{}", report.summary());
    }
}

struct FlakySource {
    failing: NaiveDateTime,
}

#[async_trait]
impl SliceSource for FlakySource {
    async fn taxi_snapshot(&self, timestamp: NaiveDateTime) -> Result<TaxiSnapshot> {
        if timestamp == self.failing {
            return Err(ProcessingError::MissingData(format!("taxi-availability at {}", timestamp)));
        }
        Ok(TaxiSnapshot::from_coordinates(timestamp, &[(103.85, 1.3)]))
    }

    async fn weather_snapshot(&self, measure: Measure, timestamp: NaiveDateTime) -> Result<WeatherSnapshot> {
        let station = Station::new("S43".to_string(), "Kim Chuan Road".to_string(), 1.3399, 103.8878);
        Ok(WeatherSnapshot {
            measure,
            timestamp,
            reading_type: "reading".to_string(),
            reading_unit: measure.units().to_string(),
            observations: vec![StationObservation::new(&station, timestamp, 1.0, measure)],
            stations: vec![station],
        })
    }
}

#[tokio::test]
async fn test_batch_reports_single_failed_slice() {
    let dir = TempDir::new().unwrap();
    let warehouse = Arc::new(ParquetWarehouse::new(dir.path()));
    let timestamps = timestamp_steps(slot(8, 0), slot(9, 0), 15);
    assert_eq!(timestamps.len(), 4);

    let sink: Arc<dyn WarehouseWriter> = warehouse.clone();
    let report = BatchProcessor::new(
        Arc::new(SlicePipeline::new(grid_22_index())),
        Arc::new(FlakySource { failing: timestamps[1] }),
    )
    .with_sink(sink)
    .with_max_workers(4)
    .run(&timestamps)
    .await
    .unwrap();

    assert_eq!(report.failed_timestamps(), vec![slot(8, 15)]);
    assert_eq!(
        report.completed.iter().map(|s| s.timestamp).collect::<Vec<_>>(),
        vec![slot(8, 0), slot(8, 30), slot(8, 45)]
    );

    let stored = warehouse.read_grid_observations().unwrap();
    assert_eq!(stored.len(), 3 * 286);
    assert!(stored.iter().all(|r| r.rainfall == Some(1.0)));
    assert!(warehouse.part_files(GRID_OBSERVATIONS_TABLE).unwrap().len() >= 3);
}

#[tokio::test]
async fn test_archived_snapshots_merge_end_to_end() {
    let store = SnapshotStore::in_memory();
    store
        .put_snapshot(
            DataDomain::TaxiAvailability,
            slot(13, 14),
            &json!({
                "features": [{
                    "geometry": {"coordinates": [[103.85, 1.3], [103.851, 1.301], [120.0, 1.3]]},
                    "properties": {"timestamp": "2022-06-01T13:14:00+08:00"}
                }]
            }),
        )
        .await
        .unwrap();

    for measure in Measure::ALL {
        store
            .put_snapshot(
                DataDomain::Weather(measure),
                slot(13, 10),
                &json!({
                    "metadata": {
                        "stations": [
                            {"id": "S24", "name": "Upper Changi Road North", "location": {"latitude": 1.3678, "longitude": 103.9826}},
                            {"id": "S117", "name": "Banyan Road", "location": {"latitude": 1.256, "longitude": 103.679}}
                        ],
                        "reading_type": "reading",
                        "reading_unit": measure.units()
                    },
                    "items": [{
                        "timestamp": "2022-06-01T13:10:00+08:00",
                        "readings": [{"station_id": "S24", "value": 2.5}, {"station_id": "S117", "value": null}]
                    }]
                }),
            )
            .await
            .unwrap();
    }

    let source = StoreSliceSource::new(store, Duration::minutes(15));
    let pipeline = SlicePipeline::new(grid_22_index());
    let slice = pipeline.run(&source, slot(13, 15)).await.unwrap();

    assert!(slice.report.is_complete());
    assert_eq!(slice.taxis.out_of_bounds, 1);
    assert_eq!(slice.report.total_taxis, 2);
    // S117 has no reading, so every cell falls back to S24.
    assert!(slice
        .rows
        .iter()
        .all(|r| r.rainfall_station_id.as_deref() == Some("S24") && r.air_temperature == Some(2.5)));
}

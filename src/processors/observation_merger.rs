use chrono::NaiveDateTime;
use std::sync::Arc;

use crate::error::Result;
use crate::grid::GridSet;
use crate::models::{GridObservation, MeasureAssignment};
use crate::processors::TaxiCounts;

/// Joins taxi counts and resolved weather readings onto the full grid.
#[derive(Debug, Clone)]
pub struct ObservationMerger {
    grid: Arc<GridSet>,
}

impl ObservationMerger {
    pub fn new(grid: Arc<GridSet>) -> Self {
        Self { grid }
    }

    /// One row per defined cell, ascending by `grid_num`.
    ///
    /// Missing taxi counts become 0 and unresolved measures stay null. Rows take
    /// the taxi snapshot's timestamp, or `fallback` when there is no taxi data.
    pub fn merge(
        &self,
        fallback: NaiveDateTime,
        taxis: Option<&TaxiCounts>,
        assignments: &[MeasureAssignment],
    ) -> Result<Vec<GridObservation>> {
        let timestamp = taxis.map(|t| t.timestamp);

        let mut rows = self
            .grid
            .grid_nums()
            .map(|grid_num| {
                let mut builder = GridObservation::builder()
                    .grid_num(grid_num)
                    .timestamp(timestamp)
                    .taxi_count(taxis.and_then(|t| t.count(grid_num)).unwrap_or(0));

                for assignment in assignments {
                    builder = builder.reading(
                        assignment.measure,
                        assignment.reading(grid_num).cloned(),
                    );
                }

                builder.build_with_fallback(fallback)
            })
            .collect::<Result<Vec<_>>>()?;

        rows.sort_by_key(|r| r.grid_num);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GridCell, Measure, ResolvedReading};
    use chrono::{Duration, NaiveDate};
    use geo::{LineString, Polygon};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 6, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap()
    }

    fn grid() -> Arc<GridSet> {
        let cells = [7u32, 3, 5]
            .iter()
            .enumerate()
            .map(|(i, &n)| {
                let x = i as f64;
                let polygon = Polygon::new(
                    LineString::from(vec![(x, 0.0), (x + 1.0, 0.0), (x + 1.0, 1.0), (x, 1.0), (x, 0.0)]),
                    vec![],
                );
                GridCell::from_polygon(n, polygon).unwrap()
            })
            .collect();
        Arc::new(GridSet::new(cells).unwrap())
    }

    fn rainfall() -> MeasureAssignment {
        let mut by_cell = BTreeMap::new();
        by_cell.insert(
            3,
            Some(ResolvedReading {
                station_id: "S77".to_string(),
                rank: 0,
                value: 1.2,
                timestamp: ts(),
            }),
        );
        by_cell.insert(5, None);
        by_cell.insert(7, None);
        MeasureAssignment {
            measure: Measure::Rainfall,
            timestamp: Some(ts()),
            by_cell,
        }
    }

    #[test]
    fn test_merge_covers_every_cell() {
        let taxi_ts = ts() + Duration::minutes(2);
        let taxis = TaxiCounts {
            timestamp: taxi_ts,
            counts: [(3, 4), (5, 0), (7, 1)].into_iter().collect(),
            out_of_bounds: 0,
            total_fixes: 5,
        };

        let rows = ObservationMerger::new(grid())
            .merge(ts(), Some(&taxis), &[rainfall()])
            .unwrap();

        assert_eq!(rows.iter().map(|r| r.grid_num).collect::<Vec<_>>(), vec![3, 5, 7]);
        assert_eq!(rows[0].taxi_count, 4);
        assert_eq!(rows[0].rainfall, Some(1.2));
        assert_eq!(rows[0].rainfall_station_id.as_deref(), Some("S77"));
        assert_eq!(rows[1].rainfall, None);
        assert_eq!(rows[2].taxi_count, 1);
        assert!(rows.iter().all(|r| r.timestamp == taxi_ts));
        assert!(rows.iter().all(|r| r.air_temperature.is_none()));
    }

    #[test]
    fn test_missing_taxi_data_uses_fallback_timestamp() {
        let rows = ObservationMerger::new(grid()).merge(ts(), None, &[]).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.taxi_count == 0 && r.timestamp == ts()));
    }
}

use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

use crate::error::ProcessingError;
use crate::grid::{CellLookup, GridIndex};
use crate::models::{TaxiCountRow, TaxiFix, TaxiSnapshot};

/// How a taxi fix is mapped to a cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStrategy {
    /// Analytic lattice formula.
    #[default]
    Formula,
    /// Nearest centroid, accepted only when the cell polygon covers the fix.
    Geometry,
}

impl std::fmt::Display for AssignmentStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignmentStrategy::Formula => write!(f, "formula"),
            AssignmentStrategy::Geometry => write!(f, "geometry"),
        }
    }
}

impl FromStr for AssignmentStrategy {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "formula" => Ok(AssignmentStrategy::Formula),
            "geometry" => Ok(AssignmentStrategy::Geometry),
            other => Err(ProcessingError::InvalidFormat(format!(
                "Unknown assignment strategy: '{}'",
                other
            ))),
        }
    }
}

/// Per-cell taxi counts for one snapshot, covering every defined cell.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxiCounts {
    pub timestamp: NaiveDateTime,
    pub counts: BTreeMap<u32, u32>,
    /// Fixes that fell outside the grid.
    pub out_of_bounds: usize,
    pub total_fixes: usize,
}

impl TaxiCounts {
    pub fn count(&self, grid_num: u32) -> Option<u32> {
        self.counts.get(&grid_num).copied()
    }

    pub fn mapped_fixes(&self) -> u64 {
        self.counts.values().map(|&c| c as u64).sum()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Rows for the `assignment-taxi` table, ascending by `grid_num`.
    pub fn rows(&self) -> Vec<TaxiCountRow> {
        self.counts
            .iter()
            .map(|(&grid_num, &taxi_count)| TaxiCountRow {
                grid_num,
                timestamp: self.timestamp,
                taxi_count,
            })
            .collect()
    }
}

/// Buckets taxi fixes into grid cells.
#[derive(Debug, Clone)]
pub struct TaxiAggregator {
    index: GridIndex,
    strategy: AssignmentStrategy,
}

impl TaxiAggregator {
    pub fn new(index: GridIndex) -> Self {
        Self {
            index,
            strategy: AssignmentStrategy::Formula,
        }
    }

    pub fn with_strategy(mut self, strategy: AssignmentStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> AssignmentStrategy {
        self.strategy
    }

    pub fn index(&self) -> &GridIndex {
        &self.index
    }

    pub fn locate(&self, fix: &TaxiFix) -> CellLookup {
        match self.strategy {
            AssignmentStrategy::Formula => self.index.locate(fix.longitude, fix.latitude),
            AssignmentStrategy::Geometry => self.index.locate_by_geometry(fix.longitude, fix.latitude),
        }
    }

    pub fn aggregate(&self, snapshot: &TaxiSnapshot) -> TaxiCounts {
        self.aggregate_fixes(snapshot.timestamp, &snapshot.fixes)
    }

    /// Every grid cell appears in the result; cells without fixes count 0.
    pub fn aggregate_fixes(&self, timestamp: NaiveDateTime, fixes: &[TaxiFix]) -> TaxiCounts {
        let mut counts: BTreeMap<u32, u32> = self.index.grid().grid_nums().map(|n| (n, 0)).collect();

        let lookups: Vec<CellLookup> = fixes.par_iter().map(|fix| self.locate(fix)).collect();

        let mut out_of_bounds = 0;
        for lookup in lookups {
            match lookup.grid_num().and_then(|n| counts.get_mut(&n)) {
                Some(count) => *count += 1,
                None => out_of_bounds += 1,
            }
        }

        debug!(
            timestamp = %timestamp,
            fixes = fixes.len(),
            out_of_bounds,
            strategy = %self.strategy,
            "Aggregated taxi fixes"
        );

        TaxiCounts {
            timestamp,
            counts,
            out_of_bounds,
            total_fixes: fixes.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GridSet, LatticeConfig};
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 5, 27)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap()
    }

    fn aggregator(strategy: AssignmentStrategy) -> TaxiAggregator {
        let lattice = LatticeConfig::grid_22();
        let grid = Arc::new(GridSet::from_lattice(&lattice).unwrap());
        TaxiAggregator::new(GridIndex::new(lattice, grid).unwrap()).with_strategy(strategy)
    }

    #[test]
    fn test_empty_snapshot_is_zero_filled() {
        let agg = aggregator(AssignmentStrategy::Formula);
        let counts = agg.aggregate(&TaxiSnapshot::from_coordinates(ts(), &[]));
        assert_eq!(counts.len(), 286);
        assert!(counts.counts.values().all(|&c| c == 0));
        assert_eq!(counts.rows().len(), 286);
        assert_eq!(counts.out_of_bounds, 0);
    }

    #[test]
    fn test_out_of_bounds_fixes_are_counted_separately() {
        let agg = aggregator(AssignmentStrategy::Formula);
        let snapshot = TaxiSnapshot::from_coordinates(
            ts(),
            &[(103.85, 1.3), (103.85, 1.3), (105.0, 1.3), (103.85, 0.5)],
        );
        let counts = agg.aggregate(&snapshot);
        assert_eq!(counts.count(189), Some(2));
        assert_eq!(counts.mapped_fixes(), 2);
        assert_eq!(counts.out_of_bounds, 2);
        assert_eq!(counts.total_fixes, 4);
    }

    #[test]
    fn test_strategies_agree_on_cell_interiors() {
        let formula = aggregator(AssignmentStrategy::Formula);
        let geometry = aggregator(AssignmentStrategy::Geometry);
        let coordinates = [(103.62, 1.22), (103.85, 1.3), (103.99, 1.36), (103.71, 1.44)];
        let snapshot = TaxiSnapshot::from_coordinates(ts(), &coordinates);
        assert_eq!(formula.aggregate(&snapshot).counts, geometry.aggregate(&snapshot).counts);
    }

    #[test]
    fn test_rows_carry_snapshot_timestamp() {
        let agg = aggregator(AssignmentStrategy::Formula);
        let counts = agg.aggregate(&TaxiSnapshot::from_coordinates(ts(), &[(103.85, 1.3)]));
        let rows = counts.rows();
        assert!(rows.iter().all(|r| r.timestamp == ts()));
        assert!(rows.windows(2).all(|w| w[0].grid_num < w[1].grid_num));
        assert_eq!(rows.iter().find(|r| r.grid_num == 189).unwrap().taxi_count, 1);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("Geometry".parse::<AssignmentStrategy>().unwrap(), AssignmentStrategy::Geometry);
        assert!("nearest".parse::<AssignmentStrategy>().is_err());
    }
}

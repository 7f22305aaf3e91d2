use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashSet};

use crate::grid::GridSet;
use crate::models::{GridObservation, Measure};
use crate::processors::TaxiCounts;

#[derive(Debug, Clone, PartialEq)]
pub struct MergeReport {
    pub timestamp: NaiveDateTime,
    pub grid_cells: usize,
    pub total_rows: usize,
    pub missing_cells: Vec<u32>,
    pub duplicate_rows: usize,
    pub total_taxis: u64,
    pub out_of_bounds: usize,
    pub complete_weather_rows: usize,
    pub null_counts: BTreeMap<Measure, usize>,
}

impl MergeReport {
    /// One row per cell, no duplicates.
    pub fn is_complete(&self) -> bool {
        self.missing_cells.is_empty() && self.duplicate_rows == 0 && self.total_rows == self.grid_cells
    }

    pub fn null_count(&self, measure: Measure) -> usize {
        self.null_counts.get(&measure).copied().unwrap_or(0)
    }

    pub fn generate_summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str(&format!("=== Merge Report ({}) ===\n", self.timestamp));
        summary.push_str(&format!("Rows: {} / {} grid cells\n", self.total_rows, self.grid_cells));
        summary.push_str(&format!("Taxis mapped: {}\n", self.total_taxis));
        summary.push_str(&format!("Taxis out of bounds: {}\n", self.out_of_bounds));
        summary.push_str(&format!(
            "Rows with all readings: {} ({:.1}%)\n",
            self.complete_weather_rows,
            percentage(self.complete_weather_rows, self.total_rows)
        ));

        for measure in Measure::ALL {
            let nulls = self.null_count(measure);
            summary.push_str(&format!(
                "{} nulls: {} ({:.1}%)\n",
                measure.display_name(),
                nulls,
                percentage(nulls, self.total_rows)
            ));
        }

        if self.duplicate_rows > 0 {
            summary.push_str(&format!("Duplicate rows: {}\n", self.duplicate_rows));
        }
        if !self.missing_cells.is_empty() {
            let preview: Vec<String> = self
                .missing_cells
                .iter()
                .take(10)
                .map(|n| n.to_string())
                .collect();
            summary.push_str(&format!(
                "Missing cells ({}): {}\n",
                self.missing_cells.len(),
                preview.join(", ")
            ));
        }

        summary
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * part as f64 / total as f64
    }
}

/// Checks merged rows against the grid they were merged onto.
pub struct MergeChecker;

impl MergeChecker {
    pub fn check(
        timestamp: NaiveDateTime,
        rows: &[GridObservation],
        grid: &GridSet,
        taxis: Option<&TaxiCounts>,
    ) -> MergeReport {
        let mut seen = HashSet::with_capacity(rows.len());
        let mut duplicate_rows = 0;
        for row in rows {
            if !seen.insert(row.key()) {
                duplicate_rows += 1;
            }
        }

        let present: HashSet<u32> = rows.iter().map(|r| r.grid_num).collect();
        let missing_cells = grid.grid_nums().filter(|n| !present.contains(n)).collect();

        let null_counts = Measure::ALL
            .iter()
            .map(|&m| (m, rows.iter().filter(|r| r.value(m).is_none()).count()))
            .collect();

        MergeReport {
            timestamp,
            grid_cells: grid.len(),
            total_rows: rows.len(),
            missing_cells,
            duplicate_rows,
            total_taxis: rows.iter().map(|r| r.taxi_count as u64).sum(),
            out_of_bounds: taxis.map_or(0, |t| t.out_of_bounds),
            complete_weather_rows: rows.iter().filter(|r| r.has_complete_weather()).count(),
            null_counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::LatticeConfig;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 6, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_complete_merge() {
        let grid = GridSet::from_lattice(&LatticeConfig::grid_22()).unwrap();
        let mut rows: Vec<GridObservation> =
            grid.grid_nums().map(|n| GridObservation::new(n, ts(), 1)).collect();
        rows[0].rainfall = Some(0.4);

        let report = MergeChecker::check(ts(), &rows, &grid, None);
        assert!(report.is_complete());
        assert_eq!(report.total_taxis, 286);
        assert_eq!(report.null_count(Measure::Rainfall), 285);
        assert_eq!(report.null_count(Measure::AirTemperature), 286);
        assert_eq!(report.complete_weather_rows, 0);
        assert!(report.generate_summary().contains("Rows: 286 / 286 grid cells"));
    }

    #[test]
    fn test_missing_and_duplicate_rows() {
        let grid = GridSet::from_lattice(&LatticeConfig::grid_22()).unwrap();
        let mut rows: Vec<GridObservation> =
            grid.grid_nums().skip(1).map(|n| GridObservation::new(n, ts(), 0)).collect();
        rows.push(rows[0].clone());

        let report = MergeChecker::check(ts(), &rows, &grid, None);
        assert!(!report.is_complete());
        assert_eq!(report.missing_cells, vec![1]);
        assert_eq!(report.duplicate_rows, 1);
    }
}

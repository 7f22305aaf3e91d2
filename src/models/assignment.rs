use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::Measure;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedStation {
    pub station_id: String,
    pub rank: u32,
    pub distance: f64,
}

/// Stations ordered by distance from one cell centroid; `stations[i].rank == i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRanking {
    pub grid_num: u32,
    pub stations: Vec<RankedStation>,
}

/// Full distance ranking of a station set against every grid cell for one measure.
#[derive(Debug, Clone, PartialEq)]
pub struct StationRanking {
    pub measure: Measure,
    pub computed_at: NaiveDateTime,
    pub fingerprint: u64,
    pub cells: Vec<CellRanking>,
}

impl StationRanking {
    pub fn cell(&self, grid_num: u32) -> Option<&CellRanking> {
        self.cells
            .binary_search_by_key(&grid_num, |c| c.grid_num)
            .ok()
            .map(|idx| &self.cells[idx])
    }
}

/// The reading chosen to represent a cell for one measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedReading {
    pub station_id: String,
    pub rank: u32,
    pub value: f64,
    pub timestamp: NaiveDateTime,
}

/// Per-cell resolution of one measure at one timestamp; `None` means no station had a reading.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureAssignment {
    pub measure: Measure,
    pub timestamp: Option<NaiveDateTime>,
    pub by_cell: BTreeMap<u32, Option<ResolvedReading>>,
}

impl MeasureAssignment {
    pub fn reading(&self, grid_num: u32) -> Option<&ResolvedReading> {
        self.by_cell.get(&grid_num).and_then(|r| r.as_ref())
    }

    pub fn resolved_count(&self) -> usize {
        self.by_cell.values().filter(|r| r.is_some()).count()
    }
}

/// Row of the `assignment-station` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub grid_num: u32,
    pub date_active: NaiveDateTime,
    pub date_inactive: NaiveDateTime,
    pub rainfall: Option<String>,
    pub air_temperature: Option<String>,
    pub relative_humidity: Option<String>,
}

impl AssignmentRecord {
    pub fn new(grid_num: u32, date_active: NaiveDateTime, date_inactive: NaiveDateTime) -> Self {
        Self {
            grid_num,
            date_active,
            date_inactive,
            rainfall: None,
            air_temperature: None,
            relative_humidity: None,
        }
    }

    pub fn set_station(&mut self, measure: Measure, station_id: Option<String>) {
        match measure {
            Measure::Rainfall => self.rainfall = station_id,
            Measure::AirTemperature => self.air_temperature = station_id,
            Measure::RelativeHumidity => self.relative_humidity = station_id,
        }
    }
}

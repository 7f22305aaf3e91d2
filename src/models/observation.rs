use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, Result};
use crate::models::{Measure, ResolvedReading};

/// Per-cell taxi tally for one snapshot, as written to `assignment-taxi`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxiCountRow {
    pub grid_num: u32,
    pub timestamp: NaiveDateTime,
    pub taxi_count: u32,
}

/// Join-complete row for one grid cell at one timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridObservation {
    pub grid_num: u32,
    pub timestamp: NaiveDateTime,
    pub taxi_count: u32,
    pub rainfall: Option<f64>,
    pub air_temperature: Option<f64>,
    pub relative_humidity: Option<f64>,
    pub rainfall_station_id: Option<String>,
    pub air_temperature_station_id: Option<String>,
    pub relative_humidity_station_id: Option<String>,
}

impl GridObservation {
    pub fn new(grid_num: u32, timestamp: NaiveDateTime, taxi_count: u32) -> Self {
        Self {
            grid_num,
            timestamp,
            taxi_count,
            rainfall: None,
            air_temperature: None,
            relative_humidity: None,
            rainfall_station_id: None,
            air_temperature_station_id: None,
            relative_humidity_station_id: None,
        }
    }

    pub fn builder() -> GridObservationBuilder {
        GridObservationBuilder::new()
    }

    pub fn value(&self, measure: Measure) -> Option<f64> {
        match measure {
            Measure::Rainfall => self.rainfall,
            Measure::AirTemperature => self.air_temperature,
            Measure::RelativeHumidity => self.relative_humidity,
        }
    }

    pub fn station_id(&self, measure: Measure) -> Option<&str> {
        match measure {
            Measure::Rainfall => self.rainfall_station_id.as_deref(),
            Measure::AirTemperature => self.air_temperature_station_id.as_deref(),
            Measure::RelativeHumidity => self.relative_humidity_station_id.as_deref(),
        }
    }

    pub fn set_reading(&mut self, measure: Measure, reading: Option<&ResolvedReading>) {
        let value = reading.map(|r| r.value);
        let station = reading.map(|r| r.station_id.clone());
        match measure {
            Measure::Rainfall => {
                self.rainfall = value;
                self.rainfall_station_id = station;
            }
            Measure::AirTemperature => {
                self.air_temperature = value;
                self.air_temperature_station_id = station;
            }
            Measure::RelativeHumidity => {
                self.relative_humidity = value;
                self.relative_humidity_station_id = station;
            }
        }
    }

    pub fn has_complete_weather(&self) -> bool {
        Measure::ALL.iter().all(|m| self.value(*m).is_some())
    }

    /// Warehouse row key; duplicate appends of the same key are the same row.
    pub fn key(&self) -> (u32, NaiveDateTime) {
        (self.grid_num, self.timestamp)
    }
}

pub struct GridObservationBuilder {
    grid_num: Option<u32>,
    timestamp: Option<NaiveDateTime>,
    taxi_count: u32,
    readings: Vec<(Measure, Option<ResolvedReading>)>,
}

impl Default for GridObservationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GridObservationBuilder {
    pub fn new() -> Self {
        Self {
            grid_num: None,
            timestamp: None,
            taxi_count: 0,
            readings: Vec::new(),
        }
    }

    pub fn grid_num(mut self, grid_num: u32) -> Self {
        self.grid_num = Some(grid_num);
        self
    }

    pub fn timestamp(mut self, timestamp: Option<NaiveDateTime>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn taxi_count(mut self, count: u32) -> Self {
        self.taxi_count = count;
        self
    }

    pub fn reading(mut self, measure: Measure, reading: Option<ResolvedReading>) -> Self {
        self.readings.push((measure, reading));
        self
    }

    /// Builds the row, filling a missing timestamp from `fallback`.
    pub fn build_with_fallback(self, fallback: NaiveDateTime) -> Result<GridObservation> {
        let timestamp = self.timestamp.unwrap_or(fallback);
        self.timestamp(Some(timestamp)).build()
    }

    pub fn build(self) -> Result<GridObservation> {
        let grid_num = self
            .grid_num
            .ok_or_else(|| ProcessingError::MissingData("grid_num".to_string()))?;
        let timestamp = self
            .timestamp
            .ok_or_else(|| ProcessingError::MissingData("timestamp".to_string()))?;

        let mut observation = GridObservation::new(grid_num, timestamp, self.taxi_count);
        for (measure, reading) in &self.readings {
            observation.set_reading(*measure, reading.as_ref());
        }
        Ok(observation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 6, 1)
            .unwrap()
            .and_hms_opt(13, 15, 0)
            .unwrap()
    }

    #[test]
    fn test_builder_pattern() {
        let reading = ResolvedReading {
            station_id: "S24".to_string(),
            rank: 1,
            value: 0.2,
            timestamp: ts(),
        };

        let row = GridObservation::builder()
            .grid_num(42)
            .timestamp(Some(ts()))
            .taxi_count(3)
            .reading(Measure::Rainfall, Some(reading))
            .reading(Measure::AirTemperature, None)
            .build()
            .unwrap();

        assert_eq!(row.grid_num, 42);
        assert_eq!(row.taxi_count, 3);
        assert_eq!(row.rainfall, Some(0.2));
        assert_eq!(row.station_id(Measure::Rainfall), Some("S24"));
        assert_eq!(row.air_temperature, None);
        assert!(!row.has_complete_weather());
    }

    #[test]
    fn test_builder_requires_grid_num() {
        let result = GridObservation::builder().timestamp(Some(ts())).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_timestamp_fallback() {
        let row = GridObservation::builder()
            .grid_num(5)
            .build_with_fallback(ts())
            .unwrap();
        assert_eq!(row.timestamp, ts());
        assert_eq!(row.key(), (5, ts()));
    }
}

use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};
use validator::Validate;

use crate::error::{ProcessingError, Result};
use crate::models::{Measure, Station, StationObservation, StationRecord};
use crate::utils::time::parse_timestamp;

#[derive(Debug, Deserialize)]
struct RawWeatherSnapshot {
    metadata: RawMetadata,
    items: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    stations: Vec<RawStation>,
    #[serde(default)]
    reading_type: String,
    #[serde(default)]
    reading_unit: String,
}

#[derive(Debug, Deserialize)]
struct RawStation {
    id: String,
    #[serde(default)]
    name: String,
    location: RawLocation,
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    timestamp: String,
    readings: Vec<RawReading>,
}

#[derive(Debug, Deserialize)]
struct RawReading {
    station_id: String,
    value: Option<f64>,
}

/// One parsed NEA snapshot for a single measure.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSnapshot {
    pub measure: Measure,
    pub timestamp: NaiveDateTime,
    pub reading_type: String,
    pub reading_unit: String,
    pub stations: Vec<Station>,
    pub observations: Vec<StationObservation>,
}

impl WeatherSnapshot {
    /// Rows for the `<measure>-metadata` table.
    pub fn station_records(&self) -> Vec<StationRecord> {
        self.stations
            .iter()
            .map(|station| StationRecord {
                timestamp: self.timestamp,
                measure: self.measure,
                station: station.clone(),
                reading_type: self.reading_type.clone(),
                reading_unit: self.reading_unit.clone(),
            })
            .collect()
    }
}

/// Parses NEA realtime weather payloads for one measure.
pub struct WeatherParser {
    measure: Measure,
}

impl WeatherParser {
    pub fn new(measure: Measure) -> Self {
        Self { measure }
    }

    pub fn measure(&self) -> Measure {
        self.measure
    }

    pub fn parse_bytes(&self, source_name: &str, bytes: &[u8]) -> Result<WeatherSnapshot> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| ProcessingError::malformed(source_name, e.to_string()))?;
        self.parse(source_name, &value)
    }

    /// Stations with out-of-range coordinates are dropped; readings with a null
    /// value or an unknown station produce no observation.
    pub fn parse(&self, source_name: &str, value: &Value) -> Result<WeatherSnapshot> {
        let raw = RawWeatherSnapshot::deserialize(value)
            .map_err(|e| ProcessingError::malformed(source_name, e.to_string()))?;

        let item = raw
            .items
            .into_iter()
            .next()
            .ok_or_else(|| ProcessingError::malformed(source_name, "no items"))?;
        let timestamp = parse_timestamp(&item.timestamp)
            .map_err(|e| ProcessingError::malformed(source_name, e.to_string()))?;

        let mut stations = Vec::with_capacity(raw.metadata.stations.len());
        for raw_station in raw.metadata.stations {
            let station = Station::new(
                raw_station.id,
                raw_station.name,
                raw_station.location.latitude,
                raw_station.location.longitude,
            );
            if let Err(e) = station.validate() {
                warn!(
                    source = source_name,
                    station = %station.station_id,
                    "Skipping station with invalid location: {}",
                    e
                );
                continue;
            }
            stations.push(station);
        }

        let by_id: HashMap<&str, &Station> = stations
            .iter()
            .map(|s| (s.station_id.as_str(), s))
            .collect();

        let mut observations = Vec::with_capacity(item.readings.len());
        for reading in &item.readings {
            let Some(value) = reading.value else {
                continue;
            };
            match by_id.get(reading.station_id.as_str()) {
                Some(station) => observations.push(StationObservation::new(
                    station,
                    timestamp,
                    value,
                    self.measure,
                )),
                None => debug!(
                    source = source_name,
                    station = %reading.station_id,
                    "Reading for station without metadata"
                ),
            }
        }

        Ok(WeatherSnapshot {
            measure: self.measure,
            timestamp,
            reading_type: raw.metadata.reading_type,
            reading_unit: raw.metadata.reading_unit,
            stations,
            observations,
        })
    }
}

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::Measure;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Station {
    #[validate(length(min = 1))]
    pub station_id: String,

    pub name: String,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
}

impl Station {
    pub fn new(station_id: String, name: String, latitude: f64, longitude: f64) -> Self {
        Self {
            station_id,
            name,
            latitude,
            longitude,
        }
    }

    pub fn location(&self) -> (f64, f64) {
        (self.longitude, self.latitude)
    }
}

/// Metadata row as stored in the `<measure>-metadata` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRecord {
    pub timestamp: NaiveDateTime,
    pub measure: Measure,
    pub station: Station,
    pub reading_type: String,
    pub reading_unit: String,
}

/// One reading of one measure at one station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationObservation {
    pub station_id: String,
    pub longitude: f64,
    pub latitude: f64,
    pub timestamp: NaiveDateTime,
    pub value: f64,
    pub measure: Measure,
}

impl StationObservation {
    pub fn new(
        station: &Station,
        timestamp: NaiveDateTime,
        value: f64,
        measure: Measure,
    ) -> Self {
        Self {
            station_id: station.station_id.clone(),
            longitude: station.longitude,
            latitude: station.latitude,
            timestamp,
            value,
            measure,
        }
    }
}

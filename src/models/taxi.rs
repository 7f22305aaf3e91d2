use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One available taxi in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaxiFix {
    pub longitude: f64,
    pub latitude: f64,
    pub timestamp: NaiveDateTime,
}

impl TaxiFix {
    pub fn new(longitude: f64, latitude: f64, timestamp: NaiveDateTime) -> Self {
        Self {
            longitude,
            latitude,
            timestamp,
        }
    }
}

/// All fixes of one taxi-availability snapshot; every fix shares the snapshot timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxiSnapshot {
    pub timestamp: NaiveDateTime,
    pub fixes: Vec<TaxiFix>,
}

impl TaxiSnapshot {
    pub fn from_coordinates(timestamp: NaiveDateTime, coordinates: &[(f64, f64)]) -> Self {
        let fixes = coordinates
            .iter()
            .map(|&(lon, lat)| TaxiFix::new(lon, lat, timestamp))
            .collect();
        Self { timestamp, fixes }
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }
}

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ProcessingError, Result};
use crate::models::TaxiSnapshot;
use crate::utils::time::parse_timestamp;

#[derive(Debug, Deserialize)]
struct RawFeatureCollection {
    features: Vec<RawFeature>,
}

#[derive(Debug, Deserialize)]
struct RawFeature {
    geometry: RawMultiPoint,
    properties: RawProperties,
}

#[derive(Debug, Deserialize)]
struct RawMultiPoint {
    coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct RawProperties {
    timestamp: String,
}

/// Parses LTA taxi-availability GeoJSON into a snapshot of fixes.
#[derive(Debug, Default)]
pub struct TaxiParser;

impl TaxiParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_bytes(&self, source_name: &str, bytes: &[u8]) -> Result<TaxiSnapshot> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| ProcessingError::malformed(source_name, e.to_string()))?;
        self.parse(source_name, &value)
    }

    /// Only the first feature is read; it carries every available taxi.
    pub fn parse(&self, source_name: &str, value: &Value) -> Result<TaxiSnapshot> {
        let raw = RawFeatureCollection::deserialize(value)
            .map_err(|e| ProcessingError::malformed(source_name, e.to_string()))?;

        let feature = raw
            .features
            .into_iter()
            .next()
            .ok_or_else(|| ProcessingError::malformed(source_name, "no features"))?;
        let timestamp = parse_timestamp(&feature.properties.timestamp)
            .map_err(|e| ProcessingError::malformed(source_name, e.to_string()))?;

        let coordinates: Vec<(f64, f64)> = feature
            .geometry
            .coordinates
            .iter()
            .map(|c| (c[0], c[1]))
            .collect();

        Ok(TaxiSnapshot::from_coordinates(timestamp, &coordinates))
    }
}

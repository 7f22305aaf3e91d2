use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ProcessingError;
use crate::utils::constants::TAXI_PREFIX;

/// Weather measures published by the NEA realtime API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Measure {
    Rainfall,
    AirTemperature,
    RelativeHumidity,
}

impl Measure {
    pub const ALL: [Measure; 3] = [
        Measure::Rainfall,
        Measure::AirTemperature,
        Measure::RelativeHumidity,
    ];

    /// Name used by the API endpoint and the object store prefix.
    pub fn api_name(&self) -> &'static str {
        match self {
            Measure::Rainfall => "rainfall",
            Measure::AirTemperature => "air-temperature",
            Measure::RelativeHumidity => "relative-humidity",
        }
    }

    pub fn from_api_name(name: &str) -> Option<Self> {
        match name {
            "rainfall" => Some(Measure::Rainfall),
            "air-temperature" => Some(Measure::AirTemperature),
            "relative-humidity" => Some(Measure::RelativeHumidity),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Measure::Rainfall => "Rainfall",
            Measure::AirTemperature => "Air Temperature",
            Measure::RelativeHumidity => "Relative Humidity",
        }
    }

    pub fn units(&self) -> &'static str {
        match self {
            Measure::Rainfall => "mm",
            Measure::AirTemperature => "deg C",
            Measure::RelativeHumidity => "percentage",
        }
    }

    pub fn items_table(&self) -> String {
        format!("{}-items", self.api_name())
    }

    pub fn metadata_table(&self) -> String {
        format!("{}-metadata", self.api_name())
    }
}

impl std::fmt::Display for Measure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.api_name())
    }
}

impl FromStr for Measure {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Measure::from_api_name(s.trim())
            .ok_or_else(|| ProcessingError::InvalidFormat(format!("Unknown measure: '{}'", s)))
    }
}

/// A fetchable snapshot domain: one weather measure or the taxi feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataDomain {
    Weather(Measure),
    TaxiAvailability,
}

impl DataDomain {
    pub fn all() -> Vec<DataDomain> {
        let mut domains: Vec<DataDomain> = Measure::ALL.iter().map(|m| DataDomain::Weather(*m)).collect();
        domains.push(DataDomain::TaxiAvailability);
        domains
    }

    /// Path of the endpoint relative to the API base URL.
    pub fn endpoint(&self) -> String {
        match self {
            DataDomain::Weather(measure) => format!("environment/{}", measure.api_name()),
            DataDomain::TaxiAvailability => "transport/taxi-availability".to_string(),
        }
    }

    /// Object store prefix for raw snapshots of this domain.
    pub fn store_prefix(&self) -> &'static str {
        match self {
            DataDomain::Weather(measure) => measure.api_name(),
            DataDomain::TaxiAvailability => TAXI_PREFIX,
        }
    }
}

impl std::fmt::Display for DataDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataDomain::Weather(measure) => write!(f, "{}", measure),
            DataDomain::TaxiAvailability => write!(f, "taxi-availability"),
        }
    }
}

impl FromStr for DataDomain {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "taxi-availability" | "taxis" => Ok(DataDomain::TaxiAvailability),
            other => other.parse::<Measure>().map(DataDomain::Weather),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_names() {
        assert_eq!(Measure::AirTemperature.api_name(), "air-temperature");
        assert_eq!(Measure::RelativeHumidity.items_table(), "relative-humidity-items");
        assert_eq!(Measure::Rainfall.metadata_table(), "rainfall-metadata");
        assert_eq!(Measure::from_api_name("rainfall"), Some(Measure::Rainfall));
        assert_eq!(Measure::from_api_name("wind-speed"), None);
    }

    #[test]
    fn test_domain_parsing() {
        assert_eq!(
            "taxis".parse::<DataDomain>().unwrap(),
            DataDomain::TaxiAvailability
        );
        assert_eq!(
            "relative-humidity".parse::<DataDomain>().unwrap(),
            DataDomain::Weather(Measure::RelativeHumidity)
        );
        assert!("pm25".parse::<DataDomain>().is_err());
        assert_eq!(DataDomain::all().len(), 4);
    }

    #[test]
    fn test_domain_endpoints() {
        assert_eq!(
            DataDomain::Weather(Measure::Rainfall).endpoint(),
            "environment/rainfall"
        );
        assert_eq!(
            DataDomain::TaxiAvailability.endpoint(),
            "transport/taxi-availability"
        );
        assert_eq!(DataDomain::TaxiAvailability.store_prefix(), "taxis");
    }
}

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clients::{FeatureVector, Predictor};
use crate::error::Result;
use crate::grid::GridIndex;
use crate::models::GridObservation;
use crate::utils::constants::{
    DEFAULT_STEP_MINUTES, FAIR_AVAILABILITY_ABOVE, GOOD_AVAILABILITY_ABOVE,
    INVALID_COORDINATES_MESSAGE, PREDICTION_HORIZON_MINUTES,
};
use crate::utils::coordinates::within_singapore;
use crate::utils::time::round_down;
use crate::writers::ParquetWarehouse;

/// Access to merged rows by cell and timestamp.
pub trait ObservationLookup: Send + Sync {
    fn observation(&self, grid_num: u32, timestamp: NaiveDateTime) -> Result<Option<GridObservation>>;
}

impl ObservationLookup for Vec<GridObservation> {
    fn observation(&self, grid_num: u32, timestamp: NaiveDateTime) -> Result<Option<GridObservation>> {
        Ok(self
            .iter()
            .rev()
            .find(|r| r.grid_num == grid_num && r.timestamp == timestamp)
            .cloned())
    }
}

impl ObservationLookup for ParquetWarehouse {
    fn observation(&self, grid_num: u32, timestamp: NaiveDateTime) -> Result<Option<GridObservation>> {
        Ok(self
            .read_grid_observations()?
            .into_iter()
            .find(|r| r.grid_num == grid_num && r.timestamp == timestamp))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Availability {
    Good,
    Fair,
    Poor,
}

impl Availability {
    pub fn classify(predicted: i64) -> Self {
        let predicted = predicted as f64;
        if predicted > GOOD_AVAILABILITY_ABOVE {
            Availability::Good
        } else if predicted > FAIR_AVAILABILITY_ABOVE {
            Availability::Fair
        } else {
            Availability::Poor
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Availability::Good => write!(f, "Good"),
            Availability::Fair => write!(f, "Fair"),
            Availability::Poor => write!(f, "Poor"),
        }
    }
}

/// Booking advice for one location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Advice {
    Prediction {
        grid_num: u32,
        timestamp: NaiveDateTime,
        current: u32,
        predicted: i64,
        availability: Availability,
        recommendation: String,
    },
    InvalidCoordinates,
}

impl Advice {
    pub fn message(&self) -> String {
        match self {
            Advice::Prediction {
                predicted,
                availability,
                recommendation,
                ..
            } => format!(
                "Predicted taxis in {} minutes is [{}]: Availability is [{}]. Recommendation: [{}]",
                PREDICTION_HORIZON_MINUTES, predicted, availability, recommendation
            ),
            Advice::InvalidCoordinates => INVALID_COORDINATES_MESSAGE.to_string(),
        }
    }
}

/// Percentage change from `current` to `predicted`; undefined for no current taxis.
fn change_percent(current: u32, predicted: i64) -> Option<f64> {
    (current > 0).then(|| 100.0 * (predicted as f64 / current as f64 - 1.0))
}

pub fn recommendation(current: u32, predicted: i64) -> String {
    let change = change_percent(current, predicted);
    let current_i = current as i64;

    if predicted > current_i && current as f64 <= FAIR_AVAILABILITY_ABOVE {
        match change {
            Some(pct) => format!("Book later as taxi availability will improve by [{:.2}]%", pct),
            None => "Book later as taxi availability will improve".to_string(),
        }
    } else if predicted < current_i {
        // current > predicted >= 0, so the percentage is defined
        format!(
            "Book now as taxi availability may worsen by [{:.2}]%",
            change.unwrap_or(-100.0)
        )
    } else {
        "Book now as difference may not be substantial".to_string()
    }
}

/// Serves prediction lookups against merged observations.
pub struct TaxiAdvisor {
    index: GridIndex,
    observations: Arc<dyn ObservationLookup>,
    predictor: Arc<dyn Predictor>,
    step_minutes: i64,
}

impl TaxiAdvisor {
    pub fn new(
        index: GridIndex,
        observations: Arc<dyn ObservationLookup>,
        predictor: Arc<dyn Predictor>,
    ) -> Self {
        Self {
            index,
            observations,
            predictor,
            step_minutes: DEFAULT_STEP_MINUTES,
        }
    }

    pub fn with_step_minutes(mut self, step_minutes: i64) -> Self {
        self.step_minutes = step_minutes.max(1);
        self
    }

    /// Unmappable coordinates and cells without a merged row give
    /// [`Advice::InvalidCoordinates`]; predictor and store failures are errors.
    pub async fn advise(&self, longitude: f64, latitude: f64, now: NaiveDateTime) -> Result<Advice> {
        let timestamp = round_down(now, self.step_minutes);

        let located = within_singapore(longitude, latitude)
            .then(|| self.index.locate(longitude, latitude).grid_num())
            .flatten();
        let Some(grid_num) = located else {
            info!(longitude, latitude, "Coordinates outside the grid");
            return Ok(Advice::InvalidCoordinates);
        };

        let Some(row) = self.observations.observation(grid_num, timestamp)? else {
            info!(grid_num, timestamp = %timestamp, "No merged observation for cell");
            return Ok(Advice::InvalidCoordinates);
        };

        let features = FeatureVector::from_observation(&row);
        let prediction = self.predictor.predict(&features).await?;
        let predicted = prediction.trunc().max(0.0) as i64;
        debug!(grid_num, prediction, predicted, current = row.taxi_count, "Prediction received");

        Ok(Advice::Prediction {
            grid_num,
            timestamp,
            current: row.taxi_count,
            predicted,
            availability: Availability::classify(predicted),
            recommendation: recommendation(row.taxi_count, predicted),
        })
    }
}

use async_trait::async_trait;
use chrono::{Datelike, NaiveDateTime, Timelike};
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use std::f64::consts::PI;
use std::time::Duration;
use tracing::debug;

use crate::config::PredictorConfig;
use crate::error::{ProcessingError, Result};
use crate::models::GridObservation;

/// Model input for one grid cell at one timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    pub taxi_count: f64,
    pub air_temperature: Option<f64>,
    pub rainfall: Option<f64>,
    pub relative_humidity: Option<f64>,
    pub sin_day: f64,
    pub cos_day: f64,
    pub sin_hour: f64,
    pub cos_hour: f64,
    pub sin_mth: f64,
    pub cos_mth: f64,
}

fn cyclic(value: f64, period: f64) -> (f64, f64) {
    let angle = value / period * 2.0 * PI;
    (angle.sin(), angle.cos())
}

impl FeatureVector {
    pub fn from_observation(row: &GridObservation) -> Self {
        let [sin_day, cos_day, sin_hour, cos_hour, sin_mth, cos_mth] =
            Self::timestamp_features(row.timestamp);

        Self {
            taxi_count: row.taxi_count as f64,
            air_temperature: row.air_temperature,
            rainfall: row.rainfall,
            relative_humidity: row.relative_humidity,
            sin_day,
            cos_day,
            sin_hour,
            cos_hour,
            sin_mth,
            cos_mth,
        }
    }

    /// Weekday (Monday = 0), hour and month (1..=12) as sin/cos pairs.
    pub fn timestamp_features(timestamp: NaiveDateTime) -> [f64; 6] {
        let (sin_day, cos_day) = cyclic(timestamp.weekday().num_days_from_monday() as f64, 7.0);
        let (sin_hour, cos_hour) = cyclic(timestamp.hour() as f64, 24.0);
        let (sin_mth, cos_mth) = cyclic(timestamp.month() as f64, 12.0);
        [sin_day, cos_day, sin_hour, cos_hour, sin_mth, cos_mth]
    }

    /// One prediction instance: every feature as a single-element column.
    pub fn to_instance(&self) -> Value {
        json!({
            "taxi_count": [self.taxi_count],
            "air_temperature": [self.air_temperature],
            "rainfall": [self.rainfall],
            "relative_humidity": [self.relative_humidity],
            "sin_day": [self.sin_day],
            "cos_day": [self.cos_day],
            "sin_hour": [self.sin_hour],
            "cos_hour": [self.cos_hour],
            "sin_mth": [self.sin_mth],
            "cos_mth": [self.cos_mth]
        })
    }
}

/// Remote model returning the taxi count expected in thirty minutes.
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, features: &FeatureVector) -> Result<f64>;
}

/// Posts `{"instances": [...]}` to a prediction endpoint.
#[derive(Debug, Clone)]
pub struct HttpPredictor {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpPredictor {
    pub fn new(config: &PredictorConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| ProcessingError::Config("predictor.endpoint is not set".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProcessingError::Http {
                url: endpoint.clone(),
                source: e,
            })?;

        Ok(Self {
            client,
            endpoint,
            token: config.token.clone(),
        })
    }
}

/// Reads `predictions[0][0]`, or `predictions[0]` for scalar outputs.
pub fn parse_prediction(response: &Value) -> Result<f64> {
    let first = response
        .get("predictions")
        .and_then(|p| p.get(0))
        .ok_or_else(|| ProcessingError::malformed("prediction", "no predictions"))?;

    first
        .as_f64()
        .or_else(|| first.get(0).and_then(Value::as_f64))
        .ok_or_else(|| ProcessingError::malformed("prediction", format!("not a number: {}", first)))
}

#[async_trait]
impl Predictor for HttpPredictor {
    async fn predict(&self, features: &FeatureVector) -> Result<f64> {
        let body = json!({ "instances": [features.to_instance()] });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| ProcessingError::Http {
            url: self.endpoint.clone(),
            source: e,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProcessingError::HttpStatus {
                url: self.endpoint.clone(),
                status,
            });
        }

        let value: Value = response.json().await.map_err(|e| ProcessingError::Http {
            url: self.endpoint.clone(),
            source: e,
        })?;
        let prediction = parse_prediction(&value)?;
        debug!(prediction, "Received prediction");
        Ok(prediction)
    }
}

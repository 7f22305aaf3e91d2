pub mod data_api;
pub mod predictor;

pub use data_api::{DataApiClient, GovDataClient};
pub use predictor::{parse_prediction, FeatureVector, HttpPredictor, Predictor};

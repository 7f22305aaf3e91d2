use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::ApiConfig;
use crate::error::{ProcessingError, Result};
use crate::models::DataDomain;
use crate::utils::constants::API_TIMESTAMP_FORMAT;

/// Source of raw provider snapshots.
#[async_trait]
pub trait DataApiClient: Send + Sync {
    /// Raw JSON for one domain at one (SGT) timestamp. Non-2xx and non-JSON
    /// responses are errors.
    async fn fetch(&self, domain: DataDomain, timestamp: NaiveDateTime) -> Result<Value>;
}

/// Client for the data.gov.sg realtime endpoints.
#[derive(Debug, Clone)]
pub struct GovDataClient {
    client: Client,
    base_url: String,
}

impl GovDataClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProcessingError::Http {
                url: config.base_url.clone(),
                source: e,
            })?;

        let mut base_url = config.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self { client, base_url })
    }

    pub fn endpoint_url(&self, domain: DataDomain) -> String {
        format!("{}{}", self.base_url, domain.endpoint())
    }
}

#[async_trait]
impl DataApiClient for GovDataClient {
    #[instrument(skip(self), fields(domain = %domain))]
    async fn fetch(&self, domain: DataDomain, timestamp: NaiveDateTime) -> Result<Value> {
        let url = self.endpoint_url(domain);
        let date_time = timestamp.format(API_TIMESTAMP_FORMAT).to_string();
        debug!("Fetching {} at {}", url, date_time);

        let response = self
            .client
            .get(&url)
            .query(&[("date_time", date_time.as_str())])
            .send()
            .await
            .map_err(|e| ProcessingError::Http {
                url: url.clone(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("HTTP {} for {}", status, url);
            return Err(ProcessingError::HttpStatus { url, status });
        }

        let body = response.bytes().await.map_err(|e| ProcessingError::Http {
            url: url.clone(),
            source: e,
        })?;
        serde_json::from_slice(&body).map_err(|e| ProcessingError::malformed(url, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Measure;

    #[test]
    fn test_endpoint_urls() {
        let client = GovDataClient::new(&ApiConfig {
            base_url: "https://api.data.gov.sg/v1".to_string(),
            timeout_secs: 5,
        })
        .unwrap();

        assert_eq!(
            client.endpoint_url(DataDomain::Weather(Measure::RelativeHumidity)),
            "https://api.data.gov.sg/v1/environment/relative-humidity"
        );
        assert_eq!(
            client.endpoint_url(DataDomain::TaxiAvailability),
            "https://api.data.gov.sg/v1/transport/taxi-availability"
        );
    }
}

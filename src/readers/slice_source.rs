use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clients::DataApiClient;
use crate::error::{ProcessingError, Result};
use crate::models::{DataDomain, Measure, TaxiSnapshot};
use crate::readers::snapshot_store::SnapshotStore;
use crate::readers::taxi_parser::TaxiParser;
use crate::readers::weather_parser::{WeatherParser, WeatherSnapshot};
use crate::utils::filename::timestamp_from_path;

/// Parsed snapshots for a requested timestamp.
#[async_trait]
pub trait SliceSource: Send + Sync {
    async fn taxi_snapshot(&self, timestamp: NaiveDateTime) -> Result<TaxiSnapshot>;

    async fn weather_snapshot(&self, measure: Measure, timestamp: NaiveDateTime) -> Result<WeatherSnapshot>;
}

/// Fetches live snapshots from the provider API, optionally archiving the raw
/// payloads as they arrive.
pub struct ApiSliceSource {
    client: Arc<dyn DataApiClient>,
    archive: Option<SnapshotStore>,
}

impl ApiSliceSource {
    pub fn new(client: Arc<dyn DataApiClient>) -> Self {
        Self { client, archive: None }
    }

    pub fn with_archive(mut self, store: SnapshotStore) -> Self {
        self.archive = Some(store);
        self
    }

    async fn fetch(&self, domain: DataDomain, timestamp: NaiveDateTime) -> Result<(String, Value)> {
        let value = self.client.fetch(domain, timestamp).await?;
        let source_name = format!("{}@{}", domain, timestamp);

        if let Some(store) = &self.archive {
            // Archive failures do not invalidate a payload already in hand.
            if let Err(e) = store.put_snapshot(domain, timestamp, &value).await {
                warn!("Failed to archive {}: {}", source_name, e);
            }
        }

        Ok((source_name, value))
    }
}

#[async_trait]
impl SliceSource for ApiSliceSource {
    async fn taxi_snapshot(&self, timestamp: NaiveDateTime) -> Result<TaxiSnapshot> {
        let (source_name, value) = self.fetch(DataDomain::TaxiAvailability, timestamp).await?;
        TaxiParser::new().parse(&source_name, &value)
    }

    async fn weather_snapshot(&self, measure: Measure, timestamp: NaiveDateTime) -> Result<WeatherSnapshot> {
        let (source_name, value) = self.fetch(DataDomain::Weather(measure), timestamp).await?;
        WeatherParser::new(measure).parse(&source_name, &value)
    }
}

/// Replays archived snapshots. For a requested timestamp, uses the latest
/// snapshot at or before it, no older than `tolerance`.
pub struct StoreSliceSource {
    store: SnapshotStore,
    tolerance: Duration,
}

impl StoreSliceSource {
    pub fn new(store: SnapshotStore, tolerance: Duration) -> Self {
        Self { store, tolerance }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub async fn resolve_path(&self, domain: DataDomain, timestamp: NaiveDateTime) -> Result<String> {
        let paths = self.store.list_domain(domain).await?;

        let candidate = paths
            .iter()
            .filter_map(|p| timestamp_from_path(p).ok().map(|ts| (ts, p)))
            .filter(|(ts, _)| *ts <= timestamp && timestamp - *ts < self.tolerance)
            .max_by_key(|(ts, _)| *ts);

        match candidate {
            Some((_, path)) => {
                debug!(domain = %domain, requested = %timestamp, path = %path, "Resolved snapshot");
                Ok(path.clone())
            }
            None => Err(ProcessingError::MissingData(format!(
                "No {} snapshot within {} minutes before {}",
                domain,
                self.tolerance.num_minutes(),
                timestamp
            ))),
        }
    }
}

#[async_trait]
impl SliceSource for StoreSliceSource {
    async fn taxi_snapshot(&self, timestamp: NaiveDateTime) -> Result<TaxiSnapshot> {
        let path = self.resolve_path(DataDomain::TaxiAvailability, timestamp).await?;
        let bytes = self.store.read_bytes(&path).await?;
        TaxiParser::new().parse_bytes(&path, &bytes)
    }

    async fn weather_snapshot(&self, measure: Measure, timestamp: NaiveDateTime) -> Result<WeatherSnapshot> {
        let path = self.resolve_path(DataDomain::Weather(measure), timestamp).await?;
        let bytes = self.store.read_bytes(&path).await?;
        WeatherParser::new(measure).parse_bytes(&path, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::sync::Mutex;

    fn ts(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 5, 24)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn taxi_payload(timestamp: &str) -> Value {
        json!({
            "features": [{
                "geometry": {"coordinates": [[103.85, 1.3], [103.86, 1.31]]},
                "properties": {"timestamp": timestamp}
            }]
        })
    }

    #[tokio::test]
    async fn test_store_source_picks_latest_within_tolerance() {
        let store = SnapshotStore::in_memory();
        store
            .put_snapshot(DataDomain::TaxiAvailability, ts(9, 0), &taxi_payload("2022-05-24T09:00:00+08:00"))
            .await
            .unwrap();
        store
            .put_snapshot(DataDomain::TaxiAvailability, ts(9, 10), &taxi_payload("2022-05-24T09:10:00+08:00"))
            .await
            .unwrap();

        let source = StoreSliceSource::new(store, Duration::minutes(15));
        let snapshot = source.taxi_snapshot(ts(9, 14)).await.unwrap();
        assert_eq!(snapshot.timestamp, ts(9, 10));
        assert_eq!(snapshot.len(), 2);

        let missing = source.taxi_snapshot(ts(9, 30)).await;
        assert!(matches!(missing, Err(ProcessingError::MissingData(_))));
        let before_any = source.taxi_snapshot(ts(8, 59)).await;
        assert!(before_any.is_err());
    }

    struct FixedClient {
        calls: Mutex<Vec<DataDomain>>,
    }

    #[async_trait]
    impl DataApiClient for FixedClient {
        async fn fetch(&self, domain: DataDomain, _timestamp: NaiveDateTime) -> Result<Value> {
            self.calls.lock().unwrap().push(domain);
            Ok(taxi_payload("2022-05-24T09:00:00+08:00"))
        }
    }

    #[tokio::test]
    async fn test_api_source_archives_payloads() {
        let client = Arc::new(FixedClient { calls: Mutex::new(Vec::new()) });
        let archive = SnapshotStore::in_memory();
        let source = ApiSliceSource::new(client.clone()).with_archive(archive.clone());

        let snapshot = source.taxi_snapshot(ts(9, 0)).await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(client.calls.lock().unwrap().as_slice(), &[DataDomain::TaxiAvailability]);
        assert_eq!(archive.list_domain(DataDomain::TaxiAvailability).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_api_source_surfaces_parse_errors() {
        let client = Arc::new(FixedClient { calls: Mutex::new(Vec::new()) });
        let source = ApiSliceSource::new(client);
        let result = source.weather_snapshot(Measure::Rainfall, ts(9, 0)).await;
        assert!(matches!(result, Err(ProcessingError::MalformedSnapshot { .. })));
    }
}

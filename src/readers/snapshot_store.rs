use bytes::Bytes;
use futures::TryStreamExt;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::ObjectStore;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::config::{StoreBackend, StoreConfig};
use crate::error::{ProcessingError, Result};
use crate::models::DataDomain;
use crate::utils::filename::{select_window, snapshot_path};

/// Raw snapshot storage; the backend (local directory, GCS bucket, memory) is
/// chosen once at construction.
#[derive(Clone)]
pub struct SnapshotStore {
    store: Arc<dyn ObjectStore>,
    description: String,
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("backend", &self.description)
            .finish()
    }
}

impl SnapshotStore {
    pub fn new(store: Arc<dyn ObjectStore>, description: impl Into<String>) -> Self {
        Self {
            store,
            description: description.into(),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        match config.backend {
            StoreBackend::Local => {
                std::fs::create_dir_all(&config.root)?;
                let store = LocalFileSystem::new_with_prefix(&config.root)?;
                Ok(Self::new(
                    Arc::new(store),
                    format!("local:{}", config.root.display()),
                ))
            }
            StoreBackend::Gcs => {
                let bucket = config.bucket.as_deref().ok_or_else(|| {
                    ProcessingError::Config("store.bucket is required for the gcs backend".to_string())
                })?;
                let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);
                if let Some(path) = &config.service_account_path {
                    builder = builder.with_service_account_path(path.to_string_lossy());
                }
                Ok(Self::new(Arc::new(builder.build()?), format!("gs://{}", bucket)))
            }
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), "memory")
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    #[instrument(skip(self), fields(store = %self.description))]
    pub async fn read_bytes(&self, path: &str) -> Result<Bytes> {
        let location = Path::from(path);
        let bytes = self.store.get(&location).await?.bytes().await?;
        debug!(size = bytes.len(), "Read snapshot");
        Ok(bytes)
    }

    pub async fn read_json(&self, path: &str) -> Result<Value> {
        let bytes = self.read_bytes(path).await?;
        serde_json::from_slice(&bytes).map_err(|e| ProcessingError::malformed(path, e.to_string()))
    }

    #[instrument(skip(self, data), fields(store = %self.description))]
    pub async fn write_bytes(&self, path: &str, data: Bytes) -> Result<()> {
        let location = Path::from(path);
        debug!(size = data.len(), "Writing snapshot");
        self.store.put(&location, data.into()).await?;
        Ok(())
    }

    pub async fn write_json(&self, path: &str, value: &Value) -> Result<()> {
        let data = serde_json::to_vec(value)?;
        self.write_bytes(path, Bytes::from(data)).await
    }

    /// Stores a raw payload under its canonical snapshot path and returns that path.
    pub async fn put_snapshot(
        &self,
        domain: DataDomain,
        timestamp: chrono::NaiveDateTime,
        value: &Value,
    ) -> Result<String> {
        let path = snapshot_path(domain, timestamp);
        self.write_json(&path, value).await?;
        Ok(path)
    }

    /// All object paths under `prefix`, sorted.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix_path = Path::from(prefix);
        let mut paths = Vec::new();

        let mut stream = self.store.list(Some(&prefix_path));
        while let Some(meta) = stream.try_next().await? {
            paths.push(meta.location.to_string());
        }

        paths.sort();
        Ok(paths)
    }

    pub async fn list_domain(&self, domain: DataDomain) -> Result<Vec<String>> {
        self.list(domain.store_prefix()).await
    }

    pub async fn latest(&self, domain: DataDomain) -> Result<Option<String>> {
        Ok(self.list_domain(domain).await?.pop())
    }

    /// Snapshot paths of a domain inside the `[start, end)` selector window.
    pub async fn window(
        &self,
        domain: DataDomain,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Vec<String>> {
        let paths = self.list_domain(domain).await?;
        select_window(&paths, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Measure;
    use chrono::NaiveDate;
    use serde_json::json;

    #[tokio::test]
    async fn test_round_trip_and_listing() {
        let store = SnapshotStore::in_memory();
        let domain = DataDomain::Weather(Measure::Rainfall);

        for minute in [30, 0, 15] {
            let ts = NaiveDate::from_ymd_opt(2022, 5, 24)
                .unwrap()
                .and_hms_opt(22, minute, 1)
                .unwrap();
            store
                .put_snapshot(domain, ts, &json!({"minute": minute}))
                .await
                .unwrap();
        }

        let paths = store.list_domain(domain).await.unwrap();
        assert_eq!(paths.len(), 3);
        assert_eq!(paths[0], "rainfall/2022-05-24T22-00-01.json");

        let latest = store.latest(domain).await.unwrap().unwrap();
        let value = store.read_json(&latest).await.unwrap();
        assert_eq!(value["minute"], 30);

        assert!(store
            .list_domain(DataDomain::TaxiAvailability)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_local_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            root: dir.path().join("snapshots"),
            ..StoreConfig::default()
        };
        let store = SnapshotStore::from_config(&config).unwrap();
        store
            .write_json("taxis/2022-05-27T14-00-03.json", &json!({"features": []}))
            .await
            .unwrap();

        assert!(dir
            .path()
            .join("snapshots/taxis/2022-05-27T14-00-03.json")
            .exists());
        let window = store
            .window(DataDomain::TaxiAvailability, None, None)
            .await
            .unwrap();
        assert_eq!(window, vec!["taxis/2022-05-27T14-00-03.json".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_object_is_error() {
        let store = SnapshotStore::in_memory();
        assert!(store.read_json("taxis/nope.json").await.is_err());
    }

    #[test]
    fn test_gcs_requires_bucket() {
        let config = StoreConfig {
            backend: StoreBackend::Gcs,
            ..StoreConfig::default()
        };
        assert!(SnapshotStore::from_config(&config).unwrap_err().is_configuration());
    }
}

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::Utc;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::config::WarehouseConfig;
use crate::error::{ProcessingError, Result};
use crate::models::GridObservation;
use crate::utils::constants::{
    COMPRESSION_GZIP, COMPRESSION_LZ4, COMPRESSION_NONE, COMPRESSION_SNAPPY, COMPRESSION_ZSTD,
    DEFAULT_ROW_GROUP_SIZE, GRID_OBSERVATIONS_TABLE,
};
use crate::writers::schema::grid_observations_from_batch;
use crate::writers::warehouse::WarehouseWriter;

const PART_EXTENSION: &str = "parquet";
const READ_BATCH_SIZE: usize = 8192;

/// Warehouse backed by a directory of Parquet part files per table:
/// `<root>/<table>/part-<utc>-<seq>.parquet`.
#[derive(Debug)]
pub struct ParquetWarehouse {
    root: PathBuf,
    compression: Compression,
    row_group_size: usize,
    sequence: AtomicU64,
}

impl ParquetWarehouse {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            compression: Compression::SNAPPY,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &WarehouseConfig) -> Result<Self> {
        Ok(Self::new(&config.root)
            .with_compression(&config.compression)?
            .with_row_group_size(config.row_group_size))
    }

    pub fn with_compression(mut self, compression: &str) -> Result<Self> {
        self.compression = parse_compression(compression)?;
        Ok(self)
    }

    pub fn with_row_group_size(mut self, size: usize) -> Self {
        self.row_group_size = size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_dir(&self, table: &str) -> PathBuf {
        self.root.join(table)
    }

    /// Part files of `table` in append order. A table never written is empty.
    pub fn part_files(&self, table: &str) -> Result<Vec<PathBuf>> {
        let dir = self.table_dir(table);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut parts: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(PART_EXTENSION))
            .collect();
        parts.sort();
        Ok(parts)
    }

    pub fn read_table(&self, table: &str) -> Result<Vec<RecordBatch>> {
        let mut batches = Vec::new();
        for path in self.part_files(table)? {
            let file = File::open(&path)?;
            let reader = ParquetRecordBatchReaderBuilder::try_new(file)?
                .with_batch_size(READ_BATCH_SIZE)
                .build()?;
            for batch in reader {
                batches.push(batch?);
            }
        }
        Ok(batches)
    }

    /// Merged rows, one per `(grid_num, timestamp)`. Later appends of a key
    /// replace earlier ones.
    pub fn read_grid_observations(&self) -> Result<Vec<GridObservation>> {
        let mut by_key = HashMap::new();
        for batch in self.read_table(GRID_OBSERVATIONS_TABLE)? {
            for row in grid_observations_from_batch(&batch)? {
                by_key.insert(row.key(), row);
            }
        }

        let mut rows: Vec<GridObservation> = by_key.into_values().collect();
        rows.sort_by_key(|r| (r.timestamp, r.grid_num));
        Ok(rows)
    }

    pub fn file_info(&self, path: &Path) -> Result<ParquetFileInfo> {
        use parquet::file::reader::{FileReader, SerializedFileReader};

        let file = File::open(path)?;
        let reader = SerializedFileReader::new(file)?;
        let metadata = reader.metadata();

        let row_group_sizes = (0..metadata.num_row_groups())
            .map(|i| metadata.row_group(i).num_rows())
            .collect::<Vec<_>>();

        Ok(ParquetFileInfo {
            total_rows: metadata.file_metadata().num_rows(),
            row_groups: row_group_sizes.len(),
            row_group_sizes,
            file_size: std::fs::metadata(path)?.len(),
            compression: self.compression,
        })
    }

    fn next_part_path(&self, table: &str) -> PathBuf {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%6f");
        self.table_dir(table)
            .join(format!("part-{}-{:06}.{}", stamp, seq, PART_EXTENSION))
    }

    fn writer_properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .build()
    }
}

#[async_trait]
impl WarehouseWriter for ParquetWarehouse {
    async fn append_batch(&self, table: &str, batch: RecordBatch) -> Result<()> {
        if batch.num_rows() == 0 {
            return Ok(());
        }

        let path = self.next_part_path(table);
        let props = self.writer_properties();
        let rows = batch.num_rows();

        let written = path.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(parent) = written.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = File::create(&written)?;
            let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
            writer.write(&batch)?;
            writer.close()?;
            Ok(())
        })
        .await??;

        debug!(table, rows, path = %path.display(), "Appended parquet part");
        Ok(())
    }
}

pub fn parse_compression(compression: &str) -> Result<Compression> {
    match compression.to_lowercase().as_str() {
        COMPRESSION_SNAPPY => Ok(Compression::SNAPPY),
        COMPRESSION_GZIP => Ok(Compression::GZIP(GzipLevel::default())),
        COMPRESSION_LZ4 => Ok(Compression::LZ4),
        COMPRESSION_ZSTD => Ok(Compression::ZSTD(ZstdLevel::default())),
        COMPRESSION_NONE => Ok(Compression::UNCOMPRESSED),
        _ => Err(ProcessingError::Config(format!(
            "Unsupported compression: {}",
            compression
        ))),
    }
}

#[derive(Debug)]
pub struct ParquetFileInfo {
    pub total_rows: i64,
    pub row_groups: usize,
    pub row_group_sizes: Vec<i64>,
    pub file_size: u64,
    pub compression: Compression,
}

impl ParquetFileInfo {
    pub fn summary(&self) -> String {
        format!(
            "Parquet File Summary:\n\
            - Total rows: {}\n\
            - Row groups: {}\n\
            - File size: {:.2} KB\n\
            - Compression: {:?}",
            self.total_rows,
            self.row_groups,
            self.file_size as f64 / 1024.0,
            self.compression,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writers::schema::IntoRecordBatch;
    use crate::writers::warehouse::append_rows;
    use chrono::{NaiveDate, NaiveDateTime};
    use tempfile::TempDir;

    fn ts(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 6, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_table_is_empty() -> Result<()> {
        let dir = TempDir::new()?;
        let warehouse = ParquetWarehouse::new(dir.path());
        assert!(warehouse.read_table("assignment-taxi")?.is_empty());
        assert!(warehouse.read_grid_observations()?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_grid_observations_dedup_on_read() -> Result<()> {
        let dir = TempDir::new()?;
        let warehouse = ParquetWarehouse::new(dir.path());

        let first = vec![GridObservation::new(1, ts(9), 2), GridObservation::new(2, ts(9), 0)];
        let mut replayed = GridObservation::new(1, ts(9), 5);
        replayed.rainfall = Some(0.6);
        let second = vec![replayed.clone(), GridObservation::new(1, ts(10), 1)];

        append_rows(&warehouse, GRID_OBSERVATIONS_TABLE, &first).await?;
        append_rows(&warehouse, GRID_OBSERVATIONS_TABLE, &second).await?;

        assert_eq!(warehouse.part_files(GRID_OBSERVATIONS_TABLE)?.len(), 2);

        let rows = warehouse.read_grid_observations()?;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], replayed);
        assert_eq!(rows[2].timestamp, ts(10));
        Ok(())
    }

    #[tokio::test]
    async fn test_file_info_reports_row_groups() -> Result<()> {
        let dir = TempDir::new()?;
        let warehouse = ParquetWarehouse::new(dir.path()).with_row_group_size(2);
        let rows: Vec<GridObservation> = (1..=5).map(|n| GridObservation::new(n, ts(8), n)).collect();

        append_rows(&warehouse, GRID_OBSERVATIONS_TABLE, &rows).await?;

        let part = &warehouse.part_files(GRID_OBSERVATIONS_TABLE)?[0];
        let info = warehouse.file_info(part)?;
        assert_eq!(info.total_rows, 5);
        assert_eq!(info.row_groups, 3);
        assert!(info.summary().contains("Total rows: 5"));
        Ok(())
    }

    #[tokio::test]
    async fn test_different_compressions() -> Result<()> {
        let compressions = ["snappy", "gzip", "lz4", "zstd", "none"];

        for compression in &compressions {
            let dir = TempDir::new()?;
            let warehouse = ParquetWarehouse::new(dir.path()).with_compression(compression)?;
            let batch = GridObservation::to_record_batch(&[GridObservation::new(3, ts(12), 1)])?;

            let result = warehouse.append_batch(GRID_OBSERVATIONS_TABLE, batch).await;
            assert!(result.is_ok(), "Failed with compression: {}", compression);
            assert_eq!(warehouse.read_grid_observations()?.len(), 1);
        }

        assert!(parse_compression("brotli-ish").is_err());
        Ok(())
    }
}

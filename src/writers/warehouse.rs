use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::Result;
use crate::writers::schema::IntoRecordBatch;

/// Append-only tabular sink. Tables are created on first append.
#[async_trait]
pub trait WarehouseWriter: Send + Sync {
    async fn append_batch(&self, table: &str, batch: RecordBatch) -> Result<()>;
}

/// Converts `rows` and appends them to `table`. Empty input is a no-op.
pub async fn append_rows<W, T>(writer: &W, table: &str, rows: &[T]) -> Result<usize>
where
    W: WarehouseWriter + ?Sized,
    T: IntoRecordBatch,
{
    if rows.is_empty() {
        return Ok(0);
    }

    let batch = T::to_record_batch(rows)?;
    writer.append_batch(table, batch).await?;
    Ok(rows.len())
}

/// Keeps appended batches in memory, keyed by table name.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    tables: Mutex<HashMap<String, Vec<RecordBatch>>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self, table: &str) -> Vec<RecordBatch> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.get(table).cloned().unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.batches(table).iter().map(|b| b.num_rows()).sum()
    }

    pub fn table_names(&self) -> Vec<String> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = tables.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl WarehouseWriter for MemoryWarehouse {
    async fn append_batch(&self, table: &str, batch: RecordBatch) -> Result<()> {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.entry(table.to_string()).or_default().push(batch);
        Ok(())
    }
}

pub mod csv_writer;
pub mod parquet_writer;
pub mod schema;
pub mod warehouse;

pub use csv_writer::write_csv;
pub use parquet_writer::{ParquetFileInfo, ParquetWarehouse};
pub use schema::{grid_observations_from_batch, IntoRecordBatch};
pub use warehouse::{append_rows, MemoryWarehouse, WarehouseWriter};

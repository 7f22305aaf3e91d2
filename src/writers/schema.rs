//! Arrow schemas for every warehouse table and the row conversions into them.

use arrow::array::*;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDateTime};
use std::sync::Arc;

use crate::error::{ProcessingError, Result};
use crate::models::{
    AssignmentRecord, GridObservation, StationObservation, StationRecord, TaxiCountRow, TaxiFix,
};

/// Rows that can be appended to a warehouse table.
pub trait IntoRecordBatch: Sized {
    fn schema() -> Arc<Schema>;

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch>;
}

fn timestamp_field(name: &str) -> Field {
    Field::new(name, DataType::Timestamp(TimeUnit::Microsecond, None), false)
}

fn timestamp_array(values: impl Iterator<Item = NaiveDateTime>) -> ArrayRef {
    Arc::new(TimestampMicrosecondArray::from(
        values.map(|ts| ts.and_utc().timestamp_micros()).collect::<Vec<i64>>(),
    ))
}

fn string_array<'a>(values: impl Iterator<Item = &'a str>) -> ArrayRef {
    Arc::new(StringArray::from(values.collect::<Vec<&str>>()))
}

fn optional_string_array<'a>(values: impl Iterator<Item = Option<&'a str>>) -> ArrayRef {
    Arc::new(StringArray::from(values.collect::<Vec<Option<&str>>>()))
}

/// `<measure>-items`
impl IntoRecordBatch for StationObservation {
    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            timestamp_field("timestamp"),
            Field::new("station_id", DataType::Utf8, false),
            Field::new("value", DataType::Float64, false),
            Field::new("description", DataType::Utf8, false),
        ]))
    }

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch> {
        Ok(RecordBatch::try_new(
            Self::schema(),
            vec![
                timestamp_array(rows.iter().map(|r| r.timestamp)),
                string_array(rows.iter().map(|r| r.station_id.as_str())),
                Arc::new(Float64Array::from(rows.iter().map(|r| r.value).collect::<Vec<_>>())),
                string_array(rows.iter().map(|r| r.measure.display_name())),
            ],
        )?)
    }
}

/// `<measure>-metadata`
impl IntoRecordBatch for StationRecord {
    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            timestamp_field("timestamp"),
            Field::new("name", DataType::Utf8, false),
            Field::new("latitude", DataType::Float64, false),
            Field::new("longitude", DataType::Float64, false),
            Field::new("station", DataType::Utf8, false),
            Field::new("reading_type", DataType::Utf8, false),
            Field::new("reading_unit", DataType::Utf8, false),
            Field::new("description", DataType::Utf8, false),
        ]))
    }

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch> {
        Ok(RecordBatch::try_new(
            Self::schema(),
            vec![
                timestamp_array(rows.iter().map(|r| r.timestamp)),
                string_array(rows.iter().map(|r| r.station.name.as_str())),
                Arc::new(Float64Array::from(
                    rows.iter().map(|r| r.station.latitude).collect::<Vec<_>>(),
                )),
                Arc::new(Float64Array::from(
                    rows.iter().map(|r| r.station.longitude).collect::<Vec<_>>(),
                )),
                string_array(rows.iter().map(|r| r.station.station_id.as_str())),
                string_array(rows.iter().map(|r| r.reading_type.as_str())),
                string_array(rows.iter().map(|r| r.reading_unit.as_str())),
                string_array(rows.iter().map(|r| r.measure.display_name())),
            ],
        )?)
    }
}

/// `taxi-availability`
impl IntoRecordBatch for TaxiFix {
    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            timestamp_field("timestamp"),
            Field::new("longitude", DataType::Float64, false),
            Field::new("latitude", DataType::Float64, false),
        ]))
    }

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch> {
        Ok(RecordBatch::try_new(
            Self::schema(),
            vec![
                timestamp_array(rows.iter().map(|r| r.timestamp)),
                Arc::new(Float64Array::from(rows.iter().map(|r| r.longitude).collect::<Vec<_>>())),
                Arc::new(Float64Array::from(rows.iter().map(|r| r.latitude).collect::<Vec<_>>())),
            ],
        )?)
    }
}

/// `assignment-taxi`
impl IntoRecordBatch for TaxiCountRow {
    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("grid_num", DataType::UInt32, false),
            timestamp_field("timestamp"),
            Field::new("taxi_count", DataType::UInt32, false),
        ]))
    }

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch> {
        Ok(RecordBatch::try_new(
            Self::schema(),
            vec![
                Arc::new(UInt32Array::from(rows.iter().map(|r| r.grid_num).collect::<Vec<_>>())),
                timestamp_array(rows.iter().map(|r| r.timestamp)),
                Arc::new(UInt32Array::from(rows.iter().map(|r| r.taxi_count).collect::<Vec<_>>())),
            ],
        )?)
    }
}

/// `assignment-station`
impl IntoRecordBatch for AssignmentRecord {
    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("grid_num", DataType::UInt32, false),
            timestamp_field("date_active"),
            timestamp_field("date_inactive"),
            Field::new("rainfall", DataType::Utf8, true),
            Field::new("relative_humidity", DataType::Utf8, true),
            Field::new("air_temperature", DataType::Utf8, true),
        ]))
    }

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch> {
        Ok(RecordBatch::try_new(
            Self::schema(),
            vec![
                Arc::new(UInt32Array::from(rows.iter().map(|r| r.grid_num).collect::<Vec<_>>())),
                timestamp_array(rows.iter().map(|r| r.date_active)),
                timestamp_array(rows.iter().map(|r| r.date_inactive)),
                optional_string_array(rows.iter().map(|r| r.rainfall.as_deref())),
                optional_string_array(rows.iter().map(|r| r.relative_humidity.as_deref())),
                optional_string_array(rows.iter().map(|r| r.air_temperature.as_deref())),
            ],
        )?)
    }
}

/// `grid-observations`
impl IntoRecordBatch for GridObservation {
    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("grid_num", DataType::UInt32, false),
            timestamp_field("timestamp"),
            Field::new("taxi_count", DataType::UInt32, false),
            Field::new("rainfall", DataType::Float64, true),
            Field::new("air_temperature", DataType::Float64, true),
            Field::new("relative_humidity", DataType::Float64, true),
            Field::new("rainfall_station_id", DataType::Utf8, true),
            Field::new("air_temperature_station_id", DataType::Utf8, true),
            Field::new("relative_humidity_station_id", DataType::Utf8, true),
        ]))
    }

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch> {
        Ok(RecordBatch::try_new(
            Self::schema(),
            vec![
                Arc::new(UInt32Array::from(rows.iter().map(|r| r.grid_num).collect::<Vec<_>>())),
                timestamp_array(rows.iter().map(|r| r.timestamp)),
                Arc::new(UInt32Array::from(rows.iter().map(|r| r.taxi_count).collect::<Vec<_>>())),
                Arc::new(Float64Array::from(rows.iter().map(|r| r.rainfall).collect::<Vec<_>>())),
                Arc::new(Float64Array::from(
                    rows.iter().map(|r| r.air_temperature).collect::<Vec<_>>(),
                )),
                Arc::new(Float64Array::from(
                    rows.iter().map(|r| r.relative_humidity).collect::<Vec<_>>(),
                )),
                optional_string_array(rows.iter().map(|r| r.rainfall_station_id.as_deref())),
                optional_string_array(rows.iter().map(|r| r.air_temperature_station_id.as_deref())),
                optional_string_array(rows.iter().map(|r| r.relative_humidity_station_id.as_deref())),
            ],
        )?)
    }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| ProcessingError::InvalidFormat(format!("Invalid or missing column '{}'", name)))
}

fn optional_f64(array: &Float64Array, idx: usize) -> Option<f64> {
    (!array.is_null(idx)).then(|| array.value(idx))
}

fn optional_string(array: &StringArray, idx: usize) -> Option<String> {
    (!array.is_null(idx)).then(|| array.value(idx).to_string())
}

/// Decodes `grid-observations` rows.
pub fn grid_observations_from_batch(batch: &RecordBatch) -> Result<Vec<GridObservation>> {
    let grid_nums = column::<UInt32Array>(batch, "grid_num")?;
    let timestamps = column::<TimestampMicrosecondArray>(batch, "timestamp")?;
    let taxi_counts = column::<UInt32Array>(batch, "taxi_count")?;
    let rainfall = column::<Float64Array>(batch, "rainfall")?;
    let air_temperature = column::<Float64Array>(batch, "air_temperature")?;
    let relative_humidity = column::<Float64Array>(batch, "relative_humidity")?;
    let rainfall_ids = column::<StringArray>(batch, "rainfall_station_id")?;
    let air_temperature_ids = column::<StringArray>(batch, "air_temperature_station_id")?;
    let relative_humidity_ids = column::<StringArray>(batch, "relative_humidity_station_id")?;

    (0..batch.num_rows())
        .map(|i| {
            let timestamp = DateTime::from_timestamp_micros(timestamps.value(i))
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| {
                    ProcessingError::InvalidFormat(format!(
                        "Timestamp out of range: {}",
                        timestamps.value(i)
                    ))
                })?;

            Ok(GridObservation {
                grid_num: grid_nums.value(i),
                timestamp,
                taxi_count: taxi_counts.value(i),
                rainfall: optional_f64(rainfall, i),
                air_temperature: optional_f64(air_temperature, i),
                relative_humidity: optional_f64(relative_humidity, i),
                rainfall_station_id: optional_string(rainfall_ids, i),
                air_temperature_station_id: optional_string(air_temperature_ids, i),
                relative_humidity_station_id: optional_string(relative_humidity_ids, i),
            })
        })
        .collect()
}

/// Data.gov.sg realtime API
pub const DEFAULT_API_BASE: &str = "https://api.data.gov.sg/v1/";
pub const API_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

/// Object store naming
pub const SNAPSHOT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";
pub const SNAPSHOT_EXTENSION: &str = "json";
pub const TAXI_PREFIX: &str = "taxis";

/// Warehouse table names
pub const TAXI_AVAILABILITY_TABLE: &str = "taxi-availability";
pub const STATION_ASSIGNMENT_TABLE: &str = "assignment-station";
pub const TAXI_ASSIGNMENT_TABLE: &str = "assignment-taxi";
pub const GRID_OBSERVATIONS_TABLE: &str = "grid-observations";

/// Open-ended validity window for station assignments.
pub const DATE_INACTIVE_YEAR: i32 = 2050;
pub const DATE_INACTIVE_MONTH: u32 = 12;
pub const DATE_INACTIVE_DAY: u32 = 31;

/// Singapore Standard Time, UTC+8.
pub const SGT_OFFSET_SECS: i32 = 8 * 3600;

/// Batch defaults
pub const DEFAULT_STEP_MINUTES: i64 = 15;
pub const DEFAULT_ROW_GROUP_SIZE: usize = 10000;

/// Singapore bounding box
pub const SG_MIN_LAT: f64 = 1.15;
pub const SG_MAX_LAT: f64 = 1.48;
pub const SG_MIN_LON: f64 = 103.59;
pub const SG_MAX_LON: f64 = 104.1;

/// Availability thresholds on predicted taxi counts
pub const GOOD_AVAILABILITY_ABOVE: f64 = 10.0;
pub const FAIR_AVAILABILITY_ABOVE: f64 = 5.0;
pub const PREDICTION_HORIZON_MINUTES: i64 = 30;

pub const INVALID_COORDINATES_MESSAGE: &str = "Invalid coordinates received. Cannot map to grid. Please ensure your coordinates are within Singapore borders.";

/// Parquet compression options
pub const COMPRESSION_SNAPPY: &str = "snappy";
pub const COMPRESSION_GZIP: &str = "gzip";
pub const COMPRESSION_LZ4: &str = "lz4";
pub const COMPRESSION_ZSTD: &str = "zstd";
pub const COMPRESSION_NONE: &str = "none";

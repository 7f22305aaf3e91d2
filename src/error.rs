use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProcessingError>;

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Date parsing error: {0}")]
    DateParse(#[from] chrono::ParseError),

    #[error("Parquet write error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Shapefile error: {0}")]
    Shapefile(#[from] shapefile::Error),

    #[error("Grid definition is empty")]
    EmptyGrid,

    #[error("Duplicate grid_num {0} in grid definition")]
    DuplicateGridNum(u32),

    #[error("Invalid grid_num attribute on feature {feature}: {details}")]
    InvalidGridNum { feature: usize, details: String },

    #[error("Malformed snapshot {source_name}: {details}")]
    MalformedSnapshot { source_name: String, details: String },

    #[error("Missing required data: {0}")]
    MissingData(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl ProcessingError {
    pub fn malformed(source_name: impl Into<String>, details: impl Into<String>) -> Self {
        ProcessingError::MalformedSnapshot {
            source_name: source_name.into(),
            details: details.into(),
        }
    }

    /// Errors that invalidate the whole run rather than a single timestamp.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ProcessingError::Config(_)
                | ProcessingError::ConfigSource(_)
                | ProcessingError::EmptyGrid
                | ProcessingError::DuplicateGridNum(_)
                | ProcessingError::InvalidGridNum { .. }
                | ProcessingError::Shapefile(_)
        )
    }
}

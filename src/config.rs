//! Application configuration.
//!
//! Sources in increasing priority: built-in defaults, a TOML file, then
//! `TAXIGRID__SECTION__KEY` environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use validator::Validate;

use crate::error::{ProcessingError, Result};
use crate::grid::LatticeConfig;
use crate::processors::AssignmentStrategy;
use crate::readers::GRID_NUM_ATTRIBUTE;
use crate::utils::constants::{
    COMPRESSION_SNAPPY, DEFAULT_API_BASE, DEFAULT_API_TIMEOUT_SECS, DEFAULT_ROW_GROUP_SIZE,
    DEFAULT_STEP_MINUTES,
};

pub const APP_NAME: &str = "taxi-grid";
pub const CONFIG_FILE: &str = "taxigrid.toml";
pub const CONFIG_PATH_ENV: &str = "TAXIGRID_CONFIG";
pub const ENV_PREFIX: &str = "TAXIGRID";

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AppConfig {
    #[validate(nested)]
    pub grid: GridConfig,
    pub store: StoreConfig,
    pub warehouse: WarehouseConfig,
    pub api: ApiConfig,
    pub predictor: PredictorConfig,
    #[validate(nested)]
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct GridConfig {
    /// Shapefile or GeoJSON grid; the lattice itself is used when absent.
    pub path: Option<PathBuf>,
    /// Integer attribute holding each feature's `grid_num`.
    #[validate(length(min = 1))]
    pub attribute: String,
    #[validate(length(min = 1))]
    pub lattice: String,
    /// Inline lattice, overriding the named preset.
    pub custom_lattice: Option<LatticeConfig>,
    pub strategy: AssignmentStrategy,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            path: None,
            attribute: GRID_NUM_ATTRIBUTE.to_string(),
            lattice: LatticeConfig::GRID_22.to_string(),
            custom_lattice: None,
            strategy: AssignmentStrategy::Formula,
        }
    }
}

impl GridConfig {
    pub fn lattice(&self) -> Result<LatticeConfig> {
        let lattice = match &self.custom_lattice {
            Some(custom) => custom.clone(),
            None => LatticeConfig::preset(&self.lattice).ok_or_else(|| {
                ProcessingError::Config(format!(
                    "Unknown lattice '{}'; expected '{}', '{}' or a custom_lattice table",
                    self.lattice,
                    LatticeConfig::GRID_22,
                    LatticeConfig::GRID_45
                ))
            })?,
        };
        lattice.validate()?;
        Ok(lattice)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Local,
    Gcs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Root directory for the local backend.
    pub root: PathBuf,
    pub bucket: Option<String>,
    pub service_account_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Local,
            root: PathBuf::from("data"),
            bucket: None,
            service_account_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub root: PathBuf,
    pub compression: String,
    pub row_group_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("warehouse"),
            compression: COMPRESSION_SNAPPY.to_string(),
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            timeout_secs: DEFAULT_API_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            timeout_secs: DEFAULT_API_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BatchConfig {
    #[validate(range(min = 1))]
    pub max_workers: usize,
    #[validate(range(min = 1, max = 1440))]
    pub step_minutes: i64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_workers: num_cpus::get(),
            step_minutes: DEFAULT_STEP_MINUTES,
        }
    }
}

impl AppConfig {
    /// Loads configuration, using `explicit` or the first config file found in
    /// the standard locations.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        match explicit {
            Some(path) => {
                builder = builder.add_source(config::File::from(path).required(true));
            }
            None => {
                if let Some(path) = find_config_file() {
                    builder = builder.add_source(config::File::from(path).required(false));
                }
            }
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app: AppConfig = settings.try_deserialize()?;
        app.validate()?;
        app.grid.lattice()?;
        Ok(app)
    }
}

/// Search order: `TAXIGRID_CONFIG`, the current directory, then the XDG config home.
pub fn find_config_file() -> Option<PathBuf> {
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        let p = PathBuf::from(path);
        if p.exists() {
            return Some(p);
        }
    }

    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    let xdg = if let Ok(xdg_config) = env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config).join(APP_NAME).join(CONFIG_FILE)
    } else if let Ok(home) = env::var("HOME") {
        PathBuf::from(home)
            .join(".config")
            .join(APP_NAME)
            .join(CONFIG_FILE)
    } else {
        return None;
    };
    xdg.exists().then_some(xdg)
}

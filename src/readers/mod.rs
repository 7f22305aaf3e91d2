pub mod grid_reader;
pub mod slice_source;
pub mod snapshot_store;
pub mod taxi_parser;
pub mod weather_parser;

pub use grid_reader::{lattice_geojson, write_lattice_geojson, GridDataLoader, GRID_NUM_ATTRIBUTE};
pub use slice_source::{ApiSliceSource, SliceSource, StoreSliceSource};
pub use snapshot_store::SnapshotStore;
pub use taxi_parser::TaxiParser;
pub use weather_parser::{WeatherParser, WeatherSnapshot};

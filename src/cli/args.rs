use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "taxi-grid")]
#[command(about = "Singapore taxi availability and weather grid processor")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Configuration file (TOML)")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Suppress progress bars")]
    pub quiet: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,
}

/// Where slice snapshots come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceKind {
    /// Live provider API; raw payloads are archived to the snapshot store
    Api,
    /// Previously ingested snapshots in the snapshot store
    Store,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch raw snapshots from the data API into the snapshot store
    Ingest {
        #[arg(short, long, help = "Snapshot time (SGT) [default: now]")]
        timestamp: Option<String>,

        #[arg(
            short,
            long,
            value_delimiter = ',',
            help = "Domains to fetch (rainfall, air-temperature, relative-humidity, taxis) [default: all]"
        )]
        domains: Vec<String>,
    },

    /// Parse stored snapshots and append them to the warehouse
    Load {
        #[arg(
            short,
            long,
            value_delimiter = ',',
            help = "Domains to load [default: all]"
        )]
        domains: Vec<String>,

        #[arg(short, long, help = "Single snapshot path", conflicts_with_all = ["latest", "start", "end"])]
        file: Option<String>,

        #[arg(long, help = "Only the most recent snapshot of each domain")]
        latest: bool,

        #[arg(long, help = "First snapshot to load (timestamp or path substring)")]
        start: Option<String>,

        #[arg(long, help = "Snapshot to stop before (timestamp or path substring)")]
        end: Option<String>,
    },

    /// Resolve the nearest reporting station per cell and measure
    AssignStations {
        #[arg(short, long, help = "Slice time (SGT) [default: now]")]
        timestamp: Option<String>,

        #[arg(long, help = "End of the assignment's validity [default: 2050-12-31]")]
        date_inactive: Option<String>,

        #[arg(short, long, value_enum, default_value = "store")]
        source: SourceKind,
    },

    /// Count available taxis per grid cell
    AssignTaxis {
        #[arg(short, long, help = "Slice time (SGT) [default: now]")]
        timestamp: Option<String>,

        #[arg(long, help = "Mapping strategy (formula, geometry) [default: from config]")]
        strategy: Option<String>,

        #[arg(short, long, value_enum, default_value = "store")]
        source: SourceKind,
    },

    /// Merge taxi counts and weather readings for one timestamp
    Merge {
        #[arg(short, long, help = "Slice time (SGT) [default: now]")]
        timestamp: Option<String>,

        #[arg(short, long, value_enum, default_value = "store")]
        source: SourceKind,

        #[arg(short, long, help = "Also write the merged rows to a CSV file")]
        output_csv: Option<PathBuf>,
    },

    /// Merge every step between two timestamps
    Batch {
        #[arg(long, help = "First slice (SGT)")]
        start: String,

        #[arg(long, help = "End of the range, exclusive (SGT)")]
        end: String,

        #[arg(long, help = "Minutes between slices [default: from config]")]
        step_minutes: Option<i64>,

        #[arg(long, help = "Concurrent slices [default: from config]")]
        max_workers: Option<usize>,

        #[arg(short, long, value_enum, default_value = "store")]
        source: SourceKind,

        #[arg(short, long, help = "Also write the merged rows to a CSV file")]
        output_csv: Option<PathBuf>,
    },

    /// Verify that the lattice maps every grid cell back to itself
    CheckGrid {
        #[arg(short, long, help = "Grid file [default: from config]")]
        grid: Option<PathBuf>,
    },

    /// Write the lattice as a GeoJSON grid
    GenerateGrid {
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, help = "Lattice preset (grid-22, grid-45) [default: from config]")]
        lattice: Option<String>,

        #[arg(
            long,
            allow_hyphen_values = true,
            help = "Bounding box min_lon,min_lat,max_lon,max_lat"
        )]
        bbox: Option<String>,
    },

    /// Predict taxi availability near a location
    Predict {
        #[arg(long, allow_hyphen_values = true)]
        longitude: f64,

        #[arg(long, allow_hyphen_values = true)]
        latitude: f64,

        #[arg(long, help = "Lookup time (SGT) [default: now]")]
        at: Option<String>,
    },
}

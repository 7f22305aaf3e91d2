pub mod constants;
pub mod coordinates;
pub mod filename;
pub mod progress;
pub mod time;

pub use constants::*;
pub use coordinates::{euclidean_distance, is_valid_coordinate, within_singapore};
pub use filename::{select_window, snapshot_path, timestamp_from_path};
pub use progress::ProgressReporter;
pub use time::{now_sgt, open_ended, parse_timestamp, round_down, timestamp_steps, to_sgt};

pub mod batch_processor;
pub mod integrity_checker;
pub mod observation_merger;
pub mod station_assigner;
pub mod taxi_aggregator;

pub use batch_processor::{run_slice, BatchProcessor, BatchReport, SliceFailure, SlicePipeline, SliceResult};
pub use integrity_checker::{MergeChecker, MergeReport};
pub use observation_merger::ObservationMerger;
pub use station_assigner::{
    assignment_records, station_fingerprint, AssignmentCache, AssignmentWindow, StationAssigner,
};
pub use taxi_aggregator::{AssignmentStrategy, TaxiAggregator, TaxiCounts};

pub mod assignment;
pub mod grid;
pub mod measure;
pub mod observation;
pub mod station;
pub mod taxi;

pub use assignment::{
    AssignmentRecord, CellRanking, MeasureAssignment, RankedStation, ResolvedReading,
    StationRanking,
};
pub use grid::GridCell;
pub use measure::{DataDomain, Measure};
pub use observation::{GridObservation, GridObservationBuilder, TaxiCountRow};
pub use station::{Station, StationObservation, StationRecord};
pub use taxi::{TaxiFix, TaxiSnapshot};

pub mod taxi_advisor;

pub use taxi_advisor::{recommendation, Advice, Availability, ObservationLookup, TaxiAdvisor};

pub mod index;
pub mod lattice;

pub use index::{nearest_cell, CellLookup, GridIndex, GridSet, LatticeReport, Located};
pub use lattice::{LatticeConfig, RowRounding};

use geo::BoundingRect;
use rstar::{RTree, RTreeObject, AABB};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ProcessingError, Result};
use crate::grid::LatticeConfig;
use crate::models::GridCell;
use crate::utils::coordinates::euclidean_distance;

/// Polygon bounding box entry stored in the R-tree.
#[derive(Debug, Clone, Copy)]
struct ExtentEntry {
    grid_num: u32,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for ExtentEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// The static grid, sorted by `grid_num`. Read-only once built.
#[derive(Debug)]
pub struct GridSet {
    cells: Vec<GridCell>,
    positions: HashMap<u32, usize>,
    extents: RTree<ExtentEntry>,
}

impl GridSet {
    /// Fails on an empty cell list or a repeated `grid_num`.
    pub fn new(mut cells: Vec<GridCell>) -> Result<Self> {
        if cells.is_empty() {
            return Err(ProcessingError::EmptyGrid);
        }

        cells.sort_by_key(|c| c.grid_num);
        if let Some(pair) = cells.windows(2).find(|w| w[0].grid_num == w[1].grid_num) {
            return Err(ProcessingError::DuplicateGridNum(pair[0].grid_num));
        }

        let positions = cells
            .iter()
            .enumerate()
            .map(|(idx, cell)| (cell.grid_num, idx))
            .collect();

        let extents = cells
            .iter()
            .filter_map(|cell| {
                let rect = cell.geometry.bounding_rect()?;
                Some(ExtentEntry {
                    grid_num: cell.grid_num,
                    envelope: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();

        Ok(Self {
            cells,
            positions,
            extents: RTree::bulk_load(extents),
        })
    }

    /// Builds the full rectangular lattice as a grid.
    pub fn from_lattice(lattice: &LatticeConfig) -> Result<Self> {
        lattice.validate()?;
        let cells = lattice
            .grid_nums()
            .into_iter()
            .filter_map(|num| GridCell::from_polygon(num, lattice.cell_polygon(num)?))
            .collect();
        Self::new(cells)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    pub fn grid_nums(&self) -> impl Iterator<Item = u32> + '_ {
        self.cells.iter().map(|c| c.grid_num)
    }

    pub fn get(&self, grid_num: u32) -> Option<&GridCell> {
        self.positions.get(&grid_num).map(|&idx| &self.cells[idx])
    }

    pub fn contains(&self, grid_num: u32) -> bool {
        self.positions.contains_key(&grid_num)
    }

    /// Cell whose polygon covers the point. A point on a shared edge goes to
    /// the cell with the nearer centroid, then the lower `grid_num`.
    pub fn covering_cell(&self, longitude: f64, latitude: f64) -> Option<&GridCell> {
        let point = [longitude, latitude];
        self.extents
            .locate_in_envelope_intersecting(&AABB::from_point(point))
            .filter_map(|entry| self.get(entry.grid_num))
            .filter(|cell| cell.covers(longitude, latitude))
            .min_by(|a, b| {
                let da = euclidean_distance((longitude, latitude), a.centroid_lon_lat());
                let db = euclidean_distance((longitude, latitude), b.centroid_lon_lat());
                da.total_cmp(&db).then_with(|| a.grid_num.cmp(&b.grid_num))
            })
    }
}

/// Result of mapping one point onto the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellLookup {
    Mapped(u32),
    /// The point fell outside the grid; carries the raw formula value when one exists.
    Unmapped(Option<i64>),
}

impl CellLookup {
    pub fn grid_num(&self) -> Option<u32> {
        match self {
            CellLookup::Mapped(num) => Some(*num),
            CellLookup::Unmapped(_) => None,
        }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, CellLookup::Mapped(_))
    }
}

/// Anything with a planar (longitude, latitude) location.
pub trait Located {
    fn lon_lat(&self) -> (f64, f64);
}

impl Located for (f64, f64) {
    fn lon_lat(&self) -> (f64, f64) {
        *self
    }
}

impl Located for crate::models::Station {
    fn lon_lat(&self) -> (f64, f64) {
        self.location()
    }
}

impl Located for GridCell {
    fn lon_lat(&self) -> (f64, f64) {
        self.centroid_lon_lat()
    }
}

/// Lattice-based and geometry-based lookups over one shared grid.
#[derive(Debug, Clone)]
pub struct GridIndex {
    lattice: LatticeConfig,
    grid: Arc<GridSet>,
}

impl GridIndex {
    pub fn new(lattice: LatticeConfig, grid: Arc<GridSet>) -> Result<Self> {
        lattice.validate()?;
        Ok(Self { lattice, grid })
    }

    pub fn lattice(&self) -> &LatticeConfig {
        &self.lattice
    }

    pub fn grid(&self) -> &Arc<GridSet> {
        &self.grid
    }

    /// Raw lattice formula; see [`LatticeConfig::cell_from_coordinates`].
    pub fn cell_from_coordinates(&self, longitude: f64, latitude: f64) -> i64 {
        self.lattice.cell_from_coordinates(longitude, latitude)
    }

    /// Formula lookup; ids outside the lattice or absent from the grid are unmapped.
    pub fn locate(&self, longitude: f64, latitude: f64) -> CellLookup {
        match self.lattice.locate(longitude, latitude) {
            Some(num) if self.grid.contains(num) => CellLookup::Mapped(num),
            Some(num) => CellLookup::Unmapped(Some(num as i64)),
            None if longitude.is_finite() && latitude.is_finite() => {
                CellLookup::Unmapped(Some(self.cell_from_coordinates(longitude, latitude)))
            }
            None => CellLookup::Unmapped(None),
        }
    }

    /// Geometry lookup: the cell whose polygon covers the point, whatever its centroid distance.
    pub fn locate_by_geometry(&self, longitude: f64, latitude: f64) -> CellLookup {
        if !(longitude.is_finite() && latitude.is_finite()) {
            return CellLookup::Unmapped(None);
        }
        match self.grid.covering_cell(longitude, latitude) {
            Some(cell) => CellLookup::Mapped(cell.grid_num),
            None => CellLookup::Unmapped(None),
        }
    }

    /// Checks that the lattice maps every cell centroid back to its own `grid_num`.
    pub fn verify_lattice(&self) -> LatticeReport {
        let mut report = LatticeReport {
            lattice: self.lattice.name.clone(),
            grid_cells: self.grid.len(),
            lattice_cells: self.lattice.cell_count(),
            mismatches: Vec::new(),
        };

        for cell in self.grid.cells() {
            let (lon, lat) = cell.centroid_lon_lat();
            let computed = self.lattice.locate(lon, lat);
            if computed != Some(cell.grid_num) {
                report.mismatches.push(LatticeMismatch {
                    grid_num: cell.grid_num,
                    computed: computed.map(|n| n as i64).unwrap_or_else(|| self.cell_from_coordinates(lon, lat)),
                });
            }
        }

        debug!(
            lattice = %report.lattice,
            mismatches = report.mismatches.len(),
            "Verified lattice against grid"
        );
        report
    }
}

/// Nearest candidate to `point` by planar Euclidean distance; ties keep the earliest candidate.
pub fn nearest_cell<'a, T: Located>(point: (f64, f64), candidates: &'a [T]) -> Option<&'a T> {
    let mut best: Option<(&T, f64)> = None;
    for candidate in candidates {
        let dist = euclidean_distance(point, candidate.lon_lat());
        match best {
            Some((_, best_dist)) if dist >= best_dist => {}
            _ => best = Some((candidate, dist)),
        }
    }
    best.map(|(candidate, _)| candidate)
}

#[derive(Debug, Clone, PartialEq)]
pub struct LatticeMismatch {
    pub grid_num: u32,
    pub computed: i64,
}

#[derive(Debug, Clone)]
pub struct LatticeReport {
    pub lattice: String,
    pub grid_cells: usize,
    pub lattice_cells: usize,
    pub mismatches: Vec<LatticeMismatch>,
}

impl LatticeReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn summary(&self) -> String {
        let mut summary = format!(
            "=== Lattice Check ({}) ===\nGrid cells: {}\nLattice cells: {}\nMismatches: {}\n",
            self.lattice,
            self.grid_cells,
            self.lattice_cells,
            self.mismatches.len()
        );
        for mismatch in self.mismatches.iter().take(10) {
            summary.push_str(&format!(
                "  grid_num {} -> lattice {}\n",
                mismatch.grid_num, mismatch.computed
            ));
        }
        summary
    }
}

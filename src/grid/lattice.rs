//! Analytic lattice over Singapore's bounding box.
//!
//! A point maps to `grid_num = column + row * row_width`, where the column is
//! the ceiling of the longitude offset divided by the cell width and the row
//! counts down from the northern edge. Every constant lives in one
//! [`LatticeConfig`] so the analytic grid and the grid file cannot drift apart.

use geo::{LineString, Point, Polygon};
use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, Result};

/// How the latitude offset is turned into a row index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowRounding {
    /// `row = row_count - ceil(d)`; rows run `0..row_count`.
    Ceil,
    /// `row = ceil(row_count - d)`, i.e. `row_count - floor(d)`; rows run `1..=row_count`.
    Floor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatticeConfig {
    pub name: String,
    pub origin_lon: f64,
    pub origin_lat: f64,
    pub cell_width_lon: f64,
    pub cell_width_lat: f64,
    pub row_count: i64,
    pub row_width: i64,
    pub lat_rounding: RowRounding,
}

impl LatticeConfig {
    pub const GRID_22: &'static str = "grid-22";
    pub const GRID_45: &'static str = "grid-45";

    /// 22 columns by 13 rows of roughly 2.3 km cells.
    pub fn grid_22() -> Self {
        Self {
            name: Self::GRID_22.to_string(),
            origin_lon: 103.6,
            origin_lat: 1.208,
            cell_width_lon: 0.020454545454545583,
            cell_width_lat: 0.020538461538461547,
            row_count: 13,
            row_width: 22,
            lat_rounding: RowRounding::Ceil,
        }
    }

    /// 45 columns by 27 rows of roughly 1.1 km cells.
    pub fn grid_45() -> Self {
        Self {
            name: Self::GRID_45.to_string(),
            origin_lon: 103.6,
            origin_lat: 1.208,
            cell_width_lon: 0.01,
            cell_width_lat: 0.009888890000000039,
            row_count: 27,
            row_width: 45,
            lat_rounding: RowRounding::Floor,
        }
    }

    pub fn preset(name: &str) -> Option<Self> {
        match name {
            Self::GRID_22 => Some(Self::grid_22()),
            Self::GRID_45 => Some(Self::grid_45()),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cell_width_lon <= 0.0 || self.cell_width_lat <= 0.0 {
            return Err(ProcessingError::Config(format!(
                "Lattice '{}' has non-positive cell width",
                self.name
            )));
        }
        if self.row_count <= 0 || self.row_width <= 0 {
            return Err(ProcessingError::Config(format!(
                "Lattice '{}' needs positive row_count and row_width",
                self.name
            )));
        }
        Ok(())
    }

    pub fn longitude_bin(&self, longitude: f64) -> i64 {
        ((longitude - self.origin_lon) / self.cell_width_lon).ceil() as i64
    }

    pub fn latitude_bin(&self, latitude: f64) -> i64 {
        let offset = (latitude - self.origin_lat) / self.cell_width_lat;
        match self.lat_rounding {
            RowRounding::Ceil => self.row_count - offset.ceil() as i64,
            RowRounding::Floor => self.row_count - offset.floor() as i64,
        }
    }

    /// Raw formula value. Points outside the lattice yield ids that may collide
    /// with real cells; use [`LatticeConfig::locate`] to detect them.
    pub fn cell_from_coordinates(&self, longitude: f64, latitude: f64) -> i64 {
        self.longitude_bin(longitude) + self.latitude_bin(latitude) * self.row_width
    }

    pub fn column_range(&self) -> std::ops::RangeInclusive<i64> {
        1..=self.row_width
    }

    pub fn row_range(&self) -> std::ops::RangeInclusive<i64> {
        match self.lat_rounding {
            RowRounding::Ceil => 0..=self.row_count - 1,
            RowRounding::Floor => 1..=self.row_count,
        }
    }

    /// Formula lookup restricted to points whose column and row fall inside the lattice.
    pub fn locate(&self, longitude: f64, latitude: f64) -> Option<u32> {
        if !longitude.is_finite() || !latitude.is_finite() {
            return None;
        }
        let column = self.longitude_bin(longitude);
        let row = self.latitude_bin(latitude);
        if !self.column_range().contains(&column) || !self.row_range().contains(&row) {
            return None;
        }
        u32::try_from(column + row * self.row_width).ok()
    }

    /// Splits a grid number back into (column, row).
    pub fn decompose(&self, grid_num: u32) -> Option<(i64, i64)> {
        let id = grid_num as i64;
        if id < 1 {
            return None;
        }
        let row = (id - 1).div_euclid(self.row_width);
        let column = id - row * self.row_width;
        if self.row_range().contains(&row) {
            Some((column, row))
        } else {
            None
        }
    }

    /// Cell rectangle as (min_lon, min_lat, max_lon, max_lat).
    pub fn cell_bounds(&self, grid_num: u32) -> Option<(f64, f64, f64, f64)> {
        let (column, row) = self.decompose(grid_num)?;
        let min_lon = self.origin_lon + (column - 1) as f64 * self.cell_width_lon;
        let rows_above_origin = match self.lat_rounding {
            RowRounding::Ceil => self.row_count - row - 1,
            RowRounding::Floor => self.row_count - row,
        };
        let min_lat = self.origin_lat + rows_above_origin as f64 * self.cell_width_lat;
        Some((
            min_lon,
            min_lat,
            min_lon + self.cell_width_lon,
            min_lat + self.cell_width_lat,
        ))
    }

    pub fn cell_polygon(&self, grid_num: u32) -> Option<Polygon<f64>> {
        let (min_lon, min_lat, max_lon, max_lat) = self.cell_bounds(grid_num)?;
        Some(Polygon::new(
            LineString::from(vec![
                (min_lon, min_lat),
                (max_lon, min_lat),
                (max_lon, max_lat),
                (min_lon, max_lat),
                (min_lon, min_lat),
            ]),
            vec![],
        ))
    }

    pub fn cell_center(&self, grid_num: u32) -> Option<Point<f64>> {
        let (min_lon, min_lat, max_lon, max_lat) = self.cell_bounds(grid_num)?;
        Some(Point::new((min_lon + max_lon) / 2.0, (min_lat + max_lat) / 2.0))
    }

    /// Every grid number the lattice defines, ascending.
    pub fn grid_nums(&self) -> Vec<u32> {
        let mut nums: Vec<u32> = self
            .row_range()
            .flat_map(|row| self.column_range().map(move |col| col + row * self.row_width))
            .filter_map(|id| u32::try_from(id).ok())
            .collect();
        nums.sort_unstable();
        nums
    }

    pub fn cell_count(&self) -> usize {
        (self.row_count * self.row_width) as usize
    }
}

impl Default for LatticeConfig {
    fn default() -> Self {
        Self::grid_22()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_points() {
        let lattice = LatticeConfig::grid_22();
        assert_eq!(lattice.cell_from_coordinates(103.85, 1.3), 189);
        assert_eq!(lattice.locate(103.85, 1.3), Some(189));

        let fine = LatticeConfig::grid_45();
        assert_eq!(fine.cell_from_coordinates(103.855, 1.3), 836);
        assert_eq!(fine.locate(103.855, 1.3), Some(836));
    }

    #[test]
    fn test_formula_is_deterministic() {
        let lattice = LatticeConfig::grid_45();
        let first = lattice.cell_from_coordinates(103.7712, 1.3521);
        for _ in 0..10 {
            assert_eq!(lattice.cell_from_coordinates(103.7712, 1.3521), first);
        }
    }

    #[test]
    fn test_outside_bounds_is_unmapped() {
        let lattice = LatticeConfig::grid_22();
        assert_eq!(lattice.locate(104.5, 1.3), None);
        assert_eq!(lattice.locate(103.85, 2.0), None);
        assert_eq!(lattice.locate(103.5, 1.3), None);
        assert_eq!(lattice.locate(f64::NAN, 1.3), None);
    }

    #[test]
    fn test_centers_round_trip() {
        for lattice in [LatticeConfig::grid_22(), LatticeConfig::grid_45()] {
            let nums = lattice.grid_nums();
            assert_eq!(nums.len(), lattice.cell_count());
            for grid_num in nums {
                let center = lattice.cell_center(grid_num).unwrap();
                assert_eq!(
                    lattice.locate(center.x(), center.y()),
                    Some(grid_num),
                    "{} cell {}",
                    lattice.name,
                    grid_num
                );
            }
        }
    }

    #[test]
    fn test_grid_nums_are_unique() {
        let lattice = LatticeConfig::grid_22();
        let nums = lattice.grid_nums();
        let mut deduped = nums.clone();
        deduped.dedup();
        assert_eq!(nums, deduped);
        assert_eq!(nums.first(), Some(&1));
        assert_eq!(nums.last(), Some(&(22 + 12 * 22)));
    }

    #[test]
    fn test_presets() {
        assert_eq!(LatticeConfig::preset("grid-45"), Some(LatticeConfig::grid_45()));
        assert_eq!(LatticeConfig::preset("grid-99"), None);
        assert!(LatticeConfig::grid_22().validate().is_ok());

        let mut broken = LatticeConfig::grid_22();
        broken.cell_width_lat = 0.0;
        assert!(broken.validate().is_err());
    }
}

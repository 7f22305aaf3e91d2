use geo::{Centroid, Intersects, Point, Polygon};

/// One cell of the static grid. `grid_num` comes from the grid definition and is never renumbered.
#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    pub grid_num: u32,
    pub centroid: Point<f64>,
    pub geometry: Polygon<f64>,
}

impl GridCell {
    /// Builds a cell, computing the centroid once from the polygon.
    pub fn from_polygon(grid_num: u32, geometry: Polygon<f64>) -> Option<Self> {
        let centroid = geometry.centroid()?;
        Some(Self {
            grid_num,
            centroid,
            geometry,
        })
    }

    /// Centroid as (longitude, latitude).
    pub fn centroid_lon_lat(&self) -> (f64, f64) {
        (self.centroid.x(), self.centroid.y())
    }

    /// True if the point lies inside the polygon or on its boundary.
    pub fn covers(&self, longitude: f64, latitude: f64) -> bool {
        self.geometry.intersects(&Point::new(longitude, latitude))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Polygon};

    fn unit_square() -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)]),
            vec![],
        )
    }

    #[test]
    fn test_centroid_of_square() {
        let cell = GridCell::from_polygon(7, unit_square()).unwrap();
        assert_eq!(cell.grid_num, 7);
        let (lon, lat) = cell.centroid_lon_lat();
        assert!((lon - 0.5).abs() < 1e-12);
        assert!((lat - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_covers_boundary_and_interior() {
        let cell = GridCell::from_polygon(1, unit_square()).unwrap();
        assert!(cell.covers(0.5, 0.5));
        assert!(cell.covers(1.0, 0.5));
        assert!(!cell.covers(1.5, 0.5));
    }
}

use crate::utils::constants::{SG_MAX_LAT, SG_MAX_LON, SG_MIN_LAT, SG_MIN_LON};

/// Planar distance between two (longitude, latitude) points, in degrees.
///
/// Station-to-centroid distances inside Singapore are small enough that the
/// flat approximation ranks stations the same way a great-circle distance would.
pub fn euclidean_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}

pub fn is_valid_coordinate(longitude: f64, latitude: f64) -> bool {
    longitude.is_finite()
        && latitude.is_finite()
        && (-180.0..=180.0).contains(&longitude)
        && (-90.0..=90.0).contains(&latitude)
}

/// Rough Singapore bounding box check
pub fn within_singapore(longitude: f64, latitude: f64) -> bool {
    (SG_MIN_LON..=SG_MAX_LON).contains(&longitude) && (SG_MIN_LAT..=SG_MAX_LAT).contains(&latitude)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance() {
        assert_eq!(euclidean_distance((0.0, 0.0), (3.0, 4.0)), 5.0);
        assert_eq!(euclidean_distance((103.8, 1.3), (103.8, 1.3)), 0.0);
    }

    #[test]
    fn test_coordinate_validity() {
        assert!(is_valid_coordinate(103.8, 1.3));
        assert!(!is_valid_coordinate(f64::NAN, 1.3));
        assert!(!is_valid_coordinate(190.0, 1.3));
    }

    #[test]
    fn test_singapore_bounds() {
        assert!(within_singapore(103.8198, 1.3521)); // Bishan
        assert!(!within_singapore(101.6869, 3.139)); // Kuala Lumpur
    }
}

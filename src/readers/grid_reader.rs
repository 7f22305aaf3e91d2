use geo::{Coord, LineString, Polygon};
use serde_json::{json, Value};
use shapefile::dbase::FieldValue;
use shapefile::PolygonRing;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ProcessingError, Result};
use crate::grid::{GridSet, LatticeConfig};
use crate::models::GridCell;

pub const GRID_NUM_ATTRIBUTE: &str = "grid_num";

/// Loads the static grid definition from a polygon shapefile or GeoJSON file.
pub struct GridDataLoader {
    attribute: String,
}

impl GridDataLoader {
    pub fn new() -> Self {
        Self {
            attribute: GRID_NUM_ATTRIBUTE.to_string(),
        }
    }

    pub fn with_attribute(attribute: &str) -> Self {
        Self {
            attribute: attribute.to_string(),
        }
    }

    /// Loads and indexes the grid. Duplicate or non-integer ids fail the load.
    pub fn load(&self, path: &Path) -> Result<GridSet> {
        let cells = self.load_cells(path)?;
        let grid = GridSet::new(cells)?;
        info!("Loaded {} grid cells from {}", grid.len(), path.display());
        Ok(grid)
    }

    pub fn load_cells(&self, path: &Path) -> Result<Vec<GridCell>> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension.as_deref() {
            Some("shp") => self.load_shapefile(path),
            Some("geojson") | Some("json") => {
                let reader = BufReader::new(File::open(path)?);
                let value: Value = serde_json::from_reader(reader)?;
                self.parse_geojson(&value)
            }
            _ => Err(ProcessingError::InvalidFormat(format!(
                "Unsupported grid file '{}'; expected .shp, .geojson or .json",
                path.display()
            ))),
        }
    }

    pub fn load_shapefile(&self, path: &Path) -> Result<Vec<GridCell>> {
        let shapes = shapefile::read_as::<_, shapefile::Polygon, shapefile::dbase::Record>(path)?;
        debug!("Read {} polygons from {}", shapes.len(), path.display());

        let mut cells = Vec::with_capacity(shapes.len());
        for (feature, (polygon, record)) in shapes.into_iter().enumerate() {
            let grid_num = match record.get(&self.attribute) {
                Some(value) => field_to_grid_num(feature, value)?,
                None => return Err(self.missing_attribute(feature)),
            };

            let outer = polygon
                .rings()
                .iter()
                .find_map(|ring| match ring {
                    PolygonRing::Outer(points) => Some(points),
                    PolygonRing::Inner(_) => None,
                })
                .ok_or_else(|| ProcessingError::InvalidGridNum {
                    feature,
                    details: format!("grid_num {} has no outer ring", grid_num),
                })?;

            let exterior: Vec<Coord<f64>> = outer.iter().map(|p| Coord { x: p.x, y: p.y }).collect();
            cells.push(build_cell(feature, grid_num, exterior)?);
        }

        Ok(cells)
    }

    /// Accepts a FeatureCollection of Polygon or MultiPolygon features.
    pub fn parse_geojson(&self, value: &Value) -> Result<Vec<GridCell>> {
        let features = value
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| ProcessingError::InvalidFormat("GeoJSON has no features array".to_string()))?;

        let mut cells = Vec::with_capacity(features.len());
        for (feature, item) in features.iter().enumerate() {
            let grid_num = match item.get("properties").and_then(|p| p.get(&self.attribute)) {
                Some(value) => json_to_grid_num(feature, value)?,
                None => return Err(self.missing_attribute(feature)),
            };

            let geometry = item.get("geometry").ok_or_else(|| ProcessingError::InvalidGridNum {
                feature,
                details: "feature has no geometry".to_string(),
            })?;
            let exterior = exterior_ring(geometry).ok_or_else(|| ProcessingError::InvalidGridNum {
                feature,
                details: "geometry is not a Polygon or MultiPolygon".to_string(),
            })?;

            cells.push(build_cell(feature, grid_num, exterior)?);
        }

        Ok(cells)
    }

    fn missing_attribute(&self, feature: usize) -> ProcessingError {
        ProcessingError::InvalidGridNum {
            feature,
            details: format!("missing '{}' attribute", self.attribute),
        }
    }
}

impl Default for GridDataLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn build_cell(feature: usize, grid_num: u32, exterior: Vec<Coord<f64>>) -> Result<GridCell> {
    let polygon = Polygon::new(LineString::from(exterior), vec![]);
    GridCell::from_polygon(grid_num, polygon).ok_or_else(|| ProcessingError::InvalidGridNum {
        feature,
        details: format!("grid_num {} has an empty polygon", grid_num),
    })
}

fn integral_grid_num(feature: usize, value: f64) -> Result<u32> {
    if !value.is_finite() || value.fract() != 0.0 || value < 0.0 || value > u32::MAX as f64 {
        return Err(ProcessingError::InvalidGridNum {
            feature,
            details: format!("{} is not a non-negative integer", value),
        });
    }
    Ok(value as u32)
}

fn field_to_grid_num(feature: usize, value: &FieldValue) -> Result<u32> {
    match value {
        FieldValue::Integer(v) => integral_grid_num(feature, *v as f64),
        FieldValue::Numeric(Some(v)) => integral_grid_num(feature, *v),
        FieldValue::Double(v) => integral_grid_num(feature, *v),
        FieldValue::Float(Some(v)) => integral_grid_num(feature, *v as f64),
        other => Err(ProcessingError::InvalidGridNum {
            feature,
            details: format!("unsupported value {:?}", other),
        }),
    }
}

fn json_to_grid_num(feature: usize, value: &Value) -> Result<u32> {
    match value.as_f64() {
        Some(v) => integral_grid_num(feature, v),
        None => Err(ProcessingError::InvalidGridNum {
            feature,
            details: format!("{} is not a number", value),
        }),
    }
}

fn ring_coords(ring: &Value) -> Option<Vec<Coord<f64>>> {
    ring.as_array()?
        .iter()
        .map(|point| {
            let pair = point.as_array()?;
            Some(Coord {
                x: pair.first()?.as_f64()?,
                y: pair.get(1)?.as_f64()?,
            })
        })
        .collect()
}

fn exterior_ring(geometry: &Value) -> Option<Vec<Coord<f64>>> {
    let coordinates = geometry.get("coordinates")?;
    match geometry.get("type")?.as_str()? {
        "Polygon" => ring_coords(coordinates.get(0)?),
        "MultiPolygon" => ring_coords(coordinates.get(0)?.get(0)?),
        _ => None,
    }
}

/// Rectangular lattice cells as a GeoJSON FeatureCollection, optionally limited
/// to cells intersecting `bbox` (min_lon, min_lat, max_lon, max_lat).
pub fn lattice_geojson(lattice: &LatticeConfig, bbox: Option<(f64, f64, f64, f64)>) -> Value {
    let features: Vec<Value> = lattice
        .grid_nums()
        .into_iter()
        .filter_map(|grid_num| {
            let (min_lon, min_lat, max_lon, max_lat) = lattice.cell_bounds(grid_num)?;
            if let Some((b_min_lon, b_min_lat, b_max_lon, b_max_lat)) = bbox {
                if max_lon < b_min_lon || min_lon > b_max_lon || max_lat < b_min_lat || min_lat > b_max_lat {
                    return None;
                }
            }
            Some(json!({
                "type": "Feature",
                "properties": { "grid_num": grid_num },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[
                        [min_lon, min_lat],
                        [max_lon, min_lat],
                        [max_lon, max_lat],
                        [min_lon, max_lat],
                        [min_lon, min_lat]
                    ]]
                }
            }))
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "name": lattice.name,
        "features": features
    })
}

pub fn write_lattice_geojson(
    lattice: &LatticeConfig,
    bbox: Option<(f64, f64, f64, f64)>,
    path: &Path,
) -> Result<usize> {
    let collection = lattice_geojson(lattice, bbox);
    let count = collection["features"].as_array().map_or(0, Vec::len);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(writer, &collection)?;
    info!("Wrote {} lattice cells to {}", count, path.display());
    Ok(count)
}

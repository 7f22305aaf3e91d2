use chrono::{NaiveDateTime, Timelike};

use crate::error::{ProcessingError, Result};
use crate::models::DataDomain;
use crate::utils::constants::{SNAPSHOT_EXTENSION, SNAPSHOT_TIMESTAMP_FORMAT};
use crate::utils::time::parse_timestamp;

/// Object store path of a raw snapshot: `<prefix>/<YYYY-MM-DDTHH-MM-SS>.json`.
pub fn snapshot_path(domain: DataDomain, timestamp: NaiveDateTime) -> String {
    format!(
        "{}/{}.{}",
        domain.store_prefix(),
        timestamp.format(SNAPSHOT_TIMESTAMP_FORMAT),
        SNAPSHOT_EXTENSION
    )
}

/// Recovers the snapshot timestamp from a stored path, truncated to the minute.
pub fn timestamp_from_path(path: &str) -> Result<NaiveDateTime> {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let stem = file_name
        .strip_suffix(&format!(".{}", SNAPSHOT_EXTENSION))
        .unwrap_or(file_name);

    let parsed = NaiveDateTime::parse_from_str(stem, SNAPSHOT_TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(stem, "%Y-%m-%dT%H-%M"))
        .map_err(|_| {
            ProcessingError::InvalidFormat(format!("No snapshot timestamp in path '{}'", path))
        })?;

    Ok(parsed.with_second(0).unwrap_or(parsed))
}

/// Selects the `[start, end)` window of sorted snapshot paths.
///
/// A selector that parses as a timestamp is compared against each path's
/// timestamp; anything else is matched as a substring of the path, and the
/// first matching path marks the boundary.
pub fn select_window(paths: &[String], start: Option<&str>, end: Option<&str>) -> Result<Vec<String>> {
    let mut sorted: Vec<String> = paths.to_vec();
    sorted.sort();

    let start_idx = match start {
        Some(selector) => boundary_index(&sorted, selector)?,
        None => 0,
    };
    let end_idx = match end {
        Some(selector) => boundary_index(&sorted, selector)?,
        None => sorted.len(),
    };

    if end_idx <= start_idx {
        return Ok(Vec::new());
    }
    Ok(sorted[start_idx..end_idx].to_vec())
}

fn boundary_index(sorted: &[String], selector: &str) -> Result<usize> {
    if let Ok(boundary) = parse_timestamp(selector) {
        return Ok(sorted
            .iter()
            .position(|p| timestamp_from_path(p).map(|ts| ts >= boundary).unwrap_or(false))
            .unwrap_or(sorted.len()));
    }

    sorted
        .iter()
        .position(|p| p.contains(selector))
        .ok_or_else(|| ProcessingError::MissingData(format!("No snapshot matches '{}'", selector)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Measure;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 1, 5)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn paths() -> Vec<String> {
        vec![
            "taxis/2022-01-05T10-30-00.json".to_string(),
            "taxis/2022-01-05T10-00-00.json".to_string(),
            "taxis/2022-01-05T10-15-00.json".to_string(),
            "taxis/2022-01-05T10-45-00.json".to_string(),
        ]
    }

    #[test]
    fn test_snapshot_path() {
        assert_eq!(
            snapshot_path(DataDomain::TaxiAvailability, ts(10, 15, 7)),
            "taxis/2022-01-05T10-15-07.json"
        );
        assert_eq!(
            snapshot_path(DataDomain::Weather(Measure::Rainfall), ts(10, 15, 7)),
            "rainfall/2022-01-05T10-15-07.json"
        );
    }

    #[test]
    fn test_timestamp_from_path() {
        assert_eq!(
            timestamp_from_path("air-temperature/2022-01-05T10-15-07.json").unwrap(),
            ts(10, 15, 0)
        );
        assert!(timestamp_from_path("taxis/latest.json").is_err());
    }

    #[test]
    fn test_select_window_by_substring() {
        let window = select_window(&paths(), Some("T10-15"), Some("T10-45")).unwrap();
        assert_eq!(
            window,
            vec![
                "taxis/2022-01-05T10-15-00.json".to_string(),
                "taxis/2022-01-05T10-30-00.json".to_string(),
            ]
        );
        assert!(select_window(&paths(), Some("T11-00"), None).is_err());
    }

    #[test]
    fn test_select_window_by_timestamp() {
        let window = select_window(&paths(), Some("2022-01-05 10:20"), None).unwrap();
        assert_eq!(window.len(), 2);
        assert_eq!(select_window(&paths(), None, None).unwrap().len(), 4);
    }
}

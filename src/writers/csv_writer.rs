use serde::Serialize;
use std::path::Path;

use crate::error::Result;

/// Writes rows with a header line. Missing values become empty fields.
pub fn write_csv<T: Serialize>(rows: &[T], path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(rows.len())
}

//! Tabular dataset loading.
//!
//! A dataset is a delimited file whose first row names the columns. Each
//! subsequent row becomes one test case; all columns are exposed as template
//! variables.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use crate::error::DatasetError;

/// A single dataset row, mapping column name to value.
pub type Row = BTreeMap<String, String>;

/// Reads a CSV file and returns its rows as column-to-value maps.
///
/// The first row is treated as headers (column names). Rows whose column
/// count differs from the header are an error.
pub fn load_csv(path: &Path) -> Result<Vec<Row>, DatasetError> {
    let file = File::open(path).map_err(|source| DatasetError::Open {
        path: path.display().to_string(),
        source,
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|source| DatasetError::Parse {
            path: path.display().to_string(),
            source,
        })?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if headers.is_empty() {
        return Err(DatasetError::Empty(path.display().to_string()));
    }

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|source| DatasetError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        if record.len() != headers.len() {
            // Row numbering counts the header as row 1 to match file line numbers.
            return Err(DatasetError::ColumnMismatch {
                row: i + 2,
                got: record.len(),
                expected: headers.len(),
            });
        }

        let row: Row = headers
            .iter()
            .cloned()
            .zip(record.iter().map(|v| v.to_string()))
            .collect();
        rows.push(row);
    }

    Ok(rows)
}

/// Reads rows in the inclusive 1-based range `[start, end]`.
///
/// Row 1 is the first data row (after the header). `end` is clamped to the
/// number of available rows; a `start` past the last row yields an empty
/// list.
pub fn load_csv_range(path: &Path, start: i64, end: i64) -> Result<Vec<Row>, DatasetError> {
    if start < 1 {
        return Err(DatasetError::RangeStart(start));
    }
    if end < start {
        return Err(DatasetError::RangeOrder { start, end });
    }

    let all_rows = load_csv(path)?;

    let start = start as usize;
    let end = (end as usize).min(all_rows.len());

    if start > all_rows.len() {
        return Ok(Vec::new());
    }

    Ok(all_rows[start - 1..end].to_vec())
}

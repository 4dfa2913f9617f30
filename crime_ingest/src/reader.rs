use crate::error::ParseError;
use std::path::Path;

/// Untyped contents of one CSV file: header labels as written, and one cell
/// per header for every record. Empty cells are `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawBatch {
    pub fn height(&self) -> usize {
        self.rows.len()
    }
}

/// Read a headed CSV file into memory.
///
/// Short records are padded with missing cells; a record wider than the header,
/// a non-UTF-8 byte, or a file without a header makes the whole file unreadable.
pub fn read_csv(path: &Path) -> Result<RawBatch, ParseError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| ParseError::new(path, e))?;

    let columns: Vec<String> = rdr
        .headers()
        .map_err(|e| ParseError::new(path, e))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    if columns.iter().all(|c| c.trim().is_empty()) {
        return Err(ParseError::new(path, "missing header row"));
    }

    let width = columns.len();
    let mut rows = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| ParseError::new(path, e))?;
        if record.len() > width {
            return Err(ParseError::new(
                path,
                format!(
                    "record {} has {} fields, header has {}",
                    idx + 1,
                    record.len(),
                    width
                ),
            ));
        }

        let mut row: Vec<Option<String>> = record
            .iter()
            .map(|cell| {
                if cell.is_empty() {
                    None
                } else {
                    Some(cell.to_string())
                }
            })
            .collect();
        row.resize(width, None);
        rows.push(row);
    }

    Ok(RawBatch { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_read_pads_short_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("street.csv");
        fs::write(&path, "Crime ID,Month,Longitude\nabc,2021-07,-0.1\n,2021-08\n").unwrap();

        let batch = read_csv(&path).unwrap();
        assert_eq!(batch.columns, vec!["Crime ID", "Month", "Longitude"]);
        assert_eq!(batch.height(), 2);
        assert_eq!(batch.rows[1], vec![None, Some("2021-08".to_string()), None]);
    }

    #[test]
    fn test_read_rejects_wide_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("street.csv");
        fs::write(&path, "Month,Latitude\n2021-07,51.5,extra,cells\n").unwrap();

        let err = read_csv(&path).unwrap_err();
        assert!(err.reason.contains("header has 2"));
    }

    #[test]
    fn test_read_rejects_empty_and_binary_files() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("empty.csv");
        fs::write(&empty, "").unwrap();
        assert!(read_csv(&empty).is_err());

        let binary = dir.path().join("binary.csv");
        fs::write(&binary, [b'M', b',', 0xff, 0xfe, b'\n', 0xc3, b'\n']).unwrap();
        assert!(read_csv(&binary).is_err());

        assert!(read_csv(&dir.path().join("absent.csv")).is_err());
    }
}

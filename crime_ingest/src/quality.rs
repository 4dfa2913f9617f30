use crate::error::ReadError;
use crate::models::Table;
use crate::store::Store;
use polars::prelude::*;
use std::fmt;

/// Post-load checks over the stored crime table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualityReport {
    pub crime_rows: usize,
    pub census_rows: u64,
    pub non_finite_coordinates: usize,
    pub missing_categories: usize,
    pub missing_months: usize,
    /// Rows whose month is not the first day; expected when sources carry full dates.
    pub non_first_of_month: usize,
    /// Groups of identical stored rows. Only rows within one file are deduplicated, so
    /// repeats across files or append runs are expected.
    pub duplicate_groups: usize,
    pub crime_types: usize,
}

impl QualityReport {
    /// Findings that break the load invariants.
    pub fn issues(&self) -> usize {
        self.non_finite_coordinates + self.missing_categories + self.missing_months
    }

    pub fn passed(&self) -> bool {
        self.issues() == 0
    }
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "crime rows: {}", self.crime_rows)?;
        writeln!(f, "census rows: {}", self.census_rows)?;
        writeln!(f, "distinct crime types: {}", self.crime_types)?;
        writeln!(f, "non-finite coordinates: {}", self.non_finite_coordinates)?;
        writeln!(f, "missing categories: {}", self.missing_categories)?;
        writeln!(f, "missing months: {}", self.missing_months)?;
        writeln!(f, "duplicate row groups: {}", self.duplicate_groups)?;
        write!(f, "months not on the 1st: {}", self.non_first_of_month)
    }
}

fn non_finite(df: &DataFrame, column: &str) -> PolarsResult<usize> {
    Ok(df
        .column(column)?
        .f64()?
        .into_iter()
        .filter(|v| !matches!(v, Some(x) if x.is_finite()))
        .count())
}

/// Inspect a crime frame as produced by `frame::crime_frame`.
pub fn check_crime_frame(df: &DataFrame) -> PolarsResult<QualityReport> {
    let mut report = QualityReport {
        crime_rows: df.height(),
        ..Default::default()
    };
    if df.height() == 0 {
        return Ok(report);
    }

    report.non_finite_coordinates = non_finite(df, "longitude")? + non_finite(df, "latitude")?;
    report.missing_categories =
        df.column("crime_type")?.null_count() + df.column("outcome_type")?.null_count();
    report.missing_months = df.column("month")?.null_count();

    report.non_first_of_month = df
        .clone()
        .lazy()
        .filter(col("month").dt().day().neq(lit(1)))
        .collect()?
        .height();

    let keys: Vec<Expr> = df
        .get_column_names()
        .into_iter()
        .map(|name| col(name.as_str()))
        .collect();
    report.duplicate_groups = df
        .clone()
        .lazy()
        .group_by(keys)
        .agg([len().alias("count")])
        .filter(col("count").gt(lit(1)))
        .collect()?
        .height();

    report.crime_types = df.column("crime_type")?.n_unique()?;
    Ok(report)
}

/// Run every check against what is currently stored.
pub fn verify_store(store: &Store) -> Result<QualityReport, ReadError> {
    let df = store.crime_frame()?;
    let mut report = check_crime_frame(&df)?;
    report.census_rows = store.row_count(Table::CensusDemographics)?;

    if report.passed() {
        log::info!("Data quality verification passed for {}", store.target());
    } else {
        log::warn!(
            "Data quality verification found {} issues in {}",
            report.issues(),
            store.target()
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::crime_frame;
    use crate::models::CrimeRecord;
    use chrono::NaiveDate;

    fn record(day: u32, crime_type: &str) -> CrimeRecord {
        CrimeRecord {
            crime_id: None,
            month: NaiveDate::from_ymd_opt(2021, 7, day).unwrap(),
            reported_by: None,
            falls_within: None,
            longitude: -0.1,
            latitude: 51.5,
            location: None,
            lsoa_code: None,
            lsoa_name: None,
            crime_type: crime_type.to_string(),
            outcome_type: "Unknown".to_string(),
            context: None,
        }
    }

    #[test]
    fn test_clean_frame_passes() {
        let df = crime_frame(&[record(1, "Burglary"), record(15, "Robbery")]).unwrap();
        let report = check_crime_frame(&df).unwrap();

        assert!(report.passed());
        assert_eq!(report.crime_rows, 2);
        assert_eq!(report.crime_types, 2);
        assert_eq!(report.non_first_of_month, 1);
    }

    #[test]
    fn test_bad_coordinates_are_issues() {
        let mut bad = record(1, "Robbery");
        bad.latitude = f64::NAN;
        let df = crime_frame(&[record(1, "Burglary"), bad]).unwrap();
        let report = check_crime_frame(&df).unwrap();

        assert_eq!(report.non_finite_coordinates, 1);
        assert_eq!(report.issues(), 1);
        assert!(!report.passed());
    }

    #[test]
    fn test_repeated_rows_are_reported_but_pass() {
        let df = crime_frame(&[record(1, "Burglary"), record(1, "Burglary"), record(1, "Robbery")])
            .unwrap();
        let report = check_crime_frame(&df).unwrap();

        assert_eq!(report.duplicate_groups, 1);
        assert_eq!(report.issues(), 0);
        assert!(report.passed());
    }

    #[test]
    fn test_empty_frame() {
        let df = crime_frame(&[]).unwrap();
        let report = check_crime_frame(&df).unwrap();
        assert!(report.passed());
        assert_eq!(report.crime_rows, 0);
    }
}

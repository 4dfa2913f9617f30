use crate::models::{bucket_columns, CensusRecord, CrimeRecord, UNKNOWN_CATEGORY};
use crate::schema::Frame;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::ops::AddAssign;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    MissingCoordinate,
    InvalidCoordinate,
    InvalidMonth,
    Duplicate,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DropReason::MissingCoordinate => "missing coordinate",
            DropReason::InvalidCoordinate => "invalid coordinate",
            DropReason::InvalidMonth => "invalid month",
            DropReason::Duplicate => "duplicate",
        };
        f.write_str(label)
    }
}

/// Rows removed from a batch, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropCounts {
    pub missing_coordinate: usize,
    pub invalid_coordinate: usize,
    pub invalid_month: usize,
    pub duplicate: usize,
}

impl DropCounts {
    pub fn record(&mut self, reason: DropReason) {
        match reason {
            DropReason::MissingCoordinate => self.missing_coordinate += 1,
            DropReason::InvalidCoordinate => self.invalid_coordinate += 1,
            DropReason::InvalidMonth => self.invalid_month += 1,
            DropReason::Duplicate => self.duplicate += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.missing_coordinate + self.invalid_coordinate + self.invalid_month + self.duplicate
    }
}

impl AddAssign for DropCounts {
    fn add_assign(&mut self, other: Self) {
        self.missing_coordinate += other.missing_coordinate;
        self.invalid_coordinate += other.invalid_coordinate;
        self.invalid_month += other.invalid_month;
        self.duplicate += other.duplicate;
    }
}

impl fmt::Display for DropCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} dropped ({} {}, {} {}, {} {}, {} {})",
            self.total(),
            self.missing_coordinate,
            DropReason::MissingCoordinate,
            self.invalid_coordinate,
            DropReason::InvalidCoordinate,
            self.invalid_month,
            DropReason::InvalidMonth,
            self.duplicate,
            DropReason::Duplicate
        )
    }
}

/// Output of cleaning one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Cleaned<R> {
    pub records: Vec<R>,
    pub dropped: DropCounts,
}

impl<R> Cleaned<R> {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parse a coordinate cell; `None` for anything that is not a finite number.
pub fn coerce_coordinate(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Pad `YYYY-MM` to the first of the month, then parse as a calendar date.
pub fn normalize_month(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    let padded;
    let value = if value.chars().count() == 7 {
        padded = format!("{}-01", value);
        padded.as_str()
    } else {
        value
    };
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Count cells tolerate thousands separators; anything unusable counts as 0.
pub fn coerce_count(raw: Option<&str>) -> i64 {
    let Some(raw) = raw else {
        return 0;
    };
    let digits: String = raw.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();

    if let Ok(value) = digits.parse::<i64>() {
        return value.max(0);
    }
    match digits.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 && value < i64::MAX as f64 => value as i64,
        _ => 0,
    }
}

fn cell<'a>(row: &'a [Option<String>], idx: Option<usize>) -> Option<&'a str> {
    idx.and_then(|i| row.get(i)).and_then(|c| c.as_deref())
}

fn owned(row: &mut [Option<String>], idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| row.get_mut(i)).and_then(Option::take)
}

/// Keep the first occurrence of every key, in order.
fn dedupe<R, K: Hash + Eq>(records: Vec<R>, key: impl Fn(&R) -> K) -> (Vec<R>, usize) {
    let mut seen = HashSet::with_capacity(records.len());
    let before = records.len();
    let kept: Vec<R> = records.into_iter().filter(|r| seen.insert(key(r))).collect();
    let removed = before - kept.len();
    (kept, removed)
}

struct CrimeColumns {
    crime_id: Option<usize>,
    month: Option<usize>,
    reported_by: Option<usize>,
    falls_within: Option<usize>,
    longitude: Option<usize>,
    latitude: Option<usize>,
    location: Option<usize>,
    lsoa_code: Option<usize>,
    lsoa_name: Option<usize>,
    crime_type: Option<usize>,
    outcome_type: Option<usize>,
    context: Option<usize>,
}

impl CrimeColumns {
    fn locate(frame: &Frame) -> Self {
        Self {
            crime_id: frame.column_index("crime_id"),
            month: frame.column_index("month"),
            reported_by: frame.column_index("reported_by"),
            falls_within: frame.column_index("falls_within"),
            longitude: frame.column_index("longitude"),
            latitude: frame.column_index("latitude"),
            location: frame.column_index("location"),
            lsoa_code: frame.column_index("lsoa_code"),
            lsoa_name: frame.column_index("lsoa_name"),
            crime_type: frame.column_index("crime_type"),
            outcome_type: frame.column_index("outcome_type"),
            context: frame.column_index("context"),
        }
    }
}

fn clean_crime_row(
    cols: &CrimeColumns,
    mut row: Vec<Option<String>>,
) -> Result<CrimeRecord, DropReason> {
    // Categorical defaults first, so a missing category never drops a row.
    let crime_type =
        owned(&mut row, cols.crime_type).unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
    let outcome_type =
        owned(&mut row, cols.outcome_type).unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());

    let (Some(raw_lat), Some(raw_lon)) = (cell(&row, cols.latitude), cell(&row, cols.longitude))
    else {
        return Err(DropReason::MissingCoordinate);
    };
    let (Some(latitude), Some(longitude)) = (coerce_coordinate(raw_lat), coerce_coordinate(raw_lon))
    else {
        return Err(DropReason::InvalidCoordinate);
    };

    let month = cell(&row, cols.month)
        .and_then(normalize_month)
        .ok_or(DropReason::InvalidMonth)?;

    Ok(CrimeRecord {
        crime_id: owned(&mut row, cols.crime_id),
        month,
        reported_by: owned(&mut row, cols.reported_by),
        falls_within: owned(&mut row, cols.falls_within),
        longitude,
        latitude,
        location: owned(&mut row, cols.location),
        lsoa_code: owned(&mut row, cols.lsoa_code),
        lsoa_name: owned(&mut row, cols.lsoa_name),
        crime_type,
        outcome_type,
        context: owned(&mut row, cols.context),
    })
}

/// Enforce the crime row invariants on a normalized batch.
pub fn clean_crime(frame: Frame) -> Cleaned<CrimeRecord> {
    let cols = CrimeColumns::locate(&frame);
    let mut dropped = DropCounts::default();
    let mut records = Vec::with_capacity(frame.height());

    for row in frame.rows {
        match clean_crime_row(&cols, row) {
            Ok(record) => records.push(record),
            Err(reason) => {
                log::debug!("Dropping crime row: {}", reason);
                dropped.record(reason);
            }
        }
    }

    let (records, duplicates) = dedupe(records, CrimeRecord::row_key);
    dropped.duplicate += duplicates;

    Cleaned { records, dropped }
}

/// Coerce census counts and remove duplicate rows. Census rows are never
/// dropped for bad values.
pub fn clean_census(frame: Frame) -> Cleaned<CensusRecord> {
    let year_idx = frame.column_index("year");
    let lad_code = frame.column_index("lad_code");
    let lad_name = frame.column_index("lad_name");
    let lsoa_code = frame.column_index("lsoa_code");
    let lsoa_name = frame.column_index("lsoa_name");
    let total = frame.column_index("total");
    let buckets: Vec<Option<usize>> = bucket_columns()
        .iter()
        .map(|c| frame.column_index(c))
        .collect();

    let records: Vec<CensusRecord> = frame
        .rows
        .into_iter()
        .map(|mut row| CensusRecord {
            year: cell(&row, year_idx)
                .and_then(|y| y.trim().parse().ok())
                .unwrap_or_default(),
            total: coerce_count(cell(&row, total)),
            buckets: buckets.iter().map(|idx| coerce_count(cell(&row, *idx))).collect(),
            lad_code: owned(&mut row, lad_code),
            lad_name: owned(&mut row, lad_name),
            lsoa_code: owned(&mut row, lsoa_code),
            lsoa_name: owned(&mut row, lsoa_name),
        })
        .collect();

    let (records, duplicates) = dedupe(records, CensusRecord::clone);
    let dropped = DropCounts {
        duplicate: duplicates,
        ..DropCounts::default()
    };

    Cleaned { records, dropped }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Literal stored for a missing `crime_type` or `outcome_type`.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Highest age bucket in the census extracts (`f0..=f90`, `m0..=m90`).
pub const MAX_AGE_BUCKET: usize = 90;

/// Number of per-age-per-sex census buckets.
pub const BUCKET_COUNT: usize = 2 * (MAX_AGE_BUCKET + 1);

pub const CRIME_COLUMNS: [&str; 12] = [
    "crime_id",
    "month",
    "reported_by",
    "falls_within",
    "longitude",
    "latitude",
    "location",
    "lsoa_code",
    "lsoa_name",
    "crime_type",
    "outcome_type",
    "context",
];

pub const CENSUS_KEY_COLUMNS: [&str; 6] = [
    "year",
    "lad_code",
    "lad_name",
    "lsoa_code",
    "lsoa_name",
    "total",
];

/// Destination tables owned by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Table {
    CrimeRecords,
    CensusDemographics,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::CrimeRecords => "crime_records",
            Table::CensusDemographics => "census_demographics",
        }
    }

    /// Canonical column list, in storage order, excluding the surrogate id.
    pub fn columns(&self) -> Vec<String> {
        match self {
            Table::CrimeRecords => CRIME_COLUMNS.iter().map(|c| c.to_string()).collect(),
            Table::CensusDemographics => census_columns(),
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `f0..f90` followed by `m0..m90`.
pub fn bucket_columns() -> Vec<String> {
    let females = (0..=MAX_AGE_BUCKET).map(|age| format!("f{}", age));
    let males = (0..=MAX_AGE_BUCKET).map(|age| format!("m{}", age));
    females.chain(males).collect()
}

pub fn census_columns() -> Vec<String> {
    CENSUS_KEY_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(bucket_columns())
        .collect()
}

/// One cleaned street-level crime row.
///
/// Field order matches `CRIME_COLUMNS`; the staging CSV is serialized straight
/// from this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrimeRecord {
    pub crime_id: Option<String>,
    pub month: NaiveDate,
    pub reported_by: Option<String>,
    pub falls_within: Option<String>,
    pub longitude: f64,
    pub latitude: f64,
    pub location: Option<String>,
    pub lsoa_code: Option<String>,
    pub lsoa_name: Option<String>,
    pub crime_type: String,
    pub outcome_type: String,
    pub context: Option<String>,
}

/// Hashable identity of a crime row; floats compare by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CrimeRowKey {
    text: [Option<String>; 9],
    month: NaiveDate,
    longitude: u64,
    latitude: u64,
}

impl CrimeRecord {
    pub(crate) fn row_key(&self) -> CrimeRowKey {
        CrimeRowKey {
            text: [
                self.crime_id.clone(),
                self.reported_by.clone(),
                self.falls_within.clone(),
                self.location.clone(),
                self.lsoa_code.clone(),
                self.lsoa_name.clone(),
                Some(self.crime_type.clone()),
                Some(self.outcome_type.clone()),
                self.context.clone(),
            ],
            month: self.month,
            longitude: self.longitude.to_bits(),
            latitude: self.latitude.to_bits(),
        }
    }
}

/// One cleaned census row for a single LSOA and year.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CensusRecord {
    pub year: i32,
    pub lad_code: Option<String>,
    pub lad_name: Option<String>,
    pub lsoa_code: Option<String>,
    pub lsoa_name: Option<String>,
    pub total: i64,
    /// Female buckets `f0..=f90` then male buckets `m0..=m90`.
    pub buckets: Vec<i64>,
}

impl CensusRecord {
    /// Count for a bucket column such as `"f45"` or `"m0"`.
    pub fn bucket(&self, column: &str) -> Option<i64> {
        let mut chars = column.chars();
        let sex = chars.next()?;
        let age: usize = chars.as_str().parse().ok()?;
        if age > MAX_AGE_BUCKET {
            return None;
        }
        let offset = match sex {
            'f' => 0,
            'm' => MAX_AGE_BUCKET + 1,
            _ => return None,
        };
        self.buckets.get(offset + age).copied()
    }
}

use crate::error::NormalizeError;
use crate::models::{bucket_columns, CRIME_COLUMNS};
use crate::reader::RawBatch;
use std::collections::HashMap;

/// Rows aligned to a canonical column list. Cells are still raw strings; the
/// cleaner does the type coercion.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Frame {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ColumnDefault {
    /// Absent column becomes all-missing.
    Missing,
    /// Absent column is filled with this value.
    Fill(String),
    /// Column always takes this value, present or not.
    Derived(String),
}

/// Where a canonical cell comes from.
enum Source {
    Column(usize),
    Value(Option<String>),
}

/// Lowercase snake-case form of a source header label.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase().replace(' ', "_")
}

/// Synonyms in crime extracts, keyed by normalized label.
pub fn crime_renames() -> HashMap<String, String> {
    HashMap::from([(
        "last_outcome_category".to_string(),
        "outcome_type".to_string(),
    )])
}

/// Year-keyed census headers ("LAD 2011 Code" and friends) for one census year.
pub fn census_renames(year: i32) -> HashMap<String, String> {
    [
        ("LAD {} Code", "lad_code"),
        ("LAD {} Name", "lad_name"),
        ("LSOA {} Code", "lsoa_code"),
        ("LSOA {} Name", "lsoa_name"),
    ]
    .iter()
    .map(|(template, canonical)| {
        let label = template.replace("{}", &year.to_string());
        (normalize_label(&label), canonical.to_string())
    })
    .collect()
}

/// Census year from an extract's file name: the leading four characters when
/// they are digits, otherwise the first standalone four-digit year.
pub fn year_from_file_name(file_name: &str) -> Result<i32, NormalizeError> {
    if let Some(prefix) = file_name.get(..4) {
        if prefix.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(year) = prefix.parse() {
                return Ok(year);
            }
        }
    }

    file_name
        .split(|c: char| !c.is_ascii_digit())
        .filter(|run| run.len() == 4)
        .filter_map(|run| run.parse::<i32>().ok())
        .find(|year| (1900..=2100).contains(year))
        .ok_or_else(|| NormalizeError::MissingYear(file_name.to_string()))
}

/// Maps a raw batch onto one canonical column list.
#[derive(Debug, Clone)]
pub struct SchemaNormalizer {
    renames: HashMap<String, String>,
    columns: Vec<(String, ColumnDefault)>,
}

impl SchemaNormalizer {
    pub fn crime() -> Self {
        Self {
            renames: crime_renames(),
            columns: CRIME_COLUMNS
                .iter()
                .map(|c| (c.to_string(), ColumnDefault::Missing))
                .collect(),
        }
    }

    pub fn census(year: i32) -> Self {
        let mut columns = vec![
            ("year".to_string(), ColumnDefault::Derived(year.to_string())),
            ("lad_code".to_string(), ColumnDefault::Missing),
            ("lad_name".to_string(), ColumnDefault::Missing),
            ("lsoa_code".to_string(), ColumnDefault::Missing),
            ("lsoa_name".to_string(), ColumnDefault::Missing),
            ("total".to_string(), ColumnDefault::Fill("0".to_string())),
        ];
        columns.extend(
            bucket_columns()
                .into_iter()
                .map(|c| (c, ColumnDefault::Fill("0".to_string()))),
        );

        Self {
            renames: census_renames(year),
            columns,
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Canonical name a source label ends up with.
    pub fn canonical_label(&self, label: &str) -> String {
        let label = normalize_label(label);
        match self.renames.get(&label) {
            Some(renamed) => renamed.clone(),
            None => label,
        }
    }

    pub fn normalize(&self, raw: RawBatch) -> Frame {
        // Rename before defaults so a synonym is never shadowed by an injected column.
        let labels: Vec<String> = raw.columns.iter().map(|c| self.canonical_label(c)).collect();

        let mut positions: HashMap<&str, usize> = HashMap::new();
        for (idx, label) in labels.iter().enumerate() {
            if positions.contains_key(label.as_str()) {
                log::debug!("Ignoring repeated column {:?} at position {}", label, idx);
                continue;
            }
            positions.insert(label.as_str(), idx);
        }

        let plan: Vec<Source> = self
            .columns
            .iter()
            .map(|(name, default)| match (default, positions.get(name.as_str())) {
                (ColumnDefault::Derived(value), _) => Source::Value(Some(value.clone())),
                (_, Some(&idx)) => Source::Column(idx),
                (ColumnDefault::Fill(value), None) => {
                    log::debug!("Column {} absent, filling with {:?}", name, value);
                    Source::Value(Some(value.clone()))
                }
                (ColumnDefault::Missing, None) => {
                    log::debug!("Column {} absent, filling with missing", name);
                    Source::Value(None)
                }
            })
            .collect();

        let rows = raw
            .rows
            .into_iter()
            .map(|mut row| {
                plan.iter()
                    .map(|source| match source {
                        Source::Column(idx) => row.get_mut(*idx).and_then(Option::take),
                        Source::Value(value) => value.clone(),
                    })
                    .collect()
            })
            .collect();

        Frame {
            columns: self.columns().map(str::to_string).collect(),
            rows,
        }
    }
}

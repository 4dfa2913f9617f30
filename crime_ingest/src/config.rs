use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const IN_MEMORY: &str = ":memory:";

pub const DEFAULT_CRIME_SUFFIXES: [&str; 2] =
    ["city-of-london-street.csv", "metropolitan-street.csv"];

pub const DEFAULT_CENSUS_NEEDLE: &str = "LSOADemoData";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadStrategy {
    /// Reset the table once per run, then COPY each file's batch.
    #[default]
    TruncateBulkCopy,
    /// Keep existing rows and INSERT each file's batch row by row.
    AppendInsert,
}

impl fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStrategy::TruncateBulkCopy => f.write_str("truncate-bulk-copy"),
            LoadStrategy::AppendInsert => f.write_str("append-insert"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// DuckDB database file, or `:memory:`.
    pub database: String,
}

impl DestinationConfig {
    pub fn in_memory() -> Self {
        Self {
            database: IN_MEMORY.to_string(),
        }
    }

    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            database: path.as_ref().to_string_lossy().into_owned(),
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database == IN_MEMORY
    }
}

impl Default for DestinationConfig {
    fn default() -> Self {
        Self {
            database: "crime_data.duckdb".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root holding `YYYY-MM` folders of street-level crime extracts.
    pub crime_root: PathBuf,
    /// Root searched recursively for census demographic extracts.
    pub census_root: PathBuf,
    pub destination: DestinationConfig,
    pub load_strategy: LoadStrategy,
    /// Files read concurrently; 1 keeps the read phase sequential.
    pub read_workers: usize,
    /// Where staging CSVs are written; the system temp dir when unset.
    pub staging_dir: Option<PathBuf>,
    pub crime_suffixes: Vec<String>,
    pub census_needle: String,
    pub census_path_filter: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            crime_root: PathBuf::from("data/crime"),
            census_root: PathBuf::from("data/census"),
            destination: DestinationConfig::default(),
            load_strategy: LoadStrategy::default(),
            read_workers: 1,
            staging_dir: None,
            crime_suffixes: DEFAULT_CRIME_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            census_needle: DEFAULT_CENSUS_NEEDLE.to_string(),
            census_path_filter: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_config_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"crime_root": "/srv/police", "load_strategy": "append-insert",
                "destination": {{"database": ":memory:"}}}}"#
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.crime_root, PathBuf::from("/srv/police"));
        assert_eq!(config.load_strategy, LoadStrategy::AppendInsert);
        assert!(config.destination.is_in_memory());
        assert_eq!(config.read_workers, 1);
        assert_eq!(config.crime_suffixes.len(), 2);
        assert_eq!(config.census_needle, DEFAULT_CENSUS_NEEDLE);
    }

    #[test]
    fn test_invalid_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"load_strategy\": \"sometimes\"}}").unwrap();

        let err = PipelineConfig::from_json_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Json { .. }));
    }
}

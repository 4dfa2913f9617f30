use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The destination could not be established; the run aborts before any file.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("cannot open destination database {target}: {source}")]
    Open {
        target: String,
        #[source]
        source: duckdb::Error,
    },

    #[error("cannot prepare schema for {table}: {source}")]
    Schema {
        table: &'static str,
        #[source]
        source: duckdb::Error,
    },

    #[error("cannot reset table {table}: {source}")]
    Reset {
        table: &'static str,
        #[source]
        source: duckdb::Error,
    },
}

/// Something the naming convention promised is not on disk. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryWarning {
    MissingRoot(PathBuf),
    NonPeriodFolder(PathBuf),
    MissingFile(PathBuf),
}

impl fmt::Display for DiscoveryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryWarning::MissingRoot(p) => {
                write!(f, "source root {} does not exist", p.display())
            }
            DiscoveryWarning::NonPeriodFolder(p) => {
                write!(f, "skipping folder {} (does not match YYYY-MM)", p.display())
            }
            DiscoveryWarning::MissingFile(p) => write!(f, "file not found: {}", p.display()),
        }
    }
}

/// A source file could not be read as tabular data at all.
#[derive(Debug, Error)]
#[error("cannot parse {path}: {reason}")]
pub struct ParseError {
    pub path: PathBuf,
    pub reason: String,
}

impl ParseError {
    pub fn new(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("cannot derive a census year from file name {0:?}")]
    MissingYear(String),
}

/// Committing a cleaned batch failed; the file's transaction was rolled back.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("database error loading {table}: {source}")]
    Database {
        table: &'static str,
        #[source]
        source: duckdb::Error,
    },

    #[error("cannot stage rows for {table}: {source}")]
    Staging {
        table: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode staging rows for {table}: {source}")]
    Encode {
        table: &'static str,
        #[source]
        source: csv::Error,
    },
}

/// Failure while reading back stored rows for consumers.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("database error reading {table}: {source}")]
    Database {
        table: &'static str,
        #[source]
        source: duckdb::Error,
    },

    #[error("stored month {0:?} is not a date")]
    Month(String),

    #[error("cannot build frame: {0}")]
    Frame(#[from] polars::error::PolarsError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub mod cleaner;
pub mod config;
pub mod error;
pub mod frame;
pub mod models;
pub mod pipeline;
pub mod quality;
pub mod reader;
pub mod schema;
pub mod store;
pub mod walker;

pub use cleaner::{clean_census, clean_crime, Cleaned, DropCounts, DropReason};
pub use config::{DestinationConfig, LoadStrategy, PipelineConfig};
pub use error::{
    ConfigError, ConnectionError, DiscoveryWarning, LoadError, NormalizeError, ParseError,
    ReadError,
};
pub use models::{CensusRecord, CrimeRecord, Table};
pub use pipeline::{Dataset, FileFailure, FileOutcome, FileStage, IngestionPipeline, RunReport};
pub use quality::{verify_store, QualityReport};
pub use schema::SchemaNormalizer;
pub use store::Store;
pub use walker::{DiscoveryStrategy, FolderWalker, SourceFile};

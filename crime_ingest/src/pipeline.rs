use crate::cleaner::{clean_census, clean_crime, Cleaned, DropCounts};
use crate::config::{LoadStrategy, PipelineConfig};
use crate::error::{ConnectionError, DiscoveryWarning, ParseError};
use crate::models::Table;
use crate::reader::{read_csv, RawBatch};
use crate::schema::{year_from_file_name, SchemaNormalizer};
use crate::store::{Store, TableRecord};
use crate::walker::{DiscoveryStrategy, FolderWalker, SourceFile};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// A family of source files and the table it feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Crime,
    Census,
}

impl Dataset {
    pub fn table(&self) -> Table {
        match self {
            Dataset::Crime => Table::CrimeRecords,
            Dataset::Census => Table::CensusDemographics,
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dataset::Crime => f.write_str("crime"),
            Dataset::Census => f.write_str("census"),
        }
    }
}

/// Where in the per-file flow a file was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStage {
    Read,
    Normalize,
    Load,
}

impl fmt::Display for FileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStage::Read => f.write_str("read"),
            FileStage::Normalize => f.write_str("normalize"),
            FileStage::Load => f.write_str("load"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub stage: FileStage,
    pub reason: String,
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed at {}: {}", self.path.display(), self.stage, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Loaded {
        path: PathBuf,
        rows: u64,
        dropped: DropCounts,
    },
    /// Every row was dropped; nothing was written.
    Empty { path: PathBuf, dropped: DropCounts },
    Failed(FileFailure),
}

impl FileOutcome {
    pub fn path(&self) -> &Path {
        match self {
            FileOutcome::Loaded { path, .. } | FileOutcome::Empty { path, .. } => path,
            FileOutcome::Failed(failure) => &failure.path,
        }
    }

    fn failed(file: &SourceFile, stage: FileStage, reason: impl fmt::Display) -> Self {
        FileOutcome::Failed(FileFailure {
            path: file.path.clone(),
            stage,
            reason: reason.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub dataset: Dataset,
    pub files_attempted: usize,
    pub files_succeeded: usize,
    pub files_empty: usize,
    pub failures: Vec<FileFailure>,
    pub warnings: Vec<DiscoveryWarning>,
    pub rows_loaded: u64,
    pub rows_dropped: DropCounts,
    pub elapsed: Duration,
}

impl RunReport {
    fn new(dataset: Dataset) -> Self {
        Self {
            dataset,
            files_attempted: 0,
            files_succeeded: 0,
            files_empty: 0,
            failures: Vec::new(),
            warnings: Vec::new(),
            rows_loaded: 0,
            rows_dropped: DropCounts::default(),
            elapsed: Duration::ZERO,
        }
    }

    fn record(&mut self, outcome: &FileOutcome) {
        self.files_attempted += 1;
        match outcome {
            FileOutcome::Loaded { rows, dropped, .. } => {
                self.files_succeeded += 1;
                self.rows_loaded += rows;
                self.rows_dropped += *dropped;
            }
            FileOutcome::Empty { dropped, .. } => {
                self.files_empty += 1;
                self.rows_dropped += *dropped;
            }
            FileOutcome::Failed(failure) => self.failures.push(failure.clone()),
        }
    }

    pub fn files_failed(&self) -> usize {
        self.failures.len()
    }

    pub fn log_summary(&self) {
        log::info!("{} ingestion finished in {:.2?}", self.dataset, self.elapsed);
        log::info!(
            "  files: {} attempted, {} loaded, {} empty, {} failed",
            self.files_attempted,
            self.files_succeeded,
            self.files_empty,
            self.files_failed()
        );
        log::info!("  rows loaded: {}", self.rows_loaded);
        log::info!("  rows dropped: {} ({})", self.rows_dropped.total(), self.rows_dropped);
        if !self.warnings.is_empty() {
            log::warn!("  discovery warnings: {}", self.warnings.len());
        }
        for failure in &self.failures {
            log::warn!("  {}", failure);
        }
    }
}

/// Owns the destination and drives discovery, cleaning and loading for one dataset at a time.
pub struct IngestionPipeline {
    config: PipelineConfig,
    store: Store,
}

impl IngestionPipeline {
    pub fn init(config: PipelineConfig) -> Result<Self, ConnectionError> {
        let store = Store::open(&config.destination)?;
        log::info!(
            "Pipeline ready: strategy {}, {} read worker(s)",
            config.load_strategy,
            config.read_workers.max(1)
        );
        Ok(Self { config, store })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn run(&mut self, dataset: Dataset) -> Result<RunReport, ConnectionError> {
        self.run_with(dataset, |_| {})
    }

    /// Ingest every discovered file of `dataset`, calling `observer` after each one.
    ///
    /// Only a failed table reset is returned as an error; per-file problems
    /// end up in the report.
    pub fn run_with(
        &mut self,
        dataset: Dataset,
        observer: impl FnMut(&FileOutcome),
    ) -> Result<RunReport, ConnectionError> {
        if self.config.load_strategy == LoadStrategy::TruncateBulkCopy {
            self.store.reset_table(dataset.table())?;
        }
        Ok(self.ingest(dataset, observer))
    }

    /// Empty the dataset's table and ingest it again, whatever the strategy.
    pub fn reload(&mut self, dataset: Dataset) -> Result<RunReport, ConnectionError> {
        log::info!("Reloading {} from scratch", dataset);
        self.store.reset_table(dataset.table())?;
        Ok(self.ingest(dataset, |_| {}))
    }

    fn walker(&self, dataset: Dataset) -> FolderWalker {
        match dataset {
            Dataset::Crime => FolderWalker::new(
                self.config.crime_root.clone(),
                DiscoveryStrategy::StructuredPeriod {
                    suffixes: self.config.crime_suffixes.clone(),
                },
            ),
            Dataset::Census => FolderWalker::new(
                self.config.census_root.clone(),
                DiscoveryStrategy::PatternGlob {
                    needle: self.config.census_needle.clone(),
                    path_filter: self.config.census_path_filter.clone(),
                },
            ),
        }
    }

    fn read_pool(&self) -> Option<ThreadPool> {
        let workers = self.config.read_workers;
        if workers <= 1 {
            return None;
        }
        match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => Some(pool),
            Err(e) => {
                log::warn!("Cannot start {} read workers, reading sequentially: {}", workers, e);
                None
            }
        }
    }

    fn ingest(&mut self, dataset: Dataset, mut observer: impl FnMut(&FileOutcome)) -> RunReport {
        let started = Instant::now();
        let mut report = RunReport::new(dataset);
        let walker = self.walker(dataset);
        let pool = self.read_pool();
        let window = self.config.read_workers.max(1);

        log::info!("Starting {} ingestion from {}", dataset, walker.root().display());

        let mut pending: Vec<SourceFile> = Vec::with_capacity(window);
        for discovered in walker.candidates() {
            match discovered {
                Ok(file) => {
                    pending.push(file);
                    if pending.len() == window {
                        self.ingest_window(
                            dataset,
                            pool.as_ref(),
                            &mut pending,
                            &mut report,
                            &mut observer,
                        );
                    }
                }
                Err(warning) => {
                    log::warn!("{}", warning);
                    report.warnings.push(warning);
                }
            }
        }
        if !pending.is_empty() {
            self.ingest_window(
                dataset,
                pool.as_ref(),
                &mut pending,
                &mut report,
                &mut observer,
            );
        }

        report.elapsed = started.elapsed();
        report
    }

    fn ingest_window(
        &mut self,
        dataset: Dataset,
        pool: Option<&ThreadPool>,
        pending: &mut Vec<SourceFile>,
        report: &mut RunReport,
        observer: &mut impl FnMut(&FileOutcome),
    ) {
        let batches = read_window(pool, pending);
        for (file, raw) in pending.drain(..).zip(batches) {
            let outcome = self.ingest_file(dataset, &file, raw);
            match &outcome {
                FileOutcome::Loaded { rows, dropped, .. } => log::info!(
                    "Loaded {} rows from {} ({} dropped)",
                    rows,
                    file.file_name(),
                    dropped.total()
                ),
                FileOutcome::Empty { dropped, .. } => log::warn!(
                    "No valid rows in {} ({} dropped: {})",
                    file.file_name(),
                    dropped.total(),
                    dropped
                ),
                FileOutcome::Failed(failure) => log::error!("{}", failure),
            }
            report.record(&outcome);
            observer(&outcome);
        }
    }

    fn ingest_file(
        &mut self,
        dataset: Dataset,
        file: &SourceFile,
        raw: Result<RawBatch, ParseError>,
    ) -> FileOutcome {
        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => return FileOutcome::failed(file, FileStage::Read, e.reason),
        };
        log::debug!("Read {} rows from {}", raw.height(), file.path.display());

        match dataset {
            Dataset::Crime => {
                let frame = SchemaNormalizer::crime().normalize(raw);
                self.load(file, clean_crime(frame))
            }
            Dataset::Census => {
                let year = match year_from_file_name(file.file_name()) {
                    Ok(year) => year,
                    Err(e) => return FileOutcome::failed(file, FileStage::Normalize, e),
                };
                let frame = SchemaNormalizer::census(year).normalize(raw);
                self.load(file, clean_census(frame))
            }
        }
    }

    fn load<R: TableRecord>(&mut self, file: &SourceFile, cleaned: Cleaned<R>) -> FileOutcome {
        if cleaned.is_empty() {
            return FileOutcome::Empty {
                path: file.path.clone(),
                dropped: cleaned.dropped,
            };
        }

        let staging_dir = self.config.staging_dir.as_deref();
        match self
            .store
            .load(self.config.load_strategy, &cleaned.records, staging_dir)
        {
            Ok(rows) => FileOutcome::Loaded {
                path: file.path.clone(),
                rows,
                dropped: cleaned.dropped,
            },
            Err(e) => FileOutcome::failed(file, FileStage::Load, e),
        }
    }
}

/// Read a window of files, in parallel when a pool is given. Results keep the input order.
fn read_window(
    pool: Option<&ThreadPool>,
    files: &[SourceFile],
) -> Vec<Result<RawBatch, ParseError>> {
    match pool {
        Some(pool) => pool.install(|| files.par_iter().map(|f| read_csv(&f.path)).collect()),
        None => files.iter().map(|f| read_csv(&f.path)).collect(),
    }
}

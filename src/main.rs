use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crime_ingest::{
    verify_store, Dataset, FileOutcome, IngestionPipeline, LoadStrategy, PipelineConfig, RunReport,
};
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "crime_etl")]
#[command(about = "Load police street-level crime and LSOA census extracts into DuckDB")]
struct Args {
    /// JSON config file; flags and environment variables override its values
    #[arg(short, long, env = "CRIME_ETL_CONFIG")]
    config: Option<PathBuf>,

    /// DuckDB database file, or :memory:
    #[arg(long, env = "CRIME_ETL_DATABASE", global = true)]
    database: Option<String>,

    /// Root holding YYYY-MM crime folders
    #[arg(long, env = "CRIME_ETL_CRIME_ROOT", global = true)]
    crime_root: Option<PathBuf>,

    /// Root searched for census extracts
    #[arg(long, env = "CRIME_ETL_CENSUS_ROOT", global = true)]
    census_root: Option<PathBuf>,

    /// Only load census files under paths containing this text
    #[arg(long, env = "CRIME_ETL_CENSUS_FILTER", global = true)]
    census_filter: Option<String>,

    /// Load strategy
    #[arg(short, long, value_enum, env = "CRIME_ETL_STRATEGY", global = true)]
    strategy: Option<StrategyArg>,

    /// Files read concurrently (0 = one per CPU)
    #[arg(long, env = "CRIME_ETL_READ_WORKERS", global = true)]
    read_workers: Option<usize>,

    /// Directory for staging CSVs
    #[arg(long, env = "CRIME_ETL_STAGING_DIR", global = true)]
    staging_dir: Option<PathBuf>,

    /// Hide the progress spinner
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest street-level crime extracts
    Crime,
    /// Ingest census demographic extracts
    Census,
    /// Ingest crime, then census
    All,
    /// Check the stored crime table
    Verify,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    TruncateBulkCopy,
    AppendInsert,
}

impl From<StrategyArg> for LoadStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::TruncateBulkCopy => LoadStrategy::TruncateBulkCopy,
            StrategyArg::AppendInsert => LoadStrategy::AppendInsert,
        }
    }
}

fn build_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(database) = &args.database {
        config.destination.database = database.clone();
    }
    if let Some(root) = &args.crime_root {
        config.crime_root = root.clone();
    }
    if let Some(root) = &args.census_root {
        config.census_root = root.clone();
    }
    if let Some(filter) = &args.census_filter {
        config.census_path_filter = Some(filter.clone());
    }
    if let Some(strategy) = args.strategy {
        config.load_strategy = strategy.into();
    }
    if let Some(workers) = args.read_workers {
        config.read_workers = workers;
    }
    if let Some(dir) = &args.staging_dir {
        config.staging_dir = Some(dir.clone());
    }
    if config.read_workers == 0 {
        config.read_workers = num_cpus::get();
    }

    Ok(config)
}

fn run_dataset(
    pipeline: &mut IngestionPipeline,
    dataset: Dataset,
    quiet: bool,
) -> Result<RunReport> {
    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} files - {msg}")?,
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(format!("{} ingestion", dataset));

    let report = pipeline
        .run_with(dataset, |outcome: &FileOutcome| {
            pb.inc(1);
            if let Some(name) = outcome.path().file_name() {
                pb.set_message(name.to_string_lossy().into_owned());
            }
        })
        .with_context(|| format!("{} ingestion aborted", dataset))?;

    pb.finish_and_clear();
    report.log_summary();
    Ok(report)
}

fn verify(pipeline: &IngestionPipeline) -> Result<()> {
    println!("\n🔍 Data Quality Verification");
    println!("{}", "=".repeat(60));

    let report = verify_store(pipeline.store())?;
    for line in report.to_string().lines() {
        println!("    📊 {}", line);
    }

    println!("{}", "=".repeat(60));
    if report.passed() {
        println!("✅ Data quality verification passed! No issues found.");
    } else {
        println!("⚠️  Data quality verification found {} issues", report.issues());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = build_config(&args)?;
    info!(
        "Destination {}, crime root {}, census root {}",
        config.destination.database,
        config.crime_root.display(),
        config.census_root.display()
    );

    let mut pipeline = IngestionPipeline::init(config).context("cannot establish destination")?;

    match args.command {
        Command::Crime => {
            run_dataset(&mut pipeline, Dataset::Crime, args.quiet)?;
        }
        Command::Census => {
            run_dataset(&mut pipeline, Dataset::Census, args.quiet)?;
        }
        Command::All => {
            let crime = run_dataset(&mut pipeline, Dataset::Crime, args.quiet)?;
            let census = run_dataset(&mut pipeline, Dataset::Census, args.quiet)?;
            info!(
                "All datasets done: {} rows loaded, {} files failed",
                crime.rows_loaded + census.rows_loaded,
                crime.files_failed() + census.files_failed()
            );
        }
        Command::Verify => verify(&pipeline)?,
    }

    Ok(())
}

use crime_ingest::{verify_store, Dataset, DestinationConfig, IngestionPipeline, PipelineConfig};
use std::fs;

fn main() {
    env_logger::init();

    // Build a one-month extract tree in a scratch directory
    let scratch = tempfile::tempdir().unwrap();
    let folder = scratch.path().join("crime/2021-07");
    fs::create_dir_all(&folder).unwrap();
    fs::write(
        folder.join("2021-07-metropolitan-street.csv"),
        "Crime ID,Month,Longitude,Latitude,Crime type,Last outcome category\n\
         a1,2021-07,-0.1276,51.5072,Burglary,Under investigation\n\
         a2,2021-07,N/A,51.5072,Robbery,\n\
         a3,2021-07-15,-0.1410,51.5014,,\n",
    )
    .unwrap();

    let config = PipelineConfig {
        crime_root: scratch.path().join("crime"),
        destination: DestinationConfig::in_memory(),
        ..Default::default()
    };

    let mut pipeline = IngestionPipeline::init(config).unwrap();
    let report = pipeline.run(Dataset::Crime).unwrap();

    println!("Crime Ingestion Results");
    println!("=======================");
    println!("Files attempted: {}", report.files_attempted);
    println!("Rows loaded: {}", report.rows_loaded);
    println!("Rows dropped: {} ({})", report.rows_dropped.total(), report.rows_dropped);
    println!();

    for record in pipeline.store().crime_records().unwrap() {
        println!(
            "  {} {:<10} {:>9.4} {:>8.4}  {}",
            record.month, record.crime_type, record.longitude, record.latitude, record.outcome_type
        );
    }
    println!();

    let quality = verify_store(pipeline.store()).unwrap();
    println!("{}", quality);
}

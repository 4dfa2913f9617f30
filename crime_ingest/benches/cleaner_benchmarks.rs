use criterion::{black_box, criterion_group, criterion_main, Criterion};
use crime_ingest::reader::RawBatch;
use crime_ingest::schema::{Frame, SchemaNormalizer};
use crime_ingest::clean_crime;

fn street_batch(rows: usize) -> RawBatch {
    let columns = [
        "Crime ID", "Month", "Reported by", "Falls within", "Longitude", "Latitude",
        "Location", "LSOA code", "LSOA name", "Crime type", "Last outcome category", "Context",
    ];

    let rows = (0..rows)
        .map(|i| {
            // Every tenth row has no coordinates, every fifth is a repeat
            let id = if i % 5 == 0 { 0 } else { i };
            let longitude = if i % 10 == 3 {
                None
            } else {
                Some(format!("{:.4}", -0.1 - (i % 97) as f64 / 1000.0))
            };
            vec![
                Some(format!("id{}", id)),
                Some(format!("2021-{:02}", i % 12 + 1)),
                Some("Metropolitan Police Service".to_string()),
                Some("Metropolitan Police Service".to_string()),
                longitude,
                Some("51.5072".to_string()),
                Some("On or near Whitehall".to_string()),
                Some("E01004736".to_string()),
                Some("Westminster 018A".to_string()),
                Some("Burglary".to_string()),
                None,
                None,
            ]
        })
        .collect();

    RawBatch {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows,
    }
}

fn benchmark_normalize(c: &mut Criterion) {
    let batch = street_batch(10_000);
    let normalizer = SchemaNormalizer::crime();

    c.bench_function("normalize_street_10k", |b| {
        b.iter(|| {
            let _frame = black_box(normalizer.normalize(batch.clone()));
        });
    });
}

fn benchmark_clean(c: &mut Criterion) {
    let frame: Frame = SchemaNormalizer::crime().normalize(street_batch(10_000));

    c.bench_function("clean_street_10k", |b| {
        b.iter(|| {
            let _cleaned = black_box(clean_crime(frame.clone()));
        });
    });
}

criterion_group!(benches, benchmark_normalize, benchmark_clean);
criterion_main!(benches);

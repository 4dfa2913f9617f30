use crate::config::{DestinationConfig, LoadStrategy};
use crate::error::{ConnectionError, LoadError, ReadError};
use crate::models::{bucket_columns, CensusRecord, CrimeRecord, Table, BUCKET_COUNT};
use chrono::NaiveDate;
use duckdb::types::Value;
use duckdb::{params_from_iter, Connection, Transaction};
use std::io;
use std::path::Path;
use tempfile::NamedTempFile;

/// A row type that can be written into one destination table.
pub trait TableRecord {
    const TABLE: Table;

    /// Cells in `Table::columns` order, for row inserts.
    fn sql_values(&self) -> Vec<Value>;

    /// Append this row to a staging CSV whose header is `Table::columns`.
    fn write_staging<W: io::Write>(&self, writer: &mut csv::Writer<W>) -> csv::Result<()>;
}

fn text(value: &Option<String>) -> Value {
    match value {
        Some(v) => Value::Text(v.clone()),
        None => Value::Null,
    }
}

impl TableRecord for CrimeRecord {
    const TABLE: Table = Table::CrimeRecords;

    fn sql_values(&self) -> Vec<Value> {
        vec![
            text(&self.crime_id),
            Value::Text(self.month.format("%Y-%m-%d").to_string()),
            text(&self.reported_by),
            text(&self.falls_within),
            Value::Double(self.longitude),
            Value::Double(self.latitude),
            text(&self.location),
            text(&self.lsoa_code),
            text(&self.lsoa_name),
            Value::Text(self.crime_type.clone()),
            Value::Text(self.outcome_type.clone()),
            text(&self.context),
        ]
    }

    fn write_staging<W: io::Write>(&self, writer: &mut csv::Writer<W>) -> csv::Result<()> {
        writer.serialize(self)
    }
}

impl TableRecord for CensusRecord {
    const TABLE: Table = Table::CensusDemographics;

    fn sql_values(&self) -> Vec<Value> {
        let mut values = vec![
            Value::Int(self.year),
            text(&self.lad_code),
            text(&self.lad_name),
            text(&self.lsoa_code),
            text(&self.lsoa_name),
            Value::BigInt(self.total),
        ];
        values.extend(self.buckets.iter().map(|count| Value::BigInt(*count)));
        values
    }

    fn write_staging<W: io::Write>(&self, writer: &mut csv::Writer<W>) -> csv::Result<()> {
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        let mut fields = vec![
            self.year.to_string(),
            opt(&self.lad_code),
            opt(&self.lad_name),
            opt(&self.lsoa_code),
            opt(&self.lsoa_name),
            self.total.to_string(),
        ];
        fields.extend(self.buckets.iter().map(|count| count.to_string()));
        writer.write_record(&fields)
    }
}

fn sequence_name(table: Table) -> Option<&'static str> {
    match table {
        Table::CrimeRecords => Some("crime_records_id_seq"),
        Table::CensusDemographics => None,
    }
}

fn create_sql(table: Table) -> String {
    match table {
        Table::CrimeRecords => "CREATE SEQUENCE IF NOT EXISTS crime_records_id_seq START 1;
            CREATE TABLE IF NOT EXISTS crime_records (
                id BIGINT PRIMARY KEY DEFAULT nextval('crime_records_id_seq'),
                crime_id VARCHAR,
                month DATE NOT NULL,
                reported_by VARCHAR,
                falls_within VARCHAR,
                longitude DOUBLE NOT NULL,
                latitude DOUBLE NOT NULL,
                location VARCHAR,
                lsoa_code VARCHAR,
                lsoa_name VARCHAR,
                crime_type VARCHAR NOT NULL,
                outcome_type VARCHAR NOT NULL,
                context VARCHAR
            );"
        .to_string(),
        Table::CensusDemographics => {
            let buckets: Vec<String> = bucket_columns()
                .iter()
                .map(|c| format!("{} BIGINT NOT NULL DEFAULT 0", c))
                .collect();
            format!(
                "CREATE TABLE IF NOT EXISTS census_demographics (
                    year INTEGER NOT NULL,
                    lad_code VARCHAR,
                    lad_name VARCHAR,
                    lsoa_code VARCHAR,
                    lsoa_name VARCHAR,
                    total BIGINT NOT NULL DEFAULT 0,
                    {}
                );",
                buckets.join(",\n")
            )
        }
    }
}

fn insert_sql(table: Table) -> String {
    let columns = table.columns();
    let placeholders: Vec<&str> = columns
        .iter()
        .map(|c| match (table, c.as_str()) {
            (Table::CrimeRecords, "month") => "CAST(? AS DATE)",
            _ => "?",
        })
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders.join(", ")
    )
}

fn copy_sql(table: Table, staging: &Path) -> String {
    format!(
        "COPY {} ({}) FROM '{}' (FORMAT csv, HEADER true, DELIMITER ',', QUOTE '\"', ESCAPE '\"')",
        table,
        table.columns().join(", "),
        staging.to_string_lossy().replace('\'', "''")
    )
}

/// Write rows to a temporary CSV with a header line. The file is deleted
/// when the handle is dropped.
fn write_staging_file<R: TableRecord>(
    records: &[R],
    staging_dir: Option<&Path>,
) -> Result<NamedTempFile, LoadError> {
    let table = R::TABLE.name();
    let prefix = format!("{}_stage_", table);
    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix).suffix(".csv");
    let staging = match staging_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(|source| LoadError::Staging { table, source })?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(staging.as_file());
    writer
        .write_record(R::TABLE.columns())
        .map_err(|source| LoadError::Encode { table, source })?;
    for record in records {
        record
            .write_staging(&mut writer)
            .map_err(|source| LoadError::Encode { table, source })?;
    }
    writer
        .flush()
        .map_err(|source| LoadError::Staging { table, source })?;
    drop(writer);

    Ok(staging)
}

struct StoredCrimeRow {
    crime_id: Option<String>,
    month: String,
    reported_by: Option<String>,
    falls_within: Option<String>,
    longitude: f64,
    latitude: f64,
    location: Option<String>,
    lsoa_code: Option<String>,
    lsoa_name: Option<String>,
    crime_type: String,
    outcome_type: String,
    context: Option<String>,
}

/// DuckDB-backed destination for cleaned batches.
pub struct Store {
    conn: Connection,
    target: String,
}

impl Store {
    /// Open the destination and create any missing tables.
    pub fn open(config: &DestinationConfig) -> Result<Self, ConnectionError> {
        let conn = if config.is_in_memory() {
            Connection::open_in_memory()
        } else {
            Connection::open(&config.database)
        }
        .map_err(|source| ConnectionError::Open {
            target: config.database.clone(),
            source,
        })?;

        let store = Self {
            conn,
            target: config.database.clone(),
        };
        for table in [Table::CrimeRecords, Table::CensusDemographics] {
            store
                .conn
                .execute_batch(&create_sql(table))
                .map_err(|source| ConnectionError::Schema {
                    table: table.name(),
                    source,
                })?;
        }

        log::info!("Connected to destination database {}", store.target);
        Ok(store)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Empty a table and restart its identity sequence, in one transaction.
    pub fn reset_table(&mut self, table: Table) -> Result<(), ConnectionError> {
        let mut sql = format!("DROP TABLE IF EXISTS {};", table);
        if let Some(sequence) = sequence_name(table) {
            sql.push_str(&format!("DROP SEQUENCE IF EXISTS {};", sequence));
        }
        sql.push_str(&create_sql(table));

        let reset = |source| ConnectionError::Reset {
            table: table.name(),
            source,
        };
        let tx = self.conn.transaction().map_err(reset)?;
        tx.execute_batch(&sql).map_err(reset)?;
        tx.commit().map_err(reset)?;

        log::info!("{} table has been cleared", table);
        Ok(())
    }

    fn in_transaction<T>(
        &mut self,
        table: Table,
        work: impl FnOnce(&Transaction<'_>) -> duckdb::Result<T>,
    ) -> Result<T, LoadError> {
        let database = |source| LoadError::Database {
            table: table.name(),
            source,
        };
        let tx = self.conn.transaction().map_err(database)?;
        match work(&tx) {
            Ok(value) => {
                tx.commit().map_err(database)?;
                Ok(value)
            }
            Err(source) => {
                if let Err(e) = tx.rollback() {
                    log::warn!("Rollback of {} failed: {}", table, e);
                }
                Err(database(source))
            }
        }
    }

    /// Stream a batch through a staging CSV and `COPY` in one transaction.
    pub fn bulk_copy<R: TableRecord>(
        &mut self,
        records: &[R],
        staging_dir: Option<&Path>,
    ) -> Result<u64, LoadError> {
        let table = R::TABLE;
        let staging = write_staging_file(records, staging_dir)?;
        log::debug!(
            "Written {} rows to staging file {}",
            records.len(),
            staging.path().display()
        );

        let sql = copy_sql(table, staging.path());
        let result = self.in_transaction(table, |tx| tx.execute(&sql, []));

        let staging_path = staging.path().to_path_buf();
        if let Err(e) = staging.close() {
            log::warn!(
                "Could not remove staging file {}: {}",
                staging_path.display(),
                e
            );
        }

        result.map(|_| records.len() as u64)
    }

    /// Append a batch with one prepared INSERT per row, in one transaction.
    pub fn insert_rows<R: TableRecord>(&mut self, records: &[R]) -> Result<u64, LoadError> {
        let table = R::TABLE;
        let sql = insert_sql(table);
        self.in_transaction(table, |tx| {
            let mut stmt = tx.prepare(&sql)?;
            for record in records {
                stmt.execute(params_from_iter(record.sql_values()))?;
            }
            Ok(records.len() as u64)
        })
    }

    pub fn load<R: TableRecord>(
        &mut self,
        strategy: LoadStrategy,
        records: &[R],
        staging_dir: Option<&Path>,
    ) -> Result<u64, LoadError> {
        match strategy {
            LoadStrategy::TruncateBulkCopy => self.bulk_copy(records, staging_dir),
            LoadStrategy::AppendInsert => self.insert_rows(records),
        }
    }

    pub fn row_count(&self, table: Table) -> Result<u64, ReadError> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .map_err(|source| ReadError::Database {
                table: table.name(),
                source,
            })?;
        Ok(count.max(0) as u64)
    }

    /// Every stored crime row, ordered by month and then load order.
    pub fn crime_records(&self) -> Result<Vec<CrimeRecord>, ReadError> {
        let database = |source| ReadError::Database {
            table: Table::CrimeRecords.name(),
            source,
        };
        let mut stmt = self
            .conn
            .prepare(
                "SELECT crime_id, CAST(month AS VARCHAR), reported_by, falls_within,
                        longitude, latitude, location, lsoa_code, lsoa_name,
                        crime_type, outcome_type, context
                 FROM crime_records
                 ORDER BY month, id",
            )
            .map_err(database)?;

        let rows = stmt
            .query_map([], |row| {
                Ok(StoredCrimeRow {
                    crime_id: row.get(0)?,
                    month: row.get(1)?,
                    reported_by: row.get(2)?,
                    falls_within: row.get(3)?,
                    longitude: row.get(4)?,
                    latitude: row.get(5)?,
                    location: row.get(6)?,
                    lsoa_code: row.get(7)?,
                    lsoa_name: row.get(8)?,
                    crime_type: row.get(9)?,
                    outcome_type: row.get(10)?,
                    context: row.get(11)?,
                })
            })
            .map_err(database)?;

        let mut records = Vec::new();
        for row in rows {
            let row = row.map_err(database)?;
            let month = NaiveDate::parse_from_str(&row.month, "%Y-%m-%d")
                .map_err(|_| ReadError::Month(row.month.clone()))?;
            records.push(CrimeRecord {
                crime_id: row.crime_id,
                month,
                reported_by: row.reported_by,
                falls_within: row.falls_within,
                longitude: row.longitude,
                latitude: row.latitude,
                location: row.location,
                lsoa_code: row.lsoa_code,
                lsoa_name: row.lsoa_name,
                crime_type: row.crime_type,
                outcome_type: row.outcome_type,
                context: row.context,
            });
        }
        Ok(records)
    }

    /// The crime table as a polars frame, `month` typed as a date.
    pub fn crime_frame(&self) -> Result<polars::prelude::DataFrame, ReadError> {
        let records = self.crime_records()?;
        Ok(crate::frame::crime_frame(&records)?)
    }

    pub fn census_records(&self) -> Result<Vec<CensusRecord>, ReadError> {
        let database = |source| ReadError::Database {
            table: Table::CensusDemographics.name(),
            source,
        };
        let sql = format!(
            "SELECT {} FROM census_demographics ORDER BY year, lsoa_code",
            Table::CensusDemographics.columns().join(", ")
        );
        let mut stmt = self.conn.prepare(&sql).map_err(database)?;
        let rows = stmt
            .query_map([], |row| {
                let mut buckets = Vec::with_capacity(BUCKET_COUNT);
                for idx in 0..BUCKET_COUNT {
                    buckets.push(row.get::<_, i64>(6 + idx)?);
                }
                Ok(CensusRecord {
                    year: row.get(0)?,
                    lad_code: row.get(1)?,
                    lad_name: row.get(2)?,
                    lsoa_code: row.get(3)?,
                    lsoa_name: row.get(4)?,
                    total: row.get(5)?,
                    buckets,
                })
            })
            .map_err(database)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(month: (i32, u32, u32), crime_type: &str) -> CrimeRecord {
        CrimeRecord {
            crime_id: Some("c1".to_string()),
            month: NaiveDate::from_ymd_opt(month.0, month.1, month.2).unwrap(),
            reported_by: Some("City of London Police".to_string()),
            falls_within: Some("City of London Police".to_string()),
            longitude: -0.0977,
            latitude: 51.5186,
            location: Some("On or near \"Aldersgate\", Street".to_string()),
            lsoa_code: Some("E01000001".to_string()),
            lsoa_name: Some("City of London 001A".to_string()),
            crime_type: crime_type.to_string(),
            outcome_type: "Unknown".to_string(),
            context: None,
        }
    }

    fn memory_store() -> Store {
        Store::open(&DestinationConfig::in_memory()).unwrap()
    }

    #[test]
    fn test_insert_sql_casts_month() {
        let sql = insert_sql(Table::CrimeRecords);
        assert!(sql.starts_with("INSERT INTO crime_records (crime_id, month,"));
        assert!(sql.contains("VALUES (?, CAST(? AS DATE), ?"));
    }

    #[test]
    fn test_bulk_copy_round_trips_quoted_text() {
        let mut store = memory_store();
        let staging = TempDir::new().unwrap();
        let batch = vec![record((2021, 8, 1), "Robbery"), record((2021, 7, 1), "Burglary")];

        let loaded = store.bulk_copy(&batch, Some(staging.path())).unwrap();
        assert_eq!(loaded, 2);

        let stored = store.crime_records().unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0], batch[1]);
        assert_eq!(stored[1], batch[0]);
        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_insert_rows_appends() {
        let mut store = memory_store();
        let batch = vec![record((2021, 7, 15), "Burglary")];

        store.insert_rows(&batch).unwrap();
        store.insert_rows(&batch).unwrap();

        assert_eq!(store.row_count(Table::CrimeRecords).unwrap(), 2);
        let stored = store.crime_records().unwrap();
        assert_eq!(stored[0].month, NaiveDate::from_ymd_opt(2021, 7, 15).unwrap());
        assert_eq!(stored[0].context, None);
    }

    #[test]
    fn test_reset_table_clears_rows() {
        let mut store = memory_store();
        store.insert_rows(&[record((2021, 7, 1), "Burglary")]).unwrap();

        store.reset_table(Table::CrimeRecords).unwrap();
        assert_eq!(store.row_count(Table::CrimeRecords).unwrap(), 0);

        store.insert_rows(&[record((2021, 7, 1), "Burglary")]).unwrap();
        assert_eq!(store.row_count(Table::CrimeRecords).unwrap(), 1);
    }

    #[test]
    fn test_failed_copy_rolls_back_and_removes_staging() {
        let mut store = memory_store();
        let staging = TempDir::new().unwrap();
        store.conn.execute_batch("DROP TABLE crime_records").unwrap();

        let err = store
            .bulk_copy(&[record((2021, 7, 1), "Burglary")], Some(staging.path()))
            .unwrap_err();
        assert!(matches!(err, LoadError::Database { table: "crime_records", .. }));
        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);

        store.reset_table(Table::CrimeRecords).unwrap();
        assert_eq!(store.row_count(Table::CrimeRecords).unwrap(), 0);
    }

    #[test]
    fn test_copy_after_failed_copy_and_reset() {
        let mut store = memory_store();
        let staging = TempDir::new().unwrap();
        let batch = vec![record((2021, 7, 1), "Burglary"), record((2021, 8, 1), "Robbery")];

        store.bulk_copy(&batch[..1], Some(staging.path())).unwrap();
        store.conn.execute_batch("DROP TABLE crime_records").unwrap();
        assert!(store.bulk_copy(&batch, Some(staging.path())).is_err());

        store.reset_table(Table::CrimeRecords).unwrap();
        let loaded = store.bulk_copy(&batch, Some(staging.path())).unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(store.crime_records().unwrap(), batch);
        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);

        store.insert_rows(&batch[1..]).unwrap();
        assert_eq!(store.row_count(Table::CrimeRecords).unwrap(), 3);
    }

    #[test]
    fn test_census_round_trip() {
        let mut store = memory_store();
        let mut buckets = vec![0; BUCKET_COUNT];
        buckets[45] = 3;
        let census = CensusRecord {
            year: 2011,
            lad_code: Some("E09000001".to_string()),
            lad_name: Some("City of London".to_string()),
            lsoa_code: Some("E01000001".to_string()),
            lsoa_name: None,
            total: 1500,
            buckets,
        };

        store.bulk_copy(&[census.clone()], None).unwrap();
        store.insert_rows(&[census.clone()]).unwrap();

        let stored = store.census_records().unwrap();
        assert_eq!(stored, vec![census.clone(), census]);
        assert_eq!(stored[0].bucket("f45"), Some(3));
    }

    #[test]
    fn test_open_fails_for_unreachable_path() {
        let dir = TempDir::new().unwrap();
        let config = DestinationConfig::file(dir.path().join("missing/dir/crime.duckdb"));
        assert!(matches!(Store::open(&config), Err(ConnectionError::Open { .. })));
    }
}

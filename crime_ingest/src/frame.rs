use crate::models::{CrimeRecord, CRIME_COLUMNS};
use chrono::Datelike;
use polars::prelude::*;

/// Days from 0001-01-01 to 1970-01-01, the offset polars dates count from.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn text_series(
    name: &str,
    records: &[CrimeRecord],
    field: fn(&CrimeRecord) -> Option<&str>,
) -> Series {
    let values: Vec<Option<&str>> = records.iter().map(field).collect();
    Series::new(name.into(), values)
}

/// Crime rows as a DataFrame in storage column order, `month` typed as `Date`.
pub fn crime_frame(records: &[CrimeRecord]) -> PolarsResult<DataFrame> {
    let days: Vec<i32> = records
        .iter()
        .map(|r| r.month.num_days_from_ce() - EPOCH_DAYS_FROM_CE)
        .collect();
    let month = Series::new("month".into(), days).cast(&DataType::Date)?;

    let longitude: Vec<f64> = records.iter().map(|r| r.longitude).collect();
    let latitude: Vec<f64> = records.iter().map(|r| r.latitude).collect();

    let df = DataFrame::new(vec![
        text_series("crime_id", records, |r| r.crime_id.as_deref()),
        month,
        text_series("reported_by", records, |r| r.reported_by.as_deref()),
        text_series("falls_within", records, |r| r.falls_within.as_deref()),
        Series::new("longitude".into(), longitude),
        Series::new("latitude".into(), latitude),
        text_series("location", records, |r| r.location.as_deref()),
        text_series("lsoa_code", records, |r| r.lsoa_code.as_deref()),
        text_series("lsoa_name", records, |r| r.lsoa_name.as_deref()),
        text_series("crime_type", records, |r| Some(r.crime_type.as_str())),
        text_series("outcome_type", records, |r| Some(r.outcome_type.as_str())),
        text_series("context", records, |r| r.context.as_deref()),
    ])?;
    debug_assert_eq!(df.width(), CRIME_COLUMNS.len());
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_crime_frame_types() {
        let records = vec![CrimeRecord {
            crime_id: None,
            month: NaiveDate::from_ymd_opt(2021, 7, 1).unwrap(),
            reported_by: Some("Metropolitan Police Service".to_string()),
            falls_within: None,
            longitude: -0.1,
            latitude: 51.5,
            location: None,
            lsoa_code: None,
            lsoa_name: None,
            crime_type: "Burglary".to_string(),
            outcome_type: "Unknown".to_string(),
            context: None,
        }];

        let df = crime_frame(&records).unwrap();
        assert_eq!(df.shape(), (1, 12));
        assert_eq!(df.column("month").unwrap().dtype(), &DataType::Date);
        assert_eq!(df.column("latitude").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("crime_id").unwrap().null_count(), 1);
        assert_eq!(df.column("crime_type").unwrap().null_count(), 0);
    }

    #[test]
    fn test_epoch_offset() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(epoch.num_days_from_ce(), EPOCH_DAYS_FROM_CE);
    }
}

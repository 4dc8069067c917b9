//! Wide ↔ long reshaping.
//!
//! Date columns are identified structurally: every column that is not one of
//! the four identity columns is a date column, in header order. A stray
//! non-date column therefore reaches the header parser and is reported there.

use crate::columns::{COUNTRY, DATE, IDENTITY_COLUMNS, LAT, LONG, PROVINCE};
use crate::data_utils::{date_values, f64_values, i64_values, string_values};
use crate::error::{PipelineError, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Format of the date headers in the wide tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateFormat {
    parse: String,
    render: String,
}

impl DateFormat {
    /// Use the same chrono format string to parse and to render headers.
    pub fn new(format: impl Into<String>) -> Self {
        let format = format.into();
        Self {
            parse: format.clone(),
            render: format,
        }
    }

    pub fn with_render(mut self, render: impl Into<String>) -> Self {
        self.render = render.into();
        self
    }

    pub fn as_str(&self) -> &str {
        &self.parse
    }

    pub fn parse(&self, header: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(header.trim(), &self.parse).ok()
    }

    pub fn render(&self, date: NaiveDate) -> String {
        date.format(&self.render).to_string()
    }
}

impl Default for DateFormat {
    /// `M/D/YY` headers such as `1/22/20`.
    fn default() -> Self {
        Self::new("%m/%d/%y").with_render("%-m/%-d/%y")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateHeaderError {
    pub header: String,
    pub position: usize,
}

/// Result of parsing the date headers of one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateHeaders {
    pub parsed: Vec<(String, NaiveDate)>,
    pub errors: Vec<DateHeaderError>,
}

impl DateHeaders {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Whether the parsed headers are in strictly increasing date order.
    pub fn is_chronological(&self) -> bool {
        self.parsed.windows(2).all(|w| w[0].1 < w[1].1)
    }

    pub fn first(&self) -> Option<NaiveDate> {
        self.parsed.first().map(|(_, d)| *d)
    }

    pub fn last(&self) -> Option<NaiveDate> {
        self.parsed.last().map(|(_, d)| *d)
    }
}

/// Every non-identity column, in header order.
pub fn date_columns(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .filter(|c| !IDENTITY_COLUMNS.contains(c))
        .map(|c| c.to_string())
        .collect()
}

/// Parse each header independently, collecting failures instead of stopping
/// at the first one.
pub fn parse_date_headers<S: AsRef<str>>(headers: &[S], format: &DateFormat) -> DateHeaders {
    let mut out = DateHeaders::default();
    for (position, header) in headers.iter().enumerate() {
        let header = header.as_ref();
        match format.parse(header) {
            Some(date) => out.parsed.push((header.to_string(), date)),
            None => out.errors.push(DateHeaderError {
                header: header.to_string(),
                position,
            }),
        }
    }
    out
}

fn require_identity(df: &DataFrame) -> Result<()> {
    for field in IDENTITY_COLUMNS {
        if df.column(field).is_err() {
            return Err(PipelineError::Schema {
                field: field.to_string(),
                seen: df.get_column_names().iter().map(|s| s.to_string()).collect(),
            });
        }
    }
    Ok(())
}

/// Melt a normalized wide table into one row per (location, date).
///
/// Output columns: the four identity columns, `Date`, and `value_name`.
/// Rows are emitted location by location, each location's dates in header
/// order. Any unparseable header aborts the whole table.
pub fn reshape_to_long(df: &DataFrame, value_name: &str, format: &DateFormat) -> Result<DataFrame> {
    require_identity(df)?;

    let headers = parse_date_headers(&date_columns(df), format);
    if !headers.is_clean() {
        return Err(PipelineError::DateParse {
            table: value_name.to_string(),
            headers: headers.errors.into_iter().map(|e| e.header).collect(),
        });
    }

    let provinces = string_values(df, PROVINCE)?;
    let countries = string_values(df, COUNTRY)?;
    let lats = f64_values(df, LAT)?;
    let longs = f64_values(df, LONG)?;
    let observations = headers
        .parsed
        .iter()
        .map(|(header, _)| i64_values(df, header))
        .collect::<Result<Vec<_>>>()?;

    let capacity = df.height() * headers.parsed.len();
    let mut province_out = Vec::with_capacity(capacity);
    let mut country_out = Vec::with_capacity(capacity);
    let mut lat_out = Vec::with_capacity(capacity);
    let mut long_out = Vec::with_capacity(capacity);
    let mut date_out: Vec<NaiveDate> = Vec::with_capacity(capacity);
    let mut value_out: Vec<Option<i64>> = Vec::with_capacity(capacity);

    for row in 0..df.height() {
        for (column, (_, date)) in observations.iter().zip(headers.parsed.iter()) {
            province_out.push(provinces[row].clone());
            country_out.push(countries[row].clone());
            lat_out.push(lats[row]);
            long_out.push(longs[row]);
            date_out.push(*date);
            value_out.push(column[row]);
        }
    }

    let long = DataFrame::new(vec![
        Series::new(PROVINCE, province_out),
        Series::new(COUNTRY, country_out),
        Series::new(LAT, lat_out),
        Series::new(LONG, long_out),
        Series::new(DATE, date_out),
        Series::new(value_name, value_out),
    ])?;

    debug!(
        "Reshaped {} to long form: {:?} -> {:?}",
        value_name,
        df.shape(),
        long.shape()
    );
    Ok(long)
}

type IdentityKey = (Option<String>, Option<String>, Option<u64>, Option<u64>);

/// Rebuild the wide form from a long table.
///
/// Locations keep their first-appearance order; date columns are emitted in
/// chronological order with headers rendered by `format`.
pub fn pivot_to_wide(long: &DataFrame, value_name: &str, format: &DateFormat) -> Result<DataFrame> {
    require_identity(long)?;

    let provinces = string_values(long, PROVINCE)?;
    let countries = string_values(long, COUNTRY)?;
    let lats = f64_values(long, LAT)?;
    let longs = f64_values(long, LONG)?;
    let dates = date_values(long, DATE)?;
    let values = i64_values(long, value_name)?;

    let mut locations: Vec<usize> = Vec::new();
    let mut location_index: HashMap<IdentityKey, usize> = HashMap::new();
    let mut cells: HashMap<(usize, NaiveDate), Option<i64>> = HashMap::new();
    let mut all_dates = BTreeSet::new();

    for row in 0..long.height() {
        let date = dates[row].ok_or_else(|| {
            PipelineError::Aggregation(format!("row {} of {} has no date", row, value_name))
        })?;
        let key: IdentityKey = (
            provinces[row].clone(),
            countries[row].clone(),
            lats[row].map(f64::to_bits),
            longs[row].map(f64::to_bits),
        );
        let next = locations.len();
        let location = *location_index.entry(key).or_insert_with(|| {
            locations.push(row);
            next
        });
        if cells.insert((location, date), values[row]).is_some() {
            return Err(PipelineError::Aggregation(format!(
                "duplicate observation for location {} on {} in {}",
                location, date, value_name
            )));
        }
        all_dates.insert(date);
    }

    let mut columns = vec![
        Series::new(PROVINCE, locations.iter().map(|r| provinces[*r].clone()).collect::<Vec<_>>()),
        Series::new(COUNTRY, locations.iter().map(|r| countries[*r].clone()).collect::<Vec<_>>()),
        Series::new(LAT, locations.iter().map(|r| lats[*r]).collect::<Vec<_>>()),
        Series::new(LONG, locations.iter().map(|r| longs[*r]).collect::<Vec<_>>()),
    ];
    for date in all_dates {
        let column: Vec<Option<i64>> = (0..locations.len())
            .map(|location| cells.get(&(location, date)).copied().flatten())
            .collect();
        columns.push(Series::new(&format.render(date), column));
    }

    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wide() -> DataFrame {
        df![
            PROVINCE => ["All Provinces", "Ontario"],
            COUNTRY => ["Testland", "Canada"],
            LAT => [1.5, 51.2],
            LONG => [2.5, -85.3],
            "1/22/20" => [Some(0i64), Some(4)],
            "1/23/20" => [Some(2i64), None],
            "1/24/20" => [Some(7i64), Some(9)]
        ]
        .unwrap()
    }

    #[test]
    fn test_parse_date_headers_collects_every_error() {
        let headers = parse_date_headers(
            &["1/22/20", "Combined_Key", "13/40/20", "1/23/20"],
            &DateFormat::default(),
        );

        assert_eq!(headers.parsed.len(), 2);
        assert_eq!(
            headers.errors,
            vec![
                DateHeaderError { header: "Combined_Key".to_string(), position: 1 },
                DateHeaderError { header: "13/40/20".to_string(), position: 2 },
            ]
        );
        assert_eq!(headers.first(), NaiveDate::from_ymd_opt(2020, 1, 22));
        assert!(headers.is_chronological());
    }

    #[test]
    fn test_reshape_row_major_order() {
        let long = reshape_to_long(&wide(), "Confirmed", &DateFormat::default()).unwrap();

        assert_eq!(long.shape(), (6, 6));
        assert_eq!(
            long.get_column_names(),
            vec![PROVINCE, COUNTRY, LAT, LONG, DATE, "Confirmed"]
        );
        assert_eq!(
            string_values(&long, COUNTRY).unwrap(),
            vec!["Testland", "Testland", "Testland", "Canada", "Canada", "Canada"]
                .into_iter()
                .map(|s| Some(s.to_string()))
                .collect::<Vec<_>>()
        );
        assert_eq!(
            i64_values(&long, "Confirmed").unwrap(),
            vec![Some(0), Some(2), Some(7), Some(4), None, Some(9)]
        );
        assert_eq!(
            date_values(&long, DATE).unwrap()[2],
            NaiveDate::from_ymd_opt(2020, 1, 24)
        );
    }

    #[test]
    fn test_stray_column_aborts_reshape() {
        let mut df = wide();
        df.with_column(Series::new("Combined_Key", ["a", "b"])).unwrap();

        match reshape_to_long(&df, "Confirmed", &DateFormat::default()) {
            Err(PipelineError::DateParse { table, headers }) => {
                assert_eq!(table, "Confirmed");
                assert_eq!(headers, vec!["Combined_Key".to_string()]);
            }
            other => panic!("expected date parse error, got {:?}", other.map(|df| df.shape())),
        }
    }

    #[test]
    fn test_round_trip_reproduces_wide_values() {
        let original = wide();
        let format = DateFormat::default();
        let long = reshape_to_long(&original, "Confirmed", &format).unwrap();
        let rebuilt = pivot_to_wide(&long, "Confirmed", &format).unwrap();

        assert_eq!(rebuilt.get_column_names(), original.get_column_names());
        for name in original.get_column_names() {
            assert_eq!(
                string_values(&rebuilt, name).unwrap(),
                string_values(&original, name).unwrap(),
                "column {}",
                name
            );
        }
    }

    #[test]
    fn test_reshape_without_date_columns_is_empty() {
        let df = wide().select([PROVINCE, COUNTRY, LAT, LONG]).unwrap();
        let long = reshape_to_long(&df, "Deaths", &DateFormat::default()).unwrap();
        assert_eq!(long.height(), 0);
        assert_eq!(long.width(), 6);
    }
}

//! Derived statistics shared by the reports and the assistant.
//!
//! Everything here is built from the long tables through [`aggregate`], so the
//! grouping, sorting and ranking rules are the pipeline's own.

use crate::aggregate::{aggregate, top_n, AggOp, GroupKey};
use crate::columns::{COUNTRY, DATE};
use crate::data_utils::{date_values, filter_eq, format_date, i64_values, string_values};
use crate::error::{PipelineError, Result};
use crate::loader::PreparedTable;
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryValue {
    pub country: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryRate {
    pub country: String,
    pub rate: f64,
}

pub fn country_values(items: Vec<(String, i64)>) -> Vec<CountryValue> {
    items
        .into_iter()
        .map(|(country, value)| CountryValue { country, value })
        .collect()
}

pub fn country_rates(items: Vec<(String, f64)>) -> Vec<CountryRate> {
    items
        .into_iter()
        .map(|(country, rate)| CountryRate { country, rate })
        .collect()
}

/// Rows whose date satisfies `keep`. Rows without a date are dropped.
pub fn filter_dates<F: Fn(NaiveDate) -> bool>(df: &DataFrame, keep: F) -> Result<DataFrame> {
    let mask: Vec<bool> = date_values(df, DATE)?
        .iter()
        .map(|d| d.map_or(false, |d| keep(d)))
        .collect();
    Ok(df.filter(&BooleanChunked::new("mask", &mask))?)
}

/// Rows observed on `date`.
pub fn filter_date(df: &DataFrame, date: NaiveDate) -> Result<DataFrame> {
    filter_dates(df, |d| d == date)
}

/// Last date header of a prepared table.
pub fn latest_date(table: &PreparedTable) -> Result<NaiveDate> {
    table.date_headers.last().ok_or_else(|| {
        PipelineError::Aggregation(format!("{} has no date columns", table.metric.value_name()))
    })
}

/// Parsed dates of a prepared table, header order.
pub fn dates_of(table: &PreparedTable) -> Vec<NaiveDate> {
    table.date_headers.parsed.iter().map(|(_, d)| *d).collect()
}

fn pairs<K>(keys: Vec<Option<K>>, values: Vec<Option<i64>>) -> Vec<(K, i64)> {
    keys.into_iter()
        .zip(values)
        .filter_map(|(k, v)| k.map(|k| (k, v.unwrap_or(0))))
        .collect()
}

/// Sum of `value` over every location, per date, ascending.
pub fn totals_by_date(long: &DataFrame, value: &str) -> Result<Vec<(NaiveDate, i64)>> {
    let summed = aggregate(long, &[GroupKey::Day], value, AggOp::Sum)?;
    Ok(pairs(date_values(&summed, DATE)?, i64_values(&summed, value)?))
}

/// One country's summed series, ascending by date.
pub fn country_series(
    long: &DataFrame,
    value: &str,
    country: &str,
) -> Result<Vec<(NaiveDate, i64)>> {
    let rows = filter_eq(long, COUNTRY, country)?;
    totals_by_date(&rows, value)
}

/// Per-country totals of `value` on `date`, ordered by country name.
pub fn country_totals_on(
    long: &DataFrame,
    value: &str,
    date: NaiveDate,
) -> Result<Vec<(String, i64)>> {
    let day = filter_date(long, date)?;
    let summed = aggregate(&day, &[GroupKey::Country], value, AggOp::Sum)?;
    Ok(pairs(string_values(&summed, COUNTRY)?, i64_values(&summed, value)?))
}

/// The `n` countries with the largest totals on `date`. Ties keep country-name order.
pub fn top_countries_on(
    long: &DataFrame,
    value: &str,
    date: NaiveDate,
    n: usize,
) -> Result<Vec<(String, i64)>> {
    let day = filter_date(long, date)?;
    let summed = aggregate(&day, &[GroupKey::Country], value, AggOp::Sum)?;
    let top = top_n(&summed, value, n)?;
    Ok(pairs(string_values(&top, COUNTRY)?, i64_values(&top, value)?))
}

/// Stable descending sort of labelled values, truncated to `n`.
pub fn rank_desc<K, T: PartialOrd>(mut items: Vec<(K, T)>, n: usize) -> Vec<(K, T)> {
    items.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    items.truncate(n);
    items
}

/// Largest single-day increase of one country's series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakDaily {
    pub country: String,
    pub peak_daily: i64,
    pub peak_date: String,
}

/// Peak of the daily increments for `country`; the earliest date wins ties.
/// `None` when the country has no rows.
pub fn peak_daily(long: &DataFrame, value: &str, country: &str) -> Result<Option<PeakDaily>> {
    let rows = filter_eq(long, COUNTRY, country)?;
    if rows.height() == 0 {
        return Ok(None);
    }
    let daily = aggregate(&rows, &[GroupKey::Day], value, AggOp::Diff)?;
    let series = pairs(date_values(&daily, DATE)?, i64_values(&daily, value)?);

    let mut best: Option<(NaiveDate, i64)> = None;
    for (date, v) in series {
        if best.map_or(true, |(_, b)| v > b) {
            best = Some((date, v));
        }
    }
    Ok(best.map(|(date, v)| PeakDaily {
        country: country.to_string(),
        peak_daily: v,
        peak_date: format_date(date),
    }))
}

/// First date on which the series reaches `threshold`.
pub fn first_reaching(series: &[(NaiveDate, i64)], threshold: i64) -> Option<(NaiveDate, i64)> {
    series.iter().find(|(_, v)| *v >= threshold).copied()
}

pub fn value_on(series: &[(NaiveDate, i64)], date: NaiveDate) -> i64 {
    series
        .iter()
        .find(|(d, _)| *d == date)
        .map(|(_, v)| *v)
        .unwrap_or(0)
}

/// Round to two decimals for display.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::{LAT, LONG, PROVINCE};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, d).unwrap()
    }

    fn long() -> DataFrame {
        DataFrame::new(vec![
            Series::new(
                PROVINCE,
                ["All Provinces", "Ontario", "Quebec", "All Provinces", "Ontario", "Quebec"],
            ),
            Series::new(COUNTRY, ["B", "A", "A", "B", "A", "A"]),
            Series::new(LAT, [0.0f64; 6]),
            Series::new(LONG, [0.0f64; 6]),
            Series::new(DATE, vec![day(1), day(1), day(1), day(2), day(2), day(2)]),
            Series::new("Confirmed", [5i64, 1, 2, 9, 4, 5]),
        ])
        .unwrap()
    }

    #[test]
    fn test_country_totals_and_top() {
        let totals = country_totals_on(&long(), "Confirmed", day(2)).unwrap();
        assert_eq!(totals, vec![("A".to_string(), 9), ("B".to_string(), 9)]);

        // Tie on 9: name order survives
        let top = top_countries_on(&long(), "Confirmed", day(2), 1).unwrap();
        assert_eq!(top, vec![("A".to_string(), 9)]);
    }

    #[test]
    fn test_series() {
        let series = country_series(&long(), "Confirmed", "A").unwrap();
        assert_eq!(series, vec![(day(1), 3), (day(2), 9)]);
        assert_eq!(value_on(&series, day(2)), 9);
        assert_eq!(value_on(&series, day(5)), 0);

        let global = totals_by_date(&long(), "Confirmed").unwrap();
        assert_eq!(global, vec![(day(1), 8), (day(2), 18)]);
    }

    #[test]
    fn test_peak_daily_first_max_wins() {
        let peak = peak_daily(&long(), "Confirmed", "B").unwrap().unwrap();
        assert_eq!(peak.peak_daily, 4);
        assert_eq!(peak.peak_date, "2020-01-02");
        assert!(peak_daily(&long(), "Confirmed", "Nowhere").unwrap().is_none());

        let series = country_series(&long(), "Confirmed", "A").unwrap();
        assert_eq!(first_reaching(&series, 5), Some((day(2), 9)));
        assert_eq!(first_reaching(&series, 100), None);
    }

    #[test]
    fn test_rank_desc_stable() {
        let ranked = rank_desc(vec![("A", 1.0), ("B", 2.0), ("C", 2.0)], 2);
        assert_eq!(ranked, vec![("B", 2.0), ("C", 2.0)]);
        assert_eq!(round2(37.499), 37.5);
    }
}

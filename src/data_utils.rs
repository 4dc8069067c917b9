//! Typed column access over polars frames.
//!
//! The pipeline stages read columns into plain vectors, transform them, and
//! rebuild new frames. These helpers keep the casting rules in one place.

use crate::error::Result;
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use std::collections::HashSet;

/// Read a column as optional strings, casting non-string columns first.
pub fn string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = df.column(name)?.cast(&DataType::String)?;
    let values = series
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect();
    Ok(values)
}

/// Read a column as optional floats (latitude/longitude, rates).
pub fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = df.column(name)?.cast(&DataType::Float64)?;
    let values = series.f64()?.into_iter().collect();
    Ok(values)
}

/// Read a column as optional integers (observation counts).
pub fn i64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let series = df.column(name)?.cast(&DataType::Int64)?;
    let values = series.i64()?.into_iter().collect();
    Ok(values)
}

/// Read a `Date` column as calendar dates.
pub fn date_values(df: &DataFrame, name: &str) -> Result<Vec<Option<NaiveDate>>> {
    let values = df.column(name)?.date()?.as_date_iter().collect();
    Ok(values)
}

/// Number of distinct non-missing values in a column.
pub fn n_unique(df: &DataFrame, name: &str) -> Result<usize> {
    let values = string_values(df, name)?;
    let distinct: HashSet<String> = values.into_iter().flatten().collect();
    Ok(distinct.len())
}

/// Keep only the rows whose string value in `name` equals `value`.
pub fn filter_eq(df: &DataFrame, name: &str, value: &str) -> Result<DataFrame> {
    let mask: Vec<bool> = string_values(df, name)?
        .iter()
        .map(|v| v.as_deref() == Some(value))
        .collect();
    let mask = BooleanChunked::new("mask", &mask);
    Ok(df.filter(&mask)?)
}

/// First day of the month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// ISO `YYYY-MM-DD` rendering used in reports and prompts.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// `YYYY-MM` rendering for monthly periods.
pub fn format_month(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

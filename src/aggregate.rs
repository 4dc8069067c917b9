//! Grouping, reductions, ratios and ranking over long/joined tables.
//!
//! Nothing here assumes its input is sorted by date. Every operation that
//! depends on chronology sorts explicitly.

use crate::columns::{COUNTRY, DATE, PROVINCE};
use crate::data_utils::{date_values, f64_values, i64_values, month_start, string_values};
use crate::error::{PipelineError, Result};
use chrono::{Datelike, NaiveDate};
use itertools::Itertools;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

pub const MONTH: &str = "Month";
pub const YEAR: &str = "Year";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupKey {
    Country,
    Province,
    /// Calendar day (the `Date` column itself).
    Day,
    /// First day of the calendar month.
    Month,
    Year,
}

impl GroupKey {
    pub fn column_name(&self) -> &'static str {
        match self {
            GroupKey::Country => COUNTRY,
            GroupKey::Province => PROVINCE,
            GroupKey::Day => DATE,
            GroupKey::Month => MONTH,
            GroupKey::Year => YEAR,
        }
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, GroupKey::Day | GroupKey::Month | GroupKey::Year)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggOp {
    Sum,
    Max,
    /// Value on the earliest date of each group.
    First,
    /// Consecutive difference along the temporal key.
    Diff,
}

/// Add the derived `Month`/`Year` columns the keys ask for.
fn with_period_columns(df: &DataFrame, keys: &[GroupKey]) -> Result<DataFrame> {
    let mut out = df.clone();
    let needs_month = keys.contains(&GroupKey::Month);
    let needs_year = keys.contains(&GroupKey::Year);
    if !needs_month && !needs_year {
        return Ok(out);
    }

    let dates = date_values(df, DATE)?;
    if needs_month {
        let months: Vec<Option<NaiveDate>> = dates.iter().map(|d| d.map(month_start)).collect();
        out.with_column(Series::new(MONTH, months))?;
    }
    if needs_year {
        let years: Vec<Option<i32>> = dates.iter().map(|d| d.map(|d| d.year())).collect();
        out.with_column(Series::new(YEAR, years))?;
    }
    Ok(out)
}

fn check_columns(df: &DataFrame, keys: &[GroupKey], value_col: &str) -> Result<()> {
    let names = df.get_column_names();
    if !names.contains(&value_col) {
        return Err(PipelineError::Aggregation(format!(
            "value column '{}' not found among {:?}",
            value_col, names
        )));
    }
    for key in keys {
        let source = if key.is_temporal() { DATE } else { key.column_name() };
        if !names.contains(&source) {
            return Err(PipelineError::Aggregation(format!(
                "group key {:?} needs column '{}' which is not among {:?}",
                key, source, names
            )));
        }
    }
    if keys.iter().duplicates().next().is_some() {
        return Err(PipelineError::Aggregation(format!(
            "group keys repeat: {:?}",
            keys
        )));
    }
    Ok(())
}

/// Group `df` by `keys` and reduce `value_col` with `op`.
///
/// An empty key slice reduces the whole table to one row. Output columns are
/// the key columns in the order given followed by `value_col`, sorted by the
/// keys. Missing key values form their own group.
pub fn aggregate(
    df: &DataFrame,
    keys: &[GroupKey],
    value_col: &str,
    op: AggOp,
) -> Result<DataFrame> {
    check_columns(df, keys, value_col)?;

    let value = match op {
        AggOp::Sum => col(value_col).sum(),
        AggOp::Max => col(value_col).max(),
        AggOp::First => col(value_col).first(),
        AggOp::Diff => return diff_by_period(df, keys, value_col),
    };
    let frame = with_period_columns(df, keys)?;

    let mut lazy = frame.lazy();
    if op == AggOp::First {
        lazy = lazy.sort([DATE], SortMultipleOptions::default().with_maintain_order(true));
    }

    if keys.is_empty() {
        return Ok(lazy.select([value]).collect()?);
    }

    let key_names: Vec<&str> = keys.iter().map(|k| k.column_name()).collect();
    let key_exprs: Vec<Expr> = key_names.iter().map(|k| col(k)).collect();
    let result = lazy
        .group_by_stable(key_exprs)
        .agg([value])
        .sort(key_names, SortMultipleOptions::default().with_maintain_order(true))
        .collect()?;
    Ok(result)
}

/// Sum locations per (other keys, day), then keep each period's last-day
/// total. Cumulative series make that the period's closing value.
fn period_closing(df: &DataFrame, keys: &[GroupKey], value_col: &str) -> Result<DataFrame> {
    let mut daily_keys: Vec<GroupKey> = keys.iter().copied().filter(|k| !k.is_temporal()).collect();
    daily_keys.push(GroupKey::Day);
    let daily = aggregate(df, &daily_keys, value_col, AggOp::Sum)?;

    let key_names: Vec<&str> = keys.iter().map(|k| k.column_name()).collect();
    let key_exprs: Vec<Expr> = key_names.iter().map(|k| col(k)).collect();
    let closing = with_period_columns(&daily, keys)?
        .lazy()
        .sort([DATE], SortMultipleOptions::default().with_maintain_order(true))
        .group_by_stable(key_exprs)
        .agg([col(value_col).last()])
        .sort(key_names, SortMultipleOptions::default().with_maintain_order(true))
        .collect()?;
    Ok(closing)
}

/// Difference each (other keys) series along the period. Day keys use daily
/// totals, Month/Year keys use each period's closing total. The first period
/// of every series is 0; negatives are kept.
fn diff_by_period(df: &DataFrame, keys: &[GroupKey], value_col: &str) -> Result<DataFrame> {
    let temporal: Vec<&GroupKey> = keys.iter().filter(|k| k.is_temporal()).collect();
    let period_key = match temporal.as_slice() {
        [key] => **key,
        [] => {
            return Err(PipelineError::Aggregation(
                "Diff requires a Day, Month or Year group key".to_string(),
            ))
        }
        _ => {
            return Err(PipelineError::Aggregation(format!(
                "Diff takes exactly one temporal key, got {:?}",
                temporal
            )))
        }
    };

    let mut summed = match period_key {
        GroupKey::Day => aggregate(df, keys, value_col, AggOp::Sum)?,
        _ => period_closing(df, keys, value_col)?,
    };
    let totals = i64_values(&summed, value_col)?;

    let mut series_of: HashMap<Vec<Option<String>>, Vec<usize>> = HashMap::new();
    let others: Vec<Vec<Option<String>>> = keys
        .iter()
        .filter(|k| !k.is_temporal())
        .map(|k| string_values(&summed, k.column_name()))
        .collect::<Result<_>>()?;
    for row in 0..summed.height() {
        let id: Vec<Option<String>> = others.iter().map(|c| c[row].clone()).collect();
        series_of.entry(id).or_default().push(row);
    }

    // Ordinal position of each cell's period
    let periods = match period_key {
        GroupKey::Year => i64_values(&summed, YEAR)?
            .into_iter()
            .collect::<Vec<_>>(),
        _ => date_values(&summed, period_key.column_name())?
            .into_iter()
            .map(|d| d.map(|d| d.num_days_from_ce() as i64))
            .collect(),
    };

    let mut diffs: Vec<Option<i64>> = vec![None; summed.height()];
    for rows in series_of.values() {
        let mut ordered = rows.clone();
        ordered.sort_by_key(|r| periods[*r]);
        let values: Vec<i64> = ordered.iter().map(|r| totals[*r].unwrap_or(0)).collect();
        for (row, delta) in ordered.iter().zip(daily_increments(&values)) {
            diffs[*row] = Some(delta);
        }
    }

    summed.with_column(Series::new(value_col, diffs))?;
    Ok(summed)
}

/// Cumulative → incremental: `v[i] - v[i-1]`, first element 0.
pub fn daily_increments(values: &[i64]) -> Vec<i64> {
    let mut out = Vec::with_capacity(values.len());
    if !values.is_empty() {
        out.push(0);
    }
    out.extend(values.windows(2).map(|w| w[1] - w[0]));
    out
}

/// `numerator / denominator`, with any zero denominator giving 0.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

pub fn percent(numerator: f64, denominator: f64) -> f64 {
    ratio(numerator, denominator) * 100.0
}

/// Append `out = numerator / denominator * 100` as a float column.
/// Missing operands count as zero.
pub fn with_percent(
    df: &DataFrame,
    numerator: &str,
    denominator: &str,
    out: &str,
) -> Result<DataFrame> {
    let nums = f64_values(df, numerator)?;
    let dens = f64_values(df, denominator)?;
    let values: Vec<f64> = nums
        .iter()
        .zip(dens.iter())
        .map(|(n, d)| percent(n.unwrap_or(0.0), d.unwrap_or(0.0)))
        .collect();

    let mut result = df.clone();
    result.with_column(Series::new(out, values))?;
    Ok(result)
}

/// The `n` rows with the largest `value_col`, descending.
///
/// The sort is stable: equal values keep their input order. Missing values
/// rank after every present value.
pub fn top_n(df: &DataFrame, value_col: &str, n: usize) -> Result<DataFrame> {
    let values = f64_values(df, value_col)?;
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|a, b| match (values[*a], values[*b]) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    order.truncate(n);

    let idx = IdxCa::from_vec("idx", order.into_iter().map(|i| i as IdxSize).collect());
    Ok(df.take(&idx)?)
}

/// Arithmetic mean; empty input gives 0.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

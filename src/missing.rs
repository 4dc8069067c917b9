//! Missing Value Policies
//!
//! Applied after column normalization. The fill behavior is always passed in
//! as a [`MissingPolicy`] so that the "All Provinces" and "Unknown" variants
//! share one code path.

use crate::columns::{COUNTRY, PROVINCE};
use crate::data_utils::{i64_values, string_values};
use crate::error::{PipelineError, Result};
use crate::reshape::date_columns;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const ALL_PROVINCES: &str = "All Provinces";
pub const UNKNOWN: &str = "Unknown";

/// Fill strategy for the observation (date) columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateFill {
    /// Carry the last observed value forward along the date axis of each row,
    /// then replace any still-missing leading values with zero.
    ForwardThenZero,
    /// Leave raw missingness visible.
    Keep,
}

/// What to do with rows whose country value is missing or blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountryPolicy {
    /// Leave the value missing. Grouping then treats the missing marker as its own group.
    Keep,
    /// Remove the rows.
    Drop,
    /// Replace the value with a fixed label.
    Sentinel(String),
    /// Fail with [`PipelineError::MissingCountry`].
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingPolicy {
    pub province_sentinel: String,
    pub date_fill: DateFill,
    pub missing_country: CountryPolicy,
}

impl MissingPolicy {
    pub fn new(province_sentinel: impl Into<String>) -> Self {
        Self {
            province_sentinel: province_sentinel.into(),
            date_fill: DateFill::Keep,
            missing_country: CountryPolicy::Keep,
        }
    }

    /// Default policy used when loading the datasets.
    pub fn all_provinces() -> Self {
        Self::new(ALL_PROVINCES)
    }

    /// Policy used by the missing-data report: "Unknown" provinces and
    /// forward-filled cumulative series.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN).with_date_fill(DateFill::ForwardThenZero)
    }

    pub fn with_date_fill(mut self, date_fill: DateFill) -> Self {
        self.date_fill = date_fill;
        self
    }

    pub fn with_missing_country(mut self, policy: CountryPolicy) -> Self {
        self.missing_country = policy;
        self
    }
}

impl Default for MissingPolicy {
    fn default() -> Self {
        Self::all_provinces()
    }
}

pub fn apply_missing_policy(df: DataFrame, policy: &MissingPolicy) -> Result<DataFrame> {
    let mut result = df;

    let provinces: Vec<String> = string_values(&result, PROVINCE)?
        .into_iter()
        .map(|v| match v {
            Some(s) if !s.is_empty() => s,
            _ => policy.province_sentinel.clone(),
        })
        .collect();
    result.with_column(Series::new(PROVINCE, provinces))?;

    if policy.date_fill == DateFill::ForwardThenZero {
        result = forward_fill_dates(result)?;
    }

    result = apply_country_policy(result, &policy.missing_country)?;

    debug!("Applied missing policy {:?} -> {:?}", policy, result.shape());
    Ok(result)
}

fn forward_fill_dates(df: DataFrame) -> Result<DataFrame> {
    let dates = date_columns(&df);
    let mut result = df;
    let mut last: Vec<Option<i64>> = vec![None; result.height()];

    for name in &dates {
        let filled: Vec<i64> = i64_values(&result, name)?
            .into_iter()
            .zip(last.iter_mut())
            .map(|(value, carried)| {
                if value.is_some() {
                    *carried = value;
                }
                carried.unwrap_or(0)
            })
            .collect();
        result.with_column(Series::new(name, filled))?;
    }

    Ok(result)
}

fn apply_country_policy(df: DataFrame, policy: &CountryPolicy) -> Result<DataFrame> {
    if *policy == CountryPolicy::Keep {
        return Ok(df);
    }

    let countries = string_values(&df, COUNTRY)?;
    let missing: Vec<bool> = countries
        .iter()
        .map(|c| c.as_deref().map_or(true, str::is_empty))
        .collect();
    let missing_rows = missing.iter().filter(|m| **m).count();
    if missing_rows == 0 {
        return Ok(df);
    }

    match policy {
        CountryPolicy::Keep => Ok(df),
        CountryPolicy::Reject => Err(PipelineError::MissingCountry { rows: missing_rows }),
        CountryPolicy::Drop => {
            info!("Dropping {} row(s) with missing country", missing_rows);
            let keep: Vec<bool> = missing.iter().map(|m| !m).collect();
            Ok(df.filter(&BooleanChunked::new("keep", &keep))?)
        }
        CountryPolicy::Sentinel(label) => {
            let filled: Vec<String> = countries
                .into_iter()
                .map(|c| match c {
                    Some(s) if !s.is_empty() => s,
                    _ => label.clone(),
                })
                .collect();
            let mut result = df;
            result.with_column(Series::new(COUNTRY, filled))?;
            Ok(result)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMissing {
    pub column: String,
    pub missing: usize,
}

/// Missing-value census of one wide table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingReport {
    pub rows: usize,
    pub columns: usize,
    pub total_missing: usize,
    pub province_null: usize,
    pub province_blank: usize,
    pub columns_with_missing: Vec<ColumnMissing>,
}

impl MissingReport {
    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        let columns_with_missing: Vec<ColumnMissing> = df
            .get_columns()
            .iter()
            .filter(|s| s.null_count() > 0)
            .map(|s| ColumnMissing {
                column: s.name().to_string(),
                missing: s.null_count(),
            })
            .collect();
        let total_missing = columns_with_missing.iter().map(|c| c.missing).sum();

        let (province_null, province_blank) = match df.column(PROVINCE) {
            Ok(_) => {
                let values = string_values(df, PROVINCE)?;
                let nulls = values.iter().filter(|v| v.is_none()).count();
                let blanks = values.iter().filter(|v| v.as_deref() == Some("")).count();
                (nulls, blanks)
            }
            Err(_) => (0, 0),
        };

        Ok(Self {
            rows: df.height(),
            columns: df.width(),
            total_missing,
            province_null,
            province_blank,
            columns_with_missing,
        })
    }

    /// Province cells that a fill policy would replace.
    pub fn province_to_replace(&self) -> usize {
        self.province_null + self.province_blank
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::{LAT, LONG};

    fn sample() -> DataFrame {
        df![
            PROVINCE => [None, Some(""), Some("Ontario")],
            COUNTRY => [Some("France"), None, Some("Canada")],
            LAT => [46.2, 0.0, 51.2],
            LONG => [2.2, 0.0, -85.3],
            "1/22/20" => [None, Some(1i64), Some(2)],
            "1/23/20" => [Some(3i64), None, Some(4)],
            "1/24/20" => [None, None, Some(6i64)]
        ]
        .unwrap()
    }

    #[test]
    fn test_province_sentinel_is_a_parameter() {
        let all = apply_missing_policy(sample(), &MissingPolicy::all_provinces()).unwrap();
        let unknown = apply_missing_policy(sample(), &MissingPolicy::new(UNKNOWN)).unwrap();

        assert_eq!(
            string_values(&all, PROVINCE).unwrap(),
            vec![
                Some(ALL_PROVINCES.to_string()),
                Some(ALL_PROVINCES.to_string()),
                Some("Ontario".to_string())
            ]
        );
        assert_eq!(
            string_values(&unknown, PROVINCE).unwrap(),
            vec![Some(UNKNOWN.to_string()), Some(UNKNOWN.to_string()), Some("Ontario".to_string())]
        );
    }

    #[test]
    fn test_forward_fill_then_zero() {
        let policy = MissingPolicy::all_provinces().with_date_fill(DateFill::ForwardThenZero);
        let out = apply_missing_policy(sample(), &policy).unwrap();

        // Row 0: leading gap -> 0, then 3, carried forward
        // Row 1: 1, carried forward twice
        assert_eq!(i64_values(&out, "1/22/20").unwrap(), vec![Some(0), Some(1), Some(2)]);
        assert_eq!(i64_values(&out, "1/23/20").unwrap(), vec![Some(3), Some(1), Some(4)]);
        assert_eq!(i64_values(&out, "1/24/20").unwrap(), vec![Some(3), Some(1), Some(6)]);
    }

    #[test]
    fn test_keep_leaves_raw_missingness() {
        let out = apply_missing_policy(sample(), &MissingPolicy::all_provinces()).unwrap();
        assert_eq!(i64_values(&out, "1/24/20").unwrap(), vec![None, None, Some(6)]);
    }

    #[test]
    fn test_country_is_never_filled_by_default() {
        let out = apply_missing_policy(sample(), &MissingPolicy::unknown()).unwrap();
        assert_eq!(string_values(&out, COUNTRY).unwrap()[1], None);
    }

    #[test]
    fn test_country_policies() {
        let dropped = apply_missing_policy(
            sample(),
            &MissingPolicy::all_provinces().with_missing_country(CountryPolicy::Drop),
        )
        .unwrap();
        assert_eq!(dropped.height(), 2);

        let labelled = apply_missing_policy(
            sample(),
            &MissingPolicy::all_provinces()
                .with_missing_country(CountryPolicy::Sentinel("Unassigned".to_string())),
        )
        .unwrap();
        assert_eq!(string_values(&labelled, COUNTRY).unwrap()[1], Some("Unassigned".to_string()));

        let rejected = apply_missing_policy(
            sample(),
            &MissingPolicy::all_provinces().with_missing_country(CountryPolicy::Reject),
        );
        assert!(matches!(rejected, Err(PipelineError::MissingCountry { rows: 1 })));
    }

    #[test]
    fn test_missing_report() {
        let report = MissingReport::from_frame(&sample()).unwrap();
        assert_eq!(report.rows, 3);
        assert_eq!(report.province_null, 1);
        assert_eq!(report.province_blank, 1);
        assert_eq!(report.province_to_replace(), 2);
        // province 1 + country 1 + dates 1 + 1 + 2
        assert_eq!(report.total_missing, 6);

        let cleaned = apply_missing_policy(sample(), &MissingPolicy::unknown()).unwrap();
        let after = MissingReport::from_frame(&cleaned).unwrap();
        assert_eq!(after.total_missing, 1);
        assert_eq!(after.province_to_replace(), 0);
    }
}

//! Reports over the joined confirmed/deaths/recovered table.

use super::ReportOptions;
use crate::aggregate::{aggregate, mean, percent, ratio, AggOp, GroupKey, MONTH};
use crate::columns::{COUNTRY, DATE};
use crate::data_utils::{
    date_values, filter_eq, format_date, format_month, i64_values, string_values,
};
use crate::error::{PipelineError, Result};
use crate::join::JoinDiagnostics;
use crate::loader::{Datasets, Metric};
use crate::metrics::{filter_date, filter_dates, rank_desc, round2};
use chrono::{Datelike, NaiveDate};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Monthly maximum of the per-day country totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyCountry {
    pub country: String,
    /// `YYYY-MM`, so string order is calendar order.
    pub month: String,
    pub confirmed: i64,
    pub deaths: i64,
    pub recovered: i64,
}

fn monthly_max(df: &DataFrame, value: &str) -> Result<DataFrame> {
    let daily = aggregate(df, &[GroupKey::Country, GroupKey::Day], value, AggOp::Sum)?;
    aggregate(&daily, &[GroupKey::Country, GroupKey::Month], value, AggOp::Max)
}

/// Provinces are summed per country and day before the monthly maximum is taken.
/// Rows are ordered by country, then month.
pub fn monthly_country_max(joined: &DataFrame) -> Result<Vec<MonthlyCountry>> {
    let confirmed = monthly_max(joined, Metric::Confirmed.value_name())?;
    let deaths = monthly_max(joined, Metric::Deaths.value_name())?;
    let recovered = monthly_max(joined, Metric::Recovered.value_name())?;
    if confirmed.height() != deaths.height() || confirmed.height() != recovered.height() {
        return Err(PipelineError::Aggregation(format!(
            "monthly groups differ across metrics: {} / {} / {}",
            confirmed.height(),
            deaths.height(),
            recovered.height()
        )));
    }

    let countries = string_values(&confirmed, COUNTRY)?;
    let months = date_values(&confirmed, MONTH)?;
    let confirmed = i64_values(&confirmed, Metric::Confirmed.value_name())?;
    let deaths = i64_values(&deaths, Metric::Deaths.value_name())?;
    let recovered = i64_values(&recovered, Metric::Recovered.value_name())?;

    Ok((0..countries.len())
        .filter_map(|i| {
            let country = countries[i].clone()?;
            let month = months[i]?;
            Some(MonthlyCountry {
                country,
                month: format_month(month),
                confirmed: confirmed[i].unwrap_or(0),
                deaths: deaths[i].unwrap_or(0),
                recovered: recovered[i].unwrap_or(0),
            })
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Merging {
    pub rows: usize,
    pub columns: usize,
    pub diagnostics: JoinDiagnostics,
    pub monthly_rows: usize,
    pub latest_month: Option<String>,
    pub top_latest_month: Vec<MonthlyCountry>,
    pub focus: Vec<MonthlyCountry>,
}

pub fn merging(data: &Datasets, options: &ReportOptions) -> Result<Merging> {
    let joined = &data.joined.table;
    let monthly = monthly_country_max(joined)?;

    let latest = monthly.iter().map(|m| m.month.clone()).max();
    let in_latest: Vec<(MonthlyCountry, i64)> = monthly
        .iter()
        .filter(|m| Some(&m.month) == latest.as_ref())
        .map(|m| (m.clone(), m.confirmed))
        .collect();
    let top_latest_month = rank_desc(in_latest, options.top_n)
        .into_iter()
        .map(|(m, _)| m)
        .collect();

    let focus = monthly
        .iter()
        .filter(|m| options.monthly_focus.contains(&m.country))
        .cloned()
        .collect();

    Ok(Merging {
        rows: joined.height(),
        columns: joined.width(),
        diagnostics: data.joined.diagnostics.clone(),
        monthly_rows: monthly.len(),
        latest_month: latest,
        top_latest_month,
        focus,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageDeathRate {
    pub country: String,
    pub average_death_rate: f64,
    pub max_confirmed: i64,
    pub max_deaths: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSnapshot {
    pub country: String,
    pub date: Option<String>,
    pub confirmed: i64,
    pub deaths: i64,
    pub recovered: i64,
    pub recovery_rate: f64,
    pub death_rate: f64,
    /// Recoveries per death; 0 when there are no deaths.
    pub recovery_to_death: f64,
    pub assessment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyRecovery {
    pub month: String,
    pub confirmed: i64,
    pub recovered: i64,
    pub recovery_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryTrend {
    pub country: String,
    pub start: String,
    pub end: String,
    pub months: Vec<MonthlyRecovery>,
    pub best_month: Option<MonthlyRecovery>,
    pub early_average: f64,
    pub late_average: f64,
    pub trend: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combined {
    pub year: i32,
    pub highest_death_rates: Vec<AverageDeathRate>,
    pub outcome: OutcomeSnapshot,
    pub recovery_trend: RecoveryTrend,
}

const DEATH_RATE_TOP: usize = 3;
const TREND_MONTHS: usize = 3;

pub fn combined(data: &Datasets, options: &ReportOptions) -> Result<Combined> {
    let joined = &data.joined.table;
    let year = options.death_rate_year;
    let in_year = filter_dates(joined, |d| d.year() == year)?;

    Ok(Combined {
        year,
        highest_death_rates: average_death_rates(
            &in_year,
            options.death_rate_min_cases,
            DEATH_RATE_TOP,
        )?,
        outcome: outcome_snapshot(joined, &options.outcome_country)?,
        recovery_trend: recovery_trend(
            joined,
            &options.recovery_ratio_country,
            options.recovery_window.0,
            options.recovery_window.1,
        )?,
    })
}

/// Countries whose largest monthly total reaches `min_cases`, ranked by the
/// mean of their monthly death rates.
pub fn average_death_rates(
    joined: &DataFrame,
    min_cases: i64,
    n: usize,
) -> Result<Vec<AverageDeathRate>> {
    let mut by_country: BTreeMap<String, Vec<MonthlyCountry>> = BTreeMap::new();
    for month in monthly_country_max(joined)? {
        by_country.entry(month.country.clone()).or_default().push(month);
    }

    let candidates: Vec<(AverageDeathRate, f64)> = by_country
        .into_iter()
        .filter_map(|(country, months)| {
            let max_confirmed = months.iter().map(|m| m.confirmed).max().unwrap_or(0);
            if max_confirmed < min_cases {
                return None;
            }
            let rates: Vec<f64> = months
                .iter()
                .map(|m| percent(m.deaths as f64, m.confirmed as f64))
                .collect();
            let average = mean(&rates);
            Some((
                AverageDeathRate {
                    country,
                    average_death_rate: round2(average),
                    max_confirmed,
                    max_deaths: months.iter().map(|m| m.deaths).max().unwrap_or(0),
                },
                average,
            ))
        })
        .collect();

    Ok(rank_desc(candidates, n).into_iter().map(|(rate, _)| rate).collect())
}

fn assessment(recovery_rate: f64) -> &'static str {
    if recovery_rate > 80.0 {
        "good"
    } else if recovery_rate > 60.0 {
        "moderate"
    } else {
        "concerning"
    }
}

/// Totals for `country` on the last date it appears in the joined table.
pub fn outcome_snapshot(joined: &DataFrame, country: &str) -> Result<OutcomeSnapshot> {
    let rows = filter_eq(joined, COUNTRY, country)?;
    let last = date_values(&rows, DATE)?.into_iter().flatten().max();

    let (confirmed, deaths, recovered) = match last {
        Some(date) => {
            let day = filter_date(&rows, date)?;
            let total = |metric: Metric| -> Result<i64> {
                Ok(i64_values(&day, metric.value_name())?.into_iter().flatten().sum())
            };
            (total(Metric::Confirmed)?, total(Metric::Deaths)?, total(Metric::Recovered)?)
        }
        None => (0, 0, 0),
    };

    let recovery_rate = percent(recovered as f64, confirmed as f64);
    Ok(OutcomeSnapshot {
        country: country.to_string(),
        date: last.map(format_date),
        confirmed,
        deaths,
        recovered,
        recovery_rate: round2(recovery_rate),
        death_rate: round2(percent(deaths as f64, confirmed as f64)),
        recovery_to_death: round2(ratio(recovered as f64, deaths as f64)),
        assessment: assessment(recovery_rate).to_string(),
    })
}

/// Monthly recovery ratio for `country` between `start` and `end` inclusive.
pub fn recovery_trend(
    joined: &DataFrame,
    country: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<RecoveryTrend> {
    let rows = filter_dates(&filter_eq(joined, COUNTRY, country)?, |d| d >= start && d <= end)?;
    let months: Vec<MonthlyRecovery> = monthly_country_max(&rows)?
        .into_iter()
        .map(|m| MonthlyRecovery {
            recovery_ratio: round2(percent(m.recovered as f64, m.confirmed as f64)),
            month: m.month,
            confirmed: m.confirmed,
            recovered: m.recovered,
        })
        .collect();

    let mut best_month: Option<&MonthlyRecovery> = None;
    for month in &months {
        if best_month.map_or(true, |b| month.recovery_ratio > b.recovery_ratio) {
            best_month = Some(month);
        }
    }
    let best_month = best_month.cloned();

    let ratios: Vec<f64> = months.iter().map(|m| m.recovery_ratio).collect();
    let early = &ratios[..ratios.len().min(TREND_MONTHS)];
    let late = &ratios[ratios.len().saturating_sub(TREND_MONTHS)..];
    let early_average = round2(mean(early));
    let late_average = round2(mean(late));

    Ok(RecoveryTrend {
        country: country.to_string(),
        start: format_date(start),
        end: format_date(end),
        months,
        best_month,
        early_average,
        late_average,
        trend: if late_average > early_average { "improving" } else { "declining" }.to_string(),
    })
}

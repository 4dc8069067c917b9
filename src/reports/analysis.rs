//! Per-table analyses: daily peaks, recovery and death rates, the long-form
//! deaths table and its milestones.

use super::ReportOptions;
use crate::aggregate::{aggregate, mean, percent, AggOp, GroupKey};
use crate::columns::{COUNTRY, DATE, PROVINCE};
use crate::data_utils::{date_values, filter_eq, format_date, i64_values, string_values};
use crate::error::Result;
use crate::loader::{Datasets, Metric};
use crate::metrics::{
    country_rates, country_series, country_values, dates_of, filter_date, first_reaching,
    latest_date, peak_daily,
    rank_desc, round2, top_countries_on, value_on, CountryRate, CountryValue, PeakDaily,
};
use chrono::NaiveDate;
use itertools::Itertools;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryComparison {
    pub country: String,
    pub date: String,
    /// False when the date is not among the table headers; counts are then 0.
    pub date_available: bool,
    pub confirmed: i64,
    pub recovered: i64,
    pub recovery_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvinceDeathRate {
    pub province: String,
    pub confirmed: i64,
    pub deaths: i64,
    pub death_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Independent {
    pub peak_daily_cases: Vec<PeakDaily>,
    pub recovery: Vec<RecoveryComparison>,
    pub province_country: String,
    pub province_death_rates: Vec<ProvinceDeathRate>,
}

pub fn independent(data: &Datasets, options: &ReportOptions) -> Result<Independent> {
    let mut peaks = Vec::new();
    for country in &options.peak_countries {
        let value = Metric::Confirmed.value_name();
        if let Some(peak) = peak_daily(&data.confirmed.long, value, country)? {
            peaks.push(peak);
        }
    }
    peaks.sort_by(|a, b| b.peak_daily.cmp(&a.peak_daily));

    let recovery = options
        .recovery_countries
        .iter()
        .map(|country| recovery_on(data, country, options.recovery_date))
        .collect::<Result<Vec<_>>>()?;

    Ok(Independent {
        peak_daily_cases: peaks,
        recovery,
        province_country: options.province_country.clone(),
        province_death_rates: province_death_rates(data, &options.province_country)?,
    })
}

fn recovery_on(data: &Datasets, country: &str, date: NaiveDate) -> Result<RecoveryComparison> {
    let date_available =
        dates_of(&data.confirmed).contains(&date) && dates_of(&data.recovered).contains(&date);
    let (confirmed, recovered) = if date_available {
        let confirmed =
            country_series(&data.confirmed.long, Metric::Confirmed.value_name(), country)?;
        let recovered =
            country_series(&data.recovered.long, Metric::Recovered.value_name(), country)?;
        (value_on(&confirmed, date), value_on(&recovered, date))
    } else {
        (0, 0)
    };

    Ok(RecoveryComparison {
        country: country.to_string(),
        date: format_date(date),
        date_available,
        confirmed,
        recovered,
        recovery_rate: round2(percent(recovered as f64, confirmed as f64)),
    })
}

fn province_totals(
    long: &DataFrame,
    value: &str,
    country: &str,
    date: NaiveDate,
) -> Result<Vec<(String, i64)>> {
    let rows = filter_date(&filter_eq(long, COUNTRY, country)?, date)?;
    let summed = aggregate(&rows, &[GroupKey::Province], value, AggOp::Sum)?;
    Ok(string_values(&summed, PROVINCE)?
        .into_iter()
        .zip(i64_values(&summed, value)?)
        .filter_map(|(p, v)| p.map(|p| (p, v.unwrap_or(0))))
        .collect())
}

/// Death rate per province of `country`, each table read on its latest date.
pub fn province_death_rates(data: &Datasets, country: &str) -> Result<Vec<ProvinceDeathRate>> {
    let confirmed = province_totals(
        &data.confirmed.long,
        Metric::Confirmed.value_name(),
        country,
        latest_date(&data.confirmed)?,
    )?;
    let deaths = province_totals(
        &data.deaths.long,
        Metric::Deaths.value_name(),
        country,
        latest_date(&data.deaths)?,
    )?;

    let mut rates: Vec<ProvinceDeathRate> = confirmed
        .into_iter()
        .map(|(province, confirmed)| {
            let deaths = deaths
                .iter()
                .find(|(p, _)| *p == province)
                .map(|(_, d)| *d)
                .unwrap_or(0);
            ProvinceDeathRate {
                death_rate: round2(percent(deaths as f64, confirmed as f64)),
                province,
                confirmed,
                deaths,
            }
        })
        .collect();
    rates.sort_by(|a, b| {
        b.death_rate
            .partial_cmp(&a.death_rate)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(rates)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongRow {
    pub province: Option<String>,
    pub country: Option<String>,
    pub date: Option<String>,
    pub deaths: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub threshold: i64,
    pub date: Option<String>,
    pub value: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    pub long_rows: usize,
    pub long_columns: usize,
    pub sample: Vec<LongRow>,
    pub latest_date: String,
    pub top_deaths: Vec<CountryValue>,
    pub top_average_daily_deaths: Vec<CountryRate>,
    pub milestone_country: String,
    pub milestones: Vec<Milestone>,
}

const SAMPLE_ROWS: usize = 8;
const AVERAGE_TOP: usize = 5;

pub fn transformation(data: &Datasets, options: &ReportOptions) -> Result<Transformation> {
    let long = &data.deaths.long;
    let value = Metric::Deaths.value_name();

    let head = long.head(Some(SAMPLE_ROWS));
    let sample = string_values(&head, PROVINCE)?
        .into_iter()
        .zip(string_values(&head, COUNTRY)?)
        .zip(date_values(&head, DATE)?)
        .zip(i64_values(&head, value)?)
        .map(|(((province, country), date), deaths)| LongRow {
            province,
            country,
            date: date.map(format_date),
            deaths,
        })
        .collect();

    let latest = latest_date(&data.deaths)?;
    let top_deaths = country_values(top_countries_on(long, value, latest, options.deaths_top_n)?);

    Ok(Transformation {
        long_rows: long.height(),
        long_columns: long.width(),
        sample,
        latest_date: format_date(latest),
        top_deaths,
        top_average_daily_deaths: country_rates(average_daily(long, value, AVERAGE_TOP)?),
        milestone_country: options.milestone_country.clone(),
        milestones: milestones(data, &options.milestone_country, &options.milestones)?,
    })
}

/// Mean daily increase per country, positive averages only, largest first.
pub fn average_daily(long: &DataFrame, value: &str, n: usize) -> Result<Vec<(String, f64)>> {
    let daily = aggregate(long, &[GroupKey::Country, GroupKey::Day], value, AggOp::Diff)?;
    let averages: Vec<(String, f64)> = string_values(&daily, COUNTRY)?
        .into_iter()
        .zip(i64_values(&daily, value)?)
        .filter_map(|(c, v)| c.map(|c| (c, v.unwrap_or(0) as f64)))
        .into_group_map()
        .into_iter()
        .sorted_by(|a, b| a.0.cmp(&b.0))
        .map(|(country, values)| (country, mean(&values)))
        .filter(|(_, avg)| *avg > 0.0)
        .collect();
    Ok(rank_desc(averages, n)
        .into_iter()
        .map(|(country, avg)| (country, round2(avg)))
        .collect())
}

/// First death, then the first date each threshold is reached.
fn milestones(data: &Datasets, country: &str, thresholds: &[i64]) -> Result<Vec<Milestone>> {
    let series = country_series(&data.deaths.long, Metric::Deaths.value_name(), country)?;
    Ok(std::iter::once(1)
        .chain(thresholds.iter().copied())
        .map(|threshold| {
            let hit = first_reaching(&series, threshold);
            Milestone {
                threshold,
                date: hit.map(|(d, _)| format_date(d)),
                value: hit.map(|(_, v)| v),
            }
        })
        .collect())
}

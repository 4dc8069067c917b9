//! Loading overview and first exploration of the three tables.

use super::ReportOptions;
use crate::aggregate::percent;
use crate::columns::{COUNTRY, PROVINCE};
use crate::data_utils::{format_date, i64_values, n_unique};
use crate::error::{PipelineError, Result};
use crate::loader::{Datasets, Metric, PreparedTable};
use crate::metrics::{country_series, latest_date, round2, top_countries_on};
use crate::reshape::{pivot_to_wide, DateFormat};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableShape {
    pub metric: Metric,
    pub rows: usize,
    pub columns: usize,
    pub countries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    pub tables: Vec<TableShape>,
}

pub fn overview(data: &Datasets) -> Result<Overview> {
    let tables = Metric::all()
        .into_iter()
        .map(|metric| {
            let table = data.table(metric);
            Ok(TableShape {
                metric,
                rows: table.raw.height(),
                columns: table.raw.width(),
                countries: n_unique(&table.raw, COUNTRY)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Overview { tables })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub metric: Metric,
    pub rows: usize,
    pub columns: usize,
    pub countries: usize,
    pub provinces: usize,
    pub date_columns: usize,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
    /// The long table pivots back to the filled wide table unchanged.
    pub round_trip_ok: bool,
}

impl DatasetProfile {
    pub fn of(table: &PreparedTable, format: &DateFormat) -> Result<Self> {
        let provinces = match table.raw.column(PROVINCE) {
            Ok(_) => n_unique(&table.raw, PROVINCE)?,
            Err(_) => 0,
        };
        Ok(Self {
            metric: table.metric,
            rows: table.raw.height(),
            columns: table.raw.width(),
            countries: n_unique(&table.raw, COUNTRY)?,
            provinces,
            date_columns: table.date_headers.parsed.len(),
            first_date: table.date_headers.first().map(format_date),
            last_date: table.date_headers.last().map(format_date),
            round_trip_ok: round_trips(table, format)?,
        })
    }
}

fn round_trips(table: &PreparedTable, format: &DateFormat) -> Result<bool> {
    let value = table.metric.value_name();
    let rebuilt = match pivot_to_wide(&table.long, value, format) {
        Ok(rebuilt) => rebuilt,
        // Repeated locations cannot be pivoted back
        Err(PipelineError::Aggregation(_)) => return Ok(false),
        Err(e) => return Err(e),
    };
    if table.long.height() == 0 {
        return Ok(true);
    }
    if rebuilt.shape() != table.wide.shape() {
        return Ok(false);
    }
    for (header, date) in &table.date_headers.parsed {
        let rendered = format.render(*date);
        if i64_values(&table.wide, header)? != i64_values(&rebuilt, &rendered)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryShare {
    pub country: String,
    pub confirmed: i64,
    /// Percent of the combined top-N total.
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusTimeline {
    pub country: String,
    pub total_cases: i64,
    pub first_case_date: Option<String>,
    pub peak_total: i64,
    pub peak_date: Option<String>,
    /// Growth over the last 30 dates, percent. `None` with fewer than 30 dates.
    pub growth_30_days: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exploration {
    pub profiles: Vec<DatasetProfile>,
    pub latest_date: String,
    pub top_countries: Vec<CountryShare>,
    pub focus: FocusTimeline,
}

pub fn exploration(data: &Datasets, options: &ReportOptions) -> Result<Exploration> {
    let profiles = Metric::all()
        .into_iter()
        .map(|metric| DatasetProfile::of(data.table(metric), &data.options.date_format))
        .collect::<Result<Vec<_>>>()?;

    let latest = latest_date(&data.confirmed)?;
    let top = top_countries_on(
        &data.confirmed.long,
        Metric::Confirmed.value_name(),
        latest,
        options.top_n,
    )?;
    let top_total: i64 = top.iter().map(|(_, v)| v).sum();
    let top_countries = top
        .into_iter()
        .map(|(country, confirmed)| CountryShare {
            share: round2(percent(confirmed as f64, top_total as f64)),
            country,
            confirmed,
        })
        .collect();

    Ok(Exploration {
        profiles,
        latest_date: format_date(latest),
        top_countries,
        focus: focus_timeline(data, &options.exploration_country)?,
    })
}

pub fn focus_timeline(data: &Datasets, country: &str) -> Result<FocusTimeline> {
    let series = country_series(&data.confirmed.long, Metric::Confirmed.value_name(), country)?;

    let total_cases = series.last().map(|(_, v)| *v).unwrap_or(0);
    let first_case_date = series.iter().find(|(_, v)| *v > 0).map(|(d, _)| format_date(*d));

    let mut peak: Option<(chrono::NaiveDate, i64)> = None;
    for (date, value) in &series {
        if peak.map_or(true, |(_, best)| *value > best) {
            peak = Some((*date, *value));
        }
    }

    let growth_30_days = if series.len() >= 30 {
        let base = series[series.len() - 30].1;
        Some(round2(percent((total_cases - base) as f64, base as f64)))
    } else {
        None
    };

    Ok(FocusTimeline {
        country: country.to_string(),
        total_cases,
        first_case_date,
        peak_total: peak.map(|(_, v)| v).unwrap_or(0),
        peak_date: peak.map(|(d, _)| format_date(d)),
        growth_30_days,
    })
}

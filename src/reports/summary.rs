//! Executive summary across all three tables.

use super::ReportOptions;
use crate::aggregate::percent;
use crate::columns::COUNTRY;
use crate::data_utils::{format_date, n_unique};
use crate::error::Result;
use crate::loader::{Datasets, Metric};
use crate::metrics::{
    country_rates, country_totals_on, country_values, latest_date, peak_daily, rank_desc, round2,
    totals_by_date,
    CountryRate, CountryValue, PeakDaily,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalTotals {
    pub confirmed: i64,
    pub deaths: i64,
    pub recovered: i64,
    pub death_rate: f64,
    pub recovery_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelinePoint {
    pub date: String,
    pub confirmed: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionTotals {
    pub region: String,
    pub confirmed: i64,
    pub deaths: i64,
    pub recovered: i64,
    pub death_rate: f64,
    pub recovery_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub latest_date: String,
    pub countries: usize,
    pub days: usize,
    pub global: GlobalTotals,
    pub top_countries: Vec<CountryValue>,
    pub highest_death_rates: Vec<CountryRate>,
    pub best_recovery_rates: Vec<CountryRate>,
    pub countries_over_90_recovery: usize,
    pub countries_over_100k: usize,
    pub countries_over_1m: usize,
    pub timeline: Vec<TimelinePoint>,
    pub peak_daily_cases: Vec<PeakDaily>,
    pub regions: Vec<RegionTotals>,
}

const SUMMARY_TOP: usize = 10;
const TIMELINE_STEP: usize = 30;

pub fn summary(data: &Datasets, options: &ReportOptions) -> Result<Summary> {
    let latest = latest_date(&data.confirmed)?;
    let confirmed =
        country_totals_on(&data.confirmed.long, Metric::Confirmed.value_name(), latest)?;
    let deaths: HashMap<String, i64> = country_totals_on(
        &data.deaths.long,
        Metric::Deaths.value_name(),
        latest_date(&data.deaths)?,
    )?
    .into_iter()
    .collect();
    let recovered: HashMap<String, i64> = country_totals_on(
        &data.recovered.long,
        Metric::Recovered.value_name(),
        latest_date(&data.recovered)?,
    )?
    .into_iter()
    .collect();

    let total_confirmed: i64 = confirmed.iter().map(|(_, v)| v).sum();
    let total_deaths: i64 = deaths.values().sum();
    let total_recovered: i64 = recovered.values().sum();
    let global = GlobalTotals {
        confirmed: total_confirmed,
        deaths: total_deaths,
        recovered: total_recovered,
        death_rate: round2(percent(total_deaths as f64, total_confirmed as f64)),
        recovery_rate: round2(percent(total_recovered as f64, total_confirmed as f64)),
    };

    let significant: Vec<&(String, i64)> = confirmed
        .iter()
        .filter(|(_, v)| *v >= options.summary_min_cases)
        .collect();
    let rate_of = |other: &HashMap<String, i64>| -> Vec<(String, f64)> {
        significant
            .iter()
            .map(|(country, cases)| {
                let numerator = other.get(country).copied().unwrap_or(0);
                (country.clone(), percent(numerator as f64, *cases as f64))
            })
            .collect()
    };
    let death_rates = rate_of(&deaths);
    let recovery_rates = rate_of(&recovered);
    let countries_over_90_recovery = recovery_rates.iter().filter(|(_, r)| *r > 90.0).count();

    let rounded = |rates: Vec<(String, f64)>| -> Vec<CountryRate> {
        country_rates(
            rank_desc(rates, SUMMARY_TOP)
                .into_iter()
                .map(|(c, r)| (c, round2(r)))
                .collect(),
        )
    };

    let timeline = totals_by_date(&data.confirmed.long, Metric::Confirmed.value_name())?
        .into_iter()
        .step_by(TIMELINE_STEP)
        .map(|(date, confirmed)| TimelinePoint {
            date: format_date(date),
            confirmed,
        })
        .collect();

    let mut peak_daily_cases = Vec::new();
    for country in &options.major_countries {
        let value = Metric::Confirmed.value_name();
        if let Some(peak) = peak_daily(&data.confirmed.long, value, country)? {
            peak_daily_cases.push(peak);
        }
    }
    peak_daily_cases.sort_by(|a, b| b.peak_daily.cmp(&a.peak_daily));

    let confirmed_by_country: HashMap<String, i64> = confirmed.iter().cloned().collect();
    let regions = options
        .regions
        .iter()
        .filter_map(|(region, members)| {
            let region_confirmed = region_total(members, &confirmed_by_country);
            if region_confirmed <= 0 {
                return None;
            }
            let region_deaths = region_total(members, &deaths);
            let region_recovered = region_total(members, &recovered);
            Some(RegionTotals {
                region: region.clone(),
                confirmed: region_confirmed,
                deaths: region_deaths,
                recovered: region_recovered,
                death_rate: round2(percent(region_deaths as f64, region_confirmed as f64)),
                recovery_rate: round2(percent(region_recovered as f64, region_confirmed as f64)),
            })
        })
        .collect();

    Ok(Summary {
        latest_date: format_date(latest),
        countries: n_unique(&data.confirmed.raw, COUNTRY)?,
        days: data.confirmed.date_headers.parsed.len(),
        global,
        top_countries: country_values(rank_desc(confirmed.clone(), SUMMARY_TOP)),
        highest_death_rates: rounded(death_rates),
        best_recovery_rates: rounded(recovery_rates),
        countries_over_90_recovery,
        countries_over_100k: confirmed.iter().filter(|(_, v)| *v > 100_000).count(),
        countries_over_1m: confirmed.iter().filter(|(_, v)| *v > 1_000_000).count(),
        timeline,
        peak_daily_cases,
        regions,
    })
}

fn region_total(members: &[String], totals: &HashMap<String, i64>) -> i64 {
    members.iter().filter_map(|m| totals.get(m)).sum()
}

//! Data Assistant - answers free-text questions about the datasets
//!
//! Each question is answered in three steps:
//! 1. compute a fresh statistics snapshot from the prepared datasets, adding
//!    per-country detail for every country the question mentions
//! 2. render the snapshot and the question into a prompt
//! 3. forward the prompt to a [`CompletionService`]

use crate::aggregate::percent;
use crate::data_utils::format_date;
use crate::error::{PipelineError, Result};
use crate::llm::{ChatMessage, CompletionService, SYSTEM_PROMPT};
use crate::loader::Datasets;
use crate::metrics::{
    country_rates, country_series, country_totals_on, country_values, dates_of, latest_date,
    rank_desc, round2, top_countries_on, totals_by_date, value_on, CountryRate, CountryValue,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::info;

/// Number of question/answer pairs kept.
pub const HISTORY_LIMIT: usize = 5;

const TOP_COUNTRIES: usize = 20;
const DEATH_RATE_MIN_CASES: i64 = 1000;
const DEATH_RATE_LIMIT: usize = 15;
const HISTORY_STEP: usize = 30;
const EARLY_INDEX: usize = 60;

lazy_static! {
    /// Question keywords → country name as it appears in the data.
    static ref COUNTRY_KEYWORDS: Vec<(Regex, &'static str)> = [
        (r"\b(usa|america|united states)", "US"),
        (r"\bchin(a|ese)", "China"),
        (r"\bital(y|ian)", "Italy"),
        (r"\bspa(in|nish)", "Spain"),
        (r"\bbrazil", "Brazil"),
        (r"\bindia", "India"),
        (r"\brussia", "Russia"),
        (r"\bgerman", "Germany"),
        (r"\bfrance|\bfrench", "France"),
        (r"\buk\b|\bbritain|\bbritish|\bengland", "United Kingdom"),
    ]
    .iter()
    .filter_map(|(pattern, country)| Regex::new(pattern).ok().map(|re| (re, *country)))
    .collect();
}

/// Countries mentioned in `question`, in keyword-table order, without repeats.
pub fn detect_countries(question: &str) -> Vec<&'static str> {
    let lower = question.to_lowercase();
    let mut found = Vec::new();
    for (re, country) in COUNTRY_KEYWORDS.iter() {
        if re.is_match(&lower) && !found.contains(country) {
            found.push(*country);
        }
    }
    found
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalStats {
    pub confirmed: i64,
    pub deaths: i64,
    pub recovered: i64,
    pub death_rate: f64,
    pub recovery_rate: f64,
    pub latest_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopCountries {
    pub confirmed: Vec<CountryValue>,
    pub deaths: Vec<CountryValue>,
    pub recovered: Vec<CountryValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPoint {
    pub date: String,
    pub confirmed: i64,
    pub deaths: i64,
    pub recovered: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountrySnapshot {
    pub country: String,
    pub latest_confirmed: i64,
    pub latest_deaths: i64,
    pub latest_recovered: i64,
    pub death_rate: f64,
    pub recovery_rate: f64,
    pub historical_data: Vec<HistoricalPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub early_date: String,
    pub early_cases: i64,
    pub mid_date: String,
    pub mid_cases: i64,
    pub latest_cases: i64,
    pub growth_rate_early_to_mid: f64,
    pub growth_rate_mid_to_latest: f64,
}

/// Named statistics handed to the completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionAnalysis {
    pub global_stats: GlobalStats,
    pub top_countries: TopCountries,
    pub death_rates: Vec<CountryRate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub country_specific: Vec<CountrySnapshot>,
    pub trend_analysis: Option<TrendAnalysis>,
}

impl QuestionAnalysis {
    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Compute the statistics snapshot for one question.
pub fn analyze_question(question: &str, data: &Datasets) -> Result<QuestionAnalysis> {
    let confirmed_latest = latest_date(&data.confirmed)?;
    let deaths_latest = latest_date(&data.deaths)?;
    let recovered_latest = latest_date(&data.recovered)?;

    let confirmed_by_country =
        country_totals_on(&data.confirmed.long, "Confirmed", confirmed_latest)?;
    let deaths_by_country = country_totals_on(&data.deaths.long, "Deaths", deaths_latest)?;
    let recovered_by_country =
        country_totals_on(&data.recovered.long, "Recovered", recovered_latest)?;

    let confirmed: i64 = confirmed_by_country.iter().map(|(_, v)| v).sum();
    let deaths: i64 = deaths_by_country.iter().map(|(_, v)| v).sum();
    let recovered: i64 = recovered_by_country.iter().map(|(_, v)| v).sum();

    let global_stats = GlobalStats {
        confirmed,
        deaths,
        recovered,
        death_rate: round2(percent(deaths as f64, confirmed as f64)),
        recovery_rate: round2(percent(recovered as f64, confirmed as f64)),
        latest_date: format_date(confirmed_latest),
    };

    let top_countries = TopCountries {
        confirmed: country_values(top_countries_on(
            &data.confirmed.long,
            "Confirmed",
            confirmed_latest,
            TOP_COUNTRIES,
        )?),
        deaths: country_values(top_countries_on(
            &data.deaths.long,
            "Deaths",
            deaths_latest,
            TOP_COUNTRIES,
        )?),
        recovered: country_values(top_countries_on(
            &data.recovered.long,
            "Recovered",
            recovered_latest,
            TOP_COUNTRIES,
        )?),
    };

    let deaths_lookup: HashMap<&str, i64> = deaths_by_country
        .iter()
        .map(|(c, v)| (c.as_str(), *v))
        .collect();
    let rates: Vec<(String, f64)> = confirmed_by_country
        .iter()
        .filter(|(_, cases)| *cases > DEATH_RATE_MIN_CASES)
        .filter_map(|(country, cases)| {
            deaths_lookup
                .get(country.as_str())
                .map(|d| (country.clone(), round2(percent(*d as f64, *cases as f64))))
        })
        .collect();
    let death_rates = country_rates(rank_desc(rates, DEATH_RATE_LIMIT));

    let known: Vec<&str> = confirmed_by_country.iter().map(|(c, _)| c.as_str()).collect();
    let mut country_specific = Vec::new();
    for country in detect_countries(question) {
        if known.contains(&country) {
            country_specific.push(country_snapshot(country, data)?);
        }
    }

    let trend_analysis = trend(data, confirmed)?;

    Ok(QuestionAnalysis {
        global_stats,
        top_countries,
        death_rates,
        country_specific,
        trend_analysis,
    })
}

fn country_snapshot(country: &str, data: &Datasets) -> Result<CountrySnapshot> {
    let confirmed = country_series(&data.confirmed.long, "Confirmed", country)?;
    let deaths = country_series(&data.deaths.long, "Deaths", country)?;
    let recovered = country_series(&data.recovered.long, "Recovered", country)?;

    let latest_confirmed = value_on(&confirmed, latest_date(&data.confirmed)?);
    let latest_deaths = value_on(&deaths, latest_date(&data.deaths)?);
    let latest_recovered = value_on(&recovered, latest_date(&data.recovered)?);

    let historical_data = dates_of(&data.confirmed)
        .into_iter()
        .step_by(HISTORY_STEP)
        .map(|date| HistoricalPoint {
            date: format_date(date),
            confirmed: value_on(&confirmed, date),
            deaths: value_on(&deaths, date),
            recovered: value_on(&recovered, date),
        })
        .collect();

    Ok(CountrySnapshot {
        country: country.to_string(),
        latest_confirmed,
        latest_deaths,
        latest_recovered,
        death_rate: round2(percent(latest_deaths as f64, latest_confirmed as f64)),
        recovery_rate: round2(percent(latest_recovered as f64, latest_confirmed as f64)),
        historical_data,
    })
}

/// Early (index 60, or the middle for short series) vs middle vs latest.
fn trend(data: &Datasets, latest_cases: i64) -> Result<Option<TrendAnalysis>> {
    let dates = dates_of(&data.confirmed);
    if dates.is_empty() {
        return Ok(None);
    }
    let mid_index = dates.len() / 2;
    let early_index = if dates.len() > EARLY_INDEX { EARLY_INDEX } else { mid_index };

    let global = totals_by_date(&data.confirmed.long, "Confirmed")?;
    let early_cases = value_on(&global, dates[early_index]);
    let mid_cases = value_on(&global, dates[mid_index]);

    Ok(Some(TrendAnalysis {
        early_date: format_date(dates[early_index]),
        early_cases,
        mid_date: format_date(dates[mid_index]),
        mid_cases,
        latest_cases,
        growth_rate_early_to_mid: round2(percent(
            (mid_cases - early_cases) as f64,
            early_cases as f64,
        )),
        growth_rate_mid_to_latest: round2(percent(
            (latest_cases - mid_cases) as f64,
            mid_cases as f64,
        )),
    }))
}

/// Render the analysis and the question into the user prompt.
pub fn build_prompt(question: &str, analysis: &QuestionAnalysis) -> String {
    let g = &analysis.global_stats;
    let mut context = String::new();

    let _ = writeln!(context, "COVID-19 DATA ANALYSIS RESULTS:\n");
    let _ = writeln!(context, "=== GLOBAL STATISTICS (Latest: {}) ===", g.latest_date);
    let _ = writeln!(context, "- Total Confirmed Cases: {}", g.confirmed);
    let _ = writeln!(context, "- Total Deaths: {}", g.deaths);
    let _ = writeln!(context, "- Total Recovered: {}", g.recovered);
    let _ = writeln!(context, "- Global Death Rate: {}%", g.death_rate);
    let _ = writeln!(context, "- Global Recovery Rate: {}%", g.recovery_rate);

    let _ = writeln!(context, "\n=== TOP 10 COUNTRIES BY CONFIRMED CASES ===");
    for (i, c) in analysis.top_countries.confirmed.iter().take(10).enumerate() {
        let _ = writeln!(context, "{}. {}: {}", i + 1, c.country, c.value);
    }

    let _ = writeln!(
        context,
        "\n=== DEATH RATES BY COUNTRY (Countries with >{} cases) ===",
        DEATH_RATE_MIN_CASES
    );
    for (i, r) in analysis.death_rates.iter().take(10).enumerate() {
        let _ = writeln!(context, "{}. {}: {}%", i + 1, r.country, r.rate);
    }

    if !analysis.country_specific.is_empty() {
        let _ = writeln!(context, "\n=== COUNTRY-SPECIFIC DETAILED ANALYSIS ===");
        for c in &analysis.country_specific {
            let _ = writeln!(context, "\n{}:", c.country.to_uppercase());
            let _ = writeln!(context, "- Latest Confirmed: {}", c.latest_confirmed);
            let _ = writeln!(context, "- Latest Deaths: {}", c.latest_deaths);
            let _ = writeln!(context, "- Latest Recovered: {}", c.latest_recovered);
            let _ = writeln!(context, "- Death Rate: {}%", c.death_rate);
            let _ = writeln!(context, "- Recovery Rate: {}%", c.recovery_rate);
            for p in &c.historical_data {
                let _ = writeln!(
                    context,
                    "  {}: confirmed {}, deaths {}, recovered {}",
                    p.date, p.confirmed, p.deaths, p.recovered
                );
            }
        }
    }

    if let Some(t) = &analysis.trend_analysis {
        let _ = writeln!(context, "\n=== PANDEMIC TREND ANALYSIS ===");
        let _ = writeln!(context, "- Early Period ({}): {} cases", t.early_date, t.early_cases);
        let _ = writeln!(context, "- Mid Period ({}): {} cases", t.mid_date, t.mid_cases);
        let _ = writeln!(context, "- Latest Period: {} cases", t.latest_cases);
        let _ = writeln!(context, "- Growth Rate (Early to Mid): {}%", t.growth_rate_early_to_mid);
        let _ = writeln!(
            context,
            "- Growth Rate (Mid to Latest): {}%",
            t.growth_rate_mid_to_latest
        );
    }

    format!(
        r#"You are a senior data scientist and epidemiologist. The figures below were computed from the COVID-19 datasets just now, for this question.

{}
RESPONSE GUIDELINES:
1. Use the exact numbers from the analysis above
2. Compare countries using the computed death rates and case numbers
3. Explain what the numbers mean in practical terms
4. If the analysis does not contain the data the user asked for, say so

USER QUESTION: {}
"#,
        context, question
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
}

/// Response from the data assistant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantResponse {
    pub answer: String,
    /// Countries picked up from the question.
    pub countries: Vec<String>,
    pub analysis: QuestionAnalysis,
}

pub struct DataAssistant {
    service: Arc<dyn CompletionService>,
    history: VecDeque<Exchange>,
}

impl DataAssistant {
    pub fn new(service: Arc<dyn CompletionService>) -> Self {
        Self {
            service,
            history: VecDeque::with_capacity(HISTORY_LIMIT),
        }
    }

    pub async fn ask(&mut self, question: &str, data: &Datasets) -> Result<AssistantResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::Llm("question is empty".to_string()));
        }

        info!("Assistant question: {}", question);
        let analysis = analyze_question(question, data)?;
        let prompt = build_prompt(question, &analysis);
        let messages = [ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)];
        let answer = self.service.complete(&messages).await?;

        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(Exchange {
            question: question.to_string(),
            answer: answer.clone(),
        });

        Ok(AssistantResponse {
            answer,
            countries: analysis.country_specific.iter().map(|c| c.country.clone()).collect(),
            analysis,
        })
    }

    /// Oldest first.
    pub fn history(&self) -> Vec<Exchange> {
        self.history.iter().cloned().collect()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }
}

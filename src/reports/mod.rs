//! Dashboard report sections.
//!
//! Each section is a pure function of the prepared [`Datasets`] and the
//! [`ReportOptions`], returning a serializable result. Rendering is left to
//! the CLI and the HTTP server.

pub mod analysis;
pub mod exploration;
pub mod merging;
pub mod quality;
pub mod summary;

use crate::error::{PipelineError, Result};
use crate::loader::Datasets;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Overview,
    Exploration,
    Missing,
    Cleaning,
    Independent,
    Transformation,
    Merging,
    Combined,
    Summary,
}

impl Section {
    pub fn all() -> [Section; 9] {
        [
            Section::Overview,
            Section::Exploration,
            Section::Missing,
            Section::Cleaning,
            Section::Independent,
            Section::Transformation,
            Section::Merging,
            Section::Combined,
            Section::Summary,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Section::Overview => "overview",
            Section::Exploration => "exploration",
            Section::Missing => "missing",
            Section::Cleaning => "cleaning",
            Section::Independent => "independent",
            Section::Transformation => "transformation",
            Section::Merging => "merging",
            Section::Combined => "combined",
            Section::Summary => "summary",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Section::Overview => "Data loading",
            Section::Exploration => "Data exploration",
            Section::Missing => "Handling missing data",
            Section::Cleaning => "Province cleaning",
            Section::Independent => "Independent dataset analysis",
            Section::Transformation => "Wide to long transformation",
            Section::Merging => "Merging the datasets",
            Section::Combined => "Combined analysis",
            Section::Summary => "Summary insights",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Section {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Section::all()
            .into_iter()
            .find(|section| section.name() == wanted)
            .ok_or_else(|| {
                PipelineError::Config(format!(
                    "unknown section '{}'; expected one of {:?}",
                    s,
                    Section::all().iter().map(|s| s.name()).collect::<Vec<_>>()
                ))
            })
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Countries, dates and thresholds the sections focus on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportOptions {
    pub top_n: usize,
    pub exploration_country: String,
    pub peak_countries: Vec<String>,
    pub recovery_countries: Vec<String>,
    pub recovery_date: NaiveDate,
    pub province_country: String,
    pub deaths_top_n: usize,
    pub milestone_country: String,
    pub milestones: Vec<i64>,
    pub monthly_focus: Vec<String>,
    pub death_rate_year: i32,
    pub death_rate_min_cases: i64,
    pub outcome_country: String,
    pub recovery_ratio_country: String,
    pub recovery_window: (NaiveDate, NaiveDate),
    pub summary_min_cases: i64,
    pub major_countries: Vec<String>,
    pub regions: Vec<(String, Vec<String>)>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            top_n: 10,
            exploration_country: "China".to_string(),
            peak_countries: names(&["Germany", "France", "Italy"]),
            recovery_countries: names(&["Canada", "Australia"]),
            recovery_date: ymd(2020, 12, 31),
            province_country: "Canada".to_string(),
            deaths_top_n: 15,
            milestone_country: "US".to_string(),
            milestones: vec![10_000, 100_000],
            monthly_focus: names(&["US", "Italy", "Brazil"]),
            death_rate_year: 2020,
            death_rate_min_cases: 1000,
            outcome_country: "South Africa".to_string(),
            recovery_ratio_country: "US".to_string(),
            recovery_window: (ymd(2020, 3, 1), ymd(2021, 5, 31)),
            summary_min_cases: 10_000,
            major_countries: names(&["US", "India", "Brazil", "Russia", "France"]),
            regions: vec![
                ("North America".to_string(), names(&["US", "Canada", "Mexico"])),
                (
                    "Europe".to_string(),
                    names(&["France", "Germany", "Italy", "Spain", "United Kingdom"]),
                ),
                (
                    "Asia".to_string(),
                    names(&["China", "India", "Japan", "Korea, South", "Iran"]),
                ),
                (
                    "South America".to_string(),
                    names(&["Brazil", "Argentina", "Chile", "Peru", "Colombia"]),
                ),
            ],
        }
    }
}

/// Run one section and serialize its result.
pub fn run_section(
    section: Section,
    data: &Datasets,
    options: &ReportOptions,
) -> Result<serde_json::Value> {
    let value = match section {
        Section::Overview => serde_json::to_value(exploration::overview(data)?)?,
        Section::Exploration => serde_json::to_value(exploration::exploration(data, options)?)?,
        Section::Missing => serde_json::to_value(quality::missing_data(data)?)?,
        Section::Cleaning => serde_json::to_value(quality::cleaning(data)?)?,
        Section::Independent => serde_json::to_value(analysis::independent(data, options)?)?,
        Section::Transformation => serde_json::to_value(analysis::transformation(data, options)?)?,
        Section::Merging => serde_json::to_value(merging::merging(data, options)?)?,
        Section::Combined => serde_json::to_value(merging::combined(data, options)?)?,
        Section::Summary => serde_json::to_value(summary::summary(data, options)?)?,
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_names_round_trip() {
        for section in Section::all() {
            assert_eq!(section.name().parse::<Section>().unwrap(), section);
        }
        assert_eq!(" Summary ".parse::<Section>().unwrap(), Section::Summary);
        assert!("charts".parse::<Section>().is_err());
    }

    #[test]
    fn test_default_options() {
        let options = ReportOptions::default();
        assert_eq!(options.recovery_date, NaiveDate::from_ymd_opt(2020, 12, 31).unwrap());
        assert_eq!(options.regions.len(), 4);
        assert_eq!(options.regions[2].1[3], "Korea, South");
    }
}

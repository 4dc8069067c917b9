mod common;

use covid_insights::aggregate::{aggregate, percent, with_percent, AggOp, GroupKey};
use covid_insights::data_utils::{f64_values, i64_values, string_values};
use covid_insights::loader::{Datasets, PipelineOptions};
use covid_insights::missing::{CountryPolicy, MissingPolicy, ALL_PROVINCES, UNKNOWN};
use covid_insights::reports::{
    analysis, exploration, merging, quality, run_section, summary, ReportOptions, Section,
};
use covid_insights::PipelineError;
use polars::prelude::*;

#[test]
fn test_testland_death_rate() {
    let data = Datasets::from_frames(
        common::testland(5, 8),
        common::testland(2, 3),
        common::testland(1, 4),
        PipelineOptions::default(),
    )
    .unwrap();

    let joined = &data.joined.table;
    assert_eq!(joined.height(), 2);
    assert_eq!(data.joined.diagnostics.total_dropped(), 0);

    let confirmed = aggregate(joined, &[GroupKey::Day], "Confirmed", AggOp::Sum).unwrap();
    let deaths = aggregate(joined, &[GroupKey::Day], "Deaths", AggOp::Sum).unwrap();
    let c = i64_values(&confirmed, "Confirmed").unwrap();
    let d = i64_values(&deaths, "Deaths").unwrap();
    assert_eq!(percent(d[1].unwrap() as f64, c[1].unwrap() as f64), 37.5);

    let rated = with_percent(joined, "Deaths", "Confirmed", "death_rate").unwrap();
    assert_eq!(f64_values(&rated, "death_rate").unwrap()[1], Some(37.5));
}

#[test]
fn test_missing_province_gets_sentinel_and_joins() {
    let data = Datasets::from_frames(
        common::testland(5, 8),
        common::testland(2, 3),
        common::testland(1, 4),
        PipelineOptions {
            missing: MissingPolicy::new(UNKNOWN),
            ..PipelineOptions::default()
        },
    )
    .unwrap();

    let provinces = string_values(&data.joined.table, "Province/State").unwrap();
    assert!(provinces.iter().all(|p| p.as_deref() == Some(UNKNOWN)));
}

#[test]
fn test_rejected_missing_country_fails_load() {
    let confirmed = df![
        "Province/State" => [Some("X")],
        "Country/Region" => [None::<&str>],
        "Lat" => [0.0],
        "Long" => [0.0],
        "1/1/20" => [1i64]
    ]
    .unwrap();
    let options = PipelineOptions {
        missing: MissingPolicy::all_provinces().with_missing_country(CountryPolicy::Reject),
        ..PipelineOptions::default()
    };

    let result = Datasets::from_frames(confirmed, common::deaths(), common::recovered(), options);
    assert!(matches!(result, Err(PipelineError::MissingCountry { rows: 1 })));
}

#[test]
fn test_extra_column_is_a_date_parse_error() {
    let mut confirmed = common::confirmed();
    confirmed
        .with_column(Series::new("Combined_Key", ["a", "b", "c", "d"]))
        .unwrap();

    let result = Datasets::from_frames(
        confirmed,
        common::deaths(),
        common::recovered(),
        PipelineOptions::default(),
    );
    match result {
        Err(PipelineError::DateParse { table, headers }) => {
            assert_eq!(table, "Confirmed");
            assert_eq!(headers, vec!["Combined_Key".to_string()]);
        }
        other => panic!("expected DateParse, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_overview_and_exploration() {
    let data = common::datasets();
    let options = ReportOptions::default();

    let overview = exploration::overview(&data).unwrap();
    assert_eq!(overview.tables.len(), 3);
    assert_eq!(overview.tables[0].rows, 4);
    assert_eq!(overview.tables[0].columns, 8);
    assert_eq!(overview.tables[0].countries, 3);

    let explored = exploration::exploration(&data, &options).unwrap();
    let profile = &explored.profiles[0];
    assert_eq!(profile.provinces, 2);
    assert_eq!(profile.date_columns, 4);
    assert_eq!(profile.first_date.as_deref(), Some("2020-12-30"));
    assert_eq!(profile.last_date.as_deref(), Some("2021-01-02"));
    assert!(profile.round_trip_ok);

    assert_eq!(explored.latest_date, "2021-01-02");
    let top: Vec<&str> = explored.top_countries.iter().map(|c| c.country.as_str()).collect();
    assert_eq!(top, vec!["US", "Italy", "Canada"]);
    assert_eq!(explored.top_countries[0].confirmed, 3000);
    assert_eq!(explored.top_countries[0].share, 63.03);

    // China is not in the fixture
    assert_eq!(explored.focus.total_cases, 0);
    assert_eq!(explored.focus.first_case_date, None);
    assert_eq!(explored.focus.growth_30_days, None);

    let us = exploration::focus_timeline(&data, "US").unwrap();
    assert_eq!(us.total_cases, 3000);
    assert_eq!(us.first_case_date.as_deref(), Some("2020-12-30"));
    assert_eq!(us.peak_date.as_deref(), Some("2021-01-02"));
}

#[test]
fn test_missing_and_cleaning_reports() {
    let data = common::datasets();

    let missing = quality::missing_data(&data).unwrap();
    assert_eq!(missing.policy.province_sentinel, UNKNOWN);
    let confirmed = &missing.tables[0];
    assert_eq!(confirmed.before.province_null, 2);
    assert_eq!(confirmed.after.province_to_replace(), 0);
    assert_eq!(confirmed.after.total_missing, 0);

    let cleaning = quality::cleaning(&data).unwrap();
    assert_eq!(cleaning.sentinel, ALL_PROVINCES);
    assert_eq!(cleaning.tables[1].null_before, 2);
    assert_eq!(cleaning.tables[1].missing_after, 0);
    assert_eq!(cleaning.tables[1].sentinel_rows, 2);
}

#[test]
fn test_independent_report() {
    let data = common::datasets();
    let report = analysis::independent(&data, &ReportOptions::default()).unwrap();

    // Only Italy of Germany/France/Italy is present; daily [0, 100, 100, 400]
    assert_eq!(report.peak_daily_cases.len(), 1);
    assert_eq!(report.peak_daily_cases[0].country, "Italy");
    assert_eq!(report.peak_daily_cases[0].peak_daily, 400);
    assert_eq!(report.peak_daily_cases[0].peak_date, "2021-01-02");

    let canada = &report.recovery[0];
    assert!(canada.date_available);
    assert_eq!(canada.confirmed, 210);
    assert_eq!(canada.recovered, 105);
    assert_eq!(canada.recovery_rate, 50.0);
    let australia = &report.recovery[1];
    assert_eq!(australia.confirmed, 0);
    assert_eq!(australia.recovery_rate, 0.0);

    let provinces: Vec<(&str, f64)> = report
        .province_death_rates
        .iter()
        .map(|p| (p.province.as_str(), p.death_rate))
        .collect();
    assert_eq!(provinces, vec![("Quebec", 10.0), ("Ontario", 5.0)]);
}

#[test]
fn test_recovery_date_outside_headers() {
    let data = common::datasets();
    let options = ReportOptions {
        recovery_date: chrono::NaiveDate::from_ymd_opt(2021, 3, 1).unwrap(),
        ..ReportOptions::default()
    };
    let report = analysis::independent(&data, &options).unwrap();
    assert!(!report.recovery[0].date_available);
    assert_eq!(report.recovery[0].recovery_rate, 0.0);
}

#[test]
fn test_transformation_report() {
    let data = common::datasets();
    let report = analysis::transformation(&data, &ReportOptions::default()).unwrap();

    assert_eq!(report.long_rows, 16);
    assert_eq!(report.long_columns, 6);
    assert_eq!(report.sample.len(), 8);
    assert_eq!(report.sample[0].country.as_deref(), Some("US"));
    assert_eq!(report.sample[0].province.as_deref(), Some(ALL_PROVINCES));
    assert_eq!(report.sample[0].deaths, Some(10));

    let top: Vec<(&str, i64)> = report
        .top_deaths
        .iter()
        .map(|c| (c.country.as_str(), c.value))
        .collect();
    assert_eq!(top, vec![("Italy", 70), ("US", 50), ("Canada", 23)]);

    // Averages of the daily increments: US 10, Italy 7.5, Canada 4.25
    let averages: Vec<(&str, f64)> = report
        .top_average_daily_deaths
        .iter()
        .map(|c| (c.country.as_str(), c.rate))
        .collect();
    assert_eq!(averages, vec![("US", 10.0), ("Italy", 7.5), ("Canada", 4.25)]);

    assert_eq!(report.milestones[0].threshold, 1);
    assert_eq!(report.milestones[0].date.as_deref(), Some("2020-12-30"));
    assert_eq!(report.milestones[1].date, None);
}

#[test]
fn test_merging_report() {
    let data = common::datasets();
    let report = merging::merging(&data, &ReportOptions::default()).unwrap();

    assert_eq!(report.rows, 16);
    assert_eq!(report.columns, 8);
    assert!(!report.diagnostics.has_duplicates());
    assert_eq!(report.monthly_rows, 6);
    assert_eq!(report.latest_month.as_deref(), Some("2021-01"));

    let top: Vec<(&str, i64)> = report
        .top_latest_month
        .iter()
        .map(|m| (m.country.as_str(), m.confirmed))
        .collect();
    assert_eq!(top, vec![("US", 3000), ("Italy", 1400), ("Canada", 360)]);

    // US and Italy are focus countries, two months each
    assert_eq!(report.focus.len(), 4);
    assert_eq!(report.focus[0].country, "Italy");
    assert_eq!(report.focus[0].month, "2020-12");
}

#[test]
fn test_combined_report() {
    let data = common::datasets();
    let report = merging::combined(&data, &ReportOptions::default()).unwrap();

    // Only the US reaches 1000 cases in 2020
    assert_eq!(report.highest_death_rates.len(), 1);
    assert_eq!(report.highest_death_rates[0].country, "US");
    assert_eq!(report.highest_death_rates[0].average_death_rate, 1.33);
    assert_eq!(report.highest_death_rates[0].max_confirmed, 1500);

    assert_eq!(report.outcome.country, "South Africa");
    assert_eq!(report.outcome.date, None);
    assert_eq!(report.outcome.recovery_to_death, 0.0);

    let trend = &report.recovery_trend;
    assert_eq!(trend.months.len(), 2);
    assert_eq!(trend.months[0].recovery_ratio, 20.0);
    assert_eq!(trend.best_month.as_ref().map(|m| m.month.as_str()), Some("2020-12"));
    assert_eq!(trend.trend, "declining");

    let italy = merging::outcome_snapshot(&data.joined.table, "Italy").unwrap();
    assert_eq!(italy.date.as_deref(), Some("2021-01-02"));
    assert_eq!(italy.recovery_rate, 50.0);
    assert_eq!(italy.death_rate, 5.0);
    assert_eq!(italy.recovery_to_death, 10.0);
    assert_eq!(italy.assessment, "concerning");
}

#[test]
fn test_summary_report() {
    let data = common::datasets();
    let report = summary::summary(&data, &ReportOptions::default()).unwrap();

    assert_eq!(report.global.confirmed, 4760);
    assert_eq!(report.global.deaths, 143);
    assert_eq!(report.global.death_rate, 3.0);
    assert_eq!(report.top_countries[0].country, "US");
    assert_eq!(report.countries, 3);
    assert_eq!(report.days, 4);
    assert_eq!(report.countries_over_100k, 0);

    // Nobody reaches 10 000 cases
    assert!(report.highest_death_rates.is_empty());

    assert_eq!(report.timeline.len(), 1);
    assert_eq!(report.timeline[0].confirmed, 1950);

    let regions: Vec<(&str, i64)> = report
        .regions
        .iter()
        .map(|r| (r.region.as_str(), r.confirmed))
        .collect();
    assert_eq!(regions, vec![("North America", 3360), ("Europe", 1400)]);
}

#[test]
fn test_every_section_serializes() {
    let data = common::datasets();
    let options = ReportOptions::default();
    for section in Section::all() {
        let value = run_section(section, &data, &options).unwrap();
        assert!(value.is_object(), "{} did not produce an object", section);
    }
}

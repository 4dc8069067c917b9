#![allow(dead_code)]

use covid_insights::loader::{Datasets, PipelineOptions};
use polars::prelude::*;

pub const DATES: [&str; 4] = ["12/30/20", "12/31/20", "1/1/21", "1/2/21"];

/// Four locations: US and Italy without a province, two Canadian provinces.
fn wide(values: [[i64; 4]; 4]) -> DataFrame {
    let mut columns = vec![
        Series::new("Province/State", [None, Some("Ontario"), Some("Quebec"), None]),
        Series::new("Country/Region", ["US", "Canada", "Canada", "Italy"]),
        Series::new("Lat", [40.0, 51.2, 52.9, 41.9]),
        Series::new("Long", [-100.0, -85.3, -73.5, 12.6]),
    ];
    for (i, date) in DATES.iter().enumerate() {
        let column: Vec<i64> = values.iter().map(|row| row[i]).collect();
        columns.push(Series::new(date, column));
    }
    DataFrame::new(columns).unwrap()
}

pub fn confirmed() -> DataFrame {
    wide([
        [1000, 1500, 2500, 3000],
        [100, 150, 200, 260],
        [50, 60, 90, 100],
        [800, 900, 1000, 1400],
    ])
}

pub fn deaths() -> DataFrame {
    wide([
        [10, 20, 40, 50],
        [1, 3, 4, 13],
        [5, 6, 9, 10],
        [40, 45, 50, 70],
    ])
}

pub fn recovered() -> DataFrame {
    wide([
        [100, 300, 500, 600],
        [50, 75, 100, 130],
        [10, 30, 45, 50],
        [400, 450, 500, 700],
    ])
}

pub fn datasets() -> Datasets {
    Datasets::from_frames(confirmed(), deaths(), recovered(), PipelineOptions::default()).unwrap()
}

/// One Testland row with two dates.
pub fn testland(first: i64, second: i64) -> DataFrame {
    df![
        "Country/Region" => ["Testland"],
        "Lat" => [1.0],
        "Long" => [2.0],
        "1/1/20" => [first],
        "1/2/20" => [second]
    ]
    .unwrap()
}

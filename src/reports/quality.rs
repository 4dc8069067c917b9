//! Missing-data census and province cleaning.

use crate::columns::PROVINCE;
use crate::data_utils::string_values;
use crate::error::Result;
use crate::loader::{Datasets, Metric};
use crate::missing::{apply_missing_policy, MissingPolicy, MissingReport};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingComparison {
    pub metric: Metric,
    pub before: MissingReport,
    pub after: MissingReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingData {
    pub policy: MissingPolicy,
    pub tables: Vec<MissingComparison>,
}

/// Missing values before and after the "Unknown" + forward-fill policy.
pub fn missing_data(data: &Datasets) -> Result<MissingData> {
    let policy = MissingPolicy::unknown();
    let mut tables = Vec::new();
    for metric in Metric::all() {
        let raw = &data.table(metric).raw;
        let filled = apply_missing_policy(raw.clone(), &policy)?;
        tables.push(MissingComparison {
            metric,
            before: MissingReport::from_frame(raw)?,
            after: MissingReport::from_frame(&filled)?,
        });
    }
    Ok(MissingData { policy, tables })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvinceCleaning {
    pub metric: Metric,
    pub null_before: usize,
    pub blank_before: usize,
    pub missing_after: usize,
    /// Rows carrying the sentinel after cleaning.
    pub sentinel_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cleaning {
    pub sentinel: String,
    pub tables: Vec<ProvinceCleaning>,
}

/// Province gaps before and after the loaded tables' fill policy.
pub fn cleaning(data: &Datasets) -> Result<Cleaning> {
    let sentinel = data.options.missing.province_sentinel.clone();
    let mut tables = Vec::new();
    for metric in Metric::all() {
        let table = data.table(metric);
        let before = MissingReport::from_frame(&table.raw)?;
        let after = MissingReport::from_frame(&table.wide)?;
        let sentinel_rows = string_values(&table.wide, PROVINCE)?
            .iter()
            .filter(|p| p.as_deref() == Some(sentinel.as_str()))
            .count();
        tables.push(ProvinceCleaning {
            metric,
            null_before: before.province_null,
            blank_before: before.province_blank,
            missing_after: after.province_to_replace(),
            sentinel_rows,
        });
    }
    Ok(Cleaning { sentinel, tables })
}

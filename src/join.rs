//! Three-way inner join of the long tables.
//!
//! The five key columns (province, country, lat, long, date) must match
//! exactly. Missing key values are treated as equal to each other so a
//! location whose country was kept missing still joins across the tables.

use crate::columns::{COUNTRY, DATE, KEY_COLUMNS, LAT, LONG, PROVINCE};
use crate::data_utils::{date_values, f64_values, string_values};
use crate::error::{PipelineError, Result};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

type JoinKey = (
    Option<String>,
    Option<String>,
    Option<u64>,
    Option<u64>,
    Option<NaiveDate>,
);

/// Per-input join statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideDiagnostics {
    pub name: String,
    pub input_rows: usize,
    /// Distinct keys that occur more than once in this input.
    pub duplicate_keys: usize,
    /// Rows whose key is absent from at least one other input.
    pub dropped_rows: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinDiagnostics {
    pub confirmed: SideDiagnostics,
    pub deaths: SideDiagnostics,
    pub recovered: SideDiagnostics,
    pub joined_rows: usize,
}

impl JoinDiagnostics {
    pub fn sides(&self) -> [&SideDiagnostics; 3] {
        [&self.confirmed, &self.deaths, &self.recovered]
    }

    pub fn has_duplicates(&self) -> bool {
        self.sides().iter().any(|s| s.duplicate_keys > 0)
    }

    pub fn total_dropped(&self) -> usize {
        self.sides().iter().map(|s| s.dropped_rows).sum()
    }
}

#[derive(Debug, Clone)]
pub struct JoinedTable {
    pub table: DataFrame,
    pub diagnostics: JoinDiagnostics,
}

fn row_keys(df: &DataFrame) -> Result<Vec<JoinKey>> {
    let provinces = string_values(df, PROVINCE)?;
    let countries = string_values(df, COUNTRY)?;
    let lats = f64_values(df, LAT)?;
    let longs = f64_values(df, LONG)?;
    let dates = date_values(df, DATE)?;

    Ok((0..df.height())
        .map(|i| {
            (
                provinces[i].clone(),
                countries[i].clone(),
                lats[i].map(f64::to_bits),
                longs[i].map(f64::to_bits),
                dates[i],
            )
        })
        .collect())
}

fn key_counts(keys: &[JoinKey]) -> HashMap<&JoinKey, usize> {
    let mut counts = HashMap::new();
    for key in keys {
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

fn side_diagnostics(
    name: &str,
    keys: &[JoinKey],
    own: &HashMap<&JoinKey, usize>,
    others: [&HashMap<&JoinKey, usize>; 2],
) -> SideDiagnostics {
    SideDiagnostics {
        name: name.to_string(),
        input_rows: keys.len(),
        duplicate_keys: own.values().filter(|c| **c > 1).count(),
        dropped_rows: keys
            .iter()
            .filter(|k| others.iter().any(|o| !o.contains_key(k)))
            .count(),
    }
}

/// Key columns present, value columns distinct across the three inputs.
fn validate_inputs(inputs: [&DataFrame; 3]) -> Result<()> {
    let mut value_columns: Vec<String> = Vec::new();
    for df in inputs {
        let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
        for key in KEY_COLUMNS {
            if !names.iter().any(|n| n == key) {
                return Err(PipelineError::Schema {
                    field: key.to_string(),
                    seen: names,
                });
            }
        }
        for name in names.iter().filter(|n| !KEY_COLUMNS.contains(&n.as_str())) {
            if value_columns.contains(name) {
                return Err(PipelineError::Schema {
                    field: format!("{} (value column appears in more than one input)", name),
                    seen: names.clone(),
                });
            }
            value_columns.push(name.clone());
        }
    }
    Ok(())
}

/// Inner-join confirmed ⋈ deaths ⋈ recovered on the five key columns.
///
/// Duplicate keys produce the cross product of the matching rows. An empty
/// result is valid; the diagnostics explain where the rows went.
pub fn inner_join_three(
    confirmed: &DataFrame,
    deaths: &DataFrame,
    recovered: &DataFrame,
) -> Result<JoinedTable> {
    validate_inputs([confirmed, deaths, recovered])?;

    let confirmed_keys = row_keys(confirmed)?;
    let deaths_keys = row_keys(deaths)?;
    let recovered_keys = row_keys(recovered)?;
    let confirmed_counts = key_counts(&confirmed_keys);
    let deaths_counts = key_counts(&deaths_keys);
    let recovered_counts = key_counts(&recovered_keys);

    let keys: Vec<Expr> = KEY_COLUMNS.iter().map(|c| col(c)).collect();
    let args = JoinArgs {
        join_nulls: true,
        ..JoinArgs::new(JoinType::Inner)
    };

    let table = confirmed
        .clone()
        .lazy()
        .join(deaths.clone().lazy(), &keys, &keys, args.clone())
        .join(recovered.clone().lazy(), &keys, &keys, args)
        .sort(
            [COUNTRY, PROVINCE, LAT, LONG, DATE],
            SortMultipleOptions::default()
                .with_nulls_last(true)
                .with_maintain_order(true),
        )
        .collect()?;

    let diagnostics = JoinDiagnostics {
        confirmed: side_diagnostics(
            "confirmed",
            &confirmed_keys,
            &confirmed_counts,
            [&deaths_counts, &recovered_counts],
        ),
        deaths: side_diagnostics(
            "deaths",
            &deaths_keys,
            &deaths_counts,
            [&confirmed_counts, &recovered_counts],
        ),
        recovered: side_diagnostics(
            "recovered",
            &recovered_keys,
            &recovered_counts,
            [&confirmed_counts, &deaths_counts],
        ),
        joined_rows: table.height(),
    };

    for side in diagnostics.sides() {
        if side.duplicate_keys > 0 {
            warn!(
                "{} has {} duplicated join key(s); the join multiplies those rows",
                side.name, side.duplicate_keys
            );
        }
        if side.dropped_rows > 0 {
            warn!(
                "{} loses {} of {} row(s) in the inner join",
                side.name, side.dropped_rows, side.input_rows
            );
        }
    }
    info!(
        "Joined {} + {} + {} rows into {} records",
        diagnostics.confirmed.input_rows,
        diagnostics.deaths.input_rows,
        diagnostics.recovered.input_rows,
        diagnostics.joined_rows
    );

    Ok(JoinedTable { table, diagnostics })
}

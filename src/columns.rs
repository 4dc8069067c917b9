//! Column Normalization
//!
//! Maps arbitrary source headers onto the four canonical identity fields.
//! Any header that matches none of the rules is left unmapped and is treated
//! as a date column downstream.

use crate::error::{PipelineError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const PROVINCE: &str = "Province/State";
pub const COUNTRY: &str = "Country/Region";
pub const LAT: &str = "Lat";
pub const LONG: &str = "Long";
pub const DATE: &str = "Date";

/// Identity columns in canonical order.
pub const IDENTITY_COLUMNS: [&str; 4] = [PROVINCE, COUNTRY, LAT, LONG];

/// Join key of the long form: identity columns plus the observation date.
pub const KEY_COLUMNS: [&str; 5] = [PROVINCE, COUNTRY, LAT, LONG, DATE];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CanonicalField {
    Province,
    Country,
    Latitude,
    Longitude,
}

impl CanonicalField {
    pub fn column_name(&self) -> &'static str {
        match self {
            CanonicalField::Province => PROVINCE,
            CanonicalField::Country => COUNTRY,
            CanonicalField::Latitude => LAT,
            CanonicalField::Longitude => LONG,
        }
    }
}

/// Classify one raw header.
///
/// The rules are evaluated in a fixed order and the first match wins, so
/// `Country_Region` maps to the country even though it also contains "region"
/// and a header like `State_Country` maps to the province.
pub fn classify_column(raw: &str) -> Option<CanonicalField> {
    let key = raw.to_lowercase().replace(['_', ' '], "");

    if key.contains("province") || key.contains("state") {
        Some(CanonicalField::Province)
    } else if key.contains("country") || key.contains("region") {
        Some(CanonicalField::Country)
    } else if key == "lat" || key == "latitude" {
        Some(CanonicalField::Latitude)
    } else if key == "long" || key == "longitude" {
        Some(CanonicalField::Longitude)
    } else {
        None
    }
}

/// Raw header → canonical field, in header order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnMap {
    entries: Vec<(String, Option<CanonicalField>)>,
}

impl ColumnMap {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[(String, Option<CanonicalField>)] {
        &self.entries
    }

    pub fn get(&self, raw: &str) -> Option<CanonicalField> {
        self.entries
            .iter()
            .find(|(name, _)| name == raw)
            .and_then(|(_, field)| *field)
    }

    /// Raw headers mapped to `field`, in header order.
    pub fn sources_of(&self, field: CanonicalField) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, f)| *f == Some(field))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Headers left unmapped. These are treated as date columns.
    pub fn unmapped(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, f)| f.is_none())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

pub fn normalize_columns<S: AsRef<str>>(columns: &[S]) -> ColumnMap {
    let entries = columns
        .iter()
        .map(|c| (c.as_ref().to_string(), classify_column(c.as_ref())))
        .collect();
    ColumnMap { entries }
}

/// Rename mapped columns to their canonical names and validate the identity schema.
///
/// Country, latitude and longitude are required. The province column is
/// optional: when absent, an all-missing column is inserted so the fill policy
/// can apply its sentinel.
pub fn standardize_columns(df: DataFrame) -> Result<(DataFrame, ColumnMap)> {
    let raw_names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
    let map = normalize_columns(&raw_names);

    for field in [
        CanonicalField::Province,
        CanonicalField::Country,
        CanonicalField::Latitude,
        CanonicalField::Longitude,
    ] {
        let sources = map.sources_of(field);
        if sources.len() > 1 {
            return Err(PipelineError::Schema {
                field: format!("{} (ambiguous: {:?})", field.column_name(), sources),
                seen: raw_names.clone(),
            });
        }
    }

    let mut result = df;
    for (raw, field) in map.entries() {
        if let Some(field) = field {
            if raw != field.column_name() {
                result.rename(raw, field.column_name())?;
            }
        }
    }

    for required in [CanonicalField::Country, CanonicalField::Latitude, CanonicalField::Longitude] {
        if map.sources_of(required).is_empty() {
            return Err(PipelineError::Schema {
                field: required.column_name().to_string(),
                seen: raw_names,
            });
        }
    }

    if map.sources_of(CanonicalField::Province).is_empty() {
        debug!("No province column among {:?}; inserting an empty one", raw_names);
        let empty = Series::full_null(PROVINCE, result.height(), &DataType::String);
        result.with_column(empty)?;
    }

    Ok((result, map))
}

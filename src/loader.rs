//! Loading the three wide CSV files and preparing them for the reports.
//!
//! `Datasets` is the fully prepared snapshot: standardized raw tables, filled
//! wide tables, long tables and the joined table. `DatasetCache` builds it at
//! most once per process and hands out shared references.

use crate::columns::{standardize_columns, ColumnMap};
use crate::error::{PipelineError, Result};
use crate::join::{inner_join_three, JoinDiagnostics, JoinedTable};
use crate::missing::{apply_missing_policy, MissingPolicy};
use crate::reshape::{
    date_columns, parse_date_headers, reshape_to_long, DateFormat, DateHeaders,
};
use once_cell::sync::OnceCell;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Confirmed,
    Deaths,
    Recovered,
}

impl Metric {
    pub fn all() -> [Metric; 3] {
        [Metric::Confirmed, Metric::Deaths, Metric::Recovered]
    }

    /// Name of the value column in long and joined tables.
    pub fn value_name(&self) -> &'static str {
        match self {
            Metric::Confirmed => "Confirmed",
            Metric::Deaths => "Deaths",
            Metric::Recovered => "Recovered",
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Metric::Confirmed => "covid_19_confirmed_v1.csv",
            Metric::Deaths => "covid_19_deaths_v1.csv",
            Metric::Recovered => "covid_19_recovered_v1.csv",
        }
    }
}

/// Parameters threaded through every preparation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOptions {
    pub missing: MissingPolicy,
    pub date_format: DateFormat,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            missing: MissingPolicy::all_provinces(),
            date_format: DateFormat::default(),
        }
    }
}

/// Read one wide CSV file.
pub fn read_wide_csv(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        return Err(PipelineError::Load {
            path: path.display().to_string(),
            message: "file not found".to_string(),
        });
    }

    let df = LazyCsvReader::new(path)
        .with_has_header(true)
        .with_infer_schema_length(Some(1000))
        .finish()
        .and_then(|lf| lf.collect())
        .map_err(|e| PipelineError::Load {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    debug!("Read {} with shape {:?}", path.display(), df.shape());
    Ok(df)
}

/// One metric after normalization, filling and reshaping.
#[derive(Debug, Clone)]
pub struct PreparedTable {
    pub metric: Metric,
    /// Canonical column names, values untouched.
    pub raw: DataFrame,
    /// `raw` with the missing-value policy applied.
    pub wide: DataFrame,
    pub long: DataFrame,
    pub column_map: ColumnMap,
    pub date_headers: DateHeaders,
}

impl PreparedTable {
    pub fn prepare(metric: Metric, df: DataFrame, options: &PipelineOptions) -> Result<Self> {
        let (raw, column_map) = standardize_columns(df)?;
        let date_headers = parse_date_headers(&date_columns(&raw), &options.date_format);
        if !date_headers.is_chronological() {
            warn!("{} date headers are not in chronological order", metric.value_name());
        }

        let wide = apply_missing_policy(raw.clone(), &options.missing)?;
        let long = reshape_to_long(&wide, metric.value_name(), &options.date_format)?;

        Ok(Self {
            metric,
            raw,
            wide,
            long,
            column_map,
            date_headers,
        })
    }
}

/// The prepared snapshot every report reads from.
#[derive(Debug, Clone)]
pub struct Datasets {
    pub confirmed: PreparedTable,
    pub deaths: PreparedTable,
    pub recovered: PreparedTable,
    pub joined: JoinedTable,
    pub options: PipelineOptions,
}

impl Datasets {
    pub fn from_frames(
        confirmed: DataFrame,
        deaths: DataFrame,
        recovered: DataFrame,
        options: PipelineOptions,
    ) -> Result<Self> {
        let confirmed = PreparedTable::prepare(Metric::Confirmed, confirmed, &options)?;
        let deaths = PreparedTable::prepare(Metric::Deaths, deaths, &options)?;
        let recovered = PreparedTable::prepare(Metric::Recovered, recovered, &options)?;
        let joined = inner_join_three(&confirmed.long, &deaths.long, &recovered.long)?;

        Ok(Self {
            confirmed,
            deaths,
            recovered,
            joined,
            options,
        })
    }

    pub fn load(data_dir: &Path, options: PipelineOptions) -> Result<Self> {
        info!("Loading datasets from {}", data_dir.display());
        let confirmed = read_wide_csv(&data_dir.join(Metric::Confirmed.file_name()))?;
        let deaths = read_wide_csv(&data_dir.join(Metric::Deaths.file_name()))?;
        let recovered = read_wide_csv(&data_dir.join(Metric::Recovered.file_name()))?;
        Self::from_frames(confirmed, deaths, recovered, options)
    }

    pub fn table(&self, metric: Metric) -> &PreparedTable {
        match metric {
            Metric::Confirmed => &self.confirmed,
            Metric::Deaths => &self.deaths,
            Metric::Recovered => &self.recovered,
        }
    }

    pub fn diagnostics(&self) -> PipelineDiagnostics {
        let tables = Metric::all()
            .into_iter()
            .map(|metric| {
                let table = self.table(metric);
                TableDiagnostics {
                    metric,
                    column_map: table.column_map.clone(),
                    date_columns: table.date_headers.parsed.len(),
                    chronological: table.date_headers.is_chronological(),
                    wide_shape: table.wide.shape(),
                    long_shape: table.long.shape(),
                }
            })
            .collect();
        PipelineDiagnostics {
            tables,
            join: self.joined.diagnostics.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDiagnostics {
    pub metric: Metric,
    pub column_map: ColumnMap,
    pub date_columns: usize,
    pub chronological: bool,
    pub wide_shape: (usize, usize),
    pub long_shape: (usize, usize),
}

/// What `inspect` and `/api/diagnostics` report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    pub tables: Vec<TableDiagnostics>,
    pub join: JoinDiagnostics,
}

/// Loads the datasets on first use; later calls share the same snapshot.
pub struct DatasetCache {
    data_dir: PathBuf,
    options: PipelineOptions,
    cell: OnceCell<Arc<Datasets>>,
    loads: AtomicUsize,
}

impl DatasetCache {
    pub fn new(data_dir: impl Into<PathBuf>, options: PipelineOptions) -> Self {
        Self {
            data_dir: data_dir.into(),
            options,
            cell: OnceCell::new(),
            loads: AtomicUsize::new(0),
        }
    }

    /// Return the snapshot, loading it if this is the first successful call.
    /// A failed load is not cached; the next call tries again.
    pub fn get(&self) -> Result<Arc<Datasets>> {
        let datasets = self.cell.get_or_try_init(|| {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Datasets::load(&self.data_dir, self.options.clone()).map(Arc::new)
        })?;
        Ok(Arc::clone(datasets))
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Number of load attempts made so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_load_error() {
        let err = read_wide_csv(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::Load { .. }));
    }

    #[test]
    fn test_failed_load_is_retried() {
        let cache = DatasetCache::new("/definitely/not/here", PipelineOptions::default());
        assert!(cache.get().is_err());
        assert!(cache.get().is_err());
        assert!(!cache.is_loaded());
        assert_eq!(cache.load_count(), 2);
    }

    #[test]
    fn test_metric_names() {
        assert_eq!(Metric::Deaths.value_name(), "Deaths");
        assert_eq!(Metric::Recovered.file_name(), "covid_19_recovered_v1.csv");
    }
}

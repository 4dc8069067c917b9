pub mod aggregate;
pub mod columns;
pub mod config;
pub mod data_assistant;
pub mod data_utils;
pub mod error;
pub mod join;
pub mod llm;
pub mod loader;
pub mod logging;
pub mod metrics;
pub mod missing;
pub mod reports;
pub mod reshape;

pub use aggregate::{aggregate, daily_increments, percent, ratio, top_n, AggOp, GroupKey};
pub use columns::{normalize_columns, standardize_columns, CanonicalField, ColumnMap};
pub use config::Settings;
pub use data_assistant::{analyze_question, DataAssistant};
pub use error::{PipelineError, Result};
pub use join::{inner_join_three, JoinDiagnostics, JoinedTable};
pub use llm::{CompletionService, LlmClient};
pub use loader::{DatasetCache, Datasets, Metric, PipelineOptions};
pub use missing::{apply_missing_policy, CountryPolicy, DateFill, MissingPolicy};
pub use reports::{run_section, ReportOptions, Section};
pub use reshape::{pivot_to_wide, reshape_to_long, DateFormat};

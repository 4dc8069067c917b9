use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Schema error: required column '{field}' not found after normalization. Columns seen: {seen:?}")]
    Schema {
        field: String,
        seen: Vec<String>,
    },

    #[error("Date parse error in {table}: could not parse headers {headers:?}")]
    DateParse {
        table: String,
        headers: Vec<String>,
    },

    #[error("Aggregation error: {0}")]
    Aggregation(String),

    #[error("Missing country value in {rows} row(s)")]
    MissingCountry {
        rows: usize,
    },

    #[error("Failed to load {path}: {message}")]
    Load {
        path: String,
        message: String,
    },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        PipelineError::Polars(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

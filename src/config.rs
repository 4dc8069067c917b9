//! Runtime settings read from the environment (and `.env`, if present).

use crate::error::{PipelineError, Result};
use crate::loader::PipelineOptions;
use crate::missing::MissingPolicy;
use crate::reshape::DateFormat;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_LLM_ENDPOINT: &str = "https://models.github.ai/inference";
pub const DEFAULT_LLM_MODEL: &str = "xai/grok-3";
pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";
pub const DUMMY_API_KEY: &str = "dummy-api-key";

#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub date_format: String,
    pub province_sentinel: String,
    pub llm_endpoint: String,
    pub llm_model: String,
    pub api_key: String,
    pub addr: SocketAddr,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let addr = env_or("DASHBOARD_ADDR", DEFAULT_ADDR);
        let addr = addr
            .parse()
            .map_err(|e| {
                PipelineError::Config(format!("invalid DASHBOARD_ADDR '{}': {}", addr, e))
            })?;

        Ok(Self {
            data_dir: PathBuf::from(env_or("COVID_DATA_DIR", ".")),
            date_format: env_or("COVID_DATE_FORMAT", "%m/%d/%y"),
            province_sentinel: env_or("COVID_PROVINCE_SENTINEL", crate::missing::ALL_PROVINCES),
            llm_endpoint: env_or("COVID_LLM_ENDPOINT", DEFAULT_LLM_ENDPOINT),
            llm_model: env_or("COVID_LLM_MODEL", DEFAULT_LLM_MODEL),
            api_key: env_or("GITHUB_TOKEN", DUMMY_API_KEY),
            addr,
        })
    }

    /// Pipeline parameters derived from these settings.
    pub fn pipeline_options(&self) -> PipelineOptions {
        let date_format = if self.date_format == "%m/%d/%y" {
            DateFormat::default()
        } else {
            DateFormat::new(self.date_format.clone())
        };
        PipelineOptions {
            missing: MissingPolicy::new(self.province_sentinel.clone()),
            date_format,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key != DUMMY_API_KEY && !self.api_key.is_empty()
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

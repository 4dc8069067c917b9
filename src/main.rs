use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use covid_insights::config::Settings;
use covid_insights::data_assistant::DataAssistant;
use covid_insights::llm::LlmClient;
use covid_insights::loader::Datasets;
use covid_insights::logging;
use covid_insights::reports::{run_section, ReportOptions, Section};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "covid-insights")]
#[command(about = "COVID-19 dashboard pipeline: reports and an AI data assistant")]
struct Args {
    /// Directory holding the three CSV files (or set COVID_DATA_DIR)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Label for missing provinces (or set COVID_PROVINCE_SENTINEL)
    #[arg(long)]
    province_sentinel: Option<String>,

    /// chrono format of the date headers (or set COVID_DATE_FORMAT)
    #[arg(long)]
    date_format: Option<String>,

    /// Number of countries in top-N tables
    #[arg(long)]
    top_n: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print one report section as JSON, or every section with `all`
    Report {
        section: String,
    },
    /// Ask the data assistant a question
    Ask {
        question: Vec<String>,

        /// Model identifier (or set COVID_LLM_MODEL)
        #[arg(long)]
        model: Option<String>,
    },
    /// Show the column normalization, date headers and join diagnostics
    Inspect,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();

    let mut settings = Settings::from_env()?;
    if let Some(dir) = args.data_dir {
        settings.data_dir = dir;
    }
    if let Some(sentinel) = args.province_sentinel {
        settings.province_sentinel = sentinel;
    }
    if let Some(format) = args.date_format {
        settings.date_format = format;
    }

    let mut report_options = ReportOptions::default();
    if let Some(n) = args.top_n {
        report_options.top_n = n;
    }

    info!("Data directory: {}", settings.data_dir.display());
    let data = Datasets::load(&settings.data_dir, settings.pipeline_options())
        .with_context(|| format!("loading datasets from {}", settings.data_dir.display()))?;

    match args.command {
        Command::Report { section } => {
            let sections = if section.eq_ignore_ascii_case("all") {
                Section::all().to_vec()
            } else {
                vec![section.parse::<Section>()?]
            };
            for section in sections {
                let value = run_section(section, &data, &report_options)?;
                println!("=== {} ===", section.title());
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
        }
        Command::Ask { question, model } => {
            if let Some(model) = model {
                settings.llm_model = model;
            }
            let client = LlmClient::new(
                settings.api_key.clone(),
                settings.llm_model.clone(),
                settings.llm_endpoint.clone(),
            );
            let mut assistant = DataAssistant::new(Arc::new(client));
            let response = assistant.ask(&question.join(" "), &data).await?;
            println!("{}", response.answer);
        }
        Command::Inspect => {
            println!("{}", serde_json::to_string_pretty(&data.diagnostics())?);
        }
    }

    Ok(())
}

//! `whisperfire` command-line interface.
//!
//! Reads an analysis request as JSON, runs it through the orchestrator and
//! prints the response envelope. Logs go to stderr so stdout stays JSON.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use whisperfire_core::{fingerprint, AnalysisRequest, NormalizedResult};
use whisperfire_runtime::{Orchestrator, RuntimeConfig};

#[derive(Parser, Debug)]
#[command(name = "whisperfire", version, about = "Evidence-backed message analysis over LLM providers")]
struct Cli {
    /// YAML runtime configuration. Environment overrides still apply.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a request and print the response envelope
    Analyze {
        /// Request JSON file, or `-` for stdin
        #[arg(long, short, default_value = "-")]
        input: PathBuf,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Print the cache key for a request
    Fingerprint {
        #[arg(long, short, default_value = "-")]
        input: PathBuf,
    },

    /// Print provider readiness and breaker state
    Health,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Serialize)]
struct Success<'a> {
    success: bool,
    data: &'a NormalizedResult,
    processing_time: u64,
    model_used: &'a str,
}

#[derive(Serialize)]
struct Failure {
    success: bool,
    error: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // A missing .env is normal
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(cli.log_format);

    match cli.command {
        Command::Analyze { input, pretty } => {
            let config = load_config(cli.config.as_ref())?;
            analyze(config, &input, pretty).await
        }
        Command::Fingerprint { input } => {
            let request = read_request(&input)?;
            println!("{}", fingerprint(&request));
            Ok(ExitCode::SUCCESS)
        }
        Command::Health => {
            let config = load_config(cli.config.as_ref())?;
            let orchestrator = Orchestrator::from_config(config)?;
            let report = orchestrator.health().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn analyze(config: RuntimeConfig, input: &PathBuf, pretty: bool) -> anyhow::Result<ExitCode> {
    let request = match read_request(input) {
        Ok(request) => request,
        Err(e) => return emit_failure(format!("{:#}", e), pretty),
    };

    let orchestrator = Orchestrator::from_config(config)?;
    let started = std::time::Instant::now();

    match orchestrator.run_detailed(&request).await {
        Ok(outcome) => {
            let processing_time = match outcome.source {
                whisperfire_runtime::ResultSource::Cache => 0,
                _ => started.elapsed().as_millis() as u64,
            };
            let envelope = Success {
                success: true,
                data: &outcome.result,
                processing_time,
                model_used: outcome.source.model_used(),
            };
            println!("{}", to_json(&envelope, pretty)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::error!(error = %e, "Analysis failed");
            emit_failure(e.to_string(), pretty)
        }
    }
}

fn emit_failure(error: String, pretty: bool) -> anyhow::Result<ExitCode> {
    let envelope = Failure {
        success: false,
        error,
    };
    println!("{}", to_json(&envelope, pretty)?);
    Ok(ExitCode::FAILURE)
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> serde_json::Result<String> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}

fn read_request(input: &PathBuf) -> anyhow::Result<AnalysisRequest> {
    let text = if input.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read request from {}", input.display()))?
    };

    serde_json::from_str(&text).context("Invalid request")
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<RuntimeConfig> {
    let config = match path {
        Some(path) => {
            let mut config = RuntimeConfig::from_yaml_file(path)?;
            config.apply_env_overrides()?;
            config.validate()?;
            config
        }
        None => RuntimeConfig::from_env()?,
    };
    Ok(config)
}

fn init_logging(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

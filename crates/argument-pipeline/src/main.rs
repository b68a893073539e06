//! Argument pipeline CLI
//!
//! # Usage
//!
//! ```bash
//! # One run; progress events and the outcome as JSON lines on stdout
//! argument-pipeline run --input context.json --config pipeline.toml
//!
//! # Which pool models does the endpoint serve?
//! DIALECTIC_MODEL_URL=http://10.0.0.5:11434/v1 argument-pipeline probe
//! ```
//!
//! Exit code 0 when an argument was produced, 2 when the run was rejected.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use argument_pipeline::{check_endpoint, list_models, Collaborators, EndpointConfig, Orchestrator};
use clap::{Parser, Subcommand};
use debate_coordination::config::PipelineConfig;
use debate_coordination::events::ProgressSink;
use debate_coordination::registry::ModelRegistry;
use debate_coordination::types::PipelineInput;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate one argument for a debate context
    Run {
        /// JSON file holding a `PipelineInput`
        #[arg(long)]
        input: PathBuf,

        /// Pipeline TOML (defaults apply when omitted)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Check the model endpoint and print the pool's health table
    Probe {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match Args::parse().command {
        Command::Run { input, config } => run(&input, config.as_deref()).await,
        Command::Probe { config } => probe(config.as_deref()).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.validate().context("Invalid pipeline configuration")?;
    Ok(config)
}

async fn run(input_path: &Path, config_path: Option<&Path>) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let raw = std::fs::read_to_string(input_path)
        .with_context(|| format!("Failed to read {}", input_path.display()))?;
    let input: PipelineInput =
        serde_json::from_str(&raw).context("Input is not a valid pipeline input")?;

    let endpoints = EndpointConfig::default();
    info!(
        model_url = %endpoints.model_url,
        pool = config.model_pool.len(),
        tier = %input.tier,
        "Argument pipeline starting"
    );
    let orchestrator = Orchestrator::from_config(config, Collaborators::from_endpoints(&endpoints)?);

    let (sink, mut events) = ProgressSink::channel();
    let printer = tokio::spawn(async move {
        while let Some(envelope) = events.recv().await {
            match serde_json::to_string(&envelope) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "Could not encode progress event"),
            }
        }
    });

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            on_interrupt.cancel();
        }
    });

    let outcome = orchestrator.run_with_cancel(input, &sink, cancel).await;
    drop(sink);
    printer.await.context("Event printer panicked")?;

    println!(
        "{}",
        serde_json::to_string(&outcome).context("Failed to encode outcome")?
    );
    Ok(if outcome.is_completed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

async fn probe(config_path: Option<&Path>) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let endpoints = EndpointConfig::default();
    let registry = ModelRegistry::new(config.model_pool.iter().cloned());

    if check_endpoint(&endpoints.model_url).await {
        let served = list_models(&endpoints.model_url).await?;
        info!(url = %endpoints.model_url, served = served.len(), "Endpoint reachable");
        for model in &config.model_pool {
            registry.report_health(model, served.iter().any(|s| s == model));
        }
    } else {
        warn!(url = %endpoints.model_url, "Endpoint unreachable, marking whole pool unhealthy");
        for model in &config.model_pool {
            registry.report_health(model, false);
        }
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&registry.snapshot()).context("Failed to encode health")?
    );
    info!(
        healthy = registry.healthy_count(),
        pool = registry.len(),
        "Probe finished"
    );
    Ok(if registry.healthy_count() > 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

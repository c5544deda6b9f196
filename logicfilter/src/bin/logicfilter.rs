//! `logicfilter` - run the prompt-enhancement pipeline from the command line.
//!
//! ## Commands
//!
//! - `enhance`: run a prompt through the pipeline and print the result
//! - `check`: report service health and missing models
//!
//! Exit codes: 0 on a completed or degraded run, 1 on a failed run or an
//! unusable configuration, 2 when the request is rejected.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use logicfilter::prelude::*;
use logicfilter::{monitor, telemetry};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "logicfilter")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-phase prompt enhancement over a local Ollama service", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Settings file (JSON); defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Inference service base URL
    #[arg(long, global = true, env = "LOGIC_FILTER_OLLAMA_URL")]
    ollama_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enhance a prompt
    Enhance {
        /// The prompt to enhance
        prompt: String,

        /// Pipeline mode: standard, boost, solve or auto
        #[arg(short, long)]
        mode: Option<PipelineMode>,

        /// Per-phase model override, e.g. `vetting=phi4:latest` (repeatable)
        #[arg(long = "model", value_name = "PHASE=MODEL")]
        overrides: Vec<String>,

        /// Print the whole run as JSON instead of the final output
        #[arg(long)]
        output_json: bool,
    },

    /// Check service health and model availability
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    telemetry::init_tracing(cli.json, level);

    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            let code = match e.downcast_ref::<EnhancerError>() {
                Some(err) if err.http_status() == 400 => 2,
                _ => 1,
            };
            ExitCode::from(code)
        }
    }
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    let config = Arc::new(load_config(cli.config.as_deref(), cli.ollama_url)?);
    let client: Arc<dyn ModelClient> =
        Arc::new(OllamaClient::from_config(&config).context("failed to build HTTP client")?);

    match cli.command {
        Commands::Enhance {
            prompt,
            mode,
            overrides,
            output_json,
        } => enhance(config, client, prompt, mode, &overrides, output_json).await,
        Commands::Check => check(&config, client.as_ref()).await,
    }
}

fn load_config(path: Option<&std::path::Path>, ollama_url: Option<String>) -> Result<EnhancerConfig> {
    let config = match path {
        Some(path) => EnhancerConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => EnhancerConfig::default(),
    };
    let mut config = config.with_env_overrides();
    if let Some(url) = ollama_url {
        config = config.with_ollama_url(url);
    }
    config.validate().map_err(EnhancerError::from)?;
    Ok(config)
}

fn parse_override(raw: &str) -> Result<(Phase, String)> {
    let Some((phase, model)) = raw.split_once('=') else {
        bail!("override '{raw}' must look like PHASE=MODEL");
    };
    let Some(phase) = Phase::from_key(phase) else {
        bail!("unknown phase '{phase}'");
    };
    Ok((phase, model.trim().to_string()))
}

async fn enhance(
    config: Arc<EnhancerConfig>,
    client: Arc<dyn ModelClient>,
    prompt: String,
    mode: Option<PipelineMode>,
    overrides: &[String],
    output_json: bool,
) -> Result<ExitCode> {
    let mut request = PipelineRequest::new(prompt);
    if let Some(mode) = mode {
        request = request.with_mode(mode);
    }
    for raw in overrides {
        let (phase, model) = parse_override(raw)?;
        request = request.with_model_override(phase, model);
    }

    let orchestrator = PipelineOrchestrator::new(config, client).map_err(EnhancerError::from)?;

    let cancel = Arc::new(CancellationToken::new());
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel("interrupted");
            }
        });
    }

    let progress = FnProgress::new(|event: &ProgressEvent| {
        if let ProgressEvent::PhaseStarted {
            index,
            total_phases,
            name,
            ..
        } = event
        {
            eprintln!("[{index}/{total_phases}] {name}...");
        }
    });

    let run = orchestrator.run(request, &progress, &cancel).await?;
    info!(run_id = %run.id, status = %run.status, "Run finished");

    if output_json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else if let (RunStatus::Completed, Some(output)) = (run.status, run.final_output()) {
        println!("{output}");
    } else {
        print!("{}", run.report());
    }

    Ok(match run.status {
        RunStatus::Completed | RunStatus::Degraded => ExitCode::SUCCESS,
        RunStatus::Failed | RunStatus::Cancelled => ExitCode::from(1),
    })
}

async fn check(config: &EnhancerConfig, client: &dyn ModelClient) -> Result<ExitCode> {
    let missing = monitor::validate_models(client, &config.models)
        .await
        .with_context(|| format!("cannot reach {}", config.ollama_url))?;

    if missing.is_empty() {
        println!("{}: all configured models available", config.ollama_url);
        return Ok(ExitCode::SUCCESS);
    }

    for (purpose, model) in &missing {
        println!("missing {model} (used for {purpose})");
    }
    Ok(ExitCode::from(1))
}

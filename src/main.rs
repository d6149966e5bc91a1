//! Command-line interface for eventum
//!
//! # Usage Examples
//!
//! ## Replay as fast as possible
//! ```bash
//! eventum generate \
//!   --path generators/web/generator.yml \
//!   --live-mode false \
//!   --param host=web-1 --param port=8080
//! ```
//!
//! ## Live generation with ordering
//! ```bash
//! EVENTUM_SECRET_HTTP_PASSWORD=s3cret eventum generate \
//!   --path generators/web/generator.yml \
//!   --keep-order --max-concurrency 16 \
//!   --batch-size 500 --batch-delay 0.5 \
//!   --on-write-failure retry --write-retries 3
//! ```
//!
//! Secrets referenced as `${secrets.<name>}` are read from environment
//! variables named `EVENTUM_SECRET_<NAME>`. Set `RUST_LOG=info` for lifecycle
//! logs.

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use eventum::{
    BatchParameters, GenerationParameters, Generator, GeneratorParameters, WriteFailurePolicy,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "eventum")]
#[command(about = "Generate synthetic time-stamped event streams")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single generator until it finishes or Ctrl-C is pressed
    Generate(GenerateArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum OnWriteFailure {
    /// Log the failure and continue
    Skip,
    /// Retry the failed delivery, then skip
    Retry,
    /// Stop the generator
    Abort,
}

#[derive(Args)]
struct GenerateArgs {
    /// Path to the generator configuration file
    #[arg(long, value_name = "PATH")]
    path: PathBuf,

    /// Generator id (default: configuration file stem)
    #[arg(long)]
    id: Option<String>,

    /// Value for `${params.<KEY>}` placeholders; parsed as JSON when possible
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    params: Vec<(String, serde_json::Value)>,

    /// Pace timestamps to wall-clock time
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    live_mode: bool,

    /// In live mode, release already due timestamps immediately
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    skip_past: bool,

    /// Deliver events in timestamp order
    #[arg(long)]
    keep_order: bool,

    /// Maximum number of concurrently rendered timestamps
    #[arg(long, default_value_t = eventum::parameters::DEFAULT_MAX_CONCURRENCY)]
    max_concurrency: usize,

    /// Seal a batch at this many events
    #[arg(long)]
    batch_size: Option<usize>,

    /// Seal a batch this many seconds after its first event
    #[arg(long)]
    batch_delay: Option<f64>,

    /// Per-delivery timeout in seconds
    #[arg(long, default_value_t = eventum::parameters::DEFAULT_WRITE_TIMEOUT)]
    write_timeout: u64,

    /// What to do when an output fails to deliver a batch
    #[arg(long, value_enum, default_value = "skip")]
    on_write_failure: OnWriteFailure,

    /// Extra attempts with `--on-write-failure retry`
    #[arg(long, default_value_t = 3)]
    write_retries: u32,

    /// IANA time zone of rendered timestamps
    #[arg(long, env = "EVENTUM_TIMEZONE", default_value = eventum::parameters::DEFAULT_TIMEZONE)]
    timezone: String,
}

fn parse_param(s: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))?;
    if key.is_empty() {
        return Err(format!("empty key in `{s}`"));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn build_params(args: GenerateArgs) -> anyhow::Result<GeneratorParameters> {
    let batch = match (args.batch_size, args.batch_delay) {
        (None, None) => BatchParameters::default(),
        (size, delay) => BatchParameters::new(size, delay).context("Invalid batch options")?,
    };
    let policy = match args.on_write_failure {
        OnWriteFailure::Skip => WriteFailurePolicy::Skip,
        OnWriteFailure::Retry => WriteFailurePolicy::Retry {
            attempts: args.write_retries,
        },
        OnWriteFailure::Abort => WriteFailurePolicy::Abort,
    };

    let generation = GenerationParameters::default()
        .with_timezone(&args.timezone)?
        .with_batch(batch)
        .with_keep_order(args.keep_order)
        .with_max_concurrency(args.max_concurrency)?
        .with_write_timeout(args.write_timeout)?
        .with_write_failure_policy(policy)?;

    let id = match args.id {
        Some(id) => id,
        None => args
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "generator".to_string()),
    };

    let params = GeneratorParameters::new(id, args.path)?
        .with_live_mode(args.live_mode)
        .with_skip_past(args.skip_past)
        .with_params(args.params.into_iter().collect())
        .with_generation(generation);
    Ok(params)
}

async fn generate(args: GenerateArgs) -> anyhow::Result<()> {
    let params = build_params(args)?;
    let generator = Arc::new(Generator::new(params));

    if !generator.start() {
        anyhow::bail!(
            "Generator {} failed to start (see log for details)",
            generator.params().id()
        );
    }

    let mut waiter = {
        let generator = Arc::clone(&generator);
        tokio::task::spawn_blocking(move || generator.join())
    };

    tokio::select! {
        joined = &mut waiter => joined.context("Failed to wait for generator")?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, stopping generator {}", generator.params().id());
            generator.stop();
            waiter.await.context("Failed to wait for generator")?;
        }
    }

    if !generator.is_ended_up_successfully() {
        anyhow::bail!("Generator {} ended with error", generator.params().id());
    }

    if let Some(summary) = generator.summary() {
        info!(
            "Generated {} event(s) from {} timestamp(s) in {} batch(es)",
            summary.events, summary.timestamps, summary.batches
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate(args) => generate(args).await,
    }
}

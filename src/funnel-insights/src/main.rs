//! Funnel Insights — e-commerce funnel and sales analysis pipeline.
//!
//! Generates or ingests raw event exports, cleans them, and writes the
//! ordered conversion funnel, per-segment funnels and sales reports.

mod pipeline;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use funnel_core::config::{AppConfig, OutputFormat};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "funnel-insights")]
#[command(about = "E-commerce funnel and sales insights pipeline")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory holding raw/ and cleaned/ (overrides config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Directory reports are written to (overrides config)
    #[arg(long, global = true)]
    outputs_dir: Option<PathBuf>,

    /// Report format: csv or json (overrides config)
    #[arg(long, global = true)]
    format: Option<OutputFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate seeded sample products, sessions and events
    Generate {
        /// RNG seed (overrides config)
        #[arg(long)]
        seed: Option<u64>,

        /// Number of sessions (overrides config)
        #[arg(long)]
        sessions: Option<usize>,
    },

    /// Clean raw events and products
    Clean,

    /// Compute the overall funnel and one funnel per segment attribute
    Funnel {
        /// Segment attribute; repeat to analyze several (default: from config)
        #[arg(long = "segment")]
        segments: Vec<String>,
    },

    /// Compute product, category, revenue and KPI reports
    Insights,

    /// Run generate, clean, funnel and insights in order
    Run {
        /// Reuse the existing raw data instead of generating it
        #[arg(long, default_value_t = false)]
        skip_generate: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "funnel_insights=info,funnel_reporting=info,funnel_ingest=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let result = match cli.command {
        Commands::Generate { seed, sessions } => {
            let mut config = config;
            if let Some(seed) = seed {
                config.generator.seed = seed;
            }
            if let Some(sessions) = sessions {
                config.generator.n_sessions = sessions;
            }
            pipeline::generate(&config)
        }
        Commands::Clean => pipeline::clean(&config).map(|_| ()),
        Commands::Funnel { segments } => {
            let attributes = if segments.is_empty() {
                config.funnel.segment_attributes.clone()
            } else {
                segments
            };
            pipeline::funnel(&config, &attributes).map(|_| ())
        }
        Commands::Insights => pipeline::insights(&config).map(|_| ()),
        Commands::Run { skip_generate } => pipeline::run(&config, skip_generate),
    };

    if let Err(e) = &result {
        error!(error = %format!("{e:#}"), "Funnel Insights failed");
    }
    result
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(Some(path.as_path()))
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AppConfig::load(None).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            AppConfig::default()
        }),
    };

    if let Some(dir) = &cli.data_dir {
        config.data.raw_dir = dir.join("raw");
        config.data.cleaned_dir = dir.join("cleaned");
    }
    if let Some(dir) = &cli.outputs_dir {
        config.data.outputs_dir = dir.clone();
    }
    if let Some(format) = cli.format {
        config.output.format = format;
    }
    config.validate().context("invalid configuration")?;

    info!(
        raw_dir = %config.data.raw_dir.display(),
        cleaned_dir = %config.data.cleaned_dir.display(),
        outputs_dir = %config.data.outputs_dir.display(),
        format = %config.output.format,
        "Configuration loaded"
    );
    Ok(config)
}

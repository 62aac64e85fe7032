//! # ksm-agent
//!
//! Binary entrypoint: parses the thin CLI surface, initializes logging,
//! loads the declarative configuration, and hands control to the runtime.
//!
//! Exit codes: `0` on clean completion (init success or sidecar graceful
//! shutdown), non-zero on fatal bootstrap/config failure or on an
//! initial-pass failure with `failOnError` enabled.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use ksm_agent::config::{AgentConfig, AgentMode};
use ksm_agent::metrics;
use ksm_agent::runtime::Agent;

#[derive(Debug, Parser)]
#[command(name = "ksm-agent", version, about = "Keeper Secrets Manager pod agent")]
struct Cli {
    /// Path to the agent configuration file.
    #[arg(long, default_value = "/etc/ksm-agent/config.yaml")]
    config: PathBuf,

    /// Override the configured operating mode (init or sidecar).
    #[arg(long, value_enum)]
    mode: Option<Mode>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Mode {
    Init,
    Sidecar,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ksm_agent=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = AgentConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(mode) = cli.mode {
        config.mode = match mode {
            Mode::Init => AgentMode::Init,
            Mode::Sidecar => AgentMode::Sidecar,
        };
    }

    info!(
        mode = ?config.mode,
        references = config.references.len(),
        folders = config.folder_references.len(),
        "starting ksm-agent"
    );

    metrics::register_metrics()?;

    let agent = Agent::new(config);
    agent.run().await.context("agent terminated with error")?;

    info!("ksm-agent stopped");
    Ok(())
}

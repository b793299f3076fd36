//! Agent ledger command line entry point

use agent_ledger::{Config, RunReport, Supervisor};
use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;

/// Run concurrent agents against a shared ledger and audit the result
#[derive(Parser, Debug)]
#[command(name = "agent-ledger", version, about, long_about = None)]
struct Cli {
    /// Number of agents; values outside 1..=max_agents default to 1
    #[arg(allow_negative_numbers = true)]
    agents: Option<i64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Usage errors exit here, before anything touches the filesystem
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    match run(cli).await {
        Ok(report) if report.is_complete() => ExitCode::SUCCESS,
        Ok(report) => {
            tracing::error!(
                skipped = ?report.skipped,
                "Run incomplete: some agents never started"
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<RunReport> {
    tracing::info!("Starting DelTran agent ledger");

    let config = Config::from_env().context("loading configuration")?;
    let supervisor = Supervisor::new(config).context("creating supervisor")?;

    let report = supervisor.run(cli.agents).await?;

    tracing::debug!(report = %serde_json::to_string(&report)?, "Run report");
    tracing::debug!("Metrics:\n{}", supervisor.metrics().render());
    Ok(report)
}

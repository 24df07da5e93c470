//! Churn pipeline - Main Entry Point

use clap::Parser;
use churn_pipeline::cli::{cmd_predict, cmd_run, cmd_serve, cmd_stage, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "churn_pipeline=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            tokio::task::block_in_place(|| cmd_run(&cli.documents))?;
        }
        Commands::Stage { name } => {
            tokio::task::block_in_place(|| cmd_stage(&cli.documents, name))?;
        }
        Commands::Predict { record, fields } => {
            let outcome = tokio::task::block_in_place(|| {
                cmd_predict(&cli.documents, record.as_deref(), &fields)
            })?;
            if !outcome.success {
                std::process::exit(2);
            }
        }
        Commands::Serve { port, host } => {
            cmd_serve(&cli.documents, &host, port).await?;
        }
    }

    Ok(())
}

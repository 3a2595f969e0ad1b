use anyhow::Result;
use clap::Parser;

use tenderbridge::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = tenderbridge::cli::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Extract(args) => tenderbridge::cli::extract::run(&config, &args).await,
        Commands::Classify { names } => tenderbridge::cli::classify::run(&config, &names),
        Commands::Resolve { buyer, winner } => {
            tenderbridge::cli::resolve::run(&config, buyer.as_deref(), winner.as_deref())
        }
    }
}

pub mod classify;
pub mod extract;
pub mod resolve;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use tenderbridge_core::ExtractionConfig;

#[derive(Parser)]
#[command(
    name = "tenderbridge",
    about = "Buyer/winner extraction for public procurement award notices",
    version
)]
pub struct Cli {
    /// Extraction config (TOML); built-in BOAMP defaults when omitted
    #[arg(long, global = true, env = "TENDERBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract award records from saved notice pages
    Extract(ExtractArgs),
    /// Tell public bodies from private companies
    Classify {
        /// Organization name(s)
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Validate a buyer/winner pair
    Resolve {
        #[arg(long)]
        buyer: Option<String>,
        #[arg(long)]
        winner: Option<String>,
    },
}

#[derive(Args)]
pub struct ExtractArgs {
    /// Saved HTML notice page(s)
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
    /// Source URL of the page (single file only)
    #[arg(long)]
    pub url: Option<String>,
    /// Prefix joined with each file stem to form its source URL
    #[arg(long, default_value = "https://www.boamp.fr/avis/detail/")]
    pub base_url: String,
    /// JSON map of notice id to field suggestions
    #[arg(long)]
    pub suggestions: Option<PathBuf>,
    /// SQLite database to upsert records into
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// Pretty-print records
    #[arg(long)]
    pub pretty: bool,
}

pub fn load_config(path: Option<&Path>) -> Result<ExtractionConfig> {
    match path {
        Some(path) => ExtractionConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(ExtractionConfig::default()),
    }
}

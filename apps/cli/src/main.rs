//! lvkit CLI: questionnaire-driven Leistungsverzeichnis estimates.
//!
//! Detects construction trades in a project description, asks the
//! trade-specific questions and renders priced LV documents from a static
//! price catalog.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}

//! grantsync CLI — incremental sync of spending-disclosure records.
//!
//! Pulls the listing API, enriches newly-seen records with award details,
//! and maintains the historical and snapshot CSV tables on disk.

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

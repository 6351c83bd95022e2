//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use grantsync_core::pipeline::{ProgressReporter, SyncResult, run_sync};
use grantsync_shared::{SyncConfig, config_file_path, init_config, load_config, load_config_from};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// grantsync — keep a local CSV mirror of spending disclosures up to date.
#[derive(Parser)]
#[command(
    name = "grantsync",
    version,
    about = "Incrementally sync spending-disclosure records and enrich them with award details.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run one sync: fetch, diff, enrich new records, persist.
    Sync {
        /// Listing endpoint to sync (overrides config).
        #[arg(short, long)]
        endpoint: Option<String>,

        /// Data directory for the CSV tables (overrides config).
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Config file to load instead of ~/.grantsync/grantsync.toml.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Maximum concurrent award lookups (overrides config).
        #[arg(long)]
        concurrency: Option<u32>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Print the config file path.
    Path,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "grantsync=info",
        1 => "grantsync=debug",
        _ => "grantsync=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Sync {
            endpoint,
            data_dir,
            config,
            concurrency,
        } => cmd_sync(endpoint, data_dir, config, concurrency).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Path => cmd_config_path(),
        },
    }
}

// ---------------------------------------------------------------------------
// Sync command
// ---------------------------------------------------------------------------

async fn cmd_sync(
    endpoint: Option<String>,
    data_dir: Option<PathBuf>,
    config_path: Option<PathBuf>,
    concurrency: Option<u32>,
) -> Result<()> {
    let app_config = match &config_path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    let mut config = SyncConfig::from(&app_config);
    if let Some(endpoint) = endpoint {
        config.endpoint = endpoint;
    }
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }
    if let Some(concurrency) = concurrency {
        config.award.concurrency = concurrency;
    }

    info!(
        endpoint = %config.endpoint,
        data_dir = %config.data_dir.display(),
        "starting sync"
    );

    // First ctrl-c requests a clean abort; records already fetched are
    // discarded and the on-disk tables stay in their pre-run state.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, aborting run");
            signal_cancel.cancel();
        }
    });

    let reporter = CliProgress::new();
    let result = run_sync(&config, &cancel, &reporter).await?;

    println!();
    println!("  Sync complete!");
    println!("  Fetched:      {}", result.counts.fetched);
    println!("  New:          {}", result.counts.new);
    println!("  Enriched:     {}", result.counts.enriched);
    if result.counts.enrichment_failed > 0 {
        println!("  Failed:       {}", result.counts.enrichment_failed);
    }
    if result.counts.not_addressable > 0 {
        println!("  No award id:  {}", result.counts.not_addressable);
    }
    if result.counts.missing_key > 0 {
        println!("  Missing key:  {}", result.counts.missing_key);
    }
    println!("  Time:         {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("wrote default config to {}", path.display());
    Ok(())
}

fn cmd_config_path() -> Result<()> {
    let path = config_file_path().map_err(|e| eyre!("{e}"))?;
    println!("{}", path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn records_fetched(&self, count: usize) {
        self.spinner.set_message(format!("Fetched {count} records"));
    }

    fn record_enriched(&self, current: usize, total: usize, link: &str) {
        self.spinner
            .set_message(format!("Extending [{current}/{total}] {link}"));
    }

    fn done(&self, _result: &SyncResult) {
        self.spinner.finish_and_clear();
    }
}

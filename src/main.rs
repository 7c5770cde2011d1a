use anyhow::Result;
use clap::{Parser, Subcommand};
use ratsfeed::model::RunReport;
use ratsfeed::pipeline::{SyncOptions, run_sync, validate_config};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "ratsfeed",
    about = "Council meeting listing to JSON and iCalendar feed"
)]
struct Cli {
    /// TOML feed configuration; built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    json_out: Option<PathBuf>,

    #[arg(long)]
    ics_out: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch the listing pages and write both feed artifacts.
    Sync {
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        /// Keep a copy of every fetched page here.
        #[arg(long)]
        dump_dir: Option<PathBuf>,
    },
    /// Build the feed from previously dumped listing pages.
    Extract {
        #[arg(long)]
        html_dir: PathBuf,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    Validate,
}

fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Sync { dry_run, dump_dir } => {
            let report = run_sync(&SyncOptions {
                config_path: cli.config,
                html_dir: None,
                dump_dir,
                json_path: cli.json_out,
                ics_path: cli.ics_out,
                dry_run,
            })?;
            log_summary(&report);
        }
        Commands::Extract { html_dir, dry_run } => {
            let report = run_sync(&SyncOptions {
                config_path: cli.config,
                html_dir: Some(html_dir),
                dump_dir: None,
                json_path: cli.json_out,
                ics_path: cli.ics_out,
                dry_run,
            })?;
            log_summary(&report);
        }
        Commands::Validate => {
            for line in validate_config(cli.config.as_deref())? {
                println!("{line}");
            }
        }
    }

    Ok(())
}

fn log_summary(report: &RunReport) {
    info!(
        windows = report.windows.len(),
        candidates = report.candidates,
        allowed = report.allowed,
        parse_skipped = report.parse_skipped,
        past = report.past_dropped,
        duplicates = report.duplicates,
        capped = report.capped,
        items = report.items,
        calendar_events = report.calendar_events,
        "feed run summary"
    );
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

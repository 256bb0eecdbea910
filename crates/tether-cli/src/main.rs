#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::OutputMode;
use std::env;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "tether: dependency closures for content graphs",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Derive the output mode from flags.
    fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Compute the dependency closure of one entity",
        long_about = "Compute the full transitive dependency closure of a single entity \
                      from a JSON fixture file, warming the persistent cache as it goes.",
        after_help = "EXAMPLES:\n    # Resolve an article's closure\n    tether calculate node 1 --fixtures site.json\n\n    # Use an explicit cache database\n    tether calculate node 1 --fixtures site.json --cache /tmp/tether.sqlite3\n\n    # Emit machine-readable output\n    tether calculate node 1 --fixtures site.json --json"
    )]
    Calculate(cmd::calculate::CalculateArgs),

    #[command(
        subcommand,
        about = "Inspect and maintain the persistent dependency cache"
    )]
    Cache(CacheCommand),
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    #[command(
        about = "Delete every cached closure",
        after_help = "EXAMPLES:\n    # Clear the project cache\n    tether cache clear\n\n    # Clear an explicit cache database\n    tether cache clear --cache /tmp/tether.sqlite3"
    )]
    Clear(cmd::cache::ClearArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TETHER_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "tether=debug,info"
        } else {
            "tether=info,warn"
        })
    });

    let format = env::var("TETHER_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry.with(fmt::layer().json().with_ansi(false)).init();
        }
        _ => {
            registry.with(fmt::layer().compact()).init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let project_root = std::env::current_dir()?;
    let output = cli.output_mode();

    match cli.command {
        Commands::Calculate(ref args) => {
            cmd::calculate::run_calculate(args, output, &project_root)
        }
        Commands::Cache(CacheCommand::Clear(ref args)) => {
            cmd::cache::run_clear(args, output, &project_root)
        }
    }
}

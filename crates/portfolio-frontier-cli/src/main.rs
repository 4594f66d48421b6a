mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::estimate::EstimateArgs;
use commands::evaluate::EvaluateArgs;
use commands::frontier::FrontierArgs;

/// Monte Carlo portfolio frontier sampling
#[derive(Parser)]
#[command(
    name = "pfo",
    version,
    about = "Monte Carlo portfolio frontier sampling",
    long_about = "Samples long-only portfolios under per-asset and per-class caps, \
                  scores them by expected return, volatility and Sharpe ratio, and \
                  reports the max-Sharpe portfolio of each allocation strategy."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log progress to stderr (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample every strategy and select each max-Sharpe portfolio
    Frontier(FrontierArgs),
    /// Score a single allocation
    Evaluate(EvaluateArgs),
    /// Estimate annualized returns and covariance from closing prices
    Estimate(EstimateArgs),
    /// Print the built-in allocation strategies
    Presets,
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Frontier(args) => commands::frontier::run_frontier(args),
        Commands::Evaluate(args) => commands::evaluate::run_evaluate(args),
        Commands::Estimate(args) => commands::estimate::run_estimate(args),
        Commands::Presets => commands::presets::run_presets(),
        Commands::Version => {
            println!("pfo {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}

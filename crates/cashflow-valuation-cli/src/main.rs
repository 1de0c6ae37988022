mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::batch::BatchArgs;
use commands::monte_carlo::{PricePathArgs, SimulateArgs};
use commands::npv::NpvArgs;
use commands::real_options::{DecideArgs, OptionArgs};

/// Stochastic cash-flow valuation and the option to wait
#[derive(Parser)]
#[command(
    name = "cfv",
    version,
    about = "Stochastic cash-flow valuation and the option to wait",
    long_about = "Values cash-flow histories with deterministic and Monte Carlo NPV, \
                  prices the option to defer investment with Black-Scholes and \
                  recommends investing now or waiting. Runs single calculations \
                  or whole batches from CSV files."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Net present value of a cash-flow series (flat rate or rate curve)
    Npv(NpvArgs),
    /// Monte Carlo NPV distribution from a cash-flow history
    Simulate(SimulateArgs),
    /// Geometric Brownian motion price paths
    PricePaths(PricePathArgs),
    /// Black-Scholes value of the option to wait
    Option(OptionArgs),
    /// Invest now or wait, given NPV and option value
    Decide(DecideArgs),
    /// Value every entity in a cash-flow CSV against a rate CSV
    Batch(BatchArgs),
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

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Npv(args) => commands::npv::run_npv(args),
        Commands::Simulate(args) => commands::monte_carlo::run_simulate(args),
        Commands::PricePaths(args) => commands::monte_carlo::run_price_paths(args),
        Commands::Option(args) => commands::real_options::run_option(args),
        Commands::Decide(args) => commands::real_options::run_decide(args),
        Commands::Batch(args) => commands::batch::run_batch(args),
        Commands::Version => {
            println!("cfv {}", env!("CARGO_PKG_VERSION"));
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

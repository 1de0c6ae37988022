use clap::Args;
use serde_json::Value;

use cashflow_valuation_core::monte_carlo::price_paths::{self, GbmInput};
use cashflow_valuation_core::monte_carlo::simulation::{self, McNpvInput};

use crate::input;

/// Arguments for Monte Carlo NPV simulation
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct SimulateArgs {
    /// Comma-separated historical cash flows; the first is the outlay
    #[arg(long, value_delimiter = ',')]
    pub cash_flows: Option<Vec<f64>>,

    /// Number of simulated NPVs
    #[arg(long, default_value_t = 1_000)]
    pub num_simulations: u32,

    /// Cash flows drawn per simulated NPV
    #[arg(long, default_value_t = 10)]
    pub num_periods: u32,

    /// Flat discount rate
    #[arg(long, default_value_t = 0.05)]
    pub discount_rate: f64,

    /// Seed for reproducible draws
    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, default_value = "entity")]
    pub entity_id: String,

    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for GBM price path simulation
#[derive(Args)]
pub struct PricePathArgs {
    /// Starting value
    #[arg(long)]
    pub initial_value: Option<f64>,

    /// Annual drift
    #[arg(long)]
    pub drift: Option<f64>,

    /// Annual volatility
    #[arg(long)]
    pub volatility: Option<f64>,

    /// Horizon in years
    #[arg(long)]
    pub years: Option<f64>,

    #[arg(long)]
    pub steps_per_year: Option<u32>,

    #[arg(long)]
    pub num_paths: Option<u32>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Path to JSON input file; flags given alongside override its fields
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_simulate(args: SimulateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mc_input: McNpvInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(cash_flows) = args.cash_flows {
        McNpvInput {
            entity_id: args.entity_id,
            cash_flows,
            num_simulations: args.num_simulations,
            num_periods: args.num_periods,
            discount_rate: args.discount_rate,
            seed: args.seed,
        }
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        return Err("--input <file.json>, --cash-flows or stdin required for simulation".into());
    };
    let result = simulation::run_npv_simulation(&mc_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_price_paths(args: PricePathArgs) -> Result<Value, Box<dyn std::error::Error>> {
    // GBM has a full set of defaults, so no input at all is a valid request
    let mut gbm: GbmInput = match args.input {
        Some(ref path) => input::file::read_json(path)?,
        None => GbmInput::default(),
    };
    if let Some(v) = args.initial_value {
        gbm.initial_value = v;
    }
    if let Some(v) = args.drift {
        gbm.drift = v;
    }
    if let Some(v) = args.volatility {
        gbm.volatility = v;
    }
    if let Some(v) = args.years {
        gbm.horizon_years = v;
    }
    if let Some(v) = args.steps_per_year {
        gbm.steps_per_year = v;
    }
    if let Some(v) = args.num_paths {
        gbm.num_paths = v;
    }
    if args.seed.is_some() {
        gbm.seed = args.seed;
    }
    let result = price_paths::run_price_path_simulation(&gbm)?;
    Ok(serde_json::to_value(result)?)
}

use clap::{Args, ValueEnum};
use serde_json::{json, Value};
use tracing::info;

use cashflow_valuation_core::pipeline::{self, DiscountBasis, ValuationConfig, VolatilityBasis};
use cashflow_valuation_core::real_options::black_scholes::ZeroVolatilityPolicy;
use cashflow_valuation_core::RateUnit;

use crate::input::csv_source::CsvSource;
use crate::input::file;
use crate::output::export;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum VolatilityArg {
    /// Std of period-over-period returns
    Returns,
    /// Coefficient of variation of the amounts
    Levels,
}

/// Arguments for a batch valuation
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct BatchArgs {
    /// Cash-flow CSV (entity_id|gvkey, date|datadate or period, amount|oancfy)
    #[arg(long)]
    pub cash_flows: String,

    /// Rate CSV (observation_date, rate|DTB3); required unless --flat
    #[arg(long)]
    pub rates: Option<String>,

    /// JSON configuration file; flags below override its fields
    #[arg(long)]
    pub config: Option<String>,

    /// Discount every period at --discount-rate instead of the rate curve
    #[arg(long)]
    pub flat: bool,

    #[arg(long)]
    pub discount_rate: Option<f64>,

    #[arg(long)]
    pub num_simulations: Option<u32>,

    #[arg(long)]
    pub num_periods: Option<u32>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Years until the invest/wait decision
    #[arg(long)]
    pub time_to_decision: Option<f64>,

    /// Risk-free rate for the option; defaults to the latest curve rate
    #[arg(long)]
    pub option_rate: Option<f64>,

    #[arg(long, value_enum)]
    pub volatility: Option<VolatilityArg>,

    /// Fail entities with zero volatility instead of using intrinsic value
    #[arg(long)]
    pub strict: bool,

    /// Rate quotes are percentages (e.g. DTB3 "4,25" = 4.25%)
    #[arg(long)]
    pub percent: bool,

    /// Value entities on the rayon thread pool
    #[arg(long)]
    pub parallel: bool,

    /// Write one CSV row per entity to this path
    #[arg(long)]
    pub export: Option<String>,

    /// Entity ids to include in the NPV distribution summary
    #[arg(long, value_delimiter = ',')]
    pub visualize: Vec<String>,
}

fn build_config(args: &BatchArgs) -> Result<ValuationConfig, Box<dyn std::error::Error>> {
    let mut config = match args.config {
        Some(ref path) => {
            let (_, text) = file::read_text(path)?;
            ValuationConfig::from_json(&text)?
        }
        None => ValuationConfig::default(),
    };
    if args.flat {
        config.discount_basis = DiscountBasis::Flat;
    }
    if let Some(v) = args.discount_rate {
        config.discount_rate = v;
    }
    if let Some(v) = args.num_simulations {
        config.num_simulations = v;
    }
    if let Some(v) = args.num_periods {
        config.num_periods = v;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if let Some(v) = args.time_to_decision {
        config.time_to_decision = v;
    }
    if args.option_rate.is_some() {
        config.option_rate = args.option_rate;
    }
    match args.volatility {
        Some(VolatilityArg::Returns) => config.volatility_basis = VolatilityBasis::PeriodReturns,
        Some(VolatilityArg::Levels) => config.volatility_basis = VolatilityBasis::Levels,
        None => {}
    }
    if args.strict {
        config.zero_volatility_policy = ZeroVolatilityPolicy::Fail;
    }
    if args.percent {
        config.rate_unit = RateUnit::Percent;
    }
    config.validate()?;
    Ok(config)
}

pub fn run_batch(args: BatchArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let config = build_config(&args)?;
    if config.discount_basis == DiscountBasis::Curve && args.rates.is_none() {
        return Err("--rates <file.csv> is required unless --flat is given".into());
    }
    let source = CsvSource::from_paths(&args.cash_flows, args.rates.as_deref())?;

    let report = if args.parallel {
        pipeline::run_batch_parallel(&source, &config)?
    } else {
        pipeline::run_batch(&source, &config)?
    };

    let rows = report.export_rows();
    if let Some(ref path) = args.export {
        export::write_export(path, &rows)?;
        info!(path = %path, rows = rows.len(), "export written");
    }

    let warnings: Vec<String> = report
        .failed()
        .map(|f| format!("{}: {}", f.entity_id, f.message))
        .collect();

    Ok(json!({
        "results": rows,
        "visualization": report.visualization_rows(&args.visualize),
        "summary": {
            "run_seed": report.run_seed,
            "valued": report.succeeded().count(),
            "failed": report.failed().count(),
            "computation_time_us": report.computation_time_us,
        },
        "warnings": warnings,
    }))
}

use clap::Args;
use serde_json::Value;

use cashflow_valuation_core::real_options::black_scholes::{
    self, OptionInputs, OptionValuationInput, ZeroVolatilityPolicy,
};
use cashflow_valuation_core::real_options::decision::{self, DecisionInput};

use crate::input;

/// Arguments for valuing the option to wait
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct OptionArgs {
    /// Value of the underlying, normally the project NPV
    #[arg(long)]
    pub spot: Option<f64>,

    /// Exercise price; defaults to the spot
    #[arg(long)]
    pub strike: Option<f64>,

    /// Years until the decision must be taken
    #[arg(long, default_value_t = 1.0)]
    pub time: f64,

    /// Continuously compounded risk-free rate
    #[arg(long, default_value_t = 0.03)]
    pub rate: f64,

    /// Annualised volatility of the underlying
    #[arg(long)]
    pub volatility: Option<f64>,

    /// Fail on zero volatility instead of returning discounted intrinsic value
    #[arg(long)]
    pub strict: bool,

    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for the invest-now-or-wait decision
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct DecideArgs {
    #[arg(long)]
    pub npv: Option<f64>,

    #[arg(long)]
    pub option_value: Option<f64>,

    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_option(args: OptionArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let option_input: OptionValuationInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(spot) = args.spot {
        OptionValuationInput {
            inputs: OptionInputs {
                spot,
                strike: args.strike.unwrap_or(spot),
                time_to_decision: args.time,
                risk_free_rate: args.rate,
                volatility: args.volatility.ok_or("--volatility is required with --spot")?,
            },
            zero_volatility_policy: if args.strict {
                ZeroVolatilityPolicy::Fail
            } else {
                ZeroVolatilityPolicy::Intrinsic
            },
        }
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        return Err("--input <file.json>, --spot/--volatility or stdin required for option valuation".into());
    };
    let result = black_scholes::run_option_valuation(&option_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_decide(args: DecideArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let decision_input: DecisionInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let (Some(npv), Some(option_value)) = (args.npv, args.option_value) {
        DecisionInput { npv, option_value }
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        return Err("--input <file.json>, --npv with --option-value, or stdin required".into());
    };
    let result = decision::decide(&decision_input)?;
    Ok(serde_json::to_value(result)?)
}

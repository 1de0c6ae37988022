use clap::Args;
use serde_json::Value;

use cashflow_valuation_core::npv::{self, NpvDiscount, NpvInput};
use cashflow_valuation_core::Quarter;

use crate::input;

/// Arguments for NPV calculation
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct NpvArgs {
    /// Comma-separated cash flows in period order (e.g. -1000,300,300)
    #[arg(long, value_delimiter = ',')]
    pub cash_flows: Option<Vec<f64>>,

    /// Flat discount rate per period (e.g. 0.05 for 5%)
    #[arg(long)]
    pub rate: Option<f64>,

    /// Quarter of the first cash flow
    #[arg(long, default_value = "2000Q1")]
    pub start: Quarter,

    /// Entity identifier echoed in the output
    #[arg(long, default_value = "entity")]
    pub entity_id: String,

    /// Path to JSON input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_npv(args: NpvArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let npv_input: NpvInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(amounts) = args.cash_flows {
        NpvInput {
            entity_id: args.entity_id,
            cash_flows: npv::quarterly_flows(args.start, &amounts),
            discount: NpvDiscount::Flat {
                rate: args.rate.ok_or("--rate is required with --cash-flows")?,
            },
        }
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        return Err("--input <file.json>, --cash-flows or stdin required for NPV".into());
    };
    let result = npv::calculate_npv(&npv_input)?;
    Ok(serde_json::to_value(result)?)
}

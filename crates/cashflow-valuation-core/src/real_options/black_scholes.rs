use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::time::Instant;

use crate::error::ValuationError;
use crate::types::{with_metadata, ComputationOutput, Money, Rate, Years};
use crate::ValuationResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// European call inputs for the option to defer an investment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionInputs {
    pub spot: Money,
    pub strike: Money,
    pub time_to_decision: Years,
    pub risk_free_rate: Rate,
    pub volatility: Rate,
}

impl OptionInputs {
    /// The waiting option on a project: spot and strike are both its NPV.
    pub fn waiting_option(npv: Money, time_to_decision: Years, risk_free_rate: Rate, volatility: Rate) -> Self {
        Self {
            spot: npv,
            strike: npv,
            time_to_decision,
            risk_free_rate,
            volatility,
        }
    }
}

/// What to do when volatility is exactly zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroVolatilityPolicy {
    /// Return the error from the closed form.
    Fail,
    /// Value at `max(S - K e^(-rT), 0)`.
    #[default]
    Intrinsic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationMethod {
    BlackScholes,
    DiscountedIntrinsic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionResult {
    pub value: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d1: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d2: Option<f64>,
    /// `max(S - K e^(-rT), 0)`, the zero-volatility limit.
    pub intrinsic_value: Money,
    pub method: ValuationMethod,
}

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

fn invalid(field: &str, reason: &str) -> ValuationError {
    ValuationError::InvalidOptionParameters {
        field: field.into(),
        reason: reason.into(),
    }
}

fn check_finite(inputs: &OptionInputs) -> ValuationResult<()> {
    let fields = [
        ("spot", inputs.spot),
        ("strike", inputs.strike),
        ("time_to_decision", inputs.time_to_decision),
        ("risk_free_rate", inputs.risk_free_rate),
        ("volatility", inputs.volatility),
    ];
    match fields.iter().find(|(_, v)| !v.is_finite()) {
        Some((field, _)) => Err(invalid(field, "must be finite")),
        None => Ok(()),
    }
}

fn standard_normal() -> ValuationResult<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| invalid("distribution", &e.to_string()))
}

/// `max(S - K e^(-rT), 0)`
pub fn discounted_intrinsic(inputs: &OptionInputs) -> Money {
    let pv_strike = inputs.strike * (-inputs.risk_free_rate * inputs.time_to_decision).exp();
    (inputs.spot - pv_strike).max(0.0)
}

/// Black-Scholes value of a European call.
///
/// ```text
/// d1 = (ln(S/K) + (r + σ²/2)T) / (σ√T)
/// d2 = d1 - σ√T
/// C  = S·Φ(d1) - K·e^(-rT)·Φ(d2)
/// ```
///
/// Requires positive spot, strike, time and volatility.
pub fn black_scholes_call(inputs: &OptionInputs) -> ValuationResult<OptionResult> {
    check_finite(inputs)?;
    if inputs.spot <= 0.0 {
        return Err(invalid("spot", "must be positive"));
    }
    if inputs.strike <= 0.0 {
        return Err(invalid("strike", "must be positive"));
    }
    if inputs.time_to_decision <= 0.0 {
        return Err(invalid("time_to_decision", "must be positive"));
    }
    if inputs.volatility <= 0.0 {
        return Err(invalid("volatility", "must be positive"));
    }

    let OptionInputs {
        spot: s,
        strike: k,
        time_to_decision: t,
        risk_free_rate: r,
        volatility: sigma,
    } = *inputs;
    let sig_sqrt_t = sigma * t.sqrt();
    let d1 = ((s / k).ln() + (r + 0.5 * sigma * sigma) * t) / sig_sqrt_t;
    let d2 = d1 - sig_sqrt_t;

    let n = standard_normal()?;
    let value = s * n.cdf(d1) - k * (-r * t).exp() * n.cdf(d2);

    Ok(OptionResult {
        // Φ rounding can leave a deep out-of-the-money call a hair below zero
        value: value.max(0.0),
        d1: Some(d1),
        d2: Some(d2),
        intrinsic_value: discounted_intrinsic(inputs),
        method: ValuationMethod::BlackScholes,
    })
}

/// Value the option to wait, applying `policy` when volatility is zero.
pub fn value_waiting_option(
    inputs: &OptionInputs,
    policy: ZeroVolatilityPolicy,
) -> ValuationResult<OptionResult> {
    if inputs.volatility == 0.0 && policy == ZeroVolatilityPolicy::Intrinsic {
        check_finite(inputs)?;
        if inputs.time_to_decision < 0.0 {
            return Err(invalid("time_to_decision", "must not be negative"));
        }
        let intrinsic = discounted_intrinsic(inputs);
        return Ok(OptionResult {
            value: intrinsic,
            d1: None,
            d2: None,
            intrinsic_value: intrinsic,
            method: ValuationMethod::DiscountedIntrinsic,
        });
    }
    black_scholes_call(inputs)
}

// ---------------------------------------------------------------------------
// JSON-facing valuation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionValuationInput {
    #[serde(flatten)]
    pub inputs: OptionInputs,
    #[serde(default)]
    pub zero_volatility_policy: ZeroVolatilityPolicy,
}

pub fn run_option_valuation(
    input: &OptionValuationInput,
) -> ValuationResult<ComputationOutput<OptionResult>> {
    let start = Instant::now();
    let mut warnings = Vec::new();

    let result = value_waiting_option(&input.inputs, input.zero_volatility_policy)?;
    if result.method == ValuationMethod::DiscountedIntrinsic {
        warnings.push("Zero volatility; valued at discounted intrinsic value".into());
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Black-Scholes European call (option to wait)",
        &serde_json::json!({
            "exercise": "european",
            "dividends": "none",
            "zero_volatility_policy": input.zero_volatility_policy,
        }),
        warnings,
        elapsed,
        result,
    ))
}

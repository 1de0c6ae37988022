use serde::{Deserialize, Serialize};
use std::hash::Hash;
use std::time::Instant;

use crate::cash_flow::{CashFlow, CashFlowSeries};
use crate::error::ValuationError;
use crate::period::Quarter;
use crate::rate_curve::{CurvePoint, RateCurve, RateUnit};
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::ValuationResult;

// ---------------------------------------------------------------------------
// Discounting primitives
// ---------------------------------------------------------------------------

fn check_rate(rate: Rate, period: usize) -> ValuationResult<()> {
    if !rate.is_finite() || rate <= -1.0 {
        return Err(ValuationError::InvalidInput {
            field: "rate".into(),
            reason: format!("discount rate for period {period} must be finite and greater than -100%"),
        });
    }
    Ok(())
}

/// `1 / (1 + rate)^period`. Every NPV variant discounts through this so a
/// constant curve reproduces the flat result bit for bit.
pub(crate) fn discount_factor(rate: Rate, period: usize) -> f64 {
    (1.0 + rate).powi(period as i32).recip()
}

/// Discount factors for periods 1..=n at a flat rate.
pub fn flat_discount_factors(rate: Rate, n: usize) -> ValuationResult<Vec<f64>> {
    check_rate(rate, 1)?;
    Ok((1..=n).map(|i| discount_factor(rate, i)).collect())
}

/// `Σ cf[i] / (1 + rate)^i` for i = 1..=n over a plain slice of amounts.
///
/// The first amount is discounted one full period, not treated as time zero.
pub fn npv_flat_amounts(amounts: &[Money], rate: Rate) -> ValuationResult<Money> {
    check_rate(rate, 1)?;
    Ok(amounts
        .iter()
        .enumerate()
        .map(|(i, cf)| cf * discount_factor(rate, i + 1))
        .sum())
}

// ---------------------------------------------------------------------------
// NPV engine
// ---------------------------------------------------------------------------

/// Net present value at a single flat rate.
pub fn npv_flat<P>(series: &CashFlowSeries<P>, rate: Rate) -> ValuationResult<Money> {
    npv_flat_amounts(&series.amounts(), rate)
}

/// Net present value with a per-period rate `curve.rate_for(period_of(i))`.
///
/// `period_of` receives the 1-based period index, the same `i` used as the
/// discount exponent. Periods the curve does not cover use its carry-forward rate.
pub fn npv_curve<P, Q, F>(
    series: &CashFlowSeries<P>,
    curve: &RateCurve<Q>,
    period_of: F,
) -> ValuationResult<Money>
where
    Q: Ord + Hash + Clone,
    F: Fn(usize) -> Q,
{
    let mut total = 0.0;
    for (idx, flow) in series.flows().iter().enumerate() {
        let i = idx + 1;
        let rate = curve.rate_for(&period_of(i))?;
        check_rate(rate, i)?;
        total += flow.amount * discount_factor(rate, i);
    }
    Ok(total)
}

/// [`npv_curve`] keyed by the series' own periods.
pub fn npv_on_own_periods<P>(series: &CashFlowSeries<P>, curve: &RateCurve<P>) -> ValuationResult<Money>
where
    P: Ord + Hash + Clone,
{
    let flows = series.flows();
    npv_curve(series, curve, |i| flows[i - 1].period.clone())
}

/// One period of discounting applied to a single cash flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodPresentValue<P = Quarter> {
    pub period: P,
    pub amount: Money,
    pub rate: Rate,
    pub present_value: Money,
}

/// Each cash flow discounted a single period at its own period's rate: `cf / (1 + r(period))`.
pub fn discount_each_period<P>(
    series: &CashFlowSeries<P>,
    curve: &RateCurve<P>,
) -> ValuationResult<Vec<PeriodPresentValue<P>>>
where
    P: Ord + Hash + Clone,
{
    series
        .flows()
        .iter()
        .map(|flow| {
            let rate = curve.rate_for(&flow.period)?;
            check_rate(rate, 1)?;
            Ok(PeriodPresentValue {
                period: flow.period.clone(),
                amount: flow.amount,
                rate,
                present_value: flow.amount * discount_factor(rate, 1),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// JSON-facing calculation
// ---------------------------------------------------------------------------

/// How an [`NpvInput`] is discounted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "basis", rename_all = "snake_case")]
pub enum NpvDiscount {
    Flat {
        rate: Rate,
    },
    Curve {
        points: Vec<CurvePoint<Quarter>>,
        #[serde(default)]
        rate_unit: RateUnit,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpvInput {
    #[serde(default = "default_entity_id")]
    pub entity_id: String,
    pub cash_flows: Vec<CashFlow<Quarter>>,
    pub discount: NpvDiscount,
}

fn default_entity_id() -> String {
    "entity".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpvOutput {
    pub entity_id: String,
    pub npv: Money,
    pub num_periods: usize,
    /// Cash flows after outlay normalisation, in period order.
    pub cash_flows: Vec<CashFlow<Quarter>>,
    /// Single-period present values, curve basis only.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub period_values: Vec<PeriodPresentValue<Quarter>>,
}

pub fn calculate_npv(input: &NpvInput) -> ValuationResult<ComputationOutput<NpvOutput>> {
    let start = Instant::now();
    let mut warnings = Vec::new();

    let series = CashFlowSeries::from_raw(
        input.entity_id.clone(),
        input.cash_flows.iter().map(|f| (f.period, f.amount)),
    )?;
    let first_positive = input
        .cash_flows
        .iter()
        .min_by_key(|f| f.period)
        .map(|f| f.amount > 0.0)
        .unwrap_or(false);
    if first_positive {
        warnings.push("First cash flow was positive; treated as an outlay".into());
    }

    let (npv, period_values, methodology) = match &input.discount {
        NpvDiscount::Flat { rate } => (npv_flat(&series, *rate)?, Vec::new(), "NPV at flat discount rate"),
        NpvDiscount::Curve { points, rate_unit } => {
            let curve = RateCurve::from_points(points, *rate_unit)?;
            let uncovered = series
                .flows()
                .iter()
                .filter(|f| curve.iter().all(|(p, _)| *p != f.period))
                .count();
            if uncovered > 0 {
                warnings.push(format!(
                    "{uncovered} period(s) not on the curve; nearest earlier rate carried forward"
                ));
            }
            (
                npv_on_own_periods(&series, &curve)?,
                discount_each_period(&series, &curve)?,
                "NPV on per-period rate curve",
            )
        }
    };

    let output = NpvOutput {
        entity_id: input.entity_id.clone(),
        npv,
        num_periods: series.len(),
        cash_flows: series.flows().to_vec(),
        period_values,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        methodology,
        &serde_json::json!({
            "discounting": "cash flow i discounted by (1 + r_i)^i, i starting at 1",
            "outlay": "first cash flow forced non-positive",
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Quarters a flat list of amounts is laid out on, starting at `start`.
pub fn quarterly_flows(start: Quarter, amounts: &[Money]) -> Vec<CashFlow<Quarter>> {
    start
        .iter_from()
        .zip(amounts.iter().copied())
        .map(|(period, amount)| CashFlow { period, amount })
        .collect()
}

use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::error::ValuationError;
use crate::period::Quarter;
use crate::stats;
use crate::types::{Money, Rate};
use crate::ValuationResult;

/// A single cash flow in a period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashFlow<P = Quarter> {
    pub period: P,
    pub amount: Money,
}

/// An entity's cash flows, ordered by period, first flow treated as the initial outlay.
///
/// Built through [`CashFlowSeries::from_raw`], which sorts, checks for duplicate
/// periods and normalises the outlay sign once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CashFlowSeries<P = Quarter> {
    entity_id: String,
    flows: Vec<CashFlow<P>>,
    normalized: bool,
}

impl<P> CashFlowSeries<P>
where
    P: Ord + Clone + Display,
{
    pub fn from_raw<I>(entity_id: impl Into<String>, pairs: I) -> ValuationResult<Self>
    where
        I: IntoIterator<Item = (P, Money)>,
    {
        let entity_id = entity_id.into();
        let mut flows: Vec<CashFlow<P>> = pairs
            .into_iter()
            .map(|(period, amount)| CashFlow { period, amount })
            .collect();

        if flows.is_empty() {
            return Err(ValuationError::DegenerateSeries {
                entity_id,
                reason: "no cash flows".into(),
            });
        }
        if let Some(bad) = flows.iter().find(|f| !f.amount.is_finite()) {
            return Err(ValuationError::InvalidInput {
                field: format!("cash_flows[{}]", bad.period),
                reason: "amount must be finite".into(),
            });
        }

        flows.sort_by(|a, b| a.period.cmp(&b.period));
        if let Some(w) = flows.windows(2).find(|w| w[0].period == w[1].period) {
            return Err(ValuationError::DuplicatePeriod {
                entity_id,
                period: w[0].period.to_string(),
            });
        }

        let mut series = Self {
            entity_id,
            flows,
            normalized: false,
        };
        series.normalize_outlay();
        Ok(series)
    }
}

impl CashFlowSeries<u32> {
    /// Series indexed by period number 1..=n, in the given order.
    pub fn from_amounts(entity_id: impl Into<String>, amounts: &[Money]) -> ValuationResult<Self> {
        Self::from_raw(entity_id, (1u32..).zip(amounts.iter().copied()))
    }
}

impl<P> CashFlowSeries<P> {
    /// Force the first amount to `-|amount|`. Only the first call has any effect.
    pub fn normalize_outlay(&mut self) {
        if self.normalized {
            return;
        }
        if let Some(first) = self.flows.first_mut() {
            first.amount = -first.amount.abs();
        }
        self.normalized = true;
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn flows(&self) -> &[CashFlow<P>] {
        &self.flows
    }

    pub fn periods(&self) -> impl Iterator<Item = &P> {
        self.flows.iter().map(|f| &f.period)
    }

    pub fn amounts(&self) -> Vec<Money> {
        self.flows.iter().map(|f| f.amount).collect()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn mean(&self) -> Money {
        stats::mean(&self.amounts())
    }

    /// Sample standard deviation (ddof = 1) of the amounts; 0 for a single flow.
    pub fn std(&self) -> Money {
        stats::sample_std(&self.amounts())
    }

    /// `(a[i] - a[i-1]) / a[i-1]` for each consecutive pair.
    pub fn period_returns(&self) -> ValuationResult<Vec<f64>> {
        self.flows
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let prev = w[0].amount;
                if prev == 0.0 {
                    return Err(ValuationError::DegenerateSeries {
                        entity_id: self.entity_id.clone(),
                        reason: format!("zero cash flow at position {i} makes the next return undefined"),
                    });
                }
                Ok((w[1].amount - prev) / prev)
            })
            .collect()
    }

    /// Sample standard deviation of period returns; needs at least two flows.
    pub fn return_volatility(&self) -> ValuationResult<Rate> {
        let returns = self.period_returns()?;
        if returns.is_empty() {
            return Err(ValuationError::DegenerateSeries {
                entity_id: self.entity_id.clone(),
                reason: "at least two cash flows are needed for return volatility".into(),
            });
        }
        Ok(stats::sample_std(&returns))
    }

    /// Coefficient of variation of the amounts, a dimensionless level volatility.
    pub fn level_volatility(&self) -> ValuationResult<Rate> {
        let mean = self.mean();
        if mean == 0.0 {
            return Err(ValuationError::DegenerateSeries {
                entity_id: self.entity_id.clone(),
                reason: "zero mean cash flow makes level volatility undefined".into(),
            });
        }
        Ok(self.std() / mean.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn q(label: &str) -> Quarter {
        label.parse().unwrap()
    }

    #[test]
    fn test_from_raw_sorts_and_negates_first() {
        let series = CashFlowSeries::from_raw(
            "001004",
            vec![(q("2016Q2"), 50.0), (q("2016Q1"), 120.0), (q("2016Q3"), 70.0)],
        )
        .unwrap();
        let periods: Vec<String> = series.periods().map(|p| p.to_string()).collect();
        assert_eq!(periods, vec!["2016Q1", "2016Q2", "2016Q3"]);
        assert_eq!(series.amounts(), vec![-120.0, 50.0, 70.0]);
        assert!(series.is_normalized());
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let mut series = CashFlowSeries::from_amounts("p", &[-1000.0, 300.0]).unwrap();
        series.normalize_outlay();
        series.normalize_outlay();
        assert_eq!(series.amounts(), vec![-1000.0, 300.0]);
    }

    #[test]
    fn test_duplicate_period_rejected() {
        let err = CashFlowSeries::from_raw("x", vec![(q("2016Q1"), 1.0), (q("2016Q1"), 2.0)])
            .unwrap_err();
        match err {
            ValuationError::DuplicatePeriod { entity_id, period } => {
                assert_eq!(entity_id, "x");
                assert_eq!(period, "2016Q1");
            }
            other => panic!("expected DuplicatePeriod, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_and_non_finite_rejected() {
        assert!(CashFlowSeries::<u32>::from_raw("x", Vec::new()).is_err());
        assert!(CashFlowSeries::from_amounts("x", &[1.0, f64::NAN]).is_err());
    }

    #[test]
    fn test_mean_and_sample_std() {
        let series = CashFlowSeries::from_amounts("p", &[-100.0, 100.0, 200.0, 200.0]).unwrap();
        assert_eq!(series.mean(), 100.0);
        // deviations: -200, 0, 100, 100 -> ss = 60000, / 3
        assert!((series.std() - 20_000.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_period_returns() {
        let series = CashFlowSeries::from_amounts("p", &[-100.0, 50.0, 75.0]).unwrap();
        let r = series.period_returns().unwrap();
        assert_eq!(r, vec![-1.5, 0.5]);
    }

    #[test]
    fn test_period_returns_zero_guard() {
        let series = CashFlowSeries::from_amounts("p", &[-100.0, 0.0, 75.0]).unwrap();
        assert!(matches!(
            series.period_returns(),
            Err(ValuationError::DegenerateSeries { .. })
        ));
    }

    #[test]
    fn test_return_volatility_needs_two_flows() {
        let single = CashFlowSeries::from_amounts("p", &[-100.0]).unwrap();
        assert!(single.return_volatility().is_err());
        let flat = CashFlowSeries::from_amounts("p", &[100.0, -100.0, 100.0]).unwrap();
        // returns: (-100 - -100)/-100 = 0, (100 - -100)/-100 = -2
        assert!((flat.return_volatility().unwrap() - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_level_volatility() {
        let series = CashFlowSeries::from_amounts("p", &[-100.0, 100.0, 200.0, 200.0]).unwrap();
        let expected = 20_000.0_f64.sqrt() / 100.0;
        assert!((series.level_volatility().unwrap() - expected).abs() < 1e-12);
    }
}

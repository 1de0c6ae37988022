use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::str::FromStr;

use crate::error::ValuationError;
use crate::period::Quarter;
use crate::types::Rate;
use crate::ValuationResult;

// ---------------------------------------------------------------------------
// Raw input
// ---------------------------------------------------------------------------

/// A rate as delivered by a data source: numeric, or text such as `"4,25"` or `"4.25%"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawRate {
    Number(f64),
    Text(String),
}

impl From<f64> for RawRate {
    fn from(v: f64) -> Self {
        RawRate::Number(v)
    }
}

impl From<&str> for RawRate {
    fn from(v: &str) -> Self {
        RawRate::Text(v.to_string())
    }
}

/// Unit the numbers of an observation table are quoted in.
///
/// Text carrying a `%` suffix is always read as a percentage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateUnit {
    #[default]
    Decimal,
    Percent,
}

/// One dated rate observation (e.g. a daily 3-month T-bill quote).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateObservation {
    pub date: NaiveDate,
    pub value: RawRate,
}

impl RateObservation {
    pub fn new(date: NaiveDate, value: impl Into<RawRate>) -> Self {
        Self {
            date,
            value: value.into(),
        }
    }
}

/// A rate already keyed by period, as supplied in JSON inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint<P = Quarter> {
    pub period: P,
    pub rate: RawRate,
}

fn malformed(value: &RawRate, reason: &str) -> ValuationError {
    let value = match value {
        RawRate::Number(n) => n.to_string(),
        RawRate::Text(s) => s.clone(),
    };
    ValuationError::MalformedRate {
        value,
        reason: reason.into(),
    }
}

/// `1,000` or `12,500,000`: more than one comma, or a single comma with a
/// non-zero integer part and exactly three digits after it. `0,125` is a
/// comma decimal.
fn looks_like_thousands(body: &str) -> bool {
    let unsigned = body.trim_start_matches(['-', '+']);
    let mut groups = unsigned.split(',');
    let Some(head) = groups.next() else {
        return false;
    };
    let tail: Vec<&str> = groups.collect();
    match tail.as_slice() {
        [] => false,
        [one] => {
            one.len() == 3
                && one.chars().all(|c| c.is_ascii_digit())
                && head.trim_start_matches('0').chars().any(|c| c.is_ascii_digit())
        }
        _ => true,
    }
}

/// Normalise a raw quote into an exact decimal rate.
///
/// Comma decimal separators are rewritten to dots, `%` suffixes and
/// [`RateUnit::Percent`] tables are divided by 100. Negative rates are rejected.
pub fn normalize_rate(raw: &RawRate, unit: RateUnit) -> ValuationResult<Decimal> {
    let (value, percent) = match raw {
        RawRate::Number(n) => {
            let d = Decimal::try_from(*n).map_err(|_| malformed(raw, "not a finite number"))?;
            (d, unit == RateUnit::Percent)
        }
        RawRate::Text(s) => {
            let trimmed = s.trim();
            let (body, has_pct) = match trimmed.strip_suffix('%') {
                Some(b) => (b.trim_end(), true),
                None => (trimmed, false),
            };
            if !body.chars().any(|c| c.is_ascii_digit()) {
                return Err(malformed(raw, "no digits"));
            }
            if body.contains(',') && body.contains('.') {
                return Err(malformed(raw, "ambiguous decimal separator"));
            }
            if looks_like_thousands(body) {
                return Err(malformed(raw, "comma reads as a thousands separator"));
            }
            let body = body.replace(',', ".");
            let d = Decimal::from_str(&body)
                .or_else(|_| Decimal::from_scientific(&body))
                .map_err(|_| malformed(raw, "not numeric"))?;
            (d, has_pct || unit == RateUnit::Percent)
        }
    };

    let rate = if percent { value / dec!(100) } else { value };
    if rate.is_sign_negative() && !rate.is_zero() {
        return Err(malformed(raw, "rates must be non-negative"));
    }
    Ok(rate)
}

// ---------------------------------------------------------------------------
// Curve
// ---------------------------------------------------------------------------

/// Discount rates keyed by period, immutable once built.
///
/// Lookups for a period outside the curve carry the last known rate forward.
/// Periods before the first observation use the earliest rate.
#[derive(Debug, Clone, PartialEq)]
pub struct RateCurve<P = Quarter>
where
    P: Hash + Eq,
{
    points: Vec<(P, Rate)>,
    index: HashMap<P, usize>,
}

impl<P> RateCurve<P>
where
    P: Ord + Hash + Clone,
{
    fn from_sorted(points: Vec<(P, Rate)>) -> Self {
        let index = points
            .iter()
            .enumerate()
            .map(|(i, (p, _))| (p.clone(), i))
            .collect();
        Self { points, index }
    }

    /// Group dated observations by `period_key`, normalise and average each group.
    pub fn build<F>(
        observations: &[RateObservation],
        unit: RateUnit,
        period_key: F,
    ) -> ValuationResult<Self>
    where
        F: Fn(NaiveDate) -> P,
    {
        let mut groups: BTreeMap<P, (Decimal, u32)> = BTreeMap::new();
        for obs in observations {
            let rate = normalize_rate(&obs.value, unit)?;
            let entry = groups
                .entry(period_key(obs.date))
                .or_insert((Decimal::ZERO, 0));
            entry.0 += rate;
            entry.1 += 1;
        }

        let points = groups
            .into_iter()
            .map(|(period, (sum, count))| {
                let avg = sum / Decimal::from(count);
                let rate = avg.to_f64().ok_or_else(|| ValuationError::MalformedRate {
                    value: avg.to_string(),
                    reason: "not representable as f64".into(),
                })?;
                Ok((period, rate))
            })
            .collect::<ValuationResult<Vec<_>>>()?;

        Ok(Self::from_sorted(points))
    }

    /// Build from rates already keyed by period. Each period may appear once.
    pub fn from_rates<I>(rates: I) -> ValuationResult<Self>
    where
        I: IntoIterator<Item = (P, Rate)>,
    {
        let mut sorted: BTreeMap<P, Rate> = BTreeMap::new();
        for (period, rate) in rates {
            if !rate.is_finite() || rate < 0.0 {
                return Err(ValuationError::MalformedRate {
                    value: rate.to_string(),
                    reason: "rates must be finite and non-negative".into(),
                });
            }
            if sorted.insert(period, rate).is_some() {
                return Err(ValuationError::InvalidInput {
                    field: "rates".into(),
                    reason: "period listed more than once".into(),
                });
            }
        }
        Ok(Self::from_sorted(sorted.into_iter().collect()))
    }

    /// Build from period-keyed raw quotes, normalising each one.
    pub fn from_points(points: &[CurvePoint<P>], unit: RateUnit) -> ValuationResult<Self> {
        let rates = points
            .iter()
            .map(|pt| {
                let d = normalize_rate(&pt.rate, unit)?;
                let r = d.to_f64().ok_or_else(|| malformed(&pt.rate, "out of range"))?;
                Ok((pt.period.clone(), r))
            })
            .collect::<ValuationResult<Vec<_>>>()?;
        Self::from_rates(rates)
    }

    /// A single-point curve; carry-forward makes it constant everywhere.
    pub fn flat(period: P, rate: Rate) -> ValuationResult<Self> {
        Self::from_rates([(period, rate)])
    }

    pub fn rate_for(&self, period: &P) -> ValuationResult<Rate> {
        if let Some(&i) = self.index.get(period) {
            return Ok(self.points[i].1);
        }
        match self.points.partition_point(|(p, _)| p < period) {
            0 => self
                .points
                .first()
                .map(|(_, r)| *r)
                .ok_or(ValuationError::EmptyCurve),
            i => Ok(self.points[i - 1].1),
        }
    }

    /// Rate of the latest period on the curve.
    pub fn latest_rate(&self) -> Option<Rate> {
        self.points.last().map(|(_, r)| *r)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&P, Rate)> {
        self.points.iter().map(|(p, r)| (p, *r))
    }
}

impl RateCurve<Quarter> {
    /// Quarterly average of dated observations.
    pub fn quarterly(observations: &[RateObservation], unit: RateUnit) -> ValuationResult<Self> {
        Self::build(observations, unit, Quarter::from_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn q(label: &str) -> Quarter {
        label.parse().unwrap()
    }

    #[test]
    fn test_normalize_comma_decimal_percent_table() {
        let r = normalize_rate(&RawRate::from("4,25"), RateUnit::Percent).unwrap();
        assert_eq!(r, dec!(0.0425));
    }

    #[test]
    fn test_normalize_percent_suffix_overrides_decimal_unit() {
        let r = normalize_rate(&RawRate::from("1.5 %"), RateUnit::Decimal).unwrap();
        assert_eq!(r, dec!(0.015));
    }

    #[test]
    fn test_normalize_numeric_decimal_unchanged() {
        let r = normalize_rate(&RawRate::from(0.03), RateUnit::Decimal).unwrap();
        assert!((r.to_f64().unwrap() - 0.03).abs() < 1e-15);
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        for bad in ["abc", "", ".", "1,000.5", "-0.5"] {
            let err = normalize_rate(&RawRate::from(bad), RateUnit::Decimal).unwrap_err();
            assert!(
                matches!(err, ValuationError::MalformedRate { .. }),
                "expected MalformedRate for {bad:?}, got {err:?}"
            );
        }
        assert!(normalize_rate(&RawRate::from(f64::NAN), RateUnit::Decimal).is_err());
    }

    #[test]
    fn test_normalize_rejects_thousands_grouping() {
        for bad in ["1,000", "12,500", "1,000,000", "2,50,0"] {
            let err = normalize_rate(&RawRate::from(bad), RateUnit::Percent).unwrap_err();
            assert!(matches!(err, ValuationError::MalformedRate { .. }), "{bad:?}");
        }
        let leading_zero = normalize_rate(&RawRate::from("0,125"), RateUnit::Percent).unwrap();
        assert_eq!(leading_zero, dec!(0.00125));
        let two_decimals = normalize_rate(&RawRate::from("1,25"), RateUnit::Percent).unwrap();
        assert_eq!(two_decimals, dec!(0.0125));
    }

    #[test]
    fn test_build_averages_within_quarter() {
        let obs = vec![
            RateObservation::new(date(2015, 1, 5), "0,02"),
            RateObservation::new(date(2015, 2, 5), "0,04"),
            RateObservation::new(date(2015, 4, 5), 0.1),
        ];
        let curve = RateCurve::quarterly(&obs, RateUnit::Percent).unwrap();
        assert_eq!(curve.len(), 2);
        assert!((curve.rate_for(&q("2015Q1")).unwrap() - 0.0003).abs() < 1e-15);
        assert!((curve.rate_for(&q("2015Q2")).unwrap() - 0.001).abs() < 1e-15);
    }

    #[test]
    fn test_build_fails_on_malformed_observation() {
        let obs = vec![
            RateObservation::new(date(2015, 1, 5), "0.02"),
            RateObservation::new(date(2015, 2, 5), "n/a"),
        ];
        let err = RateCurve::quarterly(&obs, RateUnit::Decimal).unwrap_err();
        assert!(matches!(err, ValuationError::MalformedRate { .. }));
    }

    #[test]
    fn test_rate_for_carries_last_known_forward() {
        let curve =
            RateCurve::from_rates([(q("2016Q1"), 0.01), (q("2016Q3"), 0.02)]).unwrap();
        assert_eq!(curve.rate_for(&q("2016Q2")).unwrap(), 0.01);
        assert_eq!(curve.rate_for(&q("2018Q4")).unwrap(), 0.02);
    }

    #[test]
    fn test_rate_for_before_domain_uses_earliest() {
        let curve =
            RateCurve::from_rates([(q("2016Q1"), 0.01), (q("2016Q3"), 0.02)]).unwrap();
        assert_eq!(curve.rate_for(&q("2010Q1")).unwrap(), 0.01);
    }

    #[test]
    fn test_rate_for_empty_curve_fails() {
        let curve = RateCurve::<Quarter>::from_rates([]).unwrap();
        assert!(curve.is_empty());
        assert!(matches!(
            curve.rate_for(&q("2016Q1")),
            Err(ValuationError::EmptyCurve)
        ));
    }

    #[test]
    fn test_from_rates_rejects_duplicates_and_negatives() {
        assert!(RateCurve::from_rates([(1u32, 0.01), (1u32, 0.02)]).is_err());
        assert!(RateCurve::from_rates([(1u32, -0.01)]).is_err());
    }

    #[test]
    fn test_from_points_normalises_text() {
        let points = vec![
            CurvePoint {
                period: q("2020Q1"),
                rate: RawRate::from("1,5"),
            },
            CurvePoint {
                period: q("2020Q2"),
                rate: RawRate::from(2.0),
            },
        ];
        let curve = RateCurve::from_points(&points, RateUnit::Percent).unwrap();
        assert!((curve.rate_for(&q("2020Q1")).unwrap() - 0.015).abs() < 1e-15);
        assert!((curve.latest_rate().unwrap() - 0.02).abs() < 1e-15);
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use crate::error::ValuationError;
use crate::types::{with_metadata, ComputationOutput, Money};
use crate::ValuationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    InvestNow,
    Wait,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::InvestNow => write!(f, "INVEST_NOW"),
            Recommendation::Wait => write!(f, "WAIT"),
        }
    }
}

/// Invest now only when the project is worth strictly more than the option to wait.
pub fn recommend(npv: Money, option_value: Money) -> Recommendation {
    if npv > option_value {
        Recommendation::InvestNow
    } else {
        Recommendation::Wait
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionInput {
    pub npv: Money,
    pub option_value: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionOutput {
    pub recommendation: Recommendation,
    /// `npv - option_value`
    pub margin: Money,
}

pub fn decide(input: &DecisionInput) -> ValuationResult<ComputationOutput<DecisionOutput>> {
    let start = Instant::now();
    if !input.npv.is_finite() || !input.option_value.is_finite() {
        return Err(ValuationError::InvalidInput {
            field: "npv/option_value".into(),
            reason: "must be finite".into(),
        });
    }

    let mut warnings = Vec::new();
    if input.npv == input.option_value {
        warnings.push("NPV equals option value; ties resolve to WAIT".into());
    }
    let output = DecisionOutput {
        recommendation: recommend(input.npv, input.option_value),
        margin: input.npv - input.option_value,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Invest now vs. wait (NPV against value of waiting option)",
        &serde_json::json!({ "rule": "INVEST_NOW iff npv > option_value" }),
        warnings,
        elapsed,
        output,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tie_waits() {
        assert_eq!(recommend(10.0, 10.0), Recommendation::Wait);
        assert_eq!(recommend(0.0, 0.0), Recommendation::Wait);
    }

    #[test]
    fn test_monotone_in_npv() {
        let ov = 9.41;
        let mut invested = false;
        for step in 0..200 {
            let npv = step as f64 * 0.1;
            let rec = recommend(npv, ov);
            if invested {
                assert_eq!(rec, Recommendation::InvestNow, "flipped back at npv={npv}");
            }
            invested = rec == Recommendation::InvestNow;
        }
        assert!(invested);
    }

    #[test]
    fn test_serialized_names() {
        assert_eq!(
            serde_json::to_string(&Recommendation::InvestNow).unwrap(),
            "\"INVEST_NOW\""
        );
        assert_eq!(Recommendation::Wait.to_string(), "WAIT");
    }

    #[test]
    fn test_decide_margin_and_tie_warning() {
        let out = decide(&DecisionInput { npv: 5.0, option_value: 5.0 }).unwrap();
        assert_eq!(out.result.recommendation, Recommendation::Wait);
        assert_eq!(out.result.margin, 0.0);
        assert_eq!(out.warnings.len(), 1);
        assert!(decide(&DecisionInput { npv: f64::NAN, option_value: 1.0 }).is_err());
    }
}

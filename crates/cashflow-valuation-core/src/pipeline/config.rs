use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::monte_carlo::simulation::{default_discount_rate, default_num_periods, default_num_simulations};
use crate::rate_curve::RateUnit;
use crate::real_options::black_scholes::ZeroVolatilityPolicy;
use crate::types::{Rate, Years};
use crate::ValuationResult;

/// How the deterministic NPV of each entity is discounted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountBasis {
    /// Quarterly-averaged rate curve from the entity's rate observations.
    #[default]
    Curve,
    /// `discount_rate` for every period.
    Flat,
}

/// Which dispersion of the cash-flow history feeds the option volatility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityBasis {
    /// Sample std of period-over-period returns.
    #[default]
    PeriodReturns,
    /// Coefficient of variation of the amounts.
    Levels,
}

/// Parameters shared by every entity in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationConfig {
    #[serde(default)]
    pub discount_basis: DiscountBasis,
    /// Flat discount rate; also the Monte Carlo rate.
    #[serde(default = "default_discount_rate")]
    pub discount_rate: Rate,
    #[serde(default = "default_num_simulations")]
    pub num_simulations: u32,
    #[serde(default = "default_num_periods")]
    pub num_periods: u32,
    /// Run seed; each entity derives its own from it. Drawn at random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_time_to_decision")]
    pub time_to_decision: Years,
    /// Risk-free rate for the waiting option. Falls back to the latest
    /// curve rate, then to `discount_rate`.
    #[serde(default)]
    pub option_rate: Option<Rate>,
    #[serde(default)]
    pub volatility_basis: VolatilityBasis,
    #[serde(default)]
    pub zero_volatility_policy: ZeroVolatilityPolicy,
    /// Unit of unsuffixed numeric rate quotes.
    #[serde(default)]
    pub rate_unit: RateUnit,
}

fn default_time_to_decision() -> Years {
    1.0
}

impl Default for ValuationConfig {
    fn default() -> Self {
        Self {
            discount_basis: DiscountBasis::default(),
            discount_rate: default_discount_rate(),
            num_simulations: default_num_simulations(),
            num_periods: default_num_periods(),
            seed: None,
            time_to_decision: default_time_to_decision(),
            option_rate: None,
            volatility_basis: VolatilityBasis::default(),
            zero_volatility_policy: ZeroVolatilityPolicy::default(),
            rate_unit: RateUnit::default(),
        }
    }
}

impl ValuationConfig {
    /// Parse and validate a JSON document; missing fields take their defaults.
    pub fn from_json(text: &str) -> ValuationResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ValuationResult<()> {
        if !self.discount_rate.is_finite() || self.discount_rate <= -1.0 {
            return Err(invalid("discount_rate", "must be finite and greater than -100%"));
        }
        if self.num_simulations < 1 {
            return Err(ValuationError::InvalidSimulationParameters {
                field: "num_simulations".into(),
                reason: "Must be at least 1".into(),
            });
        }
        if self.num_periods < 1 {
            return Err(ValuationError::InvalidSimulationParameters {
                field: "num_periods".into(),
                reason: "Must be at least 1".into(),
            });
        }
        if !(self.time_to_decision > 0.0) || !self.time_to_decision.is_finite() {
            return Err(ValuationError::InvalidOptionParameters {
                field: "time_to_decision".into(),
                reason: "must be positive".into(),
            });
        }
        if let Some(r) = self.option_rate {
            if !r.is_finite() {
                return Err(ValuationError::InvalidOptionParameters {
                    field: "option_rate".into(),
                    reason: "must be finite".into(),
                });
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ValuationError {
    ValuationError::InvalidInput {
        field: field.into(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_json_is_default() {
        let config = ValuationConfig::from_json("{}").unwrap();
        assert_eq!(config, ValuationConfig::default());
        assert_eq!(config.num_simulations, 1_000);
        assert_eq!(config.discount_basis, DiscountBasis::Curve);
    }

    #[test]
    fn test_partial_json_overrides() {
        let config = ValuationConfig::from_json(
            r#"{"discount_basis": "flat", "seed": 7, "volatility_basis": "levels", "zero_volatility_policy": "fail"}"#,
        )
        .unwrap();
        assert_eq!(config.discount_basis, DiscountBasis::Flat);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.volatility_basis, VolatilityBasis::Levels);
        assert_eq!(config.zero_volatility_policy, ZeroVolatilityPolicy::Fail);
    }

    #[test]
    fn test_validation() {
        assert!(ValuationConfig::from_json(r#"{"num_simulations": 0}"#).is_err());
        assert!(ValuationConfig::from_json(r#"{"time_to_decision": 0.0}"#).is_err());
        assert!(ValuationConfig::from_json(r#"{"discount_rate": -1.0}"#).is_err());
        assert!(ValuationConfig::from_json("not json").is_err());
    }
}

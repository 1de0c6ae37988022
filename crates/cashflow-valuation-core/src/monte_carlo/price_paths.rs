use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use std::time::Instant;

use super::simulation::McPercentiles;
use crate::error::ValuationError;
use crate::stats;
use crate::types::{with_metadata, ComputationOutput, Rate, Years};
use crate::ValuationResult;

/// Geometric Brownian motion for the value of an underlying asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbmInput {
    #[serde(default = "default_initial_value")]
    pub initial_value: f64,
    /// Expected annual return (drift)
    #[serde(default = "default_drift")]
    pub drift: Rate,
    /// Annual volatility
    #[serde(default = "default_volatility")]
    pub volatility: Rate,
    #[serde(default = "default_horizon_years")]
    pub horizon_years: Years,
    /// Time steps per year; 252 is one per trading day.
    #[serde(default = "default_steps_per_year")]
    pub steps_per_year: u32,
    #[serde(default = "default_num_paths")]
    pub num_paths: u32,
    pub seed: Option<u64>,
}

fn default_initial_value() -> f64 {
    100.0
}
fn default_drift() -> Rate {
    0.05
}
fn default_volatility() -> Rate {
    0.2
}
fn default_horizon_years() -> Years {
    10.0
}
fn default_steps_per_year() -> u32 {
    252
}
fn default_num_paths() -> u32 {
    100
}

impl Default for GbmInput {
    fn default() -> Self {
        Self {
            initial_value: default_initial_value(),
            drift: default_drift(),
            volatility: default_volatility(),
            horizon_years: default_horizon_years(),
            steps_per_year: default_steps_per_year(),
            num_paths: default_num_paths(),
            seed: None,
        }
    }
}

/// Terminal-value statistics of the simulated paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePathSummary {
    pub num_paths: u32,
    pub num_steps: u32,
    pub terminal_mean: f64,
    pub terminal_std: f64,
    pub terminal_percentiles: McPercentiles,
    /// `S0 * exp(drift * T)`
    pub expected_terminal_value: f64,
    /// Lowest and highest value touched by any path.
    pub path_min: f64,
    pub path_max: f64,
}

/// Upper bound on time steps per path.
const MAX_STEPS: f64 = 1_000_000.0;

/// Check the inputs and return the number of time steps per path.
fn validate(input: &GbmInput) -> ValuationResult<u32> {
    let invalid = |field: &str, reason: &str| ValuationError::InvalidSimulationParameters {
        field: field.into(),
        reason: reason.into(),
    };
    if !input.initial_value.is_finite() || input.initial_value <= 0.0 {
        return Err(invalid("initial_value", "must be positive and finite"));
    }
    if !input.drift.is_finite() {
        return Err(invalid("drift", "must be finite"));
    }
    if !input.volatility.is_finite() || input.volatility < 0.0 {
        return Err(invalid("volatility", "must be non-negative and finite"));
    }
    if !input.horizon_years.is_finite() || input.horizon_years <= 0.0 {
        return Err(invalid("horizon_years", "must be positive and finite"));
    }
    if input.steps_per_year < 1 {
        return Err(invalid("steps_per_year", "must be at least 1"));
    }
    if input.num_paths < 1 {
        return Err(invalid("num_paths", "must be at least 1"));
    }
    let steps = (input.horizon_years * f64::from(input.steps_per_year)).round().max(1.0);
    if steps > MAX_STEPS {
        return Err(invalid(
            "horizon_years",
            &format!("horizon times steps_per_year exceeds {MAX_STEPS} steps per path"),
        ));
    }
    Ok(steps as u32)
}

/// Simulate `S(t+dt) = S(t) * exp((mu - sigma^2/2) dt + sigma sqrt(dt) Z)`.
///
/// Paths are generated one at a time and only their terminal values and extremes kept.
pub fn simulate_price_paths<R>(input: &GbmInput, rng: &mut R) -> ValuationResult<PricePathSummary>
where
    R: Rng + ?Sized,
{
    let num_steps = validate(input)?;

    let dt = 1.0 / input.steps_per_year as f64;
    let drift_step = (input.drift - 0.5 * input.volatility.powi(2)) * dt;
    let diffusion_step = input.volatility * dt.sqrt();
    let z = Normal::new(0.0, 1.0).map_err(|e| ValuationError::InvalidSimulationParameters {
        field: "distribution".into(),
        reason: format!("Invalid Normal parameters: {e}"),
    })?;

    let mut terminals = Vec::with_capacity(input.num_paths as usize);
    let mut path_min = f64::INFINITY;
    let mut path_max = f64::NEG_INFINITY;
    for _ in 0..input.num_paths {
        let mut s = input.initial_value;
        for _ in 0..num_steps {
            s *= (drift_step + diffusion_step * z.sample(rng)).exp();
            path_min = path_min.min(s);
            path_max = path_max.max(s);
        }
        terminals.push(s);
    }

    let terminal_mean = stats::mean(&terminals);
    let terminal_std = stats::sample_std(&terminals);
    terminals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    Ok(PricePathSummary {
        num_paths: input.num_paths,
        num_steps,
        terminal_mean,
        terminal_std,
        terminal_percentiles: McPercentiles::from_sorted(&terminals),
        expected_terminal_value: input.initial_value
            * (input.drift * num_steps as f64 * dt).exp(),
        path_min: path_min.min(input.initial_value),
        path_max: path_max.max(input.initial_value),
    })
}

pub fn run_price_path_simulation(
    input: &GbmInput,
) -> ValuationResult<ComputationOutput<PricePathSummary>> {
    let start = Instant::now();
    let mut warnings = Vec::new();

    let mut rng = match input.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => {
            warnings.push("No seed supplied; results are not reproducible".into());
            StdRng::from_entropy()
        }
    };
    let summary = simulate_price_paths(input, &mut rng)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Geometric Brownian motion price paths",
        &serde_json::json!({
            "initial_value": input.initial_value,
            "drift": input.drift,
            "volatility": input.volatility,
            "horizon_years": input.horizon_years,
            "steps_per_year": input.steps_per_year,
            "num_paths": input.num_paths,
            "seed": input.seed,
        }),
        warnings,
        elapsed,
        summary,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_volatility_grows_at_drift() {
        let input = GbmInput {
            volatility: 0.0,
            horizon_years: 2.0,
            steps_per_year: 12,
            num_paths: 3,
            ..GbmInput::default()
        };
        let out = simulate_price_paths(&input, &mut StdRng::seed_from_u64(1)).unwrap();
        let expected = 100.0 * (0.05_f64 * 2.0).exp();
        assert!((out.terminal_mean - expected).abs() < 1e-9);
        assert!(out.terminal_std.abs() < 1e-9);
        assert_eq!(out.num_steps, 24);
    }

    #[test]
    fn test_terminal_mean_near_expectation() {
        let input = GbmInput {
            horizon_years: 1.0,
            steps_per_year: 52,
            num_paths: 20_000,
            seed: Some(42),
            ..GbmInput::default()
        };
        let out = run_price_path_simulation(&input).unwrap().result;
        // std of terminal ~ 100 * e^0.05 * sqrt(e^0.04 - 1) ~ 21; SE ~ 0.15
        assert!(
            (out.terminal_mean - out.expected_terminal_value).abs() < 1.0,
            "mean={} expected={}",
            out.terminal_mean,
            out.expected_terminal_value
        );
        assert!(out.path_min > 0.0);
        assert!(out.path_min <= out.terminal_percentiles.p5);
        assert!(out.path_max >= out.terminal_percentiles.p95);
    }

    #[test]
    fn test_invalid_inputs() {
        let mut rng = StdRng::seed_from_u64(1);
        for bad in [
            GbmInput { initial_value: 0.0, ..GbmInput::default() },
            GbmInput { volatility: -0.1, ..GbmInput::default() },
            GbmInput { horizon_years: 0.0, ..GbmInput::default() },
            GbmInput { steps_per_year: 0, ..GbmInput::default() },
            GbmInput { num_paths: 0, ..GbmInput::default() },
            GbmInput { initial_value: f64::INFINITY, ..GbmInput::default() },
            GbmInput { volatility: f64::INFINITY, ..GbmInput::default() },
            GbmInput { drift: f64::NAN, ..GbmInput::default() },
        ] {
            assert!(simulate_price_paths(&bad, &mut rng).is_err());
        }
    }

    #[test]
    fn test_unbounded_horizon_rejected_before_simulating() {
        let mut rng = StdRng::seed_from_u64(1);
        for horizon_years in [f64::INFINITY, f64::NAN, 1e9] {
            let input = GbmInput { horizon_years, ..GbmInput::default() };
            assert!(matches!(
                simulate_price_paths(&input, &mut rng),
                Err(ValuationError::InvalidSimulationParameters { ref field, .. }) if field == "horizon_years"
            ));
        }
    }
}

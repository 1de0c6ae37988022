use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use std::time::Instant;
use tracing::debug;

use crate::cash_flow::CashFlowSeries;
use crate::error::ValuationError;
use crate::npv::flat_discount_factors;
use crate::stats;
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::ValuationResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Percentile summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McPercentiles {
    pub p5: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
}

impl McPercentiles {
    pub(crate) fn from_sorted(sorted: &[f64]) -> Self {
        McPercentiles {
            p5: stats::percentile_sorted(sorted, 5.0),
            p10: stats::percentile_sorted(sorted, 10.0),
            p25: stats::percentile_sorted(sorted, 25.0),
            p50: stats::percentile_sorted(sorted, 50.0),
            p75: stats::percentile_sorted(sorted, 75.0),
            p90: stats::percentile_sorted(sorted, 90.0),
            p95: stats::percentile_sorted(sorted, 95.0),
        }
    }
}

/// Sampling distribution of NPV for one entity from one simulation run.
///
/// Every statistic is computed from the same set of simulated NPVs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub entity_id: String,
    pub sample_size: u32,
    pub num_periods: u32,
    pub discount_rate: Rate,
    pub mean_npv: Money,
    /// Sample standard deviation (ddof = 1) across simulated NPVs.
    pub std_npv: Money,
    /// `std_npv / sqrt(sample_size)`
    pub standard_error: Money,
    /// 90% empirical interval (P5 to P95) of simulated NPVs.
    pub confidence_interval: (Money, Money),
    pub percentiles: McPercentiles,
    /// Mean and standard deviation of the fitted cash-flow distribution.
    pub cash_flow_mean: Money,
    pub cash_flow_std: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deterministic_npv: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volatility: Option<Rate>,
}

impl SimulationResult {
    /// Attach the deterministic NPV and volatility used downstream as option inputs.
    pub fn with_option_inputs(mut self, deterministic_npv: Money, volatility: Option<Rate>) -> Self {
        self.deterministic_npv = Some(deterministic_npv);
        self.volatility = volatility;
        self
    }
}

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Stable per-entity seed: FNV-1a of the entity id, mixed with the run seed.
///
/// Independent of thread scheduling and of the Rust release, so serial and
/// parallel batches draw identical numbers for the same entity.
pub fn derive_seed(run_seed: u64, entity_id: &str) -> u64 {
    let mut h = FNV_OFFSET ^ run_seed;
    for b in entity_id.as_bytes() {
        h ^= u64::from(*b);
        h = h.wrapping_mul(FNV_PRIME);
    }
    // splitmix64 finaliser
    h = (h ^ (h >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    h = (h ^ (h >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    h ^ (h >> 31)
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// Normal cash-flow sampler; a zero standard deviation always yields the mean.
enum CashFlowSampler {
    Constant(f64),
    Normal(Normal),
}

impl CashFlowSampler {
    fn fitted(mean: f64, std_dev: f64) -> ValuationResult<Self> {
        if std_dev == 0.0 {
            return Ok(CashFlowSampler::Constant(mean));
        }
        let n = Normal::new(mean, std_dev).map_err(|e| ValuationError::InvalidSimulationParameters {
            field: "distribution".into(),
            reason: format!("Invalid Normal parameters: {e}"),
        })?;
        Ok(CashFlowSampler::Normal(n))
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            CashFlowSampler::Constant(v) => *v,
            CashFlowSampler::Normal(n) => n.sample(rng),
        }
    }
}

fn validate_counts(num_simulations: u32, num_periods: u32) -> ValuationResult<()> {
    if num_simulations < 1 {
        return Err(ValuationError::InvalidSimulationParameters {
            field: "num_simulations".into(),
            reason: "Must be at least 1".into(),
        });
    }
    if num_periods < 1 {
        return Err(ValuationError::InvalidSimulationParameters {
            field: "num_periods".into(),
            reason: "Must be at least 1".into(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Public API: cash-flow resampling
// ---------------------------------------------------------------------------

/// Monte Carlo NPV distribution for `series`.
///
/// Each trial draws `num_periods` cash flows from Normal(series.mean(),
/// series.std()) and values them with the flat NPV at `discount_rate`. Only
/// the trial NPVs are retained, never the paths.
pub fn run<P, R>(
    series: &CashFlowSeries<P>,
    num_simulations: u32,
    num_periods: u32,
    discount_rate: Rate,
    rng: &mut R,
) -> ValuationResult<SimulationResult>
where
    R: Rng + ?Sized,
{
    validate_counts(num_simulations, num_periods)?;

    let cf_mean = series.mean();
    let cf_std = series.std();
    let sampler = CashFlowSampler::fitted(cf_mean, cf_std)?;
    let factors = flat_discount_factors(discount_rate, num_periods as usize)?;

    let mut npvs: Vec<f64> = Vec::with_capacity(num_simulations as usize);
    for _ in 0..num_simulations {
        let npv: f64 = factors.iter().map(|df| sampler.draw(rng) * df).sum();
        npvs.push(npv);
    }

    let mean_npv = stats::mean(&npvs);
    let std_npv = stats::sample_std(&npvs);
    npvs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let percentiles = McPercentiles::from_sorted(&npvs);

    debug!(
        entity_id = series.entity_id(),
        num_simulations,
        num_periods,
        mean_npv,
        std_npv,
        "cash flow simulation complete"
    );

    Ok(SimulationResult {
        entity_id: series.entity_id().to_string(),
        sample_size: num_simulations,
        num_periods,
        discount_rate,
        mean_npv,
        std_npv,
        standard_error: std_npv / (num_simulations as f64).sqrt(),
        confidence_interval: (percentiles.p5, percentiles.p95),
        percentiles,
        cash_flow_mean: cf_mean,
        cash_flow_std: cf_std,
        deterministic_npv: None,
        volatility: None,
    })
}

// ---------------------------------------------------------------------------
// Public API: JSON-facing NPV simulation
// ---------------------------------------------------------------------------

/// Input for a Monte Carlo NPV simulation of one cash-flow history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McNpvInput {
    #[serde(default = "default_entity_id")]
    pub entity_id: String,
    /// Historical cash flows in period order; the first is treated as the outlay.
    pub cash_flows: Vec<Money>,
    #[serde(default = "default_num_simulations")]
    pub num_simulations: u32,
    #[serde(default = "default_num_periods")]
    pub num_periods: u32,
    #[serde(default = "default_discount_rate")]
    pub discount_rate: Rate,
    /// Optional seed for reproducibility.
    pub seed: Option<u64>,
}

fn default_entity_id() -> String {
    "entity".to_string()
}

pub(crate) fn default_num_simulations() -> u32 {
    1_000
}

pub(crate) fn default_num_periods() -> u32 {
    10
}

pub(crate) fn default_discount_rate() -> Rate {
    0.05
}

pub fn run_npv_simulation(
    input: &McNpvInput,
) -> ValuationResult<ComputationOutput<SimulationResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let series = CashFlowSeries::from_amounts(input.entity_id.clone(), &input.cash_flows)?;
    if series.len() < 2 {
        warnings.push("Single cash flow: fitted standard deviation is zero".into());
    }

    let mut rng = match input.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => {
            warnings.push("No seed supplied; results are not reproducible".into());
            StdRng::from_entropy()
        }
    };

    let result = run(
        &series,
        input.num_simulations,
        input.num_periods,
        input.discount_rate,
        &mut rng,
    )?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Monte Carlo NPV (Normal resampling of cash flows)",
        &serde_json::json!({
            "num_simulations": input.num_simulations,
            "num_periods": input.num_periods,
            "discount_rate": input.discount_rate,
            "seed": input.seed,
            "std_convention": "sample (ddof = 1)",
        }),
        warnings,
        elapsed,
        result,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: u64 = 42;

    fn history() -> CashFlowSeries<u32> {
        CashFlowSeries::from_amounts("proj", &[-200.0, 120.0, 150.0, 90.0, 140.0]).unwrap()
    }

    #[test]
    fn test_seeded_reproducibility() {
        let s = history();
        let r1 = run(&s, 2_000, 8, 0.05, &mut StdRng::seed_from_u64(SEED)).unwrap();
        let r2 = run(&s, 2_000, 8, 0.05, &mut StdRng::seed_from_u64(SEED)).unwrap();
        assert_eq!(r1.mean_npv, r2.mean_npv);
        assert_eq!(r1.std_npv, r2.std_npv);
        assert_eq!(r1.confidence_interval, r2.confidence_interval);
    }

    #[test]
    fn test_different_seeds_differ() {
        let s = history();
        let r1 = run(&s, 500, 8, 0.05, &mut StdRng::seed_from_u64(1)).unwrap();
        let r2 = run(&s, 500, 8, 0.05, &mut StdRng::seed_from_u64(2)).unwrap();
        assert_ne!(r1.mean_npv, r2.mean_npv);
    }

    #[test]
    fn test_zero_counts_rejected() {
        let s = history();
        let mut rng = StdRng::seed_from_u64(SEED);
        assert!(matches!(
            run(&s, 0, 8, 0.05, &mut rng),
            Err(ValuationError::InvalidSimulationParameters { .. })
        ));
        assert!(matches!(
            run(&s, 10, 0, 0.05, &mut rng),
            Err(ValuationError::InvalidSimulationParameters { .. })
        ));
    }

    #[test]
    fn test_single_simulation_has_zero_spread() {
        let s = history();
        let r = run(&s, 1, 4, 0.05, &mut StdRng::seed_from_u64(SEED)).unwrap();
        assert_eq!(r.sample_size, 1);
        assert_eq!(r.std_npv, 0.0);
        assert_eq!(r.confidence_interval.0, r.confidence_interval.1);
    }

    #[test]
    fn test_constant_series_is_deterministic() {
        let s = CashFlowSeries::from_amounts("c", &[-100.0]).unwrap();
        let r = run(&s, 50, 3, 0.0, &mut StdRng::seed_from_u64(SEED)).unwrap();
        assert_eq!(r.mean_npv, -300.0);
        assert_eq!(r.std_npv, 0.0);
    }

    #[test]
    fn test_interval_brackets_mean() {
        let r = run(&history(), 5_000, 10, 0.05, &mut StdRng::seed_from_u64(SEED)).unwrap();
        let (lo, hi) = r.confidence_interval;
        assert!(lo < r.mean_npv && r.mean_npv < hi, "lo={lo} mean={} hi={hi}", r.mean_npv);
        let p = &r.percentiles;
        assert!(p.p5 <= p.p25 && p.p25 <= p.p50 && p.p50 <= p.p75 && p.p75 <= p.p95);
    }

    #[test]
    fn test_derive_seed_is_stable_and_entity_specific() {
        assert_eq!(derive_seed(7, "001004"), derive_seed(7, "001004"));
        assert_ne!(derive_seed(7, "001004"), derive_seed(7, "001045"));
        assert_ne!(derive_seed(7, "001004"), derive_seed(8, "001004"));
    }

    #[test]
    fn test_json_input_defaults() {
        let input: McNpvInput = serde_json::from_value(serde_json::json!({
            "cash_flows": [-1000.0, 300.0, 320.0, 280.0],
            "seed": 42
        }))
        .unwrap();
        assert_eq!(input.num_simulations, 1_000);
        assert_eq!(input.num_periods, 10);
        let out = run_npv_simulation(&input).unwrap();
        assert_eq!(out.result.sample_size, 1_000);
        assert!(out.warnings.is_empty());
        assert_eq!(out.metadata.precision, "ieee754_f64");
    }

    #[test]
    fn test_unseeded_run_warns() {
        let input = McNpvInput {
            entity_id: "x".into(),
            cash_flows: vec![-10.0, 5.0, 6.0],
            num_simulations: 10,
            num_periods: 2,
            discount_rate: 0.05,
            seed: None,
        };
        let out = run_npv_simulation(&input).unwrap();
        assert!(out.warnings.iter().any(|w| w.contains("reproducible")));
    }
}

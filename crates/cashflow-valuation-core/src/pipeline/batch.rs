use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::config::{DiscountBasis, ValuationConfig, VolatilityBasis};
use super::source::ValuationSource;
use crate::cash_flow::CashFlowSeries;
use crate::error::ValuationError;
use crate::monte_carlo::simulation::{self, derive_seed, SimulationResult};
use crate::npv::{npv_flat, npv_on_own_periods};
use crate::rate_curve::RateCurve;
use crate::real_options::black_scholes::{value_waiting_option, OptionInputs, OptionResult};
use crate::real_options::decision::{recommend, Recommendation};
use crate::types::{Money, Rate};
use crate::ValuationResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Everything computed for one successfully valued entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityValuation {
    pub entity_id: String,
    pub num_cash_flows: usize,
    pub deterministic_npv: Money,
    pub simulation: SimulationResult,
    /// Only estimated when the NPV is positive and the option is priced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volatility: Option<Rate>,
    /// Risk-free rate the waiting option was priced with.
    pub option_rate: Rate,
    pub option_value: Money,
    /// Absent when the NPV is not positive and the option is worthless.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option: Option<OptionResult>,
    pub recommendation: Recommendation,
    pub warnings: Vec<String>,
}

/// Why one entity could not be valued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFailure {
    pub entity_id: String,
    /// Machine-readable error kind, see [`ValuationError::kind`].
    pub kind: String,
    pub message: String,
}

impl EntityFailure {
    fn from_error(entity_id: &str, err: &ValuationError) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntityOutcome {
    Valued(EntityValuation),
    Failed(EntityFailure),
}

impl EntityOutcome {
    pub fn entity_id(&self) -> &str {
        match self {
            EntityOutcome::Valued(v) => &v.entity_id,
            EntityOutcome::Failed(f) => &f.entity_id,
        }
    }
}

/// Outcomes of one batch, one per entity, sorted by entity id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_seed: u64,
    pub config: ValuationConfig,
    pub outcomes: Vec<EntityOutcome>,
    pub computation_time_us: u64,
}

/// Flat per-entity record for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub entity_id: String,
    pub status: String,
    pub deterministic_npv: Option<Money>,
    pub mean_npv: Option<Money>,
    pub std_npv: Option<Money>,
    pub ci_lower: Option<Money>,
    pub ci_upper: Option<Money>,
    pub option_value: Option<Money>,
    pub recommendation: Option<Recommendation>,
    /// [`ValuationError::kind`] of a failed entity.
    pub error_kind: Option<String>,
    pub error: Option<String>,
}

/// NPV distribution summary handed to charting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationRow {
    pub entity_id: String,
    pub mean_npv: Money,
    pub std_npv: Money,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &EntityValuation> {
        self.outcomes.iter().filter_map(|o| match o {
            EntityOutcome::Valued(v) => Some(v),
            EntityOutcome::Failed(_) => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = &EntityFailure> {
        self.outcomes.iter().filter_map(|o| match o {
            EntityOutcome::Failed(f) => Some(f),
            EntityOutcome::Valued(_) => None,
        })
    }

    pub fn export_rows(&self) -> Vec<ExportRow> {
        let mut rows: Vec<ExportRow> = self
            .outcomes
            .iter()
            .map(|outcome| match outcome {
                EntityOutcome::Valued(v) => ExportRow {
                    entity_id: v.entity_id.clone(),
                    status: "valued".into(),
                    deterministic_npv: Some(v.deterministic_npv),
                    mean_npv: Some(v.simulation.mean_npv),
                    std_npv: Some(v.simulation.std_npv),
                    ci_lower: Some(v.simulation.confidence_interval.0),
                    ci_upper: Some(v.simulation.confidence_interval.1),
                    option_value: Some(v.option_value),
                    recommendation: Some(v.recommendation),
                    error_kind: None,
                    error: None,
                },
                EntityOutcome::Failed(f) => ExportRow {
                    entity_id: f.entity_id.clone(),
                    status: "failed".into(),
                    deterministic_npv: None,
                    mean_npv: None,
                    std_npv: None,
                    ci_lower: None,
                    ci_upper: None,
                    option_value: None,
                    recommendation: None,
                    error_kind: Some(f.kind.clone()),
                    error: Some(f.message.clone()),
                },
            })
            .collect();
        rows.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        rows
    }

    /// Mean and std of simulated NPV for the selected valued entities, in
    /// report order. Unknown or failed ids are skipped.
    pub fn visualization_rows<S: AsRef<str>>(&self, selected: &[S]) -> Vec<VisualizationRow> {
        self.succeeded()
            .filter(|v| selected.iter().any(|s| s.as_ref() == v.entity_id))
            .map(|v| VisualizationRow {
                entity_id: v.entity_id.clone(),
                mean_npv: v.simulation.mean_npv,
                std_npv: v.simulation.std_npv,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Per-entity valuation
// ---------------------------------------------------------------------------

/// Value a single entity: NPV, simulated distribution, waiting option, decision.
pub fn value_entity<S>(
    source: &S,
    entity_id: &str,
    config: &ValuationConfig,
    run_seed: u64,
) -> ValuationResult<EntityValuation>
where
    S: ValuationSource + ?Sized,
{
    let mut warnings = Vec::new();
    let series = CashFlowSeries::from_raw(entity_id, source.cash_flows(entity_id)?)?;

    let (deterministic_npv, latest_rate) = match config.discount_basis {
        DiscountBasis::Curve => {
            let observations = source.rate_observations(entity_id)?;
            let curve = RateCurve::quarterly(&observations, config.rate_unit)?;
            (npv_on_own_periods(&series, &curve)?, curve.latest_rate())
        }
        DiscountBasis::Flat => (npv_flat(&series, config.discount_rate)?, None),
    };

    let mut rng = StdRng::seed_from_u64(derive_seed(run_seed, entity_id));
    let sim = simulation::run(
        &series,
        config.num_simulations,
        config.num_periods,
        config.discount_rate,
        &mut rng,
    )?;
    if series.len() < 2 {
        warnings.push("Single cash flow: simulated NPV has no spread".to_string());
    }

    let option_rate = config
        .option_rate
        .or(latest_rate)
        .unwrap_or(config.discount_rate);

    let (option, volatility) = if deterministic_npv > 0.0 {
        let volatility = match config.volatility_basis {
            VolatilityBasis::PeriodReturns => series.return_volatility()?,
            VolatilityBasis::Levels => series.level_volatility()?,
        };
        let inputs = OptionInputs::waiting_option(
            deterministic_npv,
            config.time_to_decision,
            option_rate,
            volatility,
        );
        (Some(value_waiting_option(&inputs, config.zero_volatility_policy)?), Some(volatility))
    } else {
        warnings.push("Non-positive NPV; option to wait valued at zero".to_string());
        (None, None)
    };
    let option_value = option.as_ref().map_or(0.0, |o| o.value);
    let recommendation = recommend(deterministic_npv, option_value);

    debug!(
        entity_id,
        deterministic_npv,
        option_value,
        %recommendation,
        "entity valued"
    );

    Ok(EntityValuation {
        entity_id: entity_id.to_string(),
        num_cash_flows: series.len(),
        deterministic_npv,
        simulation: sim.with_option_inputs(deterministic_npv, volatility),
        volatility,
        option_rate,
        option_value,
        option,
        recommendation,
        warnings,
    })
}

fn evaluate<S>(source: &S, entity_id: &str, config: &ValuationConfig, run_seed: u64) -> EntityOutcome
where
    S: ValuationSource + ?Sized,
{
    match value_entity(source, entity_id, config, run_seed) {
        Ok(v) => EntityOutcome::Valued(v),
        Err(e) => {
            warn!(entity_id, kind = e.kind(), error = %e, "entity valuation failed");
            EntityOutcome::Failed(EntityFailure::from_error(entity_id, &e))
        }
    }
}

// ---------------------------------------------------------------------------
// Batch drivers
// ---------------------------------------------------------------------------

fn prepare<S>(source: &S, config: &ValuationConfig) -> ValuationResult<(Vec<String>, u64)>
where
    S: ValuationSource + ?Sized,
{
    config.validate()?;
    let mut ids = source.entity_ids()?;
    ids.sort();
    ids.dedup();

    let run_seed = match config.seed {
        Some(s) => s,
        None => {
            let s = rand::random::<u64>();
            warn!(run_seed = s, "no seed configured; drew a random run seed");
            s
        }
    };
    info!(entities = ids.len(), run_seed, "starting valuation batch");
    Ok((ids, run_seed))
}

fn finish(config: &ValuationConfig, run_seed: u64, outcomes: Vec<EntityOutcome>, start: Instant) -> BatchReport {
    let report = BatchReport {
        run_seed,
        config: config.clone(),
        outcomes,
        computation_time_us: start.elapsed().as_micros() as u64,
    };
    info!(
        valued = report.succeeded().count(),
        failed = report.failed().count(),
        "valuation batch complete"
    );
    report
}

/// Value every entity of `source` in turn.
///
/// Only source-level or configuration errors fail the call; per-entity errors
/// become [`EntityOutcome::Failed`] entries.
pub fn run_batch<S>(source: &S, config: &ValuationConfig) -> ValuationResult<BatchReport>
where
    S: ValuationSource + ?Sized,
{
    let start = Instant::now();
    let (ids, run_seed) = prepare(source, config)?;
    let outcomes = ids
        .iter()
        .map(|id| evaluate(source, id, config, run_seed))
        .collect();
    Ok(finish(config, run_seed, outcomes, start))
}

/// [`run_batch`] with entities fanned out over the rayon pool.
///
/// Seeds are derived per entity, so the report equals the serial one.
#[cfg(feature = "parallel")]
pub fn run_batch_parallel<S>(source: &S, config: &ValuationConfig) -> ValuationResult<BatchReport>
where
    S: ValuationSource + Sync + ?Sized,
{
    use rayon::prelude::*;

    let start = Instant::now();
    let (ids, run_seed) = prepare(source, config)?;
    let outcomes = ids
        .par_iter()
        .map(|id| evaluate(source, id, config, run_seed))
        .collect();
    Ok(finish(config, run_seed, outcomes, start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::Quarter;
    use crate::pipeline::source::InMemorySource;
    use crate::rate_curve::RateObservation;
    use chrono::NaiveDate;

    fn q(label: &str) -> Quarter {
        label.parse().unwrap()
    }

    fn source() -> InMemorySource {
        let d = |m| NaiveDate::from_ymd_opt(2020, m, 15).unwrap();
        let mut s = InMemorySource::new().with_rates(vec![
            RateObservation::new(d(1), "1,5"),
            RateObservation::new(d(2), "1,7"),
            RateObservation::new(d(5), "0,1"),
        ]);
        s.insert_cash_flows(
            "001004",
            vec![(q("2020Q1"), 500.0), (q("2020Q2"), 300.0), (q("2020Q3"), 320.0), (q("2020Q4"), 290.0)],
        );
        s.insert_cash_flows("001045", vec![(q("2020Q1"), -100.0), (q("2020Q2"), 20.0), (q("2020Q3"), 25.0)]);
        s
    }

    fn config() -> ValuationConfig {
        ValuationConfig {
            seed: Some(42),
            num_simulations: 200,
            rate_unit: crate::rate_curve::RateUnit::Percent,
            ..ValuationConfig::default()
        }
    }

    #[test]
    fn test_positive_npv_entity_gets_option_and_decision() {
        let report = run_batch(&source(), &config()).unwrap();
        assert_eq!(report.failed().count(), 0);
        let v = report.succeeded().find(|v| v.entity_id == "001004").unwrap();
        // Q1 average of 1.5% and 1.7%, Q2 0.1%, carried into Q3 and Q4
        let expected = -500.0 / 1.016 + 300.0 / 1.001_f64.powi(2) + 320.0 / 1.001_f64.powi(3)
            + 290.0 / 1.001_f64.powi(4);
        assert!((v.deterministic_npv - expected).abs() < 1e-9);
        assert!(v.option.is_some() && v.volatility.is_some());
        assert!((v.option_rate - 0.001).abs() < 1e-12);
        assert_eq!(v.recommendation, recommend(v.deterministic_npv, v.option_value));
    }

    #[test]
    fn test_non_positive_npv_option_is_zero() {
        let report = run_batch(&source(), &config()).unwrap();
        let v = report.succeeded().find(|v| v.entity_id == "001045").unwrap();
        assert!(v.deterministic_npv <= 0.0);
        assert_eq!(v.option_value, 0.0);
        assert!(v.option.is_none());
        assert_eq!(v.recommendation, Recommendation::Wait);
        assert!(v.warnings.iter().any(|w| w.contains("Non-positive")));
    }

    #[test]
    fn test_missing_rates_fail_only_that_entity() {
        let mut s = source();
        s.insert_rates("001045", Vec::new());
        let report = run_batch(&s, &config()).unwrap();
        let failures: Vec<_> = report.failed().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].entity_id, "001045");
        assert_eq!(failures[0].kind, "empty_curve");
        assert_eq!(report.succeeded().count(), 1);
    }

    #[test]
    fn test_flat_basis_ignores_rates() {
        let mut s = source();
        s.insert_rates("001045", Vec::new());
        let cfg = ValuationConfig {
            discount_basis: DiscountBasis::Flat,
            ..config()
        };
        let report = run_batch(&s, &cfg).unwrap();
        assert_eq!(report.failed().count(), 0);
        let v = report.succeeded().next().unwrap();
        assert_eq!(v.option_rate, cfg.discount_rate);
    }

    #[test]
    fn test_unpriced_option_needs_no_volatility() {
        let mut s = InMemorySource::new();
        s.insert_cash_flows("single", vec![(q("2020Q1"), 500.0)]);
        s.insert_cash_flows("zeromid", vec![(q("2020Q1"), 500.0), (q("2020Q2"), 0.0), (q("2020Q3"), 50.0)]);
        let cfg = ValuationConfig {
            discount_basis: DiscountBasis::Flat,
            ..config()
        };
        let report = run_batch(&s, &cfg).unwrap();
        assert_eq!(report.failed().count(), 0);
        for v in report.succeeded() {
            assert!(v.deterministic_npv < 0.0);
            assert_eq!(v.volatility, None);
            assert_eq!(v.recommendation, Recommendation::Wait);
        }
        let single = report.succeeded().find(|v| v.entity_id == "single").unwrap();
        assert!(single.warnings.iter().any(|w| w.contains("Single cash flow")));
    }

    #[test]
    fn test_failed_export_row_carries_kind() {
        let mut s = source();
        s.insert_rates("001045", Vec::new());
        let rows = run_batch(&s, &config()).unwrap().export_rows();
        let failed = rows.iter().find(|r| r.entity_id == "001045").unwrap();
        assert_eq!(failed.error_kind.as_deref(), Some("empty_curve"));
        let valued = rows.iter().find(|r| r.entity_id == "001004").unwrap();
        assert_eq!(valued.error_kind, None);
    }

    #[test]
    fn test_export_and_visualization_rows() {
        let mut s = source();
        s.insert_cash_flows("000001", Vec::new());
        let report = run_batch(&s, &config()).unwrap();
        let rows = report.export_rows();
        let ids: Vec<&str> = rows.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["000001", "001004", "001045"]);
        assert_eq!(rows[0].status, "failed");
        assert!(rows[0].error.is_some() && rows[0].mean_npv.is_none());
        assert_eq!(rows[1].status, "valued");

        let viz = report.visualization_rows(&["001045", "000001", "nope"]);
        assert_eq!(viz.len(), 1);
        assert_eq!(viz[0].entity_id, "001045");
    }

    #[test]
    fn test_invalid_config_fails_whole_batch() {
        let cfg = ValuationConfig {
            num_periods: 0,
            ..config()
        };
        assert!(run_batch(&source(), &cfg).is_err());
    }
}

use std::collections::{BTreeMap, HashMap};

use crate::error::ValuationError;
use crate::period::Quarter;
use crate::rate_curve::RateObservation;
use crate::types::Money;
use crate::ValuationResult;

/// Where a batch reads its per-entity inputs from.
///
/// Errors returned for one entity id fail that entity only.
pub trait ValuationSource {
    /// Every entity id the source can value.
    fn entity_ids(&self) -> ValuationResult<Vec<String>>;

    /// Raw `(period, amount)` pairs, in any order.
    fn cash_flows(&self, entity_id: &str) -> ValuationResult<Vec<(Quarter, Money)>>;

    /// Dated rate observations used to build the entity's discount curve.
    fn rate_observations(&self, entity_id: &str) -> ValuationResult<Vec<RateObservation>>;
}

/// A source held entirely in memory, with one shared rate series and
/// optional per-entity overrides.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    cash_flows: BTreeMap<String, Vec<(Quarter, Money)>>,
    rates: Vec<RateObservation>,
    rate_overrides: HashMap<String, Vec<RateObservation>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rates(mut self, rates: Vec<RateObservation>) -> Self {
        self.rates = rates;
        self
    }

    pub fn insert_cash_flows(&mut self, entity_id: impl Into<String>, flows: Vec<(Quarter, Money)>) {
        self.cash_flows.insert(entity_id.into(), flows);
    }

    /// Rates used for `entity_id` instead of the shared series.
    pub fn insert_rates(&mut self, entity_id: impl Into<String>, rates: Vec<RateObservation>) {
        self.rate_overrides.insert(entity_id.into(), rates);
    }
}

impl ValuationSource for InMemorySource {
    fn entity_ids(&self) -> ValuationResult<Vec<String>> {
        Ok(self.cash_flows.keys().cloned().collect())
    }

    fn cash_flows(&self, entity_id: &str) -> ValuationResult<Vec<(Quarter, Money)>> {
        self.cash_flows
            .get(entity_id)
            .cloned()
            .ok_or_else(|| ValuationError::DataRetrieval(format!("no cash flows for '{entity_id}'")))
    }

    fn rate_observations(&self, entity_id: &str) -> ValuationResult<Vec<RateObservation>> {
        Ok(self
            .rate_overrides
            .get(entity_id)
            .unwrap_or(&self.rates)
            .clone())
    }
}

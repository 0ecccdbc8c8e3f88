//! Simulation metrics.

use std::collections::BTreeMap;

use serde::Serialize;

use assetbank_common::UnitAmount;
use assetbank_engine::{Bank, MetricsSnapshot};

/// Outcome label for a successful operation.
pub const OK: &str = "OK";

/// Per-scenario outcome counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationMetrics {
    /// Operations attempted.
    pub operations: u64,
    /// Outcomes by error code, `OK` for committed operations.
    pub outcomes: BTreeMap<String, u64>,
    /// Steps whose outcome or assertion did not match.
    pub expectation_failures: Vec<String>,
}

impl SimulationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one operation outcome.
    pub fn record(&mut self, outcome: &str) {
        self.operations += 1;
        *self.outcomes.entry(outcome.to_string()).or_insert(0) += 1;
    }

    pub fn record_mismatch(&mut self, message: String) {
        self.expectation_failures.push(message);
    }

    pub fn committed(&self) -> u64 {
        self.outcomes.get(OK).copied().unwrap_or(0)
    }

    pub fn rejected(&self) -> u64 {
        self.operations - self.committed()
    }
}

/// Final report for one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub pricing: String,
    pub simulation: SimulationMetrics,
    pub bank: MetricsSnapshot,
    pub aggregate: UnitAmount,
    pub deposits: u64,
    pub withdrawals: u64,
    /// Outcomes of calls wallets made back into the bank.
    pub reentry_outcomes: Vec<String>,
    pub invariants_hold: bool,
}

impl ScenarioReport {
    pub fn new(scenario: &str, bank: &Bank, simulation: SimulationMetrics) -> Self {
        Self {
            scenario: scenario.to_string(),
            pricing: bank.strategy().to_string(),
            simulation,
            bank: bank.metrics().snapshot(),
            aggregate: bank.aggregate_unit_balance(),
            deposits: bank.deposit_count(),
            withdrawals: bank.withdraw_count(),
            reentry_outcomes: Vec::new(),
            invariants_hold: bank.verify_invariants(),
        }
    }

    pub fn with_reentries(mut self, outcomes: Vec<String>) -> Self {
        self.reentry_outcomes = outcomes;
        self
    }

    pub fn passed(&self) -> bool {
        self.invariants_hold && self.simulation.expectation_failures.is_empty()
    }
}

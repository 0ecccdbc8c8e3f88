//! Simulation scenarios.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// A simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Valuation strategy the bank is built with.
    #[serde(default)]
    pub pricing: Pricing,
    /// Aggregate capacity in whole units.
    #[serde(default = "default_capacity")]
    pub capacity: String,
    /// Single-withdrawal ceiling in whole units.
    #[serde(default = "default_max_withdraw")]
    pub max_withdraw: String,
    /// Steps in the scenario.
    pub steps: Vec<ScenarioStep>,
}

fn default_capacity() -> String {
    "1000000".to_string()
}

fn default_max_withdraw() -> String {
    "10000".to_string()
}

/// Valuation strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pricing {
    #[default]
    Oracle,
    Exchange,
}

/// A step in a scenario.
///
/// Amounts are decimal strings: asset units for deposits and wallets,
/// canonical units for withdrawals and ledger balances. `expect` names the
/// error code an operation must fail with; absent means it must succeed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioStep {
    /// Mint `amount` into the holder's wallet and deposit it.
    Deposit {
        holder: String,
        asset: String,
        amount: String,
        #[serde(default)]
        expect: Option<String>,
    },
    /// Withdraw canonical units, delivered in `asset`.
    Withdraw {
        holder: String,
        asset: String,
        units: String,
        #[serde(default)]
        expect: Option<String>,
    },
    /// Authorize the bank to pull from the holder's wallet.
    Approve {
        holder: String,
        asset: String,
        amount: String,
    },
    /// Send value without using a deposit entry point.
    SendUnsolicited {
        holder: String,
        amount: String,
        #[serde(default)]
        expect: Option<String>,
    },
    /// Make the next delivery through `via` call back into the bank with a
    /// withdrawal of `units` in `asset`.
    ArmReentry {
        via: String,
        asset: String,
        units: String,
    },
    /// Publish an oracle price for `base`/USD with 8 decimals.
    SetPrice { base: String, price: String },
    /// Run randomly generated operations.
    RandomWalk { steps: usize },
    /// Assert a condition.
    Assert { condition: AssertCondition },
}

/// Conditions that can be asserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum AssertCondition {
    /// Account canonical balance equals.
    UnitBalance { holder: String, units: String },
    /// Aggregate canonical balance equals.
    Aggregate { units: String },
    /// Committed deposits so far.
    DepositCount { count: u64 },
    /// Committed withdrawals so far.
    WithdrawCount { count: u64 },
    /// Holder's wallet balance of an asset equals.
    WalletBalance {
        holder: String,
        asset: String,
        amount: String,
    },
    /// Conservation and capacity hold.
    InvariantsHold,
}

impl Scenario {
    /// Names of the built-in scenarios.
    pub const BUILTIN: &'static [&'static str] = &[
        "capacity-breach",
        "oracle-deposit",
        "partial-withdraw",
        "zero-amount",
        "precision-mismatch",
        "unsolicited-value",
        "price-failure",
        "reentrancy",
        "exchange-round-trip",
        "random-walk",
    ];

    /// Load a built-in scenario by name, or a JSON scenario file by path.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "capacity-breach" => Ok(Self::capacity_breach()),
            "oracle-deposit" => Ok(Self::oracle_deposit()),
            "partial-withdraw" => Ok(Self::partial_withdraw()),
            "zero-amount" => Ok(Self::zero_amount()),
            "precision-mismatch" => Ok(Self::precision_mismatch()),
            "unsolicited-value" => Ok(Self::unsolicited_value()),
            "price-failure" => Ok(Self::price_failure()),
            "reentrancy" => Ok(Self::reentrancy()),
            "exchange-round-trip" => Ok(Self::exchange_round_trip()),
            "random-walk" => Ok(Self::random_walk()),
            path if Path::new(path).extension().is_some_and(|ext| ext == "json") => {
                let contents = std::fs::read_to_string(path)?;
                Ok(serde_json::from_str(&contents)?)
            }
            _ => Err(anyhow::anyhow!("Unknown scenario: {}", name)),
        }
    }

    /// Every built-in scenario.
    pub fn all() -> Vec<Self> {
        Self::BUILTIN
            .iter()
            .filter_map(|name| Self::load(name).ok())
            .collect()
    }

    fn new(name: &str, description: &str, steps: Vec<ScenarioStep>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            pricing: Pricing::Oracle,
            capacity: default_capacity(),
            max_withdraw: default_max_withdraw(),
            steps,
        }
    }

    fn with_limits(mut self, capacity: &str, max_withdraw: &str) -> Self {
        self.capacity = capacity.to_string();
        self.max_withdraw = max_withdraw.to_string();
        self
    }

    fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    /// A deposit worth more than the capacity changes nothing.
    fn capacity_breach() -> Self {
        Self::new(
            "capacity-breach",
            "Deposit above the aggregate capacity is rejected and refunded",
            vec![
                deposit("alice", "ETH", "1", Some("EXCEEDS_BANK_CAPACITY")),
                assert(AssertCondition::Aggregate { units: "0".into() }),
                assert(AssertCondition::DepositCount { count: 0 }),
                assert(wallet("alice", "ETH", "1")),
            ],
        )
        .with_limits("1000", "1000")
    }

    fn oracle_deposit() -> Self {
        Self::new(
            "oracle-deposit",
            "One ether at 2000 USD credits 2000 units",
            vec![
                deposit("alice", "ETH", "1", None),
                assert(unit_balance("alice", "2000")),
                assert(AssertCondition::DepositCount { count: 1 }),
            ],
        )
    }

    fn partial_withdraw() -> Self {
        Self::new(
            "partial-withdraw",
            "Withdraw half of an ether deposit as USDC",
            vec![
                deposit("alice", "ETH", "1", None),
                withdraw("alice", "USDC", "1000", None),
                assert(unit_balance("alice", "1000")),
                assert(AssertCondition::Aggregate {
                    units: "1000".into(),
                }),
                assert(wallet("alice", "USDC", "1000")),
            ],
        )
    }

    fn zero_amount() -> Self {
        Self::new(
            "zero-amount",
            "Zero deposits are rejected for every asset",
            vec![
                deposit("alice", "ETH", "0", Some("INVALID_AMOUNT")),
                deposit("alice", "USDC", "0", Some("INVALID_AMOUNT")),
                assert(AssertCondition::DepositCount { count: 0 }),
                assert(AssertCondition::Aggregate { units: "0".into() }),
            ],
        )
    }

    fn precision_mismatch() -> Self {
        Self::new(
            "precision-mismatch",
            "A withdrawal finer than USDC precision is rejected",
            vec![
                deposit("alice", "ETH", "1", None),
                withdraw(
                    "alice",
                    "USDC",
                    "500.000000000000000001",
                    Some("PRECISION_MISMATCH"),
                ),
                assert(unit_balance("alice", "2000")),
                assert(AssertCondition::WithdrawCount { count: 0 }),
            ],
        )
    }

    fn unsolicited_value() -> Self {
        Self::new(
            "unsolicited-value",
            "Value sent outside a deposit entry point is rejected",
            vec![
                ScenarioStep::SendUnsolicited {
                    holder: "alice".into(),
                    amount: "1".into(),
                    expect: Some("INVALID_DEPOSIT_PATH".into()),
                },
                assert(AssertCondition::Aggregate { units: "0".into() }),
            ],
        )
    }

    fn price_failure() -> Self {
        Self::new(
            "price-failure",
            "A non-positive oracle price rejects deposits and refunds them",
            vec![
                ScenarioStep::SetPrice {
                    base: "ETH".into(),
                    price: "0".into(),
                },
                deposit("alice", "ETH", "1", Some("INVALID_PRICE_QUOTE")),
                assert(wallet("alice", "ETH", "1")),
                ScenarioStep::SetPrice {
                    base: "ETH".into(),
                    price: "2500".into(),
                },
                deposit("alice", "ETH", "1", None),
                assert(unit_balance("alice", "2500")),
            ],
        )
    }

    fn reentrancy() -> Self {
        Self::new(
            "reentrancy",
            "A wallet that withdraws again from inside a delivery is reverted",
            vec![
                deposit("mallory", "USDC", "1000", None),
                ScenarioStep::Approve {
                    holder: "mallory".into(),
                    asset: "USDC".into(),
                    amount: "1000".into(),
                },
                ScenarioStep::ArmReentry {
                    via: "USDC".into(),
                    asset: "USDC".into(),
                    units: "100".into(),
                },
                withdraw("mallory", "USDC", "500", Some("REENTRANCY_DETECTED")),
                assert(unit_balance("mallory", "1000")),
                assert(AssertCondition::WithdrawCount { count: 0 }),
                assert(wallet("mallory", "USDC", "0")),
                withdraw("mallory", "USDC", "500", None),
                assert(unit_balance("mallory", "500")),
            ],
        )
    }

    fn exchange_round_trip() -> Self {
        Self::new(
            "exchange-round-trip",
            "Deposits are swapped into USDC and withdrawals swapped back out",
            vec![
                deposit("alice", "ETH", "1", None),
                assert(unit_balance("alice", "2000")),
                withdraw("alice", "ETH", "500", None),
                assert(wallet("alice", "ETH", "0.25")),
                deposit("bob", "WBTC", "0.1", None),
                assert(unit_balance("bob", "6000")),
                withdraw("bob", "USDC", "1000", None),
                assert(unit_balance("bob", "5000")),
                assert(AssertCondition::Aggregate {
                    units: "6500".into(),
                }),
            ],
        )
        .with_pricing(Pricing::Exchange)
    }

    fn random_walk() -> Self {
        Self::new(
            "random-walk",
            "Random deposits and withdrawals keep every invariant",
            vec![
                ScenarioStep::RandomWalk { steps: 250 },
                assert(AssertCondition::InvariantsHold),
            ],
        )
        .with_limits("50000", "5000")
    }
}

fn deposit(holder: &str, asset: &str, amount: &str, expect: Option<&str>) -> ScenarioStep {
    ScenarioStep::Deposit {
        holder: holder.into(),
        asset: asset.into(),
        amount: amount.into(),
        expect: expect.map(Into::into),
    }
}

fn withdraw(holder: &str, asset: &str, units: &str, expect: Option<&str>) -> ScenarioStep {
    ScenarioStep::Withdraw {
        holder: holder.into(),
        asset: asset.into(),
        units: units.into(),
        expect: expect.map(Into::into),
    }
}

fn assert(condition: AssertCondition) -> ScenarioStep {
    ScenarioStep::Assert { condition }
}

fn unit_balance(holder: &str, units: &str) -> AssertCondition {
    AssertCondition::UnitBalance {
        holder: holder.into(),
        units: units.into(),
    }
}

fn wallet(holder: &str, asset: &str, amount: &str) -> AssertCondition {
    AssertCondition::WalletBalance {
        holder: holder.into(),
        asset: asset.into(),
        amount: amount.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_load() {
        assert_eq!(Scenario::all().len(), Scenario::BUILTIN.len());
        assert!(Scenario::load("no-such-scenario").is_err());
    }

    #[test]
    fn test_scenario_json_defaults() {
        let json = r#"{
            "name": "custom",
            "description": "from a file",
            "steps": [
                { "action": "deposit", "holder": "alice", "asset": "USDC", "amount": "10" },
                { "action": "assert", "condition": { "check": "invariants_hold" } }
            ]
        }"#;

        let scenario: Scenario = serde_json::from_str(json).unwrap();
        assert_eq!(scenario.pricing, Pricing::Oracle);
        assert_eq!(scenario.capacity, "1000000");
        assert!(matches!(
            &scenario.steps[0],
            ScenarioStep::Deposit { expect: None, .. }
        ));
    }
}

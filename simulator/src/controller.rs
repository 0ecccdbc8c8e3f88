//! Simulation controller.

use std::str::FromStr;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use assetbank_common::convert;
use assetbank_common::{AssetKind, AssetSpec, BankError, HolderId, UnitAmount};
use assetbank_engine::{Bank, BankConfig};
use assetbank_pricing::{
    ExchangeValuation, ExchangeValuationConfig, MockExchange, MockPriceOracle, OracleValuation,
    OracleValuationConfig, PricePair, SlippageFloor, Valuation,
};

use crate::holders::{Reentry, Wallets};
use crate::metrics::{ScenarioReport, SimulationMetrics, OK};
use crate::scenario::{AssertCondition, Pricing, Scenario, ScenarioStep};

/// Oracle answers carry 8 decimals.
const PRICE_DECIMALS: u8 = 8;
const PRICE_SCALE: i128 = 100_000_000;

const ETH_USD: i128 = 2_000;
const BTC_USD: i128 = 60_000;

/// A bank wired to simulated collaborators.
struct Environment {
    bank: Arc<Bank>,
    wallets: Wallets,
    oracle: Arc<MockPriceOracle>,
}

impl Environment {
    fn build(scenario: &Scenario) -> anyhow::Result<Self> {
        let config = BankConfig {
            capacity: parse_units(&scenario.capacity)?,
            max_withdraw_per_op: parse_units(&scenario.max_withdraw)?,
            ..BankConfig::default()
        }
        .with_asset(AssetSpec::wbtc());

        let native = config.native_asset.kind.clone();
        let reserve = config.reserve_asset.clone();
        let wbtc = AssetSpec::wbtc();

        let oracle = Arc::new(MockPriceOracle::new("simulated-feed"));
        oracle.set_price(PricePair::new("ETH", "USD"), ETH_USD * PRICE_SCALE, PRICE_DECIMALS);
        oracle.set_price(PricePair::new("BTC", "USD"), BTC_USD * PRICE_SCALE, PRICE_DECIMALS);

        let valuation = match scenario.pricing {
            Pricing::Oracle => {
                let prices = OracleValuationConfig::default()
                    .with_feed(native, PricePair::new("ETH", "USD"))
                    .with_feed(wbtc.kind.clone(), PricePair::new("BTC", "USD"))
                    .with_par(reserve.kind.clone());
                Valuation::Oracle(OracleValuation::new(oracle.clone(), prices))
            }
            Pricing::Exchange => {
                let exchange = Arc::new(MockExchange::new("simulated-pool"));
                let one_usd = 10u128.pow(reserve.decimals.get() as u32);
                let one_eth = 10u128.pow(config.native_asset.decimals.get() as u32);
                let one_btc = 10u128.pow(wbtc.decimals.get() as u32);

                exchange.set_rate(native.clone(), reserve.kind.clone(), ETH_USD as u128 * one_usd, one_eth);
                exchange.set_rate(reserve.kind.clone(), native, one_eth, ETH_USD as u128 * one_usd);
                exchange.set_rate(wbtc.kind.clone(), reserve.kind.clone(), BTC_USD as u128 * one_usd, one_btc);
                exchange.set_rate(reserve.kind.clone(), wbtc.kind.clone(), one_btc, BTC_USD as u128 * one_usd);

                Valuation::Exchange(ExchangeValuation::new(
                    exchange,
                    ExchangeValuationConfig {
                        reserve_asset: reserve,
                        slippage: SlippageFloor::default(),
                    },
                ))
            }
        };

        let wallets = Wallets::new(config.all_assets());
        let bank = Arc::new(Bank::new(config, valuation, wallets.custody())?);
        wallets.bind(&bank);

        Ok(Self {
            bank,
            wallets,
            oracle,
        })
    }

    /// Look up a configured asset by symbol.
    fn asset(&self, symbol: &str) -> anyhow::Result<AssetSpec> {
        self.bank
            .config()
            .all_assets()
            .find(|a| a.symbol.eq_ignore_ascii_case(symbol))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown asset {}", symbol))
    }

    /// Mint `raw` into the holder's wallet, then deposit it.
    async fn deposit(
        &self,
        holder: &HolderId,
        spec: &AssetSpec,
        raw: u128,
    ) -> anyhow::Result<Result<(), BankError>> {
        let wallets = self.wallets.endpoint(&spec.kind)?.wallets();
        wallets.fund(holder, raw);

        let result = match &spec.kind {
            AssetKind::Native => {
                wallets.attach(holder, raw);
                self.bank.deposit_native(holder, raw).await
            }
            AssetKind::Token(id) => {
                wallets.approve(holder, raw);
                self.bank.deposit_asset(holder, id, raw).await
            }
        };
        Ok(result.map(|_| ()))
    }
}

/// Controls the simulation.
pub struct SimulationController {
    /// Random number generator.
    rng: StdRng,
    /// Holders used by random walks.
    holders: Vec<HolderId>,
}

impl SimulationController {
    /// Create a new simulation controller.
    pub fn new(seed: Option<u64>, holder_count: usize) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        Self {
            rng,
            holders: (0..holder_count.max(1))
                .map(|i| HolderId::new(format!("holder_{}", i)))
                .collect(),
        }
    }

    /// Run a scenario against a fresh bank.
    pub async fn run_scenario(&mut self, scenario: &Scenario) -> anyhow::Result<ScenarioReport> {
        info!("Running scenario: {} - {}", scenario.name, scenario.description);

        let env = Environment::build(scenario)?;
        let mut metrics = SimulationMetrics::new();

        for step in &scenario.steps {
            self.execute_step(&env, step, &mut metrics).await?;
        }

        let report = ScenarioReport::new(&scenario.name, &env.bank, metrics)
            .with_reentries(env.wallets.reentry_outcomes());
        info!(
            scenario = %report.scenario,
            operations = report.simulation.operations,
            committed = report.simulation.committed(),
            rejected = report.simulation.rejected(),
            aggregate = %report.aggregate,
            passed = report.passed(),
            "Scenario complete"
        );
        Ok(report)
    }

    /// Execute a single scenario step.
    async fn execute_step(
        &mut self,
        env: &Environment,
        step: &ScenarioStep,
        metrics: &mut SimulationMetrics,
    ) -> anyhow::Result<()> {
        match step {
            ScenarioStep::Deposit {
                holder,
                asset,
                amount,
                expect,
            } => {
                let spec = env.asset(asset)?;
                let raw = parse_native(amount, &spec)?;
                let holder = HolderId::new(holder.as_str());

                let result = env.deposit(&holder, &spec, raw).await?;
                let label = format!("deposit {} {} by {}", amount, spec.symbol, holder);
                check_outcome(metrics, &label, result, expect.as_deref());
            }
            ScenarioStep::Withdraw {
                holder,
                asset,
                units,
                expect,
            } => {
                let spec = env.asset(asset)?;
                let holder = HolderId::new(holder.as_str());

                let result = env
                    .bank
                    .withdraw(&holder, &spec.kind, parse_units(units)?)
                    .await;
                let label = format!("withdraw {} units as {} by {}", units, spec.symbol, holder);
                check_outcome(metrics, &label, result, expect.as_deref());
            }
            ScenarioStep::Approve {
                holder,
                asset,
                amount,
            } => {
                let spec = env.asset(asset)?;
                env.wallets
                    .endpoint(&spec.kind)?
                    .wallets()
                    .approve(&HolderId::new(holder.as_str()), parse_native(amount, &spec)?);
            }
            ScenarioStep::SendUnsolicited {
                holder,
                amount,
                expect,
            } => {
                let native = env.bank.config().native_asset.clone();
                let holder = HolderId::new(holder.as_str());

                let result = env
                    .bank
                    .receive_unsolicited(&holder, parse_native(amount, &native)?);
                let label = format!("unsolicited {} {} from {}", amount, native.symbol, holder);
                check_outcome(metrics, &label, result, expect.as_deref());
            }
            ScenarioStep::ArmReentry { via, asset, units } => {
                let endpoint = env.wallets.endpoint(&env.asset(via)?.kind)?;
                endpoint.arm(Reentry {
                    asset: env.asset(asset)?.kind,
                    units: parse_units(units)?,
                });
                info!("Armed {} wallet to re-enter with {} units", via, units);
            }
            ScenarioStep::SetPrice { base, price } => {
                env.oracle.set_price(
                    PricePair::new(base.as_str(), "USD"),
                    parse_price(price)?,
                    PRICE_DECIMALS,
                );
                info!("Oracle price for {}/USD set to {}", base, price);
            }
            ScenarioStep::RandomWalk { steps } => {
                self.random_walk(env, *steps, metrics).await?;
            }
            ScenarioStep::Assert { condition } => {
                check_condition(env, condition, metrics)?;
            }
        }

        Ok(())
    }

    /// Random deposits and withdrawals. Fails as soon as an invariant breaks.
    async fn random_walk(
        &mut self,
        env: &Environment,
        steps: usize,
        metrics: &mut SimulationMetrics,
    ) -> anyhow::Result<()> {
        let assets: Vec<AssetSpec> = env.bank.config().all_assets().cloned().collect();
        let reserve = env.bank.config().reserve_asset.kind.clone();

        for _ in 0..steps {
            let holder = self.holders[self.rng.gen_range(0..self.holders.len())].clone();
            let spec = &assets[self.rng.gen_range(0..assets.len())];

            let result = if self.rng.gen_bool(0.6) {
                let one = 10u128.pow(spec.decimals.get() as u32);
                let ceiling = if spec.kind.is_native() {
                    2 * one
                } else if spec.kind == reserve {
                    4_000 * one
                } else {
                    one / 20
                };
                let raw = self.rng.gen_range(0..=ceiling);
                env.deposit(&holder, spec, raw).await?
            } else {
                let mut raw = self.rng.gen_range(0..=6_000u128) * UnitAmount::ONE.raw();
                if self.rng.gen_bool(0.1) {
                    raw += self.rng.gen_range(1..1_000_000u128);
                }
                env.bank
                    .withdraw(&holder, &spec.kind, UnitAmount::from_raw(raw))
                    .await
                    .map(|_| ())
            };

            let outcome = match &result {
                Ok(()) => OK,
                Err(e) => e.error_code(),
            };
            metrics.record(outcome);

            if !env.bank.verify_invariants() {
                anyhow::bail!("invariants broken after {} by {}", outcome, holder);
            }
        }

        debug!(steps, outcomes = ?metrics.outcomes, "Random walk finished");
        Ok(())
    }
}

fn check_outcome<T>(
    metrics: &mut SimulationMetrics,
    label: &str,
    result: Result<T, BankError>,
    expect: Option<&str>,
) {
    let outcome = match &result {
        Ok(_) => OK,
        Err(e) => e.error_code(),
    };
    metrics.record(outcome);

    let expected = expect.unwrap_or(OK);
    if outcome == expected {
        debug!("{}: {}", label, outcome);
    } else {
        warn!("{}: expected {}, got {}", label, expected, outcome);
        metrics.record_mismatch(format!("{}: expected {}, got {}", label, expected, outcome));
    }
}

fn check_condition(
    env: &Environment,
    condition: &AssertCondition,
    metrics: &mut SimulationMetrics,
) -> anyhow::Result<()> {
    let (label, holds) = match condition {
        AssertCondition::UnitBalance { holder, units } => {
            let expected = parse_units(units)?;
            let actual = env
                .bank
                .account_unit_balance(&HolderId::new(holder.as_str()))
                .unwrap_or(UnitAmount::ZERO);
            (
                format!("unit balance of {}: expected {}, got {}", holder, expected, actual),
                actual == expected,
            )
        }
        AssertCondition::Aggregate { units } => {
            let expected = parse_units(units)?;
            let actual = env.bank.aggregate_unit_balance();
            (
                format!("aggregate: expected {}, got {}", expected, actual),
                actual == expected,
            )
        }
        AssertCondition::DepositCount { count } => {
            let actual = env.bank.deposit_count();
            (
                format!("deposit count: expected {}, got {}", count, actual),
                actual == *count,
            )
        }
        AssertCondition::WithdrawCount { count } => {
            let actual = env.bank.withdraw_count();
            (
                format!("withdraw count: expected {}, got {}", count, actual),
                actual == *count,
            )
        }
        AssertCondition::WalletBalance {
            holder,
            asset,
            amount,
        } => {
            let spec = env.asset(asset)?;
            let expected = parse_native(amount, &spec)?;
            let actual = env
                .wallets
                .endpoint(&spec.kind)?
                .wallets()
                .balance_of(&HolderId::new(holder.as_str()));
            (
                format!(
                    "{} wallet of {}: expected {}, got {}",
                    spec.symbol,
                    holder,
                    spec.amount(expected),
                    spec.amount(actual)
                ),
                actual == expected,
            )
        }
        AssertCondition::InvariantsHold => (
            "invariants hold".to_string(),
            env.bank.verify_invariants(),
        ),
    };

    if holds {
        debug!("Assertion passed: {}", label);
    } else {
        warn!("Assertion failed: {}", label);
        metrics.record_mismatch(label);
    }
    Ok(())
}

fn parse_units(value: &str) -> anyhow::Result<UnitAmount> {
    let decimal = Decimal::from_str(value.trim())?;
    UnitAmount::from_decimal(decimal)
        .ok_or_else(|| anyhow::anyhow!("{} is not a valid unit amount", value))
}

/// Parse a decimal amount of `spec` into its raw native integer.
fn parse_native(value: &str, spec: &AssetSpec) -> anyhow::Result<u128> {
    let units = parse_units(value)?;
    Ok(convert::from_canonical_exact(units, spec.decimals)?.raw)
}

fn parse_price(value: &str) -> anyhow::Result<i128> {
    let decimal = Decimal::from_str(value.trim())? * Decimal::from(PRICE_SCALE as i64);
    decimal
        .trunc()
        .to_i128()
        .ok_or_else(|| anyhow::anyhow!("{} is not a valid price", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_amounts() {
        assert_eq!(parse_native("0.25", &AssetSpec::ether()).unwrap(), 250_000_000_000_000_000);
        assert_eq!(parse_native("1000", &AssetSpec::usdc()).unwrap(), 1_000_000_000);
        assert!(parse_native("0.0000001", &AssetSpec::usdc()).is_err());
        assert_eq!(
            parse_units("500.000000000000000001").unwrap(),
            UnitAmount::from_raw(500_000_000_000_000_000_001)
        );
        assert_eq!(
            parse_units("1.5").unwrap(),
            UnitAmount::from_decimal(dec!(1.5)).unwrap()
        );
        assert_eq!(parse_price("2000.5").unwrap(), 200_050_000_000);
        assert_eq!(parse_price("0.1").unwrap(), 10_000_000);
    }

    #[tokio::test]
    async fn test_builtin_scenarios_pass() {
        let mut controller = SimulationController::new(Some(42), 4);

        for scenario in Scenario::all() {
            let report = controller.run_scenario(&scenario).await.unwrap();
            assert!(
                report.passed(),
                "{} failed: {:?}",
                scenario.name,
                report.simulation.expectation_failures
            );
        }
    }

    #[tokio::test]
    async fn test_reentrancy_scenario_counts_rejection() {
        let mut controller = SimulationController::new(Some(1), 2);
        let scenario = Scenario::load("reentrancy").unwrap();

        let report = controller.run_scenario(&scenario).await.unwrap();

        assert_eq!(report.bank.reentrancy_rejected, 1);
        assert_eq!(report.bank.compensations_failed, 0);
        assert_eq!(report.simulation.outcomes.get("REENTRANCY_DETECTED"), Some(&1));
        assert_eq!(report.withdrawals, 1);
        assert_eq!(report.reentry_outcomes, vec!["REENTRANCY_DETECTED".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_expectation_is_reported() {
        let mut controller = SimulationController::new(Some(1), 2);
        let scenario: Scenario = serde_json::from_str(
            r#"{
                "name": "wrong",
                "description": "expects the wrong outcome",
                "steps": [
                    { "action": "deposit", "holder": "alice", "asset": "USDC", "amount": "5", "expect": "INVALID_AMOUNT" }
                ]
            }"#,
        )
        .unwrap();

        let report = controller.run_scenario(&scenario).await.unwrap();
        assert!(!report.passed());
        assert_eq!(report.simulation.expectation_failures.len(), 1);
    }
}

//! Property tests over whole bank operations.

use std::sync::Arc;

use assetbank_common::{AssetId, AssetKind, AssetSpec, HolderId, UnitAmount};
use assetbank_pricing::{
    MockPriceOracle, OracleValuation, OracleValuationConfig, PricePair, Valuation,
};
use proptest::prelude::*;

use crate::custody::{Custody, InMemoryAssetEndpoint};
use crate::{Bank, BankConfig};

const MILLI_ETH: u128 = 1_000_000_000_000_000;
const USDC: u128 = 1_000_000;
const CAPACITY: u128 = 100_000;
const MAX_WITHDRAW: u128 = 5_000;

struct Fixture {
    bank: Bank,
    native: Arc<InMemoryAssetEndpoint>,
    usdc: Arc<InMemoryAssetEndpoint>,
    holders: Vec<HolderId>,
}

fn fixture() -> Fixture {
    let oracle = Arc::new(MockPriceOracle::new("feed"));
    oracle.set_price(PricePair::new("ETH", "USD"), 2_000 * 10i128.pow(8), 8);
    let pricing = OracleValuationConfig::default()
        .with_feed(AssetKind::Native, PricePair::new("ETH", "USD"))
        .with_par(AssetSpec::usdc().kind);

    let native = Arc::new(InMemoryAssetEndpoint::new());
    let usdc = Arc::new(InMemoryAssetEndpoint::new());
    let custody = Custody::new()
        .with_endpoint(AssetKind::Native, native.clone())
        .with_endpoint(AssetSpec::usdc().kind, usdc.clone());

    let config = BankConfig {
        capacity: UnitAmount::from_whole(CAPACITY).unwrap(),
        max_withdraw_per_op: UnitAmount::from_whole(MAX_WITHDRAW).unwrap(),
        ..BankConfig::default()
    };
    let bank = Bank::new(
        config,
        Valuation::Oracle(OracleValuation::new(oracle, pricing)),
        custody,
    )
    .unwrap();

    Fixture {
        bank,
        native,
        usdc,
        holders: (0..3).map(|i| HolderId::new(format!("holder_{i}"))).collect(),
    }
}

#[derive(Debug, Clone)]
enum Step {
    DepositEth { holder: usize, milli: u128 },
    DepositUsdc { holder: usize, whole: u128 },
    WithdrawUsdc { holder: usize, raw: u128 },
    WithdrawEth { holder: usize, raw: u128 },
}

fn step() -> impl Strategy<Value = Step> {
    let unit = UnitAmount::ONE.raw();
    prop_oneof![
        (0usize..3, 0u128..20_000).prop_map(|(holder, milli)| Step::DepositEth { holder, milli }),
        (0usize..3, 0u128..40_000).prop_map(|(holder, whole)| Step::DepositUsdc { holder, whole }),
        (0usize..3, 0u128..6_000).prop_map(move |(holder, whole)| Step::WithdrawUsdc {
            holder,
            raw: whole * unit,
        }),
        (0usize..3, 1u128..6_000 * unit).prop_map(|(holder, raw)| Step::WithdrawEth { holder, raw }),
    ]
}

/// Everything an operation may change.
#[derive(Debug, PartialEq)]
struct Observed {
    aggregate: UnitAmount,
    deposits: u64,
    withdrawals: u64,
    balances: Vec<UnitAmount>,
}

fn observe(f: &Fixture) -> Observed {
    Observed {
        aggregate: f.bank.aggregate_unit_balance(),
        deposits: f.bank.deposit_count(),
        withdrawals: f.bank.withdraw_count(),
        balances: f
            .holders
            .iter()
            .map(|h| f.bank.account_unit_balance(h).unwrap_or(UnitAmount::ZERO))
            .collect(),
    }
}

async fn apply(f: &Fixture, step: &Step) -> bool {
    let result = match *step {
        Step::DepositEth { holder, milli } => {
            let holder = &f.holders[holder];
            f.native.fund(holder, milli * MILLI_ETH);
            f.native.attach(holder, milli * MILLI_ETH);
            f.bank.deposit_native(holder, milli * MILLI_ETH).await
        }
        Step::DepositUsdc { holder, whole } => {
            let holder = &f.holders[holder];
            f.usdc.fund(holder, whole * USDC);
            f.usdc.approve(holder, whole * USDC);
            f.bank
                .deposit_asset(holder, &AssetId::new("USDC"), whole * USDC)
                .await
        }
        Step::WithdrawUsdc { holder, raw } => {
            f.bank
                .withdraw(&f.holders[holder], &AssetSpec::usdc().kind, UnitAmount::from_raw(raw))
                .await
        }
        Step::WithdrawEth { holder, raw } => {
            f.bank
                .withdraw(&f.holders[holder], &AssetKind::Native, UnitAmount::from_raw(raw))
                .await
        }
    };
    result.is_ok()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_conservation_and_atomicity(steps in prop::collection::vec(step(), 1..40)) {
        let f = fixture();
        let capacity = UnitAmount::from_whole(CAPACITY).unwrap();

        for step in &steps {
            let before = observe(&f);
            let committed = tokio_test::block_on(apply(&f, step));
            let after = observe(&f);

            prop_assert!(f.bank.verify_invariants());
            prop_assert!(after.aggregate <= capacity);
            if !committed {
                prop_assert_eq!(before, after);
            }
        }

        let snapshot = f.bank.metrics().snapshot();
        prop_assert_eq!(snapshot.operations_active, 0);
        prop_assert_eq!(snapshot.operations_started, steps.len() as u64);
    }

    #[test]
    fn prop_withdraw_ceiling(excess in 1u128..1_000_000_000_000_000_000_000) {
        let f = fixture();
        let alice = &f.holders[0];
        f.usdc.fund(alice, 10_000 * USDC);
        f.usdc.approve(alice, 10_000 * USDC);
        tokio_test::block_on(f.bank.deposit_asset(alice, &AssetId::new("USDC"), 10_000 * USDC)).unwrap();

        let requested = UnitAmount::from_raw(MAX_WITHDRAW * UnitAmount::ONE.raw() + excess);
        let err = tokio_test::block_on(f.bank.withdraw(alice, &AssetSpec::usdc().kind, requested)).unwrap_err();

        prop_assert_eq!(err.error_code(), "INVALID_MAX_WITHDRAW_AMOUNT");
        prop_assert_eq!(f.bank.account_unit_balance(alice).unwrap(), UnitAmount::from_whole(10_000).unwrap());
    }

    #[test]
    fn prop_reserve_withdrawal_precision(micros in 1u128..1_000_000_000, dust in 0u128..1_000_000_000_000) {
        let f = fixture();
        let alice = &f.holders[0];
        f.usdc.fund(alice, 5_000 * USDC);
        f.usdc.approve(alice, 5_000 * USDC);
        tokio_test::block_on(f.bank.deposit_asset(alice, &AssetId::new("USDC"), 5_000 * USDC)).unwrap();

        let requested = UnitAmount::from_raw(micros * 1_000_000_000_000 + dust);
        let result = tokio_test::block_on(f.bank.withdraw(alice, &AssetSpec::usdc().kind, requested));

        if dust == 0 {
            let receipt = result.unwrap();
            prop_assert_eq!(receipt.native_amount.raw, micros);
            prop_assert_eq!(f.usdc.balance_of(alice), micros);
        } else {
            prop_assert_eq!(result.unwrap_err().error_code(), "PRECISION_MISMATCH");
            prop_assert_eq!(f.usdc.balance_of(alice), 0);
        }
    }
}

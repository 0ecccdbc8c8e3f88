//! The bank: guarded deposit and withdraw entry points over the ledger.

use std::collections::BTreeMap;
use std::sync::Arc;

use assetbank_common::{
    AssetId, AssetKind, AssetSpec, BankError, BankEvent, HolderId, NativeAmount, Operation,
    OperationKind, OperationStatus, Receipt, Result, UnitAmount,
};
use assetbank_ledger::{BalanceChange, LedgerStore};
use assetbank_pricing::{DeliveryPlan, StrategyKind, Valuation};
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::config::BankConfig;
use crate::custody::Custody;
use crate::guard::{GuardScope, ReentrancyGuard};
use crate::metrics::BankMetrics;
use crate::transaction::{Compensation, Transaction};

/// How a deposit reaches custody.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Acquisition {
    /// Attached to the call as value; claimed from the endpoint.
    Attached,
    /// Pulled from the holder under a prior authorization.
    Pull,
}

/// A multi-asset ledger with guarded entry points.
pub struct Bank {
    config: BankConfig,
    ledger: Mutex<LedgerStore>,
    valuation: Valuation,
    custody: Custody,
    guard: ReentrancyGuard,
    metrics: Arc<BankMetrics>,
    events: broadcast::Sender<BankEvent>,
}

impl Bank {
    /// Create a bank. Configuration is validated and then fixed.
    pub fn new(config: BankConfig, valuation: Valuation, custody: Custody) -> Result<Self> {
        config.validate().map_err(BankError::ConfigurationError)?;

        if let Some(reserve) = valuation.reserve_asset() {
            if reserve != &config.reserve_asset {
                return Err(BankError::ConfigurationError(format!(
                    "exchange reserve {} differs from bank reserve {}",
                    reserve, config.reserve_asset
                )));
            }
        }

        for asset in config.all_assets() {
            if !valuation.supports(&asset.kind) {
                return Err(BankError::ConfigurationError(format!(
                    "{} strategy cannot value {}",
                    valuation.strategy(),
                    asset.symbol
                )));
            }
            if !custody.supports(&asset.kind) {
                return Err(BankError::ConfigurationError(format!(
                    "no transfer endpoint for {}",
                    asset.symbol
                )));
            }
        }

        let (events, _) = broadcast::channel(config.event_capacity);

        info!(
            strategy = %valuation.strategy(),
            capacity = %config.capacity,
            max_withdraw_per_op = %config.max_withdraw_per_op,
            "Bank created"
        );

        Ok(Self {
            ledger: Mutex::new(LedgerStore::new(config.limits())),
            config,
            valuation,
            custody,
            guard: ReentrancyGuard::new(),
            metrics: Arc::new(BankMetrics::new()),
            events,
        })
    }

    /// Deposit the chain-native asset attached to the call.
    #[instrument(skip(self, holder), fields(holder = %holder))]
    pub async fn deposit_native(&self, holder: &HolderId, amount: u128) -> Result<Receipt> {
        self.deposit(holder, AssetKind::Native, amount, Acquisition::Attached)
            .await
    }

    /// Deposit `amount` of a token, in its own precision. The holder must
    /// have authorized the pull beforehand.
    #[instrument(skip(self, holder, asset), fields(holder = %holder, asset = %asset))]
    pub async fn deposit_asset(
        &self,
        holder: &HolderId,
        asset: &AssetId,
        amount: u128,
    ) -> Result<Receipt> {
        self.deposit(holder, AssetKind::Token(asset.clone()), amount, Acquisition::Pull)
            .await
    }

    /// Withdraw `unit_amount` of canonical value, delivered in `asset`.
    #[instrument(skip(self, holder, asset), fields(holder = %holder, asset = %asset, unit_amount = %unit_amount))]
    pub async fn withdraw(
        &self,
        holder: &HolderId,
        asset: &AssetKind,
        unit_amount: UnitAmount,
    ) -> Result<Receipt> {
        let operation = Operation::new(OperationKind::Withdraw, holder.clone(), asset.clone());
        let scope = self.enter(&operation).await?;
        let mut tx = Transaction::begin(&self.ledger, operation);

        scope
            .run(async {
                let outcome = self.run_withdraw(&scope, &mut tx, unit_amount).await;
                self.conclude(&scope, &mut tx, outcome).await
            })
            .await
    }

    /// Value sent without a deposit entry point. Always rejected.
    pub fn receive_unsolicited(&self, from: &HolderId, amount: u128) -> Result<()> {
        self.metrics.unsolicited_rejected();
        warn!(from = %from, amount = %amount, "Rejected unsolicited transfer");
        Err(BankError::InvalidDepositPath(format!(
            "{} sent {} outside a deposit entry point",
            from, amount
        )))
    }

    /// Any call that matches no entry point. Always rejected.
    pub fn fallback(&self, from: &HolderId, selector: &[u8]) -> Result<()> {
        self.metrics.unsolicited_rejected();
        let selector: String = selector.iter().map(|b| format!("{:02x}", b)).collect();
        warn!(from = %from, selector = %selector, "Rejected unrecognised call");
        Err(BankError::InvalidDepositPath(format!(
            "unrecognised call 0x{} from {}",
            selector, from
        )))
    }

    /// Canonical balance of an account. Fails when there are no holdings.
    pub fn account_unit_balance(&self, holder: &HolderId) -> Result<UnitAmount> {
        let balance = self.ledger.lock().unit_balance(holder);
        if balance.is_zero() {
            return Err(BankError::InsufficientBalance {
                required: UnitAmount::ZERO,
                available: UnitAmount::ZERO,
            });
        }
        Ok(balance)
    }

    /// Raw per-asset amounts tracked for an account.
    pub fn account_native_balances(&self, holder: &HolderId) -> BTreeMap<AssetKind, NativeAmount> {
        self.ledger
            .lock()
            .account(holder)
            .map(|a| a.native_balances.clone())
            .unwrap_or_default()
    }

    pub fn aggregate_unit_balance(&self) -> UnitAmount {
        self.ledger.lock().total()
    }

    pub fn deposit_count(&self) -> u64 {
        self.ledger.lock().deposit_count()
    }

    pub fn withdraw_count(&self) -> u64 {
        self.ledger.lock().withdraw_count()
    }

    pub fn account_count(&self) -> usize {
        self.ledger.lock().account_count()
    }

    /// Balance changes of one account, oldest first.
    pub fn journal_for(&self, holder: &HolderId) -> Vec<BalanceChange> {
        self.ledger.lock().journal_for(holder)
    }

    /// Conservation and capacity hold for the current store.
    pub fn verify_invariants(&self) -> bool {
        self.ledger.lock().verify_invariants()
    }

    pub fn config(&self) -> &BankConfig {
        &self.config
    }

    pub fn strategy(&self) -> StrategyKind {
        self.valuation.strategy()
    }

    pub fn metrics(&self) -> Arc<BankMetrics> {
        self.metrics.clone()
    }

    /// Subscribe to committed-operation events.
    pub fn subscribe(&self) -> broadcast::Receiver<BankEvent> {
        self.events.subscribe()
    }

    async fn enter(&self, operation: &Operation) -> Result<GuardScope<'_>> {
        match self.guard.enter(operation.id).await {
            Ok(scope) => {
                self.metrics.operation_started();
                debug!(operation_id = %operation.id, kind = ?operation.kind, "Entered guard");
                Ok(scope)
            }
            Err(e) => {
                self.metrics.reentrancy_rejected();
                Err(e)
            }
        }
    }

    fn asset_spec(&self, asset: &AssetKind) -> Result<AssetSpec> {
        self.config
            .asset_spec(asset)
            .cloned()
            .ok_or_else(|| BankError::UnsupportedAsset(asset.clone()))
    }

    async fn deposit(
        &self,
        holder: &HolderId,
        asset: AssetKind,
        amount: u128,
        acquisition: Acquisition,
    ) -> Result<Receipt> {
        let operation = Operation::new(OperationKind::Deposit, holder.clone(), asset);
        let scope = self.enter(&operation).await?;
        let mut tx = Transaction::begin(&self.ledger, operation);

        scope
            .run(async {
                let outcome = self.run_deposit(&scope, &mut tx, amount, acquisition).await;
                self.conclude(&scope, &mut tx, outcome).await
            })
            .await
    }

    async fn run_deposit(
        &self,
        scope: &GuardScope<'_>,
        tx: &mut Transaction<'_>,
        amount: u128,
        acquisition: Acquisition,
    ) -> Result<Receipt> {
        let asset = tx.operation().asset.clone();
        let holder = tx.holder().clone();

        if amount == 0 {
            return Err(BankError::InvalidAmount(
                "deposit amount must be greater than zero".to_string(),
            ));
        }
        let spec = self.asset_spec(&asset)?;
        let native = spec.amount(amount);
        tx.advance(OperationStatus::Validated)?;

        // Acquisition precedes valuation: the amount received is what gets priced.
        match acquisition {
            Acquisition::Attached => self.custody.take_attached(&asset, &holder, native).await?,
            Acquisition::Pull => self.custody.pull(&asset, &holder, native).await?,
        }
        tx.hold(Compensation::Refund {
            asset: asset.clone(),
            amount: native,
        });
        scope.ensure_clean()?;
        tx.advance(OperationStatus::AssetSettled)?;

        let quote = self.valuation.resolve_deposit(&spec, native).await?;
        if quote.swapped() {
            if let Some(received) = quote.reserve_received {
                tx.replace_last(Compensation::Refund {
                    asset: self.config.reserve_asset.kind.clone(),
                    amount: received,
                });
            }
        }
        scope.ensure_clean()?;
        tx.advance(OperationStatus::ValueResolved)?;

        let unit = quote.unit_value;
        if unit.is_zero() {
            return Err(BankError::InvalidAmount(format!(
                "{} {} is worth zero units",
                native, spec.symbol
            )));
        }

        let operation_id = tx.operation().id;
        tx.mutate(|store| {
            store.check_capacity(unit)?;
            store.credit(operation_id, &holder, unit)?;
            store.record_native_in(&holder, &asset, native);
            store.increment_deposit_count();
            Ok(())
        })?;
        tx.advance(OperationStatus::LedgerMutated)?;

        Ok(Receipt {
            operation_id,
            kind: OperationKind::Deposit,
            holder,
            asset,
            native_amount: native,
            unit_amount: unit,
        })
    }

    async fn run_withdraw(
        &self,
        scope: &GuardScope<'_>,
        tx: &mut Transaction<'_>,
        unit: UnitAmount,
    ) -> Result<Receipt> {
        let asset = tx.operation().asset.clone();
        let holder = tx.holder().clone();

        let balance = tx.read(|store| -> Result<UnitAmount> {
            store.check_withdraw_ceiling(unit)?;
            let balance = store.unit_balance(&holder);
            if balance.is_zero() {
                return Err(BankError::InsufficientBalance {
                    required: unit,
                    available: UnitAmount::ZERO,
                });
            }
            Ok(balance)
        })?;
        let spec = self.asset_spec(&asset)?;
        tx.advance(OperationStatus::Validated)?;

        if unit > balance {
            return Err(BankError::InsufficientBalance {
                required: unit,
                available: balance,
            });
        }

        let plan = self.valuation.plan_withdrawal(&spec, unit).await?;
        scope.ensure_clean()?;
        tx.advance(OperationStatus::ValueResolved)?;

        // Debit before delivery: a callback during delivery sees the new balance.
        let operation_id = tx.operation().id;
        tx.mutate(|store| {
            store.debit(operation_id, &holder, unit)?;
            store.increment_withdraw_count();
            Ok(())
        })?;
        tx.advance(OperationStatus::LedgerMutated)?;

        let (delivered_asset, delivered) = match plan {
            DeliveryPlan::Direct { asset, amount } => {
                self.custody.push(&asset, &holder, amount).await?;
                (asset, amount)
            }
            DeliveryPlan::Exchange {
                reserve_in,
                asset_out,
            } => {
                let amount = self.valuation.execute_exchange(reserve_in, &asset_out).await?;
                // Custody now holds the output instead of the reserve backing the debit.
                tx.hold(Compensation::Unwind {
                    asset: asset_out.kind.clone(),
                    amount,
                });
                scope.ensure_clean()?;
                self.custody.push(&asset_out.kind, &holder, amount).await?;
                (asset_out.kind, amount)
            }
        };
        tx.hold(Compensation::Reclaim {
            asset: delivered_asset.clone(),
            amount: delivered,
        });
        tx.mutate(|store| {
            store.record_native_out(&holder, &delivered_asset, delivered);
            Ok(())
        })?;
        scope.ensure_clean()?;
        tx.advance(OperationStatus::AssetSettled)?;

        Ok(Receipt {
            operation_id,
            kind: OperationKind::Withdraw,
            holder,
            asset,
            native_amount: delivered,
            unit_amount: unit,
        })
    }

    /// Commit and publish, or roll everything back.
    async fn conclude(
        &self,
        scope: &GuardScope<'_>,
        tx: &mut Transaction<'_>,
        outcome: Result<Receipt>,
    ) -> Result<Receipt> {
        let outcome = outcome.and_then(|receipt| {
            scope.ensure_clean()?;
            tx.commit()?;
            Ok(receipt)
        });

        match outcome {
            Ok(receipt) => {
                let at = Utc::now();
                let event = match receipt.kind {
                    OperationKind::Deposit => {
                        self.metrics.deposit_committed();
                        BankEvent::Deposited {
                            operation_id: receipt.operation_id,
                            account: receipt.holder.clone(),
                            asset: receipt.asset.clone(),
                            unit_amount: receipt.unit_amount,
                            at,
                        }
                    }
                    OperationKind::Withdraw => {
                        self.metrics.withdrawal_committed();
                        BankEvent::Withdrawn {
                            operation_id: receipt.operation_id,
                            account: receipt.holder.clone(),
                            asset: receipt.asset.clone(),
                            unit_amount: receipt.unit_amount,
                            at,
                        }
                    }
                };

                info!(
                    operation_id = %receipt.operation_id,
                    kind = ?receipt.kind,
                    holder = %receipt.holder,
                    asset = %receipt.asset,
                    native_amount = %receipt.native_amount,
                    unit_amount = %receipt.unit_amount,
                    "Operation committed"
                );

                // No subscribers is fine.
                let _ = self.events.send(event);
                Ok(receipt)
            }
            Err(e) => {
                let status = tx.operation().status;
                let report = tx.rollback(&self.custody, &self.valuation).await;
                for _ in &report.failed {
                    self.metrics.compensation_failed();
                }
                self.metrics.operation_reverted();

                warn!(
                    operation_id = %tx.operation().id,
                    failed_at = ?status,
                    error_code = e.error_code(),
                    error = %e,
                    compensated = report.compensated,
                    uncompensated = report.failed.len(),
                    delivery_kept = report.delivery_kept,
                    "Operation reverted"
                );
                Err(e)
            }
        }
    }
}

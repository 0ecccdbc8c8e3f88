//! All-or-nothing operation scope over the ledger store.
//!
//! A transaction checkpoints the store when it begins and keeps a list of
//! custody movements made on the holder's behalf. Rolling back undoes those
//! movements newest first and then restores the checkpoint. A delivery the
//! holder refuses to return stays settled: its debit is kept and nothing
//! older is undone. Dropping an unfinished transaction restores the
//! checkpoint; its custody movements can only be undone by an explicit
//! rollback.

use assetbank_common::{
    AssetKind, BankError, HolderId, NativeAmount, Operation, OperationStatus, Result,
};
use assetbank_ledger::{Checkpoint, LedgerStore};
use assetbank_pricing::Valuation;
use parking_lot::Mutex;
use tracing::{error, warn};

use crate::custody::Custody;

/// An external custody movement and how to undo it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    /// Custody holds this on the holder's behalf; push it back.
    Refund { asset: AssetKind, amount: NativeAmount },
    /// The holder was sent this; pull it back.
    Reclaim { asset: AssetKind, amount: NativeAmount },
    /// Reserve was swapped into this; swap it back.
    Unwind { asset: AssetKind, amount: NativeAmount },
}

/// Outcome of a rollback.
#[derive(Debug, Default)]
pub struct RollbackReport {
    /// Compensations that completed.
    pub compensated: usize,
    /// Compensations the endpoint refused.
    pub failed: Vec<Compensation>,
    /// A delivery could not be reclaimed, so the ledger kept its debit.
    pub delivery_kept: bool,
}

/// One guarded operation's effects, pending commit.
pub struct Transaction<'a> {
    ledger: &'a Mutex<LedgerStore>,
    checkpoint: Option<Checkpoint>,
    compensations: Vec<Compensation>,
    operation: Operation,
}

impl<'a> Transaction<'a> {
    /// Checkpoint the store and start tracking `operation`.
    pub fn begin(ledger: &'a Mutex<LedgerStore>, operation: Operation) -> Self {
        let checkpoint = ledger.lock().checkpoint(&operation.holder);
        Self {
            ledger,
            checkpoint: Some(checkpoint),
            compensations: Vec::new(),
            operation,
        }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn holder(&self) -> &HolderId {
        &self.operation.holder
    }

    /// Advance the operation state machine.
    pub fn advance(&mut self, next: OperationStatus) -> Result<()> {
        self.operation.transition_to(next)
    }

    /// Read the store.
    pub fn read<T>(&self, f: impl FnOnce(&LedgerStore) -> T) -> T {
        f(&self.ledger.lock())
    }

    /// Mutate the store. The lock is released before returning.
    pub fn mutate<T>(&self, f: impl FnOnce(&mut LedgerStore) -> Result<T>) -> Result<T> {
        f(&mut self.ledger.lock())
    }

    /// Record a custody movement to undo on rollback.
    pub fn hold(&mut self, compensation: Compensation) {
        self.compensations.push(compensation);
    }

    /// Replace the newest recorded movement, e.g. after custody was swapped.
    pub fn replace_last(&mut self, compensation: Compensation) {
        self.compensations.pop();
        self.compensations.push(compensation);
    }

    /// Make every effect permanent.
    pub fn commit(&mut self) -> Result<()> {
        self.advance(OperationStatus::Committed)?;
        self.checkpoint = None;
        self.compensations.clear();
        Ok(())
    }

    /// Undo custody movements newest first, then restore the checkpoint.
    ///
    /// When a `Reclaim` is refused the holder keeps the delivery, so the
    /// ledger keeps the debit that paid for it and older movements stand.
    pub async fn rollback(&mut self, custody: &Custody, valuation: &Valuation) -> RollbackReport {
        self.operation.revert();

        let mut report = RollbackReport::default();
        let holder = self.operation.holder.clone();
        while let Some(compensation) = self.compensations.pop() {
            let result = match &compensation {
                Compensation::Refund { asset, amount } => custody.push(asset, &holder, *amount).await,
                Compensation::Reclaim { asset, amount } => custody.pull(asset, &holder, *amount).await,
                Compensation::Unwind { asset, amount } => valuation
                    .unwind_exchange(asset, *amount)
                    .await
                    .map(|_| ())
                    .map_err(BankError::from),
            };

            match result {
                Ok(()) => report.compensated += 1,
                Err(e) => {
                    error!(
                        operation_id = %self.operation.id,
                        compensation = ?compensation,
                        error = %e,
                        "Compensating transfer failed"
                    );
                    let delivered = matches!(compensation, Compensation::Reclaim { .. });
                    report.failed.push(compensation);
                    if delivered {
                        report.delivery_kept = true;
                        self.compensations.clear();
                        break;
                    }
                }
            }
        }

        if let Some(checkpoint) = self.checkpoint.take() {
            if !report.delivery_kept {
                self.ledger.lock().restore(checkpoint);
            }
        }
        report
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if let Some(checkpoint) = self.checkpoint.take() {
            self.ledger.lock().restore(checkpoint);
            warn!(
                operation_id = %self.operation.id,
                pending_compensations = self.compensations.len(),
                "Unfinished operation dropped; ledger restored"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use assetbank_common::{AssetSpec, OperationKind, UnitAmount};
    use assetbank_ledger::LedgerLimits;

    use assetbank_pricing::{MockPriceOracle, OracleValuation, OracleValuationConfig};

    use crate::custody::{AssetEndpoint, InMemoryAssetEndpoint};

    fn store() -> Mutex<LedgerStore> {
        Mutex::new(LedgerStore::new(LedgerLimits {
            capacity: UnitAmount::from_whole(1_000).unwrap(),
            max_withdraw_per_op: UnitAmount::from_whole(100).unwrap(),
        }))
    }

    fn deposit(holder: &str) -> Operation {
        Operation::new(OperationKind::Deposit, HolderId::new(holder), AssetKind::Native)
    }

    fn withdraw(holder: &str) -> Operation {
        Operation::new(OperationKind::Withdraw, HolderId::new(holder), AssetSpec::usdc().kind)
    }

    fn valuation() -> Valuation {
        let oracle = Arc::new(MockPriceOracle::new("feed"));
        Valuation::Oracle(OracleValuation::new(oracle, OracleValuationConfig::default()))
    }

    /// Store with `whole` units already committed to alice.
    fn funded_store(whole: u128) -> Mutex<LedgerStore> {
        let ledger = store();
        let mut tx = Transaction::begin(&ledger, deposit("alice"));
        let id = tx.operation().id;
        tx.advance(OperationStatus::Validated).unwrap();
        tx.advance(OperationStatus::ValueResolved).unwrap();
        tx.mutate(|s| s.credit(id, &HolderId::new("alice"), UnitAmount::from_whole(whole).unwrap()))
            .unwrap();
        tx.advance(OperationStatus::LedgerMutated).unwrap();
        tx.commit().unwrap();
        drop(tx);
        ledger
    }

    #[test]
    fn test_commit_keeps_effects() {
        let ledger = store();
        let mut tx = Transaction::begin(&ledger, deposit("alice"));
        let id = tx.operation().id;

        tx.advance(OperationStatus::Validated).unwrap();
        tx.advance(OperationStatus::ValueResolved).unwrap();
        tx.mutate(|s| s.credit(id, &HolderId::new("alice"), UnitAmount::ONE))
            .unwrap();
        tx.advance(OperationStatus::LedgerMutated).unwrap();
        tx.commit().unwrap();
        drop(tx);

        assert_eq!(ledger.lock().total(), UnitAmount::ONE);
    }

    #[test]
    fn test_drop_restores_checkpoint() {
        let ledger = store();
        {
            let tx = Transaction::begin(&ledger, deposit("alice"));
            let id = tx.operation().id;
            tx.mutate(|s| s.credit(id, tx.holder(), UnitAmount::ONE)).unwrap();
            assert_eq!(tx.read(|s| s.total()), UnitAmount::ONE);
        }

        let ledger = ledger.lock();
        assert_eq!(ledger.total(), UnitAmount::ZERO);
        assert!(ledger.account(&HolderId::new("alice")).is_none());
        assert!(ledger.journal().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_runs_compensations_newest_first() {
        let usdc = AssetSpec::usdc();
        let endpoint = Arc::new(InMemoryAssetEndpoint::new());
        let custody = Custody::new().with_endpoint(usdc.kind.clone(), endpoint.clone());
        let alice = HolderId::new("alice");
        endpoint.fund(&alice, 500);
        endpoint.approve(&alice, 500);
        assert!(endpoint.pull_from(&alice, 500).await);

        let ledger = store();
        let mut tx = Transaction::begin(&ledger, deposit("alice"));
        tx.hold(Compensation::Refund {
            asset: usdc.kind.clone(),
            amount: usdc.amount(400),
        });
        tx.replace_last(Compensation::Refund {
            asset: usdc.kind.clone(),
            amount: usdc.amount(500),
        });

        let report = tx.rollback(&custody, &valuation()).await;
        assert_eq!(report.compensated, 1);
        assert!(report.failed.is_empty());
        assert_eq!(tx.operation().status, OperationStatus::Reverted);
        assert_eq!(endpoint.balance_of(&alice), 500);
        assert_eq!(endpoint.held(), 0);
    }

    #[tokio::test]
    async fn test_rollback_reports_refused_compensation() {
        let usdc = AssetSpec::usdc();
        let endpoint = Arc::new(InMemoryAssetEndpoint::new());
        endpoint.set_refuse_pushes(true);
        let custody = Custody::new().with_endpoint(usdc.kind.clone(), endpoint);

        let ledger = store();
        let mut tx = Transaction::begin(&ledger, deposit("alice"));
        tx.hold(Compensation::Refund {
            asset: usdc.kind.clone(),
            amount: usdc.amount(1),
        });

        let report = tx.rollback(&custody, &valuation()).await;
        assert_eq!(report.compensated, 0);
        assert_eq!(report.failed.len(), 1);
        assert!(!report.delivery_kept);
    }

    #[tokio::test]
    async fn test_reclaimed_delivery_restores_debit() {
        let usdc = AssetSpec::usdc();
        let endpoint = Arc::new(InMemoryAssetEndpoint::new());
        let custody = Custody::new().with_endpoint(usdc.kind.clone(), endpoint.clone());
        let alice = HolderId::new("alice");
        let ledger = funded_store(10);

        let mut tx = Transaction::begin(&ledger, withdraw("alice"));
        let id = tx.operation().id;
        tx.mutate(|s| s.debit(id, &alice, UnitAmount::from_whole(4).unwrap()))
            .unwrap();
        assert!(endpoint.push_to(&alice, 4).await);
        endpoint.approve(&alice, 4);
        tx.hold(Compensation::Reclaim {
            asset: usdc.kind.clone(),
            amount: usdc.amount(4),
        });

        let report = tx.rollback(&custody, &valuation()).await;
        assert_eq!(report.compensated, 1);
        assert!(!report.delivery_kept);
        assert_eq!(endpoint.balance_of(&alice), 0);
        assert_eq!(ledger.lock().unit_balance(&alice), UnitAmount::from_whole(10).unwrap());
    }

    #[tokio::test]
    async fn test_refused_reclaim_keeps_debit() {
        let usdc = AssetSpec::usdc();
        let endpoint = Arc::new(InMemoryAssetEndpoint::new());
        let custody = Custody::new().with_endpoint(usdc.kind.clone(), endpoint.clone());
        let alice = HolderId::new("alice");
        let ledger = funded_store(10);

        let mut tx = Transaction::begin(&ledger, withdraw("alice"));
        let id = tx.operation().id;
        tx.mutate(|s| {
            s.debit(id, &alice, UnitAmount::from_whole(4).unwrap())?;
            s.increment_withdraw_count();
            Ok(())
        })
        .unwrap();
        // older movement funding the delivery
        tx.hold(Compensation::Refund {
            asset: usdc.kind.clone(),
            amount: usdc.amount(1),
        });
        assert!(endpoint.push_to(&alice, 4).await);
        tx.hold(Compensation::Reclaim {
            asset: usdc.kind.clone(),
            amount: usdc.amount(4),
        });

        // no allowance: the holder keeps the delivery
        let report = tx.rollback(&custody, &valuation()).await;
        assert!(report.delivery_kept);
        assert_eq!(report.compensated, 0);
        assert_eq!(
            report.failed,
            vec![Compensation::Reclaim {
                asset: usdc.kind.clone(),
                amount: usdc.amount(4),
            }]
        );
        assert_eq!(tx.operation().status, OperationStatus::Reverted);
        assert_eq!(endpoint.balance_of(&alice), 4);
        drop(tx);

        let ledger = ledger.lock();
        assert_eq!(ledger.unit_balance(&alice), UnitAmount::from_whole(6).unwrap());
        assert_eq!(ledger.total(), UnitAmount::from_whole(6).unwrap());
        assert_eq!(ledger.withdraw_count(), 1);
        assert!(ledger.verify_invariants());
    }
}

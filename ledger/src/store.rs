//! Ledger store: accounts, the aggregate balance and operation counters.
//!
//! The store checks only its own invariants (non-negative balances,
//! conservation, capacity). Amount and ordering preconditions belong to the
//! caller. Any failure here is definitive and must unwind the enclosing
//! operation through [`LedgerStore::restore`].

use std::collections::HashMap;

use assetbank_common::{
    AssetKind, BankError, HolderId, NativeAmount, OperationId, Result, UnitAmount,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::account::Account;
use crate::balance::{BalanceChange, BalanceChangeType};

/// Protocol limits fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerLimits {
    /// Maximum permissible aggregate balance.
    pub capacity: UnitAmount,
    /// Ceiling on a single withdrawal.
    pub max_withdraw_per_op: UnitAmount,
}

/// State captured before an operation mutates the store.
///
/// An operation touches exactly one account, so the checkpoint holds that
/// account's prior state (or its absence) plus the aggregate fields.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    holder: HolderId,
    account: Option<Account>,
    total: UnitAmount,
    deposit_count: u64,
    withdraw_count: u64,
    journal_len: usize,
}

impl Checkpoint {
    /// Account this checkpoint covers.
    pub fn holder(&self) -> &HolderId {
        &self.holder
    }
}

/// In-memory ledger store.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    limits: LedgerLimits,
    accounts: HashMap<HolderId, Account>,
    total: UnitAmount,
    deposit_count: u64,
    withdraw_count: u64,
    journal: Vec<BalanceChange>,
}

impl LedgerStore {
    /// Create an empty store with fixed limits.
    pub fn new(limits: LedgerLimits) -> Self {
        Self {
            limits,
            accounts: HashMap::new(),
            total: UnitAmount::ZERO,
            deposit_count: 0,
            withdraw_count: 0,
            journal: Vec::new(),
        }
    }

    /// Increase an account's balance and the aggregate by the same amount.
    /// Opens the account if it does not exist yet.
    pub fn credit(
        &mut self,
        operation_id: OperationId,
        holder: &HolderId,
        amount: UnitAmount,
    ) -> Result<UnitAmount> {
        let total_after = self
            .total
            .checked_add(amount)
            .ok_or_else(|| BankError::ArithmeticOverflow("aggregate balance".to_string()))?;

        let account = self
            .accounts
            .entry(holder.clone())
            .or_insert_with(|| Account::new(holder.clone()));
        let before = account.unit_balance;
        let after = before
            .checked_add(amount)
            .ok_or_else(|| BankError::ArithmeticOverflow("account balance".to_string()))?;

        account.unit_balance = after;
        account.updated_at = Utc::now();
        self.total = total_after;

        self.record(operation_id, holder, BalanceChangeType::Credit, amount, before, after);
        debug!(holder = %holder, amount = %amount, balance = %after, "Credited account");
        Ok(after)
    }

    /// Decrease an account's balance and the aggregate by the same amount.
    pub fn debit(
        &mut self,
        operation_id: OperationId,
        holder: &HolderId,
        amount: UnitAmount,
    ) -> Result<UnitAmount> {
        let before = self.unit_balance(holder);
        let after = before
            .checked_sub(amount)
            .ok_or(BankError::InsufficientBalance {
                required: amount,
                available: before,
            })?;
        let total_after = self
            .total
            .checked_sub(amount)
            .ok_or_else(|| BankError::ArithmeticOverflow("aggregate underflow".to_string()))?;

        // A zero debit against a missing account would otherwise open one
        let account = self
            .accounts
            .get_mut(holder)
            .ok_or(BankError::InsufficientBalance {
                required: amount,
                available: UnitAmount::ZERO,
            })?;
        account.unit_balance = after;
        account.updated_at = Utc::now();
        self.total = total_after;

        self.record(operation_id, holder, BalanceChangeType::Debit, amount, before, after);
        debug!(holder = %holder, amount = %amount, balance = %after, "Debited account");
        Ok(after)
    }

    /// Fail if adding `additional` would push the aggregate above capacity.
    pub fn check_capacity(&self, additional: UnitAmount) -> Result<()> {
        let exceeded = match self.total.checked_add(additional) {
            Some(after) => after > self.limits.capacity,
            None => true,
        };
        if exceeded {
            return Err(BankError::ExceedsBankCapacity {
                total: self.total,
                additional,
                capacity: self.limits.capacity,
            });
        }
        Ok(())
    }

    /// Fail unless `requested` is non-zero and within the per-operation ceiling.
    pub fn check_withdraw_ceiling(&self, requested: UnitAmount) -> Result<()> {
        if requested.is_zero() || requested > self.limits.max_withdraw_per_op {
            return Err(BankError::InvalidMaxWithdrawAmount {
                requested,
                max: self.limits.max_withdraw_per_op,
            });
        }
        Ok(())
    }

    /// Track native units received for an account. Observability only.
    pub fn record_native_in(&mut self, holder: &HolderId, asset: &AssetKind, amount: NativeAmount) {
        self.accounts
            .entry(holder.clone())
            .or_insert_with(|| Account::new(holder.clone()))
            .add_native(asset, amount);
    }

    /// Track native units delivered from an account. Observability only.
    pub fn record_native_out(&mut self, holder: &HolderId, asset: &AssetKind, amount: NativeAmount) {
        if let Some(account) = self.accounts.get_mut(holder) {
            account.sub_native(asset, amount);
        }
    }

    pub fn increment_deposit_count(&mut self) {
        self.deposit_count += 1;
    }

    pub fn increment_withdraw_count(&mut self) {
        self.withdraw_count += 1;
    }

    /// Capture everything an operation on `holder` may change.
    pub fn checkpoint(&self, holder: &HolderId) -> Checkpoint {
        Checkpoint {
            holder: holder.clone(),
            account: self.accounts.get(holder).cloned(),
            total: self.total,
            deposit_count: self.deposit_count,
            withdraw_count: self.withdraw_count,
            journal_len: self.journal.len(),
        }
    }

    /// Put the store back exactly as it was at `checkpoint`.
    pub fn restore(&mut self, checkpoint: Checkpoint) {
        match checkpoint.account {
            Some(account) => {
                self.accounts.insert(checkpoint.holder, account);
            }
            None => {
                self.accounts.remove(&checkpoint.holder);
            }
        }
        self.total = checkpoint.total;
        self.deposit_count = checkpoint.deposit_count;
        self.withdraw_count = checkpoint.withdraw_count;
        self.journal.truncate(checkpoint.journal_len);
    }

    /// Canonical balance of an account; zero when it does not exist.
    pub fn unit_balance(&self, holder: &HolderId) -> UnitAmount {
        self.accounts
            .get(holder)
            .map(|a| a.unit_balance)
            .unwrap_or(UnitAmount::ZERO)
    }

    pub fn account(&self, holder: &HolderId) -> Option<&Account> {
        self.accounts.get(holder)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn total(&self) -> UnitAmount {
        self.total
    }

    pub fn limits(&self) -> LedgerLimits {
        self.limits
    }

    pub fn deposit_count(&self) -> u64 {
        self.deposit_count
    }

    pub fn withdraw_count(&self) -> u64 {
        self.withdraw_count
    }

    /// Every balance change since the store was created.
    pub fn journal(&self) -> &[BalanceChange] {
        &self.journal
    }

    /// Balance changes of one account, oldest first.
    pub fn journal_for(&self, holder: &HolderId) -> Vec<BalanceChange> {
        self.journal
            .iter()
            .filter(|c| &c.holder == holder)
            .cloned()
            .collect()
    }

    /// Sum of all account balances, `None` on overflow.
    pub fn sum_of_accounts(&self) -> Option<UnitAmount> {
        self.accounts
            .values()
            .try_fold(UnitAmount::ZERO, |acc, a| acc.checked_add(a.unit_balance))
    }

    /// Aggregate equals the sum of accounts and respects capacity.
    pub fn verify_invariants(&self) -> bool {
        self.sum_of_accounts() == Some(self.total) && self.total <= self.limits.capacity
    }

    fn record(
        &mut self,
        operation_id: OperationId,
        holder: &HolderId,
        change_type: BalanceChangeType,
        amount: UnitAmount,
        balance_before: UnitAmount,
        balance_after: UnitAmount,
    ) {
        self.journal.push(BalanceChange {
            operation_id,
            holder: holder.clone(),
            change_type,
            amount,
            balance_before,
            balance_after,
            total_after: self.total,
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetbank_common::Decimals;
    use proptest::prelude::*;

    fn units(n: u128) -> UnitAmount {
        UnitAmount::from_whole(n).unwrap()
    }

    fn store() -> LedgerStore {
        LedgerStore::new(LedgerLimits {
            capacity: units(10_000),
            max_withdraw_per_op: units(1_000),
        })
    }

    #[test]
    fn test_credit_opens_account() {
        let mut store = store();
        let alice = HolderId::new("alice");

        let balance = store.credit(OperationId::new(), &alice, units(2_000)).unwrap();

        assert_eq!(balance, units(2_000));
        assert_eq!(store.total(), units(2_000));
        assert_eq!(store.account_count(), 1);
        assert!(store.verify_invariants());
    }

    #[test]
    fn test_debit_is_symmetric() {
        let mut store = store();
        let alice = HolderId::new("alice");
        store.credit(OperationId::new(), &alice, units(2_000)).unwrap();

        store.debit(OperationId::new(), &alice, units(1_000)).unwrap();

        assert_eq!(store.unit_balance(&alice), units(1_000));
        assert_eq!(store.total(), units(1_000));
        assert!(store.journal().iter().all(|c| c.is_consistent()));
    }

    #[test]
    fn test_debit_insufficient() {
        let mut store = store();
        let bob = HolderId::new("bob");

        let err = store.debit(OperationId::new(), &bob, units(1)).unwrap_err();

        assert_eq!(err.error_code(), "INSUFFICIENT_BALANCE");
        assert_eq!(store.account_count(), 0);
    }

    #[test]
    fn test_capacity_check() {
        let mut store = store();
        store
            .credit(OperationId::new(), &HolderId::new("alice"), units(9_000))
            .unwrap();

        assert!(store.check_capacity(units(1_000)).is_ok());
        let err = store.check_capacity(units(1_001)).unwrap_err();
        assert_eq!(err.error_code(), "EXCEEDS_BANK_CAPACITY");
        assert!(store.check_capacity(UnitAmount::from_raw(u128::MAX)).is_err());
    }

    #[test]
    fn test_withdraw_ceiling() {
        let store = store();
        assert!(store.check_withdraw_ceiling(units(1_000)).is_ok());
        assert!(store.check_withdraw_ceiling(units(1_001)).is_err());
        assert!(store.check_withdraw_ceiling(UnitAmount::ZERO).is_err());
    }

    #[test]
    fn test_restore_removes_opened_account() {
        let mut store = store();
        let alice = HolderId::new("alice");
        let checkpoint = store.checkpoint(&alice);

        store.credit(OperationId::new(), &alice, units(5)).unwrap();
        store.record_native_in(&alice, &AssetKind::Native, NativeAmount::new(5, Decimals::CANONICAL));
        store.increment_deposit_count();
        store.restore(checkpoint);

        assert_eq!(store.account_count(), 0);
        assert_eq!(store.total(), UnitAmount::ZERO);
        assert_eq!(store.deposit_count(), 0);
        assert!(store.journal().is_empty());
    }

    #[test]
    fn test_restore_keeps_other_history() {
        let mut store = store();
        let alice = HolderId::new("alice");
        store.credit(OperationId::new(), &alice, units(10)).unwrap();
        let before = store.account(&alice).cloned();

        let checkpoint = store.checkpoint(&alice);
        store.debit(OperationId::new(), &alice, units(4)).unwrap();
        store.increment_withdraw_count();
        store.restore(checkpoint);

        assert_eq!(store.account(&alice).cloned(), before);
        assert_eq!(store.journal().len(), 1);
        assert_eq!(store.withdraw_count(), 0);
    }

    proptest! {
        #[test]
        fn prop_conservation(ops in prop::collection::vec((0usize..4, any::<bool>(), 1u128..500), 1..64)) {
            let mut store = store();
            let holders: Vec<HolderId> = (0..4).map(|i| HolderId::new(format!("holder_{}", i))).collect();

            for (idx, is_credit, amount) in ops {
                let holder = &holders[idx];
                let amount = units(amount);
                if is_credit {
                    if store.check_capacity(amount).is_ok() {
                        store.credit(OperationId::new(), holder, amount).unwrap();
                    }
                } else {
                    let _ = store.debit(OperationId::new(), holder, amount);
                }
                prop_assert!(store.verify_invariants());
            }
        }
    }
}

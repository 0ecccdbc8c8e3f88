//! Account definitions for the ledger.

use std::collections::BTreeMap;

use assetbank_common::{AssetKind, HolderId, NativeAmount, UnitAmount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A ledger account, created implicitly on first deposit and never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Owning holder.
    pub holder: HolderId,
    /// Canonical balance (18 fractional digits). Authoritative.
    pub unit_balance: UnitAmount,
    /// Raw per-asset amounts in each asset's own precision.
    /// Kept for observability only.
    pub native_balances: BTreeMap<AssetKind, NativeAmount>,
    /// When the account was opened.
    pub created_at: DateTime<Utc>,
    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Open an empty account.
    pub fn new(holder: HolderId) -> Self {
        let now = Utc::now();

        Self {
            holder,
            unit_balance: UnitAmount::ZERO,
            native_balances: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A zero canonical balance means "no holdings".
    pub fn has_holdings(&self) -> bool {
        !self.unit_balance.is_zero()
    }

    /// Raw native balance tracked for an asset, if any was ever deposited.
    pub fn native_balance(&self, asset: &AssetKind) -> Option<NativeAmount> {
        self.native_balances.get(asset).copied()
    }

    /// Add to the observed native balance of an asset.
    pub fn add_native(&mut self, asset: &AssetKind, amount: NativeAmount) {
        let entry = self
            .native_balances
            .entry(asset.clone())
            .or_insert(NativeAmount::zero(amount.decimals));
        entry.raw = entry.raw.saturating_add(amount.raw);
        self.updated_at = Utc::now();
    }

    /// Subtract from the observed native balance of an asset, flooring at zero.
    pub fn sub_native(&mut self, asset: &AssetKind, amount: NativeAmount) {
        if let Some(entry) = self.native_balances.get_mut(asset) {
            entry.raw = entry.raw.saturating_sub(amount.raw);
            self.updated_at = Utc::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetbank_common::AssetSpec;

    #[test]
    fn test_new_account_is_empty() {
        let account = Account::new(HolderId::new("alice"));
        assert!(!account.has_holdings());
        assert!(account.native_balances.is_empty());
    }

    #[test]
    fn test_native_tracking_saturates() {
        let usdc = AssetSpec::usdc();
        let mut account = Account::new(HolderId::new("alice"));

        account.add_native(&usdc.kind, usdc.amount(5_000_000));
        account.sub_native(&usdc.kind, usdc.amount(8_000_000));

        assert_eq!(account.native_balance(&usdc.kind), Some(usdc.amount(0)));
        assert_eq!(account.native_balance(&AssetKind::Native), None);
    }
}

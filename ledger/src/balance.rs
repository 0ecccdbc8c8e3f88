//! Balance journal entries.

use assetbank_common::{HolderId, OperationId, UnitAmount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Type of balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceChangeType {
    /// Credit (increase).
    Credit,
    /// Debit (decrease).
    Debit,
}

/// One canonical balance mutation, paired with the aggregate it moved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceChange {
    /// Operation that made the change.
    pub operation_id: OperationId,
    /// Account affected.
    pub holder: HolderId,
    /// Change type.
    pub change_type: BalanceChangeType,
    /// Amount changed.
    pub amount: UnitAmount,
    /// Account balance before change.
    pub balance_before: UnitAmount,
    /// Account balance after change.
    pub balance_after: UnitAmount,
    /// Aggregate balance after change.
    pub total_after: UnitAmount,
    /// When the change occurred.
    pub timestamp: DateTime<Utc>,
}

impl BalanceChange {
    /// Signed delta applied to the account (and the aggregate).
    pub fn signed_amount(&self) -> i128 {
        let amount = i128::try_from(self.amount.raw()).unwrap_or(i128::MAX);
        match self.change_type {
            BalanceChangeType::Credit => amount,
            BalanceChangeType::Debit => -amount,
        }
    }

    /// Whether before/after are consistent with the recorded amount.
    pub fn is_consistent(&self) -> bool {
        match self.change_type {
            BalanceChangeType::Credit => {
                self.balance_before.checked_add(self.amount) == Some(self.balance_after)
            }
            BalanceChangeType::Debit => {
                self.balance_before.checked_sub(self.amount) == Some(self.balance_after)
            }
        }
    }
}

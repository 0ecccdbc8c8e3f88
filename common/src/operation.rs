//! Operation types and state machine for guarded deposits and withdrawals.

use crate::{AssetKind, BankError, HolderId, NativeAmount, OperationId, UnitAmount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operation status representing the lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    /// Guard acquired, nothing validated yet.
    Entered,
    /// Amount, capacity and balance preconditions passed.
    Validated,
    /// Canonical value (or delivery plan) obtained from the adapter.
    ValueResolved,
    /// Ledger store credited or debited.
    LedgerMutated,
    /// Asset moved to or from the holder.
    AssetSettled,
    /// All effects applied and the event published.
    Committed,
    /// Every effect undone.
    Reverted,
}

impl OperationStatus {
    /// Check if this is a final state.
    pub fn is_final(&self) -> bool {
        matches!(self, OperationStatus::Committed | OperationStatus::Reverted)
    }

    /// Get valid next states from current state.
    ///
    /// Deposits settle the asset before touching the ledger and withdrawals
    /// the other way round, so both orders are accepted between
    /// `ValueResolved` and `Committed`.
    pub fn valid_transitions(&self) -> &[OperationStatus] {
        match self {
            OperationStatus::Entered => &[OperationStatus::Validated, OperationStatus::Reverted],
            OperationStatus::Validated => &[
                OperationStatus::ValueResolved,
                OperationStatus::AssetSettled,
                OperationStatus::Reverted,
            ],
            OperationStatus::ValueResolved => &[
                OperationStatus::LedgerMutated,
                OperationStatus::Reverted,
            ],
            OperationStatus::LedgerMutated => &[
                OperationStatus::AssetSettled,
                OperationStatus::Committed,
                OperationStatus::Reverted,
            ],
            OperationStatus::AssetSettled => &[
                OperationStatus::ValueResolved,
                OperationStatus::Committed,
                OperationStatus::Reverted,
            ],
            OperationStatus::Committed => &[],
            OperationStatus::Reverted => &[],
        }
    }

    /// Check if transition to given state is valid.
    pub fn can_transition_to(&self, next: OperationStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// What a guarded operation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    Deposit,
    Withdraw,
}

/// One recorded state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: OperationStatus,
    pub to: OperationStatus,
    pub at: DateTime<Utc>,
}

/// A single guarded deposit or withdrawal in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    /// Unique operation identifier.
    pub id: OperationId,
    /// Deposit or withdraw.
    pub kind: OperationKind,
    /// Calling account holder.
    pub holder: HolderId,
    /// Asset deposited or requested.
    pub asset: AssetKind,
    /// Current status.
    pub status: OperationStatus,
    /// Every transition so far.
    pub history: Vec<StatusChange>,
    /// When the operation entered the guard.
    pub started_at: DateTime<Utc>,
}

impl Operation {
    /// Start a new operation in the `Entered` state.
    pub fn new(kind: OperationKind, holder: HolderId, asset: AssetKind) -> Self {
        Self {
            id: OperationId::new(),
            kind,
            holder,
            asset,
            status: OperationStatus::Entered,
            history: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Move to the next state, rejecting anything the state machine forbids.
    pub fn transition_to(&mut self, next: OperationStatus) -> Result<(), BankError> {
        if !self.status.can_transition_to(next) {
            return Err(BankError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.history.push(StatusChange {
            from: self.status,
            to: next,
            at: Utc::now(),
        });
        self.status = next;
        Ok(())
    }

    /// Mark the operation reverted. No-op if it already reached a final state.
    pub fn revert(&mut self) {
        if !self.status.is_final() {
            // Every non-final state may revert.
            let _ = self.transition_to(OperationStatus::Reverted);
        }
    }
}

/// Outcome of a committed operation returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Operation that produced this receipt.
    pub operation_id: OperationId,
    /// Deposit or withdraw.
    pub kind: OperationKind,
    /// Account holder.
    pub holder: HolderId,
    /// Asset moved.
    pub asset: AssetKind,
    /// Native amount moved (pulled in or delivered out).
    pub native_amount: NativeAmount,
    /// Canonical value credited or debited.
    pub unit_amount: UnitAmount,
}

//! Events published after an operation commits.

use crate::{AssetKind, HolderId, OperationId, UnitAmount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event emitted once per committed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BankEvent {
    /// Value credited to an account.
    Deposited {
        operation_id: OperationId,
        account: HolderId,
        asset: AssetKind,
        unit_amount: UnitAmount,
        at: DateTime<Utc>,
    },
    /// Value debited from an account and delivered.
    Withdrawn {
        operation_id: OperationId,
        account: HolderId,
        asset: AssetKind,
        unit_amount: UnitAmount,
        at: DateTime<Utc>,
    },
}

impl BankEvent {
    /// Account the event concerns.
    pub fn account(&self) -> &HolderId {
        match self {
            BankEvent::Deposited { account, .. } | BankEvent::Withdrawn { account, .. } => account,
        }
    }

    /// Canonical amount moved.
    pub fn unit_amount(&self) -> UnitAmount {
        match self {
            BankEvent::Deposited { unit_amount, .. } | BankEvent::Withdrawn { unit_amount, .. } => {
                *unit_amount
            }
        }
    }

    /// Operation that produced the event.
    pub fn operation_id(&self) -> OperationId {
        match self {
            BankEvent::Deposited { operation_id, .. }
            | BankEvent::Withdrawn { operation_id, .. } => *operation_id,
        }
    }
}

//! AssetBank Ledger Store
//!
//! Authoritative per-account canonical balances and the aggregate balance,
//! with a balance journal and checkpoint/restore for all-or-nothing
//! operations. Only the transaction engine mutates a store.

pub mod account;
pub mod balance;
pub mod store;

pub use account::Account;
pub use balance::{BalanceChange, BalanceChangeType};
pub use store::{Checkpoint, LedgerLimits, LedgerStore};

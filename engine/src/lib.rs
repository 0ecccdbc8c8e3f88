//! AssetBank Engine
//!
//! The guarded transaction executor. Each deposit or withdrawal runs as one
//! all-or-nothing operation:
//!
//! 1. Enter the re-entrancy guard (rejecting nested calls from collaborators).
//! 2. Checkpoint the ledger and validate the request.
//! 3. Move custody and resolve canonical value, re-checking the guard after
//!    every external call.
//! 4. Mutate the ledger, commit, then publish the event.
//!
//! Any failure restores the checkpoint and undoes custody movements newest
//! first.
//!
//! # Example
//!
//! ```rust,ignore
//! use assetbank_engine::{Bank, BankConfig, Custody};
//!
//! let bank = Bank::new(BankConfig::from_env(), valuation, custody)?;
//! let receipt = bank.deposit_native(&holder, 10u128.pow(18)).await?;
//! ```

pub mod bank;
pub mod config;
pub mod custody;
pub mod guard;
pub mod metrics;
pub mod transaction;

#[cfg(test)]
mod properties;

pub use bank::Bank;
pub use config::BankConfig;
pub use custody::{AssetEndpoint, Custody};
pub use guard::{GuardScope, ReentrancyGuard};
pub use metrics::{BankMetrics, MetricsSnapshot};
pub use transaction::{Compensation, RollbackReport, Transaction};

#[cfg(any(test, feature = "test-utils"))]
pub use custody::InMemoryAssetEndpoint;

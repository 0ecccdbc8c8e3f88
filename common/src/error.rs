//! Error types for AssetBank operations.
//!
//! Every variant is terminal: an operation that fails with any of these is
//! fully reverted and never retried internally.

use crate::{AssetKind, Decimals, OperationStatus, UnitAmount};
use thiserror::Error;

/// Main error type for AssetBank operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BankError {
    /// Zero or otherwise disallowed input quantity.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// The aggregate capacity would be breached.
    #[error("Exceeds bank capacity: total {total} + {additional} > capacity {capacity}")]
    ExceedsBankCapacity {
        total: UnitAmount,
        additional: UnitAmount,
        capacity: UnitAmount,
    },

    /// The account lacks the requested unit value, or does not exist.
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: UnitAmount,
        available: UnitAmount,
    },

    /// Single-withdrawal ceiling exceeded (or a zero withdrawal requested).
    #[error("Invalid withdraw amount {requested}: must be non-zero and at most {max}")]
    InvalidMaxWithdrawAmount {
        requested: UnitAmount,
        max: UnitAmount,
    },

    /// Unit amount is not exactly representable in the target precision.
    #[error("Precision mismatch: {amount} is not a multiple of 10^(18 - {target_decimals})")]
    PrecisionMismatch {
        amount: UnitAmount,
        target_decimals: Decimals,
    },

    /// Source precision exceeds the canonical precision.
    #[error("Precision overflow: {0} decimals exceeds the canonical 18")]
    PrecisionOverflow(Decimals),

    /// Fixed-point arithmetic left the representable range.
    #[error("Arithmetic overflow: {0}")]
    ArithmeticOverflow(String),

    /// Value arrived outside a recognised deposit entry point.
    #[error("Invalid deposit path: {0}")]
    InvalidDepositPath(String),

    /// An asset-transfer endpoint did not move the expected amount.
    #[error("Transfer of {asset} failed: {reason}")]
    TransferFailed { asset: AssetKind, reason: String },

    /// An exchange call did not deliver any output.
    #[error("Exchange failed: {0}")]
    ExchangeFailed(String),

    /// Exchange output fell below the configured minimum.
    #[error("Slippage exceeded: received {received}, minimum {minimum}")]
    SlippageExceeded { received: u128, minimum: u128 },

    /// The oracle reported a non-positive or malformed price.
    #[error("Invalid price quote: {0}")]
    InvalidPriceQuote(String),

    /// Asset kind is not configured on this bank.
    #[error("Unsupported asset: {0}")]
    UnsupportedAsset(AssetKind),

    /// A guarded entry point was invoked while the guard was held.
    #[error("Reentrancy detected")]
    ReentrancyDetected,

    /// Invalid operation state transition.
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: OperationStatus,
        to: OperationStatus,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl BankError {
    /// Check if this error is retryable.
    ///
    /// Always `false`: failures are definitive and the caller decides what
    /// to submit next.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Get the stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            BankError::InvalidAmount(_) => "INVALID_AMOUNT",
            BankError::ExceedsBankCapacity { .. } => "EXCEEDS_BANK_CAPACITY",
            BankError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            BankError::InvalidMaxWithdrawAmount { .. } => "INVALID_MAX_WITHDRAW_AMOUNT",
            BankError::PrecisionMismatch { .. } => "PRECISION_MISMATCH",
            BankError::PrecisionOverflow(_) => "PRECISION_OVERFLOW",
            BankError::ArithmeticOverflow(_) => "ARITHMETIC_OVERFLOW",
            BankError::InvalidDepositPath(_) => "INVALID_DEPOSIT_PATH",
            BankError::TransferFailed { .. } => "TRANSFER_FAILED",
            BankError::ExchangeFailed(_) => "EXCHANGE_FAILED",
            BankError::SlippageExceeded { .. } => "SLIPPAGE_EXCEEDED",
            BankError::InvalidPriceQuote(_) => "INVALID_PRICE_QUOTE",
            BankError::UnsupportedAsset(_) => "UNSUPPORTED_ASSET",
            BankError::ReentrancyDetected => "REENTRANCY_DETECTED",
            BankError::InvalidTransition { .. } => "INVALID_TRANSITION",
            BankError::ConfigurationError(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Helper for a failed transfer.
    pub fn transfer_failed(asset: &AssetKind, reason: impl Into<String>) -> Self {
        BankError::TransferFailed {
            asset: asset.clone(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for AssetBank operations.
pub type Result<T> = std::result::Result<T, BankError>;

//! Pricing error types.

use assetbank_common::{AssetKind, BankError};
use thiserror::Error;

/// Errors that can occur while valuing or exchanging an asset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    /// The oracle reported a non-positive or malformed price record.
    #[error("Invalid price quote for {pair}: {reason}")]
    InvalidPriceQuote { pair: String, reason: String },

    /// No price source configured for the asset.
    #[error("No price source configured for {0}")]
    FeedNotConfigured(AssetKind),

    /// The oracle could not be reached or has no record for the pair.
    #[error("Oracle error: {0}")]
    OracleUnavailable(String),

    /// The exchange delivered nothing or rejected the swap.
    #[error("Exchange failed: {0}")]
    ExchangeFailed(String),

    /// Realised exchange output below the configured floor.
    #[error("Slippage exceeded: received {received}, minimum {minimum}")]
    SlippageExceeded { received: u128, minimum: u128 },

    /// The strategy cannot perform the requested step.
    #[error("Not supported by the {strategy} strategy: {operation}")]
    Unsupported {
        strategy: &'static str,
        operation: &'static str,
    },

    /// Fixed-point conversion failed.
    #[error(transparent)]
    Conversion(#[from] BankError),
}

impl From<PricingError> for BankError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::InvalidPriceQuote { .. } | PricingError::OracleUnavailable(_) => {
                BankError::InvalidPriceQuote(err.to_string())
            }
            PricingError::FeedNotConfigured(asset) => BankError::UnsupportedAsset(asset),
            PricingError::ExchangeFailed(reason) => BankError::ExchangeFailed(reason),
            PricingError::SlippageExceeded { received, minimum } => {
                BankError::SlippageExceeded { received, minimum }
            }
            PricingError::Unsupported { .. } => BankError::ConfigurationError(err.to_string()),
            PricingError::Conversion(inner) => inner,
        }
    }
}

/// Result type for pricing operations.
pub type PricingResult<T> = Result<T, PricingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_into_bank_taxonomy() {
        let err: BankError = PricingError::InvalidPriceQuote {
            pair: "ETH/USD".to_string(),
            reason: "non-positive price".to_string(),
        }
        .into();
        assert_eq!(err.error_code(), "INVALID_PRICE_QUOTE");

        let err: BankError = PricingError::ExchangeFailed("zero output".to_string()).into();
        assert_eq!(err.error_code(), "EXCHANGE_FAILED");

        let inner = BankError::ArithmeticOverflow("test".to_string());
        let err: BankError = PricingError::from(inner.clone()).into();
        assert_eq!(err, inner);
    }
}

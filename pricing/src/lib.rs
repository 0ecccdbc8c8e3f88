//! AssetBank Pricing
//!
//! Produces canonical value quotes for asset amounts using one of two
//! interchangeable strategies.
//!
//! # Strategies
//!
//! - **Oracle quote**: read the latest price record for the asset's feed and
//!   compute the value analytically. Read-only.
//! - **Exchange execution**: swap the asset into the canonical reserve asset
//!   and take the realised output as the value. Moves custody.
//!
//! # Example
//!
//! ```rust,ignore
//! use assetbank_pricing::{OracleValuation, OracleValuationConfig, PricePair, Valuation};
//!
//! let config = OracleValuationConfig::default()
//!     .with_feed(AssetKind::Native, PricePair::new("ETH", "USD"));
//! let valuation = Valuation::Oracle(OracleValuation::new(oracle, config));
//!
//! let quote = valuation.resolve_deposit(&AssetSpec::ether(), amount).await?;
//! ```

pub mod error;
pub mod oracle;
pub mod exchange;
pub mod quote;
pub mod valuation;

pub use error::{PricingError, PricingResult};
pub use oracle::{PriceOracle, PricePair, PriceRecord};
pub use exchange::{Exchange, SlippageFloor, SwapRequest};
pub use quote::{CanonicalQuote, DeliveryPlan, QuoteSource};
pub use valuation::{
    AssetPricing, ExchangeValuation, ExchangeValuationConfig, OracleValuation,
    OracleValuationConfig, StrategyKind, Valuation,
};

#[cfg(any(test, feature = "test-utils"))]
pub use exchange::MockExchange;
#[cfg(any(test, feature = "test-utils"))]
pub use oracle::MockPriceOracle;

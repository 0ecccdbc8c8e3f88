//! The two valuation strategies.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use assetbank_common::{convert, AssetKind, AssetSpec, BankError, NativeAmount, UnitAmount};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{PricingError, PricingResult};
use crate::exchange::{Exchange, SlippageFloor, SwapRequest};
use crate::oracle::{PriceOracle, PricePair};
use crate::quote::{CanonicalQuote, DeliveryPlan, QuoteSource};

/// Which strategy a [`Valuation`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    Oracle,
    Exchange,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Oracle => write!(f, "oracle"),
            StrategyKind::Exchange => write!(f, "exchange"),
        }
    }
}

/// How the oracle strategy prices one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetPricing {
    /// Worth one canonical unit per whole native unit.
    Par,
    /// Priced by the oracle feed for this pair.
    Feed(PricePair),
}

/// Configuration for the oracle strategy.
#[derive(Debug, Clone, Default)]
pub struct OracleValuationConfig {
    /// Pricing per supported asset.
    pub prices: HashMap<AssetKind, AssetPricing>,
    /// Reject rounds older than this, when set.
    pub max_staleness: Option<Duration>,
}

impl OracleValuationConfig {
    /// Price an asset with an oracle feed.
    pub fn with_feed(mut self, asset: AssetKind, pair: PricePair) -> Self {
        self.prices.insert(asset, AssetPricing::Feed(pair));
        self
    }

    /// Value an asset at par.
    pub fn with_par(mut self, asset: AssetKind) -> Self {
        self.prices.insert(asset, AssetPricing::Par);
        self
    }

    /// Set the staleness window.
    pub fn with_max_staleness(mut self, window: Duration) -> Self {
        self.max_staleness = Some(window);
        self
    }
}

/// Oracle-quote strategy. Read-only.
pub struct OracleValuation {
    oracle: Arc<dyn PriceOracle>,
    config: OracleValuationConfig,
}

impl OracleValuation {
    /// Create a new oracle strategy.
    pub fn new(oracle: Arc<dyn PriceOracle>, config: OracleValuationConfig) -> Self {
        Self { oracle, config }
    }

    pub fn config(&self) -> &OracleValuationConfig {
        &self.config
    }

    fn pricing(&self, asset: &AssetKind) -> PricingResult<&AssetPricing> {
        self.config
            .prices
            .get(asset)
            .ok_or_else(|| PricingError::FeedNotConfigured(asset.clone()))
    }

    /// Latest validated price for a pair, scaled to 18 digits.
    async fn latest_price(&self, pair: &PricePair) -> PricingResult<(u128, u64)> {
        let record = self.oracle.latest_round(pair).await?;
        let price = record.price18(pair, Utc::now(), self.config.max_staleness)?;

        debug!(
            oracle = self.oracle.name(),
            pair = %pair,
            round_id = record.round_id,
            price = %price,
            "Read oracle price"
        );

        Ok((price, record.round_id))
    }

    async fn resolve_deposit(
        &self,
        asset: &AssetSpec,
        amount: NativeAmount,
    ) -> PricingResult<CanonicalQuote> {
        match self.pricing(&asset.kind)? {
            AssetPricing::Par => {
                let unit = convert::to_canonical(amount)?;
                Ok(CanonicalQuote::new(asset.kind.clone(), amount, unit, QuoteSource::Par))
            }
            AssetPricing::Feed(pair) => {
                let (price, round_id) = self.latest_price(pair).await?;
                let unit = convert::value_at_price(amount, price)?;
                Ok(CanonicalQuote::new(
                    asset.kind.clone(),
                    amount,
                    unit,
                    QuoteSource::Oracle {
                        pair: pair.clone(),
                        price,
                        round_id,
                    },
                ))
            }
        }
    }

    async fn plan_withdrawal(
        &self,
        asset: &AssetSpec,
        unit: UnitAmount,
    ) -> PricingResult<DeliveryPlan> {
        let amount = match self.pricing(&asset.kind)? {
            AssetPricing::Par => convert::from_canonical_exact(unit, asset.decimals)?,
            AssetPricing::Feed(pair) => {
                let (price, _) = self.latest_price(pair).await?;
                let amount = convert::amount_at_price(unit, price, asset.decimals)?;
                if amount.is_zero() {
                    return Err(BankError::InvalidAmount(format!(
                        "{} units is worth nothing in {}",
                        unit, asset.symbol
                    ))
                    .into());
                }
                amount
            }
        };

        Ok(DeliveryPlan::Direct {
            asset: asset.kind.clone(),
            amount,
        })
    }
}

/// Configuration for the exchange strategy.
#[derive(Debug, Clone)]
pub struct ExchangeValuationConfig {
    /// Asset every deposit is swapped into and every withdrawal paid from.
    pub reserve_asset: AssetSpec,
    /// Minimum-output policy for swaps.
    pub slippage: SlippageFloor,
}

impl Default for ExchangeValuationConfig {
    fn default() -> Self {
        Self {
            reserve_asset: AssetSpec::usdc(),
            slippage: SlippageFloor::default(),
        }
    }
}

/// Exchange-execution strategy. Moves custody.
pub struct ExchangeValuation {
    exchange: Arc<dyn Exchange>,
    config: ExchangeValuationConfig,
}

impl ExchangeValuation {
    /// Create a new exchange strategy.
    pub fn new(exchange: Arc<dyn Exchange>, config: ExchangeValuationConfig) -> Self {
        Self { exchange, config }
    }

    pub fn config(&self) -> &ExchangeValuationConfig {
        &self.config
    }

    fn is_reserve(&self, asset: &AssetKind) -> bool {
        *asset == self.config.reserve_asset.kind
    }

    /// Sell `amount_in` of `asset_in` for `asset_out`, honouring the floor.
    #[instrument(skip(self), fields(exchange = self.exchange.name()))]
    async fn swap(
        &self,
        asset_in: &AssetKind,
        amount_in: NativeAmount,
        asset_out: &AssetSpec,
    ) -> PricingResult<NativeAmount> {
        let min_amount_out = if self.config.slippage.is_protected() {
            let quoted = self
                .exchange
                .quote_exact_input(asset_in, &asset_out.kind, amount_in.raw)
                .await?;
            self.config.slippage.min_output(quoted)?
        } else {
            0
        };

        let request = SwapRequest {
            asset_in: asset_in.clone(),
            asset_out: asset_out.kind.clone(),
            amount_in: amount_in.raw,
            min_amount_out,
        };
        let received = self.exchange.swap_exact_input(&request).await?;

        if received == 0 {
            return Err(PricingError::ExchangeFailed(format!(
                "{} -> {} delivered nothing",
                asset_in, asset_out.kind
            )));
        }
        if received < min_amount_out {
            return Err(PricingError::SlippageExceeded {
                received,
                minimum: min_amount_out,
            });
        }

        debug!(received = %received, minimum = %min_amount_out, "Swap executed");
        Ok(asset_out.amount(received))
    }

    async fn resolve_deposit(
        &self,
        asset: &AssetSpec,
        amount: NativeAmount,
    ) -> PricingResult<CanonicalQuote> {
        if self.is_reserve(&asset.kind) {
            let unit = convert::to_canonical(amount)?;
            return Ok(
                CanonicalQuote::new(asset.kind.clone(), amount, unit, QuoteSource::Par)
                    .with_reserve(amount),
            );
        }

        let received = self
            .swap(&asset.kind, amount, &self.config.reserve_asset)
            .await?;
        let unit = convert::to_canonical(received)?;

        Ok(CanonicalQuote::new(
            asset.kind.clone(),
            amount,
            unit,
            QuoteSource::Exchange {
                venue: self.exchange.name().to_string(),
            },
        )
        .with_reserve(received))
    }

    fn plan_withdrawal(&self, asset: &AssetSpec, unit: UnitAmount) -> PricingResult<DeliveryPlan> {
        let reserve = &self.config.reserve_asset;
        let reserve_in = convert::from_canonical_exact(unit, reserve.decimals)?;

        if self.is_reserve(&asset.kind) {
            Ok(DeliveryPlan::Direct {
                asset: reserve.kind.clone(),
                amount: reserve_in,
            })
        } else {
            Ok(DeliveryPlan::Exchange {
                reserve_in,
                asset_out: asset.clone(),
            })
        }
    }
}

/// Canonical valuation, by either strategy.
pub enum Valuation {
    Oracle(OracleValuation),
    Exchange(ExchangeValuation),
}

impl Valuation {
    pub fn strategy(&self) -> StrategyKind {
        match self {
            Valuation::Oracle(_) => StrategyKind::Oracle,
            Valuation::Exchange(_) => StrategyKind::Exchange,
        }
    }

    /// Whether the strategy can value this asset at all.
    pub fn supports(&self, asset: &AssetKind) -> bool {
        match self {
            Valuation::Oracle(oracle) => oracle.config.prices.contains_key(asset),
            Valuation::Exchange(_) => true,
        }
    }

    /// Reserve asset held in custody, for the exchange strategy.
    pub fn reserve_asset(&self) -> Option<&AssetSpec> {
        match self {
            Valuation::Oracle(_) => None,
            Valuation::Exchange(exchange) => Some(&exchange.config.reserve_asset),
        }
    }

    /// Value a deposited amount already held in custody.
    ///
    /// The exchange strategy swaps it into the reserve asset first.
    pub async fn resolve_deposit(
        &self,
        asset: &AssetSpec,
        amount: NativeAmount,
    ) -> PricingResult<CanonicalQuote> {
        let quote = match self {
            Valuation::Oracle(oracle) => oracle.resolve_deposit(asset, amount).await?,
            Valuation::Exchange(exchange) => exchange.resolve_deposit(asset, amount).await?,
        };

        debug!(
            strategy = %self.strategy(),
            asset = %asset.kind,
            amount = %amount,
            unit_value = %quote.unit_value,
            "Resolved deposit value"
        );

        Ok(quote)
    }

    /// Work out what a withdrawal of `unit` into `asset` delivers.
    ///
    /// Fails with `PrecisionMismatch` when the canonical amount is scaled
    /// straight into a lower precision that cannot hold it exactly.
    pub async fn plan_withdrawal(
        &self,
        asset: &AssetSpec,
        unit: UnitAmount,
    ) -> PricingResult<DeliveryPlan> {
        match self {
            Valuation::Oracle(oracle) => oracle.plan_withdrawal(asset, unit).await,
            Valuation::Exchange(exchange) => exchange.plan_withdrawal(asset, unit),
        }
    }

    /// Swap reserve into the requested asset for a withdrawal.
    pub async fn execute_exchange(
        &self,
        reserve_in: NativeAmount,
        asset_out: &AssetSpec,
    ) -> PricingResult<NativeAmount> {
        match self {
            Valuation::Exchange(exchange) => {
                let reserve = exchange.config.reserve_asset.kind.clone();
                exchange.swap(&reserve, reserve_in, asset_out).await
            }
            Valuation::Oracle(_) => Err(PricingError::Unsupported {
                strategy: "oracle",
                operation: "exchange execution",
            }),
        }
    }

    /// Sell withdrawal output that was never delivered back into reserve.
    pub async fn unwind_exchange(
        &self,
        asset: &AssetKind,
        amount: NativeAmount,
    ) -> PricingResult<NativeAmount> {
        match self {
            Valuation::Exchange(exchange) => {
                let reserve = exchange.config.reserve_asset.clone();
                exchange.swap(asset, amount, &reserve).await
            }
            Valuation::Oracle(_) => Err(PricingError::Unsupported {
                strategy: "oracle",
                operation: "exchange unwind",
            }),
        }
    }
}

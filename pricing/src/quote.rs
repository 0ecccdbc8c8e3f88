//! Canonical value quotes and withdrawal delivery plans.

use assetbank_common::{AssetKind, AssetSpec, NativeAmount, UnitAmount};
use chrono::{DateTime, Utc};

use crate::oracle::PricePair;

/// Where a quote's value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteSource {
    /// One native unit is worth one canonical unit, scaled for precision.
    Par,
    /// Analytical value from an oracle round.
    Oracle {
        pair: PricePair,
        /// Price scaled to 18 digits.
        price: u128,
        round_id: u64,
    },
    /// Realised output of a swap into the reserve asset.
    Exchange { venue: String },
}

/// Unit-of-account value of an asset amount.
///
/// Ephemeral: consumed by the executor, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalQuote {
    /// Asset valued.
    pub asset: AssetKind,
    /// Amount valued, in the asset's own precision.
    pub native_amount: NativeAmount,
    /// Canonical value.
    pub unit_value: UnitAmount,
    /// Reserve asset actually received when the value came from a swap.
    pub reserve_received: Option<NativeAmount>,
    /// Pricing source.
    pub source: QuoteSource,
    /// When the quote was produced.
    pub quoted_at: DateTime<Utc>,
}

impl CanonicalQuote {
    pub(crate) fn new(
        asset: AssetKind,
        native_amount: NativeAmount,
        unit_value: UnitAmount,
        source: QuoteSource,
    ) -> Self {
        Self {
            asset,
            native_amount,
            unit_value,
            reserve_received: None,
            source,
            quoted_at: Utc::now(),
        }
    }

    pub(crate) fn with_reserve(mut self, received: NativeAmount) -> Self {
        self.reserve_received = Some(received);
        self
    }

    /// Whether producing the quote exchanged the deposited asset away.
    pub fn swapped(&self) -> bool {
        matches!(self.source, QuoteSource::Exchange { .. })
    }
}

/// How a withdrawal reaches the holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryPlan {
    /// Push `amount` of `asset` straight out of custody.
    Direct {
        asset: AssetKind,
        amount: NativeAmount,
    },
    /// Swap `reserve_in` of the reserve asset into `asset_out`, then push
    /// the realised output.
    Exchange {
        reserve_in: NativeAmount,
        asset_out: AssetSpec,
    },
}

impl DeliveryPlan {
    /// Asset the holder finally receives.
    pub fn delivered_asset(&self) -> &AssetKind {
        match self {
            DeliveryPlan::Direct { asset, .. } => asset,
            DeliveryPlan::Exchange { asset_out, .. } => &asset_out.kind,
        }
    }
}

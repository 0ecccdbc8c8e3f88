//! Exchange contract and minimum-output protection.

use async_trait::async_trait;
use assetbank_common::{convert, AssetKind};
use serde::{Deserialize, Serialize};

use crate::error::{PricingError, PricingResult};

/// Basis points in one whole.
const BPS: u128 = 10_000;

/// Exact-input swap submitted to an exchange.
///
/// Output is always delivered to the submitter's custody.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    /// Asset sold.
    pub asset_in: AssetKind,
    /// Asset bought.
    pub asset_out: AssetKind,
    /// Raw amount sold, in `asset_in` precision.
    pub amount_in: u128,
    /// Smallest acceptable raw output; zero means unprotected.
    pub min_amount_out: u128,
}

/// Trait for exchanges.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Get the exchange name.
    fn name(&self) -> &str;

    /// Read-only estimate of the output of an exact-input swap.
    async fn quote_exact_input(
        &self,
        asset_in: &AssetKind,
        asset_out: &AssetKind,
        amount_in: u128,
    ) -> PricingResult<u128>;

    /// Execute an exact-input swap and return the realised raw output.
    async fn swap_exact_input(&self, request: &SwapRequest) -> PricingResult<u128>;
}

/// Minimum-output policy for exchange calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlippageFloor {
    /// Accept any non-zero output.
    Unprotected,
    /// Accept at most this many basis points below the exchange's own quote.
    MaxSlippageBps(u32),
}

impl Default for SlippageFloor {
    fn default() -> Self {
        SlippageFloor::MaxSlippageBps(50)
    }
}

impl SlippageFloor {
    pub fn is_protected(&self) -> bool {
        matches!(self, SlippageFloor::MaxSlippageBps(_))
    }

    /// Minimum raw output given the exchange's quoted output, floored.
    pub fn min_output(&self, quoted: u128) -> PricingResult<u128> {
        match self {
            SlippageFloor::Unprotected => Ok(0),
            SlippageFloor::MaxSlippageBps(bps) => {
                let kept = BPS.saturating_sub(*bps as u128);
                Ok(convert::mul_div_floor(quoted, kept, BPS)?)
            }
        }
    }
}

/// Mock exchange for testing.
///
/// Prices each directed pair with a raw-to-raw ratio. Execution can be
/// made worse than the quote with a haircut, or forced to deliver nothing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockExchange {
    name: String,
    rates: dashmap::DashMap<(AssetKind, AssetKind), (u128, u128)>,
    haircut_bps: std::sync::atomic::AtomicU32,
    deliver_nothing: std::sync::atomic::AtomicBool,
    swaps: parking_lot::Mutex<Vec<SwapRequest>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockExchange {
    /// Create a new mock exchange.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rates: dashmap::DashMap::new(),
            haircut_bps: std::sync::atomic::AtomicU32::new(0),
            deliver_nothing: std::sync::atomic::AtomicBool::new(false),
            swaps: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// `amount_out = amount_in * numerator / denominator` in raw units.
    pub fn set_rate(
        &self,
        asset_in: AssetKind,
        asset_out: AssetKind,
        numerator: u128,
        denominator: u128,
    ) {
        self.rates.insert((asset_in, asset_out), (numerator, denominator));
    }

    /// Make executions deliver `bps` basis points less than quoted.
    pub fn set_haircut_bps(&self, bps: u32) {
        self.haircut_bps
            .store(bps, std::sync::atomic::Ordering::SeqCst);
    }

    /// Make executions deliver zero output.
    pub fn set_deliver_nothing(&self, enabled: bool) {
        self.deliver_nothing
            .store(enabled, std::sync::atomic::Ordering::SeqCst);
    }

    /// Swaps executed so far.
    pub fn swaps(&self) -> Vec<SwapRequest> {
        self.swaps.lock().clone()
    }

    fn quote(&self, asset_in: &AssetKind, asset_out: &AssetKind, amount_in: u128) -> PricingResult<u128> {
        let (numerator, denominator) = self
            .rates
            .get(&(asset_in.clone(), asset_out.clone()))
            .map(|r| *r)
            .ok_or_else(|| {
                PricingError::ExchangeFailed(format!("no pool for {} -> {}", asset_in, asset_out))
            })?;
        Ok(convert::mul_div_floor(amount_in, numerator, denominator)?)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl Exchange for MockExchange {
    fn name(&self) -> &str {
        &self.name
    }

    async fn quote_exact_input(
        &self,
        asset_in: &AssetKind,
        asset_out: &AssetKind,
        amount_in: u128,
    ) -> PricingResult<u128> {
        self.quote(asset_in, asset_out, amount_in)
    }

    async fn swap_exact_input(&self, request: &SwapRequest) -> PricingResult<u128> {
        let quoted = self.quote(&request.asset_in, &request.asset_out, request.amount_in)?;
        let amount_out = if self.deliver_nothing.load(std::sync::atomic::Ordering::SeqCst) {
            0
        } else {
            let haircut = self.haircut_bps.load(std::sync::atomic::Ordering::SeqCst);
            SlippageFloor::MaxSlippageBps(haircut).min_output(quoted)?
        };

        if amount_out < request.min_amount_out {
            return Err(PricingError::SlippageExceeded {
                received: amount_out,
                minimum: request.min_amount_out,
            });
        }

        self.swaps.lock().push(request.clone());
        Ok(amount_out)
    }
}

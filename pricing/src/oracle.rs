//! Price oracle contract and record validation.

use async_trait::async_trait;
use assetbank_common::{convert, Decimals};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PricingError, PricingResult};

/// A priced pair, e.g. `ETH/USD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PricePair {
    /// Asset being priced.
    pub base: String,
    /// Denomination of the price (the unit of account).
    pub quote: String,
}

impl PricePair {
    /// Create a new pair. Codes are uppercased.
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }
}

impl fmt::Display for PricePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Latest round reported by an oracle feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRecord {
    /// Round the answer belongs to.
    pub round_id: u64,
    /// Reported price, signed as feeds report it.
    pub answer: i128,
    /// Fractional digits of `answer`.
    pub decimals: u8,
    /// When the round was last updated.
    pub updated_at: DateTime<Utc>,
    /// Round in which the answer was computed.
    pub answered_in_round: u64,
}

impl PriceRecord {
    /// A complete record for the current round.
    pub fn new(round_id: u64, answer: i128, decimals: u8) -> Self {
        Self {
            round_id,
            answer,
            decimals,
            updated_at: Utc::now(),
            answered_in_round: round_id,
        }
    }

    /// Validate the record and return its price scaled to 18 digits.
    ///
    /// Rejects non-positive answers, precisions above 18, rounds answered
    /// in an earlier round, timestamps from the future, and (when
    /// `max_staleness` is set) records older than the window.
    pub fn price18(
        &self,
        pair: &PricePair,
        now: DateTime<Utc>,
        max_staleness: Option<Duration>,
    ) -> PricingResult<u128> {
        let invalid = |reason: String| PricingError::InvalidPriceQuote {
            pair: pair.to_string(),
            reason,
        };

        if self.answer <= 0 {
            return Err(invalid(format!("non-positive price {}", self.answer)));
        }
        if self.decimals > Decimals::CANONICAL.get() {
            return Err(invalid(format!("{} decimals exceeds 18", self.decimals)));
        }
        if self.answered_in_round < self.round_id {
            return Err(invalid(format!(
                "round {} answered in earlier round {}",
                self.round_id, self.answered_in_round
            )));
        }
        if self.updated_at > now {
            return Err(invalid(format!("updated in the future at {}", self.updated_at)));
        }
        if let Some(window) = max_staleness {
            let age = now.signed_duration_since(self.updated_at);
            if age > window {
                return Err(invalid(format!("stale by {}s", age.num_seconds())));
            }
        }

        let answer = u128::try_from(self.answer)
            .map_err(|_| invalid(format!("unrepresentable price {}", self.answer)))?;
        Ok(convert::scale_price(answer, Decimals::new(self.decimals))?)
    }
}

/// Trait for price oracles.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Get the oracle name.
    fn name(&self) -> &str;

    /// Latest round for a pair.
    async fn latest_round(&self, pair: &PricePair) -> PricingResult<PriceRecord>;
}

/// Mock oracle for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockPriceOracle {
    name: String,
    records: dashmap::DashMap<PricePair, PriceRecord>,
    rounds: std::sync::atomic::AtomicU64,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockPriceOracle {
    /// Create a new mock oracle.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: dashmap::DashMap::new(),
            rounds: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Publish a fresh round with the given answer.
    pub fn set_price(&self, pair: PricePair, answer: i128, decimals: u8) {
        let round = self
            .rounds
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;
        self.records.insert(pair, PriceRecord::new(round, answer, decimals));
    }

    /// Publish an arbitrary record, malformed or not.
    pub fn set_record(&self, pair: PricePair, record: PriceRecord) {
        self.records.insert(pair, record);
    }

    /// Drop the feed for a pair.
    pub fn remove(&self, pair: &PricePair) {
        self.records.remove(pair);
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl PriceOracle for MockPriceOracle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn latest_round(&self, pair: &PricePair) -> PricingResult<PriceRecord> {
        self.records
            .get(pair)
            .map(|r| r.clone())
            .ok_or_else(|| PricingError::OracleUnavailable(format!("no round for {}", pair)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth_usd() -> PricePair {
        PricePair::new("eth", "usd")
    }

    #[test]
    fn test_pair_display() {
        assert_eq!(eth_usd().to_string(), "ETH/USD");
    }

    #[test]
    fn test_price_scaled_to_18_digits() {
        let record = PriceRecord::new(1, 2_000 * 10i128.pow(8), 8);
        let price = record.price18(&eth_usd(), Utc::now(), None).unwrap();
        assert_eq!(price, 2_000 * 10u128.pow(18));
    }

    #[test]
    fn test_rejects_non_positive_answer() {
        let now = Utc::now();
        for answer in [0, -1] {
            let record = PriceRecord::new(1, answer, 8);
            assert!(matches!(
                record.price18(&eth_usd(), now, None),
                Err(PricingError::InvalidPriceQuote { .. })
            ));
        }
    }

    #[test]
    fn test_rejects_malformed_records() {
        let now = Utc::now();

        let wide = PriceRecord::new(1, 1, 19);
        assert!(wide.price18(&eth_usd(), now, None).is_err());

        let mut carried = PriceRecord::new(5, 100, 8);
        carried.answered_in_round = 4;
        assert!(carried.price18(&eth_usd(), now, None).is_err());

        let mut future = PriceRecord::new(1, 100, 8);
        future.updated_at = now + Duration::minutes(5);
        assert!(future.price18(&eth_usd(), now, None).is_err());
    }

    #[test]
    fn test_staleness_window() {
        let now = Utc::now();
        let mut record = PriceRecord::new(1, 100, 8);
        record.updated_at = now - Duration::hours(2);

        assert!(record.price18(&eth_usd(), now, None).is_ok());
        assert!(record
            .price18(&eth_usd(), now, Some(Duration::hours(3)))
            .is_ok());
        assert!(record
            .price18(&eth_usd(), now, Some(Duration::hours(1)))
            .is_err());
    }

    #[tokio::test]
    async fn test_mock_oracle_rounds() {
        let oracle = MockPriceOracle::new("test");
        oracle.set_price(eth_usd(), 2_000, 0);
        oracle.set_price(eth_usd(), 2_100, 0);

        let record = oracle.latest_round(&eth_usd()).await.unwrap();
        assert_eq!(record.round_id, 2);
        assert_eq!(record.answer, 2_100);

        let missing = oracle.latest_round(&PricePair::new("BTC", "USD")).await;
        assert!(matches!(missing, Err(PricingError::OracleUnavailable(_))));
    }
}

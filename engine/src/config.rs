//! Bank configuration.

use std::collections::HashSet;
use std::str::FromStr;

use assetbank_common::{AssetKind, AssetSpec, Decimals, UnitAmount};
use assetbank_ledger::LedgerLimits;
use rust_decimal::Decimal;

/// Main bank configuration. Fixed at construction.
#[derive(Debug, Clone)]
pub struct BankConfig {
    /// Maximum permissible aggregate balance.
    pub capacity: UnitAmount,
    /// Ceiling on a single withdrawal's unit value.
    pub max_withdraw_per_op: UnitAmount,
    /// Chain-native asset, deposited as attached value.
    pub native_asset: AssetSpec,
    /// Canonical reserve asset.
    pub reserve_asset: AssetSpec,
    /// Further fungible assets accepted for deposit.
    pub assets: Vec<AssetSpec>,
    /// Buffered events per subscriber.
    pub event_capacity: usize,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            capacity: UnitAmount::from_raw(1_000_000 * UnitAmount::ONE.raw()),
            max_withdraw_per_op: UnitAmount::from_raw(10_000 * UnitAmount::ONE.raw()),
            native_asset: AssetSpec::ether(),
            reserve_asset: AssetSpec::usdc(),
            assets: Vec::new(),
            event_capacity: 1024,
        }
    }
}

impl BankConfig {
    /// Load configuration from environment variables.
    ///
    /// Limits are whole-unit decimals, e.g. `ASSETBANK_CAPACITY=1000.5`.
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(capacity) = env_units("ASSETBANK_CAPACITY") {
            config.capacity = capacity;
        }

        if let Some(max) = env_units("ASSETBANK_MAX_WITHDRAW") {
            config.max_withdraw_per_op = max;
        }

        if let Ok(capacity) = std::env::var("ASSETBANK_EVENT_CAPACITY") {
            if let Ok(capacity) = capacity.parse() {
                config.event_capacity = capacity;
            }
        }

        config
    }

    /// Add a fungible asset.
    pub fn with_asset(mut self, asset: AssetSpec) -> Self {
        self.assets.push(asset);
        self
    }

    /// Every asset this bank accepts, native first.
    pub fn all_assets(&self) -> impl Iterator<Item = &AssetSpec> {
        std::iter::once(&self.native_asset)
            .chain(std::iter::once(&self.reserve_asset))
            .chain(self.assets.iter())
    }

    /// Look up a configured asset.
    pub fn asset_spec(&self, kind: &AssetKind) -> Option<&AssetSpec> {
        self.all_assets().find(|a| &a.kind == kind)
    }

    /// Ledger limits derived from this configuration.
    pub fn limits(&self) -> LedgerLimits {
        LedgerLimits {
            capacity: self.capacity,
            max_withdraw_per_op: self.max_withdraw_per_op,
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity.is_zero() {
            return Err("Capacity cannot be 0".to_string());
        }

        if self.max_withdraw_per_op.is_zero() {
            return Err("Max withdraw per operation cannot be 0".to_string());
        }

        if self.max_withdraw_per_op > self.capacity {
            return Err("Max withdraw per operation cannot exceed capacity".to_string());
        }

        if !self.native_asset.kind.is_native() {
            return Err("Native asset must be of native kind".to_string());
        }

        if self.event_capacity == 0 {
            return Err("Event capacity cannot be 0".to_string());
        }

        let mut seen = HashSet::new();
        for asset in self.all_assets() {
            if asset.decimals > Decimals::CANONICAL {
                return Err(format!(
                    "{} has {} decimals, more than the canonical 18",
                    asset.symbol, asset.decimals
                ));
            }
            if !seen.insert(&asset.kind) {
                return Err(format!("{} configured twice", asset.kind));
            }
        }

        Ok(())
    }
}

fn env_units(key: &str) -> Option<UnitAmount> {
    let value = std::env::var(key).ok()?;
    let value = Decimal::from_str(value.trim()).ok()?;
    UnitAmount::from_decimal(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config() {
        let config = BankConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.asset_spec(&AssetKind::Native), Some(&AssetSpec::ether()));
        assert_eq!(config.all_assets().count(), 2);
    }

    #[test]
    fn test_invalid_limits() {
        let mut config = BankConfig::default();
        config.capacity = UnitAmount::ZERO;
        assert!(config.validate().is_err());

        let mut config = BankConfig::default();
        config.max_withdraw_per_op = config.capacity.checked_add(UnitAmount::ONE).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_assets() {
        let config = BankConfig::default().with_asset(AssetSpec::token("WIDE", 24));
        assert!(config.validate().is_err());

        let config = BankConfig::default().with_asset(AssetSpec::usdc());
        assert!(config.validate().unwrap_err().contains("twice"));
    }

    #[test]
    fn test_env_units_parse_decimals() {
        std::env::set_var("ASSETBANK_TEST_UNITS", "1000.5");
        assert_eq!(
            env_units("ASSETBANK_TEST_UNITS"),
            UnitAmount::from_decimal(dec!(1000.5))
        );

        std::env::set_var("ASSETBANK_TEST_UNITS", "-3");
        assert_eq!(env_units("ASSETBANK_TEST_UNITS"), None);
        std::env::remove_var("ASSETBANK_TEST_UNITS");
    }
}

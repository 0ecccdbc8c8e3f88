//! Fixed-point monetary types for the AssetBank ledger.
//!
//! Two amount types exist and never mix implicitly:
//!
//! - [`NativeAmount`] is a raw integer in an asset's own precision
//!   (6 digits for a dollar stablecoin, 8 for wrapped bitcoin, 18 for ether).
//! - [`UnitAmount`] is the ledger's canonical unit of account, always
//!   18 fractional digits.
//!
//! The only way to move between them is through [`crate::convert`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::AssetId;

/// Number of fractional digits of a fixed-point representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Decimals(u8);

impl Decimals {
    /// Precision of the canonical unit of account.
    pub const CANONICAL: Decimals = Decimals(18);

    /// Create a precision descriptor.
    pub const fn new(digits: u8) -> Self {
        Self(digits)
    }

    /// Number of fractional digits.
    pub const fn get(&self) -> u8 {
        self.0
    }

    /// `10^digits`, or `None` if it does not fit in a `u128`.
    pub fn scale_factor(&self) -> Option<u128> {
        10u128.checked_pow(self.0 as u32)
    }
}

impl fmt::Display for Decimals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw `u128` amounts travel as decimal strings; JSON numbers lose them.
mod raw_string {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(raw: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&raw.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// A value in the canonical unit of account (18 fractional digits).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct UnitAmount(#[serde(with = "raw_string")] u128);

impl UnitAmount {
    /// Zero units.
    pub const ZERO: UnitAmount = UnitAmount(0);

    /// `10^18`, one whole unit.
    pub const ONE: UnitAmount = UnitAmount(1_000_000_000_000_000_000);

    /// Wrap a raw canonical integer (already scaled by `10^18`).
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Build from a count of whole units.
    pub fn from_whole(units: u128) -> Option<Self> {
        units.checked_mul(Self::ONE.0).map(Self)
    }

    /// Build from a non-negative decimal with at most 18 fractional digits.
    pub fn from_decimal(value: Decimal) -> Option<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return None;
        }
        let value = value.normalize();
        let scale = value.scale();
        if scale > Decimals::CANONICAL.get() as u32 {
            return None;
        }
        let factor = 10u128.checked_pow(Decimals::CANONICAL.get() as u32 - scale)?;
        let mantissa = u128::try_from(value.mantissa()).ok()?;
        mantissa.checked_mul(factor).map(Self)
    }

    /// Raw canonical integer.
    pub const fn raw(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: UnitAmount) -> Option<UnitAmount> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: UnitAmount) -> Option<UnitAmount> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_sub(self, other: UnitAmount) -> UnitAmount {
        Self(self.0.saturating_sub(other.0))
    }

    /// Human-readable decimal, when the raw value fits in a `Decimal` mantissa.
    pub fn to_decimal(&self) -> Option<Decimal> {
        let raw = i128::try_from(self.0).ok()?;
        Decimal::try_from_i128_with_scale(raw, Decimals::CANONICAL.get() as u32)
            .ok()
            .map(|d| d.normalize())
    }
}

impl fmt::Display for UnitAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_decimal() {
            Some(value) => write!(f, "{}", value),
            None => write!(f, "{}e-18", self.0),
        }
    }
}

/// An amount expressed in an asset's own fixed-point precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativeAmount {
    /// Raw integer amount.
    #[serde(with = "raw_string")]
    pub raw: u128,
    /// Precision of `raw`.
    pub decimals: Decimals,
}

impl NativeAmount {
    /// Create a native amount.
    pub const fn new(raw: u128, decimals: Decimals) -> Self {
        Self { raw, decimals }
    }

    /// Zero in the given precision.
    pub const fn zero(decimals: Decimals) -> Self {
        Self { raw: 0, decimals }
    }

    pub fn is_zero(&self) -> bool {
        self.raw == 0
    }

    /// Human-readable decimal, when the raw value fits in a `Decimal` mantissa.
    pub fn to_decimal(&self) -> Option<Decimal> {
        let raw = i128::try_from(self.raw).ok()?;
        Decimal::try_from_i128_with_scale(raw, self.decimals.get() as u32)
            .ok()
            .map(|d| d.normalize())
    }
}

impl fmt::Display for NativeAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_decimal() {
            Some(value) => write!(f, "{}", value),
            None => write!(f, "{}e-{}", self.raw, self.decimals),
        }
    }
}

/// The kind of asset a holder deposits or withdraws.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssetKind {
    /// The chain-native asset, attached to the call as value.
    Native,
    /// A fungible token pulled from, or pushed to, the holder.
    Token(AssetId),
}

impl AssetKind {
    /// Shorthand for a token kind.
    pub fn token(code: impl Into<String>) -> Self {
        AssetKind::Token(AssetId::new(code))
    }

    pub fn is_native(&self) -> bool {
        matches!(self, AssetKind::Native)
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetKind::Native => write!(f, "NATIVE"),
            AssetKind::Token(id) => write!(f, "{}", id),
        }
    }
}

/// Static description of a supported asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSpec {
    /// Asset kind.
    pub kind: AssetKind,
    /// Display symbol.
    pub symbol: String,
    /// Native precision.
    pub decimals: Decimals,
}

impl AssetSpec {
    /// Describe the chain-native asset.
    pub fn native(symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            kind: AssetKind::Native,
            symbol: symbol.into(),
            decimals: Decimals::new(decimals),
        }
    }

    /// Describe a fungible token.
    pub fn token(code: impl Into<String>, decimals: u8) -> Self {
        let id = AssetId::new(code);
        Self {
            symbol: id.code().to_string(),
            kind: AssetKind::Token(id),
            decimals: Decimals::new(decimals),
        }
    }

    /// Wrap a raw amount in this asset's precision.
    pub fn amount(&self, raw: u128) -> NativeAmount {
        NativeAmount::new(raw, self.decimals)
    }

    /// Common assets
    pub fn ether() -> Self {
        Self::native("ETH", 18)
    }

    pub fn usdc() -> Self {
        Self::token("USDC", 6)
    }

    pub fn wbtc() -> Self {
        Self::token("WBTC", 8)
    }
}

impl fmt::Display for AssetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} decimals)", self.symbol, self.decimals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_unit_amount_from_whole() {
        let amount = UnitAmount::from_whole(2_000).unwrap();
        assert_eq!(amount.raw(), 2_000 * 10u128.pow(18));
        assert!(UnitAmount::from_whole(u128::MAX).is_none());
    }

    #[test]
    fn test_unit_amount_from_decimal() {
        let amount = UnitAmount::from_decimal(dec!(1.5)).unwrap();
        assert_eq!(amount.raw(), 15 * 10u128.pow(17));

        assert!(UnitAmount::from_decimal(dec!(-1)).is_none());
        assert_eq!(UnitAmount::from_decimal(dec!(0)), Some(UnitAmount::ZERO));
    }

    #[test]
    fn test_unit_amount_display() {
        let amount = UnitAmount::from_raw(1_500_000_000_000_000_000);
        assert_eq!(amount.to_string(), "1.5");
    }

    #[test]
    fn test_checked_arithmetic() {
        let a = UnitAmount::from_whole(10).unwrap();
        let b = UnitAmount::from_whole(4).unwrap();
        assert_eq!(a.checked_sub(b), UnitAmount::from_whole(6));
        assert_eq!(b.checked_sub(a), None);
        assert_eq!(b.saturating_sub(a), UnitAmount::ZERO);
    }

    #[test]
    fn test_native_amount_display() {
        let usdc = AssetSpec::usdc().amount(1_234_500);
        assert_eq!(usdc.to_string(), "1.2345");
    }

    #[test]
    fn test_amounts_serialize_as_strings() {
        let amount = UnitAmount::from_whole(2_000).unwrap();
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"2000000000000000000000\"");
        assert_eq!(serde_json::from_str::<UnitAmount>(&json).unwrap(), amount);
    }

    #[test]
    fn test_asset_kind_ordering() {
        assert!(AssetKind::Native < AssetKind::token("USDC"));
        assert_eq!(AssetKind::token("usdc").to_string(), "USDC");
    }
}

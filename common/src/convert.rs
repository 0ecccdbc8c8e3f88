//! Fixed-point unit conversion.
//!
//! Scales amounts between an asset's native precision and the canonical
//! 18-digit unit of account. Scaling up is lossless; scaling down either
//! floors ([`from_canonical`]) or refuses anything that would truncate
//! ([`from_canonical_exact`]). Division always floors, so a conversion never
//! rounds in the requester's favour.

use crate::{BankError, Decimals, NativeAmount, Result, UnitAmount};

const LOW_MASK: u128 = u64::MAX as u128;

/// `10^(18 - decimals)`, failing for precisions above the canonical one.
fn canonical_gap(decimals: Decimals) -> Result<u128> {
    let canonical = Decimals::CANONICAL.get();
    if decimals.get() > canonical {
        return Err(BankError::PrecisionOverflow(decimals));
    }
    Decimals::new(canonical - decimals.get())
        .scale_factor()
        .ok_or_else(|| BankError::ArithmeticOverflow("scale factor".to_string()))
}

fn scale_up(raw: u128, decimals: Decimals) -> Result<u128> {
    let factor = canonical_gap(decimals)?;
    raw.checked_mul(factor).ok_or_else(|| {
        BankError::ArithmeticOverflow(format!("{} at {} decimals exceeds u128", raw, decimals))
    })
}

/// Scale a native amount up to canonical units.
///
/// Fails with `PrecisionOverflow` if the source has more than 18 decimals.
pub fn to_canonical(amount: NativeAmount) -> Result<UnitAmount> {
    scale_up(amount.raw, amount.decimals).map(UnitAmount::from_raw)
}

/// Scale canonical units down to `target` precision, flooring any remainder.
pub fn from_canonical(unit: UnitAmount, target: Decimals) -> Result<NativeAmount> {
    let factor = canonical_gap(target)?;
    Ok(NativeAmount::new(unit.raw() / factor, target))
}

/// Whether `unit` scales down to `target` precision without truncation.
pub fn is_exactly_representable(unit: UnitAmount, target: Decimals) -> bool {
    match canonical_gap(target) {
        Ok(factor) => unit.raw() % factor == 0,
        Err(_) => false,
    }
}

/// Scale canonical units down to `target` precision, refusing to truncate.
pub fn from_canonical_exact(unit: UnitAmount, target: Decimals) -> Result<NativeAmount> {
    canonical_gap(target)?;
    if !is_exactly_representable(unit, target) {
        return Err(BankError::PrecisionMismatch {
            amount: unit,
            target_decimals: target,
        });
    }
    from_canonical(unit, target)
}

/// Scale an oracle price reported with `decimals` digits to 18 digits.
pub fn scale_price(price: u128, decimals: Decimals) -> Result<u128> {
    scale_up(price, decimals)
}

/// Canonical value of `amount` at an 18-digit unit price:
/// `price * amount / 10^18`, floored.
pub fn value_at_price(amount: NativeAmount, price: u128) -> Result<UnitAmount> {
    let amount = to_canonical(amount)?;
    mul_div_floor(price, amount.raw(), UnitAmount::ONE.raw()).map(UnitAmount::from_raw)
}

/// Native amount of an asset worth `unit` at an 18-digit unit price,
/// floored at both the price division and the precision scale-down.
pub fn amount_at_price(unit: UnitAmount, price: u128, target: Decimals) -> Result<NativeAmount> {
    if price == 0 {
        return Err(BankError::InvalidPriceQuote("zero price".to_string()));
    }
    let canonical = mul_div_floor(unit.raw(), UnitAmount::ONE.raw(), price)?;
    from_canonical(UnitAmount::from_raw(canonical), target)
}

/// `a * b / d` with a 256-bit intermediate product, floored.
///
/// Fails only when `d` is zero or the quotient itself exceeds `u128`.
pub fn mul_div_floor(a: u128, b: u128, d: u128) -> Result<u128> {
    if d == 0 {
        return Err(BankError::ArithmeticOverflow("division by zero".to_string()));
    }
    let (hi, lo) = widening_mul(a, b);
    if hi == 0 {
        return Ok(lo / d);
    }
    if hi >= d {
        return Err(BankError::ArithmeticOverflow(format!(
            "{} * {} / {} exceeds u128",
            a, b, d
        )));
    }

    // Restoring long division of the 256-bit (hi, lo) by d; rem < d throughout.
    let mut rem = hi;
    let mut quotient: u128 = 0;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> bit) & 1);
        quotient <<= 1;
        if carry == 1 || rem >= d {
            rem = rem.wrapping_sub(d);
            quotient |= 1;
        }
    }
    Ok(quotient)
}

/// Full 256-bit product as `(high, low)` halves.
fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    let (a_hi, a_lo) = (a >> 64, a & LOW_MASK);
    let (b_hi, b_lo) = (b >> 64, b & LOW_MASK);

    let ll = a_lo * b_lo;
    let lh = a_lo * b_hi;
    let hl = a_hi * b_lo;
    let hh = a_hi * b_hi;

    let mid = (ll >> 64) + (lh & LOW_MASK) + (hl & LOW_MASK);
    let lo = (ll & LOW_MASK) | (mid << 64);
    let hi = hh + (lh >> 64) + (hl >> 64) + (mid >> 64);
    (hi, lo)
}

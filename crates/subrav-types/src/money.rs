//! Money-like newtypes: USD-denominated prices and asset-denominated balances.
//!
//! Both types serialize as decimal strings on the wire (spec §6: "All numeric
//! fields are strings to preserve precision"), following the same reasoning
//! as the teacher's `UnixTimestamp`/`MoneyAmount` newtypes: JSON numbers lose
//! precision once a value no longer fits in an `f64` mantissa, which 256-bit
//! asset amounts routinely do not.

use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A price or cost denominated in picoUSD (10^-12 USD), the unit the billing
/// strategies and rate provider speak (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct PicoUsd(pub u128);

impl PicoUsd {
    pub const ZERO: PicoUsd = PicoUsd(0);

    pub fn checked_add(self, other: PicoUsd) -> Option<PicoUsd> {
        self.0.checked_add(other.0).map(PicoUsd)
    }

    pub fn checked_mul_u64(self, factor: u64) -> Option<PicoUsd> {
        self.0.checked_mul(factor as u128).map(PicoUsd)
    }
}

impl Add for PicoUsd {
    type Output = PicoUsd;
    fn add(self, rhs: PicoUsd) -> PicoUsd {
        PicoUsd(self.0 + rhs.0)
    }
}

impl fmt::Display for PicoUsd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid picoUSD decimal string: {0}")]
pub struct PicoUsdParseError(String);

impl FromStr for PicoUsd {
    type Err = PicoUsdParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u128>()
            .map(PicoUsd)
            .map_err(|_| PicoUsdParseError(s.to_string()))
    }
}

impl Serialize for PicoUsd {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PicoUsd {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PicoUsd::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// An amount denominated in the channel's asset, in the asset's smallest
/// unit (spec §3: `accumulatedAmount` is a u256).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct AssetAmount(pub U256);

impl AssetAmount {
    pub const ZERO: AssetAmount = AssetAmount(U256::ZERO);

    pub fn from_u128(value: u128) -> Self {
        AssetAmount(U256::from(value))
    }

    pub fn checked_add(self, other: AssetAmount) -> Option<AssetAmount> {
        self.0.checked_add(other.0).map(AssetAmount)
    }
}

impl Add for AssetAmount {
    type Output = AssetAmount;
    fn add(self, rhs: AssetAmount) -> AssetAmount {
        AssetAmount(self.0 + rhs.0)
    }
}

impl Sub for AssetAmount {
    type Output = AssetAmount;
    fn sub(self, rhs: AssetAmount) -> AssetAmount {
        AssetAmount(self.0 - rhs.0)
    }
}

impl fmt::Display for AssetAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid asset amount decimal string: {0}")]
pub struct AssetAmountParseError(String);

impl FromStr for AssetAmount {
    type Err = AssetAmountParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        U256::from_str(s)
            .map(AssetAmount)
            .map_err(|_| AssetAmountParseError(s.to_string()))
    }
}

impl Serialize for AssetAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AssetAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        AssetAmount::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Converts a USD-denominated cost into asset units, rounding up (P4):
/// `assetAmount = ceil(costPicoUsd * 10^decimals / pricePicoUsd)`.
///
/// Rounds toward the payee's favor so truncation never under-bills (spec
/// §4.3). Returns `None` on overflow or a zero price.
pub fn usd_to_asset_ceil(cost_pico_usd: PicoUsd, price_pico_usd: PicoUsd, decimals: u8) -> Option<AssetAmount> {
    if price_pico_usd.0 == 0 {
        return None;
    }
    let scale = U256::from(10u8).checked_pow(U256::from(decimals))?;
    let numerator = U256::from(cost_pico_usd.0).checked_mul(scale)?;
    let price = U256::from(price_pico_usd.0);
    let quotient = numerator / price;
    let remainder = numerator % price;
    let rounded = if remainder.is_zero() {
        quotient
    } else {
        quotient.checked_add(U256::from(1u8))?
    };
    Some(AssetAmount(rounded))
}

/// Converts an asset-denominated delta into picoUSD, the symmetric inverse
/// of [`usd_to_asset_ceil`]: `picoUsd = floor(assetAmount * pricePicoUsd /
/// 10^decimals)`. Used by the claim scheduler to compare an accumulated
/// delta against a picoUSD-denominated `minClaimAmount` (spec §4.5).
/// Returns `None` on overflow.
pub fn asset_to_usd_floor(asset_amount: AssetAmount, price_pico_usd: PicoUsd, decimals: u8) -> Option<PicoUsd> {
    let scale = U256::from(10u8).checked_pow(U256::from(decimals))?;
    let numerator = asset_amount.0.checked_mul(U256::from(price_pico_usd.0))?;
    let quotient = numerator.checked_div(scale)?;
    u128::try_from(quotient).ok().map(PicoUsd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_matches_scenario_1_from_spec() {
        // PerRequest price 10^9 pUSD, price 10^12 pUSD/unit, decimals 8 -> 100_000
        let cost = PicoUsd(1_000_000_000);
        let price = PicoUsd(1_000_000_000_000);
        let amount = usd_to_asset_ceil(cost, price, 8).unwrap();
        assert_eq!(amount, AssetAmount::from_u128(100_000));
    }

    #[test]
    fn conversion_rounds_up_on_remainder() {
        let cost = PicoUsd(1);
        let price = PicoUsd(3);
        let amount = usd_to_asset_ceil(cost, price, 0).unwrap();
        // 1 * 10^0 / 3 = 0.33 -> ceil to 1
        assert_eq!(amount, AssetAmount::from_u128(1));
    }

    #[test]
    fn conversion_rejects_zero_price() {
        assert!(usd_to_asset_ceil(PicoUsd(1), PicoUsd(0), 8).is_none());
    }

    #[test]
    fn asset_to_usd_matches_scenario_4_from_spec() {
        // 2x100_000 asset units priced at 10^12 pUSD/unit, decimals 0 -> 2x10^17 pUSD
        let delta = AssetAmount::from_u128(200_000);
        let price = PicoUsd(1_000_000_000_000);
        let pico_usd = asset_to_usd_floor(delta, price, 0).unwrap();
        assert_eq!(pico_usd, PicoUsd(200_000_000_000_000_000));
    }

    #[test]
    fn asset_amount_round_trips_decimal_string() {
        let amount = AssetAmount::from_u128(123_456_789);
        let s = amount.to_string();
        assert_eq!(s, "123456789");
        assert_eq!(s.parse::<AssetAmount>().unwrap(), amount);
    }
}

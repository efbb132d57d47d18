use alloy::primitives::U256;
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Decimal places of the native coin in ledger atomic units.
pub const NATIVE_DECIMALS: u32 = 9;

/// Decimal places of the wrapped token on the EVM chain.
pub const WRAPPED_DECIMALS: u32 = 18;

/// The PAW node reports amounts in raw, which carries 9 more digits than the
/// ledger's atomic units. Stripping them converts raw to units.
const RAW_PER_UNIT: u64 = 1_000_000_000;

/// 10^(NATIVE_DECIMALS) — atomic units per whole PAW.
const UNITS_PER_PAW: u64 = 1_000_000_000;

/// 10^7 atomic units = 0.01 PAW. Amounts not divisible by this carry more
/// than two decimal places and are refused by the deposit pipeline.
const CENT_UNITS: u64 = 10_000_000;

/// A native-chain account address (`paw_` prefixed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeAddress(String);

impl NativeAddress {
    /// Parse and validate a native address.
    ///
    /// Addresses are `paw_` followed by 60 characters of the node's base32
    /// alphabet (no `0`, `2`, `l`, `v`).
    pub fn parse(s: &str) -> Result<Self> {
        let body = s
            .strip_prefix("paw_")
            .ok_or_else(|| eyre!("native address must start with paw_: {}", s))?;
        if body.len() != 60 {
            return Err(eyre!(
                "native address body must be 60 characters, got {}",
                body.len()
            ));
        }
        if !body
            .chars()
            .all(|c| matches!(c, '1' | '3'..='9' | 'a'..='k' | 'm'..='u' | 'w'..='z'))
        {
            return Err(eyre!("native address contains invalid characters: {}", s));
        }
        Ok(NativeAddress(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NativeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NativeAddress {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Convert a node-side raw amount to ledger atomic units (floor).
pub fn raw_to_units(raw: U256) -> U256 {
    raw / U256::from(RAW_PER_UNIT)
}

/// Convert ledger atomic units to a node-side raw amount.
pub fn units_to_raw(units: U256) -> U256 {
    units * U256::from(RAW_PER_UNIT)
}

/// Convert ledger atomic units (9 decimals) to wrapped-token wei (18 decimals).
pub fn units_to_wrapped_wei(units: U256) -> U256 {
    units * U256::from(RAW_PER_UNIT)
}

/// Convert wrapped-token wei to ledger atomic units (floor).
pub fn wrapped_wei_to_units(wei: U256) -> U256 {
    wei / U256::from(RAW_PER_UNIT)
}

/// True when the amount carries more than two decimal places of PAW.
pub fn has_sub_cent_precision(units: U256) -> bool {
    units % U256::from(CENT_UNITS) != U256::ZERO
}

/// Floor an amount to whole PAW.
pub fn floor_to_whole_paw(units: U256) -> U256 {
    units / U256::from(UNITS_PER_PAW) * U256::from(UNITS_PER_PAW)
}

/// Parse a non-negative decimal PAW string ("12", "12.5", "0.000000001")
/// into atomic units. Rejects negative values, malformed input, and more
/// than 9 decimal places.
pub fn parse_paw(s: &str) -> Result<U256> {
    let s = s.trim();
    if s.is_empty() {
        return Err(eyre!("empty amount"));
    }
    if s.starts_with('-') {
        return Err(eyre!("negative amount: {}", s));
    }
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if frac.len() > NATIVE_DECIMALS as usize {
        return Err(eyre!(
            "amount has more than {} decimal places: {}",
            NATIVE_DECIMALS,
            s
        ));
    }
    if whole.is_empty() && frac.is_empty() {
        return Err(eyre!("malformed amount: {}", s));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(eyre!("malformed amount: {}", s));
    }
    let whole_units = if whole.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(whole, 10)? * U256::from(UNITS_PER_PAW)
    };
    let frac_units = if frac.is_empty() {
        U256::ZERO
    } else {
        let scale = 10u64.pow(NATIVE_DECIMALS - frac.len() as u32);
        U256::from_str_radix(frac, 10)? * U256::from(scale)
    };
    Ok(whole_units + frac_units)
}

/// Format atomic units as a decimal PAW string with trailing zeros trimmed.
pub fn format_paw(units: U256) -> String {
    let per = U256::from(UNITS_PER_PAW);
    let whole = units / per;
    let frac = units % per;
    if frac == U256::ZERO {
        return whole.to_string();
    }
    let frac = format!("{:09}", frac.to::<u64>());
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Parse a decimal integer string (raw amounts, balances from the store)
/// into a U256.
pub fn parse_units(s: &str) -> Result<U256> {
    U256::from_str_radix(s.trim(), 10).map_err(|e| eyre!("invalid integer amount {}: {}", s, e))
}

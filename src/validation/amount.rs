//! Exact fixed-point currency amounts
//!
//! Values are whole base units with `DECIMAL_PLACES` implied decimals. The
//! canonical string form has no trailing fractional zeros, so equal values
//! always encode to the same bytes.

use std::fmt;
use std::str::FromStr;

use crate::constants::DECIMAL_PLACES;
use crate::error::ChainError;

/// Base units per coin
pub const COIN: i64 = 10i64.pow(DECIMAL_PLACES as u32);

/// Signed fixed-point amount. Negative values are representable so that
/// validation can reject them explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_base_units(units: i64) -> Self {
        Amount(units)
    }

    pub const fn from_coins(coins: i64) -> Self {
        Amount(coins * COIN)
    }

    pub const fn base_units(self) -> i64 {
        self.0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Canonical string form used for hashing and the wire
    pub fn canonical_string(self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / COIN as u64;
        let frac = abs % COIN as u64;
        if frac == 0 {
            return write!(f, "{sign}{whole}");
        }
        let digits = format!("{:0width$}", frac, width = DECIMAL_PLACES as usize);
        write!(f, "{sign}{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for Amount {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ChainError::MalformedEncoding(format!("invalid amount {s:?}"));

        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, frac) = match body.split_once('.') {
            Some((w, f)) => (w, f),
            None => (body, ""),
        };
        if whole.is_empty()
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !frac.bytes().all(|b| b.is_ascii_digit())
            || frac.len() > DECIMAL_PLACES as usize
            || (body.contains('.') && frac.is_empty())
        {
            return Err(bad());
        }

        let whole: i64 = whole.parse().map_err(|_| bad())?;
        let frac_units: i64 = if frac.is_empty() {
            0
        } else {
            let padded = format!("{:0<width$}", frac, width = DECIMAL_PLACES as usize);
            padded.parse().map_err(|_| bad())?
        };
        let units = whole
            .checked_mul(COIN)
            .and_then(|w| w.checked_add(frac_units))
            .ok_or_else(bad)?;

        Ok(Amount(if negative { -units } else { units }))
    }
}

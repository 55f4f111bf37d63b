use std::fmt;

use alloy::primitives::U256;
use serde::{Serialize, Serializer};

use crate::error::AmountError;

/// Decimals of the native TRX asset (1 TRX = 1_000_000 sun).
pub const NATIVE_DECIMALS: u8 = 6;

/// 10^77 is the largest power of ten that fits in a U256.
pub const MAX_DECIMALS: u8 = 77;

/// An exact token amount: raw integer subunits plus the asset's precision.
///
/// Display renders the canonical decimal value without rounding, so
/// `raw == value * 10^decimals` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenAmount {
    raw: U256,
    decimals: u8,
}

/// Scale `raw` subunits into canonical units of an asset with `decimals` precision.
pub fn normalize(raw: U256, decimals: u32) -> Result<TokenAmount, AmountError> {
    if decimals > MAX_DECIMALS as u32 {
        return Err(AmountError::DecimalsTooLarge(decimals));
    }
    Ok(TokenAmount {
        raw,
        decimals: decimals as u8,
    })
}

impl TokenAmount {
    pub const fn zero(decimals: u8) -> Self {
        Self {
            raw: U256::ZERO,
            decimals,
        }
    }

    pub fn native(sun: u64) -> Self {
        Self {
            raw: U256::from(sun),
            decimals: NATIVE_DECIMALS,
        }
    }

    pub fn raw(&self) -> U256 {
        self.raw
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    /// Lossy conversion for price arithmetic and display; never use it to
    /// reconstruct raw amounts.
    pub fn to_f64(&self) -> f64 {
        self.to_string().parse().unwrap_or(f64::NAN)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.decimals == 0 {
            return write!(f, "{}", self.raw);
        }

        let divisor = U256::from(10u64).pow(U256::from(self.decimals));
        let whole = self.raw / divisor;
        let remainder = self.raw % divisor;

        if remainder.is_zero() {
            return write!(f, "{whole}");
        }

        let remainder_str = format!("{remainder}");
        let padded = format!("{:0>width$}", remainder_str, width = self.decimals as usize);
        write!(f, "{whole}.{}", padded.trim_end_matches('0'))
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

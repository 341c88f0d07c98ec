//! Arbitrary-precision token amounts.
//!
//! Amounts are kept as unsigned integers in the token's base units (wei for
//! the native asset). Conversion to and from human decimal strings follows
//! the usual `parseUnits` / `formatUnits` conventions of EVM tooling.

use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AmountError;

/// A non-negative token amount in base units.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(BigUint);

impl Amount {
    /// The zero amount.
    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    /// Whether the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Borrow the underlying integer.
    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    /// Parse an integer string of base units, e.g. `"1500000"`.
    pub fn from_base_units(s: &str) -> Result<Self, AmountError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AmountError::Empty);
        }
        if let Some(c) = s.chars().find(|c| !c.is_ascii_digit()) {
            return Err(AmountError::InvalidCharacter(c));
        }
        BigUint::parse_bytes(s.as_bytes(), 10)
            .map(Self)
            .ok_or_else(|| AmountError::Malformed(s.to_string()))
    }

    /// Parse a decimal string such as `"1.25"` into base units for a token
    /// with `decimals` decimal places.
    ///
    /// Trailing zeros past `decimals` are accepted; any other extra precision
    /// is rejected rather than silently truncated.
    pub fn parse_units(s: &str, decimals: u8) -> Result<Self, AmountError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AmountError::Empty);
        }
        let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(AmountError::Malformed(s.to_string()));
        }
        if let Some(c) = int_part
            .chars()
            .chain(frac_part.chars())
            .find(|c| !c.is_ascii_digit())
        {
            return Err(AmountError::InvalidCharacter(c));
        }

        let frac_part = frac_part.trim_end_matches('0');
        let scale = usize::from(decimals);
        if frac_part.len() > scale {
            return Err(AmountError::TooManyDecimals { max: decimals });
        }

        let mut digits = String::with_capacity(int_part.len() + scale);
        digits.push_str(int_part);
        digits.push_str(frac_part);
        digits.extend(std::iter::repeat_n('0', scale - frac_part.len()));
        let digits = digits.trim_start_matches('0');
        if digits.is_empty() {
            return Ok(Self::zero());
        }
        BigUint::parse_bytes(digits.as_bytes(), 10)
            .map(Self)
            .ok_or_else(|| AmountError::Malformed(s.to_string()))
    }

    /// Render as a decimal string with `decimals` places, trimming trailing
    /// zeros but always keeping one fractional digit (`"1.0"`, `"0.25"`).
    pub fn format_units(&self, decimals: u8) -> String {
        let divisor = BigUint::from(10u32).pow(u32::from(decimals));
        let whole = &self.0 / &divisor;
        let frac = &self.0 % &divisor;

        let mut frac_str = if decimals == 0 {
            String::new()
        } else {
            format!("{:0>width$}", frac.to_str_radix(10), width = usize::from(decimals))
        };
        while frac_str.ends_with('0') {
            frac_str.pop();
        }
        if frac_str.is_empty() {
            frac_str.push('0');
        }
        format!("{whole}.{frac_str}")
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base_units(s)
    }
}

impl From<u64> for Amount {
    fn from(v: u64) -> Self {
        Self(BigUint::from(v))
    }
}

impl From<u128> for Amount {
    fn from(v: u128) -> Self {
        Self(BigUint::from(v))
    }
}

impl From<BigUint> for Amount {
    fn from(v: BigUint) -> Self {
        Self(v)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base_units(&s).map_err(serde::de::Error::custom)
    }
}

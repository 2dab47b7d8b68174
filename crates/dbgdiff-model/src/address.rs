use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Instruction address as reported by a debugger.
///
/// Debuggers disagree on case and zero padding (`0x0000000000401136` vs
/// `0x401136`); parsing folds both into one value and `Display` always
/// prints the canonical lowercase, unpadded form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub u64);

impl Address {
    /// Parse hexadecimal text, with or without a `0x` prefix.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        if digits.is_empty() {
            return None;
        }
        u64::from_str_radix(digits, 16).ok().map(Self)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl FromStr for Address {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ModelError::InvalidAddress(s.to_string()))
    }
}

/// Canonical text of a hexadecimal address, or `None` if it does not parse.
pub fn normalize_address(text: &str) -> Option<String> {
    Address::parse(text).map(|addr| addr.to_string())
}

//! Monetary rounding shared by every cost computation

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rounding applied to a monetary amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RoundingMethod {
    /// Towards positive infinity
    #[serde(rename = "*up")]
    Up,
    /// Towards negative infinity
    #[serde(rename = "*down")]
    Down,
    /// Half away from zero
    #[default]
    #[serde(rename = "*middle")]
    Middle,
    /// Leave the value untouched
    #[serde(rename = "")]
    None,
}

impl fmt::Display for RoundingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundingMethod::Up => write!(f, "*up"),
            RoundingMethod::Down => write!(f, "*down"),
            RoundingMethod::Middle => write!(f, "*middle"),
            RoundingMethod::None => write!(f, ""),
        }
    }
}

impl RoundingMethod {
    /// Parse from the `*up` / `*down` / `*middle` tags
    pub fn from_tag(s: &str) -> Option<Self> {
        match s {
            "*up" => Some(RoundingMethod::Up),
            "*down" => Some(RoundingMethod::Down),
            "*middle" => Some(RoundingMethod::Middle),
            "" => Some(RoundingMethod::None),
            _ => None,
        }
    }
}

/// Round `value` to `decimals` places with `method`
pub fn round(value: Decimal, decimals: u32, method: RoundingMethod) -> Decimal {
    let strategy = match method {
        RoundingMethod::Up => RoundingStrategy::ToPositiveInfinity,
        RoundingMethod::Down => RoundingStrategy::ToNegativeInfinity,
        RoundingMethod::Middle => RoundingStrategy::MidpointAwayFromZero,
        RoundingMethod::None => return value,
    };
    value.round_dp_with_strategy(decimals, strategy)
}

/// Global rounding context
///
/// Carries the precision configured in `general.rounding_decimals`. The
/// same instance must be used wherever costs are compared or persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rounding {
    pub decimals: u32,
}

impl Rounding {
    pub fn new(decimals: u32) -> Self {
        Self { decimals }
    }

    /// Half-away-from-zero at the global precision
    pub fn round(&self, value: Decimal) -> Decimal {
        round(value, self.decimals, RoundingMethod::Middle)
    }
}

impl Default for Rounding {
    fn default() -> Self {
        Self { decimals: 5 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_methods() {
        assert_eq!(round(dec!(1.234), 2, RoundingMethod::Up), dec!(1.24));
        assert_eq!(round(dec!(1.239), 2, RoundingMethod::Down), dec!(1.23));
        assert_eq!(round(dec!(1.235), 2, RoundingMethod::Middle), dec!(1.24));
        assert_eq!(round(dec!(-1.235), 2, RoundingMethod::Middle), dec!(-1.24));
        assert_eq!(round(dec!(1.2345), 2, RoundingMethod::None), dec!(1.2345));
    }

    #[test]
    fn test_tags_round_trip() {
        for m in [RoundingMethod::Up, RoundingMethod::Down, RoundingMethod::Middle] {
            assert_eq!(RoundingMethod::from_tag(&m.to_string()), Some(m));
        }
        assert_eq!(RoundingMethod::from_tag("*banker"), None);
    }

    proptest::proptest! {
        #[test]
        fn prop_up_middle_down_are_ordered(units in -1_000_000i64..1_000_000, scale in 0u32..6, dp in 0u32..4) {
            let v = Decimal::new(units, scale);
            let up = round(v, dp, RoundingMethod::Up);
            let mid = round(v, dp, RoundingMethod::Middle);
            let down = round(v, dp, RoundingMethod::Down);
            proptest::prop_assert!(down <= mid && mid <= up);
            proptest::prop_assert!(up - down <= Decimal::new(1, dp));
        }
    }
}

use std::{
    fmt::Display,
    ops::{Add, AddAssign, Neg, Sub},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const BPS_PER_PERCENT: i64 = 100;
/// The largest one-off boost a taker may attach to an order (50%).
pub const MAX_BOOST_FEE_BPS: Bps = Bps(5_000);

//--------------------------------------        Bps          ---------------------------------------------------------
/// A premium or fee expressed in basis points (1 bps = 0.01%) over a reference rate.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Bps(i64);

op!(binary Bps, Add, add);
op!(binary Bps, Sub, sub);
op!(inplace Bps, AddAssign, add_assign);
op!(unary Bps, Neg, neg);

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in basis points: {0}")]
pub struct BpsConversionError(String);

impl From<i64> for Bps {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for Bps {
    type Error = BpsConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value).map(Self).map_err(|_| BpsConversionError(format!("{value} is too large")))
    }
}

impl Display for Bps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pct = self.0 as f64 / BPS_PER_PERCENT as f64;
        write!(f, "{pct:0.2}%")
    }
}

impl Bps {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn as_percent(&self) -> f64 {
        self.0 as f64 / BPS_PER_PERCENT as f64
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_as_percentage() {
        assert_eq!(Bps::from(125).to_string(), "1.25%");
        assert_eq!(Bps::from(5).to_string(), "0.05%");
    }

    #[test]
    fn percent_conversions() {
        assert!((Bps::from(50).as_percent() - 0.5).abs() < f64::EPSILON);
        assert!((MAX_BOOST_FEE_BPS.as_percent() - 50.0).abs() < f64::EPSILON);
        assert!(Bps::try_from(u64::MAX).is_err());
    }

    #[test]
    fn serializes_as_a_bare_integer() {
        let json = serde_json::to_string(&Bps::from(42)).unwrap();
        assert_eq!(json, "42");
    }
}

//! Integer amounts in the smallest currency unit.

use std::{fmt, iter::Sum, ops::Add};

use serde::{Deserialize, Serialize};

/// An amount in millisatoshi.
///
/// Arithmetic saturates at `u64::MAX`. Threshold checks compare against an
/// invoice value that is itself a `u64`, so saturation never changes whether
/// a threshold has been reached.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MilliSat(pub u64);

impl MilliSat {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Add for MilliSat {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sum for MilliSat {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl From<u64> for MilliSat {
    fn from(msat: u64) -> Self {
        Self(msat)
    }
}

impl fmt::Display for MilliSat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} msat", self.0)
    }
}

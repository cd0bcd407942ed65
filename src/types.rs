//! Primitive value types shared across the engine: addresses, monetary
//! amounts, and the two host-supplied clocks (wall time and block height).

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// An opaque account identifier. The host ledger owns the real representation
/// (a base58 tz address, an EVM address, ...); the core only ever compares,
/// hashes, and orders these.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Collateral amount, in micro-tez. Always non-negative in valid states.
pub type Mutez = u64;

/// Scaled-integer kit amount. One "whole" kit is [`KIT_SCALING_FACTOR`] units,
/// so all kit arithmetic below is plain integer arithmetic with explicit
/// `floor`/`ceil` rounding made explicit at every call site.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Kit(pub u64);

/// Integer scaling factor for fixed-point `Kit` math (1 kit == this many scaled units).
pub const KIT_SCALING_FACTOR: u64 = 1_000_000;

impl Kit {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn of_scaled(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// `floor(self * num / den)`.
    #[must_use]
    pub fn scale_floor(self, num: u128, den: u128) -> Self {
        Self(((u128::from(self.0) * num) / den) as u64)
    }

    /// `ceil(self * num / den)`.
    #[must_use]
    pub fn scale_ceil(self, num: u128, den: u128) -> Self {
        let prod = u128::from(self.0) * num;
        Self(prod.div_ceil(den) as u64)
    }
}

impl Add for Kit {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Kit {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl fmt::Display for Kit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:06}",
            self.0 / KIT_SCALING_FACTOR,
            self.0 % KIT_SCALING_FACTOR
        )
    }
}

/// Seconds-since-epoch wall clock, supplied by the host on every transition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Whole seconds elapsed between `earlier` and `self`. Saturates at zero;
    /// the host is trusted not to go backwards, but a misbehaving host must
    /// not be able to underflow this into a huge unsigned value.
    #[must_use]
    pub fn seconds_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0).max(0) as u64
    }
}

/// Host chain block height, supplied alongside `Timestamp`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockHeight(pub u64);

impl BlockHeight {
    #[must_use]
    pub fn blocks_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// A ratio of non-negative integers, used for every configured rate
/// (decay rate, bid improvement, liquidation penalty, the minimum lot
/// fraction of the queue, and the starting price).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratio {
    pub num: u64,
    pub den: u64,
}

impl Ratio {
    #[must_use]
    pub const fn new(num: u64, den: u64) -> Self {
        Self { num, den }
    }

    /// `1 - self`, as a ratio with the same denominator.
    #[must_use]
    pub fn complement(self) -> Self {
        Self {
            num: self.den - self.num,
            den: self.den,
        }
    }

    /// `1 + self`, as a ratio with the same denominator.
    #[must_use]
    pub fn one_plus(self) -> Self {
        Self {
            num: self.den + self.num,
            den: self.den,
        }
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

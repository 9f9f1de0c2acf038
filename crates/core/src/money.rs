//! Fixed-point currency arithmetic.
//!
//! Monetary amounts are stored as integer minor units at scale 4
//! (1.0000 currency unit == 10_000 minor units). Four decimals keep
//! moving-average unit costs reconcilable under audit; binary floating
//! point is never used on money paths.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// A currency amount in minor units (scale 4).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Number of decimal places carried.
    pub const SCALE: u32 = 4;
    /// Minor units per whole currency unit.
    pub const MINOR_PER_UNIT: i64 = 10_000;
    pub const ZERO: Money = Money(0);
    /// One cent (0.01): the fixed tolerance for price comparisons.
    pub const CENT: Money = Money(100);

    /// Amount from raw minor units (scale 4).
    pub const fn from_minor_units(minor: i64) -> Self {
        Self(minor)
    }

    /// Amount from whole currency units.
    pub fn from_major(units: i64) -> DomainResult<Self> {
        let minor = units
            .checked_mul(Self::MINOR_PER_UNIT)
            .ok_or_else(|| DomainError::validation("money amount out of range"))?;
        Ok(Self(minor))
    }

    /// Amount from whole units and cents, e.g. `from_units_and_cents(3, 50)` == 3.50.
    pub fn from_units_and_cents(units: i64, cents: i64) -> DomainResult<Self> {
        let major = Self::from_major(units)?;
        let cents_minor = cents
            .checked_mul(100)
            .ok_or_else(|| DomainError::validation("money amount out of range"))?;
        major.checked_add(Money(cents_minor))
    }

    pub const fn minor_units(&self) -> i64 {
        self.0
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::validation("money addition overflow"))
    }

    pub fn checked_sub(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_sub(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::validation("money subtraction overflow"))
    }

    /// Multiply by an integer quantity.
    pub fn times(self, quantity: i64) -> DomainResult<Money> {
        let wide = (self.0 as i128) * (quantity as i128);
        i64::try_from(wide)
            .map(Money)
            .map_err(|_| DomainError::validation("money multiplication overflow"))
    }

    /// Divide by a positive integer quantity, rounding half away from zero.
    pub fn divided_by(self, quantity: i64) -> DomainResult<Money> {
        if quantity <= 0 {
            return Err(DomainError::invalid_quantity(quantity));
        }
        let n = self.0 as i128;
        let d = quantity as i128;
        let half = d / 2;
        let rounded = if n >= 0 { (n + half) / d } else { (n - half) / d };
        i64::try_from(rounded)
            .map(Money)
            .map_err(|_| DomainError::validation("money division overflow"))
    }

    /// Absolute difference between two amounts.
    pub fn abs_diff(self, other: Money) -> Money {
        Money((self.0 - other.0).abs())
    }

    /// Whether `other` is within the fixed 0.01 tolerance of `self`.
    ///
    /// Used to suppress spurious audit rows for price adjustments that only
    /// differ by rounding noise.
    pub fn within_tolerance_of(self, other: Money) -> bool {
        self.abs_diff(other) <= Money::CENT
    }
}

impl ValueObject for Money {}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let units = abs / Money::MINOR_PER_UNIT as u64;
        let frac = abs % Money::MINOR_PER_UNIT as u64;
        write!(f, "{sign}{units}.{frac:04}")
    }
}

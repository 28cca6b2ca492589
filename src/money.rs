// src/money.rs
//! Fixed-point money and tax math.
//!
//! Amounts are integer cents. JSON carries them as decimal numbers
//! (`150.5` means 150 units and 50 cents); the conversion rounds to the
//! nearest cent once, at the boundary.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Sub;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, sqlx::Type)]
#[sqlx(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Converts a decimal amount, rounding half away from zero to whole cents.
    pub fn from_decimal(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let cents = (value * 100.0).round();
        if cents.abs() > i64::MAX as f64 {
            return None;
        }
        Some(Money(cents as i64))
    }

    pub fn to_decimal(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Absolute distance between two amounts, in cents.
    pub fn abs_diff(self, other: Money) -> i64 {
        self.0.abs_diff(other.0).min(i64::MAX as u64) as i64
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_mul(self, qty: i32) -> Option<Money> {
        self.0.checked_mul(qty as i64).map(Money)
    }

    /// `None` as soon as the running total leaves the i64 range.
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Money> {
        amounts.into_iter().try_fold(Money::ZERO, Money::checked_add)
    }

    /// For rows already validated on write; clamps instead of wrapping.
    pub fn saturating_mul(self, qty: i32) -> Money {
        Money(self.0.saturating_mul(qty as i64))
    }

    pub fn saturating_add(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, other: Money) -> Money {
        Money(self.0 - other.0)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_decimal())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Money::from_decimal(value).ok_or_else(|| de::Error::custom("amount must be a finite number"))
    }
}

/// Tax rate in basis points: 1900 = 19%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaxRate(u32);

impl TaxRate {
    pub const ZERO: TaxRate = TaxRate(0);

    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    pub const fn bps(self) -> u32 {
        self.0
    }

    /// Accepts a fraction such as `0.19`; rates must lie in `[0, 1)`.
    pub fn from_fraction(rate: f64) -> Option<Self> {
        if !rate.is_finite() || !(0.0..1.0).contains(&rate) {
            return None;
        }
        Some(TaxRate((rate * 10_000.0).round() as u32))
    }

    pub fn as_fraction(self) -> f64 {
        self.0 as f64 / 10_000.0
    }
}

impl Serialize for TaxRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_fraction())
    }
}

impl<'de> Deserialize<'de> for TaxRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        TaxRate::from_fraction(value)
            .ok_or_else(|| de::Error::custom("taxRate must be a fraction between 0 and 1"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxBreakdown {
    /// Net amount, without tax.
    pub subtotal: Money,
    pub tax_amount: Money,
    pub total: Money,
}

/// Splits a cart amount into net, tax and gross.
///
/// With `tax_included` the amount is gross and the net part is backed out;
/// otherwise the amount is net and tax is added on top. Rounding happens
/// once, so `subtotal + tax_amount == total` holds exactly. Returns `None`
/// when the taxed total does not fit in an i64.
pub fn compute_tax(amount: Money, tax_included: bool, rate: TaxRate) -> Option<TaxBreakdown> {
    let bps = rate.bps() as i128;
    let cents = amount.cents() as i128;

    if tax_included {
        let net = div_round(cents * 10_000, 10_000 + bps) as i64;
        Some(TaxBreakdown {
            subtotal: Money(net),
            tax_amount: amount - Money(net),
            total: amount,
        })
    } else {
        let tax = i64::try_from(div_round(cents * bps, 10_000)).ok().map(Money)?;
        Some(TaxBreakdown {
            subtotal: amount,
            tax_amount: tax,
            total: amount.checked_add(tax)?,
        })
    }
}

// Integer division rounding half away from zero.
fn div_round(numerator: i128, denominator: i128) -> i128 {
    let half = denominator / 2;
    if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    }
}

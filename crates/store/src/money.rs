use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Purchase price represented as **integer minor units** (cents).
///
/// All monetary values in the store use this type to avoid floating-point
/// drift when summing over a snapshot.
///
/// # Examples
///
/// ```rust
/// use store::Money;
///
/// let price = Money::new(12_34);
/// assert_eq!(price.minor_units(), 1234);
/// assert_eq!(price.to_string(), "12.34");
/// ```
///
/// Parsing from user input (accepts `.` or `,` as decimal separator, at most
/// two fractional digits, no sign):
///
/// ```rust
/// use store::Money;
///
/// assert_eq!("10".parse::<Money>().unwrap().minor_units(), 1000);
/// assert_eq!("10,5".parse::<Money>().unwrap().minor_units(), 1050);
/// assert!("12.345".parse::<Money>().is_err());
/// assert!("-3".parse::<Money>().is_err());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Creates an amount from integer minor units.
    #[must_use]
    pub const fn new(minor: i64) -> Self {
        Self(minor)
    }

    /// Returns the raw value in minor units.
    #[must_use]
    pub const fn minor_units(self) -> i64 {
        self.0
    }

    /// Returns `true` if the amount is strictly greater than zero.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Checked addition (returns `None` on overflow).
    #[must_use]
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl From<i64> for Money {
    fn from(minor: i64) -> Self {
        Self(minor)
    }
}

impl From<Money> for i64 {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl FromStr for Money {
    type Err = StoreError;

    /// Parses a decimal string into minor units.
    ///
    /// Accepts `.` or `,` as decimal separator. Signs are rejected: a price
    /// is a plain amount, never a delta.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| StoreError::invalid_field("price", reason);

        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(invalid("price is required"));
        }

        let normalized = trimmed.replace(',', ".");
        let (units_str, frac_str) = match normalized.split_once('.') {
            Some((units, frac)) => (units, frac),
            None => (normalized.as_str(), ""),
        };

        if units_str.is_empty() || !units_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("not a valid amount"));
        }

        let units: i64 = units_str
            .parse()
            .map_err(|_| invalid("amount too large"))?;

        let frac: i64 = match frac_str.len() {
            0 => 0,
            len if len > 2 => return Err(invalid("at most two decimals")),
            len => {
                if !frac_str.chars().all(|c| c.is_ascii_digit()) {
                    return Err(invalid("not a valid amount"));
                }
                let digits: i64 = frac_str
                    .parse()
                    .map_err(|_| invalid("not a valid amount"))?;
                if len == 1 { digits * 10 } else { digits }
            }
        };

        let minor = units
            .checked_mul(100)
            .and_then(|v| v.checked_add(frac))
            .ok_or_else(|| invalid("amount too large"))?;

        Ok(Money(minor))
    }
}

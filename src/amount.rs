use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Fixed-point money with 2 decimal places, stored as a count of cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(i64);

/// Non-negative fraction with 4 decimal places, e.g. a tax rate of `0.16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Rate(u32);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseDecimalError {
    #[error("empty decimal")]
    Empty,
    #[error("invalid decimal '{0}'")]
    Invalid(String),
    #[error("'{0}' has more than {1} fractional digits")]
    TooPrecise(String, usize),
    #[error("'{0}' is out of range")]
    OutOfRange(String),
}

impl Amount {
    const SCALE: i64 = 100;
    pub const ZERO: Amount = Amount(0);

    pub fn from_cents(cents: i64) -> Self {
        Amount(cents)
    }

    pub fn from_units(units: i64) -> Self {
        Amount(units * Self::SCALE)
    }

    /// Smallest currency unit, as sent to the payment gateway.
    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// `None` on overflow.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    /// `None` on overflow.
    pub fn checked_mul(self, factor: u32) -> Option<Self> {
        self.0.checked_mul(i64::from(factor)).map(Amount)
    }

    /// Multiply by a rate and round half-up (away from zero) to whole cents.
    /// `None` if the result does not fit.
    pub fn apply_rate(&self, rate: Rate) -> Option<Self> {
        let product = i128::from(self.0) * i128::from(rate.0);
        let scale = i128::from(Rate::SCALE);
        let half = scale / 2;
        let rounded = if product >= 0 {
            (product + half) / scale
        } else {
            -((-product + half) / scale)
        };
        i64::try_from(rounded).ok().map(Amount)
    }
}

impl Rate {
    const SCALE: u32 = 10_000;

    pub fn from_scaled(value: u32) -> Self {
        Rate(value)
    }

    pub fn scaled(&self) -> u32 {
        self.0
    }
}

/// Parse `[-]digits[.digits]` into an integer scaled by `10^places`.
fn parse_scaled(s: &str, places: usize) -> Result<i64, ParseDecimalError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ParseDecimalError::Empty);
    }
    let invalid = || ParseDecimalError::Invalid(s.to_string());

    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (whole, frac) = match body.split_once('.') {
        Some((w, f)) => (w, f),
        None => (body, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac.len() > places {
        return Err(ParseDecimalError::TooPrecise(s.to_string(), places));
    }

    let out_of_range = || ParseDecimalError::OutOfRange(s.to_string());
    let whole: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| out_of_range())?
    };
    let frac_value: i64 = if frac.is_empty() {
        0
    } else {
        frac.parse::<i64>().map_err(|_| invalid())? * 10i64.pow((places - frac.len()) as u32)
    };
    let scaled = whole
        .checked_mul(10i64.pow(places as u32))
        .and_then(|w| w.checked_add(frac_value))
        .ok_or_else(out_of_range)?;
    Ok(if negative { -scaled } else { scaled })
}

impl FromStr for Amount {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_scaled(s, 2).map(Amount)
    }
}

impl FromStr for Rate {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let scaled = parse_scaled(s, 4)?;
        u32::try_from(scaled)
            .map(Rate)
            .map_err(|_| ParseDecimalError::OutOfRange(s.trim().to_string()))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        let whole = abs / Self::SCALE;
        let frac = abs % Self::SCALE;
        write!(f, "{sign}{whole}.{frac:02}")
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / Self::SCALE;
        let frac = self.0 % Self::SCALE;
        write!(f, "{whole}.{frac:04}")
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DecimalVisitor(PhantomData))
    }
}

impl Serialize for Rate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Rate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(DecimalVisitor(PhantomData))
    }
}

/// Accepts decimal strings, and numbers from sources that pre-parse values
/// (environment variables). Numbers go through their shortest decimal form.
struct DecimalVisitor<T>(PhantomData<T>);

impl<T> Visitor<'_> for DecimalVisitor<T>
where
    T: FromStr<Err = ParseDecimalError>,
{
    type Value = T;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal string such as \"12.50\"")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<T, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<T, E> {
        self.visit_str(&v.to_string())
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<T, E> {
        self.visit_str(&v.to_string())
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<T, E> {
        self.visit_str(&v.to_string())
    }
}

//! Precision-safe decimal types for trading.
//!
//! Prices and sizes travel through the venue as decimal strings. Keeping
//! them as `rust_decimal` values end to end means tick and step rounding is
//! exact, which the hedge check depends on.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::str::FromStr;

/// Price with exact decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Floor to a multiple of `tick_size`. A zero tick leaves the price as is.
    #[inline]
    pub fn floor_to_tick(&self, tick_size: Price) -> Self {
        if tick_size.is_zero() {
            return *self;
        }
        Self((self.0 / tick_size.0).floor() * tick_size.0)
    }

    /// Ceil to a multiple of `tick_size`.
    #[inline]
    pub fn ceil_to_tick(&self, tick_size: Price) -> Self {
        if tick_size.is_zero() {
            return *self;
        }
        Self((self.0 / tick_size.0).ceil() * tick_size.0)
    }

    /// Round half-away-from-zero to a multiple of `tick_size`.
    #[inline]
    pub fn round_to_tick(&self, tick_size: Price) -> Self {
        if tick_size.is_zero() {
            return *self;
        }
        Self((self.0 / tick_size.0).round() * tick_size.0)
    }

    /// Midpoint between two prices.
    #[inline]
    pub fn mid(bid: Price, ask: Price) -> Self {
        Self((bid.0 + ask.0) / Decimal::TWO)
    }

    /// Drop trailing zeros so wire strings stay short (`100.20` -> `100.2`).
    #[inline]
    pub fn normalized(&self) -> Self {
        Self(self.0.normalize())
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Price {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Mul<Decimal> for Price {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Div<Decimal> for Price {
    type Output = Self;

    fn div(self, rhs: Decimal) -> Self::Output {
        Self(self.0 / rhs)
    }
}

/// Size/quantity with exact decimal precision.
///
/// Order sizes are always positive. Position sizes reuse the same type and
/// are signed: long is positive, short is negative.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Size(pub Decimal);

impl Size {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    #[inline]
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    #[inline]
    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// Round down to a multiple of `step`.
    #[inline]
    pub fn floor_to_step(&self, step: Size) -> Self {
        if step.is_zero() {
            return *self;
        }
        Self((self.0 / step.0).floor() * step.0)
    }

    /// Round up to a multiple of `step`.
    #[inline]
    pub fn ceil_to_step(&self, step: Size) -> Self {
        if step.is_zero() {
            return *self;
        }
        Self((self.0 / step.0).ceil() * step.0)
    }

    /// Notional value: size * price.
    #[inline]
    pub fn notional(&self, price: Price) -> Decimal {
        self.0 * price.0
    }

    #[inline]
    pub fn normalized(&self) -> Self {
        Self(self.0.normalize())
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Size {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Size {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Add for Size {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Size {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Size {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Mul<Decimal> for Size {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_tick_rounding() {
        let price = Price::new(dec!(100.15));
        let tick = Price::new(dec!(0.1));

        assert_eq!(price.floor_to_tick(tick).0, dec!(100.1));
        assert_eq!(price.ceil_to_tick(tick).0, dec!(100.2));
        assert_eq!(price.round_to_tick(tick).0, dec!(100.2));
    }

    #[test]
    fn test_zero_tick_is_identity() {
        let price = Price::new(dec!(100.123));
        assert_eq!(price.floor_to_tick(Price::ZERO), price);
        assert_eq!(price.ceil_to_tick(Price::ZERO), price);
    }

    #[test]
    fn test_mid() {
        let mid = Price::mid(Price::new(dec!(100.0)), Price::new(dec!(100.3)));
        assert_eq!(mid.0, dec!(100.15));
    }

    #[test]
    fn test_size_step_rounding() {
        let size = Size::new(dec!(1.2345));
        let step = Size::new(dec!(0.01));

        assert_eq!(size.floor_to_step(step).0, dec!(1.23));
        assert_eq!(size.ceil_to_step(step).0, dec!(1.24));
    }

    #[test]
    fn test_size_defaults_to_zero() {
        assert_eq!(Size::default(), Size::ZERO);
        assert!(Size::default().is_zero());
    }

    #[test]
    fn test_signed_size() {
        let short = -Size::new(dec!(2));
        assert!(short.is_negative());
        assert_eq!(short.abs().0, dec!(2));
        assert_eq!((short + Size::new(dec!(3))).0, dec!(1));
    }

    #[test]
    fn test_notional_calculation() {
        let size = Size::new(dec!(0.5));
        let price = Price::new(dec!(50000));
        assert_eq!(size.notional(price), dec!(25000));
    }
}

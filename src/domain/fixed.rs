//! Raw venue integers tagged with their fixed-point scale.
//!
//! The venue reports collateral and profit percent as integers scaled by 10^6
//! and prices scaled by 10^18. Each raw value carries its unit as a type
//! parameter so the two scales cannot be mixed up, and decoding always goes
//! through the unit's named conversion.

use super::Decimal;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use thiserror::Error;

/// A fixed-point unit: `value = raw / 10^DECIMALS`.
pub trait Scale {
    const DECIMALS: u32;
    const NAME: &'static str;
}

/// USDC amounts (6 decimals).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usdc;

/// Profit as a fraction of collateral, 6 decimals (50_000 is 5%).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfitPercent;

/// Prices (18 decimals).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Price;

impl Scale for Usdc {
    const DECIMALS: u32 = 6;
    const NAME: &'static str = "usdc";
}

impl Scale for ProfitPercent {
    const DECIMALS: u32 = 6;
    const NAME: &'static str = "profit_percent";
}

impl Scale for Price {
    const DECIMALS: u32 = 18;
    const NAME: &'static str = "price";
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScaleError {
    #[error("{unit} raw value {raw} is out of decimal range")]
    OutOfRange { unit: &'static str, raw: i128 },
    #[error("{unit} raw value {input:?} is not an integer")]
    NotAnInteger { unit: &'static str, input: String },
    #[error("{operation} overflowed the decimal range")]
    Overflow { operation: &'static str },
}

/// A raw scaled integer as reported by the venue.
pub struct FixedPoint<U: Scale> {
    raw: i128,
    unit: PhantomData<U>,
}

impl<U: Scale> FixedPoint<U> {
    pub const fn from_raw(raw: i128) -> Self {
        Self {
            raw,
            unit: PhantomData,
        }
    }

    pub fn raw(&self) -> i128 {
        self.raw
    }

    pub fn is_zero(&self) -> bool {
        self.raw == 0
    }

    /// Exact decimal value `raw / 10^DECIMALS`.
    pub fn to_decimal(&self) -> Result<Decimal, ScaleError> {
        Decimal::try_from_scaled(self.raw, U::DECIMALS).ok_or(ScaleError::OutOfRange {
            unit: U::NAME,
            raw: self.raw,
        })
    }
}

impl FixedPoint<Usdc> {
    /// Collateral in whole USDC.
    pub fn to_usdc(&self) -> Result<Decimal, ScaleError> {
        self.to_decimal()
    }
}

impl FixedPoint<ProfitPercent> {
    /// Profit as a fraction: 50_000 raw decodes to 0.05.
    pub fn to_fraction(&self) -> Result<Decimal, ScaleError> {
        self.to_decimal()
    }
}

impl FixedPoint<Price> {
    pub fn to_price(&self) -> Result<Decimal, ScaleError> {
        self.to_decimal()
    }
}

/// Realized PnL in USDC: `collateral_usdc * profit_fraction`.
pub fn realized_pnl(
    collateral: &FixedPoint<Usdc>,
    profit: &FixedPoint<ProfitPercent>,
) -> Result<Decimal, ScaleError> {
    collateral
        .to_usdc()?
        .checked_mul(profit.to_fraction()?)
        .ok_or(ScaleError::Overflow {
            operation: "realized pnl",
        })
}

impl<U: Scale> FromStr for FixedPoint<U> {
    type Err = ScaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i128>()
            .map(Self::from_raw)
            .map_err(|_| ScaleError::NotAnInteger {
                unit: U::NAME,
                input: s.to_string(),
            })
    }
}

// Manual impls: derives would put bounds on the marker type.
impl<U: Scale> Clone for FixedPoint<U> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<U: Scale> Copy for FixedPoint<U> {}

impl<U: Scale> PartialEq for FixedPoint<U> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<U: Scale> Eq for FixedPoint<U> {}

impl<U: Scale> fmt::Debug for FixedPoint<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}e-{})", U::NAME, self.raw, U::DECIMALS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_usdc_decoding() {
        let collateral = FixedPoint::<Usdc>::from_raw(100_000_000);
        assert_eq!(collateral.to_usdc().unwrap(), d("100"));

        let dust = FixedPoint::<Usdc>::from_raw(1);
        assert_eq!(dust.to_usdc().unwrap(), d("0.000001"));
    }

    #[test]
    fn test_profit_percent_decoding() {
        let profit = FixedPoint::<ProfitPercent>::from_raw(50_000);
        assert_eq!(profit.to_fraction().unwrap(), d("0.05"));

        let loss = FixedPoint::<ProfitPercent>::from_raw(-250_000);
        assert_eq!(loss.to_fraction().unwrap(), d("-0.25"));
    }

    #[test]
    fn test_price_decoding() {
        let price: FixedPoint<Price> = "64250500000000000000000".parse().unwrap();
        assert_eq!(price.to_price().unwrap(), d("64250.5"));
    }

    #[test]
    fn test_realized_pnl_formula() {
        let pnl = realized_pnl(
            &FixedPoint::from_raw(100_000_000),
            &FixedPoint::from_raw(50_000),
        )
        .unwrap();
        assert_eq!(pnl, d("5"));
    }

    #[test]
    fn test_realized_pnl_overflow_is_an_error() {
        let collateral = FixedPoint::<Usdc>::from_raw(10i128.pow(27));
        let profit = FixedPoint::<ProfitPercent>::from_raw(10i128.pow(27));
        // each side decodes on its own
        assert!(collateral.to_usdc().is_ok());
        assert!(profit.to_fraction().is_ok());

        assert_eq!(
            realized_pnl(&collateral, &profit),
            Err(ScaleError::Overflow {
                operation: "realized pnl"
            })
        );
    }

    #[test]
    fn test_parse_rejects_non_integer() {
        let err = "12.5".parse::<FixedPoint<Usdc>>().unwrap_err();
        assert!(matches!(err, ScaleError::NotAnInteger { unit: "usdc", .. }));
    }

    #[test]
    fn test_out_of_range_is_an_error() {
        let huge = FixedPoint::<Price>::from_raw(i128::MAX);
        assert!(matches!(
            huge.to_price(),
            Err(ScaleError::OutOfRange { unit: "price", .. })
        ));
    }
}

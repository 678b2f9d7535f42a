//! Fixed-precision rounding for stored values.
//!
//! Values are rounded through `rust_decimal` rather than with float
//! arithmetic so that the same input always produces the same stored text.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places applied to a value column before storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    /// USD-scale amounts and ETH quantities: 2 places.
    #[default]
    Usd,
    /// Price ratios such as ETH/BTC: 6 places.
    Ratio,
    /// Small rates such as funding: 8 places.
    Rate,
    /// Counts: no fractional part.
    Whole,
    /// Stored exactly as received.
    Exact,
}

impl Precision {
    /// Number of decimal places, or `None` for [`Precision::Exact`].
    pub fn places(self) -> Option<u32> {
        match self {
            Precision::Usd => Some(2),
            Precision::Ratio => Some(6),
            Precision::Rate => Some(8),
            Precision::Whole => Some(0),
            Precision::Exact => None,
        }
    }

    /// Round `value` to this precision.
    ///
    /// Returns `None` when the value is not finite or does not fit in a
    /// `Decimal`.
    pub fn round(self, value: f64) -> Option<f64> {
        if !value.is_finite() {
            return None;
        }
        match self.places() {
            Some(places) => round_decimal(value, places)?.to_f64(),
            None => Some(value),
        }
    }
}

/// Round a float to `places` decimal places, midpoint away from zero.
pub fn round_decimal(value: f64, places: u32) -> Option<Decimal> {
    let decimal = Decimal::from_f64(value)?;
    Some(decimal.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero))
}

//! Provenance tags.
//!
//! Every stored row carries a `source` column. Consumers use it to tell
//! measured values apart from values we computed or invented, so the tag
//! space is split by kind rather than left as free text.

use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;

/// Where a record's values came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
    /// Values read directly from a named provider (e.g. `binance`).
    Observed(&'static str),

    /// A provider's series scaled by an assumed share.
    /// Tagged `<provider>_estimated`.
    ScaledProxy(&'static str),

    /// Computed from datasets already in the store.
    Calculated,

    /// Synthetic values from a trend model or a coarse multiplier.
    Estimated,
}

impl Provenance {
    /// The string written to the `source` column.
    pub fn tag(&self) -> Cow<'static, str> {
        match self {
            Provenance::Observed(provider) => Cow::Borrowed(provider),
            Provenance::ScaledProxy(provider) => Cow::Owned(format!("{provider}_estimated")),
            Provenance::Calculated => Cow::Borrowed("calculated"),
            Provenance::Estimated => Cow::Borrowed("estimated"),
        }
    }

    /// Returns true for anything that was not read straight from a provider.
    #[inline]
    pub fn is_synthetic(&self) -> bool {
        !matches!(self, Provenance::Observed(_))
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

impl Serialize for Provenance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.tag())
    }
}

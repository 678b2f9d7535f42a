//! Declarative field extraction.
//!
//! Providers move fields around between API versions. Instead of a chain
//! of conditionals per dataset, each field declares an ordered list of
//! candidate key-paths; [`extract_number`] walks them and takes the first
//! one that yields a number. When none does, the declared default is used
//! and the result says so.

use crate::coerce;
use serde_json::Value;

/// One step into a JSON document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seg {
    /// Object member.
    Key(&'static str),
    /// Array element.
    Index(usize),
}

/// A key-path from some JSON node. The empty path is the node itself.
pub type Path = &'static [Seg];

/// The node itself.
pub const ROOT: Path = &[];

/// A value plus whether it came from a default instead of the payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extracted<T> {
    pub value: T,
    pub defaulted: bool,
}

impl<T> Extracted<T> {
    fn measured(value: T) -> Self {
        Self {
            value,
            defaulted: false,
        }
    }

    fn fallback(value: T) -> Self {
        Self {
            value,
            defaulted: true,
        }
    }
}

/// Follow `path` from `value`.
pub fn lookup<'v>(value: &'v Value, path: &[Seg]) -> Option<&'v Value> {
    path.iter().try_fold(value, |node, seg| match seg {
        Seg::Key(key) => node.get(key),
        Seg::Index(index) => node.get(index),
    })
}

/// First candidate path that resolves to a non-null value.
pub fn first_present<'v>(value: &'v Value, candidates: &[Path]) -> Option<&'v Value> {
    candidates
        .iter()
        .filter_map(|path| lookup(value, path))
        .find(|v| !v.is_null())
}

/// First candidate that coerces to a finite number, else `default`.
///
/// Returns `None` only when nothing matched and there is no default.
pub fn extract_number(
    value: &Value,
    candidates: &[Path],
    default: Option<f64>,
) -> Option<Extracted<f64>> {
    candidates
        .iter()
        .filter_map(|path| lookup(value, path))
        .find_map(coerce::number)
        .map(Extracted::measured)
        .or_else(|| default.map(Extracted::fallback))
}

/// First candidate that is a string.
pub fn extract_text<'v>(value: &'v Value, candidates: &[Path]) -> Option<&'v str> {
    candidates
        .iter()
        .filter_map(|path| lookup(value, path))
        .find_map(Value::as_str)
}

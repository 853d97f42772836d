//! Dynamic metadata values.
//!
//! Chunks and libraries carry an open `key -> value` mapping whose values
//! may be string, integer, real, or boolean — a tagged variant over the
//! same four scalar types the original source's Pydantic `Condition`
//! validator restricts filter values to.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single metadata scalar.
///
/// Serialized in its ordinary (externally-tagged) `serde` shape rather than
/// `#[serde(untagged)]`: the snapshot codec is `bincode`, which is not a
/// self-describing format and cannot support untagged enums (untagged
/// deserialization needs `deserialize_any`, which `bincode` doesn't
/// implement). An out-of-scope JSON transport layer would map this
/// differently; that mapping lives outside this crate's boundary (spec §1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataValue {
    Str(String),
    Int(i64),
    Real(f64),
    Bool(bool),
}

/// An opaque metadata mapping. Ordered by key so snapshot round-trips and
/// equality comparisons are deterministic.
pub type Metadata = BTreeMap<String, MetadataValue>;

impl MetadataValue {
    /// String coercion used by `contains` and by ordering comparisons that
    /// mix types.
    pub fn as_display_string(&self) -> String {
        match self {
            MetadataValue::Str(s) => s.clone(),
            MetadataValue::Int(i) => i.to_string(),
            MetadataValue::Real(r) => r.to_string(),
            MetadataValue::Bool(b) => b.to_string(),
        }
    }

    /// Ordered comparison for `gt`/`gte`/`lt`/`lte`. Strings compare
    /// lexicographically, numerics compare naturally (ints/reals are
    /// coerced to f64 so `5 < 5.5` holds), booleans compare as 0/1.
    /// Returns `None` when the two values have incomparable shapes (e.g.
    /// string vs. bool), in which case the ordered operator is not
    /// satisfied.
    pub fn partial_cmp_coerced(&self, other: &MetadataValue) -> Option<std::cmp::Ordering> {
        use MetadataValue::*;
        match (self, other) {
            (Str(a), Str(b)) => Some(a.cmp(b)),
            (Bool(a), Bool(b)) => Some((*a as u8).cmp(&(*b as u8))),
            (a, b) if a.as_f64().is_some() && b.as_f64().is_some() => {
                a.as_f64().unwrap().partial_cmp(&b.as_f64().unwrap())
            }
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Int(i) => Some(*i as f64),
            MetadataValue::Real(r) => Some(*r),
            MetadataValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            MetadataValue::Str(_) => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display_string())
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Str(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Str(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(i: i64) -> Self {
        MetadataValue::Int(i)
    }
}

impl From<f64> for MetadataValue {
    fn from(r: f64) -> Self {
        MetadataValue::Real(r)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

//! Predicate set ("Filter"): per-field comparison conditions evaluated
//! against a chunk's metadata mapping.
//!
//! Mirrors `original_source/app/core/Filter.py` (the "exactly one operator"
//! validation) and `original_source/app/utils/filters.py` (the evaluation
//! semantics: missing key -> false, `contains` is a case-insensitive
//! substring check on the string coercion of the field).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VectorStoreError};
use crate::metadata::{Metadata, MetadataValue};

/// A single field condition. Exactly one operator must be populated —
/// enforced at construction time by [`Condition::new`], not by the
/// deserialized shape, since a filter arriving from the (out-of-scope)
/// transport layer may carry more than one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Condition {
    pub eq: Option<MetadataValue>,
    pub ne: Option<MetadataValue>,
    pub gt: Option<MetadataValue>,
    pub gte: Option<MetadataValue>,
    pub lt: Option<MetadataValue>,
    pub lte: Option<MetadataValue>,
    pub contains: Option<String>,
}

impl Condition {
    fn operator_count(&self) -> usize {
        [
            self.eq.is_some(),
            self.ne.is_some(),
            self.gt.is_some(),
            self.gte.is_some(),
            self.lt.is_some(),
            self.lte.is_some(),
            self.contains.is_some(),
        ]
        .into_iter()
        .filter(|x| *x)
        .count()
    }

    /// Validate that exactly one operator is populated.
    pub fn validate(&self, field: &str) -> Result<()> {
        match self.operator_count() {
            1 => Ok(()),
            0 => Err(VectorStoreError::BadPredicate {
                field: field.to_string(),
                reason: "no operator populated",
            }),
            _ => Err(VectorStoreError::BadPredicate {
                field: field.to_string(),
                reason: "more than one operator populated",
            }),
        }
    }
}

/// A mapping from metadata key to [`Condition`]. Constructed via
/// [`Filter::new`], which validates every condition up front.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filter(BTreeMap<String, Condition>);

impl Filter {
    /// Build a filter, validating that every condition carries exactly one
    /// operator. Fails with `BadPredicate` otherwise (spec §3, §7).
    pub fn new(conditions: BTreeMap<String, Condition>) -> Result<Self> {
        for (field, cond) in &conditions {
            cond.validate(field)?;
        }
        Ok(Filter(conditions))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A metadata mapping satisfies this filter iff, for every key in the
    /// filter, the key is present and the chosen operator holds. A missing
    /// key yields `false` immediately.
    pub fn passes(&self, meta: &Metadata) -> bool {
        for (key, cond) in &self.0 {
            let Some(val) = meta.get(key) else {
                return false;
            };
            if !condition_holds(cond, val) {
                return false;
            }
        }
        true
    }
}

fn condition_holds(cond: &Condition, val: &MetadataValue) -> bool {
    if let Some(eq) = &cond.eq {
        return val == eq;
    }
    if let Some(ne) = &cond.ne {
        return val != ne;
    }
    if let Some(gt) = &cond.gt {
        return matches!(val.partial_cmp_coerced(gt), Some(std::cmp::Ordering::Greater));
    }
    if let Some(gte) = &cond.gte {
        return matches!(
            val.partial_cmp_coerced(gte),
            Some(std::cmp::Ordering::Greater) | Some(std::cmp::Ordering::Equal)
        );
    }
    if let Some(lt) = &cond.lt {
        return matches!(val.partial_cmp_coerced(lt), Some(std::cmp::Ordering::Less));
    }
    if let Some(lte) = &cond.lte {
        return matches!(
            val.partial_cmp_coerced(lte),
            Some(std::cmp::Ordering::Less) | Some(std::cmp::Ordering::Equal)
        );
    }
    if let Some(needle) = &cond.contains {
        return val
            .as_display_string()
            .to_lowercase()
            .contains(&needle.to_lowercase());
    }
    // Unreachable for a validated `Condition` (operator_count == 1), but a
    // `Condition` with zero operators set never satisfies a predicate.
    false
}

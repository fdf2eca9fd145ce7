//! Dual-representation equality lookup.
//!
//! Records live in one of three successive storage generations and queries
//! must match all of them without a destructive migration:
//!
//! - `Legacy`: the plaintext sits in the field's own column.
//! - `Interim`: the surrogate digest was written into the plaintext-named
//!   column.
//! - `Canonical`: the surrogate sits in `{field}Hash` alongside the
//!   recoverable token.
//!
//! The generations are an explicit tagged type and the filter is built by
//! matching every variant, so the mandatory three-way disjunction is
//! exhaustive by construction rather than three loosely-related nullable
//! checks. The disjunction is pure: any one match is sufficient, with no
//! implicit precedence.

use crate::error::Error;
use crate::index::{digest, is_digest};
use crate::policy::FieldSpec;
use crate::store::Document;
use serde_json::Value;

/// Equality-filter expression consumed by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Column equals value.
    Eq {
        /// Column name.
        column: String,
        /// Expected value.
        value: Value,
    },
    /// Any branch matches (pure disjunction).
    Or(Vec<Filter>),
}

impl Filter {
    /// Builds a column-equals-value condition.
    #[must_use]
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq { column: column.into(), value: value.into() }
    }

    /// Evaluates the filter against a document.
    ///
    /// Provided here so every backend evaluates the disjunction the same
    /// way: a missing column never matches, and `Or` succeeds on any
    /// branch.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Self::Eq { column, value } => document.get(column) == Some(value),
            Self::Or(branches) => branches.iter().any(|branch| branch.matches(document)),
        }
    }
}

/// The three successive storage generations of a sensitive field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageGeneration {
    /// Surrogate and recoverable token in their own columns.
    Canonical,
    /// Surrogate digest written into the plaintext-named column.
    Interim,
    /// Pre-migration plaintext in the field's own column.
    Legacy,
}

/// Every generation, in match order. Order carries no precedence; the
/// resulting filter is a pure disjunction.
pub const ALL_GENERATIONS: [StorageGeneration; 3] =
    [StorageGeneration::Canonical, StorageGeneration::Interim, StorageGeneration::Legacy];

impl StorageGeneration {
    /// Classifies how a document currently stores the given field.
    ///
    /// Returns `None` when the field is absent in every representation.
    #[must_use]
    pub fn classify(spec: &FieldSpec, document: &Document) -> Option<Self> {
        let has_canonical = if spec.policy.writes_surrogate() {
            document.contains_key(&spec.surrogate_column())
        } else {
            document.contains_key(&spec.recoverable_column())
        };
        if has_canonical {
            return Some(Self::Canonical);
        }

        let legacy = document.get(spec.legacy_column())?;
        match legacy.as_str() {
            Some(text) if is_digest(text) => Some(Self::Interim),
            _ => Some(Self::Legacy),
        }
    }
}

/// Builds the equality filter for a field under migration.
///
/// The query value is normalized with the field's own rule (the same one
/// applied at write time) and the filter matches a record stored in any
/// generation.
///
/// # Errors
///
/// Returns [`Error::UnsearchableField`] for fields whose policy writes no
/// surrogate (encrypt-only fields cannot be searched by equality).
pub fn equality_filter(spec: &FieldSpec, query: &str) -> Result<Filter, Error> {
    if !spec.policy.writes_surrogate() {
        return Err(Error::UnsearchableField(spec.name));
    }

    let normalized = spec.normalize.apply(query);
    let surrogate = digest(&normalized);

    let branches = ALL_GENERATIONS
        .iter()
        .map(|generation| match generation {
            StorageGeneration::Canonical => Filter::eq(spec.surrogate_column(), surrogate.clone()),
            StorageGeneration::Interim => Filter::eq(spec.legacy_column(), surrogate.clone()),
            StorageGeneration::Legacy => Filter::eq(spec.legacy_column(), normalized.clone()),
        })
        .collect();

    Ok(Filter::Or(branches))
}

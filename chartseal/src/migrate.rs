//! Opportunistic re-encryption of older-generation records.
//!
//! Invoked after a successful authenticated read that matched any branch of
//! the lookup disjunction. Whatever plaintext is still recoverable is
//! re-derived into the canonical surrogate + recoverable pair, and a single
//! update is issued only when at least one column actually changed: a
//! token that already decrypts to the normalized plaintext is left alone,
//! so re-running the shim on a canonical record writes nothing.
//!
//! Migration is best-effort optimization, never a precondition: the
//! authoritative read has already succeeded, so every failure here is
//! logged and swallowed.

use crate::codec::FieldCodec;
use crate::index::{canonical_json, digest};
use crate::lookup::StorageGeneration;
use crate::policy::{FieldKind, FieldSpec, PolicyTable};
use crate::store::{Document, Record, RecordStore};
use serde_json::Value;

/// Computes the column changes that would bring a stored document to the
/// canonical generation. Empty when the document is already canonical.
#[must_use]
pub fn canonical_changes(
    codec: &FieldCodec,
    table: &PolicyTable,
    document: &Document,
) -> Document {
    let mut changes = Document::new();
    for spec in table.fields {
        field_changes(codec, spec, document, &mut changes);
    }
    changes
}

/// Applies [`canonical_changes`] through the store, best-effort.
///
/// Returns true when a rewrite was persisted. Failures are logged and
/// swallowed; the caller's read result is never affected.
pub async fn migrate_record(
    codec: &FieldCodec,
    table: &PolicyTable,
    store: &dyn RecordStore,
    record: &Record,
) -> bool {
    let changes = canonical_changes(codec, table, &record.document);
    if changes.is_empty() {
        return false;
    }
    match store.update(table.collection, &record.id, changes).await {
        Ok(found) => found,
        Err(err) => {
            tracing::warn!(
                "online migration skipped for {}/{}: {err}",
                table.collection,
                record.id
            );
            false
        }
    }
}

/// The plaintext representation still recoverable from a legacy column.
fn legacy_repr(spec: &FieldSpec, value: &Value) -> Option<String> {
    match (spec.kind, value) {
        (_, Value::Null) => None,
        (FieldKind::Text, Value::String(text)) => {
            let normalized = spec.normalize.apply(text);
            if normalized.is_empty() {
                None
            } else {
                Some(normalized)
            }
        }
        (FieldKind::Text, other) => Some(canonical_json(other)),
        (_, Value::String(text)) => {
            serde_json::from_str::<Value>(text).ok().map(|parsed| canonical_json(&parsed))
        }
        (_, other) => Some(canonical_json(other)),
    }
}

fn field_changes(codec: &FieldCodec, spec: &FieldSpec, document: &Document, changes: &mut Document) {
    let Some(generation) = StorageGeneration::classify(spec, document) else {
        return;
    };

    let legacy = document.get(spec.legacy_column());
    let stored_token = document.get(&spec.recoverable_column()).and_then(Value::as_str);

    let recovered = match stored_token {
        Some(token) => codec.recover(token),
        None => match generation {
            StorageGeneration::Legacy => legacy.and_then(|value| legacy_repr(spec, value)),
            // An interim record keeps only the digest; there is no
            // plaintext left to re-encrypt.
            StorageGeneration::Interim | StorageGeneration::Canonical => None,
        },
    };

    let Some(recovered) = recovered else {
        promote_interim_surrogate(spec, generation, document, changes);
        return;
    };

    // Older writes may hold un-normalized plaintext inside the token.
    let repr = if spec.kind == FieldKind::Text {
        spec.normalize.apply(&recovered)
    } else {
        recovered.clone()
    };
    if repr.is_empty() {
        return;
    }

    if spec.policy.writes_surrogate() {
        let surrogate = Value::String(digest(&repr));
        if document.get(&spec.surrogate_column()) != Some(&surrogate) {
            changes.insert(spec.surrogate_column(), surrogate);
        }
    }

    if spec.policy.writes_recoverable() {
        let token_is_current = recovered == repr && stored_token.is_some();
        if !token_is_current {
            changes.insert(
                spec.recoverable_column(),
                Value::String(codec.cipher().seal(&repr)),
            );
        }
    }

    if legacy.is_some() {
        changes.insert(spec.legacy_column().to_string(), Value::Null);
    }
}

/// Interim-generation cleanup: move the digest out of the plaintext-named
/// column into the surrogate column. No recoverable token is invented.
fn promote_interim_surrogate(
    spec: &FieldSpec,
    generation: StorageGeneration,
    document: &Document,
    changes: &mut Document,
) {
    if generation != StorageGeneration::Interim || !spec.policy.writes_surrogate() {
        return;
    }
    let Some(stored_digest) = document.get(spec.legacy_column()).and_then(Value::as_str) else {
        return;
    };
    let surrogate = Value::String(stored_digest.to_string());
    if document.get(&spec.surrogate_column()) != Some(&surrogate) {
        changes.insert(spec.surrogate_column(), surrogate);
    }
    changes.insert(spec.legacy_column().to_string(), Value::Null);
}

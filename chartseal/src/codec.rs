//! Per-field encode/decode between plain entities and storage documents.
//!
//! `encode` turns a plain document into its storage shape: for every policy
//! field that is present and non-empty, the surrogate and the recoverable
//! token are computed from one normalized input in the same operation, so a
//! record can never carry a token that disagrees with its surrogate.
//!
//! `decode` reverses it: the recoverable token is preferred, the legacy
//! column is the last-resort fallback when no key is configured or
//! decryption fails, and a structured field that cannot be parsed falls
//! back to an empty structure instead of propagating an error.

use crate::cipher::{CipherToken, RecordCipher};
use crate::index::{canonical_json, digest};
use crate::keyring::CipherKey;
use crate::policy::{FieldKind, FieldSpec, PolicyTable};
use crate::store::Document;
use serde_json::Value;

/// What `encode` does with the legacy plaintext column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyDisposition {
    /// Fresh write: the legacy key is removed from the output.
    Remove,
    /// Update-preserving write: the legacy key is left untouched.
    Retain,
}

/// The storage representations of one sealed field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SealedField {
    /// Deterministic digest for equality search and uniqueness.
    pub surrogate: Option<String>,
    /// Authenticated-ciphertext token for recovery.
    pub recoverable: Option<String>,
}

impl SealedField {
    /// True when the field produced no representation (absent or blank).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.surrogate.is_none() && self.recoverable.is_none()
    }
}

/// Encodes and decodes sensitive fields according to a policy table.
pub struct FieldCodec {
    cipher: RecordCipher,
}

impl FieldCodec {
    /// Creates a codec over the given key state.
    #[must_use]
    pub const fn new(key: CipherKey) -> Self {
        Self { cipher: RecordCipher::new(key) }
    }

    /// Returns the underlying record cipher.
    #[must_use]
    pub const fn cipher(&self) -> &RecordCipher {
        &self.cipher
    }

    /// The normalized plaintext representation of a field value, or `None`
    /// for absent/blank values (which are never sealed).
    fn plaintext_repr(spec: &FieldSpec, value: &Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::String(text) => {
                let normalized = spec.normalize.apply(text);
                if normalized.is_empty() {
                    None
                } else {
                    Some(normalized)
                }
            }
            other => Some(canonical_json(other)),
        }
    }

    /// Seals one field value into its storage representations.
    ///
    /// Both representations are derived from the same normalized input, so
    /// a present recoverable token always decrypts to the plaintext its
    /// surrogate was computed from.
    #[must_use]
    pub fn seal_field(&self, spec: &FieldSpec, value: &Value) -> SealedField {
        let Some(repr) = Self::plaintext_repr(spec, value) else {
            return SealedField::default();
        };
        SealedField {
            surrogate: spec.policy.writes_surrogate().then(|| digest(&repr)),
            recoverable: spec.policy.writes_recoverable().then(|| self.cipher.seal(&repr)),
        }
    }

    /// Recovers the plaintext representation behind a stored column value.
    ///
    /// Three cases: the value is a token that authenticates (recovered
    /// plaintext), the value is a well-formed token that fails under an
    /// active key (`None`: tampered or foreign-key data), or the value is
    /// not a token at all (degraded-mode plaintext, returned as-is).
    pub(crate) fn recover(&self, stored_value: &str) -> Option<String> {
        if let Some(plaintext) = self.cipher.try_open(stored_value) {
            return Some(plaintext);
        }
        if self.cipher.is_active() && CipherToken::parse(stored_value).is_some() {
            None
        } else {
            Some(stored_value.to_string())
        }
    }

    fn empty_structure(kind: FieldKind) -> Value {
        match kind {
            FieldKind::JsonList => Value::Array(Vec::new()),
            _ => Value::Object(serde_json::Map::new()),
        }
    }

    /// Reshapes a legacy column value for a structured field.
    fn structured_from_legacy(kind: FieldKind, legacy: &Value) -> Value {
        match legacy {
            Value::String(text) => {
                serde_json::from_str(text).unwrap_or_else(|_| Self::empty_structure(kind))
            }
            Value::Null => Self::empty_structure(kind),
            other => other.clone(),
        }
    }

    /// Recovers one field from a storage document.
    ///
    /// Returns `None` when nothing is recoverable in any representation
    /// (including hash-only fields, whose values are never stored).
    #[must_use]
    pub fn open_field(&self, spec: &FieldSpec, stored: &Document) -> Option<Value> {
        let recoverable = stored.get(&spec.recoverable_column()).and_then(Value::as_str);
        let legacy = stored.get(spec.legacy_column());

        match spec.kind {
            FieldKind::Text => match recoverable {
                Some(token) => match self.recover(token) {
                    Some(plaintext) => Some(Value::String(plaintext)),
                    None => legacy.cloned(),
                },
                None => legacy.cloned(),
            },
            FieldKind::Json | FieldKind::JsonList => {
                let from_legacy =
                    || legacy.map(|value| Self::structured_from_legacy(spec.kind, value));
                match recoverable {
                    Some(token) => match self.recover(token) {
                        Some(text) => Some(serde_json::from_str(&text).unwrap_or_else(|_| {
                            from_legacy().unwrap_or_else(|| Self::empty_structure(spec.kind))
                        })),
                        None => {
                            Some(from_legacy().unwrap_or_else(|| Self::empty_structure(spec.kind)))
                        }
                    },
                    None => from_legacy(),
                }
            }
        }
    }

    /// Encodes a plain entity into its storage document.
    ///
    /// Policy fields that are present and non-empty gain their surrogate
    /// and/or recoverable columns; everything else passes through
    /// untouched. The legacy plaintext key is removed or retained per the
    /// caller's disposition.
    #[must_use]
    pub fn encode(
        &self,
        table: &PolicyTable,
        plain: &Document,
        disposition: LegacyDisposition,
    ) -> Document {
        let mut storage = plain.clone();
        for spec in table.fields {
            let Some(value) = plain.get(spec.name) else {
                continue;
            };
            let sealed = self.seal_field(spec, value);
            if sealed.is_empty() {
                continue;
            }
            if let Some(surrogate) = sealed.surrogate {
                storage.insert(spec.surrogate_column(), Value::String(surrogate));
            }
            if let Some(recoverable) = sealed.recoverable {
                storage.insert(spec.recoverable_column(), Value::String(recoverable));
            }
            if disposition == LegacyDisposition::Remove {
                storage.remove(spec.name);
            }
        }
        storage
    }

    /// Encodes a partial plain entity into a column-change set for an
    /// update-in-place write.
    ///
    /// Same as a fresh-write encode, plus explicit `null` entries that
    /// clear any stale legacy column left behind by an earlier generation.
    #[must_use]
    pub fn encode_changes(&self, table: &PolicyTable, plain: &Document) -> Document {
        let mut changes = self.encode(table, plain, LegacyDisposition::Remove);
        for spec in table.fields {
            if plain.contains_key(spec.name) && !changes.contains_key(spec.name) {
                changes.insert(spec.name.to_string(), Value::Null);
            }
        }
        changes
    }

    /// Decodes a storage document back into its plain entity.
    ///
    /// Sibling surrogate/recoverable columns are stripped from the output;
    /// a field with nothing recoverable is absent from the plain view.
    #[must_use]
    pub fn decode(&self, table: &PolicyTable, stored: &Document) -> Document {
        let mut plain = stored.clone();
        for spec in table.fields {
            let resolved = self.open_field(spec, stored);
            plain.remove(&spec.surrogate_column());
            plain.remove(&spec.recoverable_column());
            match resolved {
                Some(value) => {
                    plain.insert(spec.name.to_string(), value);
                }
                None => {
                    plain.remove(spec.name);
                }
            }
        }
        plain
    }
}

impl Clone for FieldCodec {
    fn clone(&self) -> Self {
        Self { cipher: self.cipher.clone() }
    }
}

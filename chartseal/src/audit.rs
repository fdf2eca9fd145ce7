//! Tamper-evident, append-only audit trail.
//!
//! Every entry is canonicalized, signed, sealed through the field codec,
//! and persisted on a detached task: a failed audit write is logged and
//! never fails or rolls back the triggering business operation. Once
//! written an entry is never mutated or deleted here; retention is an
//! external concern.
//!
//! The canonical payload is the exact byte sequence the signature covers.
//! Its field order is the struct declaration order below, the details blob
//! is rendered with sorted object keys, and the timestamp format is
//! RFC 3339 with millisecond precision. All three are part of the signer
//! contract, since any divergence invalidates all verification.

use crate::accounts::Role;
use crate::codec::{FieldCodec, LegacyDisposition};
use crate::error::Error;
use crate::index::digest;
use crate::lookup::equality_filter;
use crate::policy::ACTIVITY_LOGS;
use crate::signer::{AuditSigner, AuditVerifier};
use crate::store::{Document, FindOptions, RecordId, RecordStore};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Default listing limit.
pub const DEFAULT_LOG_LIMIT: usize = 100;

/// Hard ceiling on listing limits.
pub const MAX_LOG_LIMIT: usize = 500;

/// The acting identity attached to an entry.
#[derive(Debug, Clone)]
pub struct Actor {
    /// Hospital identifier of the actor.
    pub hospital_id: String,
    /// Role of the actor.
    pub role: Role,
}

/// The exact byte layout a signature covers. Field order is load-bearing.
#[derive(Serialize)]
struct CanonicalPayload<'a> {
    action: &'a str,
    actor_id: Option<&'a str>,
    actor_role: Option<&'a str>,
    details: &'a Value,
    origin: Option<&'a str>,
    recorded_at: &'a str,
}

fn canonical_payload(
    action: &str,
    actor_id: Option<&str>,
    actor_role: Option<&str>,
    details: &Value,
    origin: Option<&str>,
    recorded_at: &str,
) -> String {
    let payload = CanonicalPayload { action, actor_id, actor_role, details, origin, recorded_at };
    serde_json::to_string(&payload)
        .unwrap_or_else(|_| String::from(r#"{"error":"unserializable payload"}"#))
}

/// Verification verdict for a stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Signature checks out against the reconstructed payload.
    Valid,
    /// Signature or payload no longer match.
    Tampered,
    /// The entry carries no signature (signer was unconfigured).
    Unattributed,
    /// Verification is impossible: the recoverable columns cannot be
    /// opened (symmetric key unavailable) or no public key is at hand.
    Unverifiable,
}

impl VerifyOutcome {
    /// True only for [`VerifyOutcome::Valid`].
    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl fmt::Display for VerifyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Valid => "valid",
            Self::Tampered => "tampered",
            Self::Unattributed => "unattributed",
            Self::Unverifiable => "unverifiable",
        };
        f.write_str(text)
    }
}

/// Listing query for [`AuditTrail::recent`].
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    /// Optional action equality filter (matched across all generations).
    pub action: Option<String>,
    /// Maximum entries to return; clamped to `1..=MAX_LOG_LIMIT`.
    pub limit: Option<usize>,
}

/// A decoded audit entry, as presented to operators.
#[derive(Debug, Clone)]
pub struct AuditView {
    /// Store-assigned identifier.
    pub id: RecordId,
    /// Recovered action, or its stored fallback.
    pub action: Option<String>,
    /// Recovered actor identifier.
    pub actor_id: Option<String>,
    /// Actor role surrogate (filter-only; the role itself is never stored).
    pub actor_role_surrogate: Option<String>,
    /// Recovered details blob (empty object when unrecoverable).
    pub details: Value,
    /// Recovered origin address.
    pub origin: Option<String>,
    /// Recovered signature bytes, base64.
    pub signature: Option<String>,
    /// Timestamp the canonical payload was built with.
    pub recorded_at: Option<String>,
}

/// Append-only writer and verifier for the audit log.
pub struct AuditTrail {
    store: Arc<dyn RecordStore>,
    codec: FieldCodec,
    signer: Arc<AuditSigner>,
}

impl AuditTrail {
    /// Creates an audit trail over a store, codec, and signer.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, codec: FieldCodec, signer: AuditSigner) -> Self {
        Self { store, codec, signer: Arc::new(signer) }
    }

    /// Records an entry, fire-and-forget.
    ///
    /// The entry is built and signed synchronously, then persisted on a
    /// detached task. The returned handle may be dropped; the write
    /// completes (or is logged as dropped) in the background and never
    /// surfaces a failure to the caller. Must be called within a tokio
    /// runtime.
    pub fn record(
        &self,
        action: &str,
        actor: Option<&Actor>,
        details: Value,
        origin: Option<&str>,
    ) -> JoinHandle<()> {
        let entry = self.build_entry(action, actor, details, origin, Utc::now());
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(err) = store.insert(ACTIVITY_LOGS.collection, entry).await {
                tracing::error!("failed to write audit entry: {err}");
            }
        })
    }

    /// Builds the storage document for an entry at a given instant.
    ///
    /// Exposed for deterministic testing; [`AuditTrail::record`] stamps the
    /// current time.
    #[must_use]
    pub fn build_entry(
        &self,
        action: &str,
        actor: Option<&Actor>,
        details: Value,
        origin: Option<&str>,
        at: DateTime<Utc>,
    ) -> Document {
        let recorded_at = at.to_rfc3339_opts(SecondsFormat::Millis, true);
        // Absent details are recorded as an empty blob so the payload stays
        // reconstructible from the stored columns.
        let details = if details.is_null() { json!({}) } else { details };

        let actor_id_surrogate = actor.map(|actor| {
            let spec = ACTIVITY_LOGS.field("userHospitalID");
            let normalized = spec
                .map_or_else(|| actor.hospital_id.clone(), |spec| {
                    spec.normalize.apply(&actor.hospital_id)
                });
            digest(&normalized)
        });
        let actor_role_surrogate = actor.map(|actor| digest(actor.role.as_str()));
        let origin_surrogate = origin.map(digest);

        let payload = canonical_payload(
            action,
            actor_id_surrogate.as_deref(),
            actor_role_surrogate.as_deref(),
            &details,
            origin_surrogate.as_deref(),
            &recorded_at,
        );
        let signature =
            self.signer.sign(payload.as_bytes()).map(|sig| STANDARD.encode(sig.to_bytes()));

        let mut plain = Document::new();
        plain.insert("action".to_string(), json!(action));
        if let Some(actor) = actor {
            plain.insert("userHospitalID".to_string(), json!(actor.hospital_id));
            plain.insert("userRole".to_string(), json!(actor.role.as_str()));
        }
        plain.insert("details".to_string(), details);
        if let Some(origin) = origin {
            plain.insert("ip".to_string(), json!(origin));
        }
        if let Some(signature) = signature {
            plain.insert("signature".to_string(), json!(signature));
        }
        plain.insert("recordedAt".to_string(), json!(recorded_at));

        self.codec.encode(&ACTIVITY_LOGS, &plain, LegacyDisposition::Remove)
    }

    /// Verifies a stored entry against this trail's signing key.
    #[must_use]
    pub fn verify(&self, document: &Document) -> VerifyOutcome {
        verify_entry(&self.codec, self.signer.verifier().as_ref(), document)
    }

    /// Boolean convenience over [`AuditTrail::verify`].
    #[must_use]
    pub fn verify_signature(&self, document: &Document) -> bool {
        self.verify(document).is_valid()
    }

    /// Lists recent entries, newest first, decoded for presentation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] for backend failures.
    pub async fn recent(&self, query: &LogQuery) -> Result<Vec<AuditView>, Error> {
        let filter = match &query.action {
            Some(action) => {
                let spec = ACTIVITY_LOGS
                    .field("action")
                    .ok_or(Error::UnsearchableField("action"))?;
                Some(equality_filter(spec, action)?)
            }
            None => None,
        };

        let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
        let records = self
            .store
            .find_many(
                ACTIVITY_LOGS.collection,
                filter.as_ref(),
                FindOptions { limit: Some(limit), newest_first: true },
            )
            .await?;

        Ok(records
            .into_iter()
            .map(|record| {
                let plain = self.codec.decode(&ACTIVITY_LOGS, &record.document);
                AuditView {
                    id: record.id,
                    action: text_field(&plain, "action"),
                    actor_id: text_field(&plain, "userHospitalID"),
                    actor_role_surrogate: text_field(&record.document, "userRoleHash"),
                    details: plain.get("details").cloned().unwrap_or(Value::Null),
                    origin: text_field(&plain, "ip"),
                    signature: text_field(&plain, "signature"),
                    recorded_at: text_field(&plain, "recordedAt"),
                }
            })
            .collect())
    }
}

/// Verifies a stored entry document with an explicit verifier.
///
/// This is the external-auditor entry point: it needs the symmetric key
/// (to open the recoverable action, details, and signature columns) and
/// the public half of the signing key. The coupling between signature
/// verifiability and symmetric-key availability is deliberate.
#[must_use]
pub fn verify_entry(
    codec: &FieldCodec,
    verifier: Option<&AuditVerifier>,
    document: &Document,
) -> VerifyOutcome {
    let has_signature = document.contains_key("signatureEncrypted")
        || document.contains_key("signatureHash")
        || document.contains_key("signature");
    if !has_signature {
        return VerifyOutcome::Unattributed;
    }
    let Some(verifier) = verifier else {
        return VerifyOutcome::Unverifiable;
    };

    let failure = || {
        if codec.cipher().is_active() {
            VerifyOutcome::Tampered
        } else {
            VerifyOutcome::Unverifiable
        }
    };

    let Some(recorded_at) = document.get("recordedAt").and_then(Value::as_str) else {
        return failure();
    };

    let Some(signature_b64) = recover_text(codec, document, "signature") else {
        return failure();
    };
    let Ok(signature) = STANDARD.decode(&signature_b64) else {
        return failure();
    };

    let Some(action) = recover_text(codec, document, "action") else {
        return failure();
    };
    let details = match recover_text(codec, document, "details") {
        Some(text) => match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(_) => return failure(),
        },
        None => return failure(),
    };

    let actor_id = document.get("userHospitalIDHash").and_then(Value::as_str);
    let actor_role = document.get("userRoleHash").and_then(Value::as_str);
    let origin = document.get("ipHash").and_then(Value::as_str);

    let payload =
        canonical_payload(&action, actor_id, actor_role, &details, origin, recorded_at);
    if verifier.verify(payload.as_bytes(), &signature) {
        VerifyOutcome::Valid
    } else {
        VerifyOutcome::Tampered
    }
}

/// Recovers the plaintext behind one recoverable column, with no legacy
/// fallback: verification must see exactly what was sealed.
fn recover_text(codec: &FieldCodec, document: &Document, field: &str) -> Option<String> {
    let token = document.get(&format!("{field}Encrypted")).and_then(Value::as_str)?;
    codec.recover(token)
}

fn text_field(document: &Document, field: &str) -> Option<String> {
    document.get(field).and_then(Value::as_str).map(ToString::to_string)
}

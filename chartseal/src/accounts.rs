//! Account registration and authentication over the encrypted store.
//!
//! The registry composes the codec, lookup builder, and migration shim:
//! registration probes all three storage generations before writing the
//! canonical form, and every successful authentication opportunistically
//! upgrades the matched record.

use crate::codec::{FieldCodec, LegacyDisposition};
use crate::credential;
use crate::error::{Error, StoreError};
use crate::lookup::equality_filter;
use crate::migrate::migrate_record;
use crate::policy::{HOSPITAL_ID, PATIENTS, USERS};
use crate::store::{Document, Record, RecordId, RecordStore};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Closed role enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Administrative staff.
    Admin,
    /// Treating clinician.
    Doctor,
    /// Patient (default).
    Patient,
}

impl Role {
    /// Canonical lowercase form, as stored and hashed.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Doctor => "doctor",
            Self::Patient => "patient",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "doctor" => Ok(Self::Doctor),
            "patient" => Ok(Self::Patient),
            other => Err(Error::InvalidRole(other.to_string())),
        }
    }
}

/// A registration request, as submitted by the surrounding layer.
#[derive(Debug, Clone)]
pub struct NewAccount {
    /// External hospital identifier (unique at the surrogate layer).
    pub hospital_id: String,
    /// Plaintext password; hashed before storage, never sealed.
    pub password: String,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: String,
    /// Optional contact phone number.
    pub phone_number: Option<String>,
    /// Requested role; defaults to patient when absent.
    pub role: Option<String>,
}

/// Public projection of an account. Never exposes the credential hash or
/// any storage column.
#[derive(Debug, Clone)]
pub struct Account {
    /// Store-assigned identifier.
    pub id: RecordId,
    /// Hospital identifier, normalized.
    pub hospital_id: String,
    /// Display name, when recoverable.
    pub name: Option<String>,
    /// Contact email, when recoverable.
    pub email: Option<String>,
    /// Contact phone number, when recoverable.
    pub phone_number: Option<String>,
    /// Account role.
    pub role: Role,
}

/// Registration and authentication operations.
pub struct AccountRegistry {
    store: Arc<dyn RecordStore>,
    codec: FieldCodec,
}

impl AccountRegistry {
    /// Creates a registry over a store and codec.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, codec: FieldCodec) -> Self {
        Self { store, codec }
    }

    /// Registers a new account.
    ///
    /// Uniqueness is checked twice: a read probe across all three storage
    /// generations, then the store's own unique constraint on the
    /// surrogate column. Two concurrent signups racing on the same
    /// identifier both attempt the write and the loser is rejected.
    /// Registering a patient also bootstraps an empty patient chart.
    ///
    /// # Errors
    ///
    /// [`Error::MissingField`] for blank required fields,
    /// [`Error::InvalidRole`] for roles outside the closed set,
    /// [`Error::IdentifierInUse`] on an identifier collision, and
    /// [`Error::Store`] for backend failures.
    pub async fn register(&self, account: NewAccount) -> Result<Account, Error> {
        let hospital_id = require_nonempty(&account.hospital_id, "hospital identifier")?;
        let hospital_id = HOSPITAL_ID.normalize.apply(&hospital_id);
        let name = require_nonempty(&account.name, "name")?;
        let email = require_nonempty(&account.email, "email")?;
        if account.password.is_empty() {
            return Err(Error::MissingField { field: "password" });
        }
        let role = match account.role.as_deref() {
            None | Some("") => Role::Patient,
            Some(raw) => Role::from_str(raw)?,
        };

        let filter = equality_filter(&HOSPITAL_ID, &hospital_id)?;
        if self.store.find_one(USERS.collection, &filter).await?.is_some() {
            return Err(Error::IdentifierInUse);
        }

        let mut plain = Document::new();
        plain.insert("HospitalID".to_string(), json!(hospital_id));
        plain.insert("name".to_string(), json!(name));
        plain.insert("email".to_string(), json!(email));
        if let Some(phone) = normalize_optional(account.phone_number.as_deref()) {
            plain.insert("phoneNumber".to_string(), json!(phone));
        }
        plain.insert("role".to_string(), json!(role.as_str()));
        plain.insert("password".to_string(), json!(credential::hash_password(&account.password)?));

        let storage = self.codec.encode(&USERS, &plain, LegacyDisposition::Remove);
        let id = match self.store.insert(USERS.collection, storage).await {
            Ok(id) => id,
            Err(StoreError::UniqueViolation { .. }) => return Err(Error::IdentifierInUse),
            Err(err) => return Err(err.into()),
        };

        if role == Role::Patient {
            let mut chart = Document::new();
            chart.insert("HospitalID".to_string(), json!(hospital_id));
            chart.insert("medicalHistory".to_string(), json!([]));
            let chart_storage = self.codec.encode(&PATIENTS, &chart, LegacyDisposition::Remove);
            self.store.insert(PATIENTS.collection, chart_storage).await?;
        }

        Ok(Account {
            id,
            hospital_id,
            name: Some(name),
            email: Some(email),
            phone_number: normalize_optional(account.phone_number.as_deref()),
            role,
        })
    }

    /// Authenticates an identifier/password pair.
    ///
    /// The lookup matches any storage generation; after the credential
    /// checks out, the matched record is opportunistically migrated to the
    /// canonical form (best-effort, never affecting the result).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCredentials`] for any unknown identifier, identity
    /// mismatch, or wrong password (indistinguishable by design), and
    /// [`Error::Store`] for backend failures.
    pub async fn authenticate(&self, hospital_id: &str, password: &str) -> Result<Account, Error> {
        let normalized = HOSPITAL_ID.normalize.apply(hospital_id);
        if normalized.is_empty() || password.is_empty() {
            return Err(Error::InvalidCredentials);
        }

        let filter = equality_filter(&HOSPITAL_ID, &normalized)?;
        let Some(record) = self.store.find_one(USERS.collection, &filter).await? else {
            return Err(Error::InvalidCredentials);
        };

        let Some(account) = self.project(&record) else {
            return Err(Error::InvalidCredentials);
        };
        // The digest branches of the filter can only collide maliciously;
        // re-check the recovered identity before trusting the match.
        if account.hospital_id != normalized {
            return Err(Error::InvalidCredentials);
        }

        let stored_hash = record.document.get("password").and_then(Value::as_str);
        let verified = stored_hash.is_some_and(|hash| credential::verify_password(password, hash));
        if !verified {
            return Err(Error::InvalidCredentials);
        }

        migrate_record(&self.codec, &USERS, self.store.as_ref(), &record).await;
        Ok(account)
    }

    /// Looks up an account by hospital identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] for backend failures.
    pub async fn find(&self, hospital_id: &str) -> Result<Option<Account>, Error> {
        let normalized = HOSPITAL_ID.normalize.apply(hospital_id);
        if normalized.is_empty() {
            return Ok(None);
        }
        let filter = equality_filter(&HOSPITAL_ID, &normalized)?;
        let record = self.store.find_one(USERS.collection, &filter).await?;
        Ok(record.as_ref().and_then(|record| self.project(record)))
    }

    /// Decodes a stored record into its public projection.
    fn project(&self, record: &Record) -> Option<Account> {
        let plain = self.codec.decode(&USERS, &record.document);
        let hospital_id = plain.get("HospitalID")?.as_str()?.to_string();
        let role = plain
            .get("role")
            .and_then(Value::as_str)
            .and_then(|raw| Role::from_str(raw).ok())
            .unwrap_or(Role::Patient);

        Some(Account {
            id: record.id.clone(),
            hospital_id,
            name: field_text(&plain, "name"),
            email: field_text(&plain, "email"),
            phone_number: field_text(&plain, "phoneNumber"),
            role,
        })
    }
}

fn field_text(document: &Document, field: &str) -> Option<String> {
    document.get(field).and_then(Value::as_str).map(ToString::to_string)
}

fn require_nonempty(value: &str, field: &'static str) -> Result<String, Error> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::MissingField { field });
    }
    Ok(trimmed.to_string())
}

fn normalize_optional(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|text| !text.is_empty()).map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!(Role::from_str("doctor").unwrap(), Role::Doctor);
        assert_eq!(Role::from_str(" Admin ").unwrap(), Role::Admin);
        assert_eq!(Role::from_str("PATIENT").unwrap(), Role::Patient);
        assert!(matches!(Role::from_str("nurse"), Err(Error::InvalidRole(_))));
    }

    #[test]
    fn test_role_canonical_form() {
        assert_eq!(Role::Doctor.as_str(), "doctor");
        assert_eq!(Role::Admin.to_string(), "admin");
    }

    #[test]
    fn test_require_nonempty() {
        assert_eq!(require_nonempty(" H1 ", "id").unwrap(), "H1");
        assert!(matches!(
            require_nonempty("   ", "id"),
            Err(Error::MissingField { field: "id" })
        ));
    }

    #[test]
    fn test_normalize_optional() {
        assert_eq!(normalize_optional(Some(" 555 ")), Some("555".to_string()));
        assert_eq!(normalize_optional(Some("  ")), None);
        assert_eq!(normalize_optional(None), None);
    }
}

//! # Chartseal
//!
//! Field-level protection for medical records: authenticated encryption
//! with blind-index equality search, legacy-format compatibility during a
//! migration window, and a tamper-evident signed audit trail.
//!
//! ## Features
//!
//! - AES-256-GCM recoverable tokens (`nonce:ciphertext:tag`, base64)
//! - Deterministic blind indexes for equality search and uniqueness
//! - Ed25519 hash-then-sign attribution of audit entries
//! - Per-entity policy tables (encrypt-and-hash / encrypt-only / hash-only)
//! - Three-generation lookup disjunction (legacy, interim, canonical)
//! - Online best-effort migration of older records
//! - Explicit degraded mode when no key material is configured
//!
//! ## Example
//!
//! ```rust,ignore
//! use chartseal::prelude::*;
//! use std::sync::Arc;
//!
//! let keys = KeyConfig::from_env();
//! let codec = FieldCodec::new(keys.cipher);
//! let registry = AccountRegistry::new(Arc::new(store), codec.clone());
//!
//! let account = registry
//!     .register(NewAccount {
//!         hospital_id: "H100".into(),
//!         password: "correct horse".into(),
//!         name: "Ada Lovelace".into(),
//!         email: "ada@example.com".into(),
//!         phone_number: None,
//!         role: None,
//!     })
//!     .await?;
//! ```

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod accounts;
pub mod audit;
pub mod cipher;
pub mod codec;
pub mod credential;
pub mod error;
pub mod index;
pub mod keyring;
pub mod lookup;
pub mod migrate;
pub mod patients;
pub mod policy;
pub mod signer;
pub mod store;

pub mod prelude {
    //! Convenience re-exports for common use.
    pub use crate::accounts::{Account, AccountRegistry, NewAccount, Role};
    pub use crate::audit::{Actor, AuditTrail, LogQuery, VerifyOutcome};
    pub use crate::codec::{FieldCodec, LegacyDisposition, SealedField};
    pub use crate::error::{Error, StoreError};
    pub use crate::keyring::{CipherKey, KeyConfig};
    pub use crate::lookup::{equality_filter, Filter};
    pub use crate::patients::{ChartUpdate, PatientChart, PatientDirectory};
    pub use crate::signer::{AuditSigner, AuditVerifier};
    pub use crate::store::{Document, FindOptions, Record, RecordId, RecordStore};
}

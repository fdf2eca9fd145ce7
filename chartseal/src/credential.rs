//! Password credential hashing.
//!
//! Credentials are explicitly outside the sensitive-field scheme: they use
//! an independent slow, salted, one-way hash (Argon2id, PHC string format)
//! exclusively for verification, and are never encrypted or
//! surrogate-indexed.

use crate::error::Error;
use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

/// Hashes a password with a fresh random salt.
///
/// # Errors
///
/// Returns [`Error::Credential`] if hashing fails.
pub fn hash_password(password: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| Error::Credential(err.to_string()))
}

/// Verifies a password against a stored PHC hash string.
///
/// Returns false for a mismatch and for an unparseable stored hash alike;
/// authentication failure is a single observable outcome.
#[must_use]
pub fn verify_password(password: &str, stored: &str) -> bool {
    PasswordHash::new(stored)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

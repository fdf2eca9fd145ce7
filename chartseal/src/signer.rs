//! Detached signing of canonical audit payloads.
//!
//! Fixed hash-then-sign scheme: the canonical payload bytes are digested
//! with SHA-256 and the digest is signed with an Ed25519 key loaded from
//! PKCS#8 PEM. With no key configured signing is skipped and the entry is
//! recorded unattributed; a missing signature is a state, not an error.
//!
//! Verification reconstructs the canonical payload byte-for-byte (stable
//! field order, stable timestamp format; see the audit module) and checks
//! the signature with the corresponding public key. Any divergence in
//! canonicalization invalidates all verification, so the payload layout is
//! part of this contract.

use crate::error::Error;
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

/// Signature length in bytes (Ed25519).
pub const SIGNATURE_SIZE: usize = 64;

/// Signing state for audit attribution.
pub enum AuditSigner {
    /// A usable private key.
    Enabled(SigningKey),
    /// No key configured; entries are recorded unattributed.
    Disabled,
}

impl AuditSigner {
    /// Loads a signer from PKCS#8 PEM material.
    ///
    /// Absent or malformed material yields [`AuditSigner::Disabled`].
    #[must_use]
    pub fn from_pem(pem: Option<&str>) -> Self {
        let Some(pem) = pem else {
            return Self::Disabled;
        };
        match SigningKey::from_pkcs8_pem(pem) {
            Ok(key) => Self::Enabled(key),
            Err(err) => {
                tracing::warn!("signing key PEM rejected, audit entries will be unattributed: {err}");
                Self::Disabled
            }
        }
    }

    /// Returns true when a private key is configured.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    /// Signs a canonical payload.
    ///
    /// Returns `None` when no key is configured; downstream code must treat
    /// a missing signature as "entry not attributable", not as an error.
    #[must_use]
    pub fn sign(&self, payload: &[u8]) -> Option<Signature> {
        let Self::Enabled(key) = self else {
            return None;
        };
        Some(key.sign(Sha256::digest(payload).as_slice()))
    }

    /// Returns the verifier matching this signer's key, if any.
    #[must_use]
    pub fn verifier(&self) -> Option<AuditVerifier> {
        let Self::Enabled(key) = self else {
            return None;
        };
        Some(AuditVerifier { key: key.verifying_key() })
    }
}

/// Verifies detached audit signatures with a public key.
///
/// Intended for the external auditor path: the verifier needs only the
/// public half of the keypair.
#[derive(Debug, Clone)]
pub struct AuditVerifier {
    key: VerifyingKey,
}

impl AuditVerifier {
    /// Loads a verifier from public-key PEM material.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyMaterial`] when the PEM cannot be parsed.
    pub fn from_public_key_pem(pem: &str) -> Result<Self, Error> {
        VerifyingKey::from_public_key_pem(pem)
            .map(|key| Self { key })
            .map_err(|err| Error::KeyMaterial(format!("public key PEM rejected: {err}")))
    }

    /// Checks a signature over a canonical payload.
    ///
    /// Returns false for malformed signature bytes as well as for a genuine
    /// mismatch; the caller cannot (and need not) distinguish the two.
    #[must_use]
    pub fn verify(&self, payload: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        self.key.verify(Sha256::digest(payload).as_slice(), &signature).is_ok()
    }
}

/// A freshly generated signing keypair, PEM-encoded.
pub struct SigningKeyPair {
    /// PKCS#8 private key PEM.
    pub private_pem: String,
    /// SPKI public key PEM.
    pub public_pem: String,
}

impl SigningKeyPair {
    /// Builds a keypair from 32 seed bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyMaterial`] if PEM encoding fails.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, Error> {
        let key = SigningKey::from_bytes(seed);
        let private_pem = key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|err| Error::KeyMaterial(format!("private key encoding failed: {err}")))?
            .as_str()
            .to_owned();
        let public_pem = key
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|err| Error::KeyMaterial(format!("public key encoding failed: {err}")))?;
        Ok(Self { private_pem, public_pem })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_signer() -> (AuditSigner, AuditVerifier) {
        let pair = SigningKeyPair::from_seed(&[9u8; 32]).expect("keypair");
        let signer = AuditSigner::from_pem(Some(&pair.private_pem));
        let verifier = AuditVerifier::from_public_key_pem(&pair.public_pem).expect("verifier");
        (signer, verifier)
    }

    #[test]
    fn test_sign_and_verify() {
        let (signer, verifier) = test_signer();
        let payload = br#"{"action":"login"}"#;
        let signature = signer.sign(payload).expect("signature");
        assert!(verifier.verify(payload, &signature.to_bytes()));
    }

    #[test]
    fn test_mutated_payload_fails_verification() {
        let (signer, verifier) = test_signer();
        let payload = br#"{"action":"login"}"#;
        let signature = signer.sign(payload).expect("signature");

        let mut mutated = payload.to_vec();
        mutated[2] ^= 0x01;
        assert!(!verifier.verify(&mutated, &signature.to_bytes()));
    }

    #[test]
    fn test_malformed_signature_bytes_fail_closed() {
        let (_, verifier) = test_signer();
        assert!(!verifier.verify(b"payload", b"too short"));
        assert!(!verifier.verify(b"payload", &[0u8; SIGNATURE_SIZE]));
    }

    #[test]
    fn test_disabled_signer_skips() {
        let signer = AuditSigner::from_pem(None);
        assert!(!signer.is_enabled());
        assert!(signer.sign(b"payload").is_none());
        assert!(signer.verifier().is_none());
    }

    #[test]
    fn test_malformed_pem_degrades() {
        let signer = AuditSigner::from_pem(Some("-----BEGIN GARBAGE-----"));
        assert!(!signer.is_enabled());
    }

    #[test]
    fn test_signer_verifier_matches_public_pem() {
        let pair = SigningKeyPair::from_seed(&[3u8; 32]).expect("keypair");
        let signer = AuditSigner::from_pem(Some(&pair.private_pem));
        let payload = b"attributable";
        let signature = signer.sign(payload).expect("signature");

        let from_signer = signer.verifier().expect("verifier");
        let from_pem = AuditVerifier::from_public_key_pem(&pair.public_pem).expect("verifier");
        assert!(from_signer.verify(payload, &signature.to_bytes()));
        assert!(from_pem.verify(payload, &signature.to_bytes()));
    }
}

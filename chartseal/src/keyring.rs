//! Key-material configuration.
//!
//! All key handling is explicit: the symmetric cipher key and the audit
//! signing key are parsed once, at construction, into two-state types whose
//! `Disabled` variants name the degraded plaintext-passthrough mode. Call
//! sites never probe the environment themselves.

use crate::error::Error;
use crate::signer::{AuditSigner, SigningKeyPair};
use secrecy::{ExposeSecret, SecretVec};
use zeroize::Zeroize;

/// Symmetric key size in bytes (256 bits).
pub const CIPHER_KEY_SIZE: usize = 32;

/// Environment variable holding the symmetric key material.
pub const CIPHER_KEY_ENV: &str = "CHARTSEAL_CIPHER_KEY";

/// Environment variable holding the PKCS#8 PEM signing key.
pub const SIGNING_KEY_ENV: &str = "CHARTSEAL_SIGNING_KEY";

/// Symmetric key state for the record cipher.
///
/// Key material is accepted either as 64 hex characters or as a base64
/// string decoding to exactly 32 bytes. Anything else, including absence,
/// yields [`CipherKey::Disabled`], in which mode `seal` and `open` pass
/// values through unchanged. Degradation is a named state, not an implicit
/// null check.
pub enum CipherKey {
    /// A usable 256-bit key.
    Active(SecretVec<u8>),
    /// No usable key; the cipher passes values through unchanged.
    Disabled,
}

impl CipherKey {
    /// Parses key material into a key state.
    ///
    /// # Example
    ///
    /// ```
    /// use chartseal::keyring::CipherKey;
    ///
    /// let key = CipherKey::parse(Some(&"ab".repeat(32)));
    /// assert!(key.is_active());
    ///
    /// assert!(!CipherKey::parse(None).is_active());
    /// assert!(!CipherKey::parse(Some("not a key")).is_active());
    /// ```
    #[must_use]
    pub fn parse(material: Option<&str>) -> Self {
        let Some(material) = material else {
            return Self::Disabled;
        };

        let trimmed = material.trim();
        if trimmed.is_empty() {
            return Self::Disabled;
        }

        if trimmed.len() == CIPHER_KEY_SIZE * 2 {
            if let Ok(bytes) = hex::decode(trimmed) {
                return Self::Active(SecretVec::new(bytes));
            }
        }

        use base64::{engine::general_purpose::STANDARD, Engine as _};
        match STANDARD.decode(trimmed) {
            Ok(bytes) if bytes.len() == CIPHER_KEY_SIZE => Self::Active(SecretVec::new(bytes)),
            Ok(mut bytes) => {
                let decoded_len = bytes.len();
                bytes.zeroize();
                tracing::warn!(
                    "cipher key material has wrong length ({decoded_len} bytes), running without encryption"
                );
                Self::Disabled
            }
            Err(_) => {
                tracing::warn!("cipher key material is neither hex nor base64, running without encryption");
                Self::Disabled
            }
        }
    }

    /// Returns true when a usable key is configured.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    pub(crate) fn bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Active(key) => Some(key.expose_secret()),
            Self::Disabled => None,
        }
    }
}

impl Clone for CipherKey {
    fn clone(&self) -> Self {
        match self {
            Self::Active(key) => Self::Active(SecretVec::new(key.expose_secret().clone())),
            Self::Disabled => Self::Disabled,
        }
    }
}

/// The injected key configuration handed to the codec and audit trail.
pub struct KeyConfig {
    /// Symmetric key for recoverable tokens.
    pub cipher: CipherKey,
    /// Signing key for audit attribution.
    pub signer: AuditSigner,
}

impl KeyConfig {
    /// Creates a configuration from already-parsed key states.
    #[must_use]
    pub const fn new(cipher: CipherKey, signer: AuditSigner) -> Self {
        Self { cipher, signer }
    }

    /// Reads key material from the process environment.
    ///
    /// Missing or malformed variables degrade to the `Disabled` states.
    #[must_use]
    pub fn from_env() -> Self {
        let cipher = CipherKey::parse(std::env::var(CIPHER_KEY_ENV).ok().as_deref());
        let signer = AuditSigner::from_pem(std::env::var(SIGNING_KEY_ENV).ok().as_deref());
        Self { cipher, signer }
    }

    /// A configuration with no usable keys (full plaintext passthrough).
    #[must_use]
    pub const fn disabled() -> Self {
        Self { cipher: CipherKey::Disabled, signer: AuditSigner::Disabled }
    }
}

/// Generates a fresh random 256-bit cipher key, hex-encoded.
#[must_use]
pub fn generate_cipher_key() -> String {
    use aes_gcm::aead::{rand_core::RngCore, OsRng};

    let mut bytes = [0u8; CIPHER_KEY_SIZE];
    OsRng.fill_bytes(&mut bytes);
    let encoded = hex::encode(bytes);
    bytes.zeroize();
    encoded
}

/// Generates a fresh Ed25519 signing keypair as a PEM pair.
///
/// # Errors
///
/// Returns [`Error::KeyMaterial`] if PEM encoding fails.
pub fn generate_signing_keypair() -> Result<SigningKeyPair, Error> {
    use aes_gcm::aead::{rand_core::RngCore, OsRng};

    let mut seed = [0u8; 32];
    OsRng.fill_bytes(&mut seed);
    let pair = SigningKeyPair::from_seed(&seed);
    seed.zeroize();
    pair
}

//! Authenticated encryption of single field values.
//!
//! Values are sealed with AES-256-GCM into a self-contained recoverable
//! token: `base64(nonce):base64(ciphertext):base64(tag)`. Exactly two
//! delimiter characters and three non-empty segments; any other shape is
//! "not a token" and is treated as plaintext.
//!
//! Both directions degrade rather than fail: with no usable key `seal` and
//! `open` are identity transforms, and `open` returns its input unchanged on
//! any malformed or tampered token. Callers distinguish "recovered" from
//! "unchanged" by comparing the output against the stored token shape.

use crate::keyring::CipherKey;
use aes_gcm::{
    aead::{consts::U16, rand_core::RngCore, Aead, KeyInit, OsRng},
    aes::Aes256,
    AesGcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;

/// AES-256-GCM with a 128-bit nonce, matching the stored token layout.
type Aes256Gcm = AesGcm<Aes256, U16>;

/// Nonce size in bytes (128 bits), generated fresh per seal call.
pub const NONCE_SIZE: usize = 16;

/// Authentication tag size in bytes (128 bits).
pub const TAG_SIZE: usize = 16;

/// Token segment delimiter.
pub const TOKEN_DELIMITER: char = ':';

/// A parsed recoverable token: `(nonce, ciphertext, tag)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherToken {
    nonce: [u8; NONCE_SIZE],
    ciphertext: Vec<u8>,
    tag: [u8; TAG_SIZE],
}

impl CipherToken {
    /// Parses a stored string into a token.
    ///
    /// Returns `None` unless the string has exactly three non-empty
    /// base64 segments with a well-sized nonce and tag.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let mut segments = raw.split(TOKEN_DELIMITER);
        let (nonce_b64, cipher_b64, tag_b64) =
            (segments.next()?, segments.next()?, segments.next()?);
        if segments.next().is_some() {
            return None;
        }
        if nonce_b64.is_empty() || cipher_b64.is_empty() || tag_b64.is_empty() {
            return None;
        }

        let nonce: [u8; NONCE_SIZE] = STANDARD.decode(nonce_b64).ok()?.try_into().ok()?;
        let ciphertext = STANDARD.decode(cipher_b64).ok()?;
        let tag: [u8; TAG_SIZE] = STANDARD.decode(tag_b64).ok()?.try_into().ok()?;

        Some(Self { nonce, ciphertext, tag })
    }

    /// Returns the nonce bytes.
    #[must_use]
    pub const fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }

    /// Returns the ciphertext bytes (tag excluded).
    #[must_use]
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Returns the authentication tag bytes.
    #[must_use]
    pub const fn tag(&self) -> &[u8; TAG_SIZE] {
        &self.tag
    }
}

impl fmt::Display for CipherToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{TOKEN_DELIMITER}{}{TOKEN_DELIMITER}{}",
            STANDARD.encode(self.nonce),
            STANDARD.encode(&self.ciphertext),
            STANDARD.encode(self.tag)
        )
    }
}

/// Seals and opens recoverable tokens for stored field values.
pub struct RecordCipher {
    key: CipherKey,
}

impl RecordCipher {
    /// Creates a cipher over the given key state.
    #[must_use]
    pub const fn new(key: CipherKey) -> Self {
        Self { key }
    }

    /// Returns true when a usable key is configured.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.key.is_active()
    }

    /// Seals a plaintext value into a recoverable token.
    ///
    /// A fresh random 128-bit nonce is generated per call, so sealing the
    /// same value twice yields two different tokens. With no usable key the
    /// input is returned unchanged (documented degraded mode). Empty input
    /// is returned unchanged; absent values are never sealed.
    #[must_use]
    pub fn seal(&self, plaintext: &str) -> String {
        let Some(key_bytes) = self.key.bytes() else {
            return plaintext.to_string();
        };
        if plaintext.is_empty() {
            return String::new();
        }
        let Ok(cipher) = Aes256Gcm::new_from_slice(key_bytes) else {
            return plaintext.to_string();
        };

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from(nonce_bytes);

        match cipher.encrypt(&nonce, plaintext.as_bytes()) {
            Ok(mut sealed) => {
                let tag_bytes = sealed.split_off(sealed.len() - TAG_SIZE);
                let Ok(tag) = tag_bytes.try_into() else {
                    return plaintext.to_string();
                };
                CipherToken { nonce: nonce_bytes, ciphertext: sealed, tag }.to_string()
            }
            Err(_) => plaintext.to_string(),
        }
    }

    /// Opens a stored value, returning the recovered plaintext when the
    /// value is a well-formed token that authenticates under the key.
    ///
    /// Returns `None` for everything else: no key configured, not a token,
    /// decode failure, tag mismatch, or non-UTF-8 plaintext.
    #[must_use]
    pub fn try_open(&self, stored: &str) -> Option<String> {
        let key_bytes = self.key.bytes()?;
        let token = CipherToken::parse(stored)?;
        let cipher = Aes256Gcm::new_from_slice(key_bytes).ok()?;

        let nonce = Nonce::from(token.nonce);
        let mut sealed = token.ciphertext;
        sealed.extend_from_slice(&token.tag);

        let plaintext = cipher.decrypt(&nonce, sealed.as_slice()).ok()?;
        String::from_utf8(plaintext).ok()
    }

    /// Opens a stored value, returning the input unchanged on any failure.
    ///
    /// The tag is verified before any plaintext is returned; a tampered
    /// token comes back as the tampered input, never as wrong plaintext.
    #[must_use]
    pub fn open(&self, stored: &str) -> String {
        self.try_open(stored).unwrap_or_else(|| stored.to_string())
    }
}

impl Clone for RecordCipher {
    fn clone(&self) -> Self {
        Self { key: self.key.clone() }
    }
}

//! Symmetric cipher box and the base64 token codec built on top of it.
//!
//! One key for the process lifetime, sealed in memory. This is deliberately
//! a throwaway cipher: no rotation, no key versioning, no decryption of data
//! encrypted under a previous key. Restarting with a new key invalidates
//! every cookie ever issued.

use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretBox};
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;
use tracing::warn;

pub const KEY_LENGTH: usize = 32;

const NONCE_LENGTH: usize = 12;

/// Encrypt or decrypt failed. Carries no detail on purpose: neither key
/// material nor ciphertext fragments belong in an error message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherFault {
    #[error("encrypt operation failed")]
    Encrypt,
    #[error("decrypt operation failed")]
    Decrypt,
}

/// The gateway's 32-byte secret key, sealed so it cannot leak through
/// `Debug`, logs, or serialized state.
pub struct CipherKey {
    sealed: SecretBox<[u8; KEY_LENGTH]>,
}

impl CipherKey {
    /// Validate and seal a secret key. The key must be exactly 32 bytes.
    ///
    /// # Errors
    /// Returns an error when the key length is wrong. The message contains
    /// the observed length, never the key itself.
    pub fn from_secret(secret: &str) -> anyhow::Result<Self> {
        let bytes = secret.as_bytes();
        if bytes.len() != KEY_LENGTH {
            anyhow::bail!(
                "secret key must be exactly {KEY_LENGTH} bytes, got {}",
                bytes.len()
            );
        }
        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(bytes);
        Ok(Self {
            sealed: SecretBox::new(Box::new(key)),
        })
    }

    fn unseal(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(self.sealed.expose_secret()))
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CipherKey(sealed)")
    }
}

/// AEAD cipher keyed once for the process lifetime.
///
/// Output layout is `nonce (12 bytes) || ciphertext`. The cipher object is
/// re-initialized from the sealed key after any failed operation, the only
/// recovery action; the triggering operation still fails and is never
/// retried here.
pub struct SymmetricCipherBox {
    key: CipherKey,
    cipher: Mutex<ChaCha20Poly1305>,
}

impl SymmetricCipherBox {
    #[must_use]
    pub fn new(key: CipherKey) -> Self {
        let cipher = Mutex::new(key.unseal());
        Self { key, cipher }
    }

    /// Encrypt UTF-8 text into `nonce || ciphertext`.
    ///
    /// # Errors
    /// Returns [`CipherFault::Encrypt`] when the AEAD operation fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, CipherFault> {
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut cipher = self.cipher.lock().unwrap_or_else(|poisoned| {
            // A panic while holding the lock cannot corrupt the stateless
            // AEAD object, so the value is still usable.
            poisoned.into_inner()
        });

        match cipher.encrypt(nonce, plaintext.as_bytes()) {
            Ok(ciphertext) => {
                let mut sealed = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
                sealed.extend_from_slice(&nonce_bytes);
                sealed.extend_from_slice(&ciphertext);
                Ok(sealed)
            }
            Err(_) => {
                *cipher = self.key.unseal();
                warn!("cipher re-initialized after failed encrypt");
                Err(CipherFault::Encrypt)
            }
        }
    }

    /// Decrypt `nonce || ciphertext` back into UTF-8 text.
    ///
    /// # Errors
    /// Returns [`CipherFault::Decrypt`] on truncated input, authentication
    /// failure (wrong key or tampered data), or non-UTF-8 plaintext.
    pub fn decrypt(&self, data: &[u8]) -> Result<String, CipherFault> {
        if data.len() < NONCE_LENGTH {
            return Err(CipherFault::Decrypt);
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LENGTH);
        let nonce = Nonce::from_slice(nonce_bytes);

        let mut cipher = self
            .cipher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match cipher.decrypt(nonce, ciphertext) {
            Ok(plaintext) => String::from_utf8(plaintext).map_err(|_| CipherFault::Decrypt),
            Err(_) => {
                *cipher = self.key.unseal();
                warn!("cipher re-initialized after failed decrypt");
                Err(CipherFault::Decrypt)
            }
        }
    }
}

impl fmt::Debug for SymmetricCipherBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricCipherBox")
    }
}

/// Base64 transport on top of [`SymmetricCipherBox`], used wherever opaque
/// text has to survive the cookie charset.
#[derive(Debug)]
pub struct TokenCodec {
    cipher: SymmetricCipherBox,
}

impl TokenCodec {
    #[must_use]
    pub fn new(cipher: SymmetricCipherBox) -> Self {
        Self { cipher }
    }

    /// Encrypt and base64-encode text for cookie transport.
    ///
    /// # Errors
    /// Returns [`CipherFault::Encrypt`] when encryption fails.
    pub fn seal(&self, plaintext: &str) -> Result<String, CipherFault> {
        let sealed = self.cipher.encrypt(plaintext)?;
        Ok(STANDARD.encode(sealed))
    }

    /// Base64-decode and decrypt a cookie value.
    ///
    /// # Errors
    /// Returns [`CipherFault::Decrypt`] on invalid base64 or failed
    /// decryption.
    pub fn open(&self, encoded: &str) -> Result<String, CipherFault> {
        let sealed = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|_| CipherFault::Decrypt)?;
        self.cipher.decrypt(&sealed)
    }
}

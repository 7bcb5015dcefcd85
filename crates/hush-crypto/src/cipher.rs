use std::fmt;
use std::sync::Arc;

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;

pub const SALT_SIZE: usize = 16;
pub const NONCE_SIZE: usize = 12;
pub const KEY_SIZE: usize = 32;
const TAG_SIZE: usize = 16;

/// HKDF info label. Changing it makes every stored message unreadable.
const KDF_INFO: &[u8] = b"hush-message-v1";

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("cipher misconfigured: {0}")]
    Configuration(&'static str),

    /// Key derivation or cipher construction failed. Not retryable.
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),
}

/// Symmetric cipher for message text.
///
/// Envelope layout, base64 encoded: `salt(16) || nonce(12) || ciphertext+tag`.
/// Holds no mutable state, so one instance is shared by every request.
#[derive(Clone)]
pub struct MessageCipher {
    passphrase: Arc<[u8]>,
}

impl fmt::Debug for MessageCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageCipher").finish_non_exhaustive()
    }
}

impl MessageCipher {
    pub fn new(passphrase: impl AsRef<[u8]>) -> Result<Self, CryptoError> {
        let passphrase = passphrase.as_ref();
        if passphrase.is_empty() {
            return Err(CryptoError::Configuration("passphrase must not be empty"));
        }
        Ok(Self {
            passphrase: Arc::from(passphrase),
        })
    }

    /// Encrypt message text into a self-contained envelope.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);

        let cipher = self
            .derive_cipher(&salt)
            .map_err(CryptoError::Encryption)?;

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut envelope = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
        envelope.extend_from_slice(&salt);
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(envelope))
    }

    /// Decrypt an envelope produced by [`MessageCipher::encrypt`].
    pub fn decrypt(&self, envelope: &str) -> Result<String, CryptoError> {
        let bytes = BASE64
            .decode(envelope)
            .map_err(|e| CryptoError::Decryption(format!("invalid base64: {e}")))?;

        if bytes.len() < SALT_SIZE + NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Decryption(format!(
                "envelope too short: {} bytes",
                bytes.len()
            )));
        }

        let (salt, rest) = bytes.split_at(SALT_SIZE);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);

        let cipher = self.derive_cipher(salt).map_err(CryptoError::Decryption)?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CryptoError::Decryption("authentication failed".into()))?;

        String::from_utf8(plaintext)
            .map_err(|_| CryptoError::Decryption("plaintext is not UTF-8".into()))
    }

    fn derive_cipher(&self, salt: &[u8]) -> Result<Aes256Gcm, String> {
        let hk = Hkdf::<Sha256>::new(Some(salt), &self.passphrase);
        let mut key = [0u8; KEY_SIZE];
        hk.expand(KDF_INFO, &mut key)
            .map_err(|e| format!("key derivation: {e}"))?;
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| format!("cipher init: {e}"));
        key.fill(0);
        cipher
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> MessageCipher {
        MessageCipher::new("correct horse battery staple").unwrap()
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let cipher = cipher();
        for text in ["Hello from Hush!", "", "ünïcødé ✓ 你好"] {
            let envelope = cipher.encrypt(text).unwrap();
            assert_ne!(envelope, text);
            assert_eq!(cipher.decrypt(&envelope).unwrap(), text);
        }
    }

    #[test]
    fn same_plaintext_encrypts_differently() {
        let cipher = cipher();
        let a = cipher.encrypt("hello").unwrap();
        let b = cipher.encrypt("hello").unwrap();
        assert_ne!(a, b);
        assert_eq!(cipher.decrypt(&a).unwrap(), "hello");
        assert_eq!(cipher.decrypt(&b).unwrap(), "hello");
    }

    #[test]
    fn wrong_passphrase_fails() {
        let envelope = cipher().encrypt("Secret message").unwrap();
        let other = MessageCipher::new("another passphrase").unwrap();
        assert!(matches!(
            other.decrypt(&envelope),
            Err(CryptoError::Decryption(_))
        ));
    }

    #[test]
    fn tampered_envelope_fails() {
        let cipher = cipher();
        let envelope = cipher.encrypt("Secret message").unwrap();
        let mut bytes = BASE64.decode(&envelope).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(cipher.decrypt(&BASE64.encode(bytes)).is_err());
    }

    #[test]
    fn malformed_envelopes_fail() {
        let cipher = cipher();
        assert!(matches!(
            cipher.decrypt("not base64 at all!"),
            Err(CryptoError::Decryption(_))
        ));
        assert!(matches!(
            cipher.decrypt(&BASE64.encode([0u8; 20])),
            Err(CryptoError::Decryption(_))
        ));
    }

    #[test]
    fn empty_passphrase_rejected() {
        assert!(matches!(
            MessageCipher::new(""),
            Err(CryptoError::Configuration(_))
        ));
    }
}

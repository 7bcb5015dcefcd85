/// Hush Crypto Library
///
/// Message text is encrypted at rest with AES-256-GCM. Every envelope carries
/// its own random salt and nonce, and the cipher key is derived per message
/// from the server passphrase with HKDF-SHA256, so the passphrase alone does
/// not reproduce any key without the envelope's salt.
pub mod cipher;
pub mod dispatch;
pub mod keys;

pub use cipher::{CryptoError, MessageCipher};
pub use dispatch::{UNDECRYPTABLE_PLACEHOLDER, decrypt_payload};

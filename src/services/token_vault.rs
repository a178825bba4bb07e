//! Refresh-token encryption at rest
//!
//! AES-256-GCM with a process-wide key derived from `SECRET_KEY`. The wire
//! form is base64 of `nonce || ciphertext`; a fresh random 96-bit nonce per
//! encryption. Plaintext refresh tokens exist only transiently in memory
//! and never reach logs or API responses.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

const NONCE_LEN: usize = 12;

pub struct TokenVault {
    cipher: Aes256Gcm,
}

impl TokenVault {
    /// Derive the process key from the configured secret.
    pub fn new(secret_key: &str) -> Self {
        let digest = Sha256::digest(secret_key.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&digest);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| AppError::internal("token encryption failed"))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(payload))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let payload = BASE64
            .decode(encoded)
            .map_err(|_| AppError::internal("stored token is not valid base64"))?;
        if payload.len() <= NONCE_LEN {
            return Err(AppError::internal("stored token payload too short"));
        }
        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| AppError::internal("token decryption failed"))?;
        String::from_utf8(plaintext)
            .map_err(|_| AppError::internal("decrypted token is not valid utf-8"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let vault = TokenVault::new("test-secret");
        let encrypted = vault.encrypt("refresh-token-value").unwrap();
        assert_ne!(encrypted, "refresh-token-value");
        assert_eq!(vault.decrypt(&encrypted).unwrap(), "refresh-token-value");
    }

    #[test]
    fn nonces_differ_between_encryptions() {
        let vault = TokenVault::new("test-secret");
        let a = vault.encrypt("same").unwrap();
        let b = vault.encrypt("same").unwrap();
        assert_ne!(a, b);
        assert_eq!(vault.decrypt(&a).unwrap(), vault.decrypt(&b).unwrap());
    }

    #[test]
    fn wrong_key_fails_closed() {
        let vault = TokenVault::new("secret-one");
        let other = TokenVault::new("secret-two");
        let encrypted = vault.encrypt("value").unwrap();
        assert!(other.decrypt(&encrypted).is_err());
    }

    #[test]
    fn garbage_input_is_rejected() {
        let vault = TokenVault::new("secret");
        assert!(vault.decrypt("not-base64!!!").is_err());
        assert!(vault.decrypt("").is_err());
    }
}

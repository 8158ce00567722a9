//! Content encryption.
//!
//! Encrypted content files are AES-256-GCM, with the random nonce
//! prepended to the ciphertext. Key material lives at
//! `.info/.storage_key.sec` inside the archive and is generated on first
//! use; losing it makes every `.crypt` file unreadable.

#![allow(clippy::missing_errors_doc)]

use std::fs;
use std::path::Path;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use crate::{Error, Result};

/// AES-256-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// AES-256 key length in bytes.
const KEY_LEN: usize = 32;

/// A content cipher bound to one archive's key file.
pub struct ContentCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for ContentCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCipher").finish_non_exhaustive()
    }
}

impl ContentCipher {
    /// Loads the key from `path`, generating and persisting a fresh one if
    /// the file does not exist yet.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        let key = if path.exists() {
            let bytes = fs::read(path)?;
            if bytes.len() != KEY_LEN {
                return Err(Error::Crypto(format!(
                    "key file {} has {} bytes, expected {KEY_LEN}",
                    path.display(),
                    bytes.len()
                )));
            }
            *Key::<Aes256Gcm>::from_slice(&bytes)
        } else {
            let key = Aes256Gcm::generate_key(OsRng);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, key)?;
            key
        };

        Ok(Self {
            cipher: Aes256Gcm::new(&key),
        })
    }

    /// Encrypts content, returning `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| Error::Crypto("encryption failed".to_owned()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypts `nonce || ciphertext` produced by [`ContentCipher::encrypt`].
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < NONCE_LEN {
            return Err(Error::Crypto("ciphertext shorter than nonce".to_owned()));
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Crypto("decryption failed (wrong key or corrupt file)".to_owned()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn key_is_created_once_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join(".storage_key.sec");

        let first = ContentCipher::load_or_create(&key_path).unwrap();
        let sealed = first.encrypt(b"attachment bytes").unwrap();

        let second = ContentCipher::load_or_create(&key_path).unwrap();
        assert_eq!(second.decrypt(&sealed).unwrap(), b"attachment bytes");
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cipher = ContentCipher::load_or_create(&dir.path().join("key")).unwrap();

        let mut sealed = cipher.encrypt(b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(cipher.decrypt(&sealed).is_err());
    }

    #[test]
    fn truncated_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cipher = ContentCipher::load_or_create(&dir.path().join("key")).unwrap();
        assert!(cipher.decrypt(b"short").is_err());
    }

    #[test]
    fn wrong_length_key_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("key");
        std::fs::write(&key_path, b"too short").unwrap();
        assert!(ContentCipher::load_or_create(&key_path).is_err());
    }
}

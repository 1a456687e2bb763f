use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;

use crate::config::{EncryptionConfig, EncryptionMode};
use crate::error::{MnemoError, Result};

/// Symmetric encryption applied to every stored object after compression.
pub trait CryptoEngine: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>>;
    fn is_encrypting(&self) -> bool;
}

/// No-op engine for unencrypted repositories.
pub struct PlaintextEngine;

impl CryptoEngine for PlaintextEngine {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn is_encrypting(&self) -> bool {
        false
    }
}

/// AES-256-GCM authenticated encryption.
/// Wire format: `[12-byte nonce][ciphertext with appended 16-byte tag]`.
pub struct Aes256GcmEngine {
    cipher: Aes256Gcm,
}

impl Aes256GcmEngine {
    pub fn new(key: &[u8; 32]) -> Self {
        let cipher = Aes256Gcm::new_from_slice(key).expect("valid 32-byte key for AES-256-GCM");
        Self { cipher }
    }
}

impl CryptoEngine for Aes256GcmEngine {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| MnemoError::Other(format!("AES-GCM encrypt: {e}")))?;

        let mut out = Vec::with_capacity(12 + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < 12 + 16 {
            return Err(MnemoError::DecryptionFailed);
        }
        let (nonce_bytes, ciphertext) = data.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| MnemoError::DecryptionFailed)
    }

    fn is_encrypting(&self) -> bool {
        true
    }
}

/// Build the engine selected by the configuration.
pub fn engine_from_config(cfg: &EncryptionConfig) -> Result<Box<dyn CryptoEngine>> {
    match cfg.mode {
        EncryptionMode::None => Ok(Box::new(PlaintextEngine)),
        EncryptionMode::Aes256Gcm => {
            let key_hex = cfg.key_hex.as_deref().ok_or_else(|| {
                MnemoError::Config("aes256gcm requires encryption.key_hex".into())
            })?;
            let mut key = [0u8; 32];
            if key_hex.len() != 64 || hex::decode_to_slice(key_hex, &mut key).is_err() {
                return Err(MnemoError::Config(
                    "encryption.key_hex must be 64 hex characters".into(),
                ));
            }
            Ok(Box::new(Aes256GcmEngine::new(&key)))
        }
    }
}

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;

use crate::error::AiError;

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

/// Seals teachers' Gemini keys before they reach the store.
///
/// Sealed form is `<nonce b64>.<ciphertext b64>`.
#[derive(Clone)]
pub struct ApiKeyVault {
    encryption_key: [u8; KEY_SIZE],
}

impl std::fmt::Debug for ApiKeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyVault").finish_non_exhaustive()
    }
}

impl ApiKeyVault {
    pub fn new(encryption_key: [u8; KEY_SIZE]) -> Self {
        Self { encryption_key }
    }

    pub fn from_base64_key(key: &str) -> Result<Self, AiError> {
        let key_bytes = BASE64.decode(key)
            .map_err(|e| AiError::Vault(format!("Invalid encryption key: {}", e)))?;

        if key_bytes.len() != KEY_SIZE {
            return Err(AiError::Vault("Invalid encryption key length".to_string()));
        }

        let mut encryption_key = [0u8; KEY_SIZE];
        encryption_key.copy_from_slice(&key_bytes);

        Ok(Self { encryption_key })
    }

    pub fn seal(&self, api_key: &str) -> Result<String, AiError> {
        let cipher = Aes256Gcm::new_from_slice(&self.encryption_key)
            .map_err(|e| AiError::Vault(format!("Encryption error: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let encrypted = cipher
            .encrypt(nonce, api_key.as_bytes())
            .map_err(|e| AiError::Vault(format!("Encryption failed: {}", e)))?;

        Ok(format!("{}.{}", BASE64.encode(nonce_bytes), BASE64.encode(encrypted)))
    }

    pub fn open(&self, sealed: &str) -> Result<String, AiError> {
        let (nonce_part, data_part) = sealed
            .split_once('.')
            .ok_or_else(|| AiError::Vault("Malformed sealed key".to_string()))?;

        let cipher = Aes256Gcm::new_from_slice(&self.encryption_key)
            .map_err(|e| AiError::Vault(format!("Decryption error: {}", e)))?;

        let nonce_bytes = BASE64.decode(nonce_part)
            .map_err(|e| AiError::Vault(format!("Invalid nonce: {}", e)))?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(AiError::Vault("Invalid nonce length".to_string()));
        }
        let nonce = Nonce::from_slice(&nonce_bytes);

        let encrypted_data = BASE64.decode(data_part)
            .map_err(|e| AiError::Vault(format!("Invalid encrypted data: {}", e)))?;

        let decrypted = cipher
            .decrypt(nonce, encrypted_data.as_ref())
            .map_err(|e| AiError::Vault(format!("Decryption failed: {}", e)))?;

        String::from_utf8(decrypted)
            .map_err(|e| AiError::Vault(format!("Invalid UTF-8: {}", e)))
    }
}

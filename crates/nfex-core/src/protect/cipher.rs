//! AES-256-GCM encryption of individual field values.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::ProtectError;

const NONCE_LEN: usize = 12;

/// Symmetric cipher for field values.
///
/// Output is base64 of `nonce || ciphertext`, so equal inputs encrypt to
/// different outputs.
pub struct FieldCipher {
    key: [u8; 32],
}

impl FieldCipher {
    /// Derive the 256-bit key from a passphrase.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"nfex_field_protection_v2");
        hasher.update(passphrase.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&hasher.finalize());
        Self { key }
    }

    fn cipher(&self) -> Result<Aes256Gcm, ProtectError> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|e| ProtectError::Cipher(e.to_string()))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, ProtectError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher()?
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| ProtectError::Cipher(format!("encryption failed: {e}")))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(general_purpose::STANDARD.encode(&combined))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, ProtectError> {
        let combined = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ProtectError::Cipher(format!("base64 decode failed: {e}")))?;

        if combined.len() < NONCE_LEN {
            return Err(ProtectError::Cipher("ciphertext too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| ProtectError::Cipher(format!("decryption failed: {e}")))?;

        String::from_utf8(plaintext).map_err(|e| ProtectError::Cipher(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let cipher = FieldCipher::from_passphrase("segredo");
        let sealed = cipher.encrypt("12345678000190").unwrap();

        assert_ne!(sealed, "12345678000190");
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "12345678000190");
    }

    #[test]
    fn test_nonce_makes_output_unique() {
        let cipher = FieldCipher::from_passphrase("segredo");
        assert_ne!(cipher.encrypt("x").unwrap(), cipher.encrypt("x").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = FieldCipher::from_passphrase("a").encrypt("valor").unwrap();
        assert!(FieldCipher::from_passphrase("b").decrypt(&sealed).is_err());
        assert!(FieldCipher::from_passphrase("a").decrypt("!!!").is_err());
    }
}

//! Passphrase encryption for exported team packages
//!
//! Keys are derived from a shared passphrase with PBKDF2-HMAC-SHA256 and
//! data is sealed with AES-256-GCM.
//!
//! # Wire Format
//!
//! `base64( salt (16 bytes) || nonce (12 bytes) || ciphertext + auth_tag (16 bytes) )`
//!
//! A legacy keystream cipher is kept in [`legacy`] so files exported by old
//! builds still import. It is never used to produce new output.
//!
//! # Example
//!
//! ```
//! use griddown_team_core::crypto::PassphraseCipher;
//!
//! let cipher = PassphraseCipher::with_iterations(1_000);
//! let sealed = cipher.encrypt(b"rally at the bridge", "correct horse").unwrap();
//! let opened = cipher.decrypt(&sealed, "correct horse").unwrap();
//! assert_eq!(opened, b"rally at the bridge");
//! ```

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use sha2::Sha256;

use crate::error::TeamError;

/// Salt size for PBKDF2 (16 bytes)
pub const SALT_SIZE: usize = 16;

/// Nonce size for AES-256-GCM (12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag appended by AES-GCM
pub const TAG_SIZE: usize = 16;

/// PBKDF2 iteration count used by every peer
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

/// Passphrase-based AEAD cipher.
///
/// Holds only the KDF cost; the key is re-derived per call from the
/// passphrase and the salt embedded in each ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassphraseCipher {
    iterations: u32,
}

impl Default for PassphraseCipher {
    fn default() -> Self {
        Self::new()
    }
}

impl PassphraseCipher {
    /// Cipher with the standard iteration count
    pub fn new() -> Self {
        Self::with_iterations(DEFAULT_KDF_ITERATIONS)
    }

    /// Cipher with an explicit iteration count.
    ///
    /// Peers must agree on the count or decryption fails.
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Derive a 256-bit key from a passphrase and salt
    pub fn derive_key(&self, passphrase: &str, salt: &[u8]) -> [u8; 32] {
        let mut key = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, self.iterations, &mut key);
        key
    }

    /// Encrypt with a fresh salt and nonce, returning the base64 envelope
    pub fn encrypt(&self, plaintext: &[u8], passphrase: &str) -> Result<String, TeamError> {
        let mut salt = [0u8; SALT_SIZE];
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        let mut rng = rand::rng();
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut nonce_bytes);

        let key = self.derive_key(passphrase, &salt);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| TeamError::Crypto(format!("Encryption failed: {}", e)))?;

        let mut blob = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(blob))
    }

    /// Decrypt a base64 envelope produced by [`encrypt`](Self::encrypt).
    ///
    /// A wrong passphrase, tampered data, or malformed input all fail with
    /// [`TeamError::DecryptionFailed`].
    pub fn decrypt(&self, encoded: &str, passphrase: &str) -> Result<Vec<u8>, TeamError> {
        let blob = STANDARD
            .decode(encoded.trim())
            .map_err(|e| TeamError::DecryptionFailed(format!("Invalid base64: {}", e)))?;

        if blob.len() < SALT_SIZE + NONCE_SIZE + TAG_SIZE {
            return Err(TeamError::DecryptionFailed(
                "Data too short to contain salt, nonce and tag".to_string(),
            ));
        }

        let (salt, rest) = blob.split_at(SALT_SIZE);
        let (nonce, ciphertext) = rest.split_at(NONCE_SIZE);

        let key = self.derive_key(passphrase, salt);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| TeamError::DecryptionFailed("authentication failed".to_string()))
    }

    /// [`encrypt`](Self::encrypt) on the blocking pool
    pub async fn encrypt_async(
        &self,
        plaintext: Vec<u8>,
        passphrase: String,
    ) -> Result<String, TeamError> {
        let cipher = *self;
        tokio::task::spawn_blocking(move || cipher.encrypt(&plaintext, &passphrase))
            .await
            .map_err(|e| TeamError::Crypto(format!("Encryption task failed: {}", e)))?
    }

    /// [`decrypt`](Self::decrypt) on the blocking pool
    pub async fn decrypt_async(
        &self,
        encoded: String,
        passphrase: String,
    ) -> Result<Vec<u8>, TeamError> {
        let cipher = *self;
        tokio::task::spawn_blocking(move || cipher.decrypt(&encoded, &passphrase))
            .await
            .map_err(|e| TeamError::Crypto(format!("Decryption task failed: {}", e)))?
    }
}

/// Read-only support for packages exported before AES-GCM.
///
/// The keystream is seeded from a 32-bit rolling hash of the passphrase and
/// offers no real secrecy or integrity.
pub mod legacy {
    use super::*;

    /// 32-bit rolling string hash (`h = h * 31 + byte`, wrapping)
    pub fn rolling_hash(passphrase: &str) -> u32 {
        passphrase
            .bytes()
            .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(b as u32))
    }

    /// XOR `data` with the passphrase keystream. Symmetric.
    pub(crate) fn apply_keystream(data: &[u8], passphrase: &str) -> Vec<u8> {
        let pass = passphrase.as_bytes();
        let mut state = rolling_hash(passphrase);
        data.iter()
            .enumerate()
            .map(|(i, byte)| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                let mut k = (state >> 16) as u8;
                if !pass.is_empty() {
                    k ^= pass[i % pass.len()];
                }
                byte ^ k
            })
            .collect()
    }

    /// Decrypt a legacy base64 payload.
    ///
    /// The cipher has no tag, so a wrong passphrase is detected by the
    /// output failing to be UTF-8 JSON.
    pub fn decrypt(encoded: &str, passphrase: &str) -> Result<Vec<u8>, TeamError> {
        let data = STANDARD
            .decode(encoded.trim())
            .map_err(|e| TeamError::DecryptionFailed(format!("Invalid base64: {}", e)))?;
        let plaintext = apply_keystream(&data, passphrase);
        serde_json::from_slice::<serde_json::Value>(&plaintext).map_err(|_| {
            TeamError::DecryptionFailed("legacy payload did not decode to JSON".to_string())
        })?;
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> PassphraseCipher {
        PassphraseCipher::with_iterations(1_000)
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = fast();
        let sealed = cipher.encrypt(b"Hello, Team!", "hunter2").unwrap();
        let opened = cipher.decrypt(&sealed, "hunter2").unwrap();
        assert_eq!(opened, b"Hello, Team!");
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let cipher = fast();
        let sealed = cipher.encrypt(b"", "p").unwrap();
        assert!(cipher.decrypt(&sealed, "p").unwrap().is_empty());
    }

    #[test]
    fn test_envelope_layout() {
        let cipher = fast();
        let sealed = cipher.encrypt(b"Test", "p").unwrap();
        let blob = STANDARD.decode(sealed).unwrap();
        assert_eq!(blob.len(), SALT_SIZE + NONCE_SIZE + 4 + TAG_SIZE);
    }

    #[test]
    fn test_same_plaintext_different_ciphertext() {
        let cipher = fast();
        let a = cipher.encrypt(b"same", "p").unwrap();
        let b = cipher.encrypt(b"same", "p").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let cipher = fast();
        let sealed = cipher.encrypt(b"Secret", "right").unwrap();
        assert!(matches!(
            cipher.decrypt(&sealed, "wrong"),
            Err(TeamError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_tampered_data_fails() {
        let cipher = fast();
        let sealed = cipher.encrypt(b"Original message", "p").unwrap();
        let mut blob = STANDARD.decode(sealed).unwrap();
        blob[SALT_SIZE + NONCE_SIZE] ^= 0xFF;
        let tampered = STANDARD.encode(blob);
        assert!(matches!(
            cipher.decrypt(&tampered, "p"),
            Err(TeamError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_truncated_and_garbage_input_fails() {
        let cipher = fast();
        let short = STANDARD.encode([0u8; 20]);
        match cipher.decrypt(&short, "p") {
            Err(TeamError::DecryptionFailed(msg)) => assert!(msg.contains("too short")),
            other => panic!("expected DecryptionFailed, got {:?}", other),
        }
        assert!(matches!(
            cipher.decrypt("%%% not base64 %%%", "p"),
            Err(TeamError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_iteration_mismatch_fails() {
        let sealed = fast().encrypt(b"x", "p").unwrap();
        let other = PassphraseCipher::with_iterations(1_001);
        assert!(other.decrypt(&sealed, "p").is_err());
    }

    #[test]
    fn test_derive_key_is_deterministic() {
        let cipher = fast();
        let salt = [7u8; SALT_SIZE];
        assert_eq!(cipher.derive_key("p", &salt), cipher.derive_key("p", &salt));
        assert_ne!(cipher.derive_key("p", &salt), cipher.derive_key("q", &salt));
    }

    #[tokio::test]
    async fn test_async_roundtrip() {
        let cipher = fast();
        let sealed = cipher
            .encrypt_async(b"async".to_vec(), "p".to_string())
            .await
            .unwrap();
        let opened = cipher.decrypt_async(sealed, "p".to_string()).await.unwrap();
        assert_eq!(opened, b"async");
    }

    #[test]
    fn test_legacy_roundtrip_and_wrong_passphrase() {
        let json = br#"{"teamName":"Ridge"}"#;
        let scrambled = STANDARD.encode(legacy::apply_keystream(json, "old-pass"));
        assert_eq!(legacy::decrypt(&scrambled, "old-pass").unwrap(), json);
        assert!(matches!(
            legacy::decrypt(&scrambled, "not-it"),
            Err(TeamError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_rolling_hash_known_value() {
        // "ab" = 97 * 31 + 98
        assert_eq!(legacy::rolling_hash("ab"), 3105);
        assert_eq!(legacy::rolling_hash(""), 0);
    }
}

//! XChaCha20-Poly1305 envelope cipher.
//!
//! Callers that already hold a 32-byte session key (from whatever handshake they run)
//! wrap it in [`Crypto`] and install it on the transport. Each sealed fragment carries
//! its own random 24-byte nonce in front of the ciphertext:
//!
//! ```text
//! [nonce(24)] [ciphertext ‖ tag(16)]
//! ```

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use zeroize::Zeroize;

use crate::core::envelope::Cipher;
use crate::error::{ProtocolError, Result};

/// Length of the XChaCha20 nonce prefix
pub const NONCE_LEN: usize = 24;

/// Length of the Poly1305 authentication tag
pub const TAG_LEN: usize = 16;

/// Bytes a sealed fragment grows by
pub const OVERHEAD: usize = NONCE_LEN + TAG_LEN;

pub struct Crypto {
    cipher: XChaCha20Poly1305,
}

impl Crypto {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(key.into()),
        }
    }

    /// Build from an owned key, wiping the caller's copy afterwards
    pub fn from_key(mut key: [u8; 32]) -> Self {
        let crypto = Self::new(&key);
        key.zeroize();
        crypto
    }

    /// Generate a random nonce from the OS RNG
    pub fn generate_nonce() -> Result<[u8; NONCE_LEN]> {
        let mut nonce = [0u8; NONCE_LEN];
        getrandom::fill(&mut nonce)
            .map_err(|e| ProtocolError::Custom(format!("OS RNG unavailable: {e}")))?;
        Ok(nonce)
    }

    pub fn encrypt(&self, plaintext: &[u8], nonce: &[u8; NONCE_LEN]) -> Result<Vec<u8>> {
        self.cipher
            .encrypt(XNonce::from_slice(nonce), plaintext)
            .map_err(|_| ProtocolError::EncryptionFailure)
    }

    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8; NONCE_LEN]) -> Result<Vec<u8>> {
        self.cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| ProtocolError::DecryptionFailure)
    }
}

impl Cipher for Crypto {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = Self::generate_nonce()?;
        let ciphertext = Crypto::encrypt(self, plaintext, &nonce)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend(ciphertext);
        nonce.zeroize();
        Ok(sealed)
    }

    fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < OVERHEAD {
            return Err(ProtocolError::DecryptionFailure);
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);

        let plaintext = Crypto::decrypt(self, ciphertext, &nonce);
        nonce.zeroize();
        plaintext
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let crypto = Crypto::new(&[3u8; 32]);
        let sealed = Cipher::encrypt(&crypto, b"fragment bytes").expect("encrypt");
        assert_eq!(sealed.len(), b"fragment bytes".len() + OVERHEAD);
        let opened = Cipher::decrypt(&crypto, &sealed).expect("decrypt");
        assert_eq!(opened, b"fragment bytes");
    }

    #[test]
    fn test_nonces_differ_between_seals() {
        let crypto = Crypto::new(&[3u8; 32]);
        let a = Cipher::encrypt(&crypto, b"same").expect("encrypt");
        let b = Cipher::encrypt(&crypto, b"same").expect("encrypt");
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let sealed = Cipher::encrypt(&Crypto::new(&[1u8; 32]), b"secret").expect("encrypt");
        let result = Cipher::decrypt(&Crypto::from_key([2u8; 32]), &sealed);
        assert!(matches!(result, Err(ProtocolError::DecryptionFailure)));
    }

    #[test]
    fn test_short_input_rejected() {
        let crypto = Crypto::new(&[1u8; 32]);
        assert!(Cipher::decrypt(&crypto, &[0u8; OVERHEAD - 1]).is_err());
    }
}

//! Password-based envelope encryption for relayed messages.
//!
//! The key is a single SHA-256 pass over the password bytes (no salt, no
//! iterations). This is weak against offline guessing and is kept only so
//! existing subscribers can still decrypt what we send.
//!
//! Wire format: `base64(iv[16] || aes-256-cbc-pkcs7(plaintext))`.

use aes::Aes256;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub const IV_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Encryption failed: {0}")]
    Encryption(String),
    #[error("Decryption failed")]
    Decryption,
}

/// IV-prefixed ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
}

impl EncryptedEnvelope {
    /// Standard base64 (no line wrapping) of `iv || ciphertext`.
    pub fn encode(&self) -> String {
        let mut combined = Vec::with_capacity(IV_LEN + self.ciphertext.len());
        combined.extend_from_slice(&self.iv);
        combined.extend_from_slice(&self.ciphertext);
        BASE64.encode(combined)
    }

    pub fn decode(encoded: &str) -> Result<Self, CipherError> {
        let combined = BASE64
            .decode(encoded.trim())
            .map_err(|_| CipherError::Decryption)?;
        if combined.len() < IV_LEN {
            return Err(CipherError::Decryption);
        }
        let (iv_bytes, ciphertext) = combined.split_at(IV_LEN);
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(iv_bytes);
        Ok(Self {
            iv,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

fn derive_key(password: &str) -> [u8; 32] {
    Sha256::digest(password.as_bytes()).into()
}

fn random_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Encrypt `plaintext` under `password` with a fresh random IV.
pub fn encrypt(plaintext: &str, password: &str) -> Result<EncryptedEnvelope, CipherError> {
    let key = derive_key(password);
    let iv = random_iv();
    let cipher = Aes256CbcEnc::new_from_slices(&key, &iv)
        .map_err(|e| CipherError::Encryption(e.to_string()))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    Ok(EncryptedEnvelope { iv, ciphertext })
}

/// Decrypt a base64 envelope produced by [`encrypt`].
///
/// Malformed base64, a payload shorter than the IV, bad padding and non UTF-8
/// output all collapse into [`CipherError::Decryption`].
pub fn decrypt(encoded: &str, password: &str) -> Result<String, CipherError> {
    let envelope = EncryptedEnvelope::decode(encoded)?;
    decrypt_envelope(&envelope, password)
}

pub fn decrypt_envelope(envelope: &EncryptedEnvelope, password: &str) -> Result<String, CipherError> {
    let key = derive_key(password);
    let cipher = Aes256CbcDec::new_from_slices(&key, &envelope.iv)
        .map_err(|_| CipherError::Decryption)?;
    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&envelope.ciphertext)
        .map_err(|_| CipherError::Decryption)?;
    String::from_utf8(plaintext).map_err(|_| CipherError::Decryption)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let cases = [
            ("", "pw"),
            ("Alice|Your OTP is 4821|Pixel 8", "correct horse battery staple"),
            ("héllo wörld ✓ 你好", "пароль"),
            ("exactly16bytes!!", ""),
        ];
        for (plaintext, password) in cases {
            let encoded = encrypt(plaintext, password).unwrap().encode();
            assert_eq!(decrypt(&encoded, password).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_ciphertext_is_block_aligned_and_padded() {
        let envelope = encrypt("exactly16bytes!!", "pw").unwrap();
        // A full block of padding is appended to block-aligned input
        assert_eq!(envelope.ciphertext.len(), 32);
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let a = encrypt("same message", "same password").unwrap();
        let b = encrypt("same message", "same password").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.encode(), b.encode());
    }

    #[test]
    fn test_wrong_password_fails() {
        let plaintext = "Bank|Your account ending 4821 was debited by 2,500.00 on 12 Mar. \
                         Available balance 18,304.55. Not you? Call the number on your card \
                         immediately.|Pixel 8 Pro";
        let encoded = encrypt(plaintext, "right password").unwrap().encode();
        assert!(matches!(
            decrypt(&encoded, "wrong password"),
            Err(CipherError::Decryption)
        ));
    }

    #[test]
    fn test_malformed_input_fails() {
        assert!(matches!(decrypt("not base64 !!!", "pw"), Err(CipherError::Decryption)));
        // 8 bytes: shorter than an IV
        assert!(matches!(decrypt("AAAAAAAAAAA=", "pw"), Err(CipherError::Decryption)));
        // IV only, no ciphertext block
        let iv_only = BASE64.encode([7u8; IV_LEN]);
        assert!(matches!(decrypt(&iv_only, "pw"), Err(CipherError::Decryption)));
    }

    #[test]
    fn test_wire_format_prefixes_iv() {
        let envelope = encrypt("payload", "pw").unwrap();
        let raw = BASE64.decode(envelope.encode()).unwrap();
        assert_eq!(&raw[..IV_LEN], &envelope.iv);
        assert_eq!(&raw[IV_LEN..], envelope.ciphertext.as_slice());
        assert!(!envelope.encode().contains('\n'));
    }

    #[test]
    fn test_key_is_sha256_of_password() {
        // SHA-256("abc")
        let expected = [
            0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea, 0x41, 0x41, 0x40, 0xde, 0x5d, 0xae,
            0x22, 0x23, 0xb0, 0x03, 0x61, 0xa3, 0x96, 0x17, 0x7a, 0x9c, 0xb4, 0x10, 0xff, 0x61,
            0xf2, 0x00, 0x15, 0xad,
        ];
        assert_eq!(derive_key("abc"), expected);
    }
}

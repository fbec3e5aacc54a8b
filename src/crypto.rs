//! Token encryption module using AES-256-GCM
//!
//! This module provides encryption and decryption utilities for the access
//! and refresh tokens stored in the database, using AES-256-GCM with
//! additional authenticated data (AAD) for context binding. Connection
//! tokens are bound to `user_id|realm_id`; pending-authorization tokens are
//! bound to the row id.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

/// Type alias for crypto keys
pub type CryptoKey = ZeroizingKey;

impl CryptoKey {
    /// Create a new crypto key from bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::EncryptionFailed(
                "Invalid key length: expected 32 bytes".to_string(),
            ));
        }
        Ok(ZeroizingKey(bytes))
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// AAD for tokens stored on a connection row
pub fn connection_aad(user_id: Uuid, realm_id: &str) -> String {
    format!("{}|{}", user_id, realm_id)
}

/// AAD for tokens parked on a pending-authorization row
pub fn pending_aad(id: Uuid) -> String {
    id.to_string()
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    // Prepend version byte and nonce to ciphertext
    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes using AES-256-GCM
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }

    // Detect legacy plaintext payloads (no version marker)
    if ciphertext[0] != VERSION_ENCRYPTED {
        return Ok(ciphertext.to_vec());
    }

    // Validate minimum length (version + nonce + tag)
    if ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];

    debug_assert!(tag_and_ct.len() >= TAG_LEN);

    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: tag_and_ct,
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Determine if a payload is using the encrypted format
pub fn is_encrypted_payload(ciphertext: &[u8]) -> bool {
    ciphertext.len() >= MIN_ENCRYPTED_LEN && ciphertext[0] == VERSION_ENCRYPTED
}

/// Encrypt an access/refresh token pair under one AAD
pub fn encrypt_token_pair(
    key: &CryptoKey,
    aad: &str,
    access_token: &str,
    refresh_token: &str,
) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
    let access = encrypt_bytes(key, aad.as_bytes(), access_token.as_bytes())?;
    let refresh = encrypt_bytes(key, aad.as_bytes(), refresh_token.as_bytes())?;
    Ok((access, refresh))
}

/// Decrypt an access/refresh token pair encrypted under one AAD
pub fn decrypt_token_pair(
    key: &CryptoKey,
    aad: &str,
    access_ciphertext: &[u8],
    refresh_ciphertext: &[u8],
) -> Result<(String, String), CryptoError> {
    let access = decrypt_bytes(key, aad.as_bytes(), access_ciphertext).and_then(|bytes| {
        String::from_utf8(bytes)
            .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))
    })?;
    let refresh = decrypt_bytes(key, aad.as_bytes(), refresh_ciphertext).and_then(|bytes| {
        String::from_utf8(bytes)
            .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))
    })?;
    Ok((access, refresh))
}

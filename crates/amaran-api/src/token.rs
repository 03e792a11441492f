//! Per-request freshness token.
//!
//! Each token is the current Unix timestamp (seconds) sealed with
//! AES-256-GCM under a key and nonce drawn fresh for that call. The key is
//! discarded, so the token cannot be verified from the key alone; the desktop
//! application only checks its structure.
//!
//! # Wire Format
//!
//! `base64(nonce[12] ∥ tag[16] ∥ ciphertext)` using the standard padded
//! alphabet.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{AeadInPlace, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rand::RngCore;

use crate::error::Error;

/// Key size for AES-256 (256 bits = 32 bytes).
const KEY_SIZE: usize = 32;

/// Nonce size for AES-GCM (96 bits = 12 bytes).
pub const NONCE_SIZE: usize = 12;

/// GCM authentication tag size.
pub const TAG_SIZE: usize = 16;

/// Produce a token for the current second.
pub fn generate_token() -> Result<String, Error> {
    seal_timestamp(chrono::Utc::now().timestamp())
}

/// Seal `timestamp` under a one-shot key and encode it.
fn seal_timestamp(timestamp: i64) -> Result<String, Error> {
    let mut rng = rand::rng();

    let mut key = [0u8; KEY_SIZE];
    rng.fill_bytes(&mut key);
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rng.fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| Error::Token(e.to_string()))?;

    let mut buffer = timestamp.to_string().into_bytes();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&nonce_bytes), b"", &mut buffer)
        .map_err(|e| Error::Token(e.to_string()))?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + TAG_SIZE + buffer.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(tag.as_slice());
    sealed.extend_from_slice(&buffer);

    Ok(BASE64.encode(sealed))
}

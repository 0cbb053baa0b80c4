use std::fmt;
use std::ops::Deref;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// A `Vec<u8>` wrapper that is zeroed when dropped.
///
/// Holds intermediate key material (decoded secrets, derivation seeds).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingBytes(Vec<u8>);

impl ZeroizingBytes {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Deref for ZeroizingBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for ZeroizingBytes {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

/// A hex-encoded secret (the shared server secret) that is zeroed on drop
/// and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretHex(String);

impl SecretHex {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reveals the hex string. Callers must not log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Big-endian integer bytes of the secret, see [`integer_bytes`].
    pub fn integer_bytes(&self) -> Result<ZeroizingBytes, CryptoError> {
        integer_bytes(&self.0)
    }
}

impl fmt::Debug for SecretHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretHex(<redacted>)")
    }
}

/// Interprets `hex_str` as an unsigned big-endian integer and returns its
/// minimal byte representation: leading zero bytes are dropped and zero is
/// `[0x00]`. Odd-length input is left-padded with a `0` digit.
pub fn integer_bytes(hex_str: &str) -> Result<ZeroizingBytes, CryptoError> {
    let trimmed = hex_str.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Err(CryptoError::InvalidInput("empty hex integer".into()));
    }

    let mut padded = String::with_capacity(trimmed.len() + 1);
    if trimmed.len() % 2 != 0 {
        padded.push('0');
    }
    padded.push_str(trimmed);

    let mut decoded = hex::decode(&padded).map_err(|e| CryptoError::InvalidHex(e.to_string()))?;
    padded.zeroize();

    let first_nonzero = decoded.iter().position(|&b| b != 0);
    let bytes = match first_nonzero {
        Some(idx) => decoded[idx..].to_vec(),
        None => vec![0u8],
    };
    decoded.zeroize();
    Ok(ZeroizingBytes::new(bytes))
}

use thiserror::Error;

/// Errors raised while decoding or preparing secret material.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

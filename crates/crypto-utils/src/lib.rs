//! # crypto-utils
//!
//! Hashing primitives, the deterministic seeded generator used for key
//! derivation, and zeroizing containers for secret material.

pub mod error;
pub mod hash;
pub mod random;
pub mod zeroizing;

pub use error::CryptoError;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::hash::sha256;

/// A deterministic byte stream keyed by arbitrary-length seed material.
///
/// The seed is compressed to a 32-byte ChaCha20 key with SHA-256, so the same
/// seed always yields the same stream on every platform.
pub struct SeededRng(ChaCha20Rng);

impl SeededRng {
    /// Creates a generator from `seed` (any length, including empty).
    pub fn from_seed_material(seed: &[u8]) -> Self {
        Self(ChaCha20Rng::from_seed(sha256(seed)))
    }

    /// Draws the next `N` bytes of the stream.
    pub fn next_bytes<const N: usize>(&mut self) -> [u8; N] {
        let mut buf = [0u8; N];
        self.0.fill_bytes(&mut buf);
        buf
    }
}

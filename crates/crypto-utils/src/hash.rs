use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Single SHA-256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 applied twice. Used for transaction ids, signature hashes and
/// base58check checksums.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// Compute Hash160 (RIPEMD-160(SHA-256(data))), the digest embedded in
/// pay-to-pubkey-hash and pay-to-script-hash addresses.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    Ripemd160::digest(sha).into()
}

/// Base58check checksum: first 4 bytes of SHA-256d.
pub fn checksum(data: &[u8]) -> [u8; 4] {
    let digest = sha256d(data);
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

//! Deterministic per-user key derivation and WIF handling.
//!
//! A user's key is a pure function of `(identifier, server secret, round)`:
//! nothing is stored, and the same inputs always reproduce the same key.
//! The round counter lets one identifier own a sequence of distinct keys.

use std::fmt;

use crypto_utils::hash::checksum;
use crypto_utils::random::SeededRng;
use crypto_utils::zeroizing::{integer_bytes, SecretHex, ZeroizingBytes};
use k256::ecdsa::SigningKey;
use zeroize::Zeroizing;

use crate::address::pubkey_to_address;
use crate::error::BtcError;
use crate::network::BtcNetwork;

/// secp256k1 group order `n`.
pub const CURVE_ORDER: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE,
    0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x41,
];

/// Uncompressed WIF payload: version (1) + scalar (32) + checksum (4).
const WIF_LEN: usize = 37;

/// A secp256k1 private key bound to a network. The scalar is wiped on drop.
#[derive(Clone)]
pub struct PrivateKey {
    secret: Zeroizing<[u8; 32]>,
    network: BtcNetwork,
}

impl PrivateKey {
    /// Wrap a raw scalar, rejecting zero and values `>= n`.
    pub fn from_bytes(bytes: [u8; 32], network: BtcNetwork) -> Result<Self, BtcError> {
        let secret = Zeroizing::new(bytes);
        if !is_valid_scalar(&secret) {
            return Err(BtcError::InvalidPrivateKey(
                "scalar is zero or not below the curve order".into(),
            ));
        }
        Ok(Self { secret, network })
    }

    /// Parse an uncompressed WIF string (`5...` mainnet, `9...` testnet).
    pub fn from_wif(wif: &str) -> Result<Self, BtcError> {
        let decoded = Zeroizing::new(
            bs58::decode(wif)
                .into_vec()
                .map_err(|e| BtcError::InvalidPrivateKey(format!("invalid base58: {e}")))?,
        );
        if decoded.len() != WIF_LEN {
            return Err(BtcError::InvalidPrivateKey(format!(
                "expected {WIF_LEN} bytes, got {}",
                decoded.len()
            )));
        }

        let (payload, check) = decoded.split_at(33);
        if checksum(payload) != check {
            return Err(BtcError::InvalidPrivateKey("invalid checksum".into()));
        }

        let network = BtcNetwork::from_private_key_version(payload[0]).ok_or_else(|| {
            BtcError::InvalidPrivateKey(format!("unknown version byte 0x{:02x}", payload[0]))
        })?;

        let mut scalar = [0u8; 32];
        scalar.copy_from_slice(&payload[1..]);
        Self::from_bytes(scalar, network)
    }

    /// Version byte ‖ scalar ‖ 4-byte SHA-256d checksum, base58 encoded.
    pub fn to_wif(&self) -> Zeroizing<String> {
        let mut payload = Zeroizing::new(Vec::with_capacity(WIF_LEN));
        payload.push(self.network.private_key_version());
        payload.extend_from_slice(&self.secret[..]);
        let check = checksum(&payload);
        payload.extend_from_slice(&check);
        Zeroizing::new(bs58::encode(payload.as_slice()).into_string())
    }

    pub fn network(&self) -> BtcNetwork {
        self.network
    }

    pub(crate) fn signing_key(&self) -> Result<SigningKey, BtcError> {
        let bytes: &[u8; 32] = &self.secret;
        SigningKey::from_bytes(bytes.into())
            .map_err(|e| BtcError::InvalidPrivateKey(format!("invalid secp256k1 key: {e}")))
    }

    /// Uncompressed SEC1 public key (65 bytes, `04 || x || y`).
    pub fn public_key(&self) -> Result<Vec<u8>, BtcError> {
        let signing_key = self.signing_key()?;
        Ok(signing_key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec())
    }

    /// P2PKH address of the uncompressed public key.
    pub fn address(&self) -> Result<String, BtcError> {
        Ok(pubkey_to_address(&self.public_key()?, self.network))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

/// Whether `candidate` is a usable secp256k1 scalar: `0 < candidate < n`.
pub fn is_valid_scalar(candidate: &[u8; 32]) -> bool {
    // Big-endian byte arrays of equal length compare like the integers.
    candidate.iter().any(|&b| b != 0) && candidate < &CURVE_ORDER
}

/// Derive the private key for `identifier` at `rounds`.
///
/// Both inputs are hex integers. Their minimal big-endian bytes are XORed
/// (the shorter repeated over the longer) into a seed for a deterministic
/// generator, which then yields `max(rounds, 1)` valid scalars; the last one
/// is the key. Returns `None` when either input is malformed.
pub fn derive_private_key(
    identifier: &str,
    server_secret: &SecretHex,
    rounds: u32,
    network: BtcNetwork,
) -> Option<PrivateKey> {
    let id_bytes = match integer_bytes(identifier) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, "identifier is not a hex integer");
            return None;
        }
    };
    let secret_bytes = match server_secret.integer_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, "server secret is not a hex integer");
            return None;
        }
    };

    let seed = xor_cyclic(&id_bytes, &secret_bytes);
    let mut rng = SeededRng::from_seed_material(&seed);

    let mut candidate = Zeroizing::new([0u8; 32]);
    for _ in 0..rounds.max(1) {
        loop {
            *candidate = rng.next_bytes();
            if is_valid_scalar(&candidate) {
                break;
            }
        }
    }

    PrivateKey::from_bytes(*candidate, network).ok()
}

/// Byte-wise XOR of `a` and `b`, cycling the shorter input.
fn xor_cyclic(a: &[u8], b: &[u8]) -> ZeroizingBytes {
    let len = a.len().max(b.len());
    if a.is_empty() || b.is_empty() {
        return ZeroizingBytes::new(vec![0u8; len]);
    }
    let out: Vec<u8> = (0..len).map(|i| a[i % a.len()] ^ b[i % b.len()]).collect();
    ZeroizingBytes::new(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "5f2b9c0e7d1a4b3c8e6f0a9d2c4b7e1f";
    const IDENTIFIER: &str = "a3c1e5f7092b4d6f8a1c3e5f7092b4d6";

    fn secret() -> SecretHex {
        SecretHex::new(SECRET)
    }

    fn key_one(network: BtcNetwork) -> PrivateKey {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        PrivateKey::from_bytes(bytes, network).unwrap()
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_private_key(IDENTIFIER, &secret(), 3, BtcNetwork::Mainnet).unwrap();
        let b = derive_private_key(IDENTIFIER, &secret(), 3, BtcNetwork::Mainnet).unwrap();
        assert_eq!(*a.to_wif(), *b.to_wif());
    }

    #[test]
    fn rounds_select_distinct_keys() {
        let r1 = derive_private_key(IDENTIFIER, &secret(), 1, BtcNetwork::Mainnet).unwrap();
        let r2 = derive_private_key(IDENTIFIER, &secret(), 2, BtcNetwork::Mainnet).unwrap();
        assert_ne!(*r1.to_wif(), *r2.to_wif());
    }

    #[test]
    fn round_zero_behaves_like_round_one() {
        let r0 = derive_private_key(IDENTIFIER, &secret(), 0, BtcNetwork::Testnet).unwrap();
        let r1 = derive_private_key(IDENTIFIER, &secret(), 1, BtcNetwork::Testnet).unwrap();
        assert_eq!(*r0.to_wif(), *r1.to_wif());
    }

    #[test]
    fn identifiers_and_secrets_both_matter() {
        let base = derive_private_key(IDENTIFIER, &secret(), 1, BtcNetwork::Mainnet).unwrap();
        let other_id = derive_private_key("01", &secret(), 1, BtcNetwork::Mainnet).unwrap();
        let other_secret =
            derive_private_key(IDENTIFIER, &SecretHex::new("1234"), 1, BtcNetwork::Mainnet).unwrap();
        assert_ne!(*base.to_wif(), *other_id.to_wif());
        assert_ne!(*base.to_wif(), *other_secret.to_wif());
    }

    #[test]
    fn malformed_inputs_yield_none() {
        assert!(derive_private_key("not-hex", &secret(), 1, BtcNetwork::Mainnet).is_none());
        assert!(derive_private_key(IDENTIFIER, &SecretHex::new("zz"), 1, BtcNetwork::Mainnet).is_none());
        assert!(derive_private_key("", &secret(), 1, BtcNetwork::Mainnet).is_none());
    }

    #[test]
    fn derived_key_produces_matching_address() {
        let key = derive_private_key(IDENTIFIER, &secret(), 1, BtcNetwork::Testnet).unwrap();
        let addr = key.address().unwrap();
        assert!(addr.starts_with('m') || addr.starts_with('n'));
        assert_eq!(key.public_key().unwrap().len(), 65);
    }

    #[test]
    fn scalar_range_checks() {
        assert!(!is_valid_scalar(&[0u8; 32]));
        assert!(!is_valid_scalar(&CURVE_ORDER));
        assert!(!is_valid_scalar(&[0xFF; 32]));

        let mut below = CURVE_ORDER;
        below[31] -= 1;
        assert!(is_valid_scalar(&below));

        let mut one = [0u8; 32];
        one[31] = 1;
        assert!(is_valid_scalar(&one));
    }

    #[test]
    fn from_bytes_rejects_out_of_range() {
        assert!(PrivateKey::from_bytes([0u8; 32], BtcNetwork::Mainnet).is_err());
        assert!(PrivateKey::from_bytes(CURVE_ORDER, BtcNetwork::Mainnet).is_err());
    }

    #[test]
    fn key_one_known_vectors() {
        let key = key_one(BtcNetwork::Mainnet);
        assert_eq!(
            key.to_wif().as_str(),
            "5HpHagT65TZzG1PH3CSu63k8DbpvD8s5ip4nEB3kEsreAnchuDf"
        );
        assert_eq!(key.address().unwrap(), "1EHNa6Q4Jz2uvNExL497mE43ikXhwF6kZm");
        assert_eq!(
            hex::encode(key.public_key().unwrap()),
            "0479be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\
             483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8"
        );
    }

    #[test]
    fn wif_roundtrip_both_networks() {
        for network in [BtcNetwork::Mainnet, BtcNetwork::Testnet] {
            let key = derive_private_key(IDENTIFIER, &secret(), 2, network).unwrap();
            let wif = key.to_wif();
            let parsed = PrivateKey::from_wif(&wif).unwrap();
            assert_eq!(parsed.network(), network);
            assert_eq!(*parsed.to_wif(), *wif);
        }
        assert!(key_one(BtcNetwork::Testnet).to_wif().starts_with('9'));
    }

    #[test]
    fn wif_rejects_corruption() {
        let wif = key_one(BtcNetwork::Mainnet).to_wif();
        let mut raw = bs58::decode(wif.as_str()).into_vec().unwrap();
        raw[10] ^= 0x01;
        let corrupted = bs58::encode(&raw).into_string();
        assert!(PrivateKey::from_wif(&corrupted).is_err());
        assert!(PrivateKey::from_wif("garbage!").is_err());
    }

    #[test]
    fn debug_does_not_leak_scalar() {
        let debug = format!("{:?}", key_one(BtcNetwork::Mainnet));
        assert!(debug.contains("Mainnet"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn xor_cycles_shorter_input() {
        let out = xor_cyclic(&[0xFF, 0x00, 0xF0, 0x0F], &[0x0F]);
        assert_eq!(&*out, &[0xF0, 0x0F, 0xFF, 0x00]);
        let out = xor_cyclic(&[0x01], &[0x01, 0x02, 0x03]);
        assert_eq!(&*out, &[0x00, 0x03, 0x02]);
    }
}

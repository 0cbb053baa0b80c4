//! Base58check P2PKH and P2SH addresses.

use crypto_utils::hash::{checksum, hash160};

use crate::network::{BtcNetwork, P2PKH_MAINNET, P2PKH_TESTNET, P2SH_MAINNET, P2SH_TESTNET};

/// Length of a decoded legacy address: version (1) + hash (20) + checksum (4).
const DECODED_ADDRESS_LEN: usize = 25;

/// What kind of output script an address pays to, judged by its version byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    PayToPubKeyHash,
    PayToScriptHash,
}

/// A checksum-verified address split into its version byte and payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedAddress {
    pub version: u8,
    pub hash: [u8; 20],
}

impl DecodedAddress {
    /// Address kind, or `None` for an unknown version byte.
    pub fn kind(&self) -> Option<AddressKind> {
        match self.version {
            P2PKH_MAINNET | P2PKH_TESTNET => Some(AddressKind::PayToPubKeyHash),
            P2SH_MAINNET | P2SH_TESTNET => Some(AddressKind::PayToScriptHash),
            _ => None,
        }
    }

    /// Network implied by the version byte.
    pub fn network(&self) -> Option<BtcNetwork> {
        match self.version {
            P2PKH_MAINNET | P2SH_MAINNET => Some(BtcNetwork::Mainnet),
            P2PKH_TESTNET | P2SH_TESTNET => Some(BtcNetwork::Testnet),
            _ => None,
        }
    }
}

/// Base58check-encode a 20-byte hash under `version`.
///
/// Steps:
/// 1. Prepend the version byte
/// 2. Append the first 4 bytes of SHA-256d(version || hash)
/// 3. Base58 encode
pub fn encode_address(hash: &[u8; 20], version: u8) -> String {
    let mut payload = Vec::with_capacity(DECODED_ADDRESS_LEN);
    payload.push(version);
    payload.extend_from_slice(hash);
    let check = checksum(&payload);
    payload.extend_from_slice(&check);
    bs58::encode(&payload).into_string()
}

/// Decode and checksum-verify an address, keeping the version byte.
///
/// Returns `None` on invalid base58, wrong length or checksum mismatch.
pub fn decode_address_with_version(address: &str) -> Option<DecodedAddress> {
    let decoded = bs58::decode(address).into_vec().ok()?;
    if decoded.len() != DECODED_ADDRESS_LEN {
        return None;
    }

    let (payload, check) = decoded.split_at(21);
    if checksum(payload) != check {
        return None;
    }

    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload[1..]);
    Some(DecodedAddress {
        version: payload[0],
        hash,
    })
}

/// Extract the 20-byte hash from an address. `None` means "not a valid
/// address"; callers must not treat it as fatal.
pub fn decode_address(address: &str) -> Option<[u8; 20]> {
    decode_address_with_version(address).map(|decoded| decoded.hash)
}

/// Whether `address` is a valid P2SH (multisig) address on either network.
pub fn is_multisig_address(address: &str) -> bool {
    decode_address_with_version(address)
        .and_then(|decoded| decoded.kind())
        .is_some_and(|kind| kind == AddressKind::PayToScriptHash)
}

/// P2PKH address for a serialized public key (compressed or uncompressed;
/// the service issues uncompressed keys).
pub fn pubkey_to_address(pubkey: &[u8], network: BtcNetwork) -> String {
    encode_address(&hash160(pubkey), network.p2pkh_version())
}

/// P2SH address committing to `redeem_script`.
pub fn script_hash_address(redeem_script: &[u8], network: BtcNetwork) -> String {
    encode_address(&hash160(redeem_script), network.p2sh_version())
}

//! Signature hashing, low-S ECDSA signing and staged script assembly.
//!
//! Signing is split in three steps so that independent signers can each
//! contribute to the same transaction:
//!
//! 1. [`get_signature_data`] computes the SIGHASH_ALL digest of every input
//!    that spends an output owned by a given address.
//! 2. [`sign_requests`] / [`sign_with_private_key`] sign those digests.
//! 3. [`apply_signature`] writes the signatures into the input scripts,
//!    overwriting for P2PKH and accumulating for P2SH multisig.

use crypto_utils::hash::sha256d;
use k256::ecdsa::signature::hazmat::RandomizedPrehashSigner;
use k256::ecdsa::Signature;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};

use crate::address::decode_address;
use crate::error::BtcError;
use crate::keys::PrivateKey;
use crate::script::{
    encode_signature, multisig_script_sig, p2pkh_script_pubkey, p2pkh_script_sig, SIGHASH_ALL,
};
use crate::transaction::{strip_input_scripts, txid_to_wire_hash, RawTransaction};
use crate::utxo::Utxo;

/// `n / 2` for secp256k1; canonical signatures have `S <= HALF_ORDER`.
const HALF_ORDER: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D, 0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B, 0x20, 0xA0,
];

/// How the inputs being signed lock their funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendTemplate<'a> {
    PayToPubKeyHash,
    /// P2SH multisig. The redeem script is both the script code hashed for
    /// each signature and the suffix of the assembled scriptSig.
    Multisig { redeem_script: &'a [u8] },
}

/// A digest one signer must sign for one input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRequest {
    pub input_index: usize,
    pub previous_tx_hash: [u8; 32],
    pub previous_output_index: u32,
    pub sighash: [u8; 32],
}

/// A signature for the input spending `previous_tx_hash:previous_output_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    pub previous_tx_hash: [u8; 32],
    pub previous_output_index: u32,
    /// DER-style encoding, without the sighash byte.
    pub signature: Vec<u8>,
    /// Serialized public key of the signer.
    pub public_key: Vec<u8>,
}

/// SIGHASH_ALL digest of `tx` for `input_index`, with `script_code` placed
/// in that input and every other input script emptied.
pub fn signature_hash(
    tx: &RawTransaction,
    input_index: usize,
    script_code: &[u8],
) -> Result<[u8; 32], BtcError> {
    let mut stripped = strip_input_scripts(tx);
    let input = stripped.inputs.get_mut(input_index).ok_or_else(|| {
        BtcError::SigningError(format!(
            "input index {input_index} out of range ({} inputs)",
            tx.inputs.len()
        ))
    })?;
    input.script = script_code.to_vec();

    let mut preimage = stripped.encode();
    preimage.extend_from_slice(&(SIGHASH_ALL as u32).to_le_bytes());
    Ok(sha256d(&preimage))
}

/// Digests for every input of `tx` that spends one of `utxos` owned by
/// `address`. Outputs of other addresses and outputs not spent by `tx` are
/// ignored.
pub fn get_signature_data(
    tx: &RawTransaction,
    address: &str,
    utxos: &[Utxo],
    template: SpendTemplate<'_>,
) -> Result<Vec<SignatureRequest>, BtcError> {
    let script_code = match template {
        SpendTemplate::PayToPubKeyHash => {
            let hash = decode_address(address)
                .ok_or_else(|| BtcError::InvalidAddress(format!("cannot decode {address}")))?;
            p2pkh_script_pubkey(&hash)
        }
        SpendTemplate::Multisig { redeem_script } => redeem_script.to_vec(),
    };

    let mut requests = Vec::new();
    for utxo in utxos.iter().filter(|u| u.address == address) {
        let previous_tx_hash = txid_to_wire_hash(&utxo.txid)?;
        let Some(input_index) = tx.find_input(&previous_tx_hash, utxo.vout) else {
            continue;
        };
        requests.push(SignatureRequest {
            input_index,
            previous_tx_hash,
            previous_output_index: utxo.vout,
            sighash: signature_hash(tx, input_index, &script_code)?,
        });
    }
    Ok(requests)
}

/// ECDSA-sign a 32-byte digest, re-signing with fresh nonce entropy until
/// `S <= n/2`.
pub fn sign_with_private_key(hash: &[u8; 32], key: &PrivateKey) -> Result<Vec<u8>, BtcError> {
    let signing_key = key.signing_key()?;
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let signature: Signature = signing_key
            .sign_prehash_with_rng(&mut OsRng, hash)
            .map_err(|e| BtcError::SigningError(format!("ECDSA signing failed: {e}")))?;

        let (r, s) = signature.split_bytes();
        if is_low_s(s.as_ref()) {
            return Ok(encode_signature(&r, &s));
        }
        tracing::debug!(attempts, "high-S signature, re-signing with a new nonce");
    }
}

/// Sign every request with `key`, producing entries ready for
/// [`apply_signature`].
pub fn sign_requests(
    requests: &[SignatureRequest],
    key: &PrivateKey,
) -> Result<Vec<SignatureEntry>, BtcError> {
    let public_key = key.public_key()?;
    requests
        .iter()
        .map(|request| -> Result<SignatureEntry, BtcError> {
            Ok(SignatureEntry {
                previous_tx_hash: request.previous_tx_hash,
                previous_output_index: request.previous_output_index,
                signature: sign_with_private_key(&request.sighash, key)?,
                public_key: public_key.clone(),
            })
        })
        .collect()
}

/// Write `entries` into the matching input scripts of `tx`.
///
/// P2PKH inputs are overwritten, so applying the same entry twice is a
/// no-op. Multisig inputs keep the signatures already present and append the
/// new one. Entries with no matching input are skipped. On error `tx` is left
/// untouched. Returns the number of entries applied.
pub fn apply_signature(
    tx: &mut RawTransaction,
    template: SpendTemplate<'_>,
    entries: &[SignatureEntry],
) -> Result<usize, BtcError> {
    let mut updated = tx.clone();
    let mut applied = 0;

    for entry in entries {
        let Some(index) = updated.find_input(&entry.previous_tx_hash, entry.previous_output_index)
        else {
            tracing::debug!(
                vout = entry.previous_output_index,
                "no input spends the signed outpoint"
            );
            continue;
        };
        let input = &mut updated.inputs[index];
        input.script = match template {
            SpendTemplate::PayToPubKeyHash => p2pkh_script_sig(&entry.signature, &entry.public_key),
            SpendTemplate::Multisig { redeem_script } => {
                multisig_script_sig(&input.script, &entry.signature, redeem_script)?
            }
        };
        applied += 1;
    }

    *tx = updated;
    Ok(applied)
}

fn is_low_s(s: &[u8]) -> bool {
    // Fixed-width big-endian: lexicographic order is numeric order.
    s <= HALF_ORDER.as_slice()
}

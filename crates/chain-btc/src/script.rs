//! Standard script templates and signature-script assembly.

use crate::address::{decode_address_with_version, AddressKind};
use crate::error::BtcError;
use crate::varint::{read_var_stack_int, write_var_stack_int};

pub const OP_0: u8 = 0x00;
pub const OP_DUP: u8 = 0x76;
pub const OP_HASH160: u8 = 0xA9;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_CHECKSIG: u8 = 0xAC;
pub const OP_CHECKMULTISIG: u8 = 0xAE;
/// `OP_1` .. `OP_16` are `OP_1_BASE + n`.
const OP_1_BASE: u8 = 0x50;

/// Sighash type appended to every signature and to the sighash preimage.
pub const SIGHASH_ALL: u8 = 0x01;

/// Maximum number of keys in a bare `OP_CHECKMULTISIG` redeem script.
pub const MAX_MULTISIG_KEYS: usize = 16;

/// Largest element the script interpreter will push. A P2SH redeem script
/// longer than this can never be revealed in a scriptSig.
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Build a P2PKH scriptPubKey: OP_DUP OP_HASH160 <20-byte hash> OP_EQUALVERIFY OP_CHECKSIG
pub fn p2pkh_script_pubkey(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    script.push(0x14);
    script.extend_from_slice(pubkey_hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

/// Build a P2SH scriptPubKey: OP_HASH160 <20-byte hash> OP_EQUAL
pub fn p2sh_script_pubkey(script_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(23);
    script.push(OP_HASH160);
    script.push(0x14);
    script.extend_from_slice(script_hash);
    script.push(OP_EQUAL);
    script
}

/// Output script paying to `address`, chosen by its version byte.
pub fn script_pubkey_for_address(address: &str) -> Result<Vec<u8>, BtcError> {
    let decoded = decode_address_with_version(address)
        .ok_or_else(|| BtcError::InvalidAddress(format!("checksum or encoding error: {address}")))?;
    match decoded.kind() {
        Some(AddressKind::PayToPubKeyHash) => Ok(p2pkh_script_pubkey(&decoded.hash)),
        Some(AddressKind::PayToScriptHash) => Ok(p2sh_script_pubkey(&decoded.hash)),
        None => Err(BtcError::InvalidAddress(format!(
            "unknown version byte 0x{:02x}",
            decoded.version
        ))),
    }
}

/// Recognize a standard P2PKH or P2SH output script and return its kind and
/// 20-byte hash.
pub fn classify_script_pubkey(script: &[u8]) -> Option<(AddressKind, [u8; 20])> {
    let (kind, hash) = match script {
        [OP_DUP, OP_HASH160, 0x14, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG] if hash.len() == 20 => {
            (AddressKind::PayToPubKeyHash, hash)
        }
        [OP_HASH160, 0x14, hash @ .., OP_EQUAL] if hash.len() == 20 => {
            (AddressKind::PayToScriptHash, hash)
        }
        _ => return None,
    };
    Some((kind, hash.try_into().ok()?))
}

/// Append a data push (length prefix + data) to `script`.
pub fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    script.extend_from_slice(&write_var_stack_int(data.len() as u64));
    script.extend_from_slice(data);
}

/// Split a push-only script into its pushed items. `OP_0` yields an empty item.
pub fn parse_pushes(script: &[u8]) -> Result<Vec<Vec<u8>>, BtcError> {
    let mut items = Vec::new();
    let mut cursor = 0usize;
    while cursor < script.len() {
        let (len, consumed) = read_var_stack_int(script, cursor)?;
        let start = cursor + consumed;
        let end = usize::try_from(len)
            .ok()
            .and_then(|len| start.checked_add(len))
            .filter(|&end| end <= script.len())
            .ok_or_else(|| BtcError::InvalidScript("push overruns script".into()))?;
        items.push(script[start..end].to_vec());
        cursor = end;
    }
    Ok(items)
}

/// Encode an ECDSA signature as `30 len 02 len R 02 len S`.
///
/// `r` and `s` are big-endian unsigned integers of any width. Each is written
/// in its minimal form: leading zero bytes dropped, one `00` prepended when
/// the high bit would otherwise mark it negative.
pub fn encode_signature(r: &[u8], s: &[u8]) -> Vec<u8> {
    let r = der_integer(r);
    let s = der_integer(s);

    let mut body = Vec::with_capacity(4 + r.len() + s.len());
    body.push(0x02);
    body.push(r.len() as u8);
    body.extend_from_slice(&r);
    body.push(0x02);
    body.push(s.len() as u8);
    body.extend_from_slice(&s);

    let mut out = Vec::with_capacity(2 + body.len());
    out.push(0x30);
    out.push(body.len() as u8);
    out.extend_from_slice(&body);
    out
}

fn der_integer(value: &[u8]) -> Vec<u8> {
    let first_nonzero = value.iter().position(|&b| b != 0).unwrap_or(value.len());
    let trimmed = &value[first_nonzero..];
    let mut out = Vec::with_capacity(trimmed.len() + 1);
    if trimmed.is_empty() || trimmed[0] & 0x80 != 0 {
        out.push(0x00);
    }
    out.extend_from_slice(trimmed);
    out
}

/// P2PKH scriptSig: `<sig || SIGHASH_ALL> <pubkey>`.
pub fn p2pkh_script_sig(signature: &[u8], pubkey: &[u8]) -> Vec<u8> {
    let mut sig_with_hashtype = Vec::with_capacity(signature.len() + 1);
    sig_with_hashtype.extend_from_slice(signature);
    sig_with_hashtype.push(SIGHASH_ALL);

    let mut script = Vec::with_capacity(sig_with_hashtype.len() + pubkey.len() + 4);
    push_data(&mut script, &sig_with_hashtype);
    push_data(&mut script, pubkey);
    script
}

/// Signatures (each still carrying its sighash byte) already present in a
/// multisig scriptSig built for `redeem_script`.
///
/// An empty script has no signatures. A non-empty script must start with the
/// `OP_0` placeholder and end with the push of exactly `redeem_script`.
pub fn multisig_signatures(script_sig: &[u8], redeem_script: &[u8]) -> Result<Vec<Vec<u8>>, BtcError> {
    if script_sig.is_empty() {
        return Ok(Vec::new());
    }
    if script_sig[0] != OP_0 {
        return Err(BtcError::InvalidScript(
            "multisig scriptSig must start with OP_0".into(),
        ));
    }

    let mut suffix = Vec::with_capacity(redeem_script.len() + 5);
    push_data(&mut suffix, redeem_script);
    if script_sig.len() < 1 + suffix.len() || !script_sig.ends_with(&suffix) {
        return Err(BtcError::InvalidScript(
            "scriptSig does not end with the expected redeem script".into(),
        ));
    }

    parse_pushes(&script_sig[1..script_sig.len() - suffix.len()])
}

/// Add `signature` to a (possibly empty) multisig scriptSig.
///
/// Existing signatures keep their order, the new one is appended, and the
/// redeem-script push is re-attached at the end. Adding a signature that is
/// already present leaves the script unchanged.
pub fn multisig_script_sig(
    existing: &[u8],
    signature: &[u8],
    redeem_script: &[u8],
) -> Result<Vec<u8>, BtcError> {
    let mut signatures = multisig_signatures(existing, redeem_script)?;

    let mut entry = Vec::with_capacity(signature.len() + 1);
    entry.extend_from_slice(signature);
    entry.push(SIGHASH_ALL);
    if !signatures.contains(&entry) {
        signatures.push(entry);
    }

    let mut script = vec![OP_0];
    for sig in &signatures {
        push_data(&mut script, sig);
    }
    push_data(&mut script, redeem_script);
    Ok(script)
}

/// Build an M-of-N redeem script: `OP_m <pubkey>... OP_n OP_CHECKMULTISIG`.
pub fn multisig_redeem_script(required: usize, pubkeys: &[Vec<u8>]) -> Result<Vec<u8>, BtcError> {
    let total = pubkeys.len();
    if total == 0 || total > MAX_MULTISIG_KEYS {
        return Err(BtcError::InvalidScript(format!(
            "multisig needs 1..={MAX_MULTISIG_KEYS} keys, got {total}"
        )));
    }
    if required == 0 || required > total {
        return Err(BtcError::InvalidScript(format!(
            "required signatures {required} out of range for {total} keys"
        )));
    }

    let mut script = Vec::with_capacity(3 + total * 66);
    script.push(OP_1_BASE + required as u8);
    for key in pubkeys {
        if key.len() != 33 && key.len() != 65 {
            return Err(BtcError::InvalidPublicKey(format!(
                "expected 33 or 65 bytes, got {}",
                key.len()
            )));
        }
        push_data(&mut script, key);
    }
    script.push(OP_1_BASE + total as u8);
    script.push(OP_CHECKMULTISIG);

    if script.len() > MAX_SCRIPT_ELEMENT_SIZE {
        return Err(BtcError::InvalidScript(format!(
            "redeem script is {} bytes, limit is {MAX_SCRIPT_ELEMENT_SIZE}",
            script.len()
        )));
    }
    Ok(script)
}

/// Parse an M-of-N redeem script into `(required, pubkeys)`.
///
/// Returns `None` for anything that is not a bare multisig template.
pub fn parse_multisig_redeem_script(script: &[u8]) -> Option<(usize, Vec<Vec<u8>>)> {
    if script.len() < 3 || script.last().copied() != Some(OP_CHECKMULTISIG) {
        return None;
    }
    let required = small_int(script[0])?;
    let total = small_int(script[script.len() - 2])?;
    if required == 0 || total == 0 || required > total {
        return None;
    }

    let pubkeys = parse_pushes(&script[1..script.len() - 2]).ok()?;
    if pubkeys.len() != total || pubkeys.iter().any(|k| k.len() != 33 && k.len() != 65) {
        return None;
    }
    Some((required, pubkeys))
}

fn small_int(opcode: u8) -> Option<usize> {
    match opcode {
        0x51..=0x60 => Some((opcode - OP_1_BASE) as usize),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::encode_address;

    fn fake_key(tag: u8) -> Vec<u8> {
        let mut key = vec![tag; 65];
        key[0] = 0x04;
        key
    }

    #[test]
    fn p2pkh_script_format() {
        let hash = [0x42; 20];
        let script = p2pkh_script_pubkey(&hash);
        assert_eq!(hex::encode(&script), format!("76a914{}88ac", "42".repeat(20)));
    }

    #[test]
    fn p2sh_script_format() {
        let hash = [0x17; 20];
        let script = p2sh_script_pubkey(&hash);
        assert_eq!(hex::encode(&script), format!("a914{}87", "17".repeat(20)));
    }

    #[test]
    fn script_pubkey_follows_address_kind() {
        let hash = [0x01; 20];
        let p2pkh = script_pubkey_for_address(&encode_address(&hash, 0x6F)).unwrap();
        assert_eq!(p2pkh, p2pkh_script_pubkey(&hash));
        let p2sh = script_pubkey_for_address(&encode_address(&hash, 0x05)).unwrap();
        assert_eq!(p2sh, p2sh_script_pubkey(&hash));
        assert!(script_pubkey_for_address(&encode_address(&hash, 0x30)).is_err());
        assert!(script_pubkey_for_address("garbage").is_err());
    }

    #[test]
    fn classify_standard_output_scripts() {
        let hash = [0x33; 20];
        assert_eq!(
            classify_script_pubkey(&p2pkh_script_pubkey(&hash)),
            Some((AddressKind::PayToPubKeyHash, hash))
        );
        assert_eq!(
            classify_script_pubkey(&p2sh_script_pubkey(&hash)),
            Some((AddressKind::PayToScriptHash, hash))
        );
        assert_eq!(classify_script_pubkey(&[OP_0, 0x14]), None);
        let mut long = p2sh_script_pubkey(&hash);
        long.insert(3, 0x00);
        assert_eq!(classify_script_pubkey(&long), None);
    }

    #[test]
    fn der_integer_minimal_forms() {
        assert_eq!(der_integer(&[0x00, 0x00, 0x7F]), vec![0x7F]);
        assert_eq!(der_integer(&[0x00, 0x80]), vec![0x00, 0x80]);
        assert_eq!(der_integer(&[0xFF, 0x01]), vec![0x00, 0xFF, 0x01]);
        assert_eq!(der_integer(&[0x00, 0x00]), vec![0x00]);
    }

    #[test]
    fn encode_signature_layout() {
        let r = [0x01u8; 32];
        let mut s = [0x00u8; 32];
        s[31] = 0x05;
        let sig = encode_signature(&r, &s);
        assert_eq!(sig[0], 0x30);
        assert_eq!(sig[1] as usize, sig.len() - 2);
        assert_eq!(&sig[2..4], &[0x02, 32]);
        assert_eq!(&sig[4..36], &r);
        assert_eq!(&sig[36..], &[0x02, 0x01, 0x05]);
    }

    #[test]
    fn p2pkh_script_sig_layout() {
        let sig = vec![0x30; 71];
        let pubkey = fake_key(0x11);
        let script = p2pkh_script_sig(&sig, &pubkey);
        assert_eq!(script[0], 72);
        assert_eq!(&script[1..72], sig.as_slice());
        assert_eq!(script[72], SIGHASH_ALL);
        assert_eq!(script[73], 65);
        assert_eq!(&script[74..], pubkey.as_slice());
        assert_eq!(parse_pushes(&script).unwrap().len(), 2);
    }

    #[test]
    fn redeem_script_two_of_three() {
        let keys = vec![fake_key(1), fake_key(2), fake_key(3)];
        let script = multisig_redeem_script(2, &keys).unwrap();
        assert_eq!(script[0], 0x52);
        assert_eq!(script[script.len() - 2], 0x53);
        assert_eq!(script[script.len() - 1], OP_CHECKMULTISIG);
        assert_eq!(script.len(), 1 + 3 * 66 + 2);

        let (required, parsed) = parse_multisig_redeem_script(&script).unwrap();
        assert_eq!(required, 2);
        assert_eq!(parsed, keys);
    }

    #[test]
    fn redeem_script_rejects_bad_parameters() {
        let keys = vec![fake_key(1), fake_key(2)];
        assert!(multisig_redeem_script(0, &keys).is_err());
        assert!(multisig_redeem_script(3, &keys).is_err());
        assert!(multisig_redeem_script(1, &[]).is_err());
        assert!(multisig_redeem_script(1, &[vec![0x02; 10]]).is_err());
    }

    #[test]
    fn redeem_script_respects_push_limit() {
        // 7 uncompressed keys: 3 + 7 * 66 = 465 bytes.
        let seven: Vec<_> = (1..=7).map(fake_key).collect();
        assert_eq!(multisig_redeem_script(2, &seven).unwrap().len(), 465);

        // 8 uncompressed keys: 531 bytes, unspendable behind P2SH.
        let eight: Vec<_> = (1..=8).map(fake_key).collect();
        let err = multisig_redeem_script(2, &eight).unwrap_err();
        assert!(matches!(err, BtcError::InvalidScript(_)));

        // 15 compressed keys still fit: 3 + 15 * 34 = 513 bytes.
        let compressed: Vec<_> = (1..=15u8).map(|tag| vec![0x02 | (tag & 1); 33]).collect();
        assert_eq!(multisig_redeem_script(11, &compressed).unwrap().len(), 513);
    }

    #[test]
    fn parse_rejects_non_multisig() {
        assert!(parse_multisig_redeem_script(&p2pkh_script_pubkey(&[0; 20])).is_none());
        assert!(parse_multisig_redeem_script(&[0x52, 0x51, OP_CHECKMULTISIG]).is_none());
        assert!(parse_multisig_redeem_script(&[]).is_none());
    }

    #[test]
    fn multisig_merge_accumulates_in_order() {
        let keys = vec![fake_key(1), fake_key(2), fake_key(3)];
        let redeem = multisig_redeem_script(2, &keys).unwrap();
        let sig_a = vec![0x30, 0xAA];
        let sig_b = vec![0x30, 0xBB];

        let first = multisig_script_sig(&[], &sig_a, &redeem).unwrap();
        assert_eq!(first[0], OP_0);
        assert_eq!(multisig_signatures(&first, &redeem).unwrap(), vec![vec![0x30, 0xAA, 0x01]]);

        let second = multisig_script_sig(&first, &sig_b, &redeem).unwrap();
        let sigs = multisig_signatures(&second, &redeem).unwrap();
        assert_eq!(sigs, vec![vec![0x30, 0xAA, 0x01], vec![0x30, 0xBB, 0x01]]);

        // The redeem script (201 bytes) needs an OP_PUSHDATA1 prefix.
        let tail = &second[second.len() - redeem.len() - 2..];
        assert_eq!(&tail[..2], &[0x4C, redeem.len() as u8]);
    }

    #[test]
    fn multisig_merge_skips_duplicate() {
        let redeem = multisig_redeem_script(1, &[fake_key(9)]).unwrap();
        let once = multisig_script_sig(&[], &[0x30, 0x01], &redeem).unwrap();
        let twice = multisig_script_sig(&once, &[0x30, 0x01], &redeem).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn multisig_merge_rejects_foreign_redeem_script() {
        let redeem_a = multisig_redeem_script(1, &[fake_key(1)]).unwrap();
        let redeem_b = multisig_redeem_script(1, &[fake_key(2)]).unwrap();
        let script = multisig_script_sig(&[], &[0x30, 0x01], &redeem_a).unwrap();
        let err = multisig_script_sig(&script, &[0x30, 0x02], &redeem_b).unwrap_err();
        assert!(matches!(err, BtcError::InvalidScript(_)));
    }

    #[test]
    fn parse_pushes_detects_overrun() {
        assert!(parse_pushes(&[0x05, 0x01, 0x02]).is_err());
        assert_eq!(parse_pushes(&[0x00, 0x01, 0xFF]).unwrap(), vec![vec![], vec![0xFF]]);
    }
}

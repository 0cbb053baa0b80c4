//! Legacy (pre-SegWit) transaction wire format.
//!
//! ```text
//! version (4 LE) | varint nIn | inputs | varint nOut | outputs | lock_time (4 LE)
//! input:  prev hash (32) | prev index (4 LE) | varint len | script | sequence (4 LE)
//! output: amount (8 LE) | varint len | script
//! ```

use crypto_utils::hash::sha256d;

use crate::error::BtcError;
use crate::varint::{read_var_int, write_var_int};

/// Version used for newly built spends.
pub const TX_VERSION: i32 = 1;

/// `nSequence` value marking an input as final.
pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

/// A transaction input. `previous_tx_hash` is kept in wire byte order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInput {
    pub previous_tx_hash: [u8; 32],
    pub previous_output_index: u32,
    pub script: Vec<u8>,
    pub sequence: u32,
}

impl RawInput {
    /// An unsigned, final input spending `txid:vout`, where `txid` is the
    /// usual display-order hex string.
    pub fn spending(txid: &str, vout: u32) -> Result<Self, BtcError> {
        Ok(Self {
            previous_tx_hash: txid_to_wire_hash(txid)?,
            previous_output_index: vout,
            script: Vec::new(),
            sequence: SEQUENCE_FINAL,
        })
    }

    /// Display-order txid of the output this input spends.
    pub fn previous_txid(&self) -> String {
        wire_hash_to_txid(&self.previous_tx_hash)
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.previous_tx_hash);
        buf.extend_from_slice(&self.previous_output_index.to_le_bytes());
        buf.extend_from_slice(&write_var_int(self.script.len() as u64));
        buf.extend_from_slice(&self.script);
        buf.extend_from_slice(&self.sequence.to_le_bytes());
    }
}

/// A transaction output paying `amount` satoshis to `script`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    pub amount: i64,
    pub script: Vec<u8>,
}

impl RawOutput {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.amount.to_le_bytes());
        buf.extend_from_slice(&write_var_int(self.script.len() as u64));
        buf.extend_from_slice(&self.script);
    }
}

/// A parsed or freshly built transaction.
///
/// Parsing keeps every field verbatim, so `encode(parse(bytes)) == bytes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    pub version: i32,
    pub inputs: Vec<RawInput>,
    pub outputs: Vec<RawOutput>,
    pub lock_time: u32,
}

impl RawTransaction {
    pub fn new(inputs: Vec<RawInput>, outputs: Vec<RawOutput>) -> Self {
        Self {
            version: TX_VERSION,
            inputs,
            outputs,
            lock_time: 0,
        }
    }

    /// Serialize to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(10 + self.inputs.len() * 180 + self.outputs.len() * 34);
        buf.extend_from_slice(&self.version.to_le_bytes());

        buf.extend_from_slice(&write_var_int(self.inputs.len() as u64));
        for input in &self.inputs {
            input.encode_into(&mut buf);
        }

        buf.extend_from_slice(&write_var_int(self.outputs.len() as u64));
        for output in &self.outputs {
            output.encode_into(&mut buf);
        }

        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf
    }

    /// Parse wire bytes. Truncation, overrunning lengths and trailing bytes
    /// are all reported as [`BtcError::CorruptTransaction`].
    pub fn parse(bytes: &[u8]) -> Result<Self, BtcError> {
        let mut reader = Reader::new(bytes);

        let version = i32::from_le_bytes(reader.array()?);

        let input_count = reader.count()?;
        let mut inputs = Vec::with_capacity(input_count.min(1024));
        for _ in 0..input_count {
            let previous_tx_hash = reader.array::<32>()?;
            let previous_output_index = u32::from_le_bytes(reader.array()?);
            let script_len = reader.count()?;
            let script = reader.take(script_len)?.to_vec();
            let sequence = u32::from_le_bytes(reader.array()?);
            inputs.push(RawInput {
                previous_tx_hash,
                previous_output_index,
                script,
                sequence,
            });
        }

        let output_count = reader.count()?;
        let mut outputs = Vec::with_capacity(output_count.min(1024));
        for _ in 0..output_count {
            let amount = i64::from_le_bytes(reader.array()?);
            let script_len = reader.count()?;
            let script = reader.take(script_len)?.to_vec();
            outputs.push(RawOutput { amount, script });
        }

        let lock_time = u32::from_le_bytes(reader.array()?);

        if reader.remaining() != 0 {
            return Err(BtcError::CorruptTransaction(format!(
                "{} trailing bytes",
                reader.remaining()
            )));
        }

        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.encode())
    }

    pub fn from_hex(tx_hex: &str) -> Result<Self, BtcError> {
        let bytes = hex::decode(tx_hex.trim())
            .map_err(|e| BtcError::CorruptTransaction(format!("invalid hex: {e}")))?;
        Self::parse(&bytes)
    }

    /// Transaction id in display order (SHA-256d of the encoding, reversed).
    pub fn txid(&self) -> String {
        wire_hash_to_txid(&sha256d(&self.encode()))
    }

    /// Index of the input spending `previous_tx_hash:previous_output_index`.
    pub fn find_input(&self, previous_tx_hash: &[u8; 32], previous_output_index: u32) -> Option<usize> {
        self.inputs.iter().position(|input| {
            &input.previous_tx_hash == previous_tx_hash
                && input.previous_output_index == previous_output_index
        })
    }

    /// Sum of all output amounts, `None` if it overflows.
    pub fn total_output(&self) -> Option<i64> {
        self.outputs
            .iter()
            .try_fold(0i64, |total, o| total.checked_add(o.amount))
    }
}

/// Deep copy of `tx` with every input script cleared, the starting point of
/// every signature hash.
pub fn strip_input_scripts(tx: &RawTransaction) -> RawTransaction {
    let mut stripped = tx.clone();
    for input in &mut stripped.inputs {
        input.script.clear();
    }
    stripped
}

/// Convert a display-order txid hex string to the 32 wire-order bytes.
pub fn txid_to_wire_hash(txid: &str) -> Result<[u8; 32], BtcError> {
    let bytes = hex::decode(txid)
        .map_err(|e| BtcError::TransactionBuildError(format!("invalid txid hex: {e}")))?;
    let mut hash: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
        BtcError::TransactionBuildError(format!("txid must be 32 bytes, got {}", b.len()))
    })?;
    hash.reverse();
    Ok(hash)
}

/// Convert 32 wire-order bytes to a display-order txid hex string.
pub fn wire_hash_to_txid(hash: &[u8; 32]) -> String {
    let mut display = *hash;
    display.reverse();
    hex::encode(display)
}

/// Byte cursor used by the parser.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], BtcError> {
        if len > self.remaining() {
            return Err(BtcError::CorruptTransaction(format!(
                "need {len} bytes at offset {}, only {} left",
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], BtcError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// A varint count or length, bounded by what is left in the buffer.
    fn count(&mut self) -> Result<usize, BtcError> {
        let (value, size) = read_var_int(self.bytes, self.pos)?;
        self.pos += size;
        usize::try_from(value)
            .ok()
            .filter(|&n| n <= self.remaining())
            .ok_or_else(|| {
                BtcError::CorruptTransaction(format!(
                    "declared length {value} exceeds remaining {} bytes",
                    self.remaining()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // Mainnet tx f4184fc596403b9d638783cf57adfe4c75c605f6356fbc91338530e9831e9e16:
    // the first bitcoin transfer (block 170), one P2PK input, two outputs.
    const BLOCK_170_TX: &str = "0100000001c997a5e56e104102fa209c6a852dd90660a20b2d9c352423edce25857fcd3704000000004847304402204e45e16932b8af514961a1d3a1a25fdf3f4f7732e9d624c6c61548ab5fb8cd410220181522ec8eca07de4860a4acdd12909d831cc56cbbac4622082221a8768d1d0901ffffffff0200ca9a3b00000000434104ae1a62fe09c5f51b13905f07f06b99a2f7159b2225f374cd378d71302fa28414e7aab37397f554a7df5f142c21c1b7303b8a0626f1baded5c72a704f7e6cd84cac00286bee0000000043410411db93e1dcdb8a016b49840f8c53bc1eb68a382e97b1482ecad7b148a6909a5cb2e0eaddfb84ccf9744464f82e160bfa9b8b64f9d4c03f999b8643f656b412a3ac00000000";

    fn sample_tx() -> RawTransaction {
        RawTransaction::new(
            vec![
                RawInput::spending(&"ab".repeat(32), 1).unwrap(),
                RawInput {
                    previous_tx_hash: [0x11; 32],
                    previous_output_index: 7,
                    script: vec![0x00, 0x01, 0x02],
                    sequence: 0xFFFF_FFFE,
                },
            ],
            vec![
                RawOutput {
                    amount: 10_000_000,
                    script: vec![0x76; 25],
                },
                RawOutput {
                    amount: 39_990_000,
                    script: vec![0xA9; 23],
                },
            ],
        )
    }

    #[test]
    fn parse_real_transaction() {
        let tx = RawTransaction::from_hex(BLOCK_170_TX).unwrap();
        assert_eq!(tx.version, 1);
        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.outputs.len(), 2);
        assert_eq!(tx.outputs[0].amount, 1_000_000_000);
        assert_eq!(tx.outputs[1].amount, 4_000_000_000);
        assert_eq!(tx.inputs[0].sequence, SEQUENCE_FINAL);
        assert_eq!(tx.inputs[0].script.len(), 0x48);
        assert_eq!(
            tx.inputs[0].previous_txid(),
            "0437cd7f8525ceed2324359c2d0ba26006d92d856a9c20fa0241106ee5a597c9"
        );
        assert_eq!(
            tx.txid(),
            "f4184fc596403b9d638783cf57adfe4c75c605f6356fbc91338530e9831e9e16"
        );
    }

    #[test]
    fn reencode_reproduces_bytes() {
        let tx = RawTransaction::from_hex(BLOCK_170_TX).unwrap();
        assert_eq!(tx.to_hex(), BLOCK_170_TX);
    }

    #[test]
    fn encoding_matches_reference_implementation() {
        let tx = sample_tx();
        let ours = tx.encode();
        let reference: bitcoin::Transaction = bitcoin::consensus::deserialize(&ours).unwrap();
        assert_eq!(bitcoin::consensus::serialize(&reference), ours);
        assert_eq!(reference.compute_txid().to_string(), tx.txid());
        assert_eq!(reference.input.len(), 2);
        assert_eq!(reference.output[1].value.to_sat(), 39_990_000);
    }

    #[test]
    fn spending_reverses_txid_into_wire_order() {
        let txid = format!("{}{}", "00".repeat(31), "ff");
        let input = RawInput::spending(&txid, 3).unwrap();
        assert_eq!(input.previous_tx_hash[0], 0xff);
        assert_eq!(input.previous_txid(), txid);
        assert_eq!(input.sequence, SEQUENCE_FINAL);
        assert!(input.script.is_empty());
    }

    #[test]
    fn spending_rejects_bad_txid() {
        assert!(RawInput::spending("abcd", 0).is_err());
        assert!(RawInput::spending(&"zz".repeat(32), 0).is_err());
    }

    #[test]
    fn truncated_bytes_are_corrupt() {
        let bytes = sample_tx().encode();
        for cut in [0, 3, 5, 40, bytes.len() - 1] {
            let err = RawTransaction::parse(&bytes[..cut]).unwrap_err();
            assert!(matches!(err, BtcError::CorruptTransaction(_)), "cut at {cut}");
        }
    }

    #[test]
    fn overrunning_script_length_is_corrupt() {
        let mut bytes = sample_tx().encode();
        // First input's script length sits right after version, count, hash and index.
        let script_len_offset = 4 + 1 + 32 + 4;
        bytes[script_len_offset] = 0xFC;
        assert!(matches!(
            RawTransaction::parse(&bytes),
            Err(BtcError::CorruptTransaction(_))
        ));
    }

    #[test]
    fn trailing_bytes_are_corrupt() {
        let mut bytes = sample_tx().encode();
        bytes.push(0x00);
        assert!(RawTransaction::parse(&bytes).is_err());
    }

    #[test]
    fn strip_clears_every_script_without_touching_original() {
        let tx = sample_tx();
        let stripped = strip_input_scripts(&tx);
        assert!(stripped.inputs.iter().all(|i| i.script.is_empty()));
        assert_eq!(tx.inputs[1].script, vec![0x00, 0x01, 0x02]);
        assert_eq!(stripped.outputs, tx.outputs);
    }

    #[test]
    fn find_input_by_outpoint() {
        let tx = sample_tx();
        assert_eq!(tx.find_input(&[0x11; 32], 7), Some(1));
        assert_eq!(tx.find_input(&[0x11; 32], 8), None);
    }

    #[test]
    fn total_output_sums_amounts() {
        assert_eq!(sample_tx().total_output(), Some(49_990_000));
    }

    #[test]
    fn total_output_overflow_is_none() {
        let mut tx = sample_tx();
        tx.outputs[0].amount = i64::MAX;
        tx.outputs[1].amount = 1;
        let parsed = RawTransaction::from_hex(&tx.to_hex()).unwrap();
        assert_eq!(parsed.total_output(), None);
    }

    #[test]
    fn parse_rejects_padded_counts() {
        let tx = RawTransaction::new(
            vec![RawInput::spending(&"ab".repeat(32), 0).unwrap()],
            vec![RawOutput {
                amount: 1_000,
                script: vec![0x51],
            }],
        );
        let bytes = tx.encode();
        // Input count 0x01 widened to FD 01 00.
        let mut padded = bytes[..4].to_vec();
        padded.extend_from_slice(&[0xFD, 0x01, 0x00]);
        padded.extend_from_slice(&bytes[5..]);

        let err = RawTransaction::parse(&padded).unwrap_err();
        assert!(matches!(err, BtcError::CorruptTransaction(_)));
        assert_eq!(RawTransaction::parse(&bytes).unwrap().encode(), bytes);
    }

    fn arb_input() -> impl Strategy<Value = RawInput> {
        (any::<[u8; 32]>(), any::<u32>(), prop::collection::vec(any::<u8>(), 0..300), any::<u32>())
            .prop_map(|(previous_tx_hash, previous_output_index, script, sequence)| RawInput {
                previous_tx_hash,
                previous_output_index,
                script,
                sequence,
            })
    }

    fn arb_output() -> impl Strategy<Value = RawOutput> {
        (any::<i64>(), prop::collection::vec(any::<u8>(), 0..80))
            .prop_map(|(amount, script)| RawOutput { amount, script })
    }

    proptest! {
        #[test]
        fn parse_inverts_encode(
            version in any::<i32>(),
            inputs in prop::collection::vec(arb_input(), 0..4),
            outputs in prop::collection::vec(arb_output(), 0..4),
            lock_time in any::<u32>(),
        ) {
            let tx = RawTransaction { version, inputs, outputs, lock_time };
            let bytes = tx.encode();
            let parsed = RawTransaction::parse(&bytes).unwrap();
            prop_assert_eq!(&parsed, &tx);
            prop_assert_eq!(parsed.encode(), bytes);
        }
    }
}

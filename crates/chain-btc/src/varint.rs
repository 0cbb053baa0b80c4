//! Variable-length integer codecs.
//!
//! Two unrelated encodings live here and must not be mixed up:
//!
//! * the CompactSize integer used for counts and lengths in the transaction
//!   body (`0xFD`/`0xFE`/`0xFF` markers), and
//! * the script push-size prefix (`OP_PUSHDATA1/2/4`, `0x4C`/`0x4D`/`0x4E`)
//!   used inside scripts.

use crate::error::BtcError;

const OP_PUSHDATA1: u8 = 0x4C;
const OP_PUSHDATA2: u8 = 0x4D;
const OP_PUSHDATA4: u8 = 0x4E;

/// Read a CompactSize integer at `offset`. Returns the value and the number of
/// bytes consumed (1, 3, 5 or 9).
///
/// Non-canonical encodings (a wider form than the value needs) are rejected,
/// so a parsed body always re-encodes to the same bytes.
pub fn read_var_int(bytes: &[u8], offset: usize) -> Result<(u64, usize), BtcError> {
    let marker = *bytes
        .get(offset)
        .ok_or_else(|| BtcError::CorruptTransaction("missing varint".into()))?;
    let (value, size, min) = match marker {
        0xFD => (read_le(bytes, offset + 1, 2)?, 3, 0xFD),
        0xFE => (read_le(bytes, offset + 1, 4)?, 5, 0x1_0000),
        0xFF => (read_le(bytes, offset + 1, 8)?, 9, 0x1_0000_0000),
        n => return Ok((n as u64, 1)),
    };
    if value < min {
        return Err(BtcError::CorruptTransaction(format!(
            "non-canonical varint 0x{marker:02x} for {value}"
        )));
    }
    Ok((value, size))
}

/// Encode `value` as a CompactSize integer using the smallest width.
pub fn write_var_int(value: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9);
    if value < 0xFD {
        buf.push(value as u8);
    } else if value <= 0xFFFF {
        buf.push(0xFD);
        buf.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xFFFF_FFFF {
        buf.push(0xFE);
        buf.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        buf.push(0xFF);
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf
}

/// Read a script push-size prefix at `offset`. Returns the pushed length and
/// the number of prefix bytes consumed (1, 2, 3 or 5).
///
/// Opcodes above `OP_PUSHDATA4` are not pushes and are rejected.
pub fn read_var_stack_int(bytes: &[u8], offset: usize) -> Result<(u64, usize), BtcError> {
    let opcode = *bytes
        .get(offset)
        .ok_or_else(|| BtcError::InvalidScript("missing push opcode".into()))?;
    let result = match opcode {
        OP_PUSHDATA1 => read_le(bytes, offset + 1, 1).map(|len| (len, 2)),
        OP_PUSHDATA2 => read_le(bytes, offset + 1, 2).map(|len| (len, 3)),
        OP_PUSHDATA4 => read_le(bytes, offset + 1, 4).map(|len| (len, 5)),
        n if n < OP_PUSHDATA1 => Ok((n as u64, 1)),
        other => {
            return Err(BtcError::InvalidScript(format!(
                "opcode 0x{other:02x} is not a data push"
            )))
        }
    };
    result.map_err(|_| BtcError::InvalidScript("truncated push length".into()))
}

/// Encode a script push-size prefix for `len` bytes of data.
pub fn write_var_stack_int(len: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5);
    if len < OP_PUSHDATA1 as u64 {
        buf.push(len as u8);
    } else if len <= 0xFF {
        buf.push(OP_PUSHDATA1);
        buf.push(len as u8);
    } else if len <= 0xFFFF {
        buf.push(OP_PUSHDATA2);
        buf.extend_from_slice(&(len as u16).to_le_bytes());
    } else {
        buf.push(OP_PUSHDATA4);
        buf.extend_from_slice(&(len as u32).to_le_bytes());
    }
    buf
}

/// Little-endian unsigned integer of `width` bytes at `offset`.
fn read_le(bytes: &[u8], offset: usize, width: usize) -> Result<u64, BtcError> {
    let end = offset
        .checked_add(width)
        .ok_or_else(|| BtcError::CorruptTransaction("varint offset overflow".into()))?;
    let slice = bytes
        .get(offset..end)
        .ok_or_else(|| BtcError::CorruptTransaction("truncated varint".into()))?;
    let mut buf = [0u8; 8];
    buf[..width].copy_from_slice(slice);
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn var_int_boundaries_select_width() {
        let cases: [(u64, usize, u8); 6] = [
            (0xFC, 1, 0xFC),
            (0xFD, 3, 0xFD),
            (0xFFFF, 3, 0xFD),
            (0x1_0000, 5, 0xFE),
            (0xFFFF_FFFF, 5, 0xFE),
            (0x1_0000_0000, 9, 0xFF),
        ];
        for (value, width, marker) in cases {
            let encoded = write_var_int(value);
            assert_eq!(encoded.len(), width, "width for {value:#x}");
            assert_eq!(encoded[0], marker, "marker for {value:#x}");
            assert_eq!(read_var_int(&encoded, 0).unwrap(), (value, width));
        }
    }

    #[test]
    fn var_int_known_encodings() {
        assert_eq!(write_var_int(0), vec![0x00]);
        assert_eq!(write_var_int(0xFD), vec![0xFD, 0xFD, 0x00]);
        assert_eq!(write_var_int(0x1234), vec![0xFD, 0x34, 0x12]);
        assert_eq!(
            write_var_int(0x0102_0304),
            vec![0xFE, 0x04, 0x03, 0x02, 0x01]
        );
    }

    #[test]
    fn read_var_int_at_offset() {
        let bytes = [0xAA, 0xFD, 0x00, 0x01];
        assert_eq!(read_var_int(&bytes, 1).unwrap(), (0x0100, 3));
    }

    #[test]
    fn read_var_int_truncated_is_corrupt() {
        let err = read_var_int(&[0xFE, 0x01, 0x02], 0).unwrap_err();
        assert!(matches!(err, BtcError::CorruptTransaction(_)));
        assert!(read_var_int(&[], 0).is_err());
    }

    #[test]
    fn read_var_int_rejects_non_canonical_forms() {
        let cases: [&[u8]; 6] = [
            &[0xFD, 0x01, 0x00],
            &[0xFD, 0xFC, 0x00],
            &[0xFE, 0xFF, 0xFF, 0x00, 0x00],
            &[0xFE, 0x01, 0x00, 0x00, 0x00],
            &[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00],
            &[0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
        ];
        for bytes in cases {
            let err = read_var_int(bytes, 0).unwrap_err();
            assert!(matches!(err, BtcError::CorruptTransaction(_)), "{bytes:02x?}");
        }

        // Smallest value of each wide form is accepted.
        assert_eq!(read_var_int(&[0xFD, 0xFD, 0x00], 0).unwrap(), (0xFD, 3));
        assert_eq!(
            read_var_int(&[0xFE, 0x00, 0x00, 0x01, 0x00], 0).unwrap(),
            (0x1_0000, 5)
        );
        assert_eq!(
            read_var_int(&[0xFF, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00], 0).unwrap(),
            (0x1_0000_0000, 9)
        );
    }

    #[test]
    fn stack_int_boundaries() {
        assert_eq!(write_var_stack_int(0x4B), vec![0x4B]);
        assert_eq!(write_var_stack_int(0x4C), vec![0x4C, 0x4C]);
        assert_eq!(write_var_stack_int(0xFF), vec![0x4C, 0xFF]);
        assert_eq!(write_var_stack_int(0x100), vec![0x4D, 0x00, 0x01]);
        assert_eq!(
            write_var_stack_int(0x1_0000),
            vec![0x4E, 0x00, 0x00, 0x01, 0x00]
        );
    }

    #[test]
    fn stack_int_reads_each_form() {
        assert_eq!(read_var_stack_int(&[0x47], 0).unwrap(), (0x47, 1));
        assert_eq!(read_var_stack_int(&[0x4C, 0xC9], 0).unwrap(), (0xC9, 2));
        assert_eq!(read_var_stack_int(&[0x4D, 0x01, 0x02], 0).unwrap(), (0x0201, 3));
        assert_eq!(
            read_var_stack_int(&[0x4E, 0x01, 0x00, 0x00, 0x00], 0).unwrap(),
            (1, 5)
        );
    }

    #[test]
    fn stack_int_rejects_non_push_opcode() {
        let err = read_var_stack_int(&[0xAE], 0).unwrap_err();
        assert!(matches!(err, BtcError::InvalidScript(_)));
    }

    #[test]
    fn encodings_are_not_interchangeable() {
        // 0xFD bytes of data: CompactSize uses a 3-byte form, the push prefix a 2-byte one.
        assert_ne!(write_var_int(0xFD), write_var_stack_int(0xFD));
    }

    proptest! {
        #[test]
        fn var_int_decode_inverts_encode(value in any::<u64>()) {
            let encoded = write_var_int(value);
            prop_assert_eq!(read_var_int(&encoded, 0).unwrap(), (value, encoded.len()));
        }

        #[test]
        fn stack_int_decode_inverts_encode(len in 0u64..=u32::MAX as u64) {
            let encoded = write_var_stack_int(len);
            prop_assert_eq!(read_var_stack_int(&encoded, 0).unwrap(), (len, encoded.len()));
        }
    }
}
